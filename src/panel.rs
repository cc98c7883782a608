//! REST-клиент панели: создание и продление аккаунтов, выборки, сквады.

use crate::config::PanelConfig;
use chrono::{DateTime, Duration, Utc};
use rand::distr::{Alphanumeric, SampleString};
use rand::seq::IndexedRandom;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};

/// Описание аккаунта, который ещё не платил (пробный период).
pub const TRIAL_DESCRIPTION: &str = "New user - without pay";
const DEFAULT_DESCRIPTION: &str = "New user";

/// Лимит трафика white-подписки: 75 GiB в месяц.
const WHITE_TRAFFIC_LIMIT: i64 = 80_530_636_800;

const PAGE_SIZE: i64 = 1000;
const MAX_PAGES: i64 = 50;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Deserialize)]
struct UserList {
    users: Vec<PanelUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelUser {
    pub uuid: String,
    pub username: String,
    pub status: String,
    #[serde(default)]
    pub expire_at: Option<String>,
    #[serde(default)]
    pub traffic_limit_bytes: Option<i64>,
    #[serde(default)]
    pub traffic_limit_strategy: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<i64>,
    #[serde(default)]
    pub subscription_url: Option<String>,
    #[serde(default)]
    pub first_connected_at: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub active_internal_squads: Vec<SquadRef>,
    #[serde(default)]
    pub last_connected_node: Option<ConnectedNode>,
}

/// Панель отдаёт сквады то объектами, то строками uuid.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SquadRef {
    Object { uuid: String },
    Plain(String),
}

impl SquadRef {
    pub fn uuid(&self) -> &str {
        match self {
            SquadRef::Object { uuid } => uuid,
            SquadRef::Plain(uuid) => uuid,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedNode {
    #[serde(default)]
    pub connected_at: Option<String>,
}

/// Состояние подписки для карточки пользователя.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStatus {
    /// Аккаунт вообще существует в панели.
    pub exists: bool,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PanelUser {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expire_at.as_deref().and_then(parse_panel_time)
    }

    pub fn is_connected(&self) -> bool {
        self.first_connected_at.is_some()
            && self.description.as_deref() != Some(TRIAL_DESCRIPTION)
    }

    pub fn connected_today(&self, today: chrono::NaiveDate) -> bool {
        self.last_connected_node
            .as_ref()
            .and_then(|node| node.connected_at.as_deref())
            .and_then(parse_panel_time)
            .is_some_and(|dt| dt.date_naive() == today)
    }
}

pub fn parse_panel_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_panel_time(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Срок в человекочитаемом виде, московское время (UTC+3).
pub fn format_msk(dt: DateTime<Utc>) -> String {
    (dt + Duration::hours(3)).format("%d-%m-%Y %H:%M МСК").to_string()
}

/// Имя аккаунта в панели: telegram id, для white-подписки с суффиксом.
pub fn panel_username(tg_id: i64, white: bool) -> String {
    if white {
        format!("{}_white", tg_id)
    } else {
        tg_id.to_string()
    }
}

/// Детерминированный короткий id клиента: первые 9 hex-символов дайджеста.
/// Для white-варианта хешируется tg_id * 100, чтобы id не совпадали.
pub fn client_short_id(tg_id: i64, white: bool) -> String {
    let source = if white { tg_id * 100 } else { tg_id };
    let digest = Sha256::digest(source.to_string().as_bytes());
    hex::encode(digest)[..9].to_string()
}

/// Новый срок при продлении: истёкший аккаунт стартует заново от текущего
/// момента, активный получает дни сверху.
pub fn extended_expiry(
    current: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    days: i64,
) -> (DateTime<Utc>, bool) {
    match current {
        Some(expiry) if expiry > now => (expiry + Duration::days(days), false),
        _ => (now + Duration::days(days), true),
    }
}

pub struct PanelClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    squads: Vec<String>,
    white_squads: Vec<String>,
}

impl PanelClient {
    pub fn new(config: &PanelConfig) -> Result<Self, anyhow::Error> {
        // Панель обычно живёт на self-signed сертификате.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Не удалось создать HTTP-клиент панели: {}", e))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            squads: config.squads.clone(),
            white_squads: config.white_squads.clone(),
        })
    }

    fn pick_squad(&self, white: bool) -> Vec<String> {
        let pool = if white { &self.white_squads } else { &self.squads };
        pool.choose(&mut rand::rng())
            .cloned()
            .map(|squad| vec![squad])
            .unwrap_or_default()
    }

    pub fn random_squad(&self) -> Option<String> {
        self.squads.choose(&mut rand::rng()).cloned()
    }

    /// Создаёт аккаунт на `days` дней от текущего момента.
    pub async fn create_client(
        &self,
        tg_id: i64,
        days: i64,
        white: bool,
        trial: bool,
    ) -> Result<PanelUser, anyhow::Error> {
        let now = Utc::now();
        let expire_at = now + Duration::days(days);
        let description = if trial { TRIAL_DESCRIPTION } else { DEFAULT_DESCRIPTION };
        let body = json!({
            "username": panel_username(tg_id, white),
            "status": "ACTIVE",
            "shortUuid": client_short_id(tg_id, white),
            "trojanPassword": Alphanumeric.sample_string(&mut rand::rng(), 12),
            "ssPassword": Alphanumeric.sample_string(&mut rand::rng(), 12),
            "vlessUuid": uuid::Uuid::new_v4().to_string(),
            "trafficLimitStrategy": if white { "MONTH" } else { "NO_RESET" },
            "trafficLimitBytes": if white { WHITE_TRAFFIC_LIMIT } else { 0 },
            "expireAt": format_panel_time(expire_at),
            "createdAt": format_panel_time(now),
            "hwidDeviceLimit": if white { 1 } else { 3 },
            "telegramId": tg_id,
            "description": description,
            "activeInternalSquads": self.pick_squad(white),
        });

        let user: Envelope<PanelUser> = self
            .http
            .post(format!("{}/api/users", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Панель вернула некорректный ответ createClient: {}", e))?;
        Ok(user.response)
    }

    /// Продлевает аккаунт на `days` дней, возвращая обновлённого пользователя.
    pub async fn extend_client(
        &self,
        username: &str,
        days: i64,
    ) -> Result<PanelUser, anyhow::Error> {
        let user = self
            .user_by_username(username)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Аккаунт {} не найден в панели", username))?;

        let now = Utc::now();
        let (new_expiry, restarted) = extended_expiry(user.expires_at(), now, days);
        let status = if restarted { "ACTIVE".to_string() } else { user.status.clone() };
        let squads: Vec<String> = user
            .active_internal_squads
            .iter()
            .map(|squad| squad.uuid().to_string())
            .collect();

        let body = json!({
            "uuid": user.uuid,
            "status": status,
            "expireAt": format_panel_time(new_expiry),
            "trafficLimitBytes": user.traffic_limit_bytes.unwrap_or(0),
            "trafficLimitStrategy": user.traffic_limit_strategy.as_deref().unwrap_or("NO_RESET"),
            "activeInternalSquads": squads,
        });

        let updated: Envelope<PanelUser> = self
            .http
            .patch(format!("{}/api/users", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Панель вернула некорректный ответ updateClient: {}", e))?;
        Ok(updated.response)
    }

    pub async fn user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PanelUser>, anyhow::Error> {
        let response = self
            .http
            .get(format!("{}/api/users/by-username/{}", self.base_url, username))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let user: Envelope<PanelUser> = response.error_for_status()?.json().await?;
        Ok(Some(user.response))
    }

    pub async fn users_by_telegram_id(
        &self,
        tg_id: i64,
    ) -> Result<Vec<PanelUser>, anyhow::Error> {
        let response = self
            .http
            .get(format!("{}/api/users/by-telegram-id/{}", self.base_url, tg_id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let users: Envelope<Vec<PanelUser>> = response.error_for_status()?.json().await?;
        Ok(users.response)
    }

    pub async fn subscription_link(
        &self,
        username: &str,
    ) -> Result<Option<String>, anyhow::Error> {
        Ok(self
            .user_by_username(username)
            .await?
            .and_then(|user| user.subscription_url))
    }

    pub async fn subscription_status(
        &self,
        username: &str,
    ) -> Result<SubscriptionStatus, anyhow::Error> {
        let Some(user) = self.user_by_username(username).await? else {
            return Ok(SubscriptionStatus {
                exists: false,
                active: false,
                expires_at: None,
            });
        };
        let expires_at = user.expires_at();
        let active = user.status == "ACTIVE"
            && expires_at.is_some_and(|expiry| expiry > Utc::now());
        Ok(SubscriptionStatus {
            exists: true,
            active,
            expires_at,
        })
    }

    /// Полный список аккаунтов панели постранично.
    pub async fn all_users(&self) -> Result<Vec<PanelUser>, anyhow::Error> {
        let mut users = Vec::new();
        for page in 0..MAX_PAGES {
            let list: Envelope<UserList> = self
                .http
                .get(format!("{}/api/users", self.base_url))
                .bearer_auth(&self.token)
                .query(&[("size", PAGE_SIZE), ("start", PAGE_SIZE * page + 1)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if list.response.users.is_empty() {
                break;
            }
            users.extend(list.response.users);
        }
        Ok(users)
    }

    /// Аккаунты с реальным подключением (без пробных).
    pub async fn connected_users(&self) -> Result<Vec<PanelUser>, anyhow::Error> {
        Ok(self
            .all_users()
            .await?
            .into_iter()
            .filter(PanelUser::is_connected)
            .collect())
    }

    pub async fn update_squads(
        &self,
        uuid: &str,
        squads: &[String],
    ) -> Result<(), anyhow::Error> {
        self.http
            .patch(format!("{}/api/users", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({ "uuid": uuid, "activeInternalSquads": squads }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn short_id_is_stable_and_distinct_for_white() {
        let regular = client_short_id(123456789, false);
        let white = client_short_id(123456789, true);
        assert_eq!(regular.len(), 9);
        assert_eq!(white.len(), 9);
        assert_ne!(regular, white);
        assert_eq!(regular, client_short_id(123456789, false));
    }

    #[test]
    fn username_gets_white_suffix() {
        assert_eq!(panel_username(42, false), "42");
        assert_eq!(panel_username(42, true), "42_white");
    }

    #[test]
    fn expired_account_restarts_from_now() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let expired = Some(now - Duration::days(3));
        let (expiry, restarted) = extended_expiry(expired, now, 30);
        assert!(restarted);
        assert_eq!(expiry, now + Duration::days(30));
    }

    #[test]
    fn active_account_extends_current_expiry() {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let current = now + Duration::days(10);
        let (expiry, restarted) = extended_expiry(Some(current), now, 30);
        assert!(!restarted);
        assert_eq!(expiry, current + Duration::days(30));
    }

    #[test]
    fn panel_time_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let formatted = format_panel_time(dt);
        assert_eq!(formatted, "2026-01-02T03:04:05.000Z");
        assert_eq!(parse_panel_time(&formatted), Some(dt));
    }

    #[test]
    fn msk_formatting_shifts_three_hours() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 2, 22, 30, 0).unwrap();
        assert_eq!(format_msk(dt), "03-01-2026 01:30 МСК");
    }

    #[test]
    fn squad_ref_accepts_both_shapes() {
        let refs: Vec<SquadRef> =
            serde_json::from_str(r#"[{"uuid": "a"}, "b"]"#).unwrap();
        let uuids: Vec<&str> = refs.iter().map(SquadRef::uuid).collect();
        assert_eq!(uuids, vec!["a", "b"]);
    }

    #[test]
    fn trial_accounts_are_not_connected() {
        let user: PanelUser = serde_json::from_value(serde_json::json!({
            "uuid": "u",
            "username": "1",
            "status": "ACTIVE",
            "firstConnectedAt": "2026-01-01T00:00:00.000Z",
            "description": TRIAL_DESCRIPTION,
        }))
        .unwrap();
        assert!(!user.is_connected());

        let user: PanelUser = serde_json::from_value(serde_json::json!({
            "uuid": "u",
            "username": "1",
            "status": "ACTIVE",
            "firstConnectedAt": "2026-01-01T00:00:00.000Z",
            "description": "New user",
        }))
        .unwrap();
        assert!(user.is_connected());
    }
}
