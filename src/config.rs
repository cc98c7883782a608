//! Конфигурация бота: один TOML-файл, путь передаётся первым аргументом.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bot_token: String,
    pub admin_ids: Vec<i64>,
    /// Чат, куда уходят служебные отчёты рассылок и напоминаний.
    pub report_chat_id: i64,
    /// Канал, подписка на который обязательна.
    pub channel_id: i64,
    pub channel_url: String,
    /// Ссылка на бота вида https://t.me/имя_бота.
    pub bot_url: String,
    pub support_url: String,
    pub db_path: PathBuf,
    #[serde(default = "default_trial_days")]
    pub trial_days: i64,
    /// Метка источника для переходов с рекламной площадки (ttclid-ссылки).
    #[serde(default = "default_ad_stamp")]
    pub ad_stamp: String,
    /// Реферальные id, считающиеся рекламным трафиком в аналитике.
    #[serde(default)]
    pub campaign_refs: Vec<String>,
    pub panel: PanelConfig,
    pub platega: PlategaConfig,
    pub cryptobot: CryptoBotConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanelConfig {
    pub base_url: String,
    pub api_token: String,
    /// Сквады для обычных подписок; при создании выбирается случайный.
    pub squads: Vec<String>,
    /// Сквады для white-подписок.
    pub white_squads: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlategaConfig {
    #[serde(default = "default_platega_url")]
    pub base_url: String,
    pub merchant_id: String,
    pub secret: String,
    pub return_url: String,
    pub failed_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoBotConfig {
    #[serde(default = "default_cryptobot_url")]
    pub base_url: String,
    pub api_token: String,
}

fn default_trial_days() -> i64 {
    5
}

fn default_ad_stamp() -> String {
    "tiktok".to_string()
}

fn default_platega_url() -> String {
    "https://app.platega.io".to_string()
}

fn default_cryptobot_url() -> String {
    "https://pay.crypt.bot/api".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Не удалось прочитать конфиг {}: {}", path.display(), e)
        })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Не удалось разобрать конфиг: {}", e))?;
        if config.panel.squads.is_empty() {
            return Err(anyhow::anyhow!("panel.squads не может быть пустым"));
        }
        if config.panel.white_squads.is_empty() {
            return Err(anyhow::anyhow!("panel.white_squads не может быть пустым"));
        }
        Ok(config)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
            bot_token = "123:abc"
            admin_ids = [1, 2]
            report_chat_id = 42
            channel_id = -100123
            channel_url = "https://t.me/example_channel"
            bot_url = "https://t.me/example_bot"
            support_url = "https://t.me/example_support"
            db_path = "/tmp/shop.db"

            [panel]
            base_url = "https://panel.example.com"
            api_token = "token"
            squads = ["a"]
            white_squads = ["b"]

            [platega]
            merchant_id = "m"
            secret = "s"
            return_url = "https://t.me/example_bot"
            failed_url = "https://t.me/example_bot"

            [cryptobot]
            api_token = "ct"
        "#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config: Config = toml::from_str(sample_toml()).unwrap();
        assert_eq!(config.trial_days, 5);
        assert_eq!(config.platega.base_url, "https://app.platega.io");
        assert_eq!(config.cryptobot.base_url, "https://pay.crypt.bot/api");
        assert!(config.is_admin(1));
        assert!(!config.is_admin(3));
    }
}
