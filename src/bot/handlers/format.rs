use crate::db::ShopUser;
use crate::panel::{SubscriptionStatus, format_msk};
use chrono::{DateTime, Local, Utc};

pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string()
        })
        .unwrap_or_else(|| format!("Некорректный timestamp: {}", ts))
}

pub fn format_opt_timestamp(ts: Option<i64>) -> String {
    ts.map(format_timestamp).unwrap_or_else(|| "—".to_string())
}

/// Карточка пользователя для админской команды /user.
pub fn render_user_card(user: &ShopUser) -> String {
    format!(
        "👤 Пользователь {}\n\
         id: {}\n\
         ref: {}\n\
         stamp: {}\n\
         ttclid: {}\n\
         удалён: {}\n\
         платил: {}\n\
         подключался: {}\n\
         в канале: {}\n\
         зарегистрирован: {}\n\
         подписка до: {}\n\
         white до: {}\n\
         последнее напоминание: {}\n\
         последняя рассылка: {} ({})",
        user.user_id,
        user.id,
        user.ref_id.as_deref().unwrap_or("—"),
        user.stamp.as_deref().unwrap_or("—"),
        user.ttclid.as_deref().unwrap_or("—"),
        yes_no(user.is_delete),
        yes_no(user.is_paid),
        yes_no(user.is_connected),
        yes_no(user.in_channel),
        format_timestamp(user.created_at),
        format_opt_timestamp(user.subscription_end),
        format_opt_timestamp(user.white_subscription_end),
        format_opt_timestamp(user.last_notification_at),
        format_opt_timestamp(user.last_broadcast_at),
        user.last_broadcast_status.as_deref().unwrap_or("—"),
    )
}

fn yes_no(value: bool) -> &'static str {
    if value { "да" } else { "нет" }
}

/// Пара «статус / срок» для раздела покупки.
pub fn subscription_state(status: &SubscriptionStatus) -> (String, String) {
    if !status.exists {
        return (crate::bot::texts::SUB_MISSING.to_string(), "-".to_string());
    }
    let label = if status.active {
        crate::bot::texts::SUB_ACTIVE
    } else {
        crate::bot::texts::SUB_INACTIVE
    };
    let time = status
        .expires_at
        .map(format_msk)
        .unwrap_or_else(|| "-".to_string());
    (label.to_string(), time)
}

pub fn render_online_report(
    day: &str,
    panel_total: usize,
    active_today: usize,
    paying: usize,
    trial: usize,
) -> String {
    format!(
        "📡 Онлайн за {}\n\
         Всего в панели: {}\n\
         Подключались сегодня: {}\n\
         Из них платных: {}\n\
         Из них пробных: {}",
        day, panel_total, active_today, paying, trial
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::SubscriptionStatus;
    use chrono::TimeZone;

    #[test]
    fn missing_subscription_renders_search_label() {
        let (label, time) = subscription_state(&SubscriptionStatus {
            exists: false,
            active: false,
            expires_at: None,
        });
        assert_eq!(label, crate::bot::texts::SUB_MISSING);
        assert_eq!(time, "-");
    }

    #[test]
    fn active_subscription_renders_msk_expiry() {
        let expiry = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let (label, time) = subscription_state(&SubscriptionStatus {
            exists: true,
            active: true,
            expires_at: Some(expiry),
        });
        assert_eq!(label, crate::bot::texts::SUB_ACTIVE);
        assert_eq!(time, "10-03-2026 15:00 МСК");
    }
}
