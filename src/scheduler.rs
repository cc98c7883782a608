//! Фоновые задачи: напоминания, сверка подключений, опрос платёжных
//! шлюзов, онбординг-пуши и суточная статистика.

use crate::bot::handlers::BotState;
use crate::bot::{keyboards, texts};
use crate::db::{
    INVOICE_EXPIRED, INVOICE_PAID, PAYMENT_CANCELED, PAYMENT_CONFIRMED, ShopUser,
    current_unix_timestamp,
};
use crate::payments::fulfill::process_confirmed_payment;
use crate::payments::payload::PaymentPayload;
use chrono::{DateTime, Utc};
use std::time::Duration;
use teloxide::prelude::*;

const REMINDER_EVERY: Duration = Duration::from_secs(3 * 3600);
const CONNECT_SYNC_EVERY: Duration = Duration::from_secs(14 * 60);
const GATEWAY_POLL_EVERY: Duration = Duration::from_secs(60);
const PUSH_EVERY: Duration = Duration::from_secs(30 * 60);
const DAILY_STATS_EVERY: Duration = Duration::from_secs(30 * 60);

/// Повторное напоминание об истёкшей подписке, раз в неделю.
const EXPIRED_RENOTIFY_SECS: i64 = 7 * 86_400;

pub fn spawn_jobs(bot: Bot, state: BotState) {
    spawn_loop("reminders", REMINDER_EVERY, bot.clone(), state.clone(), run_reminders);
    spawn_loop("connect_sync", CONNECT_SYNC_EVERY, bot.clone(), state.clone(), run_connect_sync);
    spawn_loop("platega_poll", GATEWAY_POLL_EVERY, bot.clone(), state.clone(), run_platega_poll);
    spawn_loop("cryptobot_poll", GATEWAY_POLL_EVERY, bot.clone(), state.clone(), run_cryptobot_poll);
    spawn_loop("onboarding_push", PUSH_EVERY, bot.clone(), state.clone(), run_onboarding_push);
    spawn_loop("daily_stats", DAILY_STATS_EVERY, bot, state, run_daily_stats);
}

fn spawn_loop<F, Fut>(name: &'static str, every: Duration, bot: Bot, state: BotState, job: F)
where
    F: Fn(Bot, BotState) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), anyhow::Error>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(error) = job(bot.clone(), state.clone()).await {
                tracing::error!(job = name, error = %error, "Фоновая задача завершилась ошибкой");
            }
        }
    });
}

/// Помечает пользователя удалённым, если Telegram сообщил о блокировке.
async fn note_send_failure(state: &BotState, user_id: i64, error: &teloxide::RequestError) {
    let description = error.to_string();
    if description.contains("blocked") || description.contains("Forbidden") {
        if let Err(db_error) = state.db.set_deleted(user_id, true).await {
            tracing::warn!(user_id = user_id, error = %db_error, "Не удалось пометить блокировку");
        }
    }
}

// ---- напоминания о сроке подписки ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReminderKind {
    DaysLeft(i64),
    Expired,
}

/// Какое напоминание положено при таком сроке. Считаем по календарным
/// суткам UTC: подписка до завтрашнего утра — это «остался 1 день»,
/// а не «заканчивается сегодня».
fn reminder_kind(end: i64, now: i64) -> Option<ReminderKind> {
    let end_day = DateTime::<Utc>::from_timestamp(end, 0)?.date_naive();
    let today = DateTime::<Utc>::from_timestamp(now, 0)?.date_naive();
    match (end_day - today).num_days() {
        days @ (0 | 1 | 3 | 7) => Some(ReminderKind::DaysLeft(days)),
        days if days < 0 => Some(ReminderKind::Expired),
        _ => None,
    }
}

/// Истёкшим напоминаем не чаще раза в неделю.
fn expired_renotify_due(last_notification: Option<i64>, now: i64) -> bool {
    last_notification.is_none_or(|last| now - last >= EXPIRED_RENOTIFY_SECS)
}

async fn run_reminders(bot: Bot, state: BotState) -> Result<(), anyhow::Error> {
    let now = current_unix_timestamp()?;
    let users = state.db.dump_users().await?;
    let mut sent = 0usize;
    let mut failed = 0usize;

    for user in &users {
        if user.is_delete {
            continue;
        }
        let Some(end) = user.subscription_end else {
            continue;
        };
        let text = match reminder_kind(end, now) {
            Some(ReminderKind::DaysLeft(days)) => {
                if state.db.notification_sent_today(user.user_id).await? {
                    continue;
                }
                texts::reminder_days_left(days)
            }
            Some(ReminderKind::Expired) => {
                let last = state.db.last_notification_at(user.user_id).await?;
                if !expired_renotify_due(last, now) {
                    continue;
                }
                texts::REMINDER_EXPIRED.to_string()
            }
            None => continue,
        };

        match bot
            .send_message(ChatId(user.user_id), text)
            .reply_markup(keyboards::single_buy())
            .await
        {
            Ok(_) => {
                sent += 1;
                state.db.mark_notification_sent(user.user_id).await?;
            }
            Err(error) => {
                failed += 1;
                note_send_failure(&state, user.user_id, &error).await;
                tracing::warn!(user_id = user.user_id, error = %error, "Напоминание не доставлено");
            }
        }
    }

    tracing::info!(sent = sent, failed = failed, "Цикл напоминаний завершён");
    crate::bot::handlers::notify_report_chat(
        &bot,
        &state,
        &format!("⏰ Напоминания о подписке: отправлено {}, ошибок {}", sent, failed),
    )
    .await;
    Ok(())
}

// ---- сверка подключившихся с панелью ----

async fn run_connect_sync(_bot: Bot, state: BotState) -> Result<(), anyhow::Error> {
    let connected = state.panel.connected_users().await?;
    let mut updated = 0usize;
    for user in &connected {
        let Some(tg_id) = user.telegram_id else {
            continue;
        };
        state.db.set_connected(tg_id, true).await?;
        updated += 1;
    }
    tracing::debug!(connected = updated, "Сверка подключений завершена");
    Ok(())
}

// ---- опрос платёжных шлюзов ----

async fn run_platega_poll(bot: Bot, state: BotState) -> Result<(), anyhow::Error> {
    for payment in state.db.pending_platega_payments().await? {
        let tx = match state.platega.transaction_status(&payment.transaction_id).await {
            Ok(tx) => tx,
            Err(error) => {
                tracing::warn!(
                    transaction_id = %payment.transaction_id,
                    error = %error,
                    "Platega: не удалось получить статус"
                );
                continue;
            }
        };

        match tx.status.as_str() {
            "confirmed" => {
                state
                    .db
                    .set_platega_status(&payment.transaction_id, PAYMENT_CONFIRMED)
                    .await?;
                let Some(raw_payload) = tx.payload else {
                    tracing::error!(
                        transaction_id = %payment.transaction_id,
                        "Platega: подтверждённый платёж без payload"
                    );
                    continue;
                };
                match PaymentPayload::parse(&raw_payload) {
                    Ok(payload) => {
                        if let Err(error) = process_confirmed_payment(&bot, &state, &payload).await
                        {
                            tracing::error!(
                                transaction_id = %payment.transaction_id,
                                error = %error,
                                "Platega: зачисление не удалось"
                            );
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            transaction_id = %payment.transaction_id,
                            error = %error,
                            "Platega: некорректный payload"
                        );
                    }
                }
            }
            "canceled" | "expired" | "failed" => {
                state
                    .db
                    .set_platega_status(&payment.transaction_id, PAYMENT_CANCELED)
                    .await?;
                if let Err(error) = bot
                    .send_message(ChatId(payment.user_id), texts::PAYMENT_CANCELED)
                    .reply_markup(keyboards::retry_payment())
                    .await
                {
                    note_send_failure(&state, payment.user_id, &error).await;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

async fn run_cryptobot_poll(bot: Bot, state: BotState) -> Result<(), anyhow::Error> {
    for payment in state.db.active_cryptobot_payments().await? {
        let status = match state.cryptobot.invoice_status(payment.invoice_id).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::warn!(invoice_id = payment.invoice_id, "CryptoBot: инвойс пропал из выдачи");
                continue;
            }
            Err(error) => {
                tracing::warn!(
                    invoice_id = payment.invoice_id,
                    error = %error,
                    "CryptoBot: не удалось получить статус"
                );
                continue;
            }
        };

        match status.as_str() {
            "paid" => {
                state.db.set_cryptobot_status(payment.invoice_id, INVOICE_PAID).await?;
                match PaymentPayload::parse(&payment.payload) {
                    Ok(payload) => {
                        if let Err(error) = process_confirmed_payment(&bot, &state, &payload).await
                        {
                            tracing::error!(
                                invoice_id = payment.invoice_id,
                                error = %error,
                                "CryptoBot: зачисление не удалось"
                            );
                        }
                    }
                    Err(error) => {
                        tracing::error!(
                            invoice_id = payment.invoice_id,
                            error = %error,
                            "CryptoBot: некорректный payload"
                        );
                    }
                }
            }
            "expired" => {
                state
                    .db
                    .set_cryptobot_status(payment.invoice_id, INVOICE_EXPIRED)
                    .await?;
                if let Err(error) = bot
                    .send_message(ChatId(payment.user_id), texts::PAYMENT_CANCELED)
                    .reply_markup(keyboards::retry_payment())
                    .await
                {
                    note_send_failure(&state, payment.user_id, &error).await;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ---- онбординг-пуши ----

/// Окна после регистрации, в секундах; ширина окна равна периоду тика,
/// поэтому каждый пуш уходит не больше одного раза.
const PUSH_WINDOWS: [(i64, i64); 3] = [
    (30 * 60, 60 * 60),
    (3 * 3600, 3 * 3600 + 30 * 60),
    (24 * 3600, 24 * 3600 + 30 * 60),
];

fn push_window(user: &ShopUser, now: i64) -> Option<usize> {
    let age = now - user.created_at;
    PUSH_WINDOWS
        .iter()
        .position(|(from, to)| age >= *from && age < *to)
}

async fn run_onboarding_push(bot: Bot, state: BotState) -> Result<(), anyhow::Error> {
    let now = current_unix_timestamp()?;
    let users = state.db.dump_users().await?;
    let mut sent = 0usize;
    let mut failed = 0usize;

    for user in &users {
        if user.is_delete {
            continue;
        }
        let Some(window) = push_window(user, now) else {
            continue;
        };
        let (text, keyboard) = if !user.is_paid {
            (texts::push_not_subscribed(window), keyboards::single_trial())
        } else if !user.is_connected {
            (texts::push_not_connected(window), keyboards::single_connect())
        } else {
            continue;
        };

        match bot
            .send_message(ChatId(user.user_id), text)
            .reply_markup(keyboard)
            .await
        {
            Ok(_) => sent += 1,
            Err(error) => {
                failed += 1;
                note_send_failure(&state, user.user_id, &error).await;
                tracing::warn!(user_id = user.user_id, error = %error, "Пуш не доставлен");
            }
        }
    }

    tracing::info!(sent = sent, failed = failed, "Цикл онбординг-пушей завершён");
    crate::bot::handlers::notify_report_chat(
        &bot,
        &state,
        &format!("📨 Онбординг-пуши: отправлено {}, ошибок {}", sent, failed),
    )
    .await;
    Ok(())
}

// ---- суточная статистика онлайна ----

async fn run_daily_stats(_bot: Bot, state: BotState) -> Result<(), anyhow::Error> {
    let now = Utc::now();
    let today = now.date_naive();
    let day = today.format("%Y-%m-%d").to_string();
    if state.db.has_online_stats_for(&day).await? {
        return Ok(());
    }

    let users = state.panel.all_users().await?;
    let mut active_today = 0i64;
    let mut paying = 0i64;
    let mut trial = 0i64;
    for user in &users {
        if !user.connected_today(today) {
            continue;
        }
        active_today += 1;
        let days_left = user
            .expires_at()
            .map(|expiry| (expiry - now).num_days())
            .unwrap_or(0);
        if days_left > 5 {
            paying += 1;
        } else {
            trial += 1;
        }
    }

    state
        .db
        .add_online_stats(&day, users.len() as i64, active_today, paying, trial)
        .await?;
    tracing::info!(day = %day, total = users.len(), active_today = active_today, "Суточная статистика записана");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(created_at: i64) -> ShopUser {
        ShopUser {
            id: 1,
            user_id: 1,
            ref_id: None,
            stamp: None,
            ttclid: None,
            is_delete: false,
            is_paid: false,
            is_connected: false,
            in_channel: true,
            created_at,
            subscription_end: None,
            white_subscription_end: None,
            last_notification_at: None,
            last_broadcast_status: None,
            last_broadcast_at: None,
        }
    }

    fn ts(date: &str, time: &str) -> i64 {
        chrono::NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
            .timestamp()
    }

    #[test]
    fn reminder_fires_only_on_named_day_buckets() {
        let now = ts("2026-08-27", "12:00");
        assert_eq!(
            reminder_kind(ts("2026-08-27", "23:00"), now),
            Some(ReminderKind::DaysLeft(0))
        );
        assert_eq!(
            reminder_kind(ts("2026-08-28", "12:00"), now),
            Some(ReminderKind::DaysLeft(1))
        );
        assert_eq!(
            reminder_kind(ts("2026-08-30", "12:00"), now),
            Some(ReminderKind::DaysLeft(3))
        );
        assert_eq!(
            reminder_kind(ts("2026-09-03", "12:00"), now),
            Some(ReminderKind::DaysLeft(7))
        );
        assert_eq!(reminder_kind(ts("2026-08-29", "12:00"), now), None);
        assert_eq!(reminder_kind(ts("2026-09-10", "12:00"), now), None);
        assert_eq!(
            reminder_kind(ts("2026-08-26", "12:00"), now),
            Some(ReminderKind::Expired)
        );
    }

    #[test]
    fn reminder_counts_calendar_days_not_rolling_spans() {
        // До конца меньше суток, но это завтрашний день — ещё не «сегодня».
        let now = ts("2026-08-27", "23:00");
        assert_eq!(
            reminder_kind(ts("2026-08-28", "08:00"), now),
            Some(ReminderKind::DaysLeft(1))
        );
        // Срок сегодня утром уже прошёл, но день ещё тот же.
        assert_eq!(
            reminder_kind(ts("2026-08-27", "08:00"), now),
            Some(ReminderKind::DaysLeft(0))
        );
    }

    #[test]
    fn expired_renotify_waits_a_week() {
        let now = 10_000_000;
        assert!(expired_renotify_due(None, now));
        assert!(!expired_renotify_due(Some(now - 6 * 86_400), now));
        assert!(expired_renotify_due(Some(now - 7 * 86_400), now));
        assert!(expired_renotify_due(Some(now - 30 * 86_400), now));
    }

    #[test]
    fn push_windows_cover_half_hour_three_hours_and_day() {
        let now = 1_000_000;
        assert_eq!(push_window(&user(now - 10 * 60), now), None);
        assert_eq!(push_window(&user(now - 45 * 60), now), Some(0));
        assert_eq!(push_window(&user(now - 2 * 3600), now), None);
        assert_eq!(push_window(&user(now - 3 * 3600 - 60), now), Some(1));
        assert_eq!(push_window(&user(now - 24 * 3600 - 60), now), Some(2));
        assert_eq!(push_window(&user(now - 48 * 3600), now), None);
    }
}
