use super::format::{render_online_report, render_user_card};
use super::shared::{HandlerResult, is_channel_member, notify_report_chat, show_start_menu};
use super::state::{BotState, is_admin_message, sender_user_id};
use crate::db::{BROADCAST_FAILED, BROADCAST_SENT, GiftActivationError};
use crate::panel::format_msk;
use crate::payments::fulfill::grant_plan;
use chrono::{Datelike, NaiveDateTime, TimeZone, Utc};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum BotCommand {
    #[command(description = "Начать работу с ботом")]
    Start,
    #[command(description = "Карточка пользователя (админ)")]
    User,
    #[command(description = "Задать срок подписки (админ)")]
    Sub,
    #[command(description = "Удалить пользователя (админ)")]
    Delete,
    #[command(description = "Онлайн панели (админ)")]
    Online,
    #[command(description = "Перераспределить сквады (админ)")]
    Rebalance,
    #[command(description = "Статистика по источнику (админ)")]
    Stat,
    #[command(description = "Аналитика за месяц (админ)")]
    Anal,
    #[command(description = "Рассылка по сегменту (админ)")]
    Broadcast,
    #[command(description = "Выгрузка таблиц в CSV (админ)")]
    Export,
}

pub fn handler()
-> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    teloxide::filter_command::<BotCommand, _>()
        .branch(dptree::case![BotCommand::Start].endpoint(cmd_start))
        .branch(dptree::case![BotCommand::User].endpoint(cmd_user))
        .branch(dptree::case![BotCommand::Sub].endpoint(cmd_sub))
        .branch(dptree::case![BotCommand::Delete].endpoint(cmd_delete))
        .branch(dptree::case![BotCommand::Online].endpoint(cmd_online))
        .branch(dptree::case![BotCommand::Rebalance].endpoint(cmd_rebalance))
        .branch(dptree::case![BotCommand::Stat].endpoint(cmd_stat))
        .branch(dptree::case![BotCommand::Anal].endpoint(cmd_anal))
        .branch(dptree::case![BotCommand::Broadcast].endpoint(cmd_broadcast))
        .branch(dptree::case![BotCommand::Export].endpoint(cmd_export))
}

/// Аргументы команды без самого слова команды.
fn command_args(msg: &Message) -> Vec<String> {
    msg.text()
        .unwrap_or_default()
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect()
}

// ---- /start и deep-link сценарии ----

async fn cmd_start(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };
    let arg = command_args(&msg).into_iter().next().unwrap_or_default();
    let arg = arg.trim();

    if let Some(gift_id) = arg.strip_prefix("gift_") {
        state.db.register_user(user_id, None, None).await?;
        return activate_gift(&bot, &msg, &state, user_id, gift_id).await;
    }

    if let Some(raw_ref) = arg.strip_prefix("ref") {
        let referrer = raw_ref.parse::<i64>().ok().filter(|id| *id != user_id);
        state.db.register_user(user_id, referrer, None).await?;
    } else if let Some(click_id) = arg.strip_prefix("ttclid_") {
        let created = state.db.register_user(user_id, None, None).await?;
        if created {
            // Рекламная площадка экранирует точки в click id подчёркиваниями.
            let click_id = click_id.replace('_', ".");
            state
                .db
                .set_ttclid(user_id, &click_id, &state.config.ad_stamp)
                .await?;
        }
    } else if !arg.is_empty() {
        state.db.register_user(user_id, None, Some(arg)).await?;
    } else {
        state.db.register_user(user_id, None, None).await?;
    }

    let in_channel = state
        .db
        .get_user(user_id)
        .await?
        .is_some_and(|user| user.in_channel);
    if !in_channel {
        bot.send_message(msg.chat.id, crate::bot::texts::TO_CHANNEL)
            .reply_markup(crate::bot::keyboards::channel_gate(&state.config.channel_url))
            .await?;
        return Ok(());
    }

    show_start_menu(&bot, msg.chat.id, &state, user_id).await
}

async fn activate_gift(
    bot: &Bot,
    msg: &Message,
    state: &BotState,
    user_id: i64,
    gift_id: &str,
) -> HandlerResult {
    let gift = match state.db.activate_gift(gift_id, user_id).await {
        Ok(gift) => gift,
        Err(GiftActivationError::NotFound) | Err(GiftActivationError::AlreadyUsed) => {
            bot.send_message(msg.chat.id, crate::bot::texts::GIFT_USED)
                .await?;
            return Ok(());
        }
        Err(GiftActivationError::Db(error)) => return Err(error.into()),
    };

    let user = grant_plan(state, user_id, gift.duration, gift.white, false).await?;
    state.db.set_paid(user_id).await?;
    let expires = user
        .expires_at()
        .map(format_msk)
        .unwrap_or_else(|| "-".to_string());
    let link = user.subscription_url.as_deref();
    let keyboard = if gift.white {
        crate::bot::keyboards::subscription_links(None, link)
    } else {
        crate::bot::keyboards::subscription_links(link, None)
    };
    bot.send_message(
        msg.chat.id,
        crate::bot::texts::gift_activated(gift.duration, &expires),
    )
    .reply_markup(keyboard)
    .await?;
    tracing::info!(
        user_id = user_id,
        gift_id = %gift.gift_id,
        duration = gift.duration,
        "Подарок активирован"
    );
    Ok(())
}

/// Проверка подписки на канал по кнопке «Проверить подписку».
pub async fn confirm_channel_membership(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
) -> HandlerResult {
    if is_channel_member(bot, state, user_id).await {
        state.db.set_in_channel(user_id).await?;
        show_start_menu(bot, chat_id, state, user_id).await?;
    } else {
        bot.send_message(chat_id, crate::bot::texts::TO_CHANNEL)
            .reply_markup(crate::bot::keyboards::channel_gate(&state.config.channel_url))
            .await?;
    }
    Ok(())
}

// ---- админские команды ----

async fn cmd_user(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let args = command_args(&msg);
    let Some(user_id) = args.first().and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "Использование: /user <id>").await?;
        return Ok(());
    };
    let Some(user) = state.db.get_user(user_id).await? else {
        bot.send_message(msg.chat.id, format!("Пользователь {} не найден", user_id))
            .await?;
        return Ok(());
    };

    let mut card = render_user_card(&user);
    match state.panel.users_by_telegram_id(user_id).await {
        Ok(accounts) if !accounts.is_empty() => {
            card.push_str("\n\nАккаунты в панели:");
            for account in &accounts {
                card.push_str(&format!(
                    "\n{} — до {}, подключался: {}",
                    account.username,
                    account
                        .expires_at()
                        .map(format_msk)
                        .unwrap_or_else(|| "—".to_string()),
                    if account.is_connected() { "да" } else { "нет" },
                ));
            }
        }
        Ok(_) => card.push_str("\n\nАккаунтов в панели нет"),
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Панель не отдала аккаунты");
        }
    }
    bot.send_message(msg.chat.id, card).await?;
    Ok(())
}

const SUB_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

fn parse_sub_datetime(raw: &str) -> Option<i64> {
    SUB_DATE_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(raw, format)
            .ok()
            .map(|dt| dt.and_utc().timestamp())
    })
}

async fn cmd_sub(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let args = command_args(&msg);
    let usage = "Использование: /sub <id> <дата и время>, например /sub 123 2026-12-31 23:59";
    let Some(user_id) = args.first().and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };
    let raw_date = args[1..].join(" ");
    let Some(ts) = parse_sub_datetime(&raw_date) else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };

    state.db.set_subscription_end(user_id, ts).await?;
    let stored = state.db.subscription_end(user_id).await?;
    bot.send_message(
        msg.chat.id,
        format!(
            "Срок подписки пользователя {} обновлён: {}",
            user_id,
            stored
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(format_msk)
                .unwrap_or_else(|| "—".to_string())
        ),
    )
    .await?;
    Ok(())
}

async fn cmd_delete(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let args = command_args(&msg);
    let Some(user_id) = args.first().and_then(|raw| raw.parse::<i64>().ok()) else {
        bot.send_message(msg.chat.id, "Использование: /delete <id>").await?;
        return Ok(());
    };
    let deleted = state.db.delete_user(user_id).await?;
    let text = if deleted {
        format!("Пользователь {} удалён из БД", user_id)
    } else {
        format!("Пользователь {} не найден", user_id)
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn cmd_online(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let users = state.panel.all_users().await?;
    let now = Utc::now();
    let today = now.date_naive();

    let mut active_today = 0usize;
    let mut paying = 0usize;
    let mut trial = 0usize;
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

    bot.send_message(
        msg.chat.id,
        render_online_report(
            &today.format("%Y-%m-%d").to_string(),
            users.len(),
            active_today,
            paying,
            trial,
        ),
    )
    .await?;
    Ok(())
}

async fn cmd_rebalance(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let users = state.panel.all_users().await?;
    let mut moved = 0usize;
    let mut failed = 0usize;
    for user in &users {
        if user.username.ends_with("_white") || user.first_connected_at.is_none() {
            continue;
        }
        let Some(squad) = state.panel.random_squad() else {
            break;
        };
        match state.panel.update_squads(&user.uuid, &[squad]).await {
            Ok(()) => moved += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(username = %user.username, error = %error, "Не удалось сменить сквад");
            }
        }
        // Не душим панель пачкой PATCH-запросов.
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    }
    bot.send_message(
        msg.chat.id,
        format!("Сквады обновлены: {} аккаунтов, ошибок {}", moved, failed),
    )
    .await?;
    Ok(())
}

async fn cmd_stat(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let args = command_args(&msg);
    let Some(source) = args.first() else {
        bot.send_message(msg.chat.id, "Использование: /stat <ref или метка>")
            .await?;
        return Ok(());
    };
    match state.db.source_stats(source).await? {
        Some(stats) => {
            bot.send_message(
                msg.chat.id,
                format!(
                    "{}\nВсего: {}\nС подпиской: {}\nПодключились: {}\nВыручка: {} руб",
                    source, stats.total, stats.with_sub, stats.connected, stats.revenue_rub
                ),
            )
            .await?;
        }
        None => {
            bot.send_message(msg.chat.id, format!("{} — нет совпадений", source))
                .await?;
        }
    }
    Ok(())
}

async fn cmd_anal(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let now = Utc::now();
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("Не удалось вычислить начало месяца"))?;
    let from = month_start.timestamp();
    let to = now.timestamp();

    let users = state.db.users_created_between(from, to).await?;
    let rub = state.db.confirmed_rub_between(from, to).await?;
    let stars = state.db.confirmed_stars_between(from, to).await?;
    let crypto = state.db.paid_crypto_between(from, to).await?;
    let gifts = state.db.gifts_created_between(from, to).await?;

    let report = crate::stats::build_monthly_report(
        &users,
        &rub,
        &stars,
        &crypto,
        gifts,
        &state.config.campaign_refs,
        month_start,
        now,
    );
    let month_label = now.format("%m.%Y").to_string();
    bot.send_message(
        msg.chat.id,
        crate::stats::render_monthly_report(&report, &month_label),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

const BROADCAST_SEGMENTS: &str = "Сегменты: all, not_connected_subscribed, not_connected_expired, \
connected_expired, connected_subscribed, not_subscribed";

async fn cmd_broadcast(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let args = command_args(&msg);
    let usage = format!("Использование: /broadcast <сегмент> <текст>\n{}", BROADCAST_SEGMENTS);
    let Some(segment) = args.first().cloned() else {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    };
    let text = args[1..].join(" ");
    if text.is_empty() {
        bot.send_message(msg.chat.id, usage).await?;
        return Ok(());
    }

    let (user_ids, keyboard) = match segment.as_str() {
        "all" => (
            state.db.list_active_users().await?,
            crate::bot::keyboards::single_promo_120(),
        ),
        "not_connected_subscribed" => (
            state.db.segment_not_connected_subscribed().await?,
            crate::bot::keyboards::single_connect(),
        ),
        "not_connected_expired" => (
            state.db.segment_not_connected_expired().await?,
            crate::bot::keyboards::single_buy(),
        ),
        "connected_expired" => (
            state.db.segment_connected_expired().await?,
            crate::bot::keyboards::single_promo_120(),
        ),
        "connected_subscribed" => (
            state.db.segment_connected_subscribed().await?,
            crate::bot::keyboards::single_promo_120(),
        ),
        "not_subscribed" => (
            state.db.segment_not_subscribed().await?,
            crate::bot::keyboards::single_trial(),
        ),
        _ => {
            bot.send_message(msg.chat.id, usage).await?;
            return Ok(());
        }
    };

    tracing::info!(segment = %segment, recipients = user_ids.len(), "Запуск рассылки");
    let mut sent = 0usize;
    let mut failed = 0usize;
    for user_id in &user_ids {
        match bot
            .send_message(ChatId(*user_id), text.clone())
            .reply_markup(keyboard.clone())
            .await
        {
            Ok(_) => {
                sent += 1;
                state.db.set_broadcast_status(*user_id, BROADCAST_SENT).await?;
            }
            Err(error) => {
                failed += 1;
                state.db.set_broadcast_status(*user_id, BROADCAST_FAILED).await?;
                let description = error.to_string();
                if description.contains("blocked") || description.contains("Forbidden") {
                    state.db.set_deleted(*user_id, true).await?;
                }
                tracing::warn!(user_id = *user_id, error = %error, "Рассылка: не доставлено");
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    let summary = format!(
        "Рассылка по сегменту {}: отправлено {}, ошибок {}",
        segment, sent, failed
    );
    notify_report_chat(&bot, &state, &summary).await;
    bot.send_message(msg.chat.id, summary).await?;
    Ok(())
}

async fn cmd_export(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    if !is_admin_message(&msg, &state) {
        return Ok(());
    }
    let files = crate::export::export_all(&state.db).await?;
    for file in files {
        bot.send_document(
            msg.chat.id,
            InputFile::memory(file.bytes).file_name(file.name),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_accepts_all_four_formats() {
        assert!(parse_sub_datetime("2026-12-31 23:59:59").is_some());
        assert!(parse_sub_datetime("2026-12-31 23:59").is_some());
        assert!(parse_sub_datetime("31.12.2026 23:59:59").is_some());
        assert!(parse_sub_datetime("31.12.2026 23:59").is_some());
        assert!(parse_sub_datetime("31/12/2026").is_none());
        assert_eq!(
            parse_sub_datetime("2026-12-31 23:59"),
            parse_sub_datetime("31.12.2026 23:59")
        );
    }
}
