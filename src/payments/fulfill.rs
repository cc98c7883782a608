//! Зачисление подтверждённой оплаты: панель, зеркало сроков, реферальный
//! бонус, сообщение с ссылкой-подпиской.

use super::payload::PaymentPayload;
use crate::bot::handlers::BotState;
use crate::bot::{keyboards, texts};
use crate::panel::{PanelUser, format_msk, panel_username};
use crate::tariff::REFERRAL_BONUS_DAYS;
use teloxide::prelude::*;

/// Выдаёт или продлевает план в панели и зеркалит срок в локальную БД.
pub async fn grant_plan(
    state: &BotState,
    tg_id: i64,
    days: i64,
    white: bool,
    trial: bool,
) -> Result<PanelUser, anyhow::Error> {
    let username = panel_username(tg_id, white);
    let user = match state.panel.user_by_username(&username).await? {
        Some(_) => state.panel.extend_client(&username, days).await?,
        None => state.panel.create_client(tg_id, days, white, trial).await?,
    };

    if let Some(expiry) = user.expires_at() {
        let ts = expiry.timestamp();
        if white {
            state.db.set_white_subscription_end(tg_id, ts).await?;
        } else {
            state.db.set_subscription_end(tg_id, ts).await?;
        }
    }
    Ok(user)
}

/// Обрабатывает подтверждённый платёж из любого источника (СБП, Stars,
/// CryptoBot).
pub async fn process_confirmed_payment(
    bot: &Bot,
    state: &BotState,
    payload: &PaymentPayload,
) -> Result<(), anyhow::Error> {
    tracing::info!(
        user_id = payload.user_id,
        duration = payload.duration,
        white = payload.white,
        gift = payload.gift,
        method = %payload.method,
        amount = %payload.amount,
        "Зачисление подтверждённого платежа"
    );

    if payload.gift {
        let gift_id = state
            .db
            .create_gift(payload.user_id, payload.duration, payload.white)
            .await?;
        let link = format!("{}?start=gift_{}", state.config.bot_url, gift_id);
        bot.send_message(ChatId(payload.user_id), texts::gift_created(&link))
            .await?;
        bot.send_message(ChatId(payload.user_id), texts::GIFT_FAQ)
            .await?;
        return Ok(());
    }

    let user = grant_plan(state, payload.user_id, payload.duration, payload.white, false).await?;
    apply_referral_bonus(bot, state, payload.user_id).await;
    state.db.set_paid(payload.user_id).await?;

    let expires = user
        .expires_at()
        .map(format_msk)
        .unwrap_or_else(|| "-".to_string());
    let link = user.subscription_url.clone().unwrap_or_default();
    let keyboard = if payload.white {
        keyboards::subscription_links(None, user.subscription_url.as_deref())
    } else {
        keyboards::subscription_links(user.subscription_url.as_deref(), None)
    };
    bot.send_message(ChatId(payload.user_id), texts::payment_success(&expires, &link))
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

/// Бонус рефереру за первую оплату приглашённого. Начисляется один раз и
/// только действующим клиентам; любые сбои здесь не валят зачисление.
async fn apply_referral_bonus(bot: &Bot, state: &BotState, payer_id: i64) {
    let result = try_apply_referral_bonus(bot, state, payer_id).await;
    if let Err(error) = result {
        tracing::warn!(payer_id = payer_id, error = %error, "Не удалось начислить реферальный бонус");
    }
}

async fn try_apply_referral_bonus(
    bot: &Bot,
    state: &BotState,
    payer_id: i64,
) -> Result<(), anyhow::Error> {
    let Some(payer) = state.db.get_user(payer_id).await? else {
        return Ok(());
    };
    if payer.is_paid {
        return Ok(());
    }
    let Some(referrer_id) = payer.ref_id.as_deref().and_then(|raw| raw.parse::<i64>().ok())
    else {
        return Ok(());
    };
    let Some(referrer) = state.db.get_user(referrer_id).await? else {
        return Ok(());
    };
    if !referrer.is_paid {
        return Ok(());
    }

    grant_plan(state, referrer_id, REFERRAL_BONUS_DAYS, false, false).await?;
    tracing::info!(
        referrer_id = referrer_id,
        payer_id = payer_id,
        bonus_days = REFERRAL_BONUS_DAYS,
        "Начислен реферальный бонус"
    );
    if let Err(error) = bot.send_message(ChatId(referrer_id), texts::REF_BONUS).await {
        tracing::warn!(referrer_id = referrer_id, error = %error, "Не удалось уведомить реферера");
    }
    Ok(())
}
