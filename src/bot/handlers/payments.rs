//! Апдейты платёжного цикла Telegram Stars и блокировки бота.

use super::shared::HandlerResult;
use super::state::{BotState, sender_user_id};
use crate::payments::fulfill::process_confirmed_payment;
use crate::payments::payload::PaymentPayload;
use teloxide::prelude::*;
use teloxide::types::ChatMemberUpdated;

/// Stars: подтверждаем все pre-checkout, суммы фиксированы инвойсом.
pub async fn handle_pre_checkout(bot: Bot, q: PreCheckoutQuery) -> HandlerResult {
    bot.answer_pre_checkout_query(q.id.clone(), true).await?;
    Ok(())
}

pub async fn handle_successful_payment(bot: Bot, msg: Message, state: BotState) -> HandlerResult {
    let Some(payment) = msg.successful_payment() else {
        return Ok(());
    };
    let Some(user_id) = sender_user_id(&msg) else {
        return Ok(());
    };

    let payload = match PaymentPayload::parse(&payment.invoice_payload) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::error!(
                user_id = user_id,
                payload = %payment.invoice_payload,
                error = %error,
                "Stars: не удалось разобрать payload оплаченного инвойса"
            );
            return Ok(());
        }
    };

    state
        .db
        .add_stars_payment(user_id, payment.total_amount as i64)
        .await?;
    tracing::info!(
        user_id = user_id,
        amount = payment.total_amount,
        "Stars: платёж подтверждён"
    );
    process_confirmed_payment(&bot, &state, &payload).await?;
    Ok(())
}

/// Пользователь заблокировал или разблокировал бота.
pub async fn handle_my_chat_member(upd: ChatMemberUpdated, state: BotState) -> HandlerResult {
    let user_id = upd.from.id.0 as i64;
    let kind = &upd.new_chat_member.kind;
    if kind.is_banned() || kind.is_left() {
        state.db.set_deleted(user_id, true).await?;
        tracing::info!(user_id = user_id, "Пользователь заблокировал бота");
    } else if kind.is_member() {
        state.db.set_deleted(user_id, false).await?;
        tracing::info!(user_id = user_id, "Пользователь вернулся к боту");
    }
    Ok(())
}
