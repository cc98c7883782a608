use super::state::BotState;
use crate::panel::{format_msk, panel_username};
use teloxide::prelude::*;
use teloxide::types::UserId;

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub fn callback_exact_filter(
    data: &'static str,
) -> impl Fn(CallbackQuery) -> Option<CallbackQuery> {
    move |q: CallbackQuery| {
        if q.data.as_deref() == Some(data) {
            Some(q)
        } else {
            None
        }
    }
}

pub fn callback_message_target(q: &CallbackQuery) -> Option<(ChatId, teloxide::types::MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}

/// Состоит ли пользователь в обязательном канале.
pub async fn is_channel_member(bot: &Bot, state: &BotState, user_id: i64) -> bool {
    match bot
        .get_chat_member(ChatId(state.config.channel_id), UserId(user_id as u64))
        .await
    {
        Ok(member) => {
            member.kind.is_owner() || member.kind.is_administrator() || member.kind.is_member()
        }
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Не удалось проверить подписку на канал");
            false
        }
    }
}

/// Стартовое меню: с пробным периодом для тех, кто ещё не платил.
pub async fn show_start_menu(bot: &Bot, chat_id: ChatId, state: &BotState, user_id: i64) -> HandlerResult {
    let never_paid = match state.db.get_user(user_id).await {
        Ok(Some(user)) => !user.is_paid,
        Ok(None) => true,
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Не удалось прочитать пользователя");
            false
        }
    };
    if never_paid {
        bot.send_message(chat_id, crate::bot::texts::START_BONUS)
            .reply_markup(crate::bot::keyboards::start_bonus_menu())
            .await?;
    } else {
        bot.send_message(chat_id, crate::bot::texts::START)
            .reply_markup(crate::bot::keyboards::main_menu())
            .await?;
    }
    Ok(())
}

/// Текущие ссылки-подписки пользователя в панели (обычная и white).
pub async fn subscription_links_for(
    state: &BotState,
    user_id: i64,
) -> (Option<String>, Option<String>) {
    let main = match state.panel.subscription_link(&panel_username(user_id, false)).await {
        Ok(link) => link,
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Панель не отдала ссылку-подписку");
            None
        }
    };
    let white = match state.panel.subscription_link(&panel_username(user_id, true)).await {
        Ok(link) => link,
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Панель не отдала white-ссылку");
            None
        }
    };
    (main, white)
}

/// Срок действия подписки в панели для сообщения об успехе.
pub async fn panel_expiry_label(state: &BotState, user_id: i64, white: bool) -> String {
    match state
        .panel
        .subscription_status(&panel_username(user_id, white))
        .await
    {
        Ok(status) => status.expires_at.map(format_msk).unwrap_or_else(|| "-".to_string()),
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Панель не отдала срок подписки");
            "-".to_string()
        }
    }
}

/// Служебное сообщение в отчётный чат; ошибки только логируются.
pub async fn notify_report_chat(bot: &Bot, state: &BotState, text: &str) {
    if let Err(error) = bot
        .send_message(ChatId(state.config.report_chat_id), text.to_string())
        .await
    {
        tracing::warn!(
            chat_id = state.config.report_chat_id,
            error = %error,
            "Не удалось отправить служебный отчёт"
        );
    }
}
