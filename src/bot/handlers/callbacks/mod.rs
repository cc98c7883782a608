use super::commands::confirm_channel_membership;
use super::format::subscription_state;
use super::shared::{
    HandlerResult, callback_exact_filter, callback_message_target, panel_expiry_label,
    subscription_links_for,
};
use super::state::BotState;
use crate::bot::{keyboards, texts};
use crate::db::PAYMENT_PENDING;
use crate::panel::panel_username;
use crate::payments::fulfill::grant_plan;
use crate::payments::payload::PaymentPayload;
use crate::tariff::{PayMethod, PaymentChoice, Tariff, parse_payment_choice, parse_tariff_choice};
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardMarkup, LabeledPrice};

pub fn handler()
-> teloxide::dispatching::UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    Update::filter_callback_query()
        .branch(
            dptree::filter_map(callback_exact_filter("check_channel"))
                .endpoint(callback_check_channel),
        )
        .branch(dptree::filter_map(callback_exact_filter("buy_vpn")).endpoint(callback_buy_menu))
        .branch(
            dptree::filter_map(callback_exact_filter("back_to_buy_menu"))
                .endpoint(callback_buy_menu),
        )
        .branch(dptree::filter_map(callback_exact_filter("connect_vpn")).endpoint(callback_connect))
        .branch(dptree::filter_map(callback_exact_filter("free_vpn")).endpoint(callback_free_trial))
        .branch(dptree::filter_map(callback_exact_filter("info")).endpoint(callback_info))
        .branch(dptree::filter_map(callback_exact_filter("ref")).endpoint(callback_ref))
        .branch(dptree::filter_map(callback_exact_filter("buy_gift")).endpoint(callback_gift_intro))
        .branch(dptree::filter_map(callback_exact_filter("start_gift")).endpoint(callback_gift_menu))
        .branch(
            dptree::filter_map(callback_exact_filter("back_to_gift_menu"))
                .endpoint(callback_gift_menu),
        )
        .branch(
            dptree::filter_map(callback_exact_filter("back_to_main")).endpoint(callback_back_to_main),
        )
        .branch(dptree::filter_map(tariff_choice_filter).endpoint(callback_tariff_chosen))
        .branch(dptree::filter_map(payment_choice_filter).endpoint(callback_payment_chosen))
}

fn tariff_choice_filter(q: CallbackQuery) -> Option<CallbackQuery> {
    q.data.as_deref().and_then(parse_tariff_choice)?;
    Some(q)
}

fn payment_choice_filter(q: CallbackQuery) -> Option<CallbackQuery> {
    q.data.as_deref().and_then(parse_payment_choice)?;
    Some(q)
}

fn callback_user_id(q: &CallbackQuery) -> i64 {
    q.from.id.0 as i64
}

/// Меняет текст исходного сообщения; если его нет (старый апдейт),
/// отправляет новое.
async fn edit_or_send(
    bot: &Bot,
    q: &CallbackQuery,
    text: String,
    keyboard: InlineKeyboardMarkup,
) -> HandlerResult {
    match callback_message_target(q) {
        Some((chat_id, message_id)) => {
            bot.edit_message_text(chat_id, message_id, text)
                .reply_markup(keyboard)
                .await?;
        }
        None => {
            bot.send_message(ChatId(callback_user_id(q)), text)
                .reply_markup(keyboard)
                .await?;
        }
    }
    Ok(())
}

async fn callback_check_channel(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let user_id = callback_user_id(&q);
    let chat_id = callback_message_target(&q)
        .map(|(chat_id, _)| chat_id)
        .unwrap_or(ChatId(user_id));
    confirm_channel_membership(&bot, &state, chat_id, user_id).await
}

async fn callback_buy_menu(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let user_id = callback_user_id(&q);

    let status = match state
        .panel
        .subscription_status(&panel_username(user_id, false))
        .await
    {
        Ok(status) => status,
        Err(error) => {
            tracing::warn!(user_id = user_id, error = %error, "Панель недоступна в меню покупки");
            Default::default()
        }
    };
    let never_paid = state
        .db
        .get_user(user_id)
        .await?
        .is_none_or(|user| !user.is_paid);
    let (label, until) = subscription_state(&status);
    let text = format!(
        "{}\n\nВаша подписка: {}\nДействует до: {}",
        texts::BUY_MENU,
        label,
        until
    );
    let with_trial = !status.exists && never_paid;
    edit_or_send(&bot, &q, text, keyboards::tariff_menu(with_trial)).await
}

async fn callback_connect(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let user_id = callback_user_id(&q);
    let (main, white) = subscription_links_for(&state, user_id).await;
    if main.is_none() && white.is_none() {
        return edit_or_send(&bot, &q, texts::NO_SUB.to_string(), keyboards::back_to_main()).await;
    }
    edit_or_send(
        &bot,
        &q,
        texts::CONNECT.to_string(),
        keyboards::subscription_links(main.as_deref(), white.as_deref()),
    )
    .await
}

async fn callback_free_trial(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let user_id = callback_user_id(&q);

    let already_paid = state
        .db
        .get_user(user_id)
        .await?
        .is_some_and(|user| user.is_paid);
    if already_paid {
        return edit_or_send(
            &bot,
            &q,
            texts::FREE_VPN_DENIED.to_string(),
            keyboards::back_to_main(),
        )
        .await;
    }

    let user = match grant_plan(&state, user_id, state.config.trial_days, false, true).await {
        Ok(user) => user,
        Err(error) => {
            tracing::error!(user_id = user_id, error = %error, "Не удалось выдать пробный период");
            return edit_or_send(
                &bot,
                &q,
                texts::PAYMENT_ERROR.to_string(),
                keyboards::back_to_main(),
            )
            .await;
        }
    };
    state.db.set_paid(user_id).await?;
    tracing::info!(user_id = user_id, days = state.config.trial_days, "Выдан пробный период");

    let expires = panel_expiry_label(&state, user_id, false).await;
    let link = user.subscription_url.clone().unwrap_or_default();
    edit_or_send(
        &bot,
        &q,
        texts::trial_granted(&expires, &link),
        keyboards::subscription_links(user.subscription_url.as_deref(), None),
    )
    .await
}

async fn callback_info(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    edit_or_send(
        &bot,
        &q,
        texts::info_text(&state.config.support_url),
        keyboards::back_to_main(),
    )
    .await
}

async fn callback_ref(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let user_id = callback_user_id(&q);
    let count = state.db.referral_count(user_id).await?;
    edit_or_send(
        &bot,
        &q,
        texts::ref_info(count),
        keyboards::ref_share(&state.config.bot_url, user_id),
    )
    .await
}

async fn callback_gift_intro(bot: Bot, q: CallbackQuery, _state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    edit_or_send(
        &bot,
        &q,
        texts::GIFT_INTRO.to_string(),
        keyboards::gift_intro_keyboard(),
    )
    .await
}

async fn callback_gift_menu(bot: Bot, q: CallbackQuery, _state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    edit_or_send(
        &bot,
        &q,
        texts::GIFT_MENU.to_string(),
        keyboards::gift_tariff_menu(),
    )
    .await
}

async fn callback_back_to_main(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let user_id = callback_user_id(&q);
    let never_paid = state
        .db
        .get_user(user_id)
        .await?
        .is_none_or(|user| !user.is_paid);
    if never_paid {
        edit_or_send(
            &bot,
            &q,
            texts::START_BONUS.to_string(),
            keyboards::start_bonus_menu(),
        )
        .await
    } else {
        edit_or_send(&bot, &q, texts::START.to_string(), keyboards::main_menu()).await
    }
}

async fn callback_tariff_chosen(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(choice) = q.data.as_deref().and_then(parse_tariff_choice) else {
        return Ok(());
    };
    let user_id = callback_user_id(&q);

    // Спрос на white-тариф отслеживается отдельно.
    if choice.tariff.is_white() {
        state.db.add_white_interest(user_id).await?;
    }

    let keyboard = if choice.tariff == Tariff::Days120 && !choice.gift {
        keyboards::promo_120_methods()
    } else {
        keyboards::payment_methods(choice.tariff, choice.gift)
    };
    edit_or_send(&bot, &q, texts::PAY_METHOD_PROMPT.to_string(), keyboard).await
}

async fn callback_payment_chosen(bot: Bot, q: CallbackQuery, state: BotState) -> HandlerResult {
    bot.answer_callback_query(q.id.clone()).await?;
    let Some(choice) = q.data.as_deref().and_then(parse_payment_choice) else {
        return Ok(());
    };
    let user_id = callback_user_id(&q);
    let chat_id = callback_message_target(&q)
        .map(|(chat_id, _)| chat_id)
        .unwrap_or(ChatId(user_id));

    let description = if choice.tariff.is_white() {
        texts::PAYMENT_NOTE_WHITE
    } else {
        texts::PAYMENT_NOTE
    };
    // Админы платят тестовую сумму, чтобы проверять цепочку целиком.
    let admin = state.config.is_admin(user_id);

    match choice.method {
        PayMethod::Sbp => {
            start_sbp_payment(&bot, &state, chat_id, user_id, &choice, description, admin).await
        }
        PayMethod::Stars => {
            start_stars_payment(&bot, &state, chat_id, user_id, &choice, description, admin).await
        }
        PayMethod::Ton => {
            start_crypto_payment(&bot, &state, chat_id, user_id, &choice, description, admin, "TON")
                .await
        }
        PayMethod::Usdt => {
            start_crypto_payment(&bot, &state, chat_id, user_id, &choice, description, admin, "USDT")
                .await
        }
    }
}

async fn start_sbp_payment(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    choice: &PaymentChoice,
    description: &str,
    admin: bool,
) -> HandlerResult {
    let amount = if admin { 1 } else { choice.tariff.price_rub() };
    let payload = PaymentPayload {
        user_id,
        duration: choice.tariff.days(),
        white: choice.tariff.is_white(),
        gift: choice.gift,
        method: PayMethod::Sbp.as_str().to_string(),
        amount: amount.to_string(),
    };

    let created = match state
        .platega
        .create_payment(amount, description, &payload.encode())
        .await
    {
        Ok(created) => created,
        Err(error) => {
            tracing::error!(user_id = user_id, error = %error, "Platega: не удалось создать платёж");
            bot.send_message(chat_id, texts::PAYMENT_ERROR)
                .reply_markup(keyboards::retry_payment())
                .await?;
            return Ok(());
        }
    };

    let Some(redirect_url) = created.redirect_url else {
        tracing::error!(
            user_id = user_id,
            transaction_id = %created.transaction_id,
            "Platega: ответ без ссылки на оплату"
        );
        bot.send_message(chat_id, texts::PAYMENT_ERROR)
            .reply_markup(keyboards::retry_payment())
            .await?;
        return Ok(());
    };

    state
        .db
        .add_platega_payment(user_id, amount, PAYMENT_PENDING, &created.transaction_id, choice.gift)
        .await?;
    tracing::info!(
        user_id = user_id,
        amount = amount,
        transaction_id = %created.transaction_id,
        "Platega: платёж создан"
    );
    bot.send_message(chat_id, texts::payment_pay_by_link(&redirect_url))
        .reply_markup(keyboards::pay_link(&redirect_url))
        .await?;
    Ok(())
}

async fn start_stars_payment(
    bot: &Bot,
    _state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    choice: &PaymentChoice,
    description: &str,
    admin: bool,
) -> HandlerResult {
    let amount = if admin { 1 } else { choice.tariff.price_stars() };
    let payload = PaymentPayload {
        user_id,
        duration: choice.tariff.days(),
        white: choice.tariff.is_white(),
        gift: choice.gift,
        method: PayMethod::Stars.as_str().to_string(),
        amount: amount.to_string(),
    };

    let title = if choice.gift {
        "Подарочная подписка на VPN"
    } else {
        "Подписка на VPN"
    };
    bot.send_invoice(
        chat_id,
        title.to_string(),
        description.to_string(),
        payload.encode(),
        "XTR".to_string(),
        vec![LabeledPrice::new("Подписка", amount as u32)],
    )
    .await?;
    tracing::info!(user_id = user_id, amount = amount, "Stars: инвойс отправлен");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn start_crypto_payment(
    bot: &Bot,
    state: &BotState,
    chat_id: ChatId,
    user_id: i64,
    choice: &PaymentChoice,
    description: &str,
    admin: bool,
    asset: &str,
) -> HandlerResult {
    let amount = if admin {
        0.02
    } else if asset == "TON" {
        choice.tariff.price_ton()
    } else {
        choice.tariff.price_usdt()
    };
    let method = if asset == "TON" { PayMethod::Ton } else { PayMethod::Usdt };
    let payload = PaymentPayload {
        user_id,
        duration: choice.tariff.days(),
        white: choice.tariff.is_white(),
        gift: choice.gift,
        method: method.as_str().to_string(),
        amount: amount.to_string(),
    };

    let created = match state
        .cryptobot
        .create_invoice(asset, amount, description, &payload.encode())
        .await
    {
        Ok(created) => created,
        Err(error) => {
            tracing::error!(user_id = user_id, error = %error, "CryptoBot: не удалось создать инвойс");
            bot.send_message(chat_id, texts::PAYMENT_ERROR)
                .reply_markup(keyboards::retry_payment())
                .await?;
            return Ok(());
        }
    };

    state
        .db
        .add_cryptobot_payment(user_id, amount, asset, created.invoice_id, &payload.encode())
        .await?;
    tracing::info!(
        user_id = user_id,
        amount = amount,
        asset = asset,
        invoice_id = created.invoice_id,
        "CryptoBot: инвойс создан"
    );
    bot.send_message(chat_id, texts::payment_pay_by_link(&created.pay_url))
        .reply_markup(keyboards::pay_link(&created.pay_url))
        .await?;
    Ok(())
}
