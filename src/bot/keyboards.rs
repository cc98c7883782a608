//! Inline-клавиатуры бота.

use crate::tariff::Tariff;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use url::Url;

pub const BTN_BUY: &str = "🛒 Купить подписку";
pub const BTN_CONNECT: &str = "🔗 Подключить VPN";
pub const BTN_REF: &str = "👥 Рефералка";
pub const BTN_GIFT: &str = "🎁 Подарить подписку";
pub const BTN_INFO: &str = "💡 Информация";
pub const BTN_TRIAL: &str = "🔥 Попробовать бесплатно";
pub const BTN_BACK: &str = "🔙 Назад";

fn url_button(text: &str, raw_url: &str) -> Option<InlineKeyboardButton> {
    match Url::parse(raw_url) {
        Ok(url) => Some(InlineKeyboardButton::url(text.to_string(), url)),
        Err(error) => {
            tracing::warn!(url = raw_url, error = %error, "Некорректный URL для кнопки");
            None
        }
    }
}

pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(BTN_BUY, "buy_vpn")])
        .append_row(vec![InlineKeyboardButton::callback(BTN_CONNECT, "connect_vpn")])
        .append_row(vec![
            InlineKeyboardButton::callback(BTN_REF, "ref"),
            InlineKeyboardButton::callback(BTN_GIFT, "buy_gift"),
        ])
        .append_row(vec![InlineKeyboardButton::callback(BTN_INFO, "info")])
}

pub fn start_bonus_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(BTN_TRIAL, "free_vpn")])
        .append_row(vec![InlineKeyboardButton::callback(BTN_BUY, "buy_vpn")])
        .append_row(vec![InlineKeyboardButton::callback(BTN_CONNECT, "connect_vpn")])
        .append_row(vec![
            InlineKeyboardButton::callback(BTN_REF, "ref"),
            InlineKeyboardButton::callback(BTN_GIFT, "buy_gift"),
        ])
        .append_row(vec![InlineKeyboardButton::callback(BTN_INFO, "info")])
}

pub fn channel_gate(channel_url: &str) -> InlineKeyboardMarkup {
    let mut kb = InlineKeyboardMarkup::default();
    if let Some(button) = url_button("Подписаться на канал", channel_url) {
        kb = kb.append_row(vec![button]);
    }
    kb.append_row(vec![InlineKeyboardButton::callback(
        "Проверить подписку",
        "check_channel",
    )])
}

fn tariff_label(tariff: Tariff) -> String {
    match tariff {
        Tariff::Days30 => format!("🤝 30 дней - {} руб", tariff.price_rub()),
        Tariff::Days90 => format!("👌 90 дней - {} руб", tariff.price_rub()),
        Tariff::Days120 => format!("🔥 Акция: 120 дней - {} руб", tariff.price_rub()),
        Tariff::Days180 => format!("💪 180 дней - {} руб", tariff.price_rub()),
        Tariff::White30 => format!("🦾 Включи мобильный - {} руб", tariff.price_rub()),
    }
}

pub fn tariff_menu(with_trial: bool) -> InlineKeyboardMarkup {
    let mut kb = InlineKeyboardMarkup::default();
    if with_trial {
        kb = kb.append_row(vec![InlineKeyboardButton::callback(BTN_TRIAL, "free_vpn")]);
    }
    kb.append_row(vec![InlineKeyboardButton::callback(
        tariff_label(Tariff::Days30),
        "r_30",
    )])
    .append_row(vec![InlineKeyboardButton::callback(
        tariff_label(Tariff::Days90),
        "r_90",
    )])
    .append_row(vec![InlineKeyboardButton::callback(
        tariff_label(Tariff::Days180),
        "r_180",
    )])
    .append_row(vec![InlineKeyboardButton::callback(
        tariff_label(Tariff::White30),
        "r_white_30",
    )])
    .append_row(vec![InlineKeyboardButton::callback(BTN_BACK, "back_to_main")])
}

pub fn gift_intro_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(
            "🎁 Выбрать тариф",
            "start_gift",
        )])
        .append_row(vec![InlineKeyboardButton::callback(BTN_BACK, "back_to_main")])
}

pub fn gift_tariff_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(
            tariff_label(Tariff::Days30),
            "gift_r_30",
        )])
        .append_row(vec![InlineKeyboardButton::callback(
            tariff_label(Tariff::Days90),
            "gift_r_90",
        )])
        .append_row(vec![InlineKeyboardButton::callback(
            tariff_label(Tariff::Days180),
            "gift_r_180",
        )])
        .append_row(vec![InlineKeyboardButton::callback(
            tariff_label(Tariff::White30),
            "gift_r_white_30",
        )])
        .append_row(vec![InlineKeyboardButton::callback(BTN_BACK, "back_to_main")])
}

/// Способы оплаты для выбранного тарифа.
pub fn payment_methods(tariff: Tariff, gift: bool) -> InlineKeyboardMarkup {
    let suffix = if gift {
        format!("gift_r_{}", tariff.code())
    } else {
        format!("r_{}", tariff.code())
    };
    let back = if gift { "back_to_gift_menu" } else { "back_to_buy_menu" };
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(
            "💳 СБП",
            format!("sbp_{}", suffix),
        )])
        .append_row(vec![InlineKeyboardButton::callback(
            "⭐️ Telegram Stars",
            format!("stars_{}", suffix),
        )])
        .append_row(vec![
            InlineKeyboardButton::callback("💎 TON", format!("crypto_ton_{}", suffix)),
            InlineKeyboardButton::callback("💵 USDT", format!("crypto_usdt_{}", suffix)),
        ])
        .append_row(vec![InlineKeyboardButton::callback(BTN_BACK, back)])
}

/// Акционный тариф из рассылок: сразу способы оплаты, без «назад».
pub fn promo_120_methods() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback("💳 СБП", "sbp_r_120")])
        .append_row(vec![InlineKeyboardButton::callback(
            "⭐️ Telegram Stars",
            "stars_r_120",
        )])
        .append_row(vec![
            InlineKeyboardButton::callback("💎 TON", "crypto_ton_r_120"),
            InlineKeyboardButton::callback("💵 USDT", "crypto_usdt_r_120"),
        ])
}

pub fn pay_link(url: &str) -> InlineKeyboardMarkup {
    let mut kb = InlineKeyboardMarkup::default();
    if let Some(button) = url_button("💳 Оплатить", url) {
        kb = kb.append_row(vec![button]);
    }
    kb.append_row(vec![InlineKeyboardButton::callback(BTN_BACK, "back_to_buy_menu")])
}

/// Ссылки-подписки после покупки либо в разделе «Подключить VPN».
pub fn subscription_links(main: Option<&str>, white: Option<&str>) -> InlineKeyboardMarkup {
    let mut kb = InlineKeyboardMarkup::default();
    if let Some(button) = main.and_then(|link| url_button("📋 Моя подписка", link)) {
        kb = kb.append_row(vec![button]);
    }
    if let Some(button) = white.and_then(|link| url_button("🦾 Включи мобильный", link)) {
        kb = kb.append_row(vec![button]);
    }
    kb.append_row(vec![InlineKeyboardButton::callback(BTN_BACK, "back_to_main")])
}

pub fn ref_share(bot_url: &str, user_id: i64) -> InlineKeyboardMarkup {
    let invite = format!("{}?start=ref{}", bot_url, user_id);
    let share = format!(
        "https://t.me/share/url?url={}&text={}",
        urlencoding::encode(&invite),
        urlencoding::encode("Попробуй этот VPN — быстрый и без рекламы")
    );
    let mut kb = InlineKeyboardMarkup::default();
    if let Some(button) = url_button("📤 Поделиться ссылкой", &share) {
        kb = kb.append_row(vec![button]);
    }
    kb.append_row(vec![InlineKeyboardButton::callback(BTN_BACK, "back_to_main")])
}

pub fn back_to_main() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![InlineKeyboardButton::callback(
        BTN_BACK,
        "back_to_main",
    )])
}

pub fn retry_payment() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![InlineKeyboardButton::callback(
        "🛒 Выбрать тариф",
        "buy_vpn",
    )])
}

// Клавиатуры-одиночки для рассылок и пушей.

pub fn single_buy() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(BTN_BUY, "buy_vpn")])
}

pub fn single_connect() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(BTN_CONNECT, "connect_vpn")])
}

pub fn single_trial() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(BTN_TRIAL, "free_vpn")])
}

pub fn single_promo_120() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![InlineKeyboardButton::callback(
        tariff_label(Tariff::Days120),
        "r_120",
    )])
}
