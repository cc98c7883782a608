//! Пользовательские тексты бота.

pub const TO_CHANNEL: &str = "Чтобы пользоваться ботом, подпишитесь на наш канал.\n\n\
После подписки нажмите «Проверить подписку».";

pub const START: &str = "👋 Привет! Это бот подписок на VPN.\n\n\
🛒 Покупка занимает меньше минуты: выберите тариф, оплатите удобным способом \
и получите ссылку-подписку для любого устройства.\n\n\
🎁 Можно подарить подписку другу, а за приглашённых друзей мы дарим дни подписки.";

pub const START_BONUS: &str = "👋 Привет! Это бот подписок на VPN.\n\n\
🔥 Для новых пользователей есть бесплатный пробный период — нажмите \
«Попробовать бесплатно» и оцените скорость без оплаты.\n\n\
🛒 Или сразу выберите тариф и подключайтесь за минуту.";

pub const BUY_MENU: &str = "Выберите тариф. Оплата: СБП, Telegram Stars, TON или USDT.\n\n\
🦾 «Включи мобильный» — отдельный тариф, который работает на мобильном интернете.";

pub const GIFT_INTRO: &str = "🎁 Подарите подписку другу: вы платите, друг получает ссылку \
активации. Подарок можно отправить любым способом.";

pub const GIFT_MENU: &str = "Выберите тариф для подарка.";

pub const NO_SUB: &str = "У вас пока нет подписки. Оформите её в разделе «Купить подписку».";

pub const CONNECT: &str = "🔗 Ваши ссылки-подписки — по кнопкам ниже.\n\n\
Добавьте ссылку в приложение (Happ, v2rayTun, Streisand) и подключайтесь.";

pub const PAY_METHOD_PROMPT: &str = "Выберите способ оплаты.";

pub const FREE_VPN_DENIED: &str = "Пробный период доступен только до первой оплаты.";

pub const GIFT_USED: &str = "Эта подарочная ссылка уже использована или устарела.";

pub const GIFT_FAQ: &str = "Как подарить: перешлите другу сообщение со ссылкой выше. \
Друг нажмёт на неё, попадёт в бота и подписка активируется автоматически.";

pub const PAYMENT_CANCELED: &str = "Платёж отменён. Попробуйте ещё раз или выберите другой способ оплаты.";

pub const PAYMENT_ERROR: &str = "Не получилось создать платёж. Попробуйте позже или напишите в поддержку.";

pub const PAYMENT_NOTE: &str = "Подписка на VPN. После оплаты бот пришлёт ссылку-подписку.";

pub const PAYMENT_NOTE_WHITE: &str = "Подписка «Включи мобильный». Работает на мобильном интернете, \
после оплаты бот пришлёт ссылку-подписку.";

pub const REF_BONUS: &str = "🎉 Ваш друг оплатил подписку — вам начислено 7 дней!";

pub const SUB_ACTIVE: &str = "✅ - Активен";
pub const SUB_INACTIVE: &str = "❌ - Не Активен";
pub const SUB_MISSING: &str = "🔎 - Не подключён";

pub fn info_text(support_url: &str) -> String {
    format!(
        "💡 Информация\n\n\
         Подписка работает на любых устройствах: iOS, Android, Windows, macOS.\n\
         Одна подписка — до 3 устройств одновременно.\n\n\
         Вопросы и помощь: {}",
        support_url
    )
}

pub fn ref_info(count: i64) -> String {
    format!(
        "👥 Реферальная программа\n\n\
         Приглашено друзей: {}\n\n\
         За каждого друга, который оплатит подписку, вы получаете 7 дней. \
         Отправьте другу ссылку кнопкой ниже.",
        count
    )
}

pub fn gift_created(link: &str) -> String {
    format!(
        "🎁 Подарок готов! Отправьте другу эту ссылку:\n\n{}",
        link
    )
}

pub fn gift_activated(duration: i64, expires: &str) -> String {
    format!(
        "🎁 Подарок активирован: подписка на {} дней.\n\
         Действует до: {}\n\n\
         Ссылка для подключения — в разделе «Подключить VPN».",
        duration, expires
    )
}

pub fn payment_success(expires: &str, link: &str) -> String {
    format!(
        "✅ Оплата прошла! Подписка действует до: {}\n\n\
         Ваша ссылка-подписка:\n{}\n\n\
         Добавьте её в приложение и подключайтесь.",
        expires, link
    )
}

pub fn trial_granted(expires: &str, link: &str) -> String {
    format!(
        "🔥 Пробный период включён! Действует до: {}\n\n\
         Ваша ссылка-подписка:\n{}",
        expires, link
    )
}

pub fn payment_pay_by_link(url: &str) -> String {
    format!("Перейдите по ссылке для оплаты:\n{}", url)
}

/// Напоминание об окончании подписки; `days_left` — 7, 3, 1 или 0.
pub fn reminder_days_left(days_left: i64) -> String {
    match days_left {
        0 => "⏰ Подписка заканчивается сегодня! Продлите её, чтобы не остаться без VPN.".to_string(),
        1 => "⏰ Подписка закончится завтра. Самое время продлить.".to_string(),
        days => format!("⏰ Подписка закончится через {} дн. Продлите её заранее.", days),
    }
}

pub const REMINDER_EXPIRED: &str = "❌ Подписка закончилась. Продлите её, чтобы вернуться в сеть.";

/// Онбординг для тех, кто так и не оплатил. Индекс окна: 0 — 30 минут,
/// 1 — 3 часа, 2 — сутки.
pub fn push_not_subscribed(window: usize) -> &'static str {
    match window {
        0 => "👋 Ещё не попробовали VPN? Жмите «Попробовать бесплатно» — это занимает минуту.",
        1 => "🔥 Бесплатный пробный период всё ещё ждёт вас. Попробуйте без оплаты.",
        _ => "💡 Напоминаем: у вас есть бесплатный доступ на пробу. Активируйте, пока предложение в силе.",
    }
}

/// Онбординг для оплативших, но не подключившихся.
pub fn push_not_connected(window: usize) -> &'static str {
    match window {
        0 => "🔗 Подписка готова, осталось подключиться. Нажмите «Подключить VPN».",
        1 => "🔗 Вы ещё не подключились. Ссылка-подписка ждёт в разделе «Подключить VPN».",
        _ => "🔗 Подписка оплачена, но не используется. Подключитесь за пару минут.",
    }
}
