//! Тарифы и разбор callback-данных выбора тарифа/способа оплаты.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tariff {
    Days30,
    Days90,
    Days120,
    Days180,
    White30,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayMethod {
    Sbp,
    Stars,
    Ton,
    Usdt,
}

/// Бонус рефереру за первую оплату приглашённого.
pub const REFERRAL_BONUS_DAYS: i64 = 7;

impl Tariff {
    /// Код тарифа в callback-данных: `30`, `90`, `120`, `180`, `white_30`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "30" => Some(Self::Days30),
            "90" => Some(Self::Days90),
            "120" => Some(Self::Days120),
            "180" => Some(Self::Days180),
            "white_30" => Some(Self::White30),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Days30 => "30",
            Self::Days90 => "90",
            Self::Days120 => "120",
            Self::Days180 => "180",
            Self::White30 => "white_30",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Self::Days30 | Self::White30 => 30,
            Self::Days90 => 90,
            Self::Days120 => 120,
            Self::Days180 => 180,
        }
    }

    pub fn is_white(&self) -> bool {
        matches!(self, Self::White30)
    }

    pub fn price_rub(&self) -> i64 {
        match self {
            Self::Days30 => 99,
            Self::Days90 | Self::Days120 => 269,
            Self::Days180 => 499,
            Self::White30 => 299,
        }
    }

    pub fn price_stars(&self) -> i64 {
        match self {
            Self::Days30 => 66,
            Self::Days90 | Self::Days120 => 179,
            Self::Days180 => 333,
            Self::White30 => 199,
        }
    }

    pub fn price_ton(&self) -> f64 {
        match self {
            Self::Days30 => 0.9,
            Self::Days90 | Self::Days120 => 2.5,
            Self::Days180 => 4.6,
            Self::White30 => 2.8,
        }
    }

    pub fn price_usdt(&self) -> f64 {
        match self {
            Self::Days30 => 1.3,
            Self::Days90 | Self::Days120 => 3.5,
            Self::Days180 => 6.5,
            Self::White30 => 4.0,
        }
    }
}

impl PayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sbp => "sbp",
            Self::Stars => "stars",
            Self::Ton => "ton",
            Self::Usdt => "usdt",
        }
    }
}

/// Выбранный тариф из callback-данных `r_{code}` либо `gift_r_{code}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffChoice {
    pub tariff: Tariff,
    pub gift: bool,
}

pub fn parse_tariff_choice(data: &str) -> Option<TariffChoice> {
    if let Some(code) = data.strip_prefix("gift_r_") {
        return Tariff::from_code(code).map(|tariff| TariffChoice { tariff, gift: true });
    }
    let code = data.strip_prefix("r_")?;
    Tariff::from_code(code).map(|tariff| TariffChoice { tariff, gift: false })
}

/// Выбранный способ оплаты: `sbp_r_30`, `stars_gift_r_white_30`,
/// `crypto_ton_r_90`, `crypto_usdt_gift_r_180`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentChoice {
    pub method: PayMethod,
    pub tariff: Tariff,
    pub gift: bool,
}

pub fn parse_payment_choice(data: &str) -> Option<PaymentChoice> {
    let (method, rest) = if let Some(rest) = data.strip_prefix("sbp_") {
        (PayMethod::Sbp, rest)
    } else if let Some(rest) = data.strip_prefix("stars_") {
        (PayMethod::Stars, rest)
    } else if let Some(rest) = data.strip_prefix("crypto_ton_") {
        (PayMethod::Ton, rest)
    } else if let Some(rest) = data.strip_prefix("crypto_usdt_") {
        (PayMethod::Usdt, rest)
    } else {
        return None;
    };
    let choice = parse_tariff_choice(rest)?;
    Some(PaymentChoice {
        method,
        tariff: choice.tariff,
        gift: choice.gift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tariff_codes() {
        assert_eq!(
            parse_tariff_choice("r_30"),
            Some(TariffChoice {
                tariff: Tariff::Days30,
                gift: false
            })
        );
        assert_eq!(
            parse_tariff_choice("gift_r_white_30"),
            Some(TariffChoice {
                tariff: Tariff::White30,
                gift: true
            })
        );
        assert_eq!(parse_tariff_choice("r_45"), None);
        assert_eq!(parse_tariff_choice("free_vpn"), None);
    }

    #[test]
    fn parses_payment_choices() {
        let choice = parse_payment_choice("crypto_ton_r_180").unwrap();
        assert_eq!(choice.method, PayMethod::Ton);
        assert_eq!(choice.tariff, Tariff::Days180);
        assert!(!choice.gift);

        let choice = parse_payment_choice("sbp_gift_r_white_30").unwrap();
        assert_eq!(choice.method, PayMethod::Sbp);
        assert_eq!(choice.tariff, Tariff::White30);
        assert!(choice.gift);

        assert_eq!(parse_payment_choice("paypal_r_30"), None);
    }

    #[test]
    fn white_tariff_keeps_thirty_days() {
        assert_eq!(Tariff::White30.days(), 30);
        assert!(Tariff::White30.is_white());
        assert_eq!(Tariff::Days120.price_rub(), Tariff::Days90.price_rub());
    }

    #[test]
    fn codes_round_trip() {
        for tariff in [
            Tariff::Days30,
            Tariff::Days90,
            Tariff::Days120,
            Tariff::Days180,
            Tariff::White30,
        ] {
            assert_eq!(Tariff::from_code(tariff.code()), Some(tariff));
        }
    }
}
