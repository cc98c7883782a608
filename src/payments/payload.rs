//! Строковая полезная нагрузка платежа. Проходит через все шлюзы и
//! возвращается при подтверждении, поэтому формат фиксированный:
//! `user_id:{},duration:{},white:{},gift:{},method:{},amount:{}`.

use anyhow::anyhow;

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentPayload {
    pub user_id: i64,
    pub duration: i64,
    pub white: bool,
    pub gift: bool,
    pub method: String,
    pub amount: String,
}

impl PaymentPayload {
    pub fn encode(&self) -> String {
        format!(
            "user_id:{},duration:{},white:{},gift:{},method:{},amount:{}",
            self.user_id, self.duration, self.white, self.gift, self.method, self.amount
        )
    }

    pub fn parse(raw: &str) -> Result<Self, anyhow::Error> {
        let mut user_id = None;
        let mut duration = None;
        let mut white = None;
        let mut gift = None;
        let mut method = None;
        let mut amount = None;

        for part in raw.split(',') {
            let (key, value) = part
                .split_once(':')
                .ok_or_else(|| anyhow!("Некорректный сегмент payload: {}", part))?;
            match key.trim() {
                "user_id" => user_id = Some(value.parse::<i64>()?),
                "duration" => duration = Some(value.parse::<i64>()?),
                "white" => white = Some(parse_bool(value)?),
                "gift" => gift = Some(parse_bool(value)?),
                "method" => method = Some(value.to_string()),
                "amount" => amount = Some(value.to_string()),
                other => return Err(anyhow!("Неизвестный ключ payload: {}", other)),
            }
        }

        Ok(Self {
            user_id: user_id.ok_or_else(|| anyhow!("В payload нет user_id"))?,
            duration: duration.ok_or_else(|| anyhow!("В payload нет duration"))?,
            white: white.ok_or_else(|| anyhow!("В payload нет white"))?,
            gift: gift.ok_or_else(|| anyhow!("В payload нет gift"))?,
            method: method.ok_or_else(|| anyhow!("В payload нет method"))?,
            amount: amount.ok_or_else(|| anyhow!("В payload нет amount"))?,
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool, anyhow::Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(anyhow!("Некорректное булево значение: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let payload = PaymentPayload {
            user_id: 123456789,
            duration: 90,
            white: false,
            gift: true,
            method: "sbp".to_string(),
            amount: "269".to_string(),
        };
        let encoded = payload.encode();
        assert_eq!(
            encoded,
            "user_id:123456789,duration:90,white:false,gift:true,method:sbp,amount:269"
        );
        assert_eq!(PaymentPayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn accepts_capitalised_booleans_and_float_amounts() {
        let payload = PaymentPayload::parse(
            "user_id:5,duration:30,white:True,gift:False,method:ton,amount:0.9",
        )
        .unwrap();
        assert!(payload.white);
        assert!(!payload.gift);
        assert_eq!(payload.amount, "0.9");
    }

    #[test]
    fn rejects_incomplete_payload() {
        assert!(PaymentPayload::parse("user_id:5,duration:30").is_err());
        assert!(PaymentPayload::parse("garbage").is_err());
    }
}
