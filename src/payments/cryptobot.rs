//! Клиент CryptoBot (Crypto Pay API): счёт в TON/USDT и опрос оплаты.

use crate::config::CryptoBotConfig;
use serde::Deserialize;
use serde_json::json;

/// Счёт живёт два часа, дальше шлюз помечает его просроченным.
const INVOICE_TTL_SECONDS: i64 = 7200;

#[derive(Debug, Clone)]
pub struct CreatedInvoice {
    pub invoice_id: i64,
    pub pay_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceResult {
    invoice_id: i64,
    pay_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceList {
    #[serde(default)]
    items: Vec<InvoiceItem>,
}

#[derive(Debug, Deserialize)]
struct InvoiceItem {
    status: String,
}

pub struct CryptoBotClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    bot_url: String,
}

impl CryptoBotClient {
    pub fn new(config: &CryptoBotConfig, bot_url: &str) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Не удалось создать HTTP-клиент CryptoBot: {}", e))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
            bot_url: bot_url.to_string(),
        })
    }

    pub async fn create_invoice(
        &self,
        asset: &str,
        amount: f64,
        description: &str,
        payload: &str,
    ) -> Result<CreatedInvoice, anyhow::Error> {
        let body = json!({
            "asset": asset,
            "amount": amount.to_string(),
            "description": description,
            "payload": payload,
            "paid_btn_name": "openBot",
            "paid_btn_url": self.bot_url,
            "allow_comments": false,
            "allow_anonymous": false,
            "expires_in": INVOICE_TTL_SECONDS,
        });
        let response: ApiResponse<InvoiceResult> = self
            .http
            .post(format!("{}/createInvoice", self.base_url))
            .header("Crypto-Pay-API-Token", &self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("CryptoBot вернул некорректный ответ: {}", e))?;
        let result = match (response.ok, response.result) {
            (true, Some(result)) => result,
            _ => return Err(anyhow::anyhow!("CryptoBot отказал в создании счёта")),
        };
        Ok(CreatedInvoice {
            invoice_id: result.invoice_id,
            pay_url: result.pay_url,
        })
    }

    /// Статус счёта: `active`, `paid` либо `expired`.
    pub async fn invoice_status(&self, invoice_id: i64) -> Result<Option<String>, anyhow::Error> {
        let response: ApiResponse<InvoiceList> = self
            .http
            .get(format!("{}/getInvoices", self.base_url))
            .header("Crypto-Pay-API-Token", &self.token)
            .query(&[("invoice_ids", invoice_id.to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("CryptoBot вернул некорректный список счетов: {}", e))?;
        Ok(response
            .result
            .and_then(|list| list.items.into_iter().next())
            .map(|item| item.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_invoice_response() {
        let raw = r#"{"ok": true, "result": {"invoice_id": 42, "pay_url": "https://t.me/CryptoBot?start=IV42"}}"#;
        let parsed: ApiResponse<InvoiceResult> = serde_json::from_str(raw).unwrap();
        assert!(parsed.ok);
        let result = parsed.result.unwrap();
        assert_eq!(result.invoice_id, 42);
    }

    #[test]
    fn parses_invoice_list() {
        let raw = r#"{"ok": true, "result": {"items": [{"status": "paid"}]}}"#;
        let parsed: ApiResponse<InvoiceList> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.result.unwrap().items[0].status, "paid");
    }

    #[test]
    fn empty_list_yields_no_status() {
        let raw = r#"{"ok": true, "result": {"items": []}}"#;
        let parsed: ApiResponse<InvoiceList> = serde_json::from_str(raw).unwrap();
        assert!(parsed.result.unwrap().items.is_empty());
    }
}
