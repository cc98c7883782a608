//! Клиент Platega: выставление СБП-платежа и опрос статуса транзакции.

use crate::config::PlategaConfig;
use serde::Deserialize;
use serde_json::json;

/// Код способа оплаты «СБП QR» в API Platega.
const SBP_QR_METHOD: i32 = 2;

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub status: String,
    pub redirect_url: Option<String>,
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct TransactionState {
    pub status: String,
    pub payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    redirect: Option<String>,
    #[serde(rename = "transactionId")]
    transaction_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payload: Option<String>,
}

pub struct PlategaClient {
    http: reqwest::Client,
    base_url: String,
    merchant_id: String,
    secret: String,
    return_url: String,
    failed_url: String,
}

impl PlategaClient {
    pub fn new(config: &PlategaConfig) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow::anyhow!("Не удалось создать HTTP-клиент Platega: {}", e))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            merchant_id: config.merchant_id.clone(),
            secret: config.secret.clone(),
            return_url: config.return_url.clone(),
            failed_url: config.failed_url.clone(),
        })
    }

    pub async fn create_payment(
        &self,
        amount_rub: i64,
        description: &str,
        payload: &str,
    ) -> Result<CreatedPayment, anyhow::Error> {
        let body = json!({
            "paymentMethod": SBP_QR_METHOD,
            "paymentDetails": { "amount": amount_rub as f64, "currency": "RUB" },
            "description": description,
            "return": self.return_url,
            "failedUrl": self.failed_url,
            "payload": payload,
        });
        let response: CreateResponse = self
            .http
            .post(format!("{}/transaction/process", self.base_url))
            .header("X-MerchantId", &self.merchant_id)
            .header("X-Secret", &self.secret)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Platega вернула некорректный ответ: {}", e))?;
        Ok(CreatedPayment {
            status: normalize_status(response.status),
            redirect_url: response.redirect,
            transaction_id: response.transaction_id,
        })
    }

    pub async fn transaction_status(
        &self,
        transaction_id: &str,
    ) -> Result<TransactionState, anyhow::Error> {
        let response: StatusResponse = self
            .http
            .get(format!("{}/transaction/{}", self.base_url, transaction_id))
            .header("X-MerchantId", &self.merchant_id)
            .header("X-Secret", &self.secret)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Platega вернула некорректный статус: {}", e))?;
        Ok(TransactionState {
            status: normalize_status(response.status),
            payload: response.payload,
        })
    }
}

fn normalize_status(status: Option<String>) -> String {
    status
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "pending".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_status_defaults_to_pending() {
        assert_eq!(normalize_status(None), "pending");
        assert_eq!(normalize_status(Some("CONFIRMED".into())), "confirmed");
    }

    #[test]
    fn create_response_tolerates_minimal_body() {
        let parsed: CreateResponse =
            serde_json::from_str(r#"{"transactionId": "tx-1"}"#).unwrap();
        assert_eq!(parsed.transaction_id, "tx-1");
        assert!(parsed.status.is_none());
        assert!(parsed.redirect.is_none());
    }
}
