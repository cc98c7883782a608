//! Выгрузка таблиц магазина в CSV для админской команды /export.

use crate::db::{CryptoPayment, Db, Gift, OnlineStats, PlategaPayment, ShopUser, StarsPayment, WhiteInterest};

pub struct ExportFile {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, anyhow::Error> {
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Не удалось завершить CSV: {}", e))
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_i64(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn users_csv(rows: &[ShopUser]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "user_id",
        "ref_id",
        "stamp",
        "ttclid",
        "is_delete",
        "is_paid",
        "is_connected",
        "in_channel",
        "created_at",
        "subscription_end",
        "white_subscription_end",
        "last_broadcast_status",
    ])?;
    for row in rows {
        writer.write_record([
            row.user_id.to_string(),
            opt_str(&row.ref_id),
            opt_str(&row.stamp),
            opt_str(&row.ttclid),
            row.is_delete.to_string(),
            row.is_paid.to_string(),
            row.is_connected.to_string(),
            row.in_channel.to_string(),
            row.created_at.to_string(),
            opt_i64(row.subscription_end),
            opt_i64(row.white_subscription_end),
            opt_str(&row.last_broadcast_status),
        ])?;
    }
    finish(writer)
}

pub fn platega_csv(rows: &[PlategaPayment]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["user_id", "amount", "status", "transaction_id", "is_gift", "created_at"])?;
    for row in rows {
        writer.write_record([
            row.user_id.to_string(),
            row.amount.to_string(),
            row.status.clone(),
            row.transaction_id.clone(),
            row.is_gift.to_string(),
            row.created_at.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn stars_csv(rows: &[StarsPayment]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["user_id", "amount", "status", "created_at"])?;
    for row in rows {
        writer.write_record([
            row.user_id.to_string(),
            row.amount.to_string(),
            row.status.clone(),
            row.created_at.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn cryptobot_csv(rows: &[CryptoPayment]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "user_id",
        "amount",
        "currency",
        "status",
        "invoice_id",
        "payload",
        "created_at",
    ])?;
    for row in rows {
        writer.write_record([
            row.user_id.to_string(),
            row.amount.to_string(),
            row.currency.clone(),
            row.status.clone(),
            row.invoice_id.to_string(),
            row.payload.clone(),
            row.created_at.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn gifts_csv(rows: &[Gift]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "gift_id",
        "giver_id",
        "duration",
        "white",
        "recipient_id",
        "activated",
        "created_at",
    ])?;
    for row in rows {
        writer.write_record([
            row.gift_id.clone(),
            row.giver_id.to_string(),
            row.duration.to_string(),
            row.white.to_string(),
            opt_i64(row.recipient_id),
            row.activated.to_string(),
            row.created_at.to_string(),
        ])?;
    }
    finish(writer)
}

pub fn white_counter_csv(rows: &[WhiteInterest]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["user_id", "created_at"])?;
    for row in rows {
        writer.write_record([row.user_id.to_string(), row.created_at.to_string()])?;
    }
    finish(writer)
}

pub fn online_csv(rows: &[OnlineStats]) -> Result<Vec<u8>, anyhow::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["day", "panel_total", "active_today", "paying", "trial"])?;
    for row in rows {
        writer.write_record([
            row.day.clone(),
            row.panel_total.to_string(),
            row.active_today.to_string(),
            row.paying.to_string(),
            row.trial.to_string(),
        ])?;
    }
    finish(writer)
}

/// Полная выгрузка всех таблиц.
pub async fn export_all(db: &Db) -> Result<Vec<ExportFile>, anyhow::Error> {
    Ok(vec![
        ExportFile {
            name: "users.csv",
            bytes: users_csv(&db.dump_users().await?)?,
        },
        ExportFile {
            name: "platega_payments.csv",
            bytes: platega_csv(&db.dump_platega().await?)?,
        },
        ExportFile {
            name: "stars_payments.csv",
            bytes: stars_csv(&db.dump_stars().await?)?,
        },
        ExportFile {
            name: "cryptobot_payments.csv",
            bytes: cryptobot_csv(&db.dump_cryptobot().await?)?,
        },
        ExportFile {
            name: "gifts.csv",
            bytes: gifts_csv(&db.dump_gifts().await?)?,
        },
        ExportFile {
            name: "white_counter.csv",
            bytes: white_counter_csv(&db.dump_white_counter().await?)?,
        },
        ExportFile {
            name: "online_stats.csv",
            bytes: online_csv(&db.dump_online().await?)?,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;

    #[tokio::test]
    async fn export_contains_every_table() {
        let db = Db::open_in_memory().await.unwrap();
        db.register_user(1, None, Some("promo")).await.unwrap();
        db.add_stars_payment(1, 179).await.unwrap();

        let files = export_all(&db).await.unwrap();
        assert_eq!(files.len(), 7);

        let users = files.iter().find(|f| f.name == "users.csv").unwrap();
        let text = String::from_utf8(users.bytes.clone()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("user_id,ref_id"));
        assert!(lines.next().unwrap().starts_with("1,,promo"));

        let stars = files.iter().find(|f| f.name == "stars_payments.csv").unwrap();
        let text = String::from_utf8(stars.bytes.clone()).unwrap();
        assert!(text.contains("1,179,confirmed"));
    }
}
