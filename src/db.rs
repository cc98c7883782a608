//! SQLite-слой магазина: пользователи, платежи, подарки, статистика.

use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, FromRow)]
pub struct ShopUser {
    pub id: i64,
    pub user_id: i64,
    pub ref_id: Option<String>,
    pub stamp: Option<String>,
    pub ttclid: Option<String>,
    pub is_delete: bool,
    pub is_paid: bool,
    pub is_connected: bool,
    pub in_channel: bool,
    pub created_at: i64,
    pub subscription_end: Option<i64>,
    pub white_subscription_end: Option<i64>,
    pub last_notification_at: Option<i64>,
    pub last_broadcast_status: Option<String>,
    pub last_broadcast_at: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PlategaPayment {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub status: String,
    pub transaction_id: String,
    pub is_gift: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct StarsPayment {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub status: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct CryptoPayment {
    pub id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub currency: String,
    pub status: String,
    pub invoice_id: i64,
    pub payload: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Gift {
    pub gift_id: String,
    pub giver_id: i64,
    pub duration: i64,
    pub white: bool,
    pub recipient_id: Option<i64>,
    pub activated: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct WhiteInterest {
    pub user_id: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct OnlineStats {
    pub day: String,
    pub panel_total: i64,
    pub active_today: i64,
    pub paying: i64,
    pub trial: i64,
}

/// Срез по источнику трафика (реферер либо метка).
#[derive(Debug, Clone)]
pub struct SourceStats {
    pub total: i64,
    pub with_sub: i64,
    pub connected: i64,
    pub revenue_rub: i64,
}

/// Строка для месячной аналитики.
#[derive(Debug, Clone, FromRow)]
pub struct NewUserRow {
    pub user_id: i64,
    pub ref_id: Option<String>,
    pub stamp: Option<String>,
    pub is_paid: bool,
    pub is_connected: bool,
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum GiftActivationError {
    #[error("Подарок не найден")]
    NotFound,
    #[error("Подарок уже активирован")]
    AlreadyUsed,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

pub const PAYMENT_PENDING: &str = "pending";
pub const PAYMENT_CONFIRMED: &str = "confirmed";
pub const PAYMENT_CANCELED: &str = "canceled";
pub const INVOICE_ACTIVE: &str = "active";
pub const INVOICE_PAID: &str = "paid";
pub const INVOICE_EXPIRED: &str = "expired";

pub const BROADCAST_SENT: &str = "sent";
pub const BROADCAST_FAILED: &str = "failed";

pub struct Db {
    pool: SqlitePool,
}

pub fn current_unix_timestamp() -> Result<i64, anyhow::Error> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .map_err(|err| anyhow::anyhow!("Системное время меньше UNIX_EPOCH: {}", err))
}

/// Начало календарных суток UTC для отметок «уже отправляли сегодня».
pub fn utc_day_start(ts: i64) -> i64 {
    ts - ts.rem_euclid(86_400)
}

impl Db {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Не удалось создать директорию для БД: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true);
        Self::open_with(opts).await
    }

    async fn open_with(opts: SqliteConnectOptions) -> Result<Self, anyhow::Error> {
        let pool = SqlitePool::connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Не удалось подключиться к SQLite: {}", e))?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    // Один коннект: каждая новая связь с ":memory:" получила бы пустую БД.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, anyhow::Error> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Не удалось подключиться к SQLite: {}", e))?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                ref_id TEXT,
                stamp TEXT,
                ttclid TEXT,
                is_delete INTEGER NOT NULL DEFAULT 0,
                is_paid INTEGER NOT NULL DEFAULT 0,
                is_connected INTEGER NOT NULL DEFAULT 0,
                in_channel INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                subscription_end INTEGER,
                white_subscription_end INTEGER,
                last_notification_at INTEGER,
                last_broadcast_status TEXT,
                last_broadcast_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_users_user_id ON users(user_id);
            CREATE INDEX IF NOT EXISTS idx_users_ref ON users(ref_id);
            CREATE INDEX IF NOT EXISTS idx_users_stamp ON users(stamp);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция users: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS platega_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL,
                transaction_id TEXT NOT NULL,
                is_gift INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_platega_status ON platega_payments(status);
            CREATE INDEX IF NOT EXISTS idx_platega_tx ON platega_payments(transaction_id);

            CREATE TABLE IF NOT EXISTS stars_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'confirmed',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS cryptobot_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                amount REAL NOT NULL,
                currency TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                invoice_id INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cryptobot_status ON cryptobot_payments(status);

            CREATE TABLE IF NOT EXISTS gifts (
                gift_id TEXT PRIMARY KEY,
                giver_id INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                white INTEGER NOT NULL DEFAULT 0,
                recipient_id INTEGER,
                activated INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS white_counter (
                user_id INTEGER PRIMARY KEY,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS online_stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                day TEXT NOT NULL UNIQUE,
                panel_total INTEGER NOT NULL,
                active_today INTEGER NOT NULL,
                paying INTEGER NOT NULL,
                trial INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("Миграция платёжных таблиц: {}", e))?;

        self.ensure_column_exists("users", "stamp", "TEXT").await?;
        self.ensure_column_exists("users", "ttclid", "TEXT").await?;
        self.ensure_column_exists("users", "last_broadcast_status", "TEXT")
            .await?;
        self.ensure_column_exists("users", "last_broadcast_at", "INTEGER")
            .await?;

        Ok(())
    }

    async fn ensure_column_exists(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
    ) -> Result<(), anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = '{}'",
            table, column
        ))
        .fetch_one(&self.pool)
        .await?;
        if count == 0 {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table, column, sql_type
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ---- users ----

    /// Регистрирует нового пользователя. Возвращает true, если запись создана.
    pub async fn register_user(
        &self,
        user_id: i64,
        referrer: Option<i64>,
        stamp: Option<&str>,
    ) -> Result<bool, anyhow::Error> {
        let now = current_unix_timestamp()?;
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO users (user_id, ref_id, stamp, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(referrer.map(|id| id.to_string()))
        .bind(stamp)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(inserted > 0)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<ShopUser>, anyhow::Error> {
        let user = sqlx::query_as::<_, ShopUser>("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn set_paid(&self, user_id: i64) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET is_paid = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_connected(&self, user_id: i64, connected: bool) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET is_connected = ? WHERE user_id = ?")
            .bind(connected)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_in_channel(&self, user_id: i64) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET in_channel = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_deleted(&self, user_id: i64, deleted: bool) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET is_delete = ? WHERE user_id = ?")
            .bind(deleted)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_ttclid(
        &self,
        user_id: i64,
        ttclid: &str,
        stamp: &str,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET ttclid = ?, stamp = ? WHERE user_id = ?")
            .bind(ttclid)
            .bind(stamp)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn referral_count(&self, user_id: i64) -> Result<i64, anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE ref_id = ?")
            .bind(user_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let deleted = sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    // ---- зеркало сроков подписки ----

    pub async fn set_subscription_end(&self, user_id: i64, ts: i64) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET subscription_end = ? WHERE user_id = ?")
            .bind(ts)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_white_subscription_end(
        &self,
        user_id: i64,
        ts: i64,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET white_subscription_end = ? WHERE user_id = ?")
            .bind(ts)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn subscription_end(&self, user_id: i64) -> Result<Option<i64>, anyhow::Error> {
        let ts = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT subscription_end FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ts.flatten())
    }

    // ---- напоминания и рассылки ----

    pub async fn last_notification_at(&self, user_id: i64) -> Result<Option<i64>, anyhow::Error> {
        let ts = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT last_notification_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ts.flatten())
    }

    pub async fn notification_sent_today(&self, user_id: i64) -> Result<bool, anyhow::Error> {
        let now = current_unix_timestamp()?;
        let last = self.last_notification_at(user_id).await?;
        Ok(last.is_some_and(|ts| utc_day_start(ts) == utc_day_start(now)))
    }

    pub async fn mark_notification_sent(&self, user_id: i64) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query("UPDATE users SET last_notification_at = ? WHERE user_id = ?")
            .bind(now)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_broadcast_status(
        &self,
        user_id: i64,
        status: &str,
    ) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query(
            "UPDATE users SET last_broadcast_status = ?, last_broadcast_at = ? WHERE user_id = ?",
        )
        .bind(status)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- сегменты для рассылок и пушей ----

    pub async fn list_active_users(&self) -> Result<Vec<i64>, anyhow::Error> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users WHERE is_delete = 0")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn segment(&self, condition: &str) -> Result<Vec<i64>, anyhow::Error> {
        let now = current_unix_timestamp()?;
        let today = utc_day_start(now);
        let sql = format!(
            "SELECT user_id FROM users WHERE is_delete = 0 \
             AND (last_broadcast_at IS NULL OR last_broadcast_at < ?) AND ({})",
            condition
        );
        let ids = sqlx::query_scalar::<_, i64>(&sql)
            .bind(today)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn segment_not_connected_subscribed(&self) -> Result<Vec<i64>, anyhow::Error> {
        self.segment("is_paid = 1 AND is_connected = 0 AND subscription_end > ?")
            .await
    }

    pub async fn segment_not_connected_expired(&self) -> Result<Vec<i64>, anyhow::Error> {
        self.segment(
            "is_paid = 1 AND is_connected = 0 \
             AND (subscription_end IS NULL OR subscription_end <= ?)",
        )
        .await
    }

    pub async fn segment_connected_expired(&self) -> Result<Vec<i64>, anyhow::Error> {
        self.segment(
            "is_paid = 1 AND is_connected = 1 \
             AND (subscription_end IS NULL OR subscription_end <= ?)",
        )
        .await
    }

    pub async fn segment_connected_subscribed(&self) -> Result<Vec<i64>, anyhow::Error> {
        self.segment("is_paid = 1 AND is_connected = 1 AND subscription_end > ?")
            .await
    }

    pub async fn segment_not_subscribed(&self) -> Result<Vec<i64>, anyhow::Error> {
        // Бинд now не участвует в условии, но сигнатура запроса едина.
        self.segment("is_paid = 0 AND ? > 0").await
    }

    // ---- платежи ----

    pub async fn add_platega_payment(
        &self,
        user_id: i64,
        amount: i64,
        status: &str,
        transaction_id: &str,
        is_gift: bool,
    ) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query(
            "INSERT INTO platega_payments (user_id, amount, status, transaction_id, is_gift, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(status)
        .bind(transaction_id)
        .bind(is_gift)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn pending_platega_payments(&self) -> Result<Vec<PlategaPayment>, anyhow::Error> {
        let rows = sqlx::query_as::<_, PlategaPayment>(
            "SELECT * FROM platega_payments WHERE status = ?",
        )
        .bind(PAYMENT_PENDING)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_platega_status(
        &self,
        transaction_id: &str,
        status: &str,
    ) -> Result<bool, anyhow::Error> {
        let updated = sqlx::query("UPDATE platega_payments SET status = ? WHERE transaction_id = ?")
            .bind(status)
            .bind(transaction_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    pub async fn add_stars_payment(&self, user_id: i64, amount: i64) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query(
            "INSERT INTO stars_payments (user_id, amount, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(PAYMENT_CONFIRMED)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_cryptobot_payment(
        &self,
        user_id: i64,
        amount: f64,
        currency: &str,
        invoice_id: i64,
        payload: &str,
    ) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query(
            "INSERT INTO cryptobot_payments (user_id, amount, currency, status, invoice_id, payload, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(amount)
        .bind(currency)
        .bind(INVOICE_ACTIVE)
        .bind(invoice_id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn active_cryptobot_payments(&self) -> Result<Vec<CryptoPayment>, anyhow::Error> {
        let rows = sqlx::query_as::<_, CryptoPayment>(
            "SELECT * FROM cryptobot_payments WHERE status = ?",
        )
        .bind(INVOICE_ACTIVE)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn set_cryptobot_status(
        &self,
        invoice_id: i64,
        status: &str,
    ) -> Result<bool, anyhow::Error> {
        let updated = sqlx::query("UPDATE cryptobot_payments SET status = ? WHERE invoice_id = ?")
            .bind(status)
            .bind(invoice_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated > 0)
    }

    // ---- подарки ----

    pub async fn create_gift(
        &self,
        giver_id: i64,
        duration: i64,
        white: bool,
    ) -> Result<String, anyhow::Error> {
        let gift_id = uuid::Uuid::new_v4().to_string();
        let now = current_unix_timestamp()?;
        sqlx::query(
            "INSERT INTO gifts (gift_id, giver_id, duration, white, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&gift_id)
        .bind(giver_id)
        .bind(duration)
        .bind(white)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(gift_id)
    }

    /// Одноразовая активация: фиксирует получателя и возвращает параметры подарка.
    pub async fn activate_gift(
        &self,
        gift_id: &str,
        recipient_id: i64,
    ) -> Result<Gift, GiftActivationError> {
        let gift = sqlx::query_as::<_, Gift>("SELECT * FROM gifts WHERE gift_id = ?")
            .bind(gift_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(GiftActivationError::NotFound)?;
        if gift.activated || gift.recipient_id.is_some() {
            return Err(GiftActivationError::AlreadyUsed);
        }

        let updated = sqlx::query(
            "UPDATE gifts SET recipient_id = ?, activated = 1 \
             WHERE gift_id = ? AND activated = 0 AND recipient_id IS NULL",
        )
        .bind(recipient_id)
        .bind(gift_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(GiftActivationError::AlreadyUsed);
        }
        Ok(gift)
    }

    // ---- интерес к white-тарифу ----

    pub async fn add_white_interest(&self, user_id: i64) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query("INSERT OR IGNORE INTO white_counter (user_id, created_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- ежедневная статистика онлайна ----

    pub async fn add_online_stats(
        &self,
        day: &str,
        panel_total: i64,
        active_today: i64,
        paying: i64,
        trial: i64,
    ) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        sqlx::query(
            "INSERT OR IGNORE INTO online_stats (day, panel_total, active_today, paying, trial, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(day)
        .bind(panel_total)
        .bind(active_today)
        .bind(paying)
        .bind(trial)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn has_online_stats_for(&self, day: &str) -> Result<bool, anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM online_stats WHERE day = ?")
            .bind(day)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    // ---- статистика по источникам ----

    pub async fn source_stats(&self, source: &str) -> Result<Option<SourceStats>, anyhow::Error> {
        let by_ref = self.source_stats_where("ref_id = ?", source).await?;
        if by_ref.total > 0 {
            return Ok(Some(by_ref));
        }
        let by_stamp = self.source_stats_where("stamp = ?", source).await?;
        if by_stamp.total > 0 {
            return Ok(Some(by_stamp));
        }
        Ok(None)
    }

    async fn source_stats_where(
        &self,
        condition: &str,
        source: &str,
    ) -> Result<SourceStats, anyhow::Error> {
        let row = sqlx::query_as::<_, (i64, i64, i64)>(&format!(
            "SELECT COUNT(*), \
                    COALESCE(SUM(subscription_end IS NOT NULL), 0), \
                    COALESCE(SUM(is_connected), 0) \
             FROM users WHERE {}",
            condition
        ))
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        let revenue = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COALESCE(SUM(p.amount), 0) FROM platega_payments p \
             JOIN users u ON u.user_id = p.user_id \
             WHERE p.status = 'confirmed' AND u.{}",
            condition
        ))
        .bind(source)
        .fetch_one(&self.pool)
        .await?;
        Ok(SourceStats {
            total: row.0,
            with_sub: row.1,
            connected: row.2,
            revenue_rub: revenue,
        })
    }

    // ---- данные для месячной аналитики ----

    pub async fn users_created_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<NewUserRow>, anyhow::Error> {
        let rows = sqlx::query_as::<_, NewUserRow>(
            "SELECT user_id, ref_id, stamp, is_paid, is_connected, created_at \
             FROM users WHERE created_at >= ? AND created_at < ?",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn confirmed_rub_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<i64>, anyhow::Error> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT amount FROM platega_payments \
             WHERE status = 'confirmed' AND created_at >= ? AND created_at < ?",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn confirmed_stars_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<i64>, anyhow::Error> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT amount FROM stars_payments \
             WHERE status = 'confirmed' AND created_at >= ? AND created_at < ?",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn paid_crypto_between(
        &self,
        from: i64,
        to: i64,
    ) -> Result<Vec<(f64, String)>, anyhow::Error> {
        let rows = sqlx::query_as::<_, (f64, String)>(
            "SELECT amount, currency FROM cryptobot_payments \
             WHERE status = 'paid' AND created_at >= ? AND created_at < ?",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn gifts_created_between(&self, from: i64, to: i64) -> Result<i64, anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM gifts WHERE created_at >= ? AND created_at < ?",
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // ---- выгрузки для экспорта ----

    pub async fn dump_users(&self) -> Result<Vec<ShopUser>, anyhow::Error> {
        Ok(sqlx::query_as::<_, ShopUser>("SELECT * FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn dump_platega(&self) -> Result<Vec<PlategaPayment>, anyhow::Error> {
        Ok(
            sqlx::query_as::<_, PlategaPayment>("SELECT * FROM platega_payments ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn dump_stars(&self) -> Result<Vec<StarsPayment>, anyhow::Error> {
        Ok(
            sqlx::query_as::<_, StarsPayment>("SELECT * FROM stars_payments ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn dump_cryptobot(&self) -> Result<Vec<CryptoPayment>, anyhow::Error> {
        Ok(
            sqlx::query_as::<_, CryptoPayment>("SELECT * FROM cryptobot_payments ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn dump_gifts(&self) -> Result<Vec<Gift>, anyhow::Error> {
        Ok(
            sqlx::query_as::<_, Gift>("SELECT * FROM gifts ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn dump_white_counter(&self) -> Result<Vec<WhiteInterest>, anyhow::Error> {
        Ok(
            sqlx::query_as::<_, WhiteInterest>("SELECT * FROM white_counter ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn dump_online(&self) -> Result<Vec<OnlineStats>, anyhow::Error> {
        Ok(sqlx::query_as::<_, OnlineStats>(
            "SELECT day, panel_total, active_today, paying, trial FROM online_stats ORDER BY day",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Db {
        Db::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn register_is_idempotent_and_keeps_referrer() {
        let db = db().await;
        assert!(db.register_user(100, Some(7), None).await.unwrap());
        assert!(!db.register_user(100, None, Some("promo")).await.unwrap());

        let user = db.get_user(100).await.unwrap().unwrap();
        assert_eq!(user.ref_id.as_deref(), Some("7"));
        assert_eq!(user.stamp, None);
        assert!(!user.is_paid);
    }

    #[tokio::test]
    async fn referral_count_matches_by_referrer_id() {
        let db = db().await;
        db.register_user(1, None, None).await.unwrap();
        db.register_user(2, Some(1), None).await.unwrap();
        db.register_user(3, Some(1), None).await.unwrap();
        db.register_user(4, Some(2), None).await.unwrap();
        assert_eq!(db.referral_count(1).await.unwrap(), 2);
        assert_eq!(db.referral_count(4).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn segments_respect_flags_and_subscription() {
        let db = db().await;
        let now = current_unix_timestamp().unwrap();
        for id in 1..=5 {
            db.register_user(id, None, None).await.unwrap();
        }
        // 1: оплачен, не подключён, подписка активна
        db.set_paid(1).await.unwrap();
        db.set_subscription_end(1, now + 86_400).await.unwrap();
        // 2: оплачен, не подключён, подписка истекла
        db.set_paid(2).await.unwrap();
        db.set_subscription_end(2, now - 86_400).await.unwrap();
        // 3: оплачен, подключён, подписка активна
        db.set_paid(3).await.unwrap();
        db.set_connected(3, true).await.unwrap();
        db.set_subscription_end(3, now + 86_400).await.unwrap();
        // 4: не платил; 5: удалён
        db.set_deleted(5, true).await.unwrap();

        assert_eq!(db.segment_not_connected_subscribed().await.unwrap(), vec![1]);
        assert_eq!(db.segment_not_connected_expired().await.unwrap(), vec![2]);
        assert_eq!(db.segment_connected_subscribed().await.unwrap(), vec![3]);
        assert!(db.segment_connected_expired().await.unwrap().is_empty());
        assert_eq!(db.segment_not_subscribed().await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn broadcast_today_guard_hides_user_from_segments() {
        let db = db().await;
        db.register_user(1, None, None).await.unwrap();
        assert_eq!(db.segment_not_subscribed().await.unwrap(), vec![1]);

        db.set_broadcast_status(1, BROADCAST_SENT).await.unwrap();
        assert!(db.segment_not_subscribed().await.unwrap().is_empty());

        let user = db.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.last_broadcast_status.as_deref(), Some(BROADCAST_SENT));
    }

    #[tokio::test]
    async fn notification_guard_flips_after_mark() {
        let db = db().await;
        db.register_user(1, None, None).await.unwrap();

        assert!(db.last_notification_at(1).await.unwrap().is_none());
        assert!(!db.notification_sent_today(1).await.unwrap());

        db.mark_notification_sent(1).await.unwrap();
        let marked = db.last_notification_at(1).await.unwrap().unwrap();
        assert!(marked <= current_unix_timestamp().unwrap());
        assert!(db.notification_sent_today(1).await.unwrap());
    }

    #[tokio::test]
    async fn gift_activates_exactly_once() {
        let db = db().await;
        let gift_id = db.create_gift(10, 90, false).await.unwrap();

        let gift = db.activate_gift(&gift_id, 20).await.unwrap();
        assert_eq!(gift.duration, 90);
        assert!(!gift.white);

        match db.activate_gift(&gift_id, 30).await {
            Err(GiftActivationError::AlreadyUsed) => {}
            other => panic!("повторная активация должна падать: {:?}", other.map(|g| g.gift_id)),
        }
        match db.activate_gift("no-such-gift", 30).await {
            Err(GiftActivationError::NotFound) => {}
            other => panic!("неизвестный подарок должен падать: {:?}", other.map(|g| g.gift_id)),
        }
    }

    #[tokio::test]
    async fn platega_poll_cycle() {
        let db = db().await;
        db.add_platega_payment(1, 99, PAYMENT_PENDING, "tx-1", false)
            .await
            .unwrap();
        db.add_platega_payment(2, 269, PAYMENT_CONFIRMED, "tx-2", false)
            .await
            .unwrap();

        let pending = db.pending_platega_payments().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transaction_id, "tx-1");

        assert!(db.set_platega_status("tx-1", PAYMENT_CONFIRMED).await.unwrap());
        assert!(db.pending_platega_payments().await.unwrap().is_empty());
        assert!(!db.set_platega_status("tx-404", PAYMENT_CANCELED).await.unwrap());
    }

    #[tokio::test]
    async fn cryptobot_poll_cycle_keeps_payload() {
        let db = db().await;
        db.add_cryptobot_payment(1, 2.5, "TON", 777, "user_id:1,duration:90")
            .await
            .unwrap();

        let active = db.active_cryptobot_payments().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].invoice_id, 777);
        assert!(active[0].payload.starts_with("user_id:1"));

        assert!(db.set_cryptobot_status(777, INVOICE_PAID).await.unwrap());
        assert!(db.active_cryptobot_payments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn source_stats_prefers_referrer_match() {
        let db = db().await;
        db.register_user(1, Some(99), None).await.unwrap();
        db.register_user(2, Some(99), None).await.unwrap();
        db.register_user(3, None, Some("promo")).await.unwrap();
        db.set_connected(1, true).await.unwrap();
        db.set_subscription_end(1, 1).await.unwrap();
        db.add_platega_payment(1, 99, PAYMENT_CONFIRMED, "tx-1", false)
            .await
            .unwrap();

        let by_ref = db.source_stats("99").await.unwrap().unwrap();
        assert_eq!(by_ref.total, 2);
        assert_eq!(by_ref.with_sub, 1);
        assert_eq!(by_ref.connected, 1);
        assert_eq!(by_ref.revenue_rub, 99);

        let by_stamp = db.source_stats("promo").await.unwrap().unwrap();
        assert_eq!(by_stamp.total, 1);
        assert!(db.source_stats("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn white_interest_and_online_stats_deduplicate() {
        let db = db().await;
        db.add_white_interest(5).await.unwrap();
        db.add_white_interest(5).await.unwrap();
        assert_eq!(db.dump_white_counter().await.unwrap().len(), 1);

        db.add_online_stats("2026-08-27", 100, 40, 30, 10).await.unwrap();
        db.add_online_stats("2026-08-27", 999, 1, 1, 1).await.unwrap();
        assert!(db.has_online_stats_for("2026-08-27").await.unwrap());
        assert!(!db.has_online_stats_for("2026-08-28").await.unwrap());
        let rows = db.dump_online().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].panel_total, 100);
    }

    #[test]
    fn utc_day_start_truncates() {
        assert_eq!(utc_day_start(86_400 + 5), 86_400);
        assert_eq!(utc_day_start(86_400), 86_400);
        assert_eq!(utc_day_start(100), 0);
    }
}
