//! SQLite database for users, watchlist items and transaction alerts.
//!
//! Timestamps are stored as Unix milliseconds so range comparisons stay
//! numeric. The `(user_id, transaction_hash)` unique index on alerts is what
//! makes concurrent and repeated cycles safe.

use crate::store::{AlertStore, LoadedItems, ReapOutcome, RejectedItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;
use watchlist_core::{
    AlertType, Chain, NewAlert, NewWatchlistItem, Owner, TransactionAlert, User, WatchedItem,
    WatchlistItem,
};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Alert already recorded for user {user_id}: {transaction_hash}")]
    DuplicateAlert {
        user_id: String,
        transaction_hash: String,
    },
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Whether this is the expected uniqueness outcome on alert insertion.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DbError::DuplicateAlert { .. })
    }
}

type UserRow = (String, bool, Option<i64>, Option<String>, Option<String>);

type ItemRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
);

type WatchedRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    i64,
    bool,
    Option<i64>,
    Option<String>,
);

type AlertRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    i64,
    bool,
);

const ITEM_COLUMNS: &str =
    "id, user_id, address, chain, token_address, token_symbol, label, last_checked";

const ALERT_COLUMNS: &str = "id, user_id, wallet_address, chain, transaction_hash, from_address, \
     to_address, value, token_address, token_symbol, token_amount, type, created_at, is_read";

fn from_millis(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp out of range: {}", ms)))
}

fn parse_chain(raw: &str) -> Result<Chain, DbError> {
    Chain::from_str(raw).map_err(|e| DbError::Corrupt(e.to_string()))
}

fn user_from_row(row: UserRow) -> Result<User, DbError> {
    let (id, is_premium, trial_ends_at, telegram_chat_id, telegram_username) = row;
    Ok(User {
        id,
        is_premium,
        trial_ends_at: trial_ends_at.map(from_millis).transpose()?,
        telegram_chat_id,
        telegram_username,
    })
}

fn item_from_row(row: ItemRow) -> Result<WatchlistItem, DbError> {
    let (id, user_id, address, chain, token_address, token_symbol, label, last_checked) = row;
    Ok(WatchlistItem {
        id,
        user_id,
        address,
        chain: parse_chain(&chain)?,
        token_address,
        token_symbol,
        last_checked: from_millis(last_checked)?,
        label,
    })
}

fn watched_from_row(row: WatchedRow) -> Result<WatchedItem, DbError> {
    let (
        id,
        user_id,
        address,
        chain,
        token_address,
        token_symbol,
        label,
        last_checked,
        is_premium,
        trial_ends_at,
        telegram_chat_id,
    ) = row;
    let owner = Owner {
        user_id: user_id.clone(),
        is_premium,
        trial_ends_at: trial_ends_at.map(from_millis).transpose()?,
        telegram_chat_id,
    };
    let item = item_from_row((
        id,
        user_id,
        address,
        chain,
        token_address,
        token_symbol,
        label,
        last_checked,
    ))?;
    Ok(WatchedItem { item, owner })
}

fn alert_from_row(row: AlertRow) -> Result<TransactionAlert, DbError> {
    let (
        id,
        user_id,
        wallet_address,
        chain,
        transaction_hash,
        from_address,
        to_address,
        value,
        token_address,
        token_symbol,
        token_amount,
        alert_type,
        created_at,
        is_read,
    ) = row;
    Ok(TransactionAlert {
        id,
        user_id,
        wallet_address,
        chain: parse_chain(&chain)?,
        transaction_hash,
        from_address,
        to_address,
        value,
        token_address,
        token_symbol,
        token_amount,
        alert_type: AlertType::from_str(&alert_type).map_err(DbError::Corrupt)?,
        created_at: from_millis(created_at)?,
        is_read,
    })
}

/// Database connection for the watchlist monitor.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite database at the given path.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                is_premium INTEGER NOT NULL DEFAULT 0,
                trial_ends_at INTEGER,
                telegram_chat_id TEXT,
                telegram_username TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS watchlist_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                address TEXT NOT NULL,
                chain TEXT NOT NULL,
                token_address TEXT,
                token_symbol TEXT,
                label TEXT,
                last_checked INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_watchlist_items_user ON watchlist_items(user_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transaction_alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                wallet_address TEXT NOT NULL,
                chain TEXT NOT NULL,
                transaction_hash TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                value TEXT NOT NULL,
                token_address TEXT,
                token_symbol TEXT,
                token_amount TEXT,
                type TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                UNIQUE(user_id, transaction_hash)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_recent_alerts
            ON transaction_alerts(user_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a user or update its entitlement and Telegram fields.
    pub async fn upsert_user(&self, user: &User) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, is_premium, trial_ends_at, telegram_chat_id, telegram_username, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                is_premium = excluded.is_premium,
                trial_ends_at = excluded.trial_ends_at,
                telegram_chat_id = excluded.telegram_chat_id,
                telegram_username = excluded.telegram_username
            "#,
        )
        .bind(&user.id)
        .bind(user.is_premium)
        .bind(user.trial_ends_at.map(|t| t.timestamp_millis()))
        .bind(&user.telegram_chat_id)
        .bind(&user.telegram_username)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, is_premium, trial_ends_at, telegram_chat_id, telegram_username FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    /// Find the user a Telegram chat is linked to.
    pub async fn find_user_by_chat_id(&self, chat_id: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, is_premium, trial_ends_at, telegram_chat_id, telegram_username FROM users WHERE telegram_chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    /// Link a Telegram chat to an existing user.
    pub async fn link_telegram(
        &self,
        user_id: &str,
        chat_id: &str,
        username: Option<&str>,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            "UPDATE users SET telegram_chat_id = ?, telegram_username = ? WHERE id = ?",
        )
        .bind(chat_id)
        .bind(username)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::UserNotFound(user_id.to_string()));
        }
        Ok(())
    }

    /// Register a watchlist item for an existing user.
    pub async fn add_watchlist_item(
        &self,
        item: &NewWatchlistItem,
    ) -> Result<WatchlistItem, DbError> {
        if self.get_user(&item.user_id).await?.is_none() {
            return Err(DbError::UserNotFound(item.user_id.clone()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO watchlist_items (user_id, address, chain, token_address, token_symbol, label, last_checked, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.user_id)
        .bind(&item.address)
        .bind(item.chain.slug())
        .bind(&item.token_address)
        .bind(&item.token_symbol)
        .bind(&item.label)
        .bind(item.last_checked.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(WatchlistItem {
            id: result.last_insert_rowid(),
            user_id: item.user_id.clone(),
            address: item.address.clone(),
            chain: item.chain,
            token_address: item.token_address.clone(),
            token_symbol: item.token_symbol.clone(),
            // Stored at millisecond precision.
            last_checked: from_millis(item.last_checked.timestamp_millis())?,
            label: item.label.clone(),
        })
    }

    /// Remove one of a user's items. Returns false if it did not exist.
    pub async fn remove_watchlist_item(&self, user_id: &str, item_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM watchlist_items WHERE id = ? AND user_id = ?")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_item(&self, item_id: i64) -> Result<Option<WatchlistItem>, DbError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM watchlist_items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(item_from_row).transpose()
    }

    pub async fn list_items_for_user(&self, user_id: &str) -> Result<Vec<WatchlistItem>, DbError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM watchlist_items WHERE user_id = ? ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(item_from_row).collect()
    }

    /// Most recent alerts for a user, newest first.
    pub async fn recent_alerts_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<TransactionAlert>, DbError> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM transaction_alerts WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            ALERT_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(alert_from_row).collect()
    }

    pub async fn count_alerts_for_user(&self, user_id: &str) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM transaction_alerts WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl AlertStore for Database {
    async fn reap_expired_trials(&self, now: DateTime<Utc>) -> Result<ReapOutcome, DbError> {
        let now_ms = now.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let user_ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT w.user_id FROM watchlist_items w
            JOIN users u ON u.id = w.user_id
            WHERE u.is_premium = 0 AND u.trial_ends_at IS NOT NULL AND u.trial_ends_at <= ?
            ORDER BY w.user_id
            "#,
        )
        .bind(now_ms)
        .fetch_all(&mut *tx)
        .await?;

        if user_ids.is_empty() {
            tx.commit().await?;
            return Ok(ReapOutcome::default());
        }

        let deleted = sqlx::query(
            r#"
            DELETE FROM watchlist_items
            WHERE user_id IN (
                SELECT id FROM users
                WHERE is_premium = 0 AND trial_ends_at IS NOT NULL AND trial_ends_at <= ?
            )
            "#,
        )
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReapOutcome {
            user_ids,
            items_deleted: deleted.rows_affected(),
        })
    }

    async fn load_watched_items(&self) -> Result<LoadedItems, DbError> {
        let rows = sqlx::query_as::<_, WatchedRow>(
            r#"
            SELECT w.id, w.user_id, w.address, w.chain, w.token_address, w.token_symbol, w.label,
                   w.last_checked, u.is_premium, u.trial_ends_at, u.telegram_chat_id
            FROM watchlist_items w
            JOIN users u ON u.id = w.user_id
            ORDER BY w.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut loaded = LoadedItems::default();
        for row in rows {
            let (item_id, address) = (row.0, row.2.clone());
            match watched_from_row(row) {
                Ok(watched) => loaded.items.push(watched),
                Err(e) => {
                    warn!(item_id, error = %e, "Skipping undecodable watchlist row");
                    loaded.rejected.push(RejectedItem {
                        item_id,
                        address,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(loaded)
    }

    async fn insert_alert(&self, alert: &NewAlert) -> Result<TransactionAlert, DbError> {
        let created_at = from_millis(Utc::now().timestamp_millis())?;

        let result = sqlx::query(
            r#"
            INSERT INTO transaction_alerts (
                user_id, wallet_address, chain, transaction_hash, from_address, to_address,
                value, token_address, token_symbol, token_amount, type, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.user_id)
        .bind(&alert.wallet_address)
        .bind(alert.chain.slug())
        .bind(&alert.transaction_hash)
        .bind(&alert.from_address)
        .bind(&alert.to_address)
        .bind(&alert.value)
        .bind(&alert.token_address)
        .bind(&alert.token_symbol)
        .bind(&alert.token_amount)
        .bind(alert.alert_type.as_str())
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await;

        let result = match result {
            Ok(result) => result,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(DbError::DuplicateAlert {
                    user_id: alert.user_id.clone(),
                    transaction_hash: alert.transaction_hash.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        Ok(TransactionAlert {
            id: result.last_insert_rowid(),
            user_id: alert.user_id.clone(),
            wallet_address: alert.wallet_address.clone(),
            chain: alert.chain,
            transaction_hash: alert.transaction_hash.clone(),
            from_address: alert.from_address.clone(),
            to_address: alert.to_address.clone(),
            value: alert.value.clone(),
            token_address: alert.token_address.clone(),
            token_symbol: alert.token_symbol.clone(),
            token_amount: alert.token_amount.clone(),
            alert_type: alert.alert_type,
            created_at,
            is_read: false,
        })
    }

    async fn advance_cursor(&self, item_id: i64, to: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE watchlist_items SET last_checked = MAX(last_checked, ?) WHERE id = ?",
        )
        .bind(to.timestamp_millis())
        .bind(item_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
