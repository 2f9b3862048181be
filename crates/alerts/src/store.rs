//! Storage operations the monitoring cycle depends on.

use crate::db::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use watchlist_core::{NewAlert, TransactionAlert, WatchedItem};

/// Result of one reaping pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapOutcome {
    /// Lapsed users whose items were deleted by this pass.
    pub user_ids: Vec<String>,
    /// Watchlist items deleted.
    pub items_deleted: u64,
}

/// A watchlist row that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedItem {
    pub item_id: i64,
    pub address: String,
    pub reason: String,
}

/// Items loaded for a cycle, plus the rows that were skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedItems {
    pub items: Vec<WatchedItem>,
    pub rejected: Vec<RejectedItem>,
}

/// Durable state behind a monitoring cycle.
///
/// Implementations must enforce uniqueness of (`user_id`, `transaction_hash`)
/// on alerts and report a violation as [`DbError::DuplicateAlert`].
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Delete every item owned by a non-premium user whose trial ended at or
    /// before `now`, atomically.
    async fn reap_expired_trials(&self, now: DateTime<Utc>) -> Result<ReapOutcome, DbError>;

    /// All watchlist items with their owner's entitlement and routing fields.
    /// Rows that fail to decode are reported in `rejected` instead of
    /// failing the load.
    async fn load_watched_items(&self) -> Result<LoadedItems, DbError>;

    /// Insert an alert, or fail with [`DbError::DuplicateAlert`].
    async fn insert_alert(&self, alert: &NewAlert) -> Result<TransactionAlert, DbError>;

    /// Move an item's cursor forward to `to`. Never moves it backwards.
    /// Returns false if the item no longer exists.
    async fn advance_cursor(&self, item_id: i64, to: DateTime<Utc>) -> Result<bool, DbError>;
}
