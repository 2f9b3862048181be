//! Per-cycle run summary consumed by operational tooling.

use crate::Chain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a recorded cycle error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleErrorKind {
    /// Entitlement reaping failed; no items were polled.
    Reap,
    /// Loading watchlist items failed.
    Load,
    /// Fetch failed or timed out.
    Provider,
    /// Alert insertion failed for a non-duplicate reason.
    Persistence,
    /// Cursor could not be advanced.
    Cursor,
    /// Notification dispatch failed or timed out.
    Notification,
    /// The cycle was cancelled before the item finished.
    Cancelled,
}

impl CycleErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CycleErrorKind::Reap => "reap",
            CycleErrorKind::Load => "load",
            CycleErrorKind::Provider => "provider",
            CycleErrorKind::Persistence => "persistence",
            CycleErrorKind::Cursor => "cursor",
            CycleErrorKind::Notification => "notification",
            CycleErrorKind::Cancelled => "cancelled",
        }
    }
}

/// One error recorded during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleError {
    pub kind: CycleErrorKind,
    pub item_id: Option<i64>,
    pub address: Option<String>,
    pub chain: Option<Chain>,
    pub transaction_hash: Option<String>,
    pub message: String,
}

impl CycleError {
    /// Error not tied to an item (reap, load).
    pub fn global(kind: CycleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            item_id: None,
            address: None,
            chain: None,
            transaction_hash: None,
            message: message.into(),
        }
    }

    pub fn for_item(
        kind: CycleErrorKind,
        item_id: i64,
        address: &str,
        chain: Chain,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            item_id: Some(item_id),
            address: Some(address.to_string()),
            chain: Some(chain),
            transaction_hash: None,
            message: message.into(),
        }
    }

    /// Error for a stored row whose chain could not be resolved.
    pub fn for_row(
        kind: CycleErrorKind,
        item_id: i64,
        address: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            item_id: Some(item_id),
            address: Some(address.to_string()),
            chain: None,
            transaction_hash: None,
            message: message.into(),
        }
    }

    pub fn with_transaction(mut self, hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(hash.into());
        self
    }
}

/// Outcome of one item's pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReport {
    pub item_id: i64,
    pub address: String,
    pub chain: Chain,
    pub fetched: usize,
    pub new_transactions: usize,
    pub alerts_created: u32,
    pub duplicates_skipped: u32,
    pub cursor_advanced: bool,
}

/// Summary of one monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub wallets_checked: u32,
    pub alerts_created: u32,
    pub duplicates_skipped: u32,
    pub notifications_sent: u32,
    pub users_reaped: u64,
    pub items_reaped: u64,
    pub cancelled: bool,
    pub errors: Vec<CycleError>,
    pub items: Vec<ItemReport>,
    pub duration_seconds: f64,
    pub timestamp: DateTime<Utc>,
}

impl RunSummary {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            wallets_checked: 0,
            alerts_created: 0,
            duplicates_skipped: 0,
            notifications_sent: 0,
            users_reaped: 0,
            items_reaped: 0,
            cancelled: false,
            errors: Vec::new(),
            items: Vec::new(),
            duration_seconds: 0.0,
            timestamp,
        }
    }

    /// Whether nothing went wrong during the cycle.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Errors of one kind.
    pub fn errors_of(&self, kind: CycleErrorKind) -> impl Iterator<Item = &CycleError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    /// Report for a specific item, if it completed.
    pub fn item(&self, item_id: i64) -> Option<&ItemReport> {
        self.items.iter().find(|r| r.item_id == item_id)
    }
}
