//! Users and the wallets they watch.

use crate::Chain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account fields the monitor reads for entitlement and routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub is_premium: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Linked Telegram chat, if the user connected one.
    pub telegram_chat_id: Option<String>,
    pub telegram_username: Option<String>,
}

impl User {
    /// Create a user on a trial ending at `trial_ends_at`.
    pub fn trial(id: impl Into<String>, trial_ends_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            is_premium: false,
            trial_ends_at: Some(trial_ends_at),
            telegram_chat_id: None,
            telegram_username: None,
        }
    }

    /// Create a paying user.
    pub fn premium(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_premium: true,
            trial_ends_at: None,
            telegram_chat_id: None,
            telegram_username: None,
        }
    }

    pub fn with_telegram_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.telegram_chat_id = Some(chat_id.into());
        self
    }

    /// A non-premium user whose trial ended at or before `now`.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        !self.is_premium && self.trial_ends_at.is_some_and(|ends| ends <= now)
    }
}

/// A wallet (optionally one token in it) a user asked to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    pub id: i64,
    pub user_id: String,
    pub address: String,
    pub chain: Chain,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    /// Transactions at or before this instant have been processed.
    pub last_checked: DateTime<Utc>,
    pub label: Option<String>,
}

impl WatchlistItem {
    pub fn is_token_scoped(&self) -> bool {
        self.token_address.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Fields for registering a new watchlist item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWatchlistItem {
    pub user_id: String,
    pub address: String,
    pub chain: Chain,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    pub label: Option<String>,
    pub last_checked: DateTime<Utc>,
}

impl NewWatchlistItem {
    pub fn new(user_id: impl Into<String>, address: impl Into<String>, chain: Chain) -> Self {
        Self {
            user_id: user_id.into(),
            address: address.into(),
            chain,
            token_address: None,
            token_symbol: None,
            label: None,
            last_checked: Utc::now(),
        }
    }

    pub fn with_token(mut self, address: impl Into<String>, symbol: impl Into<String>) -> Self {
        self.token_address = Some(address.into());
        self.token_symbol = Some(symbol.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn checked_at(mut self, last_checked: DateTime<Utc>) -> Self {
        self.last_checked = last_checked;
        self
    }
}

/// Owner fields loaded alongside each item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub user_id: String,
    pub is_premium: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub telegram_chat_id: Option<String>,
}

/// An item joined with its owner, as loaded for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedItem {
    pub item: WatchlistItem,
    pub owner: Owner,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_user_lapsed() {
        let now = Utc::now();
        assert!(User::trial("u1", now - Duration::hours(1)).is_lapsed(now));
        assert!(User::trial("u1", now).is_lapsed(now));
        assert!(!User::trial("u1", now + Duration::hours(1)).is_lapsed(now));
        assert!(!User::premium("u2").is_lapsed(now));

        let mut premium_after_trial = User::trial("u3", now - Duration::days(3));
        premium_after_trial.is_premium = true;
        assert!(!premium_after_trial.is_lapsed(now));
    }

    #[test]
    fn test_user_without_trial_is_not_lapsed() {
        let mut user = User::premium("u4");
        user.is_premium = false;
        assert!(!user.is_lapsed(Utc::now()));
    }

    #[test]
    fn test_token_scope() {
        let mut item = WatchlistItem {
            id: 1,
            user_id: "u1".to_string(),
            address: "0xA".to_string(),
            chain: Chain::Ethereum,
            token_address: None,
            token_symbol: None,
            last_checked: Utc::now(),
            label: None,
        };
        assert!(!item.is_token_scoped());
        item.token_address = Some(String::new());
        assert!(!item.is_token_scoped());
        item.token_address = Some("0xT".to_string());
        assert!(item.is_token_scoped());
    }
}
