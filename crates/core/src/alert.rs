//! Transaction alerts produced by the monitor.

use crate::Chain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Direction of a transaction relative to the watched wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Sent,
    Received,
    Contract,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Sent => "sent",
            AlertType::Received => "received",
            AlertType::Contract => "contract",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(AlertType::Sent),
            "received" => Ok(AlertType::Received),
            "contract" => Ok(AlertType::Contract),
            other => Err(format!("Unknown alert type: {}", other)),
        }
    }
}

/// Alert row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAlert {
    pub id: i64,
    pub user_id: String,
    pub wallet_address: String,
    pub chain: Chain,
    pub transaction_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    pub token_amount: Option<String>,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// Alert fields prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAlert {
    pub user_id: String,
    pub wallet_address: String,
    pub chain: Chain,
    pub transaction_hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub token_address: Option<String>,
    pub token_symbol: Option<String>,
    pub token_amount: Option<String>,
    pub alert_type: AlertType,
}

/// What a notification sink needs to render one alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertNotice {
    pub wallet_address: String,
    pub label: Option<String>,
    pub chain: Chain,
    pub alert_type: AlertType,
    pub transaction_hash: String,
    pub value: String,
    pub token_symbol: Option<String>,
    pub token_amount: Option<String>,
}

impl AlertNotice {
    pub fn from_alert(alert: &TransactionAlert, label: Option<&str>) -> Self {
        Self {
            wallet_address: alert.wallet_address.clone(),
            label: label.map(str::to_string),
            chain: alert.chain,
            alert_type: alert.alert_type,
            transaction_hash: alert.transaction_hash.clone(),
            value: alert.value.clone(),
            token_symbol: alert.token_symbol.clone(),
            token_amount: alert.token_amount.clone(),
        }
    }
}
