//! Shared builders for engine tests.

use chrono::{DateTime, Duration, TimeZone, Utc};
use watchlist_core::{Chain, NormalizedTx, TokenTransfer, WatchlistItem};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn item(id: i64, address: &str, chain: Chain, last_checked: DateTime<Utc>) -> WatchlistItem {
    WatchlistItem {
        id,
        user_id: "u1".to_string(),
        address: address.to_string(),
        chain,
        token_address: None,
        token_symbol: None,
        last_checked,
        label: None,
    }
}

pub fn tx(hash: &str, from: &str, to: &str, timestamp: DateTime<Utc>) -> NormalizedTx {
    NormalizedTx {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: "1.5".to_string(),
        timestamp,
        token_transfers: Vec::new(),
    }
}

pub fn token_tx(
    hash: &str,
    from: &str,
    to: &str,
    timestamp: DateTime<Utc>,
    transfers: &[(&str, &str, &str)],
) -> NormalizedTx {
    let mut tx = tx(hash, from, to, timestamp);
    tx.value = "0".to_string();
    tx.token_transfers = transfers
        .iter()
        .map(|(address, symbol, amount)| TokenTransfer {
            token_address: address.to_string(),
            symbol: symbol.to_string(),
            amount: amount.to_string(),
        })
        .collect();
    tx
}

pub fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}
