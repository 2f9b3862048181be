//! Turning detected transactions into stored alerts.

use tracing::debug;
use watchlist_alerts::{AlertStore, DbError};
use watchlist_core::{AlertType, NewAlert, NormalizedTx, TransactionAlert, WatchlistItem};

/// Direction of `tx` relative to `address`, compared case-insensitively.
pub fn classify(address: &str, tx: &NormalizedTx) -> AlertType {
    if tx.from.eq_ignore_ascii_case(address) {
        AlertType::Sent
    } else if tx.to.eq_ignore_ascii_case(address) {
        AlertType::Received
    } else {
        AlertType::Contract
    }
}

/// Build the alert row for a transaction on a watched item.
///
/// Token fields come from the first token transfer. Token-scoped items use
/// the first transfer of the watched token instead.
pub fn build_alert(item: &WatchlistItem, tx: &NormalizedTx) -> NewAlert {
    let transfer = item
        .token_address
        .as_deref()
        .and_then(|token| tx.transfer_for(token))
        .or_else(|| tx.token_transfers.first());

    NewAlert {
        user_id: item.user_id.clone(),
        wallet_address: item.address.clone(),
        chain: item.chain,
        transaction_hash: tx.hash.clone(),
        from_address: tx.from.clone(),
        to_address: tx.to.clone(),
        value: tx.value.clone(),
        token_address: transfer.map(|t| t.token_address.clone()),
        token_symbol: transfer.map(|t| t.symbol.clone()),
        token_amount: transfer.map(|t| t.amount.clone()),
        alert_type: classify(&item.address, tx),
    }
}

/// Outcome of materializing one transaction.
#[derive(Debug)]
pub enum Materialized {
    Created(TransactionAlert),
    /// Already alerted for this user.
    Duplicate,
    Failed(DbError),
}

/// Insert the alert for `tx`, treating a uniqueness violation as a duplicate.
pub async fn materialize(
    store: &dyn AlertStore,
    item: &WatchlistItem,
    tx: &NormalizedTx,
) -> Materialized {
    let alert = build_alert(item, tx);
    match store.insert_alert(&alert).await {
        Ok(created) => Materialized::Created(created),
        Err(e) if e.is_duplicate() => {
            debug!(item_id = item.id, tx = %tx.hash, "Alert already recorded");
            Materialized::Duplicate
        }
        Err(e) => Materialized::Failed(e),
    }
}
