//! Change detection for one watchlist item.

use watchlist_core::{NormalizedTx, WatchlistItem};

/// Transactions in `transactions` that are new for `item`.
///
/// A transaction is new if it happened strictly after the item's cursor and,
/// for token-scoped items, carries a transfer of the watched token. Input
/// order is preserved. Duplicate hashes are passed through; the alert store
/// rejects them on insertion.
pub fn detect(item: &WatchlistItem, transactions: &[NormalizedTx]) -> Vec<NormalizedTx> {
    let token = item
        .token_address
        .as_deref()
        .filter(|t| !t.is_empty());

    transactions
        .iter()
        .filter(|tx| tx.timestamp > item.last_checked)
        .filter(|tx| token.map_or(true, |t| tx.touches_token(t)))
        .cloned()
        .collect()
}
