//! Entitlement reaping.

use chrono::{DateTime, Utc};
use tracing::{error, info};
use watchlist_alerts::{AlertStore, DbError, ReapOutcome};

/// Delete the items of every user whose trial lapsed at or before `now`.
pub async fn reap_expired_trials(
    store: &dyn AlertStore,
    now: DateTime<Utc>,
) -> Result<ReapOutcome, DbError> {
    match store.reap_expired_trials(now).await {
        Ok(outcome) => {
            if !outcome.user_ids.is_empty() {
                info!(
                    users = outcome.user_ids.len(),
                    items = outcome.items_deleted,
                    "Reaped watchlist items of expired trials"
                );
            }
            Ok(outcome)
        }
        Err(e) => {
            error!(error = %e, "Failed to reap expired trials");
            Err(e)
        }
    }
}
