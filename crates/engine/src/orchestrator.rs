//! Monitoring cycle orchestration.
//!
//! A cycle reaps lapsed trials, loads every watched item and runs each
//! item's pipeline (fetch, detect, materialize, notify, advance cursor)
//! concurrently. Concurrency is bounded by one semaphore per provider family.
//! Item futures are polled on the caller's task, so dropping them on
//! cancellation stops their work before the cursor step.

use crate::{detect, materialize, reap_expired_trials, Materialized};
use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::{pending, Future};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use watchlist_alerts::{AlertStore, NotificationSink, NotifyError};
use watchlist_core::{
    AlertNotice, ChainFamily, CycleError, CycleErrorKind, ItemReport, RunSummary,
    TransactionAlert, WatchedItem,
};
use watchlist_providers::{ProviderError, ProviderRegistry};

/// Configuration for a monitoring cycle.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Transactions requested per item.
    pub fetch_limit: usize,
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
    /// Deadline for the item phase. Unfinished items are cancelled.
    pub cycle_timeout: Option<Duration>,
    /// Concurrent fetches allowed against the EVM provider.
    pub evm_concurrency: usize,
    /// Concurrent fetches allowed against the Solana provider.
    pub solana_concurrency: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fetch_limit: 10,
            fetch_timeout: Duration::from_secs(15),
            notify_timeout: Duration::from_secs(10),
            cycle_timeout: None,
            evm_concurrency: 4,
            solana_concurrency: 2,
        }
    }
}

impl MonitorConfig {
    fn concurrency(&self, family: ChainFamily) -> usize {
        let size = match family {
            ChainFamily::Evm => self.evm_concurrency,
            ChainFamily::Solana => self.solana_concurrency,
        };
        size.max(1)
    }
}

/// What one item's pipeline produced.
struct ItemOutcome {
    report: ItemReport,
    errors: Vec<CycleError>,
    notifications_sent: u32,
}

impl ItemOutcome {
    fn new(watched: &WatchedItem) -> Self {
        let item = &watched.item;
        Self {
            report: ItemReport {
                item_id: item.id,
                address: item.address.clone(),
                chain: item.chain,
                fetched: 0,
                new_transactions: 0,
                alerts_created: 0,
                duplicates_skipped: 0,
                cursor_advanced: false,
            },
            errors: Vec::new(),
            notifications_sent: 0,
        }
    }

    fn error(&mut self, watched: &WatchedItem, kind: CycleErrorKind, message: impl Into<String>) {
        let item = &watched.item;
        self.errors
            .push(CycleError::for_item(kind, item.id, &item.address, item.chain, message));
    }
}

/// Runs monitoring cycles against a store, provider registry and optional sink.
pub struct CycleOrchestrator {
    store: Arc<dyn AlertStore>,
    providers: ProviderRegistry,
    sink: Option<Arc<dyn NotificationSink>>,
    config: MonitorConfig,
    pools: HashMap<ChainFamily, Semaphore>,
}

impl CycleOrchestrator {
    pub fn new(
        store: Arc<dyn AlertStore>,
        providers: ProviderRegistry,
        config: MonitorConfig,
    ) -> Self {
        let pools = [ChainFamily::Evm, ChainFamily::Solana]
            .into_iter()
            .map(|family| (family, Semaphore::new(config.concurrency(family))))
            .collect();

        Self {
            store,
            providers,
            sink: None,
            config,
            pools,
        }
    }

    /// Deliver alerts through `sink` for owners with a linked handle.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one cycle to completion (or until the configured cycle deadline).
    pub async fn run_cycle(&self) -> RunSummary {
        self.run_cycle_until(pending::<()>()).await
    }

    /// Run one cycle, abandoning unfinished items once `cancel` resolves.
    pub async fn run_cycle_until<C>(&self, cancel: C) -> RunSummary
    where
        C: Future<Output = ()>,
    {
        let started = Instant::now();
        let now = Utc::now();
        let mut summary = RunSummary::new(now);

        // Loading is skipped when reaping fails so lapsed users are never polled.
        match reap_expired_trials(self.store.as_ref(), now).await {
            Ok(outcome) => {
                summary.users_reaped = outcome.user_ids.len() as u64;
                summary.items_reaped = outcome.items_deleted;
            }
            Err(e) => {
                summary
                    .errors
                    .push(CycleError::global(CycleErrorKind::Reap, e.to_string()));
                return self.finish(summary, started);
            }
        }

        let loaded = match self.store.load_watched_items().await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(error = %e, "Failed to load watchlist items");
                summary
                    .errors
                    .push(CycleError::global(CycleErrorKind::Load, e.to_string()));
                return self.finish(summary, started);
            }
        };
        for rejected in &loaded.rejected {
            summary.errors.push(CycleError::for_row(
                CycleErrorKind::Load,
                rejected.item_id,
                &rejected.address,
                rejected.reason.clone(),
            ));
        }

        let items: Vec<WatchedItem> = loaded
            .items
            .into_iter()
            .filter(|w| {
                let lapsed = !w.owner.is_premium
                    && w.owner.trial_ends_at.is_some_and(|ends| ends <= now);
                if lapsed {
                    debug!(item_id = w.item.id, "Skipping item of lapsed trial");
                }
                !lapsed
            })
            .collect();

        summary.wallets_checked = items.len() as u32;
        debug!(items = items.len(), "Processing watchlist items");

        let mut running: FuturesUnordered<_> =
            items.iter().map(|w| self.process_item(w)).collect();
        let mut finished = HashSet::new();

        let deadline = async {
            match self.config.cycle_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => pending::<()>().await,
            }
        };
        tokio::pin!(cancel);
        tokio::pin!(deadline);

        let interrupted = loop {
            tokio::select! {
                next = running.next() => match next {
                    Some(outcome) => {
                        finished.insert(outcome.report.item_id);
                        merge(&mut summary, outcome);
                    }
                    None => break None,
                },
                _ = &mut cancel => break Some("cycle cancelled"),
                _ = &mut deadline => break Some("cycle deadline exceeded"),
            }
        };
        drop(running);

        if let Some(reason) = interrupted {
            summary.cancelled = true;
            for w in items.iter().filter(|w| !finished.contains(&w.item.id)) {
                summary.errors.push(CycleError::for_item(
                    CycleErrorKind::Cancelled,
                    w.item.id,
                    &w.item.address,
                    w.item.chain,
                    reason,
                ));
            }
            warn!(
                reason = reason,
                unfinished = items.len() - finished.len(),
                "Cycle interrupted"
            );
        }

        self.finish(summary, started)
    }

    fn finish(&self, mut summary: RunSummary, started: Instant) -> RunSummary {
        summary.duration_seconds = started.elapsed().as_secs_f64();
        info!(
            wallets = summary.wallets_checked,
            alerts = summary.alerts_created,
            duplicates = summary.duplicates_skipped,
            notifications = summary.notifications_sent,
            errors = summary.errors.len(),
            duration_s = summary.duration_seconds,
            "Cycle complete"
        );
        summary
    }

    async fn process_item(&self, watched: &WatchedItem) -> ItemOutcome {
        let item = &watched.item;
        let mut outcome = ItemOutcome::new(watched);

        let Some(provider) = self.providers.for_chain(item.chain) else {
            let err = ProviderError::UnsupportedChain(item.chain);
            outcome.error(watched, CycleErrorKind::Provider, err.to_string());
            return outcome;
        };
        let Some(pool) = self.pools.get(&item.chain.family()) else {
            outcome.error(watched, CycleErrorKind::Provider, "no provider pool");
            return outcome;
        };
        let _permit = match pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                outcome.error(watched, CycleErrorKind::Provider, e.to_string());
                return outcome;
            }
        };

        let fetch_started_at = Utc::now();
        let fetch = provider.fetch_recent_transactions(
            &item.address,
            item.chain,
            self.config.fetch_limit,
        );
        let fetched = match timeout(self.config.fetch_timeout, fetch).await {
            Ok(Ok(txs)) => txs,
            Ok(Err(e)) => {
                warn!(
                    item_id = item.id,
                    chain = %item.chain,
                    provider = provider.name(),
                    code = e.code(),
                    transient = e.is_transient(),
                    error = %e,
                    "Fetch failed"
                );
                outcome.error(watched, CycleErrorKind::Provider, e.to_string());
                return outcome;
            }
            Err(_) => {
                let e = ProviderError::Timeout(self.config.fetch_timeout);
                warn!(item_id = item.id, chain = %item.chain, error = %e, "Fetch timed out");
                outcome.error(watched, CycleErrorKind::Provider, e.to_string());
                return outcome;
            }
        };
        outcome.report.fetched = fetched.len();

        let mut fresh = detect(item, &fetched);
        fresh.sort_by_key(|tx| tx.timestamp);
        outcome.report.new_transactions = fresh.len();

        let mut clean = true;
        for tx in &fresh {
            match materialize(self.store.as_ref(), item, tx).await {
                Materialized::Created(alert) => {
                    outcome.report.alerts_created += 1;
                    self.notify(watched, &alert, &mut outcome).await;
                }
                Materialized::Duplicate => outcome.report.duplicates_skipped += 1,
                Materialized::Failed(e) => {
                    clean = false;
                    warn!(item_id = item.id, tx = %tx.hash, error = %e, "Failed to store alert");
                    outcome.errors.push(
                        CycleError::for_item(
                            CycleErrorKind::Persistence,
                            item.id,
                            &item.address,
                            item.chain,
                            e.to_string(),
                        )
                        .with_transaction(tx.hash.clone()),
                    );
                }
            }
        }

        if !clean {
            return outcome;
        }

        match self.store.advance_cursor(item.id, fetch_started_at).await {
            Ok(true) => outcome.report.cursor_advanced = true,
            Ok(false) => debug!(item_id = item.id, "Item removed during cycle"),
            Err(e) => {
                warn!(item_id = item.id, error = %e, "Failed to advance cursor");
                outcome.error(watched, CycleErrorKind::Cursor, e.to_string());
            }
        }

        outcome
    }

    async fn notify(&self, watched: &WatchedItem, alert: &TransactionAlert, outcome: &mut ItemOutcome) {
        let Some(sink) = &self.sink else {
            return;
        };
        let Some(handle) = watched
            .owner
            .telegram_chat_id
            .as_deref()
            .filter(|h| !h.is_empty())
        else {
            return;
        };

        let notice = AlertNotice::from_alert(alert, watched.item.label.as_deref());
        let result = match timeout(self.config.notify_timeout, sink.notify(handle, &notice)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(self.config.notify_timeout)),
        };

        match result {
            Ok(()) => outcome.notifications_sent += 1,
            Err(e) => {
                warn!(item_id = watched.item.id, tx = %alert.transaction_hash, error = %e, "Notification failed");
                outcome.errors.push(
                    CycleError::for_item(
                        CycleErrorKind::Notification,
                        watched.item.id,
                        &watched.item.address,
                        watched.item.chain,
                        e.to_string(),
                    )
                    .with_transaction(alert.transaction_hash.clone()),
                );
            }
        }
    }
}

fn merge(summary: &mut RunSummary, outcome: ItemOutcome) {
    summary.alerts_created += outcome.report.alerts_created;
    summary.duplicates_skipped += outcome.report.duplicates_skipped;
    summary.notifications_sent += outcome.notifications_sent;
    summary.errors.extend(outcome.errors);
    summary.items.push(outcome.report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, minutes, token_tx, tx};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use pretty_assertions::assert_eq;
    use watchlist_alerts::{Database, DbError, LoadedItems, RecordingSink, ReapOutcome, RejectedItem};
    use watchlist_core::{AlertType, Chain, NewAlert, NewWatchlistItem, User, WatchlistItem};
    use watchlist_providers::MockProvider;

    struct Harness {
        db: Database,
        evm: Arc<MockProvider>,
        solana: Arc<MockProvider>,
    }

    impl Harness {
        async fn new() -> Self {
            Self::with_providers(
                MockProvider::new(&[Chain::Ethereum, Chain::Base, Chain::Polygon]),
                MockProvider::new(&[Chain::Solana]),
            )
            .await
        }

        async fn with_providers(evm: MockProvider, solana: MockProvider) -> Self {
            let db = Database::connect("sqlite::memory:").await.unwrap();
            db.upsert_user(&User::premium("u1").with_telegram_chat("1001"))
                .await
                .unwrap();
            Self {
                db,
                evm: Arc::new(evm),
                solana: Arc::new(solana),
            }
        }

        fn registry(&self) -> ProviderRegistry {
            let mut registry = ProviderRegistry::new();
            registry.register(ChainFamily::Evm, self.evm.clone());
            registry.register(ChainFamily::Solana, self.solana.clone());
            registry
        }

        fn orchestrator(&self, config: MonitorConfig) -> CycleOrchestrator {
            CycleOrchestrator::new(Arc::new(self.db.clone()), self.registry(), config)
        }

        async fn add(&self, user: &str, address: &str, chain: Chain, since: DateTime<Utc>) -> WatchlistItem {
            self.db
                .add_watchlist_item(&NewWatchlistItem::new(user, address, chain).checked_at(since))
                .await
                .unwrap()
        }

        async fn cursor(&self, item_id: i64) -> i64 {
            self.db
                .get_item(item_id)
                .await
                .unwrap()
                .unwrap()
                .last_checked
                .timestamp_millis()
        }
    }

    /// Store that fails alert insertion for chosen transaction hashes.
    struct FailingStore {
        inner: Database,
        fail_hashes: Vec<String>,
        fail_reap: bool,
        rejected: Vec<RejectedItem>,
    }

    impl FailingStore {
        fn new(inner: Database) -> Self {
            Self {
                inner,
                fail_hashes: Vec::new(),
                fail_reap: false,
                rejected: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl AlertStore for FailingStore {
        async fn reap_expired_trials(&self, now: DateTime<Utc>) -> Result<ReapOutcome, DbError> {
            if self.fail_reap {
                return Err(DbError::Corrupt("reap unavailable".to_string()));
            }
            self.inner.reap_expired_trials(now).await
        }

        async fn load_watched_items(&self) -> Result<LoadedItems, DbError> {
            let mut loaded = self.inner.load_watched_items().await?;
            loaded.rejected.extend(self.rejected.iter().cloned());
            Ok(loaded)
        }

        async fn insert_alert(&self, alert: &NewAlert) -> Result<TransactionAlert, DbError> {
            if self.fail_hashes.contains(&alert.transaction_hash) {
                return Err(DbError::Corrupt("disk full".to_string()));
            }
            self.inner.insert_alert(alert).await
        }

        async fn advance_cursor(&self, item_id: i64, to: DateTime<Utc>) -> Result<bool, DbError> {
            self.inner.advance_cursor(item_id, to).await
        }
    }

    #[tokio::test]
    async fn test_sent_transaction_creates_alert_and_advances_cursor() {
        let h = Harness::new().await;
        let item = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xA", vec![tx("0xH1", "0xA", "0xB", at(60))]);

        let sink = Arc::new(RecordingSink::new());
        let summary = h
            .orchestrator(MonitorConfig::default())
            .with_sink(sink.clone())
            .run_cycle()
            .await;

        assert!(summary.is_clean());
        assert_eq!(summary.wallets_checked, 1);
        assert_eq!(summary.alerts_created, 1);
        assert_eq!(summary.notifications_sent, 1);
        let report = summary.item(item.id).unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.new_transactions, 1);
        assert!(report.cursor_advanced);
        assert!(h.cursor(item.id).await > at(60).timestamp_millis());

        let alerts = h.db.recent_alerts_for_user("u1", 10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Sent);
        assert_eq!(alerts[0].to_address, "0xB");

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "1001");
        assert_eq!(sent[0].1.transaction_hash, "0xH1");
    }

    #[tokio::test]
    async fn test_second_run_on_same_batch_creates_nothing() {
        let h = Harness::new().await;
        h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions(
            "0xA",
            vec![tx("0xH2", "0xC", "0xA", at(120)), tx("0xH1", "0xA", "0xB", at(60))],
        );

        let orchestrator = h.orchestrator(MonitorConfig::default());
        let first = orchestrator.run_cycle().await;
        let second = orchestrator.run_cycle().await;

        assert_eq!(first.alerts_created, 2);
        assert_eq!(second.alerts_created, 0);
        assert_eq!(h.db.count_alerts_for_user("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_replay_counts_duplicates() {
        let h = Harness::new().await;
        let first_item = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xA", vec![tx("0xH1", "0xA", "0xB", at(60))]);

        let orchestrator = h.orchestrator(MonitorConfig::default());
        assert_eq!(orchestrator.run_cycle().await.alerts_created, 1);

        // Re-adding the wallet starts from an old cursor and replays the batch.
        h.db.remove_watchlist_item("u1", first_item.id).await.unwrap();
        let replayed = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        let summary = orchestrator.run_cycle().await;

        assert_eq!(summary.alerts_created, 0);
        assert_eq!(summary.duplicates_skipped, 1);
        assert!(summary.errors.is_empty());
        assert!(summary.item(replayed.id).unwrap().cursor_advanced);
        assert_eq!(h.db.count_alerts_for_user("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_cycles_alert_once() {
        let h = Harness::new().await;
        h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions(
            "0xA",
            vec![tx("0xH1", "0xA", "0xB", at(60)), tx("0xH2", "0xA", "0xB", at(90))],
        );

        let a = h.orchestrator(MonitorConfig::default());
        let b = h.orchestrator(MonitorConfig::default());
        let (first, second) = tokio::join!(a.run_cycle(), b.run_cycle());

        assert_eq!(first.alerts_created + second.alerts_created, 2);
        assert_eq!(h.db.count_alerts_for_user("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_token_scoped_item_alerts_only_for_its_token() {
        let h = Harness::new().await;
        let item = h
            .db
            .add_watchlist_item(
                &NewWatchlistItem::new("u1", "0xA", Chain::Base)
                    .with_token("0xTokenT", "TTT")
                    .checked_at(at(0)),
            )
            .await
            .unwrap();
        h.evm.set_transactions(
            "0xA",
            vec![
                token_tx("0xT1", "0xC", "0xA", at(10), &[("0xtokent", "TTT", "5")]),
                token_tx("0xU1", "0xC", "0xA", at(20), &[("0xTokenU", "UUU", "9")]),
            ],
        );

        let summary = h.orchestrator(MonitorConfig::default()).run_cycle().await;
        assert_eq!(summary.alerts_created, 1);
        assert_eq!(summary.item(item.id).unwrap().fetched, 2);

        let alerts = h.db.recent_alerts_for_user("u1", 10).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].transaction_hash, "0xT1");
        assert_eq!(alerts[0].token_symbol.as_deref(), Some("TTT"));
        assert_eq!(alerts[0].alert_type, AlertType::Received);
    }

    #[tokio::test]
    async fn test_expired_trial_items_are_never_polled() {
        let h = Harness::new().await;
        let now = Utc::now();
        h.db.upsert_user(&User::trial("lapsed", now - ChronoDuration::days(1)))
            .await
            .unwrap();
        h.add("lapsed", "0xDEAD", Chain::Ethereum, at(0)).await;
        h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xDEAD", vec![tx("0xX", "0xDEAD", "0xB", at(60))]);

        let summary = h.orchestrator(MonitorConfig::default()).run_cycle().await;

        assert_eq!(summary.users_reaped, 1);
        assert_eq!(summary.items_reaped, 1);
        assert_eq!(summary.wallets_checked, 1);
        assert_eq!(h.evm.calls(), 1);
        assert_eq!(h.db.count_alerts_for_user("lapsed").await.unwrap(), 0);

        let summary = h.orchestrator(MonitorConfig::default()).run_cycle().await;
        assert_eq!(summary.users_reaped, 0);
        assert_eq!(summary.items_reaped, 0);
    }

    #[tokio::test]
    async fn test_undecodable_row_does_not_block_other_items() {
        let h = Harness::new().await;
        let item = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xA", vec![tx("0xH1", "0xA", "0xB", at(60))]);
        let store = FailingStore {
            rejected: vec![RejectedItem {
                item_id: 99,
                address: "0xFTM".to_string(),
                reason: "Unsupported chain: fantom".to_string(),
            }],
            ..FailingStore::new(h.db.clone())
        };

        let summary = CycleOrchestrator::new(Arc::new(store), h.registry(), MonitorConfig::default())
            .run_cycle()
            .await;

        assert_eq!(summary.wallets_checked, 1);
        assert_eq!(summary.alerts_created, 1);
        assert!(summary.item(item.id).unwrap().cursor_advanced);

        let load_errors: Vec<&CycleError> = summary.errors_of(CycleErrorKind::Load).collect();
        assert_eq!(load_errors.len(), 1);
        assert_eq!(load_errors[0].item_id, Some(99));
        assert_eq!(load_errors[0].address.as_deref(), Some("0xFTM"));
        assert_eq!(load_errors[0].chain, None);
        assert_eq!(summary.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_reap_failure_skips_polling() {
        let h = Harness::new().await;
        h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        let store = FailingStore {
            fail_reap: true,
            ..FailingStore::new(h.db.clone())
        };

        let summary = CycleOrchestrator::new(Arc::new(store), h.registry(), MonitorConfig::default())
            .run_cycle()
            .await;

        assert_eq!(summary.wallets_checked, 0);
        assert_eq!(summary.errors_of(CycleErrorKind::Reap).count(), 1);
        assert_eq!(h.evm.calls(), 0);
    }

    #[tokio::test]
    async fn test_one_solana_timeout_among_ten_items() {
        let h = Harness::with_providers(
            MockProvider::new(&[Chain::Ethereum]),
            MockProvider::new(&[Chain::Solana]).with_delay(Duration::from_millis(500)),
        )
        .await;

        let mut evm_items = Vec::new();
        for i in 0..9 {
            let address = format!("0xW{}", i);
            h.evm.set_transactions(&address, vec![tx(&format!("0xH{}", i), &address, "0xB", at(60))]);
            evm_items.push(h.add("u1", &address, Chain::Ethereum, at(0)).await);
        }
        let sol_item = h.add("u1", "SoLWallet", Chain::Solana, at(0)).await;
        let sol_cursor = h.cursor(sol_item.id).await;

        let config = MonitorConfig {
            fetch_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let summary = h.orchestrator(config).run_cycle().await;

        assert_eq!(summary.wallets_checked, 10);
        assert_eq!(summary.alerts_created, 9);
        for item in &evm_items {
            assert!(summary.item(item.id).unwrap().cursor_advanced);
        }

        let errors: Vec<_> = summary.errors_of(CycleErrorKind::Provider).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].item_id, Some(sol_item.id));
        assert_eq!(errors[0].chain, Some(Chain::Solana));
        assert!(!summary.item(sol_item.id).unwrap().cursor_advanced);
        assert_eq!(h.cursor(sol_item.id).await, sol_cursor);
    }

    #[tokio::test]
    async fn test_provider_pool_bounds_concurrency() {
        let h = Harness::with_providers(
            MockProvider::new(&[Chain::Ethereum]).with_delay(Duration::from_millis(20)),
            MockProvider::new(&[Chain::Solana]),
        )
        .await;
        for i in 0..6 {
            h.add("u1", &format!("0xP{}", i), Chain::Ethereum, at(0)).await;
        }

        let config = MonitorConfig {
            evm_concurrency: 2,
            ..Default::default()
        };
        let summary = h.orchestrator(config).run_cycle().await;

        assert_eq!(summary.items.len(), 6);
        assert_eq!(h.evm.calls(), 6);
        assert_eq!(h.evm.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_persistence_failure_holds_cursor() {
        let h = Harness::new().await;
        let item = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        let before = h.cursor(item.id).await;
        h.evm.set_transactions(
            "0xA",
            vec![
                tx("0xOK1", "0xA", "0xB", at(10)),
                tx("0xBAD", "0xA", "0xB", at(20)),
                tx("0xOK2", "0xA", "0xB", at(30)),
            ],
        );
        let store = FailingStore {
            fail_hashes: vec!["0xBAD".to_string()],
            ..FailingStore::new(h.db.clone())
        };

        let summary = CycleOrchestrator::new(Arc::new(store), h.registry(), MonitorConfig::default())
            .run_cycle()
            .await;

        assert_eq!(summary.alerts_created, 2);
        let errors: Vec<_> = summary.errors_of(CycleErrorKind::Persistence).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].transaction_hash.as_deref(), Some("0xBAD"));
        assert!(!summary.item(item.id).unwrap().cursor_advanced);
        assert_eq!(h.cursor(item.id).await, before);

        // The next healthy cycle picks up the failed transaction.
        let retry = h.orchestrator(MonitorConfig::default()).run_cycle().await;
        assert_eq!(retry.alerts_created, 1);
        assert_eq!(retry.duplicates_skipped, 2);
        assert!(retry.item(item.id).unwrap().cursor_advanced);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_alert_and_cursor() {
        let h = Harness::new().await;
        let item = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xA", vec![tx("0xH1", "0xA", "0xB", at(60))]);

        let sink = Arc::new(RecordingSink::new());
        sink.fail_with(NotifyError::Telegram("bot was blocked".to_string()));
        let summary = h
            .orchestrator(MonitorConfig::default())
            .with_sink(sink)
            .run_cycle()
            .await;

        assert_eq!(summary.alerts_created, 1);
        assert_eq!(summary.notifications_sent, 0);
        assert_eq!(summary.errors_of(CycleErrorKind::Notification).count(), 1);
        assert!(summary.item(item.id).unwrap().cursor_advanced);
        assert_eq!(h.db.count_alerts_for_user("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notification_timeout() {
        let h = Harness::new().await;
        h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xA", vec![tx("0xH1", "0xA", "0xB", at(60))]);

        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(500)));
        let config = MonitorConfig {
            notify_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let summary = h.orchestrator(config).with_sink(sink).run_cycle().await;

        let errors: Vec<_> = summary.errors_of(CycleErrorKind::Notification).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("timed out"));
        assert_eq!(summary.alerts_created, 1);
    }

    #[tokio::test]
    async fn test_owner_without_handle_is_not_notified() {
        let h = Harness::new().await;
        h.db.upsert_user(&User::premium("quiet")).await.unwrap();
        h.add("quiet", "0xQ", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xQ", vec![tx("0xH1", "0xQ", "0xB", at(60))]);

        let sink = Arc::new(RecordingSink::new());
        let summary = h
            .orchestrator(MonitorConfig::default())
            .with_sink(sink.clone())
            .run_cycle()
            .await;

        assert_eq!(summary.alerts_created, 1);
        assert_eq!(summary.notifications_sent, 0);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_leaves_cursors_unchanged() {
        let h = Harness::with_providers(
            MockProvider::new(&[Chain::Ethereum]).with_delay(Duration::from_millis(500)),
            MockProvider::new(&[Chain::Solana]),
        )
        .await;
        let a = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        let b = h.add("u1", "0xB", Chain::Ethereum, at(0)).await;
        h.evm.set_transactions("0xA", vec![tx("0xH1", "0xA", "0xC", at(60))]);
        let before = (h.cursor(a.id).await, h.cursor(b.id).await);

        let summary = h
            .orchestrator(MonitorConfig::default())
            .run_cycle_until(tokio::time::sleep(Duration::from_millis(20)))
            .await;

        assert!(summary.cancelled);
        assert!(summary.items.is_empty());
        assert_eq!(summary.errors_of(CycleErrorKind::Cancelled).count(), 2);
        assert_eq!(summary.alerts_created, 0);
        assert_eq!((h.cursor(a.id).await, h.cursor(b.id).await), before);
        assert_eq!(h.db.count_alerts_for_user("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cycle_deadline_cancels_slow_items() {
        let h = Harness::with_providers(
            MockProvider::new(&[Chain::Ethereum]),
            MockProvider::new(&[Chain::Solana]).with_delay(Duration::from_millis(500)),
        )
        .await;
        let fast = h.add("u1", "0xA", Chain::Ethereum, at(0)).await;
        let slow = h.add("u1", "SlowSol", Chain::Solana, at(0)).await;

        let config = MonitorConfig {
            cycle_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let summary = h.orchestrator(config).run_cycle().await;

        assert!(summary.cancelled);
        assert!(summary.item(fast.id).unwrap().cursor_advanced);
        let cancelled: Vec<_> = summary.errors_of(CycleErrorKind::Cancelled).collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].item_id, Some(slow.id));
    }

    #[tokio::test]
    async fn test_summary_serializes_camel_case() {
        let h = Harness::new().await;
        h.add("u1", "0xA", Chain::Ethereum, Utc::now() - minutes(5)).await;

        let summary = h.orchestrator(MonitorConfig::default()).run_cycle().await;
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["walletsChecked"], 1);
        assert_eq!(json["alertsCreated"], 0);
        assert!(json["durationSeconds"].is_number());
        assert_eq!(json["items"][0]["cursorAdvanced"], true);
    }
}
