//! The chain provider capability.

use crate::{ProviderError, ProviderResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use watchlist_core::{Chain, NormalizedTx};

/// Fetches recent activity for an address on one chain family.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Whether this provider can serve the chain.
    fn supports(&self, chain: Chain) -> bool;

    /// Most recent transactions touching `address`, newest first, at most `limit`.
    async fn fetch_recent_transactions(
        &self,
        address: &str,
        chain: Chain,
        limit: usize,
    ) -> ProviderResult<Vec<NormalizedTx>>;
}

/// Map a reqwest failure, reporting client-side timeouts as [`ProviderError::Timeout`].
///
/// The request URL is dropped from the message since it carries the API key.
pub(crate) fn request_error(err: reqwest::Error, timeout: Duration) -> ProviderError {
    let err = err.without_url();
    if err.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::from(err)
    }
}

/// Mock provider for testing.
///
/// Responses are keyed by address (case-insensitive). Unknown addresses
/// return an empty batch.
pub struct MockProvider {
    chains: Vec<Chain>,
    responses: Mutex<HashMap<String, ProviderResult<Vec<NormalizedTx>>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    /// Create a mock serving the given chains.
    pub fn new(chains: &[Chain]) -> Self {
        Self {
            chains: chains.to_vec(),
            responses: Mutex::new(HashMap::new()),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Set the transactions returned for an address.
    pub fn set_transactions(&self, address: &str, txs: Vec<NormalizedTx>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(address.to_lowercase(), Ok(txs));
        }
    }

    /// Make fetches for an address fail.
    pub fn set_error(&self, address: &str, error: ProviderError) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(address.to_lowercase(), Err(error));
        }
    }

    /// Number of fetches performed.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn supports(&self, chain: Chain) -> bool {
        self.chains.contains(&chain)
    }

    async fn fetch_recent_transactions(
        &self,
        address: &str,
        chain: Chain,
        limit: usize,
    ) -> ProviderResult<Vec<NormalizedTx>> {
        if !self.supports(chain) {
            return Err(ProviderError::UnsupportedChain(chain));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(&address.to_lowercase()).cloned())
            .unwrap_or_else(|| Ok(Vec::new()));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response.map(|txs| txs.into_iter().take(limit).collect())
    }
}
