//! Solana adapter backed by the Helius enhanced-transactions API.

use crate::provider::request_error;
use crate::{ChainProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;
use watchlist_core::{format_units, Chain, NormalizedTx, TokenTransfer};

/// Helius caps page size at 100.
const MAX_PAGE_SIZE: usize = 100;

/// Configuration for the Helius adapter.
#[derive(Debug, Clone)]
pub struct HeliusConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.helius.xyz".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeliusTransaction {
    signature: String,
    timestamp: i64,
    #[serde(default)]
    fee_payer: String,
    #[serde(default)]
    native_transfers: Vec<HeliusNativeTransfer>,
    #[serde(default)]
    token_transfers: Vec<HeliusTokenTransfer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeliusNativeTransfer {
    #[serde(default)]
    from_user_account: String,
    #[serde(default)]
    to_user_account: String,
    amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeliusTokenTransfer {
    #[serde(default)]
    to_user_account: String,
    mint: String,
    #[serde(default)]
    token_amount: f64,
}

/// Helius REST client.
pub struct HeliusProvider {
    config: HeliusConfig,
    client: Client,
}

impl HeliusProvider {
    pub fn new(config: HeliusConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to build client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn transactions_url(&self, address: &str, limit: usize) -> ProviderResult<Url> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingApiKey("HELIUS_API_KEY"))?;
        let base = format!(
            "{}/v0/addresses/{}/transactions",
            self.config.base_url.trim_end_matches('/'),
            address
        );
        Ok(Url::parse_with_params(
            &base,
            &[
                ("api-key", api_key.to_string()),
                ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
            ],
        )?)
    }
}

/// Normalize one Helius transaction from the watched address's point of view.
fn normalize(address: &str, tx: HeliusTransaction) -> ProviderResult<NormalizedTx> {
    let timestamp = DateTime::from_timestamp(tx.timestamp, 0).ok_or_else(|| {
        ProviderError::Malformed(format!("Invalid timestamp {} for {}", tx.timestamp, tx.signature))
    })?;

    let involves = |from: &str, to: &str| from == address || to == address;

    let lamports: u64 = tx
        .native_transfers
        .iter()
        .filter(|t| involves(&t.from_user_account, &t.to_user_account))
        .map(|t| t.amount)
        .sum();

    // Counterparty: first native recipient other than the payer, else first token recipient.
    let to = tx
        .native_transfers
        .iter()
        .map(|t| t.to_user_account.as_str())
        .find(|to| !to.is_empty() && *to != tx.fee_payer)
        .or_else(|| {
            tx.token_transfers
                .iter()
                .map(|t| t.to_user_account.as_str())
                .find(|to| !to.is_empty())
        })
        .unwrap_or_default()
        .to_string();

    let token_transfers = tx
        .token_transfers
        .into_iter()
        .map(|t| TokenTransfer {
            token_address: t.mint,
            symbol: "Unknown".to_string(),
            amount: t.token_amount.to_string(),
        })
        .collect();

    Ok(NormalizedTx {
        hash: tx.signature,
        from: tx.fee_payer,
        to,
        value: format_units(&lamports.to_string(), Chain::Solana.native_decimals()),
        timestamp,
        token_transfers,
    })
}

#[async_trait]
impl ChainProvider for HeliusProvider {
    fn name(&self) -> &'static str {
        "helius"
    }

    fn supports(&self, chain: Chain) -> bool {
        chain == Chain::Solana
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

        let url = self.transactions_url(address, limit)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let raw: Vec<HeliusTransaction> = response
            .json()
            .await
            .map_err(|e| request_error(e, self.config.timeout))?;

        debug!(address = address, count = raw.len(), "Helius: fetched transactions");

        let mut txs = raw
            .into_iter()
            .map(|tx| normalize(address, tx))
            .collect::<ProviderResult<Vec<_>>>()?;
        txs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txs.truncate(limit);
        Ok(txs)
    }
}
