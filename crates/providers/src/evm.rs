//! EVM chain adapter backed by the Etherscan multichain (v2) API.
//!
//! Normal transactions (`txlist`) and ERC-20 transfers (`tokentx`) are fetched
//! separately and merged by hash, so a transaction that moved tokens carries
//! its transfers regardless of which list reported it.

use crate::provider::request_error;
use crate::{ChainProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;
use watchlist_core::{format_units, Chain, NormalizedTx, TokenTransfer};

/// Configuration for the Etherscan adapter.
#[derive(Debug, Clone)]
pub struct EtherscanConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for EtherscanConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.etherscan.io/v2/api".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Envelope shared by every Etherscan account endpoint.
#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

/// Row from `txlist` or `tokentx`. Token fields are absent on `txlist`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtherscanTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    value: String,
    time_stamp: String,
    #[serde(default)]
    contract_address: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
}

/// Etherscan-family REST client.
pub struct EtherscanProvider {
    config: EtherscanConfig,
    client: Client,
}

impl EtherscanProvider {
    pub fn new(config: EtherscanConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to build client: {}", e)))?;
        Ok(Self { config, client })
    }

    async fn fetch_list(
        &self,
        action: &str,
        address: &str,
        chain_id: u64,
        limit: usize,
    ) -> ProviderResult<Vec<EtherscanTx>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::MissingApiKey("ETHERSCAN_API_KEY"))?;

        let url = Url::parse_with_params(
            &self.config.base_url,
            &[
                ("chainid", chain_id.to_string()),
                ("module", "account".to_string()),
                ("action", action.to_string()),
                ("address", address.to_string()),
                ("page", "1".to_string()),
                ("offset", limit.to_string()),
                ("sort", "desc".to_string()),
                ("apikey", api_key.to_string()),
            ],
        )?;

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

        let body: EtherscanResponse = response
            .json()
            .await
            .map_err(|e| request_error(e, self.config.timeout))?;
        parse_envelope(body)
    }
}

/// Unwrap the envelope, treating "No transactions found" as an empty list.
fn parse_envelope(body: EtherscanResponse) -> ProviderResult<Vec<EtherscanTx>> {
    if body.status == "1" {
        return Ok(serde_json::from_value(body.result)?);
    }

    if body.message.starts_with("No transactions found") {
        return Ok(Vec::new());
    }

    // Errors carry a human-readable reason in `result`.
    let reason = body
        .result
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.message.clone());
    if reason.to_ascii_lowercase().contains("rate limit") {
        Err(ProviderError::RateLimited(reason))
    } else {
        Err(ProviderError::Api(reason))
    }
}

fn parse_timestamp(raw: &str) -> ProviderResult<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ProviderError::Malformed(format!("Invalid timeStamp: {:?}", raw)))
}

/// Merge `txlist` and `tokentx` rows into normalized transactions, newest first.
fn merge_transactions(
    chain: Chain,
    normal: Vec<EtherscanTx>,
    token: Vec<EtherscanTx>,
    limit: usize,
) -> ProviderResult<Vec<NormalizedTx>> {
    let mut by_hash: HashMap<String, NormalizedTx> = HashMap::new();

    for tx in normal {
        let timestamp = parse_timestamp(&tx.time_stamp)?;
        by_hash.entry(tx.hash.to_lowercase()).or_insert(NormalizedTx {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: format_units(&tx.value, chain.native_decimals()),
            timestamp,
            token_transfers: Vec::new(),
        });
    }

    for tx in token {
        let timestamp = parse_timestamp(&tx.time_stamp)?;
        let decimals = tx.token_decimal.parse::<u32>().unwrap_or(18);
        let transfer = TokenTransfer {
            token_address: tx.contract_address,
            symbol: tx.token_symbol,
            amount: format_units(&tx.value, decimals),
        };

        // Incoming transfers have no txlist row for the watched address.
        let entry = by_hash
            .entry(tx.hash.to_lowercase())
            .or_insert_with(|| NormalizedTx {
                hash: tx.hash.clone(),
                from: tx.from.clone(),
                to: tx.to.clone(),
                value: "0".to_string(),
                timestamp,
                token_transfers: Vec::new(),
            });
        entry.token_transfers.push(transfer);
    }

    let mut merged: Vec<NormalizedTx> = by_hash.into_values().collect();
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(a.hash.cmp(&b.hash)));
    merged.truncate(limit);
    Ok(merged)
}

#[async_trait]
impl ChainProvider for EtherscanProvider {
    fn name(&self) -> &'static str {
        "etherscan"
    }

    fn supports(&self, chain: Chain) -> bool {
        chain.evm_chain_id().is_some()
    }

    async fn fetch_recent_transactions(
        &self,
        address: &str,
        chain: Chain,
        limit: usize,
    ) -> ProviderResult<Vec<NormalizedTx>> {
        let chain_id = chain
            .evm_chain_id()
            .ok_or(ProviderError::UnsupportedChain(chain))?;

        let (normal, token) = tokio::try_join!(
            self.fetch_list("txlist", address, chain_id, limit),
            self.fetch_list("tokentx", address, chain_id, limit),
        )?;

        debug!(
            chain = %chain,
            address = address,
            normal = normal.len(),
            token = token.len(),
            "Etherscan: fetched transactions"
        );

        merge_transactions(chain, normal, token, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn envelope(json: &str) -> EtherscanResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_envelope_ok() {
        let rows = parse_envelope(envelope(
            r#"{"status":"1","message":"OK","result":[
                {"hash":"0xh1","from":"0xa","to":"0xb","value":"1000000000000000000","timeStamp":"1700000000","isError":"0"}
            ]}"#,
        ))
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hash, "0xh1");
    }

    #[test]
    fn test_parse_envelope_no_transactions() {
        let rows = parse_envelope(envelope(
            r#"{"status":"0","message":"No transactions found","result":[]}"#,
        ))
        .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_parse_envelope_rate_limit() {
        let err = parse_envelope(envelope(
            r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#,
        ))
        .unwrap_err();
        assert_eq!(err.code(), "rate_limited");

        let err = parse_envelope(envelope(
            r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#,
        ))
        .unwrap_err();
        assert_eq!(err, ProviderError::Api("Invalid API Key".to_string()));
    }

    #[test]
    fn test_merge_groups_token_transfers_by_hash() {
        let normal: Vec<EtherscanTx> = serde_json::from_str(
            r#"[
                {"hash":"0xH1","from":"0xa","to":"0xtoken","value":"0","timeStamp":"1700000100"},
                {"hash":"0xh2","from":"0xc","to":"0xa","value":"2500000000000000000","timeStamp":"1700000000"}
            ]"#,
        )
        .unwrap();
        let token: Vec<EtherscanTx> = serde_json::from_str(
            r#"[
                {"hash":"0xh1","from":"0xa","to":"0xd","value":"5000000","timeStamp":"1700000100",
                 "contractAddress":"0xtoken","tokenSymbol":"USDC","tokenDecimal":"6"},
                {"hash":"0xh3","from":"0xe","to":"0xa","value":"1000000000000000000","timeStamp":"1700000200",
                 "contractAddress":"0xother","tokenSymbol":"DAI","tokenDecimal":"18"}
            ]"#,
        )
        .unwrap();

        let merged = merge_transactions(Chain::Ethereum, normal, token, 10).unwrap();
        let hashes: Vec<&str> = merged.iter().map(|t| t.hash.as_str()).collect();
        assert_eq!(hashes, vec!["0xh3", "0xH1", "0xh2"]);

        // Received token transfer without a txlist row keeps the transfer's parties.
        assert_eq!(merged[0].from, "0xe");
        assert_eq!(merged[0].to, "0xa");
        assert_eq!(merged[0].token_transfers[0].symbol, "DAI");
        assert_eq!(merged[0].token_transfers[0].amount, "1");

        // Sent token transfer is attached to the txlist row.
        assert_eq!(merged[1].to, "0xtoken");
        assert_eq!(
            merged[1].token_transfers,
            vec![TokenTransfer {
                token_address: "0xtoken".to_string(),
                symbol: "USDC".to_string(),
                amount: "5".to_string(),
            }]
        );

        assert_eq!(merged[2].value, "2.5");
        assert!(merged[2].token_transfers.is_empty());
    }

    #[test]
    fn test_merge_truncates_to_limit() {
        let normal: Vec<EtherscanTx> = serde_json::from_str(
            r#"[
                {"hash":"0x1","from":"0xa","to":"0xb","value":"0","timeStamp":"1"},
                {"hash":"0x2","from":"0xa","to":"0xb","value":"0","timeStamp":"2"},
                {"hash":"0x3","from":"0xa","to":"0xb","value":"0","timeStamp":"3"}
            ]"#,
        )
        .unwrap();
        let merged = merge_transactions(Chain::Base, normal, Vec::new(), 2).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].hash, "0x3");
    }

    #[test]
    fn test_merge_rejects_bad_timestamp() {
        let normal: Vec<EtherscanTx> = serde_json::from_str(
            r#"[{"hash":"0x1","from":"0xa","to":"0xb","value":"0","timeStamp":"yesterday"}]"#,
        )
        .unwrap();
        let err = merge_transactions(Chain::Ethereum, normal, Vec::new(), 10).unwrap_err();
        assert_eq!(err.code(), "malformed");
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let provider = EtherscanProvider::new(EtherscanConfig::default()).unwrap();
        let err = provider
            .fetch_recent_transactions("0xa", Chain::Ethereum, 5)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingApiKey("ETHERSCAN_API_KEY"));
    }

    #[tokio::test]
    async fn test_request_failure_hides_api_key() {
        let provider = EtherscanProvider::new(EtherscanConfig {
            api_key: Some("SUPERSECRETKEY".to_string()),
            base_url: "http://127.0.0.1:9/v2/api".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();
        let err = provider
            .fetch_recent_transactions("0xa", Chain::Ethereum, 5)
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("SUPERSECRETKEY"), "{}", err);
        assert!(!format!("{:?}", err).contains("SUPERSECRETKEY"));
    }

    #[tokio::test]
    async fn test_rejects_solana() {
        let provider = EtherscanProvider::new(EtherscanConfig::default()).unwrap();
        assert!(!provider.supports(Chain::Solana));
        let err = provider
            .fetch_recent_transactions("So1", Chain::Solana, 5)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::UnsupportedChain(Chain::Solana));
    }
}
