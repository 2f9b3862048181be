//! Application configuration.
//!
//! Settings are layered: JSON file, then environment, then CLI flags.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use watchlist_engine::MonitorConfig;
use watchlist_providers::{EtherscanConfig, HeliusConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    /// Logging level.
    pub log_level: String,
    pub monitor: MonitorSettings,
    pub providers: ProviderSettings,
    pub telegram: TelegramSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:watchlist.db".to_string(),
            log_level: "info".to_string(),
            monitor: MonitorSettings::default(),
            providers: ProviderSettings::default(),
            telegram: TelegramSettings::default(),
        }
    }
}

/// Cycle scheduling and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between cycle starts.
    pub interval_secs: u64,
    pub fetch_limit: usize,
    pub fetch_timeout_ms: u64,
    pub notify_timeout_ms: u64,
    pub cycle_timeout_secs: Option<u64>,
    /// Directory receiving one Markdown report per cycle.
    pub report_dir: Option<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            fetch_limit: 10,
            fetch_timeout_ms: 15_000,
            notify_timeout_ms: 10_000,
            cycle_timeout_secs: None,
            report_dir: None,
        }
    }
}

/// Chain data provider credentials and pool sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub etherscan_api_key: Option<String>,
    pub etherscan_base_url: String,
    pub helius_api_key: Option<String>,
    pub helius_base_url: String,
    pub evm_concurrency: usize,
    pub solana_concurrency: usize,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            etherscan_api_key: None,
            etherscan_base_url: EtherscanConfig::default().base_url,
            helius_api_key: None,
            helius_base_url: HeliusConfig::default().base_url,
            evm_concurrency: 4,
            solana_concurrency: 2,
        }
    }
}

impl ProviderSettings {
    pub fn etherscan(&self, timeout: Duration) -> EtherscanConfig {
        EtherscanConfig {
            api_key: self.etherscan_api_key.clone(),
            base_url: self.etherscan_base_url.clone(),
            timeout,
        }
    }

    pub fn helius(&self, timeout: Duration) -> HeliusConfig {
        HeliusConfig {
            api_key: self.helius_api_key.clone(),
            base_url: self.helius_base_url.clone(),
            timeout,
        }
    }
}

/// Telegram alert bot and operator status chat.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub status_bot_token: Option<String>,
    pub status_chat_id: Option<String>,
}

impl AppConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Override settings from process environment variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override settings from `lookup`. Empty values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(key) = get("ETHERSCAN_API_KEY") {
            self.providers.etherscan_api_key = Some(key);
        }
        if let Some(key) = get("HELIUS_API_KEY") {
            self.providers.helius_api_key = Some(key);
        }
        if let Some(token) = get("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(token) = get("TELEGRAM_STATUS_BOT_TOKEN") {
            self.telegram.status_bot_token = Some(token);
        }
        if let Some(chat) = get("TELEGRAM_STATUS_CHAT_ID") {
            self.telegram.status_chat_id = Some(chat);
        }
        if let Some(dir) = get("WATCHLIST_REPORT_DIR") {
            self.monitor.report_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.monitor.fetch_timeout_ms)
    }
}

impl From<&AppConfig> for MonitorConfig {
    fn from(config: &AppConfig) -> Self {
        MonitorConfig {
            fetch_limit: config.monitor.fetch_limit,
            fetch_timeout: config.fetch_timeout(),
            notify_timeout: Duration::from_millis(config.monitor.notify_timeout_ms),
            cycle_timeout: config.monitor.cycle_timeout_secs.map(Duration::from_secs),
            evm_concurrency: config.providers.evm_concurrency,
            solana_concurrency: config.providers.solana_concurrency,
        }
    }
}
