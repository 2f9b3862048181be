//! Error types for provider operations.

use std::time::Duration;
use thiserror::Error;
use watchlist_core::Chain;

/// Errors that can occur while fetching transactions from a chain provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Chain not supported by this provider: {0}")]
    UnsupportedChain(Chain),

    #[error("API key not configured for {0}")]
    MissingApiKey(&'static str),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // Query strings carry API keys.
        let err = err.without_url();
        if err.is_timeout() {
            ProviderError::Network(format!("timeout: {}", err))
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Malformed(err.to_string())
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        ProviderError::Network(err.to_string())
    }
}

impl ProviderError {
    /// Stable short code for run summaries and logs.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::RateLimited(_) => "rate_limited",
            ProviderError::Network(_) => "network",
            ProviderError::Http { .. } => "http",
            ProviderError::Malformed(_) => "malformed",
            ProviderError::Api(_) => "api",
            ProviderError::UnsupportedChain(_) => "unsupported_chain",
            ProviderError::MissingApiKey(_) => "missing_api_key",
            ProviderError::Timeout(_) => "timeout",
        }
    }

    /// Returns true if this error is transient and likely to succeed next cycle.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited(_)
            | ProviderError::Network(_)
            | ProviderError::Timeout(_) => true,
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Map an unsuccessful HTTP status into an error.
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::RateLimited(body)
        } else {
            ProviderError::Http {
                status: status.as_u16(),
                message: body,
            }
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
