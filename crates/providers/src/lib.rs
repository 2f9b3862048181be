//! Chain data providers for the watchlist monitor.
//!
//! Each chain family has one adapter that fetches recent transactions for an
//! address and normalizes them into [`NormalizedTx`](watchlist_core::NormalizedTx).
//!
//! ## Architecture
//!
//! - `provider` - The `ChainProvider` trait and an in-memory mock
//! - `evm` - Etherscan multichain API adapter for EVM chains
//! - `solana` - Helius enhanced-transactions adapter for Solana
//! - `registry` - Chain to adapter lookup used by the orchestrator

pub mod error;
pub mod evm;
pub mod provider;
pub mod registry;
pub mod solana;

pub use error::*;
pub use evm::{EtherscanConfig, EtherscanProvider};
pub use provider::{ChainProvider, MockProvider};
pub use registry::ProviderRegistry;
pub use solana::{HeliusConfig, HeliusProvider};
