//! Blockchain chain identifiers and utilities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a chain slug is not one of the supported networks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported chain: {0}")]
pub struct UnknownChain(pub String);

/// Blockchain network identifier.
/// Uses u8 representation for compact serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Chain {
    // EVM chains (1-9)
    Ethereum = 1,
    Arbitrum = 2,
    Optimism = 3,
    Base = 4,
    Polygon = 5,
    Avalanche = 6,
    Bsc = 7,

    // Non-EVM chains (10+)
    Solana = 10,
}

/// Provider family serving a chain. Concurrency is bounded per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl ChainFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Solana => "solana",
        }
    }
}

impl Chain {
    /// Create Chain from u8 ID.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Chain::Ethereum),
            2 => Some(Chain::Arbitrum),
            3 => Some(Chain::Optimism),
            4 => Some(Chain::Base),
            5 => Some(Chain::Polygon),
            6 => Some(Chain::Avalanche),
            7 => Some(Chain::Bsc),
            10 => Some(Chain::Solana),
            _ => None,
        }
    }

    /// Get u8 ID of this chain.
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Check if this chain is EVM-compatible.
    #[inline]
    pub fn is_evm(self) -> bool {
        self.family() == ChainFamily::Evm
    }

    /// Provider family for this chain.
    pub fn family(self) -> ChainFamily {
        match self {
            Chain::Solana => ChainFamily::Solana,
            _ => ChainFamily::Evm,
        }
    }

    /// EIP-155 chain id, used to address the Etherscan multichain API.
    pub fn evm_chain_id(self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Optimism => Some(10),
            Chain::Bsc => Some(56),
            Chain::Polygon => Some(137),
            Chain::Base => Some(8453),
            Chain::Arbitrum => Some(42161),
            Chain::Avalanche => Some(43114),
            Chain::Solana => None,
        }
    }

    /// Lowercase identifier used in storage and configuration.
    pub fn slug(self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Polygon => "polygon",
            Chain::Avalanche => "avalanche",
            Chain::Bsc => "bsc",
            Chain::Solana => "solana",
        }
    }

    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::Arbitrum => "Arbitrum",
            Chain::Optimism => "Optimism",
            Chain::Base => "Base",
            Chain::Polygon => "Polygon",
            Chain::Avalanche => "Avalanche",
            Chain::Bsc => "BSC",
            Chain::Solana => "Solana",
        }
    }

    /// Native currency symbol.
    pub fn native_symbol(self) -> &'static str {
        match self {
            Chain::Ethereum | Chain::Arbitrum | Chain::Optimism | Chain::Base => "ETH",
            Chain::Polygon => "POL",
            Chain::Avalanche => "AVAX",
            Chain::Bsc => "BNB",
            Chain::Solana => "SOL",
        }
    }

    /// Decimal places of the native currency.
    pub fn native_decimals(self) -> u32 {
        match self {
            Chain::Solana => 9,
            _ => 18,
        }
    }

    /// Block explorer link for a transaction.
    pub fn explorer_tx_url(self, hash: &str) -> String {
        let base = match self {
            Chain::Ethereum => "https://etherscan.io/tx/",
            Chain::Arbitrum => "https://arbiscan.io/tx/",
            Chain::Optimism => "https://optimistic.etherscan.io/tx/",
            Chain::Base => "https://basescan.org/tx/",
            Chain::Polygon => "https://polygonscan.com/tx/",
            Chain::Avalanche => "https://snowtrace.io/tx/",
            Chain::Bsc => "https://bscscan.com/tx/",
            Chain::Solana => "https://solscan.io/tx/",
        };
        format!("{}{}", base, hash)
    }

    /// Get all chain variants.
    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Arbitrum,
            Chain::Optimism,
            Chain::Base,
            Chain::Polygon,
            Chain::Avalanche,
            Chain::Bsc,
            Chain::Solana,
        ]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Chain {
    type Err = UnknownChain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "arbitrum" => Ok(Chain::Arbitrum),
            "optimism" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            "polygon" | "matic" => Ok(Chain::Polygon),
            "avalanche" | "avax" => Ok(Chain::Avalanche),
            // The dashboard historically stored BNB Chain as "bnb".
            "bsc" | "bnb" => Ok(Chain::Bsc),
            "solana" | "sol" => Ok(Chain::Solana),
            _ => Err(UnknownChain(s.to_string())),
        }
    }
}
