//! Chain to provider lookup.

use crate::{
    ChainProvider, EtherscanConfig, EtherscanProvider, HeliusConfig, HeliusProvider,
    ProviderResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use watchlist_core::{Chain, ChainFamily};

/// Adapters registered per chain family.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ChainFamily, Arc<dyn ChainProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the production EVM and Solana adapters.
    pub fn with_defaults(etherscan: EtherscanConfig, helius: HeliusConfig) -> ProviderResult<Self> {
        let mut registry = Self::new();
        registry.register(ChainFamily::Evm, Arc::new(EtherscanProvider::new(etherscan)?));
        registry.register(ChainFamily::Solana, Arc::new(HeliusProvider::new(helius)?));
        Ok(registry)
    }

    /// Register (or replace) the adapter for a chain family.
    pub fn register(&mut self, family: ChainFamily, provider: Arc<dyn ChainProvider>) {
        self.providers.insert(family, provider);
    }

    /// Adapter serving `chain`, if one is registered.
    pub fn for_chain(&self, chain: Chain) -> Option<Arc<dyn ChainProvider>> {
        self.providers
            .get(&chain.family())
            .filter(|p| p.supports(chain))
            .cloned()
    }

    /// Registered families.
    pub fn families(&self) -> impl Iterator<Item = ChainFamily> + '_ {
        self.providers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockProvider;

    #[test]
    fn test_registry_lookup_by_family() {
        let mut registry = ProviderRegistry::new();
        registry.register(
            ChainFamily::Evm,
            Arc::new(MockProvider::new(&[Chain::Ethereum, Chain::Base])),
        );

        assert!(registry.for_chain(Chain::Ethereum).is_some());
        assert!(registry.for_chain(Chain::Base).is_some());
        // Registered family, but the mock does not serve this chain.
        assert!(registry.for_chain(Chain::Polygon).is_none());
        assert!(registry.for_chain(Chain::Solana).is_none());
    }

    #[test]
    fn test_registry_defaults() {
        let registry =
            ProviderRegistry::with_defaults(EtherscanConfig::default(), HeliusConfig::default())
                .unwrap();
        assert_eq!(registry.for_chain(Chain::Arbitrum).unwrap().name(), "etherscan");
        assert_eq!(registry.for_chain(Chain::Solana).unwrap().name(), "helius");
        assert_eq!(registry.families().count(), 2);
    }
}
