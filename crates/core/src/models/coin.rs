use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::holding::normalize_symbol;

/// Provider id used for CoinGecko entries in `CoinMeta::provider_ids`.
pub const COINGECKO: &str = "coingecko";
/// Provider id used for CoinCap entries in `CoinMeta::provider_ids`.
pub const COINCAP: &str = "coincap";

/// Static description of a coin the app knows how to price.
///
/// `provider_ids` maps a price source id (e.g. "coingecko") to that
/// provider's own identifier for the coin (e.g. "bitcoin").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinMeta {
    /// Ticker symbol, uppercased (e.g., "BTC")
    pub symbol: String,

    /// Human-readable name (e.g., "Bitcoin")
    pub name: String,

    /// Provider id → provider-specific coin id
    #[serde(default)]
    pub provider_ids: BTreeMap<String, String>,
}

impl CoinMeta {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: normalize_symbol(&symbol.into()),
            name: name.into(),
            provider_ids: BTreeMap::new(),
        }
    }

    /// Attach a provider-specific id (builder style).
    pub fn with_id(mut self, provider: &str, id: impl Into<String>) -> Self {
        self.provider_ids.insert(provider.to_string(), id.into());
        self
    }

    pub fn id_for(&self, provider: &str) -> Option<&str> {
        self.provider_ids.get(provider).map(String::as_str)
    }
}

/// The set of coins known to the app, injected into price sources at
/// construction time. Swapping providers or supported symbols is a
/// configuration change, not a code change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinCatalog {
    coins: Vec<CoinMeta>,
}

impl CoinCatalog {
    pub fn new(coins: Vec<CoinMeta>) -> Self {
        Self { coins }
    }

    /// An empty catalog: every symbol is unsupported.
    pub fn empty() -> Self {
        Self { coins: Vec::new() }
    }

    pub fn get(&self, symbol: &str) -> Option<&CoinMeta> {
        let upper = normalize_symbol(symbol);
        self.coins.iter().find(|c| c.symbol == upper)
    }

    /// Provider-specific id for `symbol`, if the catalog maps it for `provider`.
    pub fn provider_id(&self, symbol: &str, provider: &str) -> Option<&str> {
        self.get(symbol).and_then(|c| c.id_for(provider))
    }

    /// Reverse lookup: which symbol does `provider` call `id`?
    pub fn symbol_for(&self, provider: &str, id: &str) -> Option<&str> {
        self.coins
            .iter()
            .find(|c| c.id_for(provider) == Some(id))
            .map(|c| c.symbol.as_str())
    }

    pub fn name_of(&self, symbol: &str) -> Option<&str> {
        self.get(symbol).map(|c| c.name.as_str())
    }

    /// Symbols in catalog order.
    pub fn symbols(&self) -> Vec<String> {
        self.coins.iter().map(|c| c.symbol.clone()).collect()
    }

    pub fn coins(&self) -> &[CoinMeta] {
        &self.coins
    }

    /// Add or replace a coin.
    pub fn insert(&mut self, coin: CoinMeta) {
        match self.coins.iter_mut().find(|c| c.symbol == coin.symbol) {
            Some(existing) => *existing = coin,
            None => self.coins.push(coin),
        }
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}

impl Default for CoinCatalog {
    fn default() -> Self {
        let coins = [
            ("BTC", "Bitcoin", "bitcoin", "bitcoin"),
            ("ETH", "Ethereum", "ethereum", "ethereum"),
            ("SOL", "Solana", "solana", "solana"),
            ("LINK", "Chainlink", "chainlink", "chainlink"),
            ("USDT", "Tether", "tether", "tether"),
            ("SUI", "Sui", "sui", "sui"),
            ("TRX", "TRON", "tron", "tron"),
            ("DOT", "Polkadot", "polkadot", "polkadot"),
            ("ARB", "Arbitrum", "arbitrum", "arbitrum"),
        ]
        .into_iter()
        .map(|(symbol, name, gecko, coincap)| {
            CoinMeta::new(symbol, name)
                .with_id(COINGECKO, gecko)
                .with_id(COINCAP, coincap)
        })
        .collect();

        Self::new(coins)
    }
}
