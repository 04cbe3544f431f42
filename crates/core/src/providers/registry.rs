use log::warn;
use std::sync::Arc;

use crate::models::coin::CoinCatalog;

use super::coincap::CoinCapPriceSource;
use super::coingecko::{CoinGeckoPriceSource, CoinGeckoTetherFxProvider};
use super::exchangerate_host::ExchangeRateHostFxProvider;
use super::frankfurter::FrankfurterFxProvider;
use super::http::HttpConfig;
use super::open_er_api::OpenErApiFxProvider;
use super::traits::{FxProvider, PriceSource};

/// Registry of all available price sources and FX providers.
///
/// Priority is registration order unless a settings order is applied with
/// `ordered_price_sources` / `ordered_fx_providers`.
#[derive(Default)]
pub struct ProviderRegistry {
    price_sources: Vec<Arc<dyn PriceSource>>,
    fx_providers: Vec<Arc<dyn FxProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all default providers pre-configured.
    pub fn new_with_defaults(
        catalog: Arc<CoinCatalog>,
        reference_currency: &str,
        http: &HttpConfig,
    ) -> Self {
        let mut registry = Self::new();

        // CoinGecko: primary, quotes in any reference currency
        registry.register_price_source(Arc::new(CoinGeckoPriceSource::new(
            catalog.clone(),
            reference_currency,
            http,
        )));

        // CoinCap: fallback, USD only
        if reference_currency.eq_ignore_ascii_case("USD") {
            registry.register_price_source(Arc::new(CoinCapPriceSource::new(catalog, http)));
        }

        registry.register_fx_provider(Arc::new(OpenErApiFxProvider::new(http)));
        registry.register_fx_provider(Arc::new(ExchangeRateHostFxProvider::new(http)));
        registry.register_fx_provider(Arc::new(CoinGeckoTetherFxProvider::new(http)));
        registry.register_fx_provider(Arc::new(FrankfurterFxProvider::new(http)));

        registry
    }

    pub fn register_price_source(&mut self, source: Arc<dyn PriceSource>) {
        self.price_sources.push(source);
    }

    pub fn register_fx_provider(&mut self, provider: Arc<dyn FxProvider>) {
        self.fx_providers.push(provider);
    }

    pub fn price_sources(&self) -> &[Arc<dyn PriceSource>] {
        &self.price_sources
    }

    pub fn fx_providers(&self) -> &[Arc<dyn FxProvider>] {
        &self.fx_providers
    }

    /// Price sources in the priority given by `order` (ids).
    pub fn ordered_price_sources(&self, order: &[String]) -> Vec<Arc<dyn PriceSource>> {
        apply_order(&self.price_sources, order, |p| p.id(), "price source")
    }

    /// FX providers in the priority given by `order` (ids).
    pub fn ordered_fx_providers(&self, order: &[String]) -> Vec<Arc<dyn FxProvider>> {
        apply_order(&self.fx_providers, order, |p| p.id(), "FX provider")
    }

    pub fn price_source_ids(&self) -> Vec<String> {
        self.price_sources.iter().map(|p| p.id().to_string()).collect()
    }

    pub fn fx_provider_ids(&self) -> Vec<String> {
        self.fx_providers.iter().map(|p| p.id().to_string()).collect()
    }
}

/// Providers named in `order` come first, in that order; providers not
/// named keep their registration order after them. Unknown ids are logged
/// and skipped; repeated ids count once.
fn apply_order<T: ?Sized>(
    items: &[Arc<T>],
    order: &[String],
    id_of: impl Fn(&T) -> &str,
    kind: &str,
) -> Vec<Arc<T>> {
    let mut ordered: Vec<Arc<T>> = Vec::with_capacity(items.len());
    let mut taken = vec![false; items.len()];

    for wanted in order {
        match items.iter().position(|p| id_of(p.as_ref()) == wanted.as_str()) {
            Some(idx) if !taken[idx] => {
                taken[idx] = true;
                ordered.push(items[idx].clone());
            }
            Some(_) => {}
            None => warn!("Unknown {kind} id '{wanted}' in priority order, ignoring"),
        }
    }

    for (idx, item) in items.iter().enumerate() {
        if !taken[idx] {
            ordered.push(item.clone());
        }
    }
    ordered
}
