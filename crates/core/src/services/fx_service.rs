use log::{debug, info, warn};
use std::sync::{Arc, RwLock};

use crate::errors::CoreError;
use crate::models::fx::FxRate;
use crate::providers::http::validate_rate;
use crate::providers::traits::FxProvider;
use crate::storage::manager::StorageManager;
use crate::storage::traits::FX_RATE_KEY;

/// Where a resolved rate came from.
#[derive(Debug, Clone, PartialEq)]
pub enum FxResolution {
    /// Fetched just now from a live provider (already persisted)
    Live(FxRate),
    /// Live providers failed; last known good value reused
    Cached(FxRate),
}

impl FxResolution {
    pub fn rate(&self) -> &FxRate {
        match self {
            FxResolution::Live(rate) | FxResolution::Cached(rate) => rate,
        }
    }

    pub fn into_rate(self) -> FxRate {
        match self {
            FxResolution::Live(rate) | FxResolution::Cached(rate) => rate,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, FxResolution::Live(_))
    }
}

#[derive(Debug, Default)]
struct FxState {
    current: Option<FxRate>,
    revision: u64,
}

/// Produces the reference → local conversion rate.
///
/// Providers are tried strictly in priority order and the first finite,
/// positive rate wins; later providers are not called. When all of them
/// fail, the last good rate for the same currency pair is reused (memory
/// first, then the store). Cached rates never expire.
pub struct FxRateClient {
    providers: RwLock<Vec<Arc<dyn FxProvider>>>,
    storage: StorageManager,
    state: RwLock<FxState>,
}

impl FxRateClient {
    pub fn new(providers: Vec<Arc<dyn FxProvider>>, storage: StorageManager) -> Self {
        Self {
            providers: RwLock::new(providers),
            storage,
            state: RwLock::new(FxState::default()),
        }
    }

    /// Replace the provider chain (e.g., after a priority change in settings).
    pub fn set_providers(&self, providers: Vec<Arc<dyn FxProvider>>) {
        *self.providers.write().unwrap_or_else(|e| e.into_inner()) = providers;
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    /// Load the persisted rate into memory (app start). Returns it, if any.
    pub async fn bootstrap(&self) -> Option<FxRate> {
        let stored: FxRate = self.storage.load_json(FX_RATE_KEY).await?;
        if !stored.is_valid() {
            warn!("Ignoring stored FX rate {} (not finite and positive)", stored.rate);
            return None;
        }
        self.adopt(stored.clone());
        Some(stored)
    }

    /// Ask live providers in order. On success the rate is persisted before returning.
    pub async fn fetch_live(&self, base: &str, target: &str) -> Result<FxRate, CoreError> {
        let base = base.to_uppercase();
        let target = target.to_uppercase();

        if base == target {
            return Ok(FxRate::new(&base, &target, 1.0, "identity"));
        }

        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut last_error = None;

        for provider in &providers {
            let result = provider
                .fetch_rate(&base, &target)
                .await
                .and_then(|rate| validate_rate(provider.name(), &base, &target, rate));

            match result {
                Ok(rate) => {
                    let fx = FxRate::new(&base, &target, rate, provider.id());
                    info!("FX {base} → {target} = {rate} from {}", provider.name());
                    self.storage.save_json(FX_RATE_KEY, &fx).await;
                    return Ok(fx);
                }
                Err(e) => {
                    debug!("FX provider {} failed: {e}, trying next", provider.name());
                    last_error = Some(e);
                }
            }
        }

        if let Some(e) = last_error {
            warn!("All FX providers failed for {base} → {target}; last error: {e}");
        }
        Err(CoreError::NoRateAvailable { base, target })
    }

    /// Live rate, else last known good rate for the same pair.
    /// Does not change the rate returned by `current()`; see `adopt`.
    pub async fn resolve(&self, base: &str, target: &str) -> Result<FxResolution, CoreError> {
        match self.fetch_live(base, target).await {
            Ok(rate) => Ok(FxResolution::Live(rate)),
            Err(live_err) => {
                if let Some(rate) = self.current().filter(|r| r.matches(base, target)) {
                    debug!("Using in-memory FX rate from {}", rate.as_of);
                    return Ok(FxResolution::Cached(rate));
                }
                let stored: Option<FxRate> = self.storage.load_json(FX_RATE_KEY).await;
                match stored.filter(|r| r.matches(base, target) && r.is_valid()) {
                    Some(rate) => {
                        info!("Using stored FX rate {} from {}", rate.rate, rate.as_of);
                        Ok(FxResolution::Cached(rate))
                    }
                    None => Err(live_err),
                }
            }
        }
    }

    /// Resolve and make the result the current rate.
    pub async fn current_rate(&self, base: &str, target: &str) -> Result<FxRate, CoreError> {
        let resolution = self.resolve(base, target).await?;
        let rate = resolution.into_rate();
        self.adopt(rate.clone());
        Ok(rate)
    }

    /// Make `rate` the current rate.
    pub fn adopt(&self, rate: FxRate) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.current.as_ref() != Some(&rate) {
            state.current = Some(rate);
            state.revision += 1;
        }
    }

    /// The rate valuations currently use, regardless of currency pair.
    pub fn current(&self) -> Option<FxRate> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).current.clone()
    }

    /// The current rate if it converts `base` into `target`.
    pub fn current_for(&self, base: &str, target: &str) -> Option<FxRate> {
        self.current().filter(|r| r.matches(base, target))
    }

    /// Bumped whenever the current rate changes; used as a valuation cache key.
    pub fn revision(&self) -> u64 {
        self.state.read().unwrap_or_else(|e| e.into_inner()).revision
    }
}
