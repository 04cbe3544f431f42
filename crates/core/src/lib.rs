pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use chrono::{DateTime, Utc};
use log::info;
use models::{
    coin::CoinCatalog,
    fx::FxRate,
    holding::{normalize_symbol, Holding, HoldingUpdate},
    price::{ChangePeriod, MarketRow, PriceMap},
    settings::{normalize_currency, DuplicatePolicy, Settings},
    valuation::PortfolioValuation,
};
use providers::{http::HttpConfig, registry::ProviderRegistry};
use services::{
    aggregator::PriceAggregator,
    fx_service::FxRateClient,
    portfolio_service::{ClearConfirmation, PortfolioStore},
    refresh_service::{AutoRefreshHandle, RefreshOutcome, RefreshService},
    scheduler::{Clock, RefreshScheduler, RefreshTrigger, SchedulerState, SystemClock},
    valuation_service::{ValuationCache, ValuationKey, ValuationService},
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use storage::{manager::StorageManager, traits::KeyValueStore, traits::SETTINGS_KEY};
use uuid::Uuid;

use errors::CoreError;

/// Construction-time configuration (not persisted).
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Coins the price sources know about
    pub catalog: CoinCatalog,

    /// Timeout and user agent for every provider request
    pub http: HttpConfig,

    /// How often the auto-refresh task checks whether a refresh is due
    pub auto_refresh_poll: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            catalog: CoinCatalog::default(),
            http: HttpConfig::default(),
            auto_refresh_poll: Duration::from_secs(5),
        }
    }
}

/// Main entry point for the CoinBox core library.
///
/// Holds the portfolio, the live price and FX state, and the refresh
/// machinery. The presentation layer calls these methods as intents and
/// reads derived values back; it never talks to providers or storage.
#[must_use]
pub struct CoinBox {
    portfolio: PortfolioStore,
    settings: Settings,
    storage: StorageManager,
    catalog: Arc<CoinCatalog>,
    registry: ProviderRegistry,
    refresher: Arc<RefreshService>,
    valuation_service: ValuationService,
    valuation_cache: ValuationCache,
    auto_refresh_poll: Duration,
}

impl std::fmt::Debug for CoinBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinBox")
            .field("holdings", &self.portfolio.len())
            .field("settings", &self.settings)
            .field("quotes", &self.refresher.aggregator().snapshot().len())
            .field("fx", &self.refresher.fx().current())
            .finish()
    }
}

impl CoinBox {
    /// Open with the default providers and the system clock.
    pub async fn open(store: Arc<dyn KeyValueStore>, config: CoreConfig) -> Self {
        let storage = StorageManager::new(store);
        let settings: Settings = storage.load_json(SETTINGS_KEY).await.unwrap_or_default();
        let registry = ProviderRegistry::new_with_defaults(
            Arc::new(config.catalog.clone()),
            &settings.reference_currency,
            &config.http,
        );
        Self::assemble(storage, settings, config, registry, Arc::new(SystemClock)).await
    }

    /// Open with an explicit provider registry and clock.
    pub async fn open_with(
        store: Arc<dyn KeyValueStore>,
        config: CoreConfig,
        registry: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let storage = StorageManager::new(store);
        let settings: Settings = storage.load_json(SETTINGS_KEY).await.unwrap_or_default();
        Self::assemble(storage, settings, config, registry, clock).await
    }

    async fn assemble(
        storage: StorageManager,
        settings: Settings,
        config: CoreConfig,
        registry: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut portfolio = PortfolioStore::load(storage.clone()).await;
        portfolio.set_duplicate_policy(settings.duplicate_policy);

        let aggregator = Arc::new(PriceAggregator::new(
            registry.ordered_price_sources(&settings.price_source_order),
        ));
        let fx = Arc::new(FxRateClient::new(
            registry.ordered_fx_providers(&settings.fx_provider_order),
            storage.clone(),
        ));
        fx.bootstrap().await;

        let scheduler = Arc::new(RefreshScheduler::new(
            clock,
            settings.effective_interval_minutes(),
        ));
        let refresher = Arc::new(RefreshService::new(
            scheduler,
            aggregator,
            fx,
            &settings.reference_currency,
            &settings.local_currency,
        ));

        let coinbox = Self {
            portfolio,
            settings,
            storage,
            catalog: Arc::new(config.catalog),
            registry,
            refresher,
            valuation_service: ValuationService::new(),
            valuation_cache: ValuationCache::new(),
            auto_refresh_poll: config.auto_refresh_poll,
        };
        coinbox.sync_tracked_symbols();
        info!(
            "CoinBox opened: {} holdings, {} → {}",
            coinbox.portfolio.len(),
            coinbox.settings.reference_currency,
            coinbox.settings.local_currency
        );
        coinbox
    }

    /// First refresh after opening.
    pub async fn start(&self) -> RefreshOutcome {
        self.refresher.refresh(RefreshTrigger::Initial).await
    }

    /// Stop the timer for good. In-flight refreshes finish but are not published.
    pub fn shutdown(&self) {
        self.refresher.scheduler().shutdown();
    }

    // ── Holdings ────────────────────────────────────────────────────

    /// Add a holding. Returns its id (or the merged holding's id).
    pub async fn add_holding(
        &mut self,
        symbol: &str,
        amount: f64,
        manual_unit_price: f64,
    ) -> Result<Uuid, CoreError> {
        let id = self.portfolio.add(symbol, amount, manual_unit_price).await?;
        self.sync_tracked_symbols();
        Ok(id)
    }

    /// Change amount and/or manual price of a holding.
    pub async fn edit_holding(&mut self, id: Uuid, update: HoldingUpdate) -> Result<(), CoreError> {
        self.portfolio.edit(id, update).await
    }

    /// Remove a holding; unknown ids are ignored. Returns whether one was removed.
    pub async fn remove_holding(&mut self, id: Uuid) -> bool {
        let removed = self.portfolio.remove(id).await;
        if removed {
            self.sync_tracked_symbols();
        }
        removed
    }

    /// Remove every holding. The caller must have confirmed with the user.
    pub async fn clear_holdings(&mut self, confirmation: ClearConfirmation) {
        self.portfolio.clear(confirmation).await;
        self.sync_tracked_symbols();
    }

    #[must_use]
    pub fn holdings(&self) -> &[Holding] {
        self.portfolio.holdings()
    }

    #[must_use]
    pub fn get_holding(&self, id: Uuid) -> Option<&Holding> {
        self.portfolio.get(id)
    }

    // ── Refresh ─────────────────────────────────────────────────────

    /// User-triggered refresh. Coalesced if one is already running.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        self.refresher.refresh(RefreshTrigger::Manual).await
    }

    /// Run the periodic refresh if it is due (for hosts that drive their own loop).
    pub async fn tick(&self) -> Option<RefreshOutcome> {
        self.refresher.tick().await
    }

    /// Start a tokio task that runs periodic refreshes.
    pub fn spawn_auto_refresh(&self) -> AutoRefreshHandle {
        self.refresher.spawn_auto_refresh(self.auto_refresh_poll)
    }

    #[must_use]
    pub fn scheduler_state(&self) -> SchedulerState {
        self.refresher.scheduler().state()
    }

    /// Next time the periodic refresh is due, if it is enabled.
    #[must_use]
    pub fn next_refresh_due(&self) -> Option<DateTime<Utc>> {
        self.refresher.scheduler().next_due()
    }

    /// Symbols quoted on each refresh: watch-list ∪ held symbols.
    #[must_use]
    pub fn tracked_symbols(&self) -> BTreeSet<String> {
        let mut symbols: BTreeSet<String> = self.watchlist().into_iter().collect();
        symbols.extend(self.portfolio.symbols());
        symbols
    }

    // ── Valuation ───────────────────────────────────────────────────

    /// Current valuation in the local currency. Recomputed only when the
    /// holdings, the price map or the FX rate changed.
    pub fn valuation(&self) -> PortfolioValuation {
        let key = ValuationKey {
            portfolio: self.portfolio.revision(),
            quotes: self.refresher.aggregator().revision(),
            fx: self.refresher.fx().revision(),
        };
        self.valuation_cache.get_or_compute(key, || {
            let quotes = self.refresher.aggregator().snapshot();
            let fx = self.fx_rate();
            self.valuation_service
                .value_portfolio(self.portfolio.holdings(), &quotes, fx.as_ref())
        })
    }

    /// Watch-list rows with live prices and the selected change period.
    #[must_use]
    pub fn market_overview(&self) -> Vec<MarketRow> {
        let quotes = self.refresher.aggregator().snapshot();
        let fx = self.fx_rate();
        self.valuation_service.market_rows(
            &self.watchlist(),
            &self.catalog,
            &quotes,
            fx.as_ref(),
            self.settings.change_period,
        )
    }

    /// Current price map.
    #[must_use]
    pub fn quotes(&self) -> PriceMap {
        self.refresher.aggregator().snapshot()
    }

    /// FX rate for the configured currency pair, live or cached.
    #[must_use]
    pub fn fx_rate(&self) -> Option<FxRate> {
        self.refresher
            .fx()
            .current_for(&self.settings.reference_currency, &self.settings.local_currency)
    }

    /// When prices were last replaced by a successful refresh.
    #[must_use]
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.refresher.aggregator().last_updated()
    }

    // ── Settings ────────────────────────────────────────────────────

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn catalog(&self) -> &CoinCatalog {
        &self.catalog
    }

    /// Effective watch-list: the configured one, or the whole catalog when empty.
    #[must_use]
    pub fn watchlist(&self) -> Vec<String> {
        if self.settings.watchlist.is_empty() {
            self.catalog.symbols()
        } else {
            self.settings.watchlist.clone()
        }
    }

    /// Set the auto-refresh cadence in minutes (`0` disables it) and refresh.
    pub async fn set_refresh_interval(&mut self, minutes: u32) -> RefreshOutcome {
        self.settings.refresh_interval_minutes = minutes;
        self.apply_cadence().await
    }

    /// Turn periodic refresh on or off and refresh.
    pub async fn set_auto_refresh(&mut self, enabled: bool) -> RefreshOutcome {
        self.settings.auto_refresh = enabled;
        self.apply_cadence().await
    }

    /// Set the local (display) currency, e.g. "RUB", and refresh.
    pub async fn set_local_currency(&mut self, currency: &str) -> Result<RefreshOutcome, CoreError> {
        let currency = normalize_currency(currency)?;
        self.settings.local_currency = currency;
        self.refresher
            .set_currencies(&self.settings.reference_currency, &self.settings.local_currency);
        self.refresher.scheduler().invalidate_in_flight();
        self.valuation_cache.invalidate();
        self.persist_settings().await;
        Ok(self.refresher.refresh(RefreshTrigger::SettingsChanged).await)
    }

    /// Set FX provider priority (ids, highest first) and refresh.
    pub async fn set_fx_provider_order(&mut self, order: Vec<String>) -> Result<RefreshOutcome, CoreError> {
        check_known_ids(&order, &self.registry.fx_provider_ids(), "FX provider")?;
        self.settings.fx_provider_order = order;
        self.refresher
            .fx()
            .set_providers(self.registry.ordered_fx_providers(&self.settings.fx_provider_order));
        self.refresher.scheduler().invalidate_in_flight();
        self.persist_settings().await;
        Ok(self.refresher.refresh(RefreshTrigger::SettingsChanged).await)
    }

    /// Set price source priority (ids, highest first) and refresh.
    pub async fn set_price_source_order(&mut self, order: Vec<String>) -> Result<RefreshOutcome, CoreError> {
        check_known_ids(&order, &self.registry.price_source_ids(), "price source")?;
        self.settings.price_source_order = order;
        self.refresher.aggregator().set_sources(
            self.registry
                .ordered_price_sources(&self.settings.price_source_order),
        );
        self.refresher.scheduler().invalidate_in_flight();
        self.persist_settings().await;
        Ok(self.refresher.refresh(RefreshTrigger::SettingsChanged).await)
    }

    /// Replace the watch-list (empty = whole catalog) and refresh.
    pub async fn set_watchlist(&mut self, symbols: Vec<String>) -> RefreshOutcome {
        let mut seen = BTreeSet::new();
        self.settings.watchlist = symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        self.sync_tracked_symbols();
        self.refresher.scheduler().invalidate_in_flight();
        self.persist_settings().await;
        self.refresher.refresh(RefreshTrigger::SettingsChanged).await
    }

    /// Display toggle for the market overview; no refresh needed.
    pub async fn set_change_period(&mut self, period: ChangePeriod) {
        self.settings.change_period = period;
        self.persist_settings().await;
    }

    /// Whether re-adding a held symbol appends or merges.
    pub async fn set_duplicate_policy(&mut self, policy: DuplicatePolicy) {
        self.settings.duplicate_policy = policy;
        self.portfolio.set_duplicate_policy(policy);
        self.persist_settings().await;
    }

    // ── Internal ────────────────────────────────────────────────────

    async fn apply_cadence(&mut self) -> RefreshOutcome {
        self.refresher
            .scheduler()
            .set_interval(self.settings.effective_interval_minutes());
        self.persist_settings().await;
        self.refresher.refresh(RefreshTrigger::SettingsChanged).await
    }

    async fn persist_settings(&self) {
        self.storage.save_json(SETTINGS_KEY, &self.settings).await;
    }

    fn sync_tracked_symbols(&self) {
        self.refresher.set_tracked_symbols(self.tracked_symbols());
    }
}

fn check_known_ids(order: &[String], known: &[String], kind: &str) -> Result<(), CoreError> {
    if let Some(unknown) = order.iter().find(|id| !known.contains(id)) {
        return Err(CoreError::InvalidSetting(format!(
            "Unknown {kind} '{unknown}' (known: {})",
            known.join(", ")
        )));
    }
    Ok(())
}
