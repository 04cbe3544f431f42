use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use crate::errors::CoreError;
use crate::models::price::{PriceMap, PriceQuote};
use crate::providers::traits::PriceSource;

/// Why one symbol ended up without a quote this round.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
    /// Whether the next refresh may succeed (false for unsupported symbols)
    pub transient: bool,
}

/// Outcome of one aggregation round.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationReport {
    /// Symbols requested
    pub requested: usize,
    /// Symbols that got a quote
    pub quoted: usize,
    pub failed: Vec<SymbolFailure>,
    /// Whether the new map replaced the previous one
    pub published: bool,
}

/// Result of fanning out to the sources, before it is published.
#[derive(Debug, Clone, Default)]
pub struct FetchedQuotes {
    pub requested: usize,
    pub quotes: PriceMap,
    pub failed: Vec<SymbolFailure>,
}

#[derive(Debug, Default)]
struct AggregatorState {
    quotes: PriceMap,
    last_updated: Option<DateTime<Utc>>,
    revision: u64,
}

/// Gathers quotes for every tracked symbol and owns the current price map.
///
/// - One concurrent request chain per symbol; symbols do not wait on each other.
/// - Per symbol, sources are tried in priority order until one returns a
///   finite, non-negative price (automatic fallback).
/// - A symbol that no source can price is simply absent. The round itself
///   never fails.
/// - The new map is published only after every request settled, replacing
///   the previous map wholesale. If every requested symbol failed, the
///   previous map is kept so the last valuation stays visible.
pub struct PriceAggregator {
    sources: RwLock<Vec<Arc<dyn PriceSource>>>,
    state: RwLock<AggregatorState>,
}

impl PriceAggregator {
    pub fn new(sources: Vec<Arc<dyn PriceSource>>) -> Self {
        Self {
            sources: RwLock::new(sources),
            state: RwLock::new(AggregatorState::default()),
        }
    }

    /// Replace the source chain (e.g., after a priority change in settings).
    pub fn set_sources(&self, sources: Vec<Arc<dyn PriceSource>>) {
        *self.sources.write().unwrap_or_else(|e| e.into_inner()) = sources;
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.id().to_string())
            .collect()
    }

    /// Fetch quotes for `symbols` without touching the published map.
    pub async fn fetch_all(&self, symbols: &BTreeSet<String>) -> FetchedQuotes {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner()).clone();

        let futures = symbols.iter().map(|symbol| {
            let sources = &sources;
            async move { (symbol.clone(), fetch_one(sources, symbol).await) }
        });
        let results = join_all(futures).await;

        let mut fetched = FetchedQuotes {
            requested: symbols.len(),
            ..FetchedQuotes::default()
        };
        for (symbol, result) in results {
            match result {
                Ok(quote) => {
                    fetched.quotes.insert(symbol, quote);
                }
                Err(e) => fetched.failed.push(SymbolFailure {
                    symbol,
                    transient: e.is_transient(),
                    error: e.to_string(),
                }),
            }
        }

        // Log errors but don't fail the entire operation
        if !fetched.failed.is_empty() {
            warn!(
                "No quote for {} of {} symbols: {:?}",
                fetched.failed.len(),
                fetched.requested,
                fetched.failed.iter().map(|f| f.symbol.as_str()).collect::<Vec<_>>()
            );
        }
        fetched
    }

    /// Publish a fetched round. Returns whether the map was replaced.
    pub fn publish(&self, fetched: FetchedQuotes) -> AggregationReport {
        let mut report = AggregationReport {
            requested: fetched.requested,
            quoted: fetched.quotes.len(),
            failed: fetched.failed,
            published: false,
        };

        if fetched.requested > 0 && fetched.quotes.is_empty() {
            info!("Every price request failed; keeping the previous price map");
            return report;
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.quotes = fetched.quotes;
        state.last_updated = Some(Utc::now());
        state.revision += 1;
        report.published = true;
        report
    }

    /// Fetch and publish in one go.
    pub async fn refresh(&self, symbols: &BTreeSet<String>) -> AggregationReport {
        let fetched = self.fetch_all(symbols).await;
        self.publish(fetched)
    }

    /// Copy of the current price map.
    pub fn snapshot(&self) -> PriceMap {
        self.state.read().unwrap_or_else(|e| e.into_inner()).quotes.clone()
    }

    pub fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .quotes
            .get(symbol)
            .cloned()
    }

    /// When the map was last replaced.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).last_updated
    }

    /// Bumped on every publish; used as a valuation cache key.
    pub fn revision(&self) -> u64 {
        self.state.read().unwrap_or_else(|e| e.into_inner()).revision
    }
}

/// Try each source in order for one symbol.
async fn fetch_one(sources: &[Arc<dyn PriceSource>], symbol: &str) -> Result<PriceQuote, CoreError> {
    let mut last_error = None;

    for source in sources {
        if !source.supports(symbol) {
            last_error.get_or_insert(CoreError::UnsupportedSymbol(symbol.to_string()));
            continue;
        }

        match source.fetch_quote(symbol).await {
            Ok(quote) if quote.is_valid() => return Ok(quote),
            Ok(quote) => {
                debug!(
                    "{} returned unusable price {} for {symbol}, trying next source",
                    source.name(),
                    quote.unit_price_base
                );
                last_error = Some(CoreError::malformed(
                    source.name(),
                    format!(
                        "Invalid price returned for {symbol}: {} (must be finite and non-negative)",
                        quote.unit_price_base
                    ),
                ));
            }
            Err(e) => {
                debug!("{} failed for {symbol}: {e}, trying next source", source.name());
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| CoreError::UnsupportedSymbol(symbol.to_string())))
}
