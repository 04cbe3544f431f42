use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Period used when displaying price changes on the market overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangePeriod {
    #[default]
    H24,
    D7,
    D30,
}

impl std::fmt::Display for ChangePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangePeriod::H24 => write!(f, "24h"),
            ChangePeriod::D7 => write!(f, "7d"),
            ChangePeriod::D30 => write!(f, "30d"),
        }
    }
}

/// Percentage price changes reported by a provider, when it reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChanges {
    pub h24: Option<f64>,
    pub d7: Option<f64>,
    pub d30: Option<f64>,
}

impl PriceChanges {
    pub fn for_period(&self, period: ChangePeriod) -> Option<f64> {
        match period {
            ChangePeriod::H24 => self.h24,
            ChangePeriod::D7 => self.d7,
            ChangePeriod::D30 => self.d30,
        }
    }

    /// Drop non-finite values so they never reach the display.
    pub fn sanitized(self) -> Self {
        let keep = |v: Option<f64>| v.filter(|x| x.is_finite());
        Self {
            h24: keep(self.h24),
            d7: keep(self.d7),
            d30: keep(self.d30),
        }
    }
}

/// A live unit price for one symbol in the reference currency.
///
/// Quotes are ephemeral: they live in the aggregator's current price map
/// and are never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Ticker symbol, uppercased
    pub symbol: String,

    /// Unit price in the reference currency (finite, non-negative)
    pub unit_price_base: f64,

    /// When the quote was obtained
    pub as_of: DateTime<Utc>,

    /// Name of the provider that produced it
    pub source: String,

    #[serde(default)]
    pub changes: PriceChanges,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, unit_price_base: f64, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            unit_price_base,
            as_of: Utc::now(),
            source: source.into(),
            changes: PriceChanges::default(),
        }
    }

    pub fn with_changes(mut self, changes: PriceChanges) -> Self {
        self.changes = changes.sanitized();
        self
    }

    /// Only finite, non-negative prices are usable.
    pub fn is_valid(&self) -> bool {
        self.unit_price_base.is_finite() && self.unit_price_base >= 0.0
    }
}

/// Symbol → quote. Ordered so that iteration (and therefore logs and
/// market rows built from it) is deterministic.
pub type PriceMap = BTreeMap<String, PriceQuote>;

/// One row of the market overview for a watch-list symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub symbol: String,
    pub name: String,
    /// Live price in the reference currency, if quoted this tick
    pub price_base: Option<f64>,
    /// Live price converted to the local currency, if both quote and FX rate exist
    pub price_local: Option<f64>,
    /// Percentage change for the selected period
    pub change_pct: Option<f64>,
}
