use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fx::FxRate;

/// Where a line's unit price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceOrigin {
    /// Live quote converted with the FX rate
    Live,
    /// The holding's manual unit price
    Manual,
}

/// Valuation of one holding in the local currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineValuation {
    pub holding_id: Uuid,
    pub symbol: String,
    pub amount: f64,
    pub unit_price_local: f64,
    pub line_value: f64,
    pub price_origin: PriceOrigin,
}

/// Valuation of the whole portfolio in the local currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    /// One line per holding, in portfolio order
    pub lines: Vec<LineValuation>,

    /// Sum of all line values (0 for an empty portfolio)
    pub total: f64,

    /// FX rate used, if any
    pub fx: Option<FxRate>,

    /// Newest quote timestamp among the live lines
    pub quotes_as_of: Option<DateTime<Utc>>,
}

impl PortfolioValuation {
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            total: 0.0,
            fx: None,
            quotes_as_of: None,
        }
    }

    /// Number of lines valued from live quotes.
    pub fn live_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.price_origin == PriceOrigin::Live)
            .count()
    }
}
