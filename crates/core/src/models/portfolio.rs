use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::holding::Holding;

/// The persisted list of holdings. Insertion order is display order.
///
/// Serialized whole (JSON) on every mutation; there is no partial write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub holdings: Vec<Holding>,
}

impl PortfolioSnapshot {
    pub fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }

    /// Distinct symbols present in the portfolio.
    pub fn symbols(&self) -> BTreeSet<String> {
        self.holdings.iter().map(|h| h.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}
