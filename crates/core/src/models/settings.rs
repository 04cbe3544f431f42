use serde::{Deserialize, Serialize};

use super::price::ChangePeriod;
use crate::errors::CoreError;

/// What `PortfolioStore::add` does when the symbol is already held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Append an independent holding (default)
    #[default]
    Append,
    /// Add the amount to the first holding with the same symbol
    Merge,
}

/// User-configurable settings, persisted through the key-value store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minutes between automatic refreshes. `0` disables periodic refresh.
    pub refresh_interval_minutes: u32,

    /// Master switch for periodic refresh; manual refresh always works.
    pub auto_refresh: bool,

    /// Currency live quotes are expressed in (e.g., "USD").
    pub reference_currency: String,

    /// Currency all valuations are displayed in (e.g., "RUB").
    pub local_currency: String,

    /// FX provider ids, highest priority first.
    pub fx_provider_order: Vec<String>,

    /// Price source ids, highest priority first.
    pub price_source_order: Vec<String>,

    /// Symbols always quoted, held or not. Empty means "the whole catalog".
    pub watchlist: Vec<String>,

    /// Which change column the market overview shows.
    pub change_period: ChangePeriod,

    pub duplicate_policy: DuplicatePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: 5,
            auto_refresh: true,
            reference_currency: "USD".to_string(),
            local_currency: "RUB".to_string(),
            fx_provider_order: vec![
                "open_er_api".to_string(),
                "exchangerate_host".to_string(),
                "coingecko_tether".to_string(),
            ],
            price_source_order: vec!["coingecko".to_string(), "coincap".to_string()],
            watchlist: Vec::new(),
            change_period: ChangePeriod::H24,
            duplicate_policy: DuplicatePolicy::Append,
        }
    }
}

impl Settings {
    /// Interval that actually drives the timer, or `None` when periodic refresh is off.
    pub fn effective_interval_minutes(&self) -> Option<u32> {
        if self.auto_refresh && self.refresh_interval_minutes > 0 {
            Some(self.refresh_interval_minutes)
        } else {
            None
        }
    }
}

/// Validate and normalize a currency code: exactly 3 ASCII letters, uppercased.
pub fn normalize_currency(currency: &str) -> Result<String, CoreError> {
    let trimmed = currency.trim().to_uppercase();
    if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::InvalidSetting(format!(
            "Invalid currency code '{currency}': must be exactly 3 ASCII letters (e.g., USD, EUR, RUB)"
        )));
    }
    Ok(trimmed)
}
