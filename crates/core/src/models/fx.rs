use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference-currency → local-currency multiplier.
///
/// The last successful rate is persisted and reused offline. It never
/// expires; `as_of` lets the presentation layer show how stale it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    /// Reference currency (e.g., "USD")
    pub base: String,

    /// Local currency (e.g., "RUB")
    pub target: String,

    /// Multiplier, finite and > 0
    pub rate: f64,

    /// Provider id that produced it
    pub source: String,

    pub as_of: DateTime<Utc>,
}

impl FxRate {
    pub fn new(
        base: impl Into<String>,
        target: impl Into<String>,
        rate: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into().to_uppercase(),
            target: target.into().to_uppercase(),
            rate,
            source: source.into(),
            as_of: Utc::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.rate.is_finite() && self.rate > 0.0
    }

    /// Whether this rate converts `base` into `target` (case-insensitive).
    pub fn matches(&self, base: &str, target: &str) -> bool {
        self.base.eq_ignore_ascii_case(base) && self.target.eq_ignore_ascii_case(target)
    }
}
