use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields of a holding that user input can get wrong.
/// Carried by `CoreError::Validation` so the caller knows which input to flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldingField {
    Symbol,
    Amount,
    ManualUnitPrice,
}

impl std::fmt::Display for HoldingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldingField::Symbol => write!(f, "symbol"),
            HoldingField::Amount => write!(f, "amount"),
            HoldingField::ManualUnitPrice => write!(f, "manual unit price"),
        }
    }
}

/// A single portfolio entry.
///
/// Holdings are independent: the same symbol may appear several times
/// (unless the merge policy is enabled in settings). The symbol never
/// changes after creation; only amount and manual price can be edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Unique identifier
    pub id: Uuid,

    /// Ticker symbol, uppercased (e.g., "BTC")
    pub symbol: String,

    /// Quantity held (always positive)
    pub amount: f64,

    /// Unit price in the local currency, used when no live quote is available
    #[serde(default)]
    pub manual_unit_price: f64,

    /// When the holding was created
    pub added_at: DateTime<Utc>,
}

impl Holding {
    /// Build a holding with a fresh id. Does not validate; see `PortfolioStore::add`.
    pub fn new(symbol: impl Into<String>, amount: f64, manual_unit_price: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: normalize_symbol(&symbol.into()),
            amount,
            manual_unit_price,
            added_at: Utc::now(),
        }
    }
}

/// Partial update applied by `PortfolioStore::edit`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldingUpdate {
    pub amount: Option<f64>,
    pub manual_unit_price: Option<f64>,
}

impl HoldingUpdate {
    pub fn amount(amount: f64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn manual_unit_price(price: f64) -> Self {
        Self {
            manual_unit_price: Some(price),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.manual_unit_price.is_none()
    }
}

/// Trim and uppercase a ticker the way every lookup expects it.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
