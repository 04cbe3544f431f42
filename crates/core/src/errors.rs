use thiserror::Error;

use crate::models::holding::HoldingField;

/// Unified error type for the entire coinbox-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── User input ──────────────────────────────────────────────────
    #[error("Invalid {field}: {message}")]
    Validation {
        field: HoldingField,
        message: String,
    },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Holding not found: {0}")]
    NotFound(String),

    // ── API / Network ───────────────────────────────────────────────
    #[error("Unsupported symbol: {0}")]
    UnsupportedSymbol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response ({provider}): {message}")]
    MalformedResponse {
        provider: String,
        message: String,
    },

    #[error("No exchange rate available for {base} → {target}")]
    NoRateAvailable {
        base: String,
        target: String,
    },

    // ── Storage ─────────────────────────────────────────────────────
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CoreError {
    /// Shorthand for a validation failure on one holding field.
    pub fn validation(field: HoldingField, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for a provider returning something we cannot use.
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether the next scheduled or manual refresh may succeed where this one failed.
    ///
    /// Nothing is retried inside a single attempt; this only tells callers
    /// (and logs) whether waiting for the next tick makes sense.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_)
                | CoreError::MalformedResponse { .. }
                | CoreError::NoRateAvailable { .. }
                | CoreError::Storage(_)
        )
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors often contain full URLs; strip query strings so
        // nothing user-specific ends up in logs.
        let msg = if e.is_timeout() {
            format!("request timed out: {e}")
        } else {
            e.to_string()
        };
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
