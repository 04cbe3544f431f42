use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::price::PriceQuote;

/// A provider of live spot prices for coins. The aggregator only sees this trait;
/// each API (CoinGecko, CoinCap) implements it.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Stable id used in settings (e.g., "coingecko").
    fn id(&self) -> &str;

    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Whether this source has a mapping for `symbol`. Cheap, no I/O.
    fn supports(&self, symbol: &str) -> bool;

    /// Fetch the current unit price of `symbol` in the reference currency.
    ///
    /// Fails with `UnsupportedSymbol` (before any network call) when the
    /// symbol is not mapped, `Network` on transport errors and timeouts,
    /// and `MalformedResponse` when the body has no usable price.
    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, CoreError>;
}

/// A provider of fiat exchange rates.
#[async_trait]
pub trait FxProvider: Send + Sync {
    /// Stable id used in settings (e.g., "open_er_api").
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// How many units of `target` one unit of `base` buys.
    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64, CoreError>;
}
