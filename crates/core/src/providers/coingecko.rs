use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::http::{self, HttpConfig};
use super::traits::{FxProvider, PriceSource};
use crate::errors::CoreError;
use crate::models::coin::{CoinCatalog, COINGECKO};
use crate::models::price::{PriceChanges, PriceQuote};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko price source.
///
/// - **Free**: no API key for the public endpoints.
/// - **Endpoint**: `/coins/markets?vs_currency=…&ids=…&price_change_percentage=24h,7d,30d`
///
/// CoinGecko identifies coins by slug ("bitcoin"), resolved through the
/// injected catalog. Symbols without a CoinGecko id are unsupported.
pub struct CoinGeckoPriceSource {
    client: Client,
    catalog: Arc<CoinCatalog>,
    vs_currency: String,
    base_url: String,
}

impl CoinGeckoPriceSource {
    pub const ID: &'static str = COINGECKO;

    pub fn new(catalog: Arc<CoinCatalog>, reference_currency: &str, http: &HttpConfig) -> Self {
        Self {
            client: http::build_client(http),
            catalog,
            vs_currency: reference_currency.to_lowercase(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client at another host (mirrors, proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve "BTC" to "bitcoin".
    pub fn resolve_id(&self, symbol: &str) -> Option<&str> {
        self.catalog.provider_id(symbol, COINGECKO)
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct MarketEntry {
    id: String,
    #[serde(default)]
    current_price: Option<Value>,
    #[serde(default)]
    price_change_percentage_24h_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    price_change_percentage_7d_in_currency: Option<f64>,
    #[serde(default)]
    price_change_percentage_30d_in_currency: Option<f64>,
}

/// Pick the row for `id` out of a `/coins/markets` response and turn it into a quote.
pub(crate) fn quote_from_markets(
    symbol: &str,
    id: &str,
    rows: &[MarketEntry],
) -> Result<PriceQuote, CoreError> {
    let row = rows.iter().find(|r| r.id == id).ok_or_else(|| {
        CoreError::malformed("CoinGecko", format!("No market row for {symbol} ({id})"))
    })?;

    let price = row
        .current_price
        .as_ref()
        .and_then(http::number_from_value)
        .ok_or_else(|| CoreError::malformed("CoinGecko", format!("No price data for {symbol}")))?;
    let price = http::validate_price("CoinGecko", symbol, price)?;

    let changes = PriceChanges {
        h24: row
            .price_change_percentage_24h_in_currency
            .or(row.price_change_percentage_24h),
        d7: row.price_change_percentage_7d_in_currency,
        d30: row.price_change_percentage_30d_in_currency,
    };

    Ok(PriceQuote::new(symbol, price, "CoinGecko").with_changes(changes))
}

#[async_trait]
impl PriceSource for CoinGeckoPriceSource {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "CoinGecko"
    }

    fn supports(&self, symbol: &str) -> bool {
        self.resolve_id(symbol).is_some()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, CoreError> {
        let symbol = symbol.to_uppercase();
        let id = self
            .resolve_id(&symbol)
            .ok_or_else(|| CoreError::UnsupportedSymbol(symbol.clone()))?;

        let url = format!(
            "{}/coins/markets?vs_currency={}&ids={id}&price_change_percentage=24h,7d,30d",
            self.base_url, self.vs_currency
        );
        debug!("CoinGecko: fetching {symbol} ({id})");

        let rows: Vec<MarketEntry> = http::get_json(&self.client, "CoinGecko", &url).await?;
        quote_from_markets(&symbol, id, &rows)
    }
}

/// USD → fiat rate through CoinGecko's tether price (USDT ≈ USD).
///
/// Last-resort FX provider: only meaningful when the base currency is USD.
pub struct CoinGeckoTetherFxProvider {
    client: Client,
    base_url: String,
}

impl CoinGeckoTetherFxProvider {
    pub const ID: &'static str = "coingecko_tether";

    pub fn new(http: &HttpConfig) -> Self {
        Self {
            client: http::build_client(http),
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Read `tether.<target>` out of a `/simple/price` response.
pub(crate) fn rate_from_simple_price(
    target: &str,
    body: &HashMap<String, HashMap<String, Value>>,
) -> Result<f64, CoreError> {
    let key = target.to_lowercase();
    body.get("tether")
        .and_then(|prices| prices.get(&key))
        .and_then(http::number_from_value)
        .ok_or_else(|| {
            CoreError::malformed("CoinGecko", format!("No tether price in {}", key.to_uppercase()))
        })
}

#[async_trait]
impl FxProvider for CoinGeckoTetherFxProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "CoinGecko (USDT proxy)"
    }

    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64, CoreError> {
        if !base.eq_ignore_ascii_case("USD") {
            return Err(CoreError::NoRateAvailable {
                base: base.to_uppercase(),
                target: target.to_uppercase(),
            });
        }
        let url = format!(
            "{}/simple/price?ids=tether&vs_currencies={}",
            self.base_url,
            target.to_lowercase()
        );
        let body: HashMap<String, HashMap<String, Value>> =
            http::get_json(&self.client, "CoinGecko", &url).await?;
        rate_from_simple_price(target, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(json: &str) -> Vec<MarketEntry> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parses_market_row_with_changes() {
        let data = rows(
            r#"[{"id":"bitcoin","current_price":50000.5,
                 "price_change_percentage_24h_in_currency":1.5,
                 "price_change_percentage_7d_in_currency":-3.25,
                 "price_change_percentage_30d_in_currency":12.0}]"#,
        );
        let quote = quote_from_markets("BTC", "bitcoin", &data).unwrap();
        assert_eq!(quote.symbol, "BTC");
        assert_eq!(quote.unit_price_base, 50000.5);
        assert_eq!(quote.source, "CoinGecko");
        assert_eq!(quote.changes.h24, Some(1.5));
        assert_eq!(quote.changes.d7, Some(-3.25));
        assert_eq!(quote.changes.d30, Some(12.0));
    }

    #[test]
    fn falls_back_to_plain_24h_change() {
        let data = rows(r#"[{"id":"solana","current_price":150,"price_change_percentage_24h":-2.0}]"#);
        let quote = quote_from_markets("SOL", "solana", &data).unwrap();
        assert_eq!(quote.changes.h24, Some(-2.0));
        assert_eq!(quote.changes.d7, None);
    }

    #[test]
    fn missing_row_is_malformed() {
        let data = rows(r#"[{"id":"ethereum","current_price":3000}]"#);
        let err = quote_from_markets("BTC", "bitcoin", &data).unwrap_err();
        assert!(matches!(err, CoreError::MalformedResponse { .. }));
    }

    #[test]
    fn null_price_is_malformed() {
        let data = rows(r#"[{"id":"bitcoin","current_price":null}]"#);
        let err = quote_from_markets("BTC", "bitcoin", &data).unwrap_err();
        assert!(matches!(err, CoreError::MalformedResponse { .. }));
    }

    #[test]
    fn negative_price_is_malformed() {
        let data = rows(r#"[{"id":"bitcoin","current_price":-1}]"#);
        let err = quote_from_markets("BTC", "bitcoin", &data).unwrap_err();
        assert!(matches!(err, CoreError::MalformedResponse { .. }));
    }

    #[test]
    fn tether_rate_is_read_case_insensitively() {
        let body: HashMap<String, HashMap<String, Value>> =
            serde_json::from_str(r#"{"tether":{"rub":91.2}}"#).unwrap();
        assert_eq!(rate_from_simple_price("RUB", &body).unwrap(), 91.2);
        assert!(rate_from_simple_price("EUR", &body).is_err());
    }
}
