use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::http::{self, HttpConfig};
use super::traits::PriceSource;
use crate::errors::CoreError;
use crate::models::coin::{CoinCatalog, COINCAP};
use crate::models::price::{PriceChanges, PriceQuote};

const BASE_URL: &str = "https://api.coincap.io/v2";

/// CoinCap API provider for cryptocurrency prices.
///
/// - **Free**: No API key required, no strict rate limits.
/// - **Endpoint**: `/assets/{id}`
///
/// Note: CoinCap uses lowercase ids like "bitcoin", "ethereum" and only
/// quotes in USD. Ids come from the injected catalog; unmapped symbols fail
/// with `UnsupportedSymbol` without touching the network.
pub struct CoinCapPriceSource {
    client: Client,
    catalog: Arc<CoinCatalog>,
    base_url: String,
}

impl CoinCapPriceSource {
    pub const ID: &'static str = COINCAP;

    pub fn new(catalog: Arc<CoinCatalog>, http: &HttpConfig) -> Self {
        Self {
            client: http::build_client(http),
            catalog,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolve a symbol like "BTC" to a CoinCap ID like "bitcoin".
    pub fn resolve_id(&self, symbol: &str) -> Option<&str> {
        self.catalog.provider_id(symbol, COINCAP)
    }
}

// ── CoinCap API response types ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct AssetResponse {
    data: AssetData,
}

#[derive(Debug, Deserialize)]
struct AssetData {
    #[serde(rename = "priceUsd", default)]
    price_usd: Option<Value>,
    #[serde(rename = "changePercent24Hr", default)]
    change_percent_24h: Option<Value>,
}

pub(crate) fn quote_from_asset(symbol: &str, resp: &AssetResponse) -> Result<PriceQuote, CoreError> {
    let price = resp
        .data
        .price_usd
        .as_ref()
        .ok_or_else(|| CoreError::malformed("CoinCap", format!("No price data for {symbol}")))
        .and_then(|v| {
            http::number_from_value(v).ok_or_else(|| {
                CoreError::malformed("CoinCap", format!("Invalid price format for {symbol}: {v}"))
            })
        })?;
    let price = http::validate_price("CoinCap", symbol, price)?;

    let changes = PriceChanges {
        h24: resp.data.change_percent_24h.as_ref().and_then(http::number_from_value),
        ..PriceChanges::default()
    };

    Ok(PriceQuote::new(symbol, price, "CoinCap").with_changes(changes))
}

#[async_trait]
impl PriceSource for CoinCapPriceSource {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "CoinCap"
    }

    fn supports(&self, symbol: &str) -> bool {
        self.resolve_id(symbol).is_some()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, CoreError> {
        let symbol = symbol.to_uppercase();
        let id = self
            .resolve_id(&symbol)
            .ok_or_else(|| CoreError::UnsupportedSymbol(symbol.clone()))?;
        let url = format!("{}/assets/{id}", self.base_url);
        debug!("CoinCap: fetching {symbol} ({id})");

        let resp: AssetResponse = http::get_json(&self.client, "CoinCap", &url).await?;
        quote_from_asset(&symbol, &resp)
    }
}
