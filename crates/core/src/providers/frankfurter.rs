use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::http::{self, HttpConfig};
use super::traits::FxProvider;
use crate::errors::CoreError;

const BASE_URL: &str = "https://api.frankfurter.dev/v1";

/// Frankfurter API provider for fiat currency exchange rates.
///
/// - **Free**: No API key, no rate limits, open-source.
/// - **Source**: European Central Bank (ECB) data.
/// - **Coverage**: ~30 currencies (EUR, USD, PLN, GBP, JPY, ...). RUB is
///   not published by the ECB, so this provider is not in the default order.
/// - **Endpoint**: `/latest?base={base}&symbols={target}`
pub struct FrankfurterFxProvider {
    client: Client,
    base_url: String,
}

impl FrankfurterFxProvider {
    pub const ID: &'static str = "frankfurter";

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

// ── Frankfurter API response types ──────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RatesResponse {
    rates: HashMap<String, f64>,
}

pub(crate) fn rate_from_response(base: &str, target: &str, resp: &RatesResponse) -> Result<f64, CoreError> {
    resp.rates.get(target).copied().ok_or_else(|| {
        CoreError::malformed("Frankfurter", format!("No rate found for {base} → {target}"))
    })
}

#[async_trait]
impl FxProvider for FrankfurterFxProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Frankfurter"
    }

    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64, CoreError> {
        let base = base.to_uppercase();
        let target = target.to_uppercase();
        let url = format!("{}/latest?base={base}&symbols={target}", self.base_url);

        let resp: RatesResponse = http::get_json(&self.client, "Frankfurter", &url).await?;
        rate_from_response(&base, &target, &resp)
    }
}
