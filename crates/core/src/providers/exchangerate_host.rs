use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::http::{self, HttpConfig};
use super::traits::FxProvider;
use crate::errors::CoreError;

const BASE_URL: &str = "https://api.exchangerate.host";

/// exchangerate.host rates.
///
/// - **Endpoint**: `/latest?base={base}&symbols={target}`
pub struct ExchangeRateHostFxProvider {
    client: Client,
    base_url: String,
}

impl ExchangeRateHostFxProvider {
    pub const ID: &'static str = "exchangerate_host";

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

#[derive(Debug, Deserialize)]
pub(crate) struct RatesResponse {
    #[serde(default)]
    rates: Option<HashMap<String, Value>>,
}

pub(crate) fn rate_from_rates(target: &str, resp: &RatesResponse) -> Result<f64, CoreError> {
    let target = target.to_uppercase();
    resp.rates
        .as_ref()
        .and_then(|rates| rates.get(&target))
        .and_then(http::number_from_value)
        .ok_or_else(|| CoreError::malformed("exchangerate.host", format!("No rate found for {target}")))
}

#[async_trait]
impl FxProvider for ExchangeRateHostFxProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "exchangerate.host"
    }

    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64, CoreError> {
        let url = format!(
            "{}/latest?base={}&symbols={}",
            self.base_url,
            base.to_uppercase(),
            target.to_uppercase()
        );
        let resp: RatesResponse = http::get_json(&self.client, self.name(), &url).await?;
        rate_from_rates(target, &resp)
    }
}
