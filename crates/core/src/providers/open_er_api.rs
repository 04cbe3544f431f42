use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::http::{self, HttpConfig};
use super::traits::FxProvider;
use crate::errors::CoreError;

const BASE_URL: &str = "https://open.er-api.com/v6";

/// ExchangeRate-API open access endpoint.
///
/// - **Free**: no API key, daily updates.
/// - **Endpoint**: `/latest/{base}` returns every rate for that base.
pub struct OpenErApiFxProvider {
    client: Client,
    base_url: String,
}

impl OpenErApiFxProvider {
    pub const ID: &'static str = "open_er_api";

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
pub(crate) struct LatestResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    rates: HashMap<String, Value>,
}

pub(crate) fn rate_from_latest(target: &str, resp: &LatestResponse) -> Result<f64, CoreError> {
    if let Some(result) = &resp.result {
        if result != "success" {
            return Err(CoreError::malformed(
                "open.er-api.com",
                format!("API reported result '{result}'"),
            ));
        }
    }
    let target = target.to_uppercase();
    resp.rates
        .get(&target)
        .and_then(http::number_from_value)
        .ok_or_else(|| CoreError::malformed("open.er-api.com", format!("No rate found for {target}")))
}

#[async_trait]
impl FxProvider for OpenErApiFxProvider {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "open.er-api.com"
    }

    async fn fetch_rate(&self, base: &str, target: &str) -> Result<f64, CoreError> {
        let url = format!("{}/latest/{}", self.base_url, base.to_uppercase());
        let resp: LatestResponse = http::get_json(&self.client, self.name(), &url).await?;
        rate_from_latest(target, &resp)
    }
}
