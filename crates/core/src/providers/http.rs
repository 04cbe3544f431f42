use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::errors::CoreError;

/// HTTP settings shared by every provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Hard ceiling for a single request, connect + body.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: concat!("coinbox-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Build a client with the configured timeout. A request that exceeds it
/// fails with `CoreError::Network` instead of hanging the refresh.
pub fn build_client(config: &HttpConfig) -> Client {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// GET `url` and decode the JSON body. Transport errors and non-2xx
/// statuses are network errors; a body of the wrong shape is malformed.
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    provider: &str,
    url: &str,
) -> Result<T, CoreError> {
    let resp = client.get(url).send().await?.error_for_status()?;
    resp.json::<T>()
        .await
        .map_err(|e| CoreError::malformed(provider, format!("Failed to parse response: {e}")))
}

/// Read a JSON number, also accepting numeric strings (some APIs quote prices).
pub fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Accept a price only if it is finite and non-negative.
pub fn validate_price(provider: &str, symbol: &str, price: f64) -> Result<f64, CoreError> {
    if !price.is_finite() || price < 0.0 {
        return Err(CoreError::malformed(
            provider,
            format!("Invalid price returned for {symbol}: {price} (must be finite and non-negative)"),
        ));
    }
    Ok(price)
}

/// Accept a rate only if it is finite and strictly positive.
pub fn validate_rate(provider: &str, base: &str, target: &str, rate: f64) -> Result<f64, CoreError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(CoreError::malformed(
            provider,
            format!("Invalid rate returned for {base} → {target}: {rate} (must be finite and positive)"),
        ));
    }
    Ok(rate)
}
