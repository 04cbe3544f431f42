use async_trait::async_trait;

use crate::errors::CoreError;

/// Key under which the portfolio snapshot is stored.
pub const PORTFOLIO_KEY: &str = "COINBOX_PORTFOLIO_V1";
/// Key under which the last good FX rate is stored.
pub const FX_RATE_KEY: &str = "COINBOX_FX_RATE_V1";
/// Key under which user settings are stored.
pub const SETTINGS_KEY: &str = "COINBOX_SETTINGS_V1";

/// Key-value blob store the app persists into (device storage, a directory, memory).
///
/// Implementations report errors honestly; `StorageManager` is the layer
/// that decides to treat them as "missing" or to ignore them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`, `None` if nothing was stored.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;

    /// Store `value` under `key`, replacing any previous blob.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError>;

    /// Delete the blob under `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), CoreError>;
}
