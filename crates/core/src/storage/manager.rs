use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::errors::CoreError;
use super::traits::KeyValueStore;

/// Typed, best-effort access to the key-value store.
///
/// Reads treat missing, unreadable and corrupt blobs alike as "nothing
/// stored". Writes log failures and move on: persistence must never stop a
/// mutation from taking effect in memory.
#[derive(Clone)]
pub struct StorageManager {
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager").finish_non_exhaustive()
    }
}

impl StorageManager {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Serialize a value to JSON bytes.
    pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(value)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize value: {e}")))
    }

    /// Deserialize JSON bytes.
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CoreError> {
        serde_json::from_slice(bytes)
            .map_err(|e| CoreError::Deserialization(format!("Failed to deserialize value: {e}")))
    }

    /// Strict read: surfaces store and decoding errors.
    pub async fn try_load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoreError> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Best-effort read: any failure is logged and reported as `None`.
    pub async fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_load_json(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Ignoring unreadable stored value under {key}: {e}");
                None
            }
        }
    }

    /// Strict write.
    pub async fn try_save_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CoreError> {
        let bytes = Self::encode(value)?;
        self.store.set(key, bytes).await
    }

    /// Best-effort write: failures are logged and swallowed.
    /// Returns whether the write went through, for callers that care.
    pub async fn save_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match self.try_save_json(key, value).await {
            Ok(()) => {
                debug!("Persisted {key}");
                true
            }
            Err(e) => {
                warn!("Failed to persist {key}: {e}");
                false
            }
        }
    }

    /// Best-effort delete.
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!("Failed to remove {key}: {e}");
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }
}
