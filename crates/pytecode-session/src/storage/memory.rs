//! In-memory key-value store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use pytecode_core::traits::{KeyValueStore, StorageError};

/// In-memory storage implementation.
///
/// Useful for tests and throwaway sessions.
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with values.
    #[must_use]
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: RwLock::new(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .values
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v1").await.unwrap();
        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        store.remove("k").await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
