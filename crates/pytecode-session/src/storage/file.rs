//! JSON file key-value store.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use pytecode_core::traits::{KeyValueStore, StorageError};
use tokio::sync::Mutex;

/// Name of the settings file inside the data directory.
const FILE_NAME: &str = "settings.json";

/// Stores all keys in one JSON object on disk.
///
/// The file is re-read on every access so edits made by another
/// instance are picked up; writes go through a temp file and rename.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store under the platform data directory, e.g.
    /// `~/.local/share/pytecode/settings.json`.
    ///
    /// # Errors
    /// Returns error if the platform has no data directory.
    pub fn in_data_dir() -> Result<Self, StorageError> {
        let dir = dirs::data_dir()
            .ok_or_else(|| StorageError::Internal("no data directory on this platform".into()))?;
        Ok(Self::new(dir.join("pytecode").join(FILE_NAME)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        if values.remove(key).is_some() {
            self.save(&values).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);

        let store = JsonFileStore::new(&path);
        assert_eq!(store.get("pytecode-libraries").await.unwrap(), None);
        store.set("pytecode-libraries", r#"["numpy"]"#).await.unwrap();
        store.set("theme", "dark").await.unwrap();

        let reopened = JsonFileStore::new(&path);
        assert_eq!(
            reopened.get("pytecode-libraries").await.unwrap().as_deref(),
            Some(r#"["numpy"]"#)
        );

        reopened.remove("theme").await.unwrap();
        assert_eq!(store.get("theme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get("theme").await,
            Err(StorageError::Serialization(_))
        ));
    }
}
