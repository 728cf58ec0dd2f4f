//! Persisted user preferences.

use pytecode_core::{
    LibrarySet, Theme,
    traits::{KeyValueStore, StorageError},
};

/// Key holding the JSON array of selected library identifiers.
pub const LIBRARIES_KEY: &str = "pytecode-libraries";
/// Key holding the theme name.
pub const THEME_KEY: &str = "theme";

/// Read the saved library selection.
///
/// A missing or malformed value yields an empty selection.
///
/// # Errors
/// Returns error if the store itself fails.
pub async fn load_library_selection<K>(store: &K) -> Result<LibrarySet, StorageError>
where
    K: KeyValueStore + ?Sized,
{
    let Some(raw) = store.get(LIBRARIES_KEY).await? else {
        return Ok(LibrarySet::new());
    };
    match serde_json::from_str::<LibrarySet>(&raw) {
        Ok(selection) => Ok(selection),
        Err(e) => {
            tracing::warn!("Ignoring malformed {LIBRARIES_KEY} value {raw:?}: {e}");
            Ok(LibrarySet::new())
        }
    }
}

/// Save the library selection as a JSON array.
///
/// # Errors
/// Returns error if encoding or the store fails.
pub async fn save_library_selection<K>(store: &K, selection: &LibrarySet) -> Result<(), StorageError>
where
    K: KeyValueStore + ?Sized,
{
    let json = serde_json::to_string(selection)?;
    store.set(LIBRARIES_KEY, &json).await
}

/// Read the saved theme, `System` when unset or unknown.
///
/// # Errors
/// Returns error if the store fails.
pub async fn load_theme<K>(store: &K) -> Result<Theme, StorageError>
where
    K: KeyValueStore + ?Sized,
{
    let theme = store
        .get(THEME_KEY)
        .await?
        .and_then(|raw| match raw.parse() {
            Ok(theme) => Some(theme),
            Err(e) => {
                tracing::warn!("{e}, falling back to system theme");
                None
            }
        })
        .unwrap_or_default();
    Ok(theme)
}

/// Save the theme.
///
/// # Errors
/// Returns error if the store fails.
pub async fn save_theme<K>(store: &K, theme: Theme) -> Result<(), StorageError>
where
    K: KeyValueStore + ?Sized,
{
    store.set(THEME_KEY, theme.as_str()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_library_roundtrip_through_store() {
        let store = MemoryStore::new();
        assert!(load_library_selection(&store).await.unwrap().is_empty());

        let selection: LibrarySet = ["pandas", "numpy"].into_iter().collect();
        save_library_selection(&store, &selection).await.unwrap();

        assert_eq!(
            store.get(LIBRARIES_KEY).await.unwrap().as_deref(),
            Some(r#"["numpy","pandas"]"#)
        );
        assert_eq!(load_library_selection(&store).await.unwrap(), selection);
    }

    #[tokio::test]
    async fn test_malformed_selection_is_empty() {
        let store = MemoryStore::with_values([(LIBRARIES_KEY, "numpy,pandas")]);
        assert!(load_library_selection(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_theme() {
        let store = MemoryStore::with_values([(THEME_KEY, "neon")]);
        assert_eq!(load_theme(&store).await.unwrap(), Theme::System);

        save_theme(&store, Theme::Dark).await.unwrap();
        assert_eq!(load_theme(&store).await.unwrap(), Theme::Dark);
    }
}
