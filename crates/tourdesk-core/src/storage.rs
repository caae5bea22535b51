//! Small persistent key/value store for UI preferences.
//!
//! Each key is one pretty-printed JSON file under the storage directory.
//! `Stored<T>` keeps the current value in memory and writes through on
//! every change; read and write failures are logged and the in-memory value
//! keeps working.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Failed to access storage file for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse stored value for '{key}': {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct JsonStorage {
    dir: PathBuf,
}

impl JsonStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let path = self.path(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        let value = serde_json::from_str(&contents).map_err(|source| StorageError::Parse {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let path = self.path(key)?;
        let contents =
            serde_json::to_string_pretty(value).map_err(|source| StorageError::Serialize {
                key: key.to_string(),
                source,
            })?;
        std::fs::write(&path, contents).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        debug!(key = key, "Stored value saved");
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path(key)?;
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// One persisted value with an in-memory copy.
pub struct Stored<T> {
    storage: JsonStorage,
    key: String,
    initial: T,
    value: T,
}

impl<T> Stored<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    /// Read `key`, falling back to `initial` if it is missing or unreadable.
    pub fn load(storage: JsonStorage, key: impl Into<String>, initial: T) -> Self {
        let key = key.into();
        let value = match storage.load(&key) {
            Ok(Some(value)) => value,
            Ok(None) => initial.clone(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to load stored value, using initial");
                initial.clone()
            }
        };
        Self {
            storage,
            key,
            initial,
            value,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        if let Err(e) = self.storage.save(&self.key, &self.value) {
            warn!(key = %self.key, error = %e, "Failed to persist stored value");
        }
    }

    pub fn update(&mut self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value);
        self.set(next);
    }

    /// Delete the file and go back to the initial value.
    pub fn remove(&mut self) {
        if let Err(e) = self.storage.remove(&self.key) {
            warn!(key = %self.key, error = %e, "Failed to remove stored value");
        }
        self.value = self.initial.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_missing_key_uses_initial() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).unwrap();
        let stored = Stored::load(storage, "theme", "light".to_string());
        assert_eq!(stored.get(), "light");
    }

    #[test]
    fn test_set_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).unwrap();

        let mut favourites = Stored::load(storage.clone(), "favourite-tours", BTreeSet::new());
        favourites.update(|set| {
            let mut set = set.clone();
            set.insert(3u32);
            set
        });

        let reloaded = Stored::load(storage, "favourite-tours", BTreeSet::new());
        assert_eq!(reloaded.get(), &BTreeSet::from([3u32]));
    }

    #[test]
    fn test_remove_resets_to_initial() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).unwrap();
        let mut page_size = Stored::load(storage.clone(), "page_size", 10u32);
        page_size.set(50);
        page_size.remove();

        assert_eq!(*page_size.get(), 10);
        assert!(storage.load::<u32>("page_size").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("columns.json"), "{not json").unwrap();
        let storage = JsonStorage::new(dir.path()).unwrap();

        assert!(matches!(
            storage.load::<Vec<String>>("columns"),
            Err(StorageError::Parse { .. })
        ));
        let stored = Stored::load(storage, "columns", vec!["title".to_string()]);
        assert_eq!(stored.get(), &vec!["title".to_string()]);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).unwrap();
        assert!(matches!(
            storage.save("../escape", &1),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
