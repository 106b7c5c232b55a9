//! Local key-value persistence
//!
//! A single JSON object file acts as the storage scope. Values are read once
//! at startup and rewritten atomically (temp file + rename) on every change.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Storage key holding the persisted URL entries
pub const ENTRIES_KEY: &str = "setube.urls";

/// File name of the storage scope inside the data directory
pub const STORAGE_FILE: &str = "storage.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to access storage file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Storage file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// Persisted projection of a URL entry (never includes metadata)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub id: Uuid,
    pub url: String,
}

/// File-backed key-value scope
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store located in `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STORAGE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value; `Ok(None)` when the file or the key is absent
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let mut scope = self.read_scope()?;
        match scope.remove(key) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    path: self.path.clone(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Write a value, keeping other keys in the scope intact
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        // A corrupt scope is replaced rather than blocking every later write
        let mut scope = self.read_scope().unwrap_or_default();
        let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        scope.insert(key.to_string(), value);

        let content = serde_json::to_vec_pretty(&scope).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.write_atomic(&content)
    }

    /// Load the persisted URL entries
    pub fn load_entries(&self) -> Result<Option<Vec<StoredEntry>>, StoreError> {
        self.get(ENTRIES_KEY)
    }

    /// Persist the URL entries
    pub fn save_entries(&self, entries: &[StoredEntry]) -> Result<(), StoreError> {
        self.set(ENTRIES_KEY, &entries)
    }

    fn read_scope(&self) -> Result<serde_json::Map<String, serde_json::Value>, StoreError> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(serde_json::Map::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_atomic(&self, content: &[u8]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).map_err(io_err)?;
        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;

        tracing::trace!("Wrote storage scope to {:?}", self.path);
        Ok(())
    }
}
