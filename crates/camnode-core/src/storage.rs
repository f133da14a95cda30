//! Preference storage abstraction.
//!
//! Records are raw JSON texts addressed by a short tag (one file per
//! component). The trait keeps the record handling platform-neutral:
//! the Linux harness uses [`FilePrefStore`], an embedded target would wrap
//! its flash key-value store the same way.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during preference storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No record is stored under the tag.
    #[error("no stored record for tag '{0}'")]
    NotFound(String),

    /// The record exists but could not be read.
    #[error("failed to read record '{0}': {1}")]
    Read(String, String),

    /// The record could not be written. The prior stored record, if any,
    /// is preserved.
    #[error("failed to write record '{0}': {1}")]
    Write(String, String),
}

/// Abstract tagged record storage.
pub trait PrefStore {
    /// Load the raw record text stored under `tag`.
    fn load(&self, tag: &str) -> Result<String, StorageError>;

    /// Persist the raw record text under `tag`.
    fn save(&self, tag: &str, payload: &str) -> Result<(), StorageError>;

    /// Whether a record is stored under `tag`.
    fn exists(&self, tag: &str) -> bool;

    /// Delete the record stored under `tag`. Deleting a missing record is
    /// not an error.
    fn remove(&self, tag: &str) -> Result<(), StorageError>;
}

/// File-backed preference storage.
///
/// Each tag maps to `<root>/<tag>.json`. When that file is absent, `load`
/// falls back to a factory record at `<root>/default_<tag>.json`, so a
/// device can ship with defaults that user settings later shadow.
#[derive(Debug, Clone)]
pub struct FilePrefStore {
    root: PathBuf,
}

impl FilePrefStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn record_path(&self, tag: &str) -> PathBuf {
        self.root.join(format!("{tag}.json"))
    }

    fn fallback_path(&self, tag: &str) -> PathBuf {
        self.root.join(format!("default_{tag}.json"))
    }

    fn read(path: &Path, tag: &str) -> Result<String, StorageError> {
        fs::read_to_string(path).map_err(|e| StorageError::Read(tag.to_string(), e.to_string()))
    }
}

impl PrefStore for FilePrefStore {
    fn load(&self, tag: &str) -> Result<String, StorageError> {
        let primary = self.record_path(tag);
        if primary.exists() {
            return Self::read(&primary, tag);
        }

        let fallback = self.fallback_path(tag);
        if fallback.exists() {
            debug!("record {:?} not found, loading factory default", primary);
            return Self::read(&fallback, tag);
        }

        Err(StorageError::NotFound(tag.to_string()))
    }

    fn save(&self, tag: &str, payload: &str) -> Result<(), StorageError> {
        let write_err = |e: std::io::Error| StorageError::Write(tag.to_string(), e.to_string());

        fs::create_dir_all(&self.root).map_err(write_err)?;

        // Write-then-rename keeps the prior record intact if the write fails.
        let tmp = self.root.join(format!(".{tag}.json.tmp"));
        fs::write(&tmp, payload).map_err(write_err)?;
        fs::rename(&tmp, self.record_path(tag)).map_err(write_err)?;
        Ok(())
    }

    fn exists(&self, tag: &str) -> bool {
        self.record_path(tag).exists()
    }

    fn remove(&self, tag: &str) -> Result<(), StorageError> {
        let path = self.record_path(tag);
        if !path.exists() {
            info!("no saved '{tag}' record to remove");
            return Ok(());
        }
        fs::remove_file(&path).map_err(|e| StorageError::Write(tag.to_string(), e.to_string()))
    }
}

/// In-memory storage for tests.
#[cfg(test)]
pub struct MemoryPrefStore {
    data: std::sync::RwLock<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryPrefStore {
    pub fn new() -> Self {
        Self {
            data: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

#[cfg(test)]
impl PrefStore for MemoryPrefStore {
    fn load(&self, tag: &str) -> Result<String, StorageError> {
        self.data
            .read()
            .unwrap()
            .get(tag)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(tag.to_string()))
    }

    fn save(&self, tag: &str, payload: &str) -> Result<(), StorageError> {
        self.data
            .write()
            .unwrap()
            .insert(tag.to_string(), payload.to_string());
        Ok(())
    }

    fn exists(&self, tag: &str) -> bool {
        self.data.read().unwrap().contains_key(tag)
    }

    fn remove(&self, tag: &str) -> Result<(), StorageError> {
        self.data.write().unwrap().remove(tag);
        Ok(())
    }
}
