//! File-backed local store: one JSON file per key.
//!
//! ```text
//! <DATA_DIR>/
//!   lab-patients.json
//!   lab-results.json
//!   labsync-migrated.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{LocalStore, StoreError};

/// Local store persisting each key as `<data_dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `data_dir`. The directory is created on first write.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the file path for a key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", key))
    }

    /// Rejects keys that could escape the data directory.
    fn validate_key(key: &str) -> Result<(), StoreError> {
        if key.is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.starts_with('.')
        {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        if let Err(e) = Self::validate_key(key) {
            tracing::warn!("{}", e);
            return None;
        }

        let path = self.path(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring unparsable value in {}: {}", path.display(), e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        Self::validate_key(key)?;

        fs::create_dir_all(&self.data_dir)
            .map_err(|e| StoreError::Io(self.data_dir.clone(), e))?;

        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialize(key.to_string(), e))?;

        // Write-then-rename so a crash never leaves a half-written file behind
        let path = self.path(key);
        let tmp_path = self.data_dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp_path, bytes).map_err(|e| StoreError::Io(tmp_path.clone(), e))?;
        fs::rename(&tmp_path, &path).map_err(|e| StoreError::Io(path, e))?;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        Self::validate_key(key)?;

        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(path, e)),
        }
    }
}
