//! Per-device key/value storage.
//!
//! The sync core reads and writes named JSON values through [`LocalStore`].
//! Values survive restarts when backed by [`FileStore`]; [`MemoryStore`] keeps
//! them for the lifetime of the process.
//!
//! There are no transactions: callers writing several keys must tolerate a
//! crash between two `set` calls.

mod file;
mod memory;

use std::io;
use std::path::PathBuf;

use serde_json::Value;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Durable per-device storage of JSON values keyed by string.
pub trait LocalStore: Send + Sync {
    /// Returns the stored value, or `None` if absent or unparsable.
    fn get(&self, key: &str) -> Option<Value>;

    /// Serializes and persists `value`, overwriting any previous value.
    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Removes the value for `key`. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Errors that can occur while writing to a local store.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error reading or writing a file.
    Io(PathBuf, io::Error),
    /// Value could not be serialized.
    Serialize(String, serde_json::Error),
    /// Key is empty or would escape the data directory.
    InvalidKey(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            StoreError::Serialize(key, e) => {
                write!(f, "Failed to serialize value for '{}': {}", key, e)
            }
            StoreError::InvalidKey(key) => write!(f, "Invalid storage key: {:?}", key),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(_, e) => Some(e),
            StoreError::Serialize(_, e) => Some(e),
            StoreError::InvalidKey(_) => None,
        }
    }
}
