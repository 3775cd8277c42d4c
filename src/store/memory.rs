//! In-process local store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{LocalStore, StoreError};

/// Local store keeping serialized values in memory.
///
/// Values are stored as JSON text so that, like a browser's storage, a
/// corrupted entry reads back as absent.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw text for `key` without validating it.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        self.entries().insert(key.into(), raw.into());
    }

    /// Returns the raw text stored for `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    /// Returns every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        let raw = self.raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, "Ignoring unparsable stored value: {}", e);
                None
            }
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(value).map_err(|e| StoreError::Serialize(key.to_string(), e))?;
        self.entries().insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }
}
