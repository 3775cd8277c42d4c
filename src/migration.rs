//! One-time migration of pre-sync local data, plus the upload and download
//! primitives the sync engine composes.
//!
//! A device that used the application before sync existed holds data that
//! the remote has never seen. [`MigrationCoordinator::full_sync`] pushes it
//! once, records that fact under [`MIGRATION_FLAG_KEY`], then pulls the remote
//! state back down.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::remote::{RemoteError, SyncRemote};
use crate::snapshot::{Collection, MergePolicy, Snapshot, SETTINGS_FIELD, SETTINGS_KEY};
use crate::store::{LocalStore, StoreError};

/// Storage key of the "initial upload completed" flag.
pub const MIGRATION_FLAG_KEY: &str = "labsync-migrated";

/// Errors from upload and download.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Transport failure talking to the remote.
    #[error("remote request failed: {0}")]
    Remote(#[from] RemoteError),

    /// Remote answered with `success: false`.
    #[error("remote rejected the request: {0}")]
    Rejected(String),

    /// Remote answered successfully but without a `data` field.
    #[error("remote response carried no data")]
    MissingData,

    /// Writing merged data to local storage failed.
    #[error("local storage error: {0}")]
    Store(#[from] StoreError),
}

/// What an upload or download moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSummary {
    /// Record count per transferred collection.
    pub counts: BTreeMap<Collection, usize>,
    /// Whether a settings object was transferred.
    pub settings: bool,
    /// True when nothing was sent because there was nothing to send.
    pub skipped: bool,
}

impl TransferSummary {
    fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            counts: snapshot.counts(),
            settings: snapshot.settings().is_some(),
            skipped: false,
        }
    }

    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Total records transferred.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Reconciles local data with the remote.
pub struct MigrationCoordinator<S, R> {
    store: Arc<S>,
    remote: Arc<R>,
    policy: MergePolicy,
}

impl<S: LocalStore, R: SyncRemote> MigrationCoordinator<S, R> {
    /// Creates a coordinator using [`MergePolicy::Replace`].
    pub fn new(store: Arc<S>, remote: Arc<R>) -> Self {
        Self {
            store,
            remote,
            policy: MergePolicy::default(),
        }
    }

    /// Sets how downloaded collections are merged into local storage.
    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.policy
    }

    /// Whether this device has completed its initial upload.
    pub fn has_migrated(&self) -> bool {
        matches!(self.store.get(MIGRATION_FLAG_KEY), Some(Value::Bool(true)))
    }

    /// Records that the initial upload happened. Idempotent.
    pub fn mark_migrated(&self) -> Result<(), StoreError> {
        self.store.set(MIGRATION_FLAG_KEY, &Value::Bool(true))
    }

    /// Clears the migration flag so the next [`full_sync`](Self::full_sync) uploads again.
    pub fn reset_migration(&self) -> Result<(), StoreError> {
        self.store.remove(MIGRATION_FLAG_KEY)
    }

    /// Assembles a snapshot from local storage.
    ///
    /// Every collection is present in the result; missing or malformed
    /// entries yield empty collections.
    pub fn collect_local_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();

        for collection in Collection::ALL {
            let records = match self.read_state_field(collection.storage_key(), collection.state_field())
            {
                Some(Value::Array(records)) => records,
                _ => Vec::new(),
            };
            snapshot.insert(collection, records);
        }

        if let Some(settings @ Value::Object(_)) = self.read_state_field(SETTINGS_KEY, SETTINGS_FIELD)
        {
            snapshot.set_settings(settings);
        }

        snapshot
    }

    fn read_state_field(&self, key: &str, field: &str) -> Option<Value> {
        let mut entry = self.store.get(key)?;
        entry.get_mut("state")?.get_mut(field).map(Value::take)
    }

    /// Pushes the local snapshot to the remote.
    ///
    /// An empty snapshot is not sent; the device still counts as migrated.
    pub async fn upload_to_remote(&self) -> Result<TransferSummary, MigrationError> {
        let snapshot = self.collect_local_snapshot();

        if snapshot.is_empty() {
            tracing::debug!("No local records to upload");
            self.mark_migrated()?;
            return Ok(TransferSummary::skipped());
        }

        let response = self.remote.sync_all_data(&snapshot).await?;
        if !response.success {
            return Err(MigrationError::Rejected(
                response.error.unwrap_or_else(|| "Upload failed".to_string()),
            ));
        }

        self.mark_migrated()?;
        tracing::info!(records = snapshot.record_count(), "Uploaded local data");

        Ok(TransferSummary::from_snapshot(&snapshot))
    }

    /// Pulls the remote snapshot and merges it into local storage.
    ///
    /// Local storage is untouched unless the response is successful and has data.
    pub async fn download_from_remote(&self) -> Result<TransferSummary, MigrationError> {
        let response = self.remote.get_all_data().await?;

        if !response.success {
            return Err(MigrationError::Rejected(
                response.error.unwrap_or_else(|| "Download failed".to_string()),
            ));
        }

        let data = response.data.ok_or(MigrationError::MissingData)?;
        self.merge_into_store(&data)?;

        tracing::debug!(records = data.record_count(), "Merged remote data");

        Ok(TransferSummary::from_snapshot(&data))
    }

    /// Writes every collection present in `remote` into its storage entry.
    ///
    /// Sibling fields of the entry's `state` object and unrelated storage keys
    /// are preserved.
    pub fn merge_into_store(&self, remote: &Snapshot) -> Result<(), StoreError> {
        for (collection, records) in remote.collections() {
            let key = collection.storage_key();
            let field = collection.state_field();

            let mut entry = self.load_entry(key);
            let mut state = take_state(&mut entry);

            let merged = match self.policy {
                MergePolicy::Replace => records.to_vec(),
                MergePolicy::LastWriterWins => {
                    let local: &[Value] = match state.get(field) {
                        Some(Value::Array(local)) => local.as_slice(),
                        _ => &[],
                    };
                    self.policy.merge(collection, local, records)
                }
            };

            state.insert(field.to_string(), Value::Array(merged));
            entry.insert("state".to_string(), Value::Object(state));
            self.store.set(key, &Value::Object(entry))?;
        }

        if let Some(settings) = remote.settings() {
            let mut entry = self.load_entry(SETTINGS_KEY);
            let mut state = take_state(&mut entry);
            state.insert(SETTINGS_FIELD.to_string(), settings.clone());
            entry.insert("state".to_string(), Value::Object(state));
            self.store.set(SETTINGS_KEY, &Value::Object(entry))?;
        }

        Ok(())
    }

    fn load_entry(&self, key: &str) -> Map<String, Value> {
        match self.store.get(key) {
            Some(Value::Object(entry)) => entry,
            _ => Map::new(),
        }
    }

    /// Uploads once if this device never migrated, then downloads.
    ///
    /// A failed initial upload is logged and does not abort the download;
    /// the device is marked migrated either way.
    pub async fn full_sync(&self) -> Result<TransferSummary, MigrationError> {
        if !self.has_migrated() {
            match self.upload_to_remote().await {
                Ok(summary) => {
                    tracing::info!(records = summary.total(), "Initial upload completed");
                }
                Err(e) => {
                    tracing::warn!("Initial upload failed: {}", e);
                    if let Err(e) = self.mark_migrated() {
                        tracing::warn!("Failed to record migration: {}", e);
                    }
                }
            }
        }

        self.download_from_remote().await
    }
}

/// Removes the entry's `state` object, yielding an empty one if missing or malformed.
fn take_state(entry: &mut Map<String, Value>) -> Map<String, Value> {
    match entry.remove("state") {
        Some(Value::Object(state)) => state,
        _ => Map::new(),
    }
}
