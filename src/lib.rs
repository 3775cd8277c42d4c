//! Labsync
//!
//! Local-first sync core for a laboratory management application. Records
//! live in a [`LocalStore`]; a [`SyncEngine`] reconciles them with the remote
//! API in the background and degrades to local-only operation when the
//! remote keeps failing.

pub mod config;
pub mod migration;
pub mod remote;
pub mod server;
pub mod snapshot;
pub mod store;
pub mod sync;

pub use config::{Config, ConfigError, ConfigSource, ConfigValue};
pub use migration::{MigrationCoordinator, MigrationError, TransferSummary, MIGRATION_FLAG_KEY};
pub use remote::{Entity, HealthStatus, RemoteClient, RemoteError, SyncEnvelope, SyncRemote};
pub use snapshot::{record_id, Collection, MergePolicy, Snapshot};
pub use store::{FileStore, LocalStore, MemoryStore, StoreError};
pub use sync::{
    StatusIndicator, Subscription, SyncConfig, SyncEngine, SyncEvent, SyncOutcome, SyncState,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
