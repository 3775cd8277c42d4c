mod config_cmd;
mod health;
mod migrate;
mod sync_cmd;
mod watch;

pub use config_cmd::ConfigCommand;
pub use health::HealthCommand;
pub use migrate::MigrateCommand;
pub use sync_cmd::SyncCommand;
pub use watch::WatchCommand;

use std::sync::Arc;

use labsync::{
    Collection, Config, FileStore, LocalStore, MigrationCoordinator, MigrationError, RemoteClient,
    RemoteError, StoreError, SyncEngine,
};

pub type Coordinator = MigrationCoordinator<FileStore, RemoteClient>;
pub type Engine = SyncEngine<FileStore, RemoteClient>;

/// Creates a client for the configured API, if any.
pub fn remote_client(config: &Config) -> Result<RemoteClient, CommandError> {
    let url = config.api_base_url().ok_or(CommandError::NotConfigured)?;
    Ok(RemoteClient::new(url))
}

pub fn build_coordinator(config: &Config) -> Result<Coordinator, CommandError> {
    let store = Arc::new(FileStore::new(&config.data_dir.value));
    let remote = Arc::new(remote_client(config)?);
    Ok(MigrationCoordinator::new(store, remote).with_merge_policy(config.sync.merge_policy))
}

pub fn build_engine(config: &Config) -> Result<Arc<Engine>, CommandError> {
    let coordinator = build_coordinator(config)?;
    Ok(Arc::new(SyncEngine::new(coordinator, config.sync_config())))
}

/// Prints the number of local records per collection.
pub fn print_local_counts<S: LocalStore, R: labsync::SyncRemote>(
    coordinator: &MigrationCoordinator<S, R>,
) {
    let snapshot = coordinator.collect_local_snapshot();
    for collection in Collection::ALL {
        println!(
            "  {:<18} {}",
            collection.wire_name(),
            snapshot.records(collection).len()
        );
    }
}

/// Errors from CLI commands
#[derive(Debug)]
pub enum CommandError {
    /// No API URL for the active build mode
    NotConfigured,
    Remote(RemoteError),
    Migration(MigrationError),
    Store(StoreError),
    SyncFailed(String),
    Io(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::NotConfigured => write!(
                f,
                "Remote API not configured. Set api.<mode> in the config file or LABSYNC_API_URL."
            ),
            CommandError::Remote(e) => write!(f, "{}", e),
            CommandError::Migration(e) => write!(f, "{}", e),
            CommandError::Store(e) => write!(f, "{}", e),
            CommandError::SyncFailed(e) => write!(f, "Sync failed: {}", e),
            CommandError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Remote(e) => Some(e),
            CommandError::Migration(e) => Some(e),
            CommandError::Store(e) => Some(e),
            CommandError::Io(e) => Some(e),
            CommandError::NotConfigured | CommandError::SyncFailed(_) => None,
        }
    }
}

impl From<RemoteError> for CommandError {
    fn from(e: RemoteError) -> Self {
        CommandError::Remote(e)
    }
}

impl From<MigrationError> for CommandError {
    fn from(e: MigrationError) -> Self {
        CommandError::Migration(e)
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        CommandError::Store(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::Io(e)
    }
}
