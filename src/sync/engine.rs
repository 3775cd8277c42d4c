//! The sync engine: guarded cycles, periodic scheduling and online tracking.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::circuit::{CircuitCheck, CircuitPolicy};
use super::config::SyncConfig;
use super::listeners::{ListenerRegistry, Subscription};
use super::state::{SyncEvent, SyncOutcome, SyncState};
use crate::migration::{MigrationCoordinator, MigrationError};
use crate::remote::SyncRemote;
use crate::store::LocalStore;

/// Shortest interval the periodic task will use.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Why a cycle failed.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("sync timed out after {0:?}")]
    Timeout(Duration),

    #[error("download failed: {0}")]
    Download(#[source] MigrationError),
}

/// Clears `is_syncing` if a cycle is dropped before it finishes.
struct CycleGuard<'a> {
    state: &'a watch::Sender<SyncState>,
    armed: bool,
}

impl CycleGuard<'_> {
    fn finish(mut self, update: impl FnOnce(&mut SyncState)) {
        self.armed = false;
        self.state.send_modify(|state| {
            state.is_syncing = false;
            update(state);
        });
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_modify(|state| state.is_syncing = false);
        }
    }
}

/// Handle to the periodic task.
struct AutoSyncTask {
    handle: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

/// Coordinates sync cycles between local storage and the remote.
///
/// Construct one per application and share it as `Arc<SyncEngine<_, _>>`.
/// Every entry point reports through [`SyncOutcome`]; nothing here returns
/// an error or panics to the caller.
pub struct SyncEngine<S, R> {
    coordinator: MigrationCoordinator<S, R>,
    config: SyncConfig,
    policy: CircuitPolicy,
    state: watch::Sender<SyncState>,
    listeners: ListenerRegistry,
    auto_sync: Mutex<Option<AutoSyncTask>>,
}

impl<S: LocalStore, R: SyncRemote> SyncEngine<S, R> {
    pub fn new(coordinator: MigrationCoordinator<S, R>, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            policy: config.circuit_policy(),
            coordinator,
            config,
            state,
            listeners: ListenerRegistry::new(),
            auto_sync: Mutex::new(None),
        }
    }

    pub fn coordinator(&self) -> &MigrationCoordinator<S, R> {
        &self.coordinator
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Registers an event listener. See [`ListenerRegistry::add_listener`].
    pub fn add_listener<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        self.listeners.add_listener(callback)
    }

    /// Whether the periodic task is running.
    pub fn is_auto_syncing(&self) -> bool {
        self.state.borrow().auto_sync_enabled
    }

    /// Stops the periodic task.
    ///
    /// No further cycles are scheduled. A cycle the task is already running
    /// finishes and reports its outcome as usual.
    pub fn stop_auto_sync(&self) {
        if let Some(task) = lock(&self.auto_sync).take() {
            task.stop.send_replace(true);
            tracing::debug!("Auto-sync stopped");
        }
        self.state.send_if_modified(|state| {
            let changed = state.auto_sync_enabled;
            state.auto_sync_enabled = false;
            changed
        });
    }

    /// Claims the cycle slot, or explains why a cycle cannot run.
    ///
    /// The busy, offline and circuit checks and the claim happen in one state
    /// update.
    fn admit(&self) -> Result<(), SyncOutcome> {
        let now = Instant::now();
        let mut rejected = None;

        self.state.send_if_modified(|state| {
            if state.is_syncing {
                rejected = Some(SyncOutcome::Busy);
                return false;
            }
            if !state.is_online {
                rejected = Some(SyncOutcome::Offline);
                return false;
            }
            match self.policy.check(state, now) {
                CircuitCheck::Open { retry_at } => {
                    rejected = Some(SyncOutcome::CircuitOpen { retry_at });
                    return false;
                }
                CircuitCheck::HalfOpen => {
                    tracing::info!("Circuit cooldown elapsed, probing remote");
                    self.policy.half_open(state);
                }
                CircuitCheck::Closed => {}
            }
            state.is_syncing = true;
            true
        });

        match rejected {
            Some(outcome) => Err(outcome),
            None => Ok(()),
        }
    }

    /// Runs one sync cycle unless busy, offline or backing off.
    pub async fn sync_now(&self) -> SyncOutcome {
        if let Err(outcome) = self.admit() {
            tracing::debug!(outcome = %outcome.message(), "Sync skipped");
            return outcome;
        }

        let guard = CycleGuard {
            state: &self.state,
            armed: true,
        };
        self.listeners.notify(&SyncEvent::Syncing);

        let result = match tokio::time::timeout(self.config.timeout, self.perform_sync()).await {
            Ok(result) => result,
            Err(_) => Err(CycleError::Timeout(self.config.timeout)),
        };

        match result {
            Ok(uploaded) => {
                let last_sync_time = Utc::now();
                guard.finish(|state| {
                    self.policy.record_success(state);
                    state.last_sync_time = Some(last_sync_time);
                });
                tracing::info!(uploaded, "Sync completed");
                self.listeners.notify(&SyncEvent::Success { last_sync_time });
                SyncOutcome::Completed {
                    last_sync_time,
                    uploaded,
                }
            }
            Err(e) => {
                let error = e.to_string();
                let now = Instant::now();
                let mut opened = false;
                let mut failures = 0;
                guard.finish(|state| {
                    opened = self.policy.record_failure(state, now);
                    failures = state.failure_count;
                });
                if opened {
                    tracing::warn!(
                        failures,
                        retry_in = ?self.policy.reset_timeout(),
                        "Sync failed, circuit opened: {}",
                        error
                    );
                } else {
                    tracing::warn!(failures, "Sync failed: {}", error);
                }
                self.listeners.notify(&SyncEvent::Error {
                    error: error.clone(),
                });
                SyncOutcome::Failed { error }
            }
        }
    }

    /// Cycle body: download, then upload the refreshed local snapshot.
    ///
    /// Returns whether an upload was accepted. Upload problems are logged and
    /// do not fail the cycle.
    async fn perform_sync(&self) -> Result<bool, CycleError> {
        tracing::debug!("Downloading remote snapshot");
        self.coordinator
            .download_from_remote()
            .await
            .map_err(CycleError::Download)?;

        let snapshot = self.coordinator.collect_local_snapshot();
        if snapshot.is_empty() {
            tracing::debug!("Local snapshot empty, skipping upload");
            return Ok(false);
        }

        tracing::debug!(records = snapshot.record_count(), "Uploading local snapshot");
        match self.coordinator.remote().sync_all_data(&snapshot).await {
            Ok(response) if response.success => Ok(true),
            Ok(response) => {
                tracing::warn!(
                    "Upload rejected: {}",
                    response.error.as_deref().unwrap_or("no reason given")
                );
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("Upload failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Records connectivity.
    ///
    /// Coming back online clears failures, closes the circuit and runs a
    /// cycle whose outcome is returned. Going offline only flips the flag.
    /// Repeating the current value does nothing.
    pub async fn set_online(&self, online: bool) -> Option<SyncOutcome> {
        let changed = self.state.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            state.is_online = online;
            if online {
                self.policy.reset(state);
            }
            true
        });
        if !changed {
            return None;
        }

        if online {
            tracing::info!("Connection restored");
            self.listeners.notify(&SyncEvent::Online);
            Some(self.sync_now().await)
        } else {
            tracing::info!("Connection lost, working locally");
            self.listeners.notify(&SyncEvent::Offline);
            None
        }
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore + 'static,
    R: SyncRemote + 'static,
{
    /// Starts the periodic task: one cycle now, then one per interval.
    ///
    /// Does nothing if the task is already running. Must be called within a
    /// tokio runtime. The task holds only a weak reference to the engine.
    pub fn start_auto_sync(self: &Arc<Self>) {
        let mut slot = lock(&self.auto_sync);
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            tracing::debug!("Auto-sync already running");
            return;
        }

        let period = self.config.interval.max(MIN_INTERVAL);
        let engine = Arc::downgrade(self);
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // A stop request or a dropped sender ends the loop between cycles.
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => {}
                }
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                engine.sync_now().await;
            }
        });
        *slot = Some(AutoSyncTask { handle, stop });
        drop(slot);

        self.state.send_modify(|state| state.auto_sync_enabled = true);
        tracing::info!(interval = ?period, "Auto-sync started");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
