//! Observable sync state, events and cycle outcomes.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Snapshot of the engine's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub failure_count: u32,
    pub circuit_open: bool,
    /// Set while the circuit is open.
    pub circuit_reset_at: Option<Instant>,
    pub auto_sync_enabled: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            is_online: true,
            is_syncing: false,
            last_sync_time: None,
            failure_count: 0,
            circuit_open: false,
            circuit_reset_at: None,
            auto_sync_enabled: false,
        }
    }
}

impl SyncState {
    /// Status shown by the sync widget.
    pub fn indicator(&self) -> StatusIndicator {
        if !self.is_online {
            StatusIndicator::Offline
        } else if self.is_syncing {
            StatusIndicator::Syncing
        } else if self.circuit_open {
            StatusIndicator::LocalOnly
        } else if self.failure_count > 0 {
            StatusIndicator::Error
        } else {
            StatusIndicator::Synced
        }
    }
}

/// Widget status derived from [`SyncState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIndicator {
    Syncing,
    Synced,
    Error,
    Offline,
    /// Remote has failed repeatedly; the application works from local data.
    LocalOnly,
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusIndicator::Syncing => "syncing",
            StatusIndicator::Synced => "synced",
            StatusIndicator::Error => "error",
            StatusIndicator::Offline => "offline",
            StatusIndicator::LocalOnly => "local-only",
        };
        f.write_str(label)
    }
}

/// Event delivered to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Syncing,
    Success { last_sync_time: DateTime<Utc> },
    Error { error: String },
    Online,
    Offline,
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::Syncing => write!(f, "syncing"),
            SyncEvent::Success { last_sync_time } => {
                write!(f, "synced at {}", last_sync_time.to_rfc3339())
            }
            SyncEvent::Error { error } => write!(f, "error: {}", error),
            SyncEvent::Online => write!(f, "online"),
            SyncEvent::Offline => write!(f, "offline"),
        }
    }
}

/// Result of one [`sync_now`](super::SyncEngine::sync_now) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Cycle finished. `uploaded` is false when the upload was skipped or failed.
    Completed {
        last_sync_time: DateTime<Utc>,
        uploaded: bool,
    },
    /// Another cycle was in flight.
    Busy,
    /// Engine is offline.
    Offline,
    /// Circuit is open until `retry_at`.
    CircuitOpen { retry_at: Instant },
    /// Cycle failed or timed out.
    Failed { error: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Completed { .. })
    }

    /// Human-readable message for this outcome.
    pub fn message(&self) -> String {
        match self {
            SyncOutcome::Completed { .. } => "Sync completed".to_string(),
            SyncOutcome::Busy => "Sync already in progress".to_string(),
            SyncOutcome::Offline => "Offline".to_string(),
            SyncOutcome::CircuitOpen { retry_at } => {
                let wait = retry_at.saturating_duration_since(Instant::now());
                format!("Sync paused after repeated failures, retrying in {}s", wait.as_secs())
            }
            SyncOutcome::Failed { error } => error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_online_and_idle() {
        let state = SyncState::default();
        assert!(state.is_online);
        assert!(!state.is_syncing);
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.indicator(), StatusIndicator::Synced);
    }

    #[test]
    fn test_indicator_precedence() {
        let mut state = SyncState {
            is_online: false,
            is_syncing: true,
            circuit_open: true,
            failure_count: 3,
            ..Default::default()
        };
        assert_eq!(state.indicator(), StatusIndicator::Offline);

        state.is_online = true;
        assert_eq!(state.indicator(), StatusIndicator::Syncing);

        state.is_syncing = false;
        assert_eq!(state.indicator(), StatusIndicator::LocalOnly);

        state.circuit_open = false;
        assert_eq!(state.indicator(), StatusIndicator::Error);
        assert_eq!(state.indicator().to_string(), "error");
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(SyncOutcome::Offline.message(), "Offline");
        assert!(!SyncOutcome::Busy.is_success());
        let failed = SyncOutcome::Failed {
            error: "network error: refused".into(),
        };
        assert_eq!(failed.message(), "network error: refused");
    }
}
