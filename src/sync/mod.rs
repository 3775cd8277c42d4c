//! Background synchronization between local storage and the remote API.
//!
//! ```text
//!  sync_now() ──▶ admit ──▶ timeout(perform_sync) ──▶ record outcome ──▶ notify
//!                  │                 │
//!                  │          download ─▶ merge ─▶ recollect ─▶ upload
//!                  │
//!                  └─▶ Busy | Offline | CircuitOpen   (no network, no state change)
//! ```
//!
//! [`SyncEngine`] owns the state in a `tokio::sync::watch` channel; widgets can
//! either watch it or register a listener for [`SyncEvent`]s.

mod circuit;
mod config;
mod engine;
mod listeners;
mod state;

pub use circuit::{CircuitCheck, CircuitPolicy};
pub use config::{
    SyncConfig, DEFAULT_INTERVAL, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT, DEFAULT_TIMEOUT,
};
pub use engine::{CycleError, SyncEngine};
pub use listeners::{ListenerRegistry, Subscription};
pub use state::{StatusIndicator, SyncEvent, SyncOutcome, SyncState};
