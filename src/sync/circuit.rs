//! Circuit breaker over [`SyncState`].
//!
//! ```text
//!   Closed ──(failure_count reaches max)──▶ Open
//!     ▲                                      │
//!     │ success                    reset time elapses
//!     │                                      ▼
//!     └──────────────────────────────── HalfOpen
//! ```
//!
//! The circuit is open exactly while `failure_count >= max_failures` and the
//! cooldown has not elapsed. The half-open probe starts from a zero failure
//! count: a successful probe keeps the circuit closed, and a failed one
//! counts as the first failure of a new window. The probe reopens the
//! circuit on its own only when `max_failures` is 1.

use std::time::Duration;

use tokio::time::Instant;

use super::state::SyncState;

/// Result of checking the breaker before a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitCheck {
    Closed,
    Open { retry_at: Instant },
    /// Cooldown elapsed; one probe may run.
    HalfOpen,
}

/// Failure threshold and cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitPolicy {
    max_failures: u32,
    reset_timeout: Duration,
}

impl CircuitPolicy {
    /// A threshold of zero is treated as one.
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            reset_timeout,
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    pub fn check(&self, state: &SyncState, now: Instant) -> CircuitCheck {
        if !state.circuit_open {
            return CircuitCheck::Closed;
        }
        match state.circuit_reset_at {
            Some(retry_at) if now < retry_at => CircuitCheck::Open { retry_at },
            _ => CircuitCheck::HalfOpen,
        }
    }

    /// Moves an open circuit to half-open.
    pub fn half_open(&self, state: &mut SyncState) {
        state.circuit_open = false;
        state.circuit_reset_at = None;
        state.failure_count = 0;
    }

    pub fn record_success(&self, state: &mut SyncState) {
        state.failure_count = 0;
    }

    /// Counts a failure. Returns true if this failure opened the circuit.
    pub fn record_failure(&self, state: &mut SyncState, now: Instant) -> bool {
        state.failure_count = state.failure_count.saturating_add(1);
        if state.failure_count >= self.max_failures && !state.circuit_open {
            state.circuit_open = true;
            state.circuit_reset_at = Some(now + self.reset_timeout);
            return true;
        }
        false
    }

    /// Force-closes the circuit and clears the failure count.
    pub fn reset(&self, state: &mut SyncState) {
        state.failure_count = 0;
        state.circuit_open = false;
        state.circuit_reset_at = None;
    }
}
