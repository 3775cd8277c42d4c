//! Configuration for the sync engine.

use std::time::Duration;

use super::circuit::CircuitPolicy;

/// Default delay between automatic sync cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
/// Default budget for one whole cycle.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default consecutive failures that open the circuit.
pub const DEFAULT_MAX_FAILURES: u32 = 3;
/// Default cooldown before a half-open probe.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Timing and backpressure settings for [`SyncEngine`](super::SyncEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Interval between automatic cycles.
    pub interval: Duration,
    /// Per-cycle timeout covering download and upload together.
    pub timeout: Duration,
    /// Consecutive failures before the circuit opens.
    pub max_failures: u32,
    /// How long the circuit stays open.
    pub reset_timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }

    /// Sets the automatic sync interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the per-cycle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the failure threshold.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Sets the circuit cooldown.
    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout = reset_timeout;
        self
    }

    /// Circuit breaker policy derived from this configuration.
    pub fn circuit_policy(&self) -> CircuitPolicy {
        CircuitPolicy::new(self.max_failures, self.reset_timeout)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_failures, 3);
        assert_eq!(config.reset_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::new()
            .with_interval(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(2))
            .with_max_failures(1)
            .with_reset_timeout(Duration::from_secs(60));

        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.circuit_policy().max_failures(), 1);
        assert_eq!(config.circuit_policy().reset_timeout(), Duration::from_secs(60));
    }
}
