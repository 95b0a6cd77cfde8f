//! Saga persistence configuration.

use std::time::Duration;

use serde::Deserialize;

/// Saga configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SagaConfig {
    /// Acquire a lease on saga documents while a message is handled.
    /// When false, optimistic concurrency (ETags) is used alone. Default: false.
    pub pessimistic_locking: bool,
    /// How long an acquired lease is valid. Default: 60s.
    pub lease_lock_time_ms: u64,
    /// How long to keep trying to acquire a lease. Default: 60s.
    pub lease_lock_acquisition_timeout_ms: u64,
    /// Upper bound for the delay between acquisition attempts. Default: 1s.
    pub lease_lock_acquisition_max_refresh_delay_ms: u64,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            pessimistic_locking: false,
            lease_lock_time_ms: 60_000,
            lease_lock_acquisition_timeout_ms: 60_000,
            lease_lock_acquisition_max_refresh_delay_ms: 1_000,
        }
    }
}

impl SagaConfig {
    pub fn lease_lock_time(&self) -> Duration {
        Duration::from_millis(self.lease_lock_time_ms)
    }

    pub fn lease_lock_acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_lock_acquisition_timeout_ms)
    }

    pub fn lease_lock_acquisition_max_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.lease_lock_acquisition_max_refresh_delay_ms)
    }
}
