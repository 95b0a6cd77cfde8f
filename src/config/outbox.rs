//! Outbox configuration.

use std::time::Duration;

use serde::Deserialize;

use super::OUTBOX_ENABLED_ENV_VAR;

/// Default retention for dispatched outbox records: 7 days.
pub const DEFAULT_DEDUPLICATION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Outbox configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Enable outbox deduplication. Default: false.
    /// Can be overridden via BATCHSTORE_OUTBOX_ENABLED env var.
    pub enabled: bool,
    /// Retry outbox reads under the legacy partition key (the raw message id)
    /// when the record is not found under the resolved key. Default: false.
    pub read_fallback_enabled: bool,
    /// How long dispatched records are kept for deduplication. Default: 7 days.
    pub time_to_keep_deduplication_data_secs: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            read_fallback_enabled: false,
            time_to_keep_deduplication_data_secs: DEFAULT_DEDUPLICATION_TTL_SECS,
        }
    }
}

impl OutboxConfig {
    /// Check if outbox is enabled (config or env var).
    pub fn is_enabled(&self) -> bool {
        self.enabled
            || std::env::var(OUTBOX_ENABLED_ENV_VAR)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
    }

    pub fn time_to_keep_deduplication_data(&self) -> Duration {
        Duration::from_secs(self.time_to_keep_deduplication_data_secs)
    }
}
