//! Backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Delays between saga lease acquisition attempts.
///
/// - Min delay: 10ms
/// - Max delay: `max_delay`
/// - Unbounded attempts; the caller enforces the acquisition timeout
/// - Jitter enabled
pub fn lease_acquisition_backoff(max_delay: Duration) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10).min(max_delay))
        .with_max_delay(max_delay)
        .with_max_times(usize::MAX)
        .with_jitter()
}
