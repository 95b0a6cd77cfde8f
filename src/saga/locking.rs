//! Pessimistic lease on saga documents.
//!
//! A lease is taken by a conditional write of `_reserved_until` against the
//! ETag just read. A lease whose expiry has passed is free to take.

use backon::BackoffBuilder;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::RESERVED_UNTIL_FIELD;
use crate::config::SagaConfig;
use crate::error::{PersistenceError, Result};
use crate::interfaces::{status, Container, ItemResponse};
use crate::partition::PartitionKey;
use crate::utils::retry::lease_acquisition_backoff;

fn reserved_until(document: &Value) -> Option<DateTime<Utc>> {
    document
        .get(RESERVED_UNTIL_FIELD)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Whether the document is free to lease at `now`.
pub(crate) fn is_unlocked(document: &Value, now: DateTime<Utc>) -> bool {
    reserved_until(document).map_or(true, |until| until <= now)
}

/// Acquire the lease on a saga document.
///
/// Returns the leased document with its new ETag, or `None` when the
/// document does not exist. Gives up with `LockAcquisition` once the
/// acquisition timeout passes.
pub(crate) async fn acquire_lease(
    container: &dyn Container,
    saga_id: &str,
    partition_key: &PartitionKey,
    config: &SagaConfig,
    cancel: &CancellationToken,
) -> Result<Option<ItemResponse>> {
    let deadline = Instant::now() + config.lease_lock_acquisition_timeout();
    let lease = chrono::Duration::from_std(config.lease_lock_time()).map_err(|_| {
        PersistenceError::Configuration("`lease_lock_time_ms` is out of range".to_string())
    })?;
    let mut delays = lease_acquisition_backoff(config.lease_lock_acquisition_max_refresh_delay()).build();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let Some(item) = container.read_item(saga_id, partition_key, cancel).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        if is_unlocked(&item.document, now) {
            let mut document = item.document;
            if let Some(object) = document.as_object_mut() {
                object.insert(
                    RESERVED_UNTIL_FIELD.to_string(),
                    Value::String((now + lease).to_rfc3339()),
                );
            }
            let result = container
                .upsert_item(document.clone(), partition_key, Some(&item.etag), cancel)
                .await?;

            if result.is_success() {
                debug!(saga_id, attempt, "Saga lease acquired");
                return Ok(Some(ItemResponse {
                    document,
                    etag: result.etag.unwrap_or(item.etag),
                }));
            }
            match result.status {
                status::PRECONDITION_FAILED => {}
                status::NOT_FOUND => return Ok(None),
                _ => {
                    return Err(PersistenceError::Conflict {
                        description: format!("Unable to lease saga '{}'", saga_id),
                        result,
                    })
                }
            }
        }

        if Instant::now() >= deadline {
            return Err(PersistenceError::LockAcquisition {
                saga_id: saga_id.to_string(),
                timeout_ms: config.lease_lock_acquisition_timeout_ms,
            });
        }

        let delay = delays
            .next()
            .unwrap_or_else(|| config.lease_lock_acquisition_max_refresh_delay());
        trace!(saga_id, attempt, ?delay, "Saga lease held elsewhere; retrying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(PersistenceError::Cancelled),
            _ = tokio::time::sleep_until((Instant::now() + delay).min(deadline)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_or_null_reservation_is_unlocked() {
        let now = Utc::now();
        assert!(is_unlocked(&json!({}), now));
        assert!(is_unlocked(&json!({ RESERVED_UNTIL_FIELD: null }), now));
    }

    #[test]
    fn test_expired_reservation_is_unlocked() {
        let now = Utc::now();
        let past = (now - chrono::Duration::seconds(5)).to_rfc3339();
        let future = (now + chrono::Duration::seconds(5)).to_rfc3339();
        assert!(is_unlocked(&json!({ RESERVED_UNTIL_FIELD: past }), now));
        assert!(!is_unlocked(&json!({ RESERVED_UNTIL_FIELD: future }), now));
    }
}
