//! Crate-level error type.
//!
//! Configuration errors name the API that fixes them. Conflicts carry the raw
//! backend result. Not-found is never an error: read paths return `Ok(None)`.

use crate::interfaces::{OperationResult, StoreError};

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors raised by the persistence core.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(
        "Unable to determine the container for this message. Either configure a default \
         container with `Config::default_container`, or provide one in the pipeline by \
         registering a container extractor (`ContainerInformationExtractor::extract_from_header` \
         or `extract_from_message`)."
    )]
    MissingContainer,

    #[error(
        "A partition key is required for message '{message_id}' but none was extracted. \
         Register a partition key extractor (`PartitionKeyExtractor::extract_from_header` or \
         `extract_from_message`) that covers this message."
    )]
    MissingPartitionKey { message_id: String },

    #[error("An extractor for {kind} '{key}' is already registered")]
    DuplicateExtractor { kind: &'static str, key: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "The '{entity_type}' saga with id '{saga_id}' was updated by another process or no \
         longer exists (status {})",
        .result.status
    )]
    SagaConcurrency {
        entity_type: String,
        saga_id: String,
        result: OperationResult,
    },

    #[error("{description} (status {})", .result.status)]
    Conflict {
        description: String,
        result: OperationResult,
    },

    #[error("Failed to acquire the lease on saga '{saga_id}' within {timeout_ms}ms")]
    LockAcquisition { saga_id: String, timeout_ms: u64 },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for PersistenceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => PersistenceError::Cancelled,
            other => PersistenceError::Store(other),
        }
    }
}

impl PersistenceError {
    /// Whether this error represents a cancelled store interaction.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PersistenceError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_cancellation_maps_to_cancelled() {
        let err: PersistenceError = StoreError::Cancelled.into();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_store_failure_stays_store_error() {
        let err: PersistenceError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, PersistenceError::Store(_)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_missing_container_names_remedies() {
        let message = PersistenceError::MissingContainer.to_string();
        assert!(message.contains("default_container"));
        assert!(message.contains("ContainerInformationExtractor"));
    }
}
