//! Best-effort lease release for pessimistically locked sagas.

use serde_json::Value;

use super::{Operation, OperationKind};
use crate::error::{PersistenceError, Result};
use crate::interfaces::{OperationResult, PatchOperation, TransactionalBatch};
use crate::partition::{PartitionKey, PartitionKeyPath};
use crate::pipeline::ConcurrencyTokens;
use crate::saga::RESERVED_UNTIL_FIELD;

/// Clears the lease on a saga document.
///
/// Queued when a lease is acquired; executed only if the unit of work does not
/// commit. Failure is tolerated: the lease expires on its own.
pub struct ReleaseLockOperation {
    saga_id: String,
    partition_key: PartitionKey,
    if_match: Option<String>,
}

impl ReleaseLockOperation {
    pub fn new(saga_id: impl Into<String>, partition_key: PartitionKey, if_match: Option<String>) -> Self {
        Self {
            saga_id: saga_id.into(),
            partition_key,
            if_match,
        }
    }

    pub fn saga_id(&self) -> &str {
        &self.saga_id
    }
}

impl Operation for ReleaseLockOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn kind(&self) -> OperationKind {
        OperationKind::ReleaseLock
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, _path: &PartitionKeyPath) -> Result<()> {
        batch.patch_item(
            self.saga_id.clone(),
            vec![PatchOperation::Set {
                path: format!("/{}", RESERVED_UNTIL_FIELD),
                value: Value::Null,
            }],
            self.if_match.clone(),
        );
        Ok(())
    }

    fn success(&mut self, result: &OperationResult, tokens: &mut ConcurrencyTokens) {
        tokens.record(&self.partition_key, &self.saga_id, result.etag.as_deref());
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        PersistenceError::Conflict {
            description: format!("Unable to release the lease on saga '{}'", self.saga_id),
            result: result.clone(),
        }
    }
}
