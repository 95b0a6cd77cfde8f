//! Storage session: the per-message batching engine.
//!
//! Operations queued during handling are grouped by partition key. Commit
//! executes one atomic grouped write per key. Nothing is written unless commit
//! runs; dispose without commit discards regular operations and only executes
//! lease releases.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{PersistenceError, Result};
use crate::interfaces::{StoreError, TransactionalBatch};
use crate::operations::{Operation, OperationKind};
use crate::partition::{ContainerHolder, PartitionKey};
use crate::pipeline::ConcurrencyTokens;

/// Operations grouped by partition key, in first-seen key order and
/// insertion order within each key.
#[derive(Default)]
pub struct PartitionedOperations {
    order: Vec<PartitionKey>,
    groups: HashMap<PartitionKey, Vec<Box<dyn Operation>>>,
}

impl PartitionedOperations {
    pub fn add(&mut self, operation: Box<dyn Operation>) {
        let key = operation.partition_key().clone();
        match self.groups.get_mut(&key) {
            Some(group) => group.push(operation),
            None => {
                self.order.push(key.clone());
                self.groups.insert(key, vec![operation]);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of distinct partition keys.
    pub fn partition_count(&self) -> usize {
        self.order.len()
    }

    /// Total number of queued operations.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn drain(&mut self) -> Vec<(PartitionKey, Vec<Box<dyn Operation>>)> {
        let mut groups = std::mem::take(&mut self.groups);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|key| groups.remove(&key).map(|ops| (key, ops)))
            .collect()
    }
}

/// Pending storage operations for one unit of work.
#[derive(Default)]
pub struct StorageSession {
    operations: PartitionedOperations,
    release_lock_operations: PartitionedOperations,
    committed: bool,
}

impl StorageSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an operation. Lease releases go to their own pool.
    pub fn add_operation(&mut self, operation: Box<dyn Operation>) {
        match operation.kind() {
            OperationKind::Regular => self.operations.add(operation),
            OperationKind::ReleaseLock => self.release_lock_operations.add(operation),
        }
    }

    pub fn add<O: Operation + 'static>(&mut self, operation: O) {
        self.add_operation(Box::new(operation));
    }

    /// Whether no regular operation is queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &PartitionedOperations {
        &self.operations
    }

    pub fn release_lock_operations(&self) -> &PartitionedOperations {
        &self.release_lock_operations
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Execute one grouped write per partition key.
    ///
    /// A no-op when nothing is queued. The first failing group aborts the
    /// commit; groups not yet executed are disposed unexecuted. After a
    /// successful commit queued lease releases are disposed without being
    /// executed: the committed writes already replaced the leased documents.
    pub async fn commit(
        &mut self,
        holder: Option<&ContainerHolder>,
        tokens: &mut ConcurrencyTokens,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.operations.is_empty() {
            return Ok(());
        }

        let holder = holder.ok_or(PersistenceError::MissingContainer)?;

        let mut outcome = Ok(());
        for (partition_key, mut group) in self.operations.drain() {
            if outcome.is_ok() {
                outcome = execute_group(holder, partition_key, &mut group, tokens, cancel).await;
            }
            dispose_all(&mut group);
        }
        outcome?;

        self.committed = true;
        for (_, mut group) in self.release_lock_operations.drain() {
            dispose_all(&mut group);
        }
        Ok(())
    }

    /// End the unit of work.
    ///
    /// Regular operations still queued are disposed without executing. If the
    /// session was not committed, lease releases are executed best-effort;
    /// their failures are logged and swallowed.
    pub async fn dispose(
        &mut self,
        holder: Option<&ContainerHolder>,
        tokens: &mut ConcurrencyTokens,
        cancel: &CancellationToken,
    ) {
        for (partition_key, mut group) in self.operations.drain() {
            debug!(
                partition_key = %partition_key,
                count = group.len(),
                "Discarding uncommitted operations"
            );
            dispose_all(&mut group);
        }

        let releases = self.release_lock_operations.drain();
        if self.committed {
            for (_, mut group) in releases {
                dispose_all(&mut group);
            }
            return;
        }

        for (partition_key, mut group) in releases {
            match holder {
                Some(holder) => {
                    if let Err(e) =
                        execute_group(holder, partition_key.clone(), &mut group, tokens, cancel)
                            .await
                    {
                        warn!(
                            partition_key = %partition_key,
                            error = %e,
                            "Failed to release lease; it will expire on its own"
                        );
                    }
                }
                None => {
                    warn!(
                        partition_key = %partition_key,
                        "No container resolved; lease will expire on its own"
                    );
                }
            }
            dispose_all(&mut group);
        }
    }
}

fn dispose_all(group: &mut [Box<dyn Operation>]) {
    for operation in group.iter_mut() {
        operation.dispose();
    }
}

/// Apply a group onto one grouped write, execute it, and dispatch the
/// positional results back to the operations.
async fn execute_group(
    holder: &ContainerHolder,
    partition_key: PartitionKey,
    group: &mut [Box<dyn Operation>],
    tokens: &mut ConcurrencyTokens,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut batch = TransactionalBatch::new(partition_key.clone());
    for operation in group.iter_mut() {
        operation.apply(&mut batch, holder.partition_key_path())?;
    }

    debug!(
        container = %holder.name(),
        partition_key = %partition_key,
        operations = batch.len(),
        "Executing transactional batch"
    );
    let response = holder.container().execute_batch(batch, cancel).await?;

    if response.results.len() != group.len() {
        return Err(StoreError::Unavailable(format!(
            "Batch for partition '{}' returned {} results for {} operations",
            partition_key,
            response.results.len(),
            group.len()
        ))
        .into());
    }

    for (operation, result) in group.iter_mut().zip(response.results.iter()) {
        if result.is_success() {
            operation.success(result, tokens);
        } else if result.is_failed_dependency() {
            continue;
        } else {
            return Err(operation.conflict(result));
        }
    }

    if !response.is_success() {
        return Err(PersistenceError::Conflict {
            description: format!(
                "Transactional batch for partition '{}' failed without an operation error",
                partition_key
            ),
            result: crate::interfaces::OperationResult::new(response.status),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests;
