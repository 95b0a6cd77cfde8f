//! Document store interface.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::batch::{BatchResponse, ItemResponse, OperationResult, TransactionalBatch};
use crate::partition::{ContainerInformation, PartitionKey};

/// Errors surfaced by the store client.
///
/// "Not found" is deliberately absent: reads report it as `Ok(None)`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Store call was cancelled")]
    Cancelled,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Document serialization failed: {0}")]
    Serialization(String),
}

/// Handle to one container of a partitioned document database.
///
/// Every call takes the cancellation token of the message being processed.
/// A cancelled call must return `StoreError::Cancelled`.
///
/// Implementations:
/// - `InMemoryDocumentStore` containers: in-process store for tests and local runs
#[async_trait]
pub trait Container: Send + Sync {
    /// Name of this container.
    fn name(&self) -> &str;

    /// Point read of one item by id within a partition.
    ///
    /// Returns `None` if no such item exists.
    async fn read_item(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ItemResponse>, StoreError>;

    /// Point write of one item.
    ///
    /// Precondition failures come back as a non-success `OperationResult`, not
    /// as an error.
    async fn upsert_item(
        &self,
        document: Value,
        partition_key: &PartitionKey,
        if_match: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, StoreError>;

    /// Execute one atomic grouped write scoped to the batch's partition key.
    async fn execute_batch(
        &self,
        batch: TransactionalBatch,
        cancel: &CancellationToken,
    ) -> Result<BatchResponse, StoreError>;
}

/// Entry point of the store client. Owned by the host, shared by the core.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Get a handle to a container. Cheap; does not hit the network.
    fn container(&self, name: &str) -> Result<Arc<dyn Container>, StoreError>;

    /// Create a container if missing (provisioning only).
    async fn create_container_if_not_exists(
        &self,
        info: &ContainerInformation,
    ) -> Result<(), StoreError>;
}
