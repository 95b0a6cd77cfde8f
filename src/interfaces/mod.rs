//! Abstract interfaces for the storage backend.
//!
//! These traits define the contracts for:
//! - Document storage (point reads, point writes, provisioning)
//! - Atomic grouped writes scoped to a single partition key

pub mod batch;
pub mod document_store;

pub use batch::{
    status, BatchOperation, BatchResponse, ItemResponse, OperationResult, PatchOperation,
    TransactionalBatch,
};
pub use document_store::{Container, DocumentStore, StoreError};
