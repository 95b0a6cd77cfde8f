//! Grouped-write (transactional batch) types.
//!
//! A batch targets exactly one partition key. Results come back positionally,
//! one per submitted operation, in submission order.

use serde_json::Value;

use crate::partition::PartitionKey;

/// HTTP-style status codes the store reports per operation.
pub mod status {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NO_CONTENT: u16 = 204;
    pub const NOT_MODIFIED: u16 = 304;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const PRECONDITION_FAILED: u16 = 412;
    /// Operation skipped because a sibling in the same batch failed.
    pub const FAILED_DEPENDENCY: u16 = 424;
    pub const TOO_MANY_REQUESTS: u16 = 429;

    /// Whether a status code denotes success.
    pub fn is_success(code: u16) -> bool {
        (200..300).contains(&code)
    }
}

/// A single JSON-patch style mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOperation {
    Set { path: String, value: Value },
    Add { path: String, value: Value },
    Replace { path: String, value: Value },
    Remove { path: String },
    Increment { path: String, value: i64 },
}

impl PatchOperation {
    /// The document path this mutation targets.
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Set { path, .. }
            | PatchOperation::Add { path, .. }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Remove { path }
            | PatchOperation::Increment { path, .. } => path,
        }
    }
}

/// An item-level operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    Create {
        document: Value,
    },
    Upsert {
        document: Value,
        if_match: Option<String>,
    },
    Replace {
        id: String,
        document: Value,
        if_match: Option<String>,
    },
    Delete {
        id: String,
        if_match: Option<String>,
    },
    Read {
        id: String,
    },
    Patch {
        id: String,
        operations: Vec<PatchOperation>,
        if_match: Option<String>,
    },
}

impl BatchOperation {
    /// Short name used in logs and conflict descriptions.
    pub fn verb(&self) -> &'static str {
        match self {
            BatchOperation::Create { .. } => "create",
            BatchOperation::Upsert { .. } => "upsert",
            BatchOperation::Replace { .. } => "replace",
            BatchOperation::Delete { .. } => "delete",
            BatchOperation::Read { .. } => "read",
            BatchOperation::Patch { .. } => "patch",
        }
    }
}

/// Builder for one atomic grouped write.
#[derive(Debug, Clone)]
pub struct TransactionalBatch {
    partition_key: PartitionKey,
    operations: Vec<BatchOperation>,
}

impl TransactionalBatch {
    pub fn new(partition_key: PartitionKey) -> Self {
        Self {
            partition_key,
            operations: Vec::new(),
        }
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<BatchOperation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn create_item(&mut self, document: Value) -> &mut Self {
        self.operations.push(BatchOperation::Create { document });
        self
    }

    pub fn upsert_item(&mut self, document: Value, if_match: Option<String>) -> &mut Self {
        self.operations
            .push(BatchOperation::Upsert { document, if_match });
        self
    }

    pub fn replace_item(
        &mut self,
        id: impl Into<String>,
        document: Value,
        if_match: Option<String>,
    ) -> &mut Self {
        self.operations.push(BatchOperation::Replace {
            id: id.into(),
            document,
            if_match,
        });
        self
    }

    pub fn delete_item(&mut self, id: impl Into<String>, if_match: Option<String>) -> &mut Self {
        self.operations.push(BatchOperation::Delete {
            id: id.into(),
            if_match,
        });
        self
    }

    pub fn read_item(&mut self, id: impl Into<String>) -> &mut Self {
        self.operations.push(BatchOperation::Read { id: id.into() });
        self
    }

    pub fn patch_item(
        &mut self,
        id: impl Into<String>,
        operations: Vec<PatchOperation>,
        if_match: Option<String>,
    ) -> &mut Self {
        self.operations.push(BatchOperation::Patch {
            id: id.into(),
            operations,
            if_match,
        });
        self
    }
}

/// Outcome of one operation in a batch, or of a point operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub status: u16,
    pub etag: Option<String>,
    pub resource: Option<Value>,
}

impl OperationResult {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            etag: None,
            resource: None,
        }
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }

    /// Whether the store skipped this operation because a sibling failed.
    pub fn is_failed_dependency(&self) -> bool {
        self.status == status::FAILED_DEPENDENCY
    }
}

/// Positional results of an executed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub status: u16,
    pub results: Vec<OperationResult>,
}

impl BatchResponse {
    pub fn is_success(&self) -> bool {
        status::is_success(self.status)
    }
}

/// A document returned by a point read.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemResponse {
    pub document: Value,
    pub etag: String,
}
