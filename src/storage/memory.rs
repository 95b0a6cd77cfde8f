//! In-memory document store.
//!
//! Partitioned containers with atomic grouped writes, ETags, `if_match`
//! preconditions, and partition key path validation. Keeps a log of executed
//! batches so tests can assert on grouping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::interfaces::{
    status, BatchOperation, BatchResponse, Container, DocumentStore, ItemResponse,
    OperationResult, PatchOperation, StoreError, TransactionalBatch,
};
use crate::partition::{ContainerInformation, PartitionKey, PartitionKeyPath};

#[derive(Debug, Clone)]
struct StoredItem {
    document: Value,
    etag: String,
}

type ItemKey = (PartitionKey, String);

/// In-memory container.
pub struct InMemoryContainer {
    name: String,
    partition_key_path: RwLock<Option<PartitionKeyPath>>,
    items: RwLock<HashMap<ItemKey, StoredItem>>,
    executed_batches: RwLock<Vec<TransactionalBatch>>,
    fail_on_batch: RwLock<bool>,
}

impl InMemoryContainer {
    pub fn new(name: impl Into<String>, partition_key_path: Option<PartitionKeyPath>) -> Self {
        Self {
            name: name.into(),
            partition_key_path: RwLock::new(partition_key_path),
            items: RwLock::new(HashMap::new()),
            executed_batches: RwLock::new(Vec::new()),
            fail_on_batch: RwLock::new(false),
        }
    }

    /// Make every subsequent batch fail with `StoreError::Unavailable`.
    pub async fn set_fail_on_batch(&self, fail: bool) {
        *self.fail_on_batch.write().await = fail;
    }

    /// Batches submitted so far, in submission order.
    pub async fn executed_batches(&self) -> Vec<TransactionalBatch> {
        self.executed_batches.read().await.clone()
    }

    /// Document stored under `id` in a partition.
    pub async fn get_item(&self, id: &str, partition_key: &PartitionKey) -> Option<Value> {
        let key = (partition_key.clone(), id.to_string());
        self.items.read().await.get(&key).map(|i| i.document.clone())
    }

    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }

    /// Seed a document directly, bypassing validation. Returns its ETag.
    pub async fn insert_item(&self, document: Value, partition_key: PartitionKey) -> String {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let etag = new_etag();
        self.items.write().await.insert(
            (partition_key, id),
            StoredItem {
                document,
                etag: etag.clone(),
            },
        );
        etag
    }

    async fn set_partition_key_path(&self, path: PartitionKeyPath) {
        let mut current = self.partition_key_path.write().await;
        if current.is_none() {
            *current = Some(path);
        }
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<(), StoreError> {
        if cancel.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn new_etag() -> String {
    format!("\"{}\"", Uuid::new_v4())
}

/// Working copy of one partition during a batch.
struct Staged<'a> {
    partition_key: &'a PartitionKey,
    path: Option<&'a PartitionKeyPath>,
    items: HashMap<String, Option<StoredItem>>,
    source: &'a HashMap<ItemKey, StoredItem>,
}

impl<'a> Staged<'a> {
    fn get(&self, id: &str) -> Option<&StoredItem> {
        match self.items.get(id) {
            Some(staged) => staged.as_ref(),
            None => self
                .source
                .get(&(self.partition_key.clone(), id.to_string())),
        }
    }

    fn put(&mut self, id: String, document: Value) -> String {
        let etag = new_etag();
        self.items.insert(
            id,
            Some(StoredItem {
                document,
                etag: etag.clone(),
            }),
        );
        etag
    }

    fn remove(&mut self, id: &str) {
        self.items.insert(id.to_string(), None);
    }

    fn precondition(&self, id: &str, if_match: &Option<String>) -> Result<Option<&StoredItem>, u16> {
        let existing = self.get(id);
        match (existing, if_match) {
            (Some(item), Some(etag)) if &item.etag != etag => Err(status::PRECONDITION_FAILED),
            (None, Some(_)) => Err(status::PRECONDITION_FAILED),
            (existing, _) => Ok(existing),
        }
    }

    fn validate(&self, document: &Value) -> Result<String, u16> {
        let id = document
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(status::BAD_REQUEST)?;
        if let Some(path) = self.path {
            if !path.matches(document, self.partition_key) {
                return Err(status::BAD_REQUEST);
            }
        }
        Ok(id.to_string())
    }

    fn execute(&mut self, operation: &BatchOperation) -> Result<OperationResult, u16> {
        match operation {
            BatchOperation::Create { document } => {
                let id = self.validate(document)?;
                if self.get(&id).is_some() {
                    return Err(status::CONFLICT);
                }
                let etag = self.put(id, document.clone());
                Ok(OperationResult::new(status::CREATED)
                    .with_etag(etag)
                    .with_resource(document.clone()))
            }
            BatchOperation::Upsert { document, if_match } => {
                let id = self.validate(document)?;
                let existed = self.precondition(&id, if_match)?.is_some();
                let etag = self.put(id, document.clone());
                let code = if existed { status::OK } else { status::CREATED };
                Ok(OperationResult::new(code)
                    .with_etag(etag)
                    .with_resource(document.clone()))
            }
            BatchOperation::Replace {
                id,
                document,
                if_match,
            } => {
                let document_id = self.validate(document)?;
                if &document_id != id {
                    return Err(status::BAD_REQUEST);
                }
                if self.get(id).is_none() {
                    return Err(status::NOT_FOUND);
                }
                if self.precondition(id, if_match)?.is_none() {
                    return Err(status::NOT_FOUND);
                }
                let etag = self.put(id.clone(), document.clone());
                Ok(OperationResult::new(status::OK)
                    .with_etag(etag)
                    .with_resource(document.clone()))
            }
            BatchOperation::Delete { id, if_match } => {
                if self.get(id).is_none() {
                    return Err(status::NOT_FOUND);
                }
                self.precondition(id, if_match)?;
                self.remove(id);
                Ok(OperationResult::new(status::NO_CONTENT))
            }
            BatchOperation::Read { id } => {
                let item = self.get(id).ok_or(status::NOT_FOUND)?;
                Ok(OperationResult::new(status::OK)
                    .with_etag(item.etag.clone())
                    .with_resource(item.document.clone()))
            }
            BatchOperation::Patch {
                id,
                operations,
                if_match,
            } => {
                if self.get(id).is_none() {
                    return Err(status::NOT_FOUND);
                }
                let mut document = self
                    .precondition(id, if_match)?
                    .map(|item| item.document.clone())
                    .ok_or(status::NOT_FOUND)?;
                for patch in operations {
                    apply_patch(&mut document, patch)?;
                }
                let etag = self.put(id.clone(), document.clone());
                Ok(OperationResult::new(status::OK)
                    .with_etag(etag)
                    .with_resource(document))
            }
        }
    }
}

fn apply_changes(
    target: &mut HashMap<ItemKey, StoredItem>,
    partition_key: &PartitionKey,
    changes: HashMap<String, Option<StoredItem>>,
) {
    for (id, item) in changes {
        let key = (partition_key.clone(), id);
        match item {
            Some(item) => {
                target.insert(key, item);
            }
            None => {
                target.remove(&key);
            }
        }
    }
}

fn split_patch_path(path: &str) -> Result<(String, String), u16> {
    let (parent, last) = path.rsplit_once('/').ok_or(status::BAD_REQUEST)?;
    if last.is_empty() {
        return Err(status::BAD_REQUEST);
    }
    Ok((parent.to_string(), last.to_string()))
}

fn patch_parent<'a>(document: &'a mut Value, parent: &str) -> Result<&'a mut Map<String, Value>, u16> {
    document
        .pointer_mut(parent)
        .and_then(Value::as_object_mut)
        .ok_or(status::BAD_REQUEST)
}

fn apply_patch(document: &mut Value, patch: &PatchOperation) -> Result<(), u16> {
    let (parent, field) = split_patch_path(patch.path())?;
    let object = patch_parent(document, &parent)?;
    match patch {
        PatchOperation::Set { value, .. } | PatchOperation::Add { value, .. } => {
            object.insert(field, value.clone());
        }
        PatchOperation::Replace { value, .. } => {
            let slot = object.get_mut(&field).ok_or(status::BAD_REQUEST)?;
            *slot = value.clone();
        }
        PatchOperation::Remove { .. } => {
            object.remove(&field).ok_or(status::BAD_REQUEST)?;
        }
        PatchOperation::Increment { value, .. } => {
            let current = object.get(&field).and_then(Value::as_i64).unwrap_or(0);
            let next = current.checked_add(*value).ok_or(status::BAD_REQUEST)?;
            object.insert(field, Value::from(next));
        }
    }
    Ok(())
}

#[async_trait]
impl Container for InMemoryContainer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_item(
        &self,
        id: &str,
        partition_key: &PartitionKey,
        cancel: &CancellationToken,
    ) -> Result<Option<ItemResponse>, StoreError> {
        Self::check_cancelled(cancel)?;
        let key = (partition_key.clone(), id.to_string());
        Ok(self.items.read().await.get(&key).map(|item| ItemResponse {
            document: item.document.clone(),
            etag: item.etag.clone(),
        }))
    }

    async fn upsert_item(
        &self,
        document: Value,
        partition_key: &PartitionKey,
        if_match: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<OperationResult, StoreError> {
        Self::check_cancelled(cancel)?;
        let path = self.partition_key_path.read().await.clone();
        let mut items = self.items.write().await;
        let mut staged = Staged {
            partition_key,
            path: path.as_ref(),
            items: HashMap::new(),
            source: &items,
        };
        let operation = BatchOperation::Upsert {
            document,
            if_match: if_match.map(str::to_string),
        };
        let outcome = staged.execute(&operation);
        let changes = staged.items;
        match outcome {
            Ok(result) => {
                apply_changes(&mut items, partition_key, changes);
                Ok(result)
            }
            Err(code) => Ok(OperationResult::new(code)),
        }
    }

    async fn execute_batch(
        &self,
        batch: TransactionalBatch,
        cancel: &CancellationToken,
    ) -> Result<BatchResponse, StoreError> {
        Self::check_cancelled(cancel)?;
        if *self.fail_on_batch.read().await {
            return Err(StoreError::Unavailable(format!(
                "container '{}' rejected the batch",
                self.name
            )));
        }
        self.executed_batches.write().await.push(batch.clone());

        let path = self.partition_key_path.read().await.clone();
        let mut items = self.items.write().await;
        let partition_key = batch.partition_key().clone();

        let mut results = Vec::with_capacity(batch.len());
        let mut failed: Option<(usize, u16)> = None;
        let changes = {
            let mut staged = Staged {
                partition_key: &partition_key,
                path: path.as_ref(),
                items: HashMap::new(),
                source: &items,
            };
            for (index, operation) in batch.operations().iter().enumerate() {
                match staged.execute(operation) {
                    Ok(result) => results.push(result),
                    Err(code) => {
                        failed = Some((index, code));
                        break;
                    }
                }
            }
            staged.items
        };

        match failed {
            None => {
                apply_changes(&mut items, &partition_key, changes);
                Ok(BatchResponse {
                    status: status::OK,
                    results,
                })
            }
            Some((index, code)) => {
                let results = (0..batch.len())
                    .map(|i| {
                        if i == index {
                            OperationResult::new(code)
                        } else {
                            OperationResult::new(status::FAILED_DEPENDENCY)
                        }
                    })
                    .collect();
                Ok(BatchResponse {
                    status: code,
                    results,
                })
            }
        }
    }
}

/// In-memory document store. Containers are created on first access.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    containers: Mutex<HashMap<String, Arc<InMemoryContainer>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Concrete handle for test assertions.
    pub fn in_memory_container(&self, name: &str) -> Result<Arc<InMemoryContainer>, StoreError> {
        let mut containers = self
            .containers
            .lock()
            .map_err(|_| StoreError::Unavailable("container registry poisoned".to_string()))?;
        Ok(containers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryContainer::new(name, None)))
            .clone())
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers
            .lock()
            .map(|containers| containers.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn container(&self, name: &str) -> Result<Arc<dyn Container>, StoreError> {
        let container: Arc<dyn Container> = self.in_memory_container(name)?;
        Ok(container)
    }

    async fn create_container_if_not_exists(
        &self,
        info: &ContainerInformation,
    ) -> Result<(), StoreError> {
        let container = self.in_memory_container(&info.container_name)?;
        container
            .set_partition_key_path(info.partition_key_path.clone())
            .await;
        Ok(())
    }
}
