use std::sync::{Arc, Mutex};

use serde_json::json;

use super::*;
use crate::interfaces::{status, OperationResult};
use crate::partition::PartitionKeyPath;
use crate::storage::memory::{InMemoryContainer, InMemoryDocumentStore};
use crate::interfaces::DocumentStore;
use crate::partition::ContainerInformation;

type EventLog = Arc<Mutex<Vec<String>>>;

/// Operation double that records every lifecycle call.
struct RecordingOperation {
    name: String,
    partition_key: PartitionKey,
    kind: OperationKind,
    log: EventLog,
}

impl RecordingOperation {
    fn new(name: &str, partition_key: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            partition_key: PartitionKey::from(partition_key),
            kind: OperationKind::Regular,
            log: log.clone(),
        }
    }

    fn release(name: &str, partition_key: &str, log: &EventLog) -> Self {
        Self {
            kind: OperationKind::ReleaseLock,
            ..Self::new(name, partition_key, log)
        }
    }

    fn record(&self, event: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", event, self.name));
    }
}

impl Operation for RecordingOperation {
    fn partition_key(&self) -> &PartitionKey {
        &self.partition_key
    }

    fn kind(&self) -> OperationKind {
        self.kind
    }

    fn apply(&mut self, batch: &mut TransactionalBatch, path: &PartitionKeyPath) -> Result<()> {
        self.record("apply");
        let mut document = json!({ "id": self.name });
        path.enrich(&mut document, &self.partition_key)?;
        batch.upsert_item(document, None);
        Ok(())
    }

    fn success(&mut self, _result: &OperationResult, _tokens: &mut ConcurrencyTokens) {
        self.record("success");
    }

    fn conflict(&mut self, result: &OperationResult) -> PersistenceError {
        self.record("conflict");
        PersistenceError::Conflict {
            description: format!("recording operation '{}' failed", self.name),
            result: result.clone(),
        }
    }

    fn dispose(&mut self) {
        self.record("dispose");
    }
}

fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn count(log: &EventLog, event: &str) -> usize {
    events(log).iter().filter(|e| e.as_str() == event).count()
}

async fn setup() -> (Arc<InMemoryContainer>, ContainerHolder) {
    let store = InMemoryDocumentStore::new();
    let path = PartitionKeyPath::parse("/pk").unwrap();
    store
        .create_container_if_not_exists(&ContainerInformation::new("items", path.clone()))
        .await
        .unwrap();
    let container = store.in_memory_container("items").unwrap();
    let holder = ContainerHolder::new(container.clone(), path);
    (container, holder)
}

#[tokio::test]
async fn test_commit_groups_by_partition_key_in_first_seen_order() {
    let (container, holder) = setup().await;
    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::new("a", "P1", &log));
    session.add(RecordingOperation::new("b", "P2", &log));
    session.add(RecordingOperation::new("c", "P1", &log));

    assert_eq!(session.operations().partition_count(), 2);
    assert_eq!(session.operations().len(), 3);

    session
        .commit(Some(&holder), &mut ConcurrencyTokens::default(), &CancellationToken::new())
        .await
        .unwrap();

    let batches = container.executed_batches().await;
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].partition_key(), &PartitionKey::from("P1"));
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[1].partition_key(), &PartitionKey::from("P2"));
    assert_eq!(batches[1].len(), 1);
    assert!(session.is_committed());
    assert_eq!(count(&log, "success:a"), 1);
    assert_eq!(count(&log, "dispose:c"), 1);
}

#[tokio::test]
async fn test_dispose_without_commit_only_executes_lease_releases() {
    let (container, holder) = setup().await;
    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::new("write", "P1", &log));
    session.add(RecordingOperation::release("lease", "P1", &log));

    session
        .dispose(Some(&holder), &mut ConcurrencyTokens::default(), &CancellationToken::new())
        .await;

    assert_eq!(count(&log, "apply:write"), 0);
    assert_eq!(count(&log, "dispose:write"), 1);
    assert_eq!(count(&log, "apply:lease"), 1);
    assert_eq!(count(&log, "dispose:lease"), 1);
    assert_eq!(container.executed_batches().await.len(), 1);
    assert!(container.get_item("write", &PartitionKey::from("P1")).await.is_none());
}

#[tokio::test]
async fn test_commit_disposes_lease_releases_unexecuted() {
    let (_container, holder) = setup().await;
    let log = EventLog::default();
    let mut session = StorageSession::new();
    let mut tokens = ConcurrencyTokens::default();
    let cancel = CancellationToken::new();
    session.add(RecordingOperation::new("write", "P1", &log));
    session.add(RecordingOperation::release("lease", "P1", &log));

    session.commit(Some(&holder), &mut tokens, &cancel).await.unwrap();
    session.dispose(Some(&holder), &mut tokens, &cancel).await;

    assert_eq!(count(&log, "apply:lease"), 0);
    assert_eq!(count(&log, "dispose:lease"), 1);
    assert_eq!(count(&log, "dispose:write"), 1);
}

#[tokio::test]
async fn test_commit_without_container_is_configuration_error() {
    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::new("a", "P1", &log));

    let err = session
        .commit(None, &mut ConcurrencyTokens::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PersistenceError::MissingContainer));
}

#[tokio::test]
async fn test_empty_commit_is_noop_and_keeps_lease_releases() {
    let (container, holder) = setup().await;
    let log = EventLog::default();
    let mut session = StorageSession::new();
    let mut tokens = ConcurrencyTokens::default();
    let cancel = CancellationToken::new();
    session.add(RecordingOperation::release("lease", "P1", &log));

    session.commit(None, &mut tokens, &cancel).await.unwrap();
    assert!(!session.is_committed());
    assert!(container.executed_batches().await.is_empty());

    session.dispose(Some(&holder), &mut tokens, &cancel).await;
    assert_eq!(count(&log, "apply:lease"), 1);
}

#[tokio::test]
async fn test_failed_group_raises_conflict_of_failing_operation() {
    let (container, holder) = setup().await;
    let pk = PartitionKey::from("P1");
    container.insert_item(json!({"id": "taken", "pk": "P1"}), pk.clone()).await;

    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::new("first", "P1", &log));
    session.add(crate::operations::CreateItemOperation::new(
        pk.clone(),
        json!({"id": "taken"}),
    ));

    let err = session
        .commit(Some(&holder), &mut ConcurrencyTokens::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        PersistenceError::Conflict { description, result } => {
            assert_eq!(description, "Failed to create item 'taken'");
            assert_eq!(result.status, status::CONFLICT);
        }
        other => panic!("unexpected error: {other}"),
    }
    // The 424 on the first operation is skipped rather than surfaced.
    assert_eq!(count(&log, "conflict:first"), 0);
    assert_eq!(count(&log, "success:first"), 0);
    assert_eq!(count(&log, "dispose:first"), 1);
    assert!(!session.is_committed());
    assert!(container.get_item("first", &pk).await.is_none());
}

#[tokio::test]
async fn test_failure_stops_later_groups() {
    let (container, holder) = setup().await;
    container
        .insert_item(json!({"id": "taken", "pk": "P1"}), PartitionKey::from("P1"))
        .await;

    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(crate::operations::CreateItemOperation::new(
        PartitionKey::from("P1"),
        json!({"id": "taken"}),
    ));
    session.add(RecordingOperation::new("later", "P2", &log));

    let result = session
        .commit(Some(&holder), &mut ConcurrencyTokens::default(), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert_eq!(container.executed_batches().await.len(), 1);
    assert_eq!(count(&log, "apply:later"), 0);
    assert_eq!(count(&log, "dispose:later"), 1);
}

#[tokio::test]
async fn test_cancelled_commit_surfaces_cancellation() {
    let (_container, holder) = setup().await;
    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::new("a", "P1", &log));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = session
        .commit(Some(&holder), &mut ConcurrencyTokens::default(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_lease_release_failure_is_swallowed() {
    let (container, holder) = setup().await;
    container.set_fail_on_batch(true).await;
    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::release("lease", "P1", &log));

    session
        .dispose(Some(&holder), &mut ConcurrencyTokens::default(), &CancellationToken::new())
        .await;

    assert_eq!(count(&log, "dispose:lease"), 1);
}

#[test]
fn test_release_operations_use_their_own_pool() {
    let log = EventLog::default();
    let mut session = StorageSession::new();
    session.add(RecordingOperation::release("lease", "P1", &log));
    assert!(session.is_empty());
    assert_eq!(session.release_lock_operations().len(), 1);
}
