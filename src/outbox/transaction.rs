//! Outbox transaction state for one message.

use crate::partition::PartitionKey;
use crate::storage::StorageSession;

/// Outbox state for the message being processed.
///
/// Owns the message's storage session so the outbox record and every other
/// write of the message land in the same unit of work.
#[derive(Default)]
pub struct OutboxTransaction {
    session: StorageSession,
    partition_key: Option<PartitionKey>,
    fallback_partition_key: Option<PartitionKey>,
    already_handled: bool,
    record_dispatched: bool,
}

impl OutboxTransaction {
    pub fn new(session: StorageSession) -> Self {
        Self {
            session,
            ..Self::default()
        }
    }

    pub fn session(&self) -> &StorageSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut StorageSession {
        &mut self.session
    }

    /// Partition key deduplication ran against. Set once the check has run.
    pub fn partition_key(&self) -> Option<&PartitionKey> {
        self.partition_key.as_ref()
    }

    pub(crate) fn bind_partition_key(&mut self, partition_key: PartitionKey) {
        self.partition_key = Some(partition_key);
    }

    /// Key the record was found under through the legacy read.
    pub fn fallback_partition_key(&self) -> Option<&PartitionKey> {
        self.fallback_partition_key.as_ref()
    }

    pub(crate) fn use_fallback_partition_key(&mut self, partition_key: PartitionKey) {
        self.fallback_partition_key = Some(partition_key);
    }

    /// Key dispatch completion writes to: the fallback key if the record was
    /// found through it, else the bound key.
    pub fn dispatch_partition_key(&self) -> Option<&PartitionKey> {
        self.fallback_partition_key
            .as_ref()
            .or(self.partition_key.as_ref())
    }

    /// Whether a stored record was found for this message.
    pub fn is_already_handled(&self) -> bool {
        self.already_handled
    }

    /// Whether the stored record was already marked dispatched.
    pub fn is_record_dispatched(&self) -> bool {
        self.record_dispatched
    }

    pub(crate) fn mark_already_handled(&mut self, record_dispatched: bool) {
        self.already_handled = true;
        self.record_dispatched = record_dispatched;
    }
}

impl std::fmt::Debug for OutboxTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxTransaction")
            .field("partition_key", &self.partition_key)
            .field("fallback_partition_key", &self.fallback_partition_key)
            .field("already_handled", &self.already_handled)
            .finish()
    }
}
