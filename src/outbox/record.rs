//! Persisted outbox record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operations::DocumentMetadata;
use crate::pipeline::{Headers, TransportOperation};

/// Outcome of a processed message, stored under the message id.
///
/// An undispatched record means the message was fully processed; its
/// transport operations are replayed on redelivery instead of re-running the
/// handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: String,
    #[serde(default)]
    pub dispatched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transport_operations: Vec<StoredTransportOperation>,
    /// Seconds until the backend expires the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    /// Absent on records written by the legacy schema.
    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

impl OutboxRecord {
    /// Record for a message that has not been dispatched yet.
    pub fn pending(message_id: impl Into<String>, operations: &[TransportOperation]) -> Self {
        Self {
            id: message_id.into(),
            dispatched: false,
            dispatched_at: None,
            transport_operations: operations.iter().map(StoredTransportOperation::from).collect(),
            ttl: None,
            metadata: None,
        }
    }

    /// Record marking a message dispatched. Operations are dropped; the
    /// record only serves deduplication until `ttl` expires.
    pub fn dispatched(message_id: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            id: message_id.into(),
            dispatched: true,
            dispatched_at: Some(Utc::now()),
            transport_operations: Vec::new(),
            ttl: Some(ttl_secs),
            metadata: None,
        }
    }

    pub fn transport_operations(&self) -> Vec<TransportOperation> {
        self.transport_operations
            .iter()
            .cloned()
            .map(TransportOperation::from)
            .collect()
    }

    /// Schema version the record was written with, if it says.
    pub fn schema_version(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.schema_version.as_str())
    }
}

/// Wire form of a [`TransportOperation`]. The body is base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransportOperation {
    pub message_id: String,
    pub destination: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl From<&TransportOperation> for StoredTransportOperation {
    fn from(op: &TransportOperation) -> Self {
        Self {
            message_id: op.message_id.clone(),
            destination: op.destination.clone(),
            headers: op.headers.clone(),
            body: op.body.clone(),
            options: op.options.clone(),
        }
    }
}

impl From<StoredTransportOperation> for TransportOperation {
    fn from(op: StoredTransportOperation) -> Self {
        Self {
            message_id: op.message_id,
            destination: op.destination,
            headers: op.headers,
            body: op.body,
            options: op.options,
        }
    }
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_is_base64_on_the_wire() {
        let record = OutboxRecord::pending(
            "m-1",
            &[TransportOperation::new("42", "somewhere", b"hi".to_vec())],
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["transport_operations"][0]["body"], "aGk=");
        assert!(value.get("ttl").is_none());
    }

    #[test]
    fn test_legacy_record_without_metadata_parses() {
        let record: OutboxRecord = serde_json::from_value(json!({
            "id": "m-1",
            "dispatched": false,
            "transport_operations": [
                {"message_id": "42", "destination": "somewhere", "body": ""}
            ],
            "pk": "m-1"
        }))
        .unwrap();
        assert!(record.schema_version().is_none());
        let ops = record.transport_operations();
        assert_eq!(ops[0].message_id, "42");
        assert!(ops[0].body.is_empty());
    }

    #[test]
    fn test_dispatched_record_has_ttl_and_no_operations() {
        let record = OutboxRecord::dispatched("m-1", 60);
        assert!(record.dispatched);
        assert_eq!(record.ttl, Some(60));
        assert!(record.transport_operations.is_empty());
        assert!(record.dispatched_at.is_some());
    }
}
