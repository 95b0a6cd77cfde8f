//! Partition key paths and document enrichment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::PartitionKey;
use crate::error::{PersistenceError, Result};

/// Attribute path the backend reads to derive a document's partition key,
/// e.g. `/deep/down`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKeyPath {
    segments: Vec<String>,
}

impl PartitionKeyPath {
    pub fn parse(path: &str) -> Result<Self> {
        let rest = path.strip_prefix('/').ok_or_else(|| {
            PersistenceError::Configuration(format!(
                "Partition key path '{}' must start with '/'",
                path
            ))
        })?;
        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PersistenceError::Configuration(format!(
                "Partition key path '{}' contains an empty segment",
                path
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Value currently stored at this path, if any.
    pub fn value_in<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(document, |current, segment| current.get(segment))
    }

    /// Whether the document already carries `key` at this path.
    pub fn matches(&self, document: &Value, key: &PartitionKey) -> bool {
        self.value_in(document) == Some(&key.to_json())
    }

    /// Synthesize the partition key into the document if the path is absent.
    ///
    /// Intermediate objects are created as needed. An existing value is never
    /// overwritten; a mismatch is left for the backend to reject.
    pub fn enrich(&self, document: &mut Value, key: &PartitionKey) -> Result<()> {
        if self.value_in(document).is_some() {
            return Ok(());
        }

        let (last, parents) = match self.segments.split_last() {
            Some(split) => split,
            None => return Ok(()),
        };

        let mut current = document;
        for segment in parents {
            let object = current.as_object_mut().ok_or_else(|| self.not_an_object())?;
            current = object
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
        }

        current
            .as_object_mut()
            .ok_or_else(|| self.not_an_object())?
            .insert(last.clone(), key.to_json());
        Ok(())
    }

    fn not_an_object(&self) -> PersistenceError {
        PersistenceError::Configuration(format!(
            "Cannot write partition key at '{}': a parent segment is not an object",
            self
        ))
    }
}

impl fmt::Display for PartitionKeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for PartitionKeyPath {
    type Err = PersistenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for PartitionKeyPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PartitionKeyPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
