//! Partition key values.

use std::fmt;

use serde_json::{Number, Value};

/// Value identifying one physical partition within a container.
///
/// All operations in a single grouped write share one `PartitionKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartitionKey {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
}

impl PartitionKey {
    /// Backend-native JSON representation.
    pub fn to_json(&self) -> Value {
        match self {
            PartitionKey::String(s) => Value::String(s.clone()),
            PartitionKey::Number(n) => Value::Number(n.clone()),
            PartitionKey::Bool(b) => Value::Bool(*b),
            PartitionKey::Null => Value::Null,
        }
    }

    /// Build a key from a JSON scalar. Arrays and objects are not partition keys.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PartitionKey::String(s.clone())),
            Value::Number(n) => Some(PartitionKey::Number(n.clone())),
            Value::Bool(b) => Some(PartitionKey::Bool(*b)),
            Value::Null => Some(PartitionKey::Null),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PartitionKey::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::String(s) => write!(f, "{}", s),
            PartitionKey::Number(n) => write!(f, "{}", n),
            PartitionKey::Bool(b) => write!(f, "{}", b),
            PartitionKey::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        PartitionKey::String(value.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        PartitionKey::String(value)
    }
}

impl From<&String> for PartitionKey {
    fn from(value: &String) -> Self {
        PartitionKey::String(value.clone())
    }
}

impl From<i64> for PartitionKey {
    fn from(value: i64) -> Self {
        PartitionKey::Number(Number::from(value))
    }
}

impl From<bool> for PartitionKey {
    fn from(value: bool) -> Self {
        PartitionKey::Bool(value)
    }
}

impl From<uuid::Uuid> for PartitionKey {
    fn from(value: uuid::Uuid) -> Self {
        PartitionKey::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_for_scalars() {
        for value in [json!("P1"), json!(42), json!(true), Value::Null] {
            let key = PartitionKey::from_json(&value).unwrap();
            assert_eq!(key.to_json(), value);
        }
    }

    #[test]
    fn test_compound_json_is_not_a_key() {
        assert!(PartitionKey::from_json(&json!(["a"])).is_none());
        assert!(PartitionKey::from_json(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_equal_values_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(PartitionKey::from("P1"));
        set.insert(PartitionKey::from("P1".to_string()));
        set.insert(PartitionKey::from(1));
        assert_eq!(set.len(), 2);
    }
}
