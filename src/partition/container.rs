//! Container identity and live container handles.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::PartitionKeyPath;
use crate::interfaces::Container;

/// Identifies a target container: its name plus its partition key path.
///
/// Equality is by container name only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInformation {
    pub container_name: String,
    pub partition_key_path: PartitionKeyPath,
}

impl ContainerInformation {
    pub fn new(container_name: impl Into<String>, partition_key_path: PartitionKeyPath) -> Self {
        Self {
            container_name: container_name.into(),
            partition_key_path,
        }
    }
}

impl PartialEq for ContainerInformation {
    fn eq(&self, other: &Self) -> bool {
        self.container_name == other.container_name
    }
}

impl Eq for ContainerInformation {}

impl fmt::Display for ContainerInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.container_name, self.partition_key_path)
    }
}

/// Live container handle plus the partition key path documents must carry.
#[derive(Clone)]
pub struct ContainerHolder {
    container: Arc<dyn Container>,
    partition_key_path: PartitionKeyPath,
}

impl ContainerHolder {
    pub fn new(container: Arc<dyn Container>, partition_key_path: PartitionKeyPath) -> Self {
        Self {
            container,
            partition_key_path,
        }
    }

    pub fn container(&self) -> &Arc<dyn Container> {
        &self.container
    }

    pub fn name(&self) -> &str {
        self.container.name()
    }

    pub fn partition_key_path(&self) -> &PartitionKeyPath {
        &self.partition_key_path
    }
}

impl fmt::Debug for ContainerHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHolder")
            .field("container", &self.container.name())
            .field("partition_key_path", &self.partition_key_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_information_equality_by_name() {
        let a = ContainerInformation::new("orders", PartitionKeyPath::parse("/a").unwrap());
        let b = ContainerInformation::new("orders", PartitionKeyPath::parse("/b").unwrap());
        let c = ContainerInformation::new("invoices", PartitionKeyPath::parse("/a").unwrap());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
