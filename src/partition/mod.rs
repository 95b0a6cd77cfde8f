//! Partitioning model: keys, key paths, and containers.

mod container;
mod key;
mod path;

pub use container::{ContainerHolder, ContainerInformation};
pub use key::PartitionKey;
pub use path::PartitionKeyPath;
