//! Partition key and container extraction.
//!
//! Two structurally identical chains: one producing a [`PartitionKey`], one
//! producing [`ContainerInformation`]. Each holds header rules (tried at the
//! header stage) and message rules (tried once the message is deserialized).

mod chain;
mod registry;

pub use chain::ExtractorChain;
pub use registry::{ExtractorRegistration, ExtractorRegistry};

use crate::error::Result;
use crate::partition::{ContainerInformation, PartitionKey};

/// Extraction rules producing the partition key.
pub type PartitionKeyExtractor = ExtractorChain<PartitionKey>;

/// Extraction rules producing the target container.
pub type ContainerInformationExtractor = ExtractorChain<ContainerInformation>;

impl ExtractorChain<PartitionKey> {
    /// Use the raw value of header `key` as the partition key.
    pub fn extract_from_header_key(&mut self, key: impl Into<String>) -> Result<&mut Self> {
        self.extract_from_header(key, |value| Some(PartitionKey::from(value)))
    }
}

/// Both extractor chains of an endpoint.
#[derive(Default)]
pub struct Extractors {
    pub partition_keys: PartitionKeyExtractor,
    pub containers: ContainerInformationExtractor,
}

impl Extractors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chains populated from every [`ExtractorRegistration`] linked into the
    /// binary.
    pub fn discover() -> Result<Self> {
        let mut extractors = Self::default();
        ExtractorRegistry::apply(&mut extractors)?;
        Ok(extractors)
    }

    pub fn configuration(&self) -> ExtractorConfiguration {
        ExtractorConfiguration {
            has_header_extractors: self.partition_keys.has_header_rules()
                || self.containers.has_header_rules(),
            has_message_extractors: self.partition_keys.has_message_rules()
                || self.containers.has_message_rules(),
        }
    }
}

/// Which stages have custom extractors registered.
///
/// Read once at startup to decide which extraction steps join the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractorConfiguration {
    pub has_header_extractors: bool,
    pub has_message_extractors: bool,
}
