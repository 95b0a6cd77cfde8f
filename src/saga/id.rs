//! Deterministic saga ids.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Derives saga ids from the correlation property, so the same correlation
/// always maps to the same document without a lookup index.
pub struct SagaIdGenerator;

impl SagaIdGenerator {
    /// SHA-256 of `"{entity_type}_{property_name}_{property_value}"`, reduced
    /// to its first 16 bytes.
    pub fn generate(
        entity_type: &str,
        property_name: &str,
        property_value: impl std::fmt::Display,
    ) -> Uuid {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}_{}_{}", entity_type, property_name, property_value).as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Uuid::from_bytes(bytes)
    }
}
