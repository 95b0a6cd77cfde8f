//! Bulk extractor registration.
//!
//! Application crates contribute rules without wiring them by hand:
//!
//! ```ignore
//! fn order_rules(extractors: &mut Extractors) -> batchstore::error::Result<()> {
//!     extractors.partition_keys.extract_from_header_key("tenant")?;
//!     Ok(())
//! }
//!
//! inventory::submit! { ExtractorRegistration::new("orders", order_rules) }
//! ```

use tracing::debug;

use super::Extractors;
use crate::error::Result;

/// A named bundle of extraction rules, submitted with `inventory::submit!`.
pub struct ExtractorRegistration {
    pub name: &'static str,
    pub register: fn(&mut Extractors) -> Result<()>,
}

impl ExtractorRegistration {
    pub const fn new(name: &'static str, register: fn(&mut Extractors) -> Result<()>) -> Self {
        Self { name, register }
    }
}

inventory::collect!(ExtractorRegistration);

/// Discovers submitted [`ExtractorRegistration`]s.
pub struct ExtractorRegistry;

impl ExtractorRegistry {
    /// Registrations sorted by name, so rule order does not depend on link
    /// order.
    pub fn registrations() -> Vec<&'static ExtractorRegistration> {
        let mut registrations: Vec<_> = inventory::iter::<ExtractorRegistration>
            .into_iter()
            .collect();
        registrations.sort_by_key(|r| r.name);
        registrations
    }

    /// Apply every registration. Returns how many were applied.
    ///
    /// Stops at the first registration that claims an already claimed header
    /// key or message type.
    pub fn apply(extractors: &mut Extractors) -> Result<usize> {
        let registrations = Self::registrations();
        for registration in &registrations {
            debug!(registration = registration.name, "Registering extractors");
            (registration.register)(extractors)?;
        }
        Ok(registrations.len())
    }
}
