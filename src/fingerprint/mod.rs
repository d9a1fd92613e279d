//! Fingerprint engine: components in, canonical report and digest out.

mod builder;
mod canonical;
mod component;
mod digest;
mod registry;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

pub use builder::{collect, read_registry_value, stable_token, DeviceIdBuilder};
pub use canonical::{canonical_mac_addresses, format_mac_address, LIST_SEPARATOR};
pub use component::{names, Component, ComponentKind};
pub use digest::{digest, DIGEST_SEPARATOR};
pub use registry::ComponentRegistry;

/// Frozen result of a collection run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    components: ComponentRegistry,
    hash: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<String, String>,
}

impl Fingerprint {
    pub(crate) fn new(components: ComponentRegistry, failures: BTreeMap<String, String>) -> Self {
        let hash = digest(&components);
        Self {
            components,
            hash,
            failures,
        }
    }

    pub fn render(&self) -> String {
        self.components.render()
    }

    /// 64 uppercase hex digits.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.components.get(name)
    }

    pub fn present_count(&self) -> usize {
        self.components.present_count()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Probe errors by component name, for components that ended up absent.
    pub fn failures(&self) -> &BTreeMap<String, String> {
        &self.failures
    }

    pub fn failure(&self, name: &str) -> Option<&str> {
        self.failures.get(name).map(String::as_str)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
