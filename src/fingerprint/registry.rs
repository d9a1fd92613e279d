use std::collections::BTreeMap;

use serde::Serialize;

/// Component name -> canonical value, iterated in ascending name order.
///
/// Insertion order never matters. Writing a name again replaces its value,
/// and an empty string is stored as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ComponentRegistry {
    entries: BTreeMap<String, Option<String>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: Option<String>) {
        let value = value.filter(|v| !v.is_empty());
        self.entries.insert(name.to_string(), value);
    }

    /// `None` for unknown names and for absent values alike.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(|v| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries that carry a value.
    pub fn present_count(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    /// One `name:value` line per entry; absent values render as nothing.
    pub fn render(&self) -> String {
        self.iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.unwrap_or("")))
            .collect()
    }

    /// Values only, in name order. This is the digest preimage.
    pub fn digest_input(&self) -> Vec<Option<&str>> {
        self.entries.values().map(|v| v.as_deref()).collect()
    }
}
