use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute keys with meaning to the import pipeline
pub const OVERLAY: &str = "overlay";
pub const TOP: &str = "top";
pub const HEIGHT: &str = "height";
pub const RANGE_MIN: &str = "rangeMin";
pub const RANGE_MAX: &str = "rangeMax";
pub const MIN_VALUE: &str = "min.value";
pub const MAX_VALUE: &str = "max.value";

/// String key/value bag attached to datasets, sequences and tracks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    entries: BTreeMap<String, String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `key=value` pairs separated by `;`. Pairs without `=` are skipped.
    pub fn parse(text: &str) -> Self {
        let mut attributes = Self::new();
        for pair in text.split(';') {
            if let Some((key, value)) = pair.split_once('=') {
                let key = key.trim();
                if !key.is_empty() {
                    attributes.set(key, value.trim());
                }
            }
        }
        attributes
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Set only when the key is absent; returns whether the value was written
    pub fn set_if_absent(&mut self, key: &str, value: &str) -> bool {
        if self.contains(key) {
            return false;
        }
        self.set(key, value);
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (k, v) in iter {
            attributes.set(k, v);
        }
        attributes
    }
}
