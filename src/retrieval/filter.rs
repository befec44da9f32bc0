//! Exact-match metadata filters

use crate::storage::{FieldCondition, Filter};
use std::collections::{BTreeMap, HashMap};

/// Payload prefix of the heading metadata
const METADATA_PREFIX: &str = "metadata.";

/// Conjunction of `metadata.<key> == value` conditions.
///
/// Keys are heading keys such as `header_2`. Every pair must match exactly;
/// there is no prefix or range matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: BTreeMap<String, String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; a repeated key replaces the earlier value
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Filter on the second-level heading
    pub fn section(name: impl Into<String>) -> Self {
        Self::new().with("header_2", name)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.conditions.get(key).map(String::as_str)
    }

    /// Index-level filter over `metadata.<key>` payload paths
    pub fn to_store_filter(&self) -> Filter {
        Filter {
            must: self
                .conditions
                .iter()
                .map(|(key, value)| {
                    FieldCondition::matches(format!("{}{}", METADATA_PREFIX, key), value.clone())
                })
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            conditions: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for MetadataFilter {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}
