//! Per-frame metadata record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the opaque image query id for a frame.
pub const QUERY_ID_KEY: &str = "iq_id";

/// Metadata key holding the cached answer when none is configured.
pub const DEFAULT_ANSWER_KEY: &str = "answer";

/// Key/value record stored for a single frame.
///
/// Serializes as a plain JSON object so records written by earlier runs
/// (or edited by hand) stay readable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(Map<String, Value>);

impl MetadataRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True when the key is absent or explicitly `null`.
    pub fn is_unset(&self, key: &str) -> bool {
        self.0.get(key).map_or(true, Value::is_null)
    }

    /// Add every default whose key is missing from this record.
    ///
    /// Existing keys are never touched, including ones holding `null`.
    /// Returns `true` if anything was added.
    pub fn merge_defaults(&mut self, defaults: &MetadataRecord) -> bool {
        let mut changed = false;
        for (key, value) in &defaults.0 {
            if !self.0.contains_key(key) {
                self.0.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for MetadataRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
