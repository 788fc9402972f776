//! Generic string-keyed attribute maps attached to cached artifacts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed map of JSON values with nested child maps.
///
/// This is the persistence surface for per-artifact metadata such as
/// [`CacheInfo`](crate::cache::CacheInfo).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributesMap {
    entries: Map<String, Value>,
}

impl AttributesMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Get a value as a string slice, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nested child map stored under `key`.
    ///
    /// Returns `None` if the key is absent or does not hold an object.
    pub fn child(&self, key: &str) -> Option<AttributesMap> {
        match self.entries.get(key) {
            Some(Value::Object(map)) => Some(AttributesMap { entries: map.clone() }),
            _ => None,
        }
    }

    /// Replace the nested child map stored under `key`.
    pub fn set_child(&mut self, key: impl Into<String>, child: AttributesMap) {
        self.entries.insert(key.into(), Value::Object(child.entries));
    }
}
