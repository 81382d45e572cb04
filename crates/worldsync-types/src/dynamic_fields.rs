//! Ordered, string-keyed property bag attached to every snapshot.
//!
//! Values are opaque JSON. Keys the server does not understand are kept and
//! written back unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Script-visible properties persisted with an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DynamicFields(BTreeMap<String, Value>);

impl DynamicFields {
    /// An empty bag.
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Look up a property.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Set a property, returning the previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(name.into(), value)
    }

    /// Remove a property.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Iterate properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no properties are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let doc = json!({
            "private.indexed.questStage": 20,
            "someModFeature": { "nested": [1, 2, 3] },
        });
        let fields: DynamicFields = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(serde_json::to_value(&fields).unwrap(), doc);
    }

    #[test]
    fn set_replaces_existing_key() {
        let mut fields = DynamicFields::new();
        assert!(fields.set("hp", json!(10)).is_none());
        assert_eq!(fields.set("hp", json!(20)), Some(json!(10)));
        assert_eq!(fields.get("hp"), Some(&json!(20)));
        assert_eq!(fields.len(), 1);
    }
}
