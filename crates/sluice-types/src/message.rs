use crate::value::Value;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A log message flowing through the pipelines.
///
/// Fields are kept in key order so that serialized output is deterministic,
/// which the simulator relies on when comparing against production runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    fields: BTreeMap<String, Value>,
    #[serde(default)]
    streams: BTreeSet<String>,
    #[serde(default)]
    dropped: bool,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// Empty message with a fresh id
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Empty message with the given id
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into(), fields: BTreeMap::new(), streams: BTreeSet::new(), dropped: false }
    }

    /// Build a message from a JSON object. A string `_id` member becomes the
    /// message id and is not stored as a field.
    ///
    /// # Errors
    ///
    /// Returns an error when `json` is not an object.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| anyhow!("Message must be a JSON object, found {}", json))?;

        let mut message = match object.get("_id").and_then(serde_json::Value::as_str) {
            Some(id) => Self::with_id(id),
            None => Self::new(),
        };
        for (key, value) in object {
            if key != "_id" {
                message.fields.insert(key.clone(), Value::from(value));
            }
        }
        Ok(message)
    }

    /// Fields as a JSON object, with `_id` included
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object: serde_json::Map<String, serde_json::Value> =
            self.fields.iter().map(|(k, v)| (k.clone(), v.clone().into())).collect();
        object.insert("_id".to_string(), serde_json::Value::String(self.id.clone()));
        serde_json::Value::Object(object)
    }

    /// Message id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All fields in key order
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Field value, if present
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether the field is present
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Set or replace a field
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    /// Remove a field, returning its previous value
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// Move a field to a new name. Returns false when `old` is absent.
    pub fn rename_field(&mut self, old: &str, new: &str) -> bool {
        if old == new {
            return self.has_field(old);
        }
        match self.fields.remove(old) {
            Some(value) => {
                self.fields.insert(new.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Streams this message has been routed to
    #[must_use]
    pub const fn streams(&self) -> &BTreeSet<String> {
        &self.streams
    }

    /// Route to a stream. Returns false if already routed there.
    pub fn add_stream(&mut self, stream_id: impl Into<String>) -> bool {
        self.streams.insert(stream_id.into())
    }

    /// Remove from a stream. Returns false if it was not routed there.
    pub fn remove_stream(&mut self, stream_id: &str) -> bool {
        self.streams.remove(stream_id)
    }

    /// Whether the message has been dropped
    #[must_use]
    pub const fn is_dropped(&self) -> bool {
        self.dropped
    }

    /// Mark the message as dropped
    pub fn set_dropped(&mut self, dropped: bool) {
        self.dropped = dropped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_extracts_id() {
        let message = Message::from_json(&json!({"_id": "m-1", "status_code": "503"})).unwrap();
        assert_eq!(message.id(), "m-1");
        assert!(!message.has_field("_id"));
        assert_eq!(message.field("status_code"), Some(&Value::from("503")));
    }

    #[test]
    fn test_from_json_rejects_non_objects() {
        assert!(Message::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_rename_field() {
        let mut message = Message::with_id("m");
        message.set_field("src", Value::from("10.0.0.1"));
        assert!(message.rename_field("src", "source_ip"));
        assert!(!message.has_field("src"));
        assert!(!message.rename_field("src", "other"));
        assert_eq!(message.field("source_ip"), Some(&Value::from("10.0.0.1")));
    }

    #[test]
    fn test_to_json_includes_id() {
        let mut message = Message::with_id("abc");
        message.set_field("n", Value::Long(1));
        assert_eq!(message.to_json(), json!({"_id": "abc", "n": 1}));
    }
}
