//! Event record flowing through the logging pipeline

use serde_json::{Map, Value};

/// Internal key holding the raw event text until the pipeline normalizes it
pub const RAW_MESSAGE_KEY: &str = "event";

/// Public key of the primary text field
pub const MESSAGE_KEY: &str = "message";

/// Ordered key/value record, mutated by processors and rendered by sinks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    fields: Map<String, Value>,
}

impl EventRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record carrying raw event text under the internal key
    pub fn with_event(text: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.insert(RAW_MESSAGE_KEY, Value::String(text.into()));
        record
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Inserts or replaces a field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Inserts a field only when the key is absent. Returns true if inserted.
    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if self.fields.contains_key(key) {
            return false;
        }

        self.fields.insert(key.to_string(), value.into());
        true
    }

    /// Removes a field, keeping the order of the remaining keys
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Moves the value stored under `from` to `to`. Fails when `from` is
    /// missing or `to` is already taken.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        if self.fields.contains_key(to) {
            return false;
        }

        match self.remove(from) {
            Some(value) => {
                self.fields.insert(to.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for EventRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_default_keeps_first_writer() {
        let mut record = EventRecord::new();

        assert!(record.set_default("service", "api"));
        assert!(!record.set_default("service", "worker"));
        assert_eq!(record.get_str("service"), Some("api"));
    }

    #[test]
    fn test_rename_moves_value_once() {
        let mut record = EventRecord::with_event("hello");

        assert!(record.rename(RAW_MESSAGE_KEY, MESSAGE_KEY));
        assert!(!record.rename(RAW_MESSAGE_KEY, MESSAGE_KEY));
        assert_eq!(record.get_str(MESSAGE_KEY), Some("hello"));
        assert!(!record.contains(RAW_MESSAGE_KEY));
    }

    #[test]
    fn test_rename_refuses_to_overwrite() {
        let mut record = EventRecord::with_event("raw");
        record.insert(MESSAGE_KEY, "explicit");

        assert!(!record.rename(RAW_MESSAGE_KEY, MESSAGE_KEY));
        assert_eq!(record.get_str(MESSAGE_KEY), Some("explicit"));
        assert_eq!(record.get_str(RAW_MESSAGE_KEY), Some("raw"));
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut record = EventRecord::new();
        record.insert("a", 1);
        record.insert("b", 2);
        record.insert("c", 3);

        record.remove("a");

        let keys: Vec<&String> = record.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(record.get("c"), Some(&json!(3)));
    }
}
