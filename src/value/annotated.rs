//! Annotated row values
//!
//! The annotation maps are allocated lazily and, once a row is dropped,
//! handed back to the process-wide [`ValuePool`](super::ValuePool).

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::pool::value_pool;
use super::scope::ScopeValue;
use super::Lookup;

static EMPTY_COVERS: Covers = Covers {
    entries: Vec::new(),
};

/// Covering-index values keyed by expression text, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Covers {
    entries: Vec<(String, Value)>,
}

impl Covers {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Sets a cover. An existing key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Side maps carried alongside a row.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    attachments: HashMap<String, Value>,
    covers: Covers,
}

impl Annotations {
    /// Empties both maps, keeping their capacity.
    pub(crate) fn clear(&mut self) {
        self.attachments.clear();
        self.covers.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.attachments.is_empty() && self.covers.is_empty()
    }
}

/// A row value plus pipeline-internal attachments and covers.
///
/// Serializes as the bare document. Cloning copies the annotation maps,
/// so a clone can outlive and diverge from the original.
#[derive(Debug, Clone, Default)]
pub struct AnnotatedValue {
    value: ScopeValue,
    annotations: Option<Box<Annotations>>,
}

impl AnnotatedValue {
    pub fn new(value: Value) -> Self {
        Self::with_scope(ScopeValue::plain(value))
    }

    pub fn with_scope(value: ScopeValue) -> Self {
        Self {
            value,
            annotations: None,
        }
    }

    pub fn value(&self) -> &Value {
        self.value.value()
    }

    pub fn scope(&self) -> &ScopeValue {
        &self.value
    }

    pub fn scope_mut(&mut self) -> &mut ScopeValue {
        &mut self.value
    }

    pub fn attachment(&self, key: &str) -> Option<&Value> {
        self.annotations
            .as_ref()
            .and_then(|a| a.attachments.get(key))
    }

    pub fn set_attachment(&mut self, key: impl Into<String>, value: Value) {
        self.annotations_mut().attachments.insert(key.into(), value);
    }

    pub fn remove_attachment(&mut self, key: &str) -> Option<Value> {
        self.annotations
            .as_mut()
            .and_then(|a| a.attachments.remove(key))
    }

    pub fn covers(&self) -> &Covers {
        self.annotations
            .as_ref()
            .map(|a| &a.covers)
            .unwrap_or(&EMPTY_COVERS)
    }

    pub fn cover(&self, key: &str) -> Option<&Value> {
        self.covers().get(key)
    }

    pub fn set_cover(&mut self, key: impl Into<String>, value: Value) {
        self.annotations_mut().covers.set(key, value);
    }

    /// Consumes the row, returning the document.
    pub fn into_value(mut self) -> Value {
        std::mem::take(&mut self.value).into_value()
    }

    /// Returns the annotation maps to the pool and drops the row.
    pub fn release(self) {
        drop(self);
    }

    fn annotations_mut(&mut self) -> &mut Annotations {
        self.annotations
            .get_or_insert_with(|| value_pool().checkout())
    }
}

impl Drop for AnnotatedValue {
    fn drop(&mut self) {
        if let Some(annotations) = self.annotations.take() {
            value_pool().checkin(annotations);
        }
    }
}

impl From<Value> for AnnotatedValue {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

impl Lookup for AnnotatedValue {
    fn as_value(&self) -> &Value {
        self.value.value()
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.value.field(name)
    }

    fn attachment(&self, key: &str) -> Option<&Value> {
        AnnotatedValue::attachment(self, key)
    }

    fn cover(&self, key: &str) -> Option<&Value> {
        AnnotatedValue::cover(self, key)
    }
}

impl Serialize for AnnotatedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_annotations_not_serialized() {
        let mut row = AnnotatedValue::new(json!({"name": "Bob"}));
        row.set_attachment("meta", json!({"id": "u1"}));
        row.set_cover("name", json!("Bob"));

        let out = serde_json::to_value(&row).unwrap();
        assert_eq!(out, json!({"name": "Bob"}));
    }

    #[test]
    fn test_attachment_set_and_remove() {
        let mut row = AnnotatedValue::new(json!(1));
        assert!(row.attachment("projection").is_none());

        row.set_attachment("projection", json!({"x": 1}));
        assert_eq!(row.attachment("projection"), Some(&json!({"x": 1})));

        assert_eq!(row.remove_attachment("projection"), Some(json!({"x": 1})));
        assert!(row.attachment("projection").is_none());
    }

    #[test]
    fn test_covers_keep_declaration_order() {
        let mut row = AnnotatedValue::new(json!({}));
        row.set_cover("b", json!(1));
        row.set_cover("a", json!(2));
        row.set_cover("b", json!(3));

        let keys: Vec<&str> = row.covers().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(row.cover("b"), Some(&json!(3)));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut row = AnnotatedValue::new(json!({"n": 1}));
        row.set_attachment("meta", json!({"id": "k"}));

        let mut copy = row.clone();
        copy.set_attachment("meta", json!({"id": "other"}));
        copy.scope_mut().set_field("n", json!(2));

        assert_eq!(row.attachment("meta"), Some(&json!({"id": "k"})));
        assert_eq!(row.value(), &json!({"n": 1}));
    }

    #[test]
    fn test_into_value() {
        let mut row = AnnotatedValue::new(json!([1, 2]));
        row.set_attachment("meta", json!(null));
        assert_eq!(row.into_value(), json!([1, 2]));
    }
}
