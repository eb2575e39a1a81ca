//! Lexical scope wrappers

use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::Lookup;

static NULL: Value = Value::Null;

/// Enclosing scope handed to an operator run.
///
/// Cheap to clone: the document is shared.
#[derive(Debug, Clone, Default)]
pub struct ParentValue(Option<Arc<Value>>);

impl ParentValue {
    /// No enclosing scope
    pub fn none() -> Self {
        Self(None)
    }

    /// Enclosing scope over a document
    pub fn new(value: Value) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn shared(&self) -> Option<&Arc<Value>> {
        self.0.as_ref()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl Lookup for ParentValue {
    fn as_value(&self) -> &Value {
        self.0.as_deref().unwrap_or(&NULL)
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.as_value().field(name)
    }
}

/// A value with its own bindings and a fallback parent document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeValue {
    value: Value,
    parent: Option<Arc<Value>>,
}

impl ScopeValue {
    /// Binds `value` under the given parent scope.
    pub fn new(value: Value, parent: &ParentValue) -> Self {
        Self {
            value,
            parent: parent.shared().cloned(),
        }
    }

    /// A scope with no parent.
    pub fn plain(value: Value) -> Self {
        Self {
            value,
            parent: None,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn parent(&self) -> Option<&Value> {
        self.parent.as_deref()
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Sets a top-level field; a non-object value becomes an object.
    pub fn set_field(&mut self, name: impl Into<String>, field: Value) {
        set_object_field(&mut self.value, name.into(), field);
    }
}

fn set_object_field(target: &mut Value, name: String, field: Value) {
    match target {
        Value::Object(map) => {
            map.insert(name, field);
        }
        other => {
            let mut map = Map::new();
            map.insert(name, field);
            *other = Value::Object(map);
        }
    }
}

impl Lookup for ScopeValue {
    fn as_value(&self) -> &Value {
        &self.value
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.value
            .field(name)
            .or_else(|| self.parent.as_deref().and_then(|p| p.field(name)))
    }
}

impl Serialize for ScopeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

/// Variable bindings layered over a borrowed item.
///
/// Attachments and covers are read from the parent chain, so stacking
/// scopes never duplicates the annotation maps.
pub struct AnnotatedScopeValue<'a> {
    value: Value,
    parent: &'a dyn Lookup,
}

impl<'a> AnnotatedScopeValue<'a> {
    pub fn new(bindings: Value, parent: &'a dyn Lookup) -> Self {
        Self {
            value: bindings,
            parent,
        }
    }

    /// Binds a variable in this scope.
    pub fn set_field(&mut self, name: impl Into<String>, field: Value) {
        set_object_field(&mut self.value, name.into(), field);
    }
}

impl Lookup for AnnotatedScopeValue<'_> {
    fn as_value(&self) -> &Value {
        &self.value
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.value.field(name).or_else(|| self.parent.field(name))
    }

    fn attachment(&self, key: &str) -> Option<&Value> {
        self.parent.attachment(key)
    }

    /// A variable bound here shadows covers keyed under its name.
    fn cover(&self, key: &str) -> Option<&Value> {
        let head = key.split_once('.').map_or(key, |(head, _)| head);
        if self.value.field(head).is_some() {
            return None;
        }
        self.parent.cover(key)
    }
}
