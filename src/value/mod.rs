//! Row values for the execution pipeline
//!
//! Documents are plain `serde_json::Value`s. Operators wrap them in
//! [`AnnotatedValue`] to carry pipeline-internal side data:
//!
//! - attachments: named side values (`"meta"`, `"projection"`)
//! - covers: pre-evaluated covering-index values, in declaration order
//!
//! Neither is ever part of the serialized row.
//!
//! Lexical scoping is layered on top:
//!
//! - [`ScopeValue`] owns its bindings and falls back to a shared parent
//! - [`AnnotatedScopeValue`] binds variables over a borrowed item and
//!   delegates attachment/cover reads to the nearest annotated ancestor

mod annotated;
mod collate;
mod pool;
mod scope;

pub use annotated::{AnnotatedValue, Covers};
pub use collate::{collate, collate_keys, truth};
pub use pool::{value_pool, ValuePool};
pub use scope::{AnnotatedScopeValue, ParentValue, ScopeValue};
pub use serde_json::Value;

/// Read view over anything an expression can be evaluated against.
///
/// Identifier resolution walks enclosing scopes; attachment and cover
/// reads reach the nearest annotated ancestor.
pub trait Lookup {
    /// The value this item stands for.
    fn as_value(&self) -> &Value;

    /// Resolves a top-level identifier.
    fn field(&self, name: &str) -> Option<&Value>;

    /// Returns a pipeline attachment, if any.
    fn attachment(&self, _key: &str) -> Option<&Value> {
        None
    }

    /// Returns a covering-index value keyed by expression text, if any.
    fn cover(&self, _key: &str) -> Option<&Value> {
        None
    }
}

impl Lookup for Value {
    fn as_value(&self) -> &Value {
        self
    }

    fn field(&self, name: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(name))
    }
}

/// Walks a field path through nested objects.
pub fn path_get<'a, S: AsRef<str>>(value: &'a Value, path: &[S]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, segment| current.get(segment.as_ref()))
}
