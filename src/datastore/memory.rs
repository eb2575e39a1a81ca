//! In-memory datastore
//!
//! Ordered secondary indexes over JSON documents, loaded from a data
//! definition:
//!
//! ```json
//! {"keyspaces": [{
//!     "name": "users",
//!     "documents": {"u1": {"age": 35}, "u2": {"age": 20}},
//!     "indexes": [{"name": "by_age", "keys": ["age"]}]
//! }]}
//! ```
//!
//! Entries are sorted by collated index key, then primary key. A document
//! missing the leading key is not indexed.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::{
    Datastore, DatastoreError, DatastoreResult, Index, IndexConnection, IndexEntry, ResolvedSpan,
    ScanConsistency,
};
use crate::plan::DEFAULT_NAMESPACE;
use crate::timestamp::ScanVector;
use crate::value::{collate_keys, path_get};

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    /// Dotted field paths, leading key first
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyspaceDefinition {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    /// Documents by primary key
    #[serde(default)]
    pub documents: Map<String, Value>,
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
}

/// Contents of a data file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataDefinition {
    #[serde(default)]
    pub keyspaces: Vec<KeyspaceDefinition>,
}

enum SpanPosition {
    Below,
    Within,
    Above,
}

fn prefix<'a>(key: &'a [Value], len: usize) -> &'a [Value] {
    &key[..len.min(key.len())]
}

fn span_position(span: &ResolvedSpan, key: &[Value]) -> SpanPosition {
    if let Some(seek) = &span.seek {
        return match collate_keys(prefix(key, seek.len()), seek) {
            CmpOrdering::Less => SpanPosition::Below,
            CmpOrdering::Equal => SpanPosition::Within,
            CmpOrdering::Greater => SpanPosition::Above,
        };
    }

    if !span.low.is_empty() {
        match collate_keys(prefix(key, span.low.len()), &span.low) {
            CmpOrdering::Less => return SpanPosition::Below,
            CmpOrdering::Equal if !span.inclusion.includes_low() => return SpanPosition::Below,
            _ => {}
        }
    }

    if !span.high.is_empty() {
        match collate_keys(prefix(key, span.high.len()), &span.high) {
            CmpOrdering::Greater => return SpanPosition::Above,
            CmpOrdering::Equal if !span.inclusion.includes_high() => return SpanPosition::Above,
            _ => {}
        }
    }

    SpanPosition::Within
}

/// Ordered secondary index held in memory
#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    keys: Vec<String>,
    entries: Vec<IndexEntry>,
    /// Number of documents applied
    sequence: u64,
    dropped: AtomicBool,
}

impl MemoryIndex {
    /// Indexes `documents` on the given key paths.
    pub fn build<'a, I>(name: &str, keys: &[String], documents: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let paths: Vec<Vec<&str>> = keys.iter().map(|k| k.split('.').collect()).collect();
        let mut entries = Vec::new();
        let mut sequence = 0;

        for (primary_key, document) in documents {
            sequence += 1;
            let Some(leading) = paths.first().and_then(|p| path_get(document, p)) else {
                continue;
            };
            let mut entry_key = Vec::with_capacity(paths.len());
            entry_key.push(leading.clone());
            for path in paths.iter().skip(1) {
                entry_key.push(path_get(document, path).cloned().unwrap_or(Value::Null));
            }
            entries.push(IndexEntry {
                entry_key,
                primary_key: primary_key.clone(),
            });
        }

        entries.sort_by(|a, b| {
            collate_keys(&a.entry_key, &b.entry_key)
                .then_with(|| a.primary_key.cmp(&b.primary_key))
        });

        Self {
            name: name.to_string(),
            keys: keys.to_vec(),
            entries,
            sequence,
            dropped: AtomicBool::new(false),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    fn check_vector(&self, vector: &ScanVector) -> DatastoreResult<()> {
        let required = vector.max_value();
        if required > self.sequence {
            return Err(DatastoreError::VectorNotSatisfied {
                index: self.name.clone(),
                required,
                indexed: self.sequence,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Index for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scan(
        &self,
        _request_id: Uuid,
        span: ResolvedSpan,
        distinct: bool,
        limit: Option<usize>,
        consistency: ScanConsistency,
        vector: Option<ScanVector>,
        conn: IndexConnection,
    ) {
        if self.is_dropped() {
            conn.error(DatastoreError::IndexDropped(self.name.clone()));
            return;
        }
        if consistency != ScanConsistency::NotBounded {
            if let Some(vector) = &vector {
                if let Err(e) = self.check_vector(vector) {
                    conn.error(e);
                    return;
                }
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut sent = 0usize;
        for entry in &self.entries {
            if limit.is_some_and(|limit| sent >= limit) || conn.is_stopped() {
                break;
            }
            match span_position(&span, &entry.entry_key) {
                SpanPosition::Below => continue,
                SpanPosition::Above => break,
                SpanPosition::Within => {}
            }
            if distinct && !seen.insert(entry.primary_key.as_str()) {
                continue;
            }
            if !conn.send_entry(entry.clone()).await {
                break;
            }
            sent += 1;
        }
    }

    async fn drop_index(&self) -> DatastoreResult<()> {
        if self.dropped.swap(true, Ordering::AcqRel) {
            return Err(DatastoreError::IndexDropped(self.name.clone()));
        }
        Ok(())
    }
}

/// Index registry keyed by `namespace:keyspace`
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    indexes: RwLock<HashMap<String, HashMap<String, Arc<MemoryIndex>>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every keyspace and index in a data definition.
    pub fn from_definition(definition: &DataDefinition) -> DatastoreResult<Self> {
        let store = Self::new();
        for keyspace in &definition.keyspaces {
            for index in &keyspace.indexes {
                if index.keys.is_empty() {
                    return Err(DatastoreError::InvalidData(format!(
                        "index {} on {} has no keys",
                        index.name, keyspace.name
                    )));
                }
                if store
                    .memory_index(&keyspace.namespace, &keyspace.name, &index.name)
                    .is_some()
                {
                    return Err(DatastoreError::InvalidData(format!(
                        "duplicate index {} on {}",
                        index.name, keyspace.name
                    )));
                }
                let built = MemoryIndex::build(&index.name, &index.keys, &keyspace.documents);
                store.add_index(&keyspace.namespace, &keyspace.name, built);
            }
        }
        Ok(store)
    }

    /// Parses and builds a data definition from JSON.
    pub fn from_json(value: Value) -> DatastoreResult<Self> {
        let definition: DataDefinition = serde_json::from_value(value)
            .map_err(|e| DatastoreError::InvalidData(e.to_string()))?;
        Self::from_definition(&definition)
    }

    pub fn add_index(&self, namespace: &str, keyspace: &str, index: MemoryIndex) -> Arc<MemoryIndex> {
        let index = Arc::new(index);
        self.indexes
            .write()
            .entry(format!("{}:{}", namespace, keyspace))
            .or_default()
            .insert(index.name.clone(), Arc::clone(&index));
        index
    }

    /// Looks up an index, dropped or not.
    pub fn memory_index(&self, namespace: &str, keyspace: &str, name: &str) -> Option<Arc<MemoryIndex>> {
        self.indexes
            .read()
            .get(&format!("{}:{}", namespace, keyspace))
            .and_then(|indexes| indexes.get(name))
            .cloned()
    }
}

impl Datastore for MemoryDatastore {
    fn index(&self, namespace: &str, keyspace: &str, name: &str) -> Option<Arc<dyn Index>> {
        self.memory_index(namespace, keyspace, name)
            .filter(|index| !index.is_dropped())
            .map(|index| index as Arc<dyn Index>)
    }
}
