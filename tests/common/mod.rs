//! Shared helpers for the integration suites

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aeroquery::datastore::MemoryDatastore;
use aeroquery::execution::{Base, Context, ContextBuilder, Operator, RowSink};
use aeroquery::value::{AnnotatedValue, ParentValue};
use async_trait::async_trait;
use serde_json::{json, Value};

// =============================================================================
// Contexts and data
// =============================================================================

pub fn empty_store() -> Arc<MemoryDatastore> {
    Arc::new(MemoryDatastore::new())
}

pub fn context() -> Arc<Context> {
    ContextBuilder::new(empty_store()).build()
}

/// `count` people in keyspace `default:people`, `age = i % 100`,
/// indexed by `by_age` on `[age, city]`.
pub fn people(count: usize) -> Arc<MemoryDatastore> {
    let mut documents = serde_json::Map::new();
    for i in 0..count {
        documents.insert(
            format!("p{:04}", i),
            json!({"age": i % 100, "city": if i % 2 == 0 { "oslo" } else { "rome" }}),
        );
    }
    Arc::new(
        MemoryDatastore::from_json(json!({
            "keyspaces": [{
                "name": "people",
                "documents": documents,
                "indexes": [
                    {"name": "by_age", "keys": ["age", "city"]}
                ]
            }]
        }))
        .unwrap(),
    )
}

// =============================================================================
// Row source and sink
// =============================================================================

/// Source pushing fixed rows; counts rows handed downstream
pub struct Rows {
    base: Base,
    rows: Vec<Value>,
    delivered: Arc<AtomicUsize>,
}

impl Rows {
    pub fn new(rows: Vec<Value>) -> Self {
        Self {
            base: Base::new(),
            rows,
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// `{"n": 1} .. {"n": count}`
    pub fn numbered(count: usize) -> Self {
        Self::new((1..=count).map(|n| json!({ "n": n })).collect())
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.delivered)
    }
}

#[async_trait]
impl Operator for Rows {
    fn name(&self) -> &'static str {
        "Rows"
    }

    fn input(&self) -> Option<&dyn Operator> {
        self.base.input()
    }

    fn set_input(&mut self, input: Option<Box<dyn Operator>>) {
        self.base.set_input(input);
    }

    fn take_input(&mut self) -> Option<Box<dyn Operator>> {
        self.base.take_input()
    }

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.copy(),
            rows: self.rows.clone(),
            delivered: Arc::clone(&self.delivered),
        })
    }

    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        _parent: &ParentValue,
        output: &mut dyn RowSink,
    ) {
        if !self.base.begin_once(self.name()) {
            return;
        }
        for row in std::mem::take(&mut self.rows) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            if !output.item(AnnotatedValue::new(row), context).await {
                break;
            }
        }
    }
}

/// Sink keeping every row; stops after `stop_after` rows when set
#[derive(Default)]
pub struct Collect {
    pub items: Vec<AnnotatedValue>,
    pub stop_after: Option<usize>,
}

impl Collect {
    pub fn stopping_after(n: usize) -> Self {
        Self {
            items: Vec::new(),
            stop_after: Some(n),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        self.items.iter().map(|i| i.value().clone()).collect()
    }
}

#[async_trait]
impl RowSink for Collect {
    async fn item(&mut self, item: AnnotatedValue, _context: &Arc<Context>) -> bool {
        self.items.push(item);
        self.stop_after.map_or(true, |n| self.items.len() < n)
    }
}

/// Feeds `input` into `op` and runs it into `sink`.
pub async fn run_over(
    mut op: Box<dyn Operator>,
    input: Rows,
    context: &Arc<Context>,
    sink: &mut Collect,
) {
    op.set_input(Some(Box::new(input)));
    op.run_once(context, &ParentValue::none(), sink).await;
}

/// Sorted `n` fields of `rows`
pub fn sorted_numbers(rows: &[Value]) -> Vec<i64> {
    let mut numbers: Vec<i64> = rows.iter().filter_map(|r| r["n"].as_i64()).collect();
    numbers.sort_unstable();
    numbers
}
