//! Shared fixtures for operator unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::base::{operator_links, Base, Operator, RowSink};
use super::context::{Context, ContextBuilder};
use crate::datastore::MemoryDatastore;
use crate::value::{AnnotatedValue, ParentValue};

pub(crate) fn context() -> Arc<Context> {
    ContextBuilder::new(Arc::new(MemoryDatastore::new())).build()
}

/// Source emitting fixed rows; counts rows handed downstream
pub(crate) struct VecSource {
    base: Base,
    rows: Vec<Value>,
    delivered: Arc<AtomicUsize>,
}

impl VecSource {
    pub(crate) fn new(rows: Vec<Value>) -> Self {
        Self {
            base: Base::new(),
            rows,
            delivered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn boxed(rows: Vec<Value>) -> Box<dyn Operator> {
        Box::new(Self::new(rows))
    }

    pub(crate) fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.delivered)
    }
}

#[async_trait]
impl Operator for VecSource {
    fn name(&self) -> &'static str {
        "VecSource"
    }

    operator_links!();

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

/// Sink collecting every row; optionally stops after `stop_after` rows
#[derive(Default)]
pub(crate) struct CollectSink {
    pub(crate) items: Vec<AnnotatedValue>,
    pub(crate) stop_after: Option<usize>,
}

impl CollectSink {
    pub(crate) fn values(&self) -> Vec<Value> {
        self.items.iter().map(|i| i.value().clone()).collect()
    }
}

#[async_trait]
impl RowSink for CollectSink {
    async fn item(&mut self, item: AnnotatedValue, _context: &Arc<Context>) -> bool {
        self.items.push(item);
        self.stop_after.map_or(true, |n| self.items.len() < n)
    }
}
