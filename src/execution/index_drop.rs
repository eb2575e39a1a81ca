//! DropIndex: DDL stage removing a secondary index

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{operator_links, run_consumer, Base, Consumer, Operator, RowSink};
use super::context::Context;
use super::errors::ExecutionError;
use crate::datastore::Index;
use crate::observability::{Event, Logger, Severity};
use crate::plan;
use crate::value::{AnnotatedValue, ParentValue};

pub struct DropIndex {
    base: Base,
    plan: Arc<plan::DropIndex>,
    index: Arc<dyn Index>,
}

impl DropIndex {
    pub fn new(plan: Arc<plan::DropIndex>, index: Arc<dyn Index>) -> Self {
        Self {
            base: Base::new(),
            plan,
            index,
        }
    }
}

#[async_trait]
impl Operator for DropIndex {
    fn name(&self) -> &'static str {
        "DropIndex"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new(Arc::clone(&self.plan), Arc::clone(&self.index)))
    }

    fn readonly(&self) -> bool {
        false
    }

    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        parent: &ParentValue,
        output: &mut dyn RowSink,
    ) {
        run_consumer(self, context, parent, output).await
    }
}

#[async_trait]
impl Consumer for DropIndex {
    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    // All work happens here; the input is never pulled.
    async fn before_items(&mut self, context: &Arc<Context>, _parent: &ParentValue) -> bool {
        match self.index.drop_index().await {
            Ok(()) => {
                let keyspace = self.plan.term.target();
                Logger::event(
                    Severity::Info,
                    Event::IndexDropped,
                    &[("index", self.index.name()), ("keyspace", keyspace.as_str())],
                );
            }
            Err(e) => context.error(ExecutionError::Backend {
                index: self.plan.index.clone(),
                message: e.to_string(),
            }),
        }
        false
    }

    async fn process_item(
        &mut self,
        item: AnnotatedValue,
        _context: &Arc<Context>,
        _output: &mut dyn RowSink,
    ) -> bool {
        item.release();
        false
    }
}
