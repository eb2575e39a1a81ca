//! Filter: forwards rows whose condition is true

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{operator_links, run_consumer, Base, Consumer, Operator, RowSink};
use super::context::Context;
use super::errors::ExecutionError;
use crate::observability::{Event, Logger, Severity};
use crate::plan;
use crate::value::{truth, AnnotatedValue, ParentValue};

pub struct Filter {
    base: Base,
    plan: Arc<plan::Filter>,
}

impl Filter {
    pub fn new(plan: Arc<plan::Filter>) -> Self {
        Self {
            base: Base::new(),
            plan,
        }
    }
}

#[async_trait]
impl Operator for Filter {
    fn name(&self) -> &'static str {
        "Filter"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.copy(),
            plan: Arc::clone(&self.plan),
        })
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
impl Consumer for Filter {
    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    async fn process_item(
        &mut self,
        item: AnnotatedValue,
        context: &Arc<Context>,
        output: &mut dyn RowSink,
    ) -> bool {
        let condition = &self.plan.condition;
        match condition.evaluate(&item, context.as_ref()) {
            Ok(result) if truth(&result) => output.item(item, context).await,
            Ok(result) => {
                if Logger::enabled(Severity::Trace) {
                    let text = condition.text();
                    let value = item.value().to_string();
                    let outcome = result.to_string();
                    Logger::event(
                        Severity::Trace,
                        Event::FilterDropped,
                        &[
                            ("condition", text.as_str()),
                            ("result", outcome.as_str()),
                            ("value", value.as_str()),
                        ],
                    );
                }
                item.release();
                true
            }
            Err(e) => {
                context.error(ExecutionError::evaluation(condition, e));
                false
            }
        }
    }
}
