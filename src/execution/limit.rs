//! Limit: forwards at most `k` rows, then stops its input

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::base::{operator_links, run_consumer, Base, Consumer, Operator, RowSink};
use super::context::Context;
use super::errors::ExecutionError;
use crate::plan;
use crate::value::{AnnotatedValue, ParentValue};

/// Reads a row count: a non-negative whole number.
pub(crate) fn whole_count(value: &Value) -> Option<usize> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(n) = number.as_u64() {
        return usize::try_from(n).ok();
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Some(f as usize),
        _ => None,
    }
}

pub struct Limit {
    base: Base,
    plan: Arc<plan::Limit>,
    remaining: usize,
}

impl Limit {
    pub fn new(plan: Arc<plan::Limit>) -> Self {
        Self {
            base: Base::new(),
            plan,
            remaining: 0,
        }
    }
}

#[async_trait]
impl Operator for Limit {
    fn name(&self) -> &'static str {
        "Limit"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new(Arc::clone(&self.plan)))
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
impl Consumer for Limit {
    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    async fn before_items(&mut self, context: &Arc<Context>, parent: &ParentValue) -> bool {
        let expr = &self.plan.expr;
        let value = match expr.evaluate(parent, context.as_ref()) {
            Ok(value) => value,
            Err(e) => {
                context.error(ExecutionError::evaluation(expr, e));
                return false;
            }
        };

        match whole_count(&value) {
            Some(count) => {
                self.remaining = count;
                count > 0
            }
            None => {
                context.error(ExecutionError::InvalidValue(format!(
                    "Invalid LIMIT value {}",
                    value
                )));
                false
            }
        }
    }

    async fn process_item(
        &mut self,
        item: AnnotatedValue,
        context: &Arc<Context>,
        output: &mut dyn RowSink,
    ) -> bool {
        if self.remaining == 0 {
            item.release();
            return false;
        }
        self.remaining -= 1;
        output.item(item, context).await && self.remaining > 0
    }
}
