//! Projection stages
//!
//! `InitialProject` evaluates the result terms of each row and parks the
//! outcome in the row's `"projection"` attachment. `FinalProject` swaps
//! the attachment in as the emitted document. Stages between the two
//! still see the original row.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::base::{operator_links, run_consumer, Base, Consumer, Operator, RowSink};
use super::context::Context;
use super::errors::ExecutionError;
use crate::plan;
use crate::value::{AnnotatedValue, ParentValue};

/// Attachment carrying a row's projected document
pub const PROJECTION: &str = "projection";

pub struct InitialProject {
    base: Base,
    plan: Arc<plan::InitialProject>,
}

impl InitialProject {
    pub fn new(plan: Arc<plan::InitialProject>) -> Self {
        Self {
            base: Base::new(),
            plan,
        }
    }

    fn project(&self, item: &AnnotatedValue, context: &Context) -> Result<Value, ExecutionError> {
        let terms = &self.plan.terms;
        if self.plan.raw {
            return match terms.first() {
                Some(term) => term
                    .expr
                    .evaluate(item, context)
                    .map_err(|e| ExecutionError::evaluation(&term.expr, e)),
                None => Ok(Value::Null),
            };
        }

        let mut projected = Map::with_capacity(terms.len());
        for (position, term) in terms.iter().enumerate() {
            let value = term
                .expr
                .evaluate(item, context)
                .map_err(|e| ExecutionError::evaluation(&term.expr, e))?;
            projected.insert(term.output_name(position), value);
        }
        Ok(Value::Object(projected))
    }
}

#[async_trait]
impl Operator for InitialProject {
    fn name(&self) -> &'static str {
        "InitialProject"
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
impl Consumer for InitialProject {
    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    async fn process_item(
        &mut self,
        mut item: AnnotatedValue,
        context: &Arc<Context>,
        output: &mut dyn RowSink,
    ) -> bool {
        match self.project(&item, context) {
            Ok(projected) => {
                item.set_attachment(PROJECTION, projected);
                output.item(item, context).await
            }
            Err(e) => {
                context.error(e);
                false
            }
        }
    }
}

/// Emits each row's projection in place of the row
#[derive(Default)]
pub struct FinalProject {
    base: Base,
}

impl FinalProject {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Operator for FinalProject {
    fn name(&self) -> &'static str {
        "FinalProject"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new())
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
impl Consumer for FinalProject {
    fn base_mut(&mut self) -> &mut Base {
        &mut self.base
    }

    async fn process_item(
        &mut self,
        mut item: AnnotatedValue,
        context: &Arc<Context>,
        output: &mut dyn RowSink,
    ) -> bool {
        match item.remove_attachment(PROJECTION) {
            Some(projected) => {
                item.release();
                output.item(AnnotatedValue::new(projected), context).await
            }
            None => output.item(item, context).await,
        }
    }
}
