//! Authorize: privilege gate in front of a subtree

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{operator_links, Base, Operator, RowSink};
use super::context::Context;
use super::errors::ExecutionError;
use crate::plan;
use crate::value::ParentValue;

pub struct Authorize {
    base: Base,
    plan: Arc<plan::Authorize>,
    child: Box<dyn Operator>,
}

impl Authorize {
    pub fn new(plan: Arc<plan::Authorize>, child: Box<dyn Operator>) -> Self {
        Self {
            base: Base::new(),
            plan,
            child,
        }
    }
}

#[async_trait]
impl Operator for Authorize {
    fn name(&self) -> &'static str {
        "Authorize"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new(Arc::clone(&self.plan), self.child.copy()))
    }

    async fn run_once(
        &mut self,
        context: &Arc<Context>,
        parent: &ParentValue,
        output: &mut dyn RowSink,
    ) {
        if !self.base.begin_once(self.name()) {
            return;
        }

        if let Err(reason) = context.authorizer().authorize(&self.plan.privileges) {
            context.error(ExecutionError::Unauthorized(reason));
            return;
        }

        self.child.set_input(self.base.take_input());
        self.child.run_once(context, parent, output).await;
        self.base.set_input(self.child.take_input());
    }
}
