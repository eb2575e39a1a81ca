//! Sequence: runs children as one linear chain
//!
//! Children are linked input-to-input at run time: the sequence's own
//! input feeds the first child, each child feeds the next, and only the
//! tail is run. The links are unwound afterwards so the sequence owns its
//! children again.

use std::sync::Arc;

use async_trait::async_trait;

use super::base::{operator_links, Base, Operator, RowSink};
use super::context::Context;
use crate::plan;
use crate::value::ParentValue;

pub struct Sequence {
    base: Base,
    plan: Arc<plan::Sequence>,
    children: Vec<Box<dyn Operator>>,
}

impl Sequence {
    pub fn new(plan: Arc<plan::Sequence>, children: Vec<Box<dyn Operator>>) -> Self {
        Self {
            base: Base::new(),
            plan,
            children,
        }
    }

    pub fn children(&self) -> &[Box<dyn Operator>] {
        &self.children
    }
}

#[async_trait]
impl Operator for Sequence {
    fn name(&self) -> &'static str {
        "Sequence"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new(
            Arc::clone(&self.plan),
            self.children.iter().map(|child| child.copy()).collect(),
        ))
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

        let links = self.children.len();
        let mut chain = self.base.take_input();
        for mut child in self.children.drain(..) {
            child.set_input(chain);
            chain = Some(child);
        }

        if let Some(tail) = chain.as_mut() {
            tail.run_once(context, parent, output).await;
        }

        let mut children = Vec::with_capacity(links);
        for _ in 0..links {
            let Some(mut child) = chain.take() else {
                break;
            };
            chain = child.take_input();
            children.push(child);
        }
        children.reverse();
        self.children = children;
        self.base.set_input(chain);
    }
}
