//! Single-row sources: DummyScan and Prepare

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::base::{operator_links, Base, Operator, RowSink};
use super::context::Context;
use crate::plan;
use crate::value::{AnnotatedValue, ParentValue, ScopeValue};

/// Emits one empty row bound to the parent scope
///
/// Source for statements without a FROM clause.
#[derive(Default)]
pub struct DummyScan {
    base: Base,
}

impl DummyScan {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Operator for DummyScan {
    fn name(&self) -> &'static str {
        "DummyScan"
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
        if !self.base.begin_once(self.name()) {
            return;
        }
        let row = AnnotatedValue::with_scope(ScopeValue::new(json!({}), parent));
        output.item(row, context).await;
    }
}

/// Emits the prepared statement as a single row
pub struct Prepare {
    base: Base,
    plan: Arc<plan::Prepare>,
}

impl Prepare {
    pub fn new(plan: Arc<plan::Prepare>) -> Self {
        Self {
            base: Base::new(),
            plan,
        }
    }

    pub fn prepared(&self) -> &Value {
        &self.plan.prepared
    }
}

#[async_trait]
impl Operator for Prepare {
    fn name(&self) -> &'static str {
        "Prepare"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self::new(Arc::clone(&self.plan)))
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
        let row = AnnotatedValue::new(self.plan.prepared.clone());
        output.item(row, context).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::test_support::{context, CollectSink};
    use crate::expression::Expr;

    #[tokio::test]
    async fn test_dummy_scan_binds_parent() {
        let ctx = context();
        let parent = ParentValue::new(json!({"outer": 7}));
        let mut scan = DummyScan::new();

        let mut sink = CollectSink::default();
        scan.run_once(&ctx, &parent, &mut sink).await;

        assert_eq!(sink.values(), vec![json!({})]);
        let outer = Expr::field("outer")
            .evaluate(&sink.items[0], ctx.as_ref())
            .unwrap();
        assert_eq!(outer, json!(7));
    }

    #[tokio::test]
    async fn test_prepare_emits_statement_once() {
        let ctx = context();
        let statement = json!({"name": "p1", "text": "SELECT 1"});
        let mut prepare = Prepare::new(Arc::new(plan::Prepare {
            prepared: statement.clone(),
        }));

        let mut sink = CollectSink::default();
        prepare.run_once(&ctx, &ParentValue::none(), &mut sink).await;
        prepare.run_once(&ctx, &ParentValue::none(), &mut sink).await;
        assert_eq!(sink.values(), vec![statement]);
    }
}
