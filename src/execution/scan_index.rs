//! IndexScan: concurrent span scans merged into one output
//!
//! Each span runs in its own task:
//!
//! 1. span bounds are evaluated once, with parameters but no row in scope
//! 2. the index streams entries into an [`IndexConnection`]
//! 3. entries become rows (`meta.id` attached, covers filled when the
//!    scan is covering) and are batched into the shared queue
//!
//! The operator drains the shared queue into its output while the span
//! tasks run. A span that fails to evaluate or scan reports the error and
//! ends; its siblings carry on.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::base::{operator_links, Base, Operator, RowSink};
use super::batch::{batch_queue_capacity, pipeline_cap, Batcher, PooledBatch};
use super::context::Context;
use super::errors::{ExecutionError, ExecutionResult};
use super::limit::whole_count;
use super::phase::Phase;
use crate::datastore::{Index, IndexConnection, IndexEntry, ResolvedSpan, ScanConsistency};
use crate::expression::Expr;
use crate::plan;
use crate::value::{AnnotatedValue, ParentValue, ScopeValue};

/// Documents a span task counts before publishing to the phase stats
const PHASE_FLUSH_INTERVAL: u64 = 256;

/// Cover keys of a covering scan, in declaration order
#[derive(Debug, Default)]
struct CoverLayout {
    covers: Vec<String>,
    filter_covers: Vec<(String, Value)>,
}

impl CoverLayout {
    fn new(plan: &plan::IndexScan) -> Self {
        Self {
            covers: plan.covers.iter().map(Expr::text).collect(),
            filter_covers: plan
                .filter_covers
                .iter()
                .map(|fc| (fc.cover.text(), fc.value.clone()))
                .collect(),
        }
    }
}

pub struct IndexScan {
    base: Base,
    plan: Arc<plan::IndexScan>,
    index: Arc<dyn Index>,
    layout: Arc<CoverLayout>,
}

impl IndexScan {
    pub fn new(plan: Arc<plan::IndexScan>, index: Arc<dyn Index>) -> Self {
        let layout = Arc::new(CoverLayout::new(&plan));
        Self {
            base: Base::new(),
            plan,
            index,
            layout,
        }
    }

    /// Limit pushed to the index, if it is safe to push.
    fn effective_limit(
        &self,
        context: &Context,
        parent: &ParentValue,
    ) -> ExecutionResult<Option<usize>> {
        let Some(expr) = &self.plan.limit else {
            return Ok(None);
        };
        if context.scan_consistency() != ScanConsistency::NotBounded && !self.plan.is_covering() {
            return Ok(None);
        }

        let value = expr
            .evaluate(parent, context)
            .map_err(|e| ExecutionError::evaluation(expr, e))?;
        match whole_count(&value) {
            Some(limit) => Ok(Some(limit)),
            None => Err(ExecutionError::InvalidValue(format!(
                "Invalid pushed-down limit {}",
                value
            ))),
        }
    }
}

#[async_trait]
impl Operator for IndexScan {
    fn name(&self) -> &'static str {
        "IndexScan"
    }

    operator_links!();

    fn copy(&self) -> Box<dyn Operator> {
        Box::new(Self {
            base: self.base.copy(),
            plan: Arc::clone(&self.plan),
            index: Arc::clone(&self.index),
            layout: Arc::clone(&self.layout),
        })
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
        context.add_phase_operator(Phase::IndexScan);

        let limit = match self.effective_limit(context, parent) {
            Ok(limit) => limit,
            Err(e) => {
                context.error(e);
                return;
            }
        };

        let (tx, rx) = mpsc::channel::<PooledBatch>(batch_queue_capacity());
        let tasks: Vec<_> = self
            .plan
            .spans
            .iter()
            .map(|span| {
                let scan = SpanScan {
                    context: Arc::clone(context),
                    parent: parent.clone(),
                    plan: Arc::clone(&self.plan),
                    index: Arc::clone(&self.index),
                    layout: Arc::clone(&self.layout),
                    limit,
                    sender: tx.clone(),
                };
                tokio::spawn(scan.run(span.clone()))
            })
            .collect();
        drop(tx);

        let merge = async {
            let mut rx = rx;
            'drain: while let Some(mut batch) = rx.recv().await {
                for item in batch.drain() {
                    if !output.item(item, context).await {
                        break 'drain;
                    }
                }
            }
        };

        let completion = async {
            for finished in join_all(tasks).await {
                if let Err(e) = finished {
                    context.recover(e);
                }
            }
        };

        tokio::join!(merge, completion);
    }
}

/// One span's scan, owned by its task
struct SpanScan {
    context: Arc<Context>,
    parent: ParentValue,
    plan: Arc<plan::IndexScan>,
    index: Arc<dyn Index>,
    layout: Arc<CoverLayout>,
    limit: Option<usize>,
    sender: mpsc::Sender<PooledBatch>,
}

impl SpanScan {
    async fn run(self, span: plan::Span) {
        let resolved = match resolve_span(&span, &self.context) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.context.error(e);
                return;
            }
        };

        let term = &self.plan.term;
        let vector = self
            .context
            .vector_source()
            .scan_vector(&term.namespace, &term.keyspace);
        let (conn, entries) =
            IndexConnection::new(Arc::clone(&self.context), self.index.name(), pipeline_cap());

        let producer = self.index.scan(
            self.context.request_id(),
            resolved,
            self.plan.distinct,
            self.limit,
            self.context.scan_consistency(),
            vector,
            conn,
        );
        tokio::join!(producer, self.consume(entries));
    }

    async fn consume(&self, mut entries: mpsc::Receiver<IndexEntry>) {
        let mut batcher = Batcher::new();
        let mut sender = self.sender.clone();
        let mut docs = 0u64;
        let mut accepted = true;

        while let Some(entry) = entries.recv().await {
            docs += 1;
            if docs >= PHASE_FLUSH_INTERVAL {
                self.context.add_phase_count(Phase::IndexScan, docs);
                docs = 0;
            }
            let item = self.annotate(entry);
            if !batcher.enbatch(item, &mut sender, &self.context).await {
                accepted = false;
                break;
            }
        }
        drop(entries);

        if accepted {
            batcher.flush(&mut sender, &self.context).await;
        }
        if docs > 0 {
            self.context.add_phase_count(Phase::IndexScan, docs);
        }
    }

    fn annotate(&self, entry: IndexEntry) -> AnnotatedValue {
        let IndexEntry {
            entry_key,
            primary_key,
        } = entry;

        let mut item = AnnotatedValue::with_scope(ScopeValue::new(json!({}), &self.parent));
        item.set_attachment("meta", json!({ "id": primary_key.as_str() }));

        if self.plan.is_covering() {
            if let Some((key_cover, entry_covers)) = self.layout.covers.split_last() {
                let mut keys = entry_key.into_iter();
                for cover in entry_covers {
                    item.set_cover(cover.as_str(), keys.next().unwrap_or(Value::Null));
                }
                item.set_cover(key_cover.as_str(), Value::String(primary_key));
            }
            for (cover, value) in &self.layout.filter_covers {
                item.set_cover(cover.as_str(), value.clone());
            }
        }
        item
    }
}

/// Field references in a bound see no row and resolve to null.
fn resolve_span(span: &plan::Span, context: &Context) -> ExecutionResult<ResolvedSpan> {
    let evaluate = |exprs: &[Expr]| -> ExecutionResult<Vec<Value>> {
        exprs
            .iter()
            .map(|expr| {
                expr.evaluate(&Value::Null, context)
                    .map_err(|e| ExecutionError::evaluation(expr, e))
            })
            .collect()
    };

    Ok(ResolvedSpan {
        seek: span.seek.as_deref().map(evaluate).transpose()?,
        low: evaluate(&span.range.low)?,
        high: evaluate(&span.range.high)?,
        inclusion: span.range.inclusion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::{Datastore, MemoryDatastore};
    use crate::execution::test_support::CollectSink;
    use crate::execution::ContextBuilder;
    use crate::expression::ArithOp;
    use crate::plan::{FilterCover, Inclusion, KeyspaceTerm, Range, Span};
    use std::collections::HashMap;

    fn store() -> Arc<MemoryDatastore> {
        let documents: serde_json::Map<String, Value> = (0..600)
            .map(|i| (format!("u{:03}", i), json!({"age": i % 100, "name": format!("n{}", i)})))
            .collect();
        let store = MemoryDatastore::from_json(json!({
            "keyspaces": [{
                "name": "users",
                "documents": documents,
                "indexes": [{"name": "by_age", "keys": ["age"]}]
            }]
        }))
        .unwrap();
        Arc::new(store)
    }

    fn range(low: i64, high: i64) -> Span {
        Span {
            seek: None,
            range: Range {
                low: vec![Expr::constant(low)],
                high: vec![Expr::constant(high)],
                inclusion: Inclusion::Both,
            },
        }
    }

    fn scan_plan(spans: Vec<Span>) -> plan::IndexScan {
        plan::IndexScan {
            index: "by_age".into(),
            term: KeyspaceTerm::new("users"),
            spans,
            distinct: false,
            limit: None,
            covers: vec![],
            filter_covers: vec![],
        }
    }

    async fn run(store: &Arc<MemoryDatastore>, plan: plan::IndexScan) -> (Vec<AnnotatedValue>, Arc<Context>) {
        let ctx = ContextBuilder::new(store.clone()).build();
        let index = store.index("default", "users", "by_age").unwrap();
        let mut scan = IndexScan::new(Arc::new(plan), index);
        let mut sink = CollectSink::default();
        scan.run_once(&ctx, &ParentValue::none(), &mut sink).await;
        (sink.items, ctx)
    }

    fn keys(items: &[AnnotatedValue]) -> Vec<String> {
        let mut keys: Vec<String> = items
            .iter()
            .filter_map(|i| i.attachment("meta")?.get("id")?.as_str().map(str::to_string))
            .collect();
        keys.sort();
        keys
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spans_are_merged() {
        let store = store();
        let (items, ctx) = run(&store, scan_plan(vec![range(0, 1), range(98, 99)])).await;

        // 6 documents per age value
        assert_eq!(items.len(), 24);
        assert!(!ctx.has_errors());
        assert!(items.iter().all(|i| i.value() == &json!({})));
        assert!(keys(&items).contains(&"u000".to_string()));
        assert_eq!(ctx.phases().count(Phase::IndexScan), 24);
        assert_eq!(ctx.phases().operators(Phase::IndexScan), 1);
    }

    #[tokio::test]
    async fn test_phase_counts_flush_past_interval() {
        let store = store();
        let (items, ctx) = run(&store, scan_plan(vec![range(0, 99)])).await;
        assert_eq!(items.len(), 600);
        assert_eq!(ctx.phases().count(Phase::IndexScan), 600);
    }

    #[tokio::test]
    async fn test_covering_scan_fills_covers_in_order() {
        let store = store();
        let mut plan = scan_plan(vec![range(42, 42)]);
        plan.covers = vec![Expr::field("age"), Expr::meta_id()];
        plan.filter_covers = vec![FilterCover {
            cover: Expr::field("active"),
            value: json!(true),
        }];
        let (items, ctx) = run(&store, plan).await;

        assert_eq!(items.len(), 6);
        assert!(!ctx.has_errors());
        for item in &items {
            let order: Vec<&str> = item.covers().keys().collect();
            assert_eq!(order, vec!["age", "meta().id", "active"]);
            assert_eq!(item.cover("age"), Some(&json!(42)));
            assert_eq!(
                item.cover("meta().id"),
                item.attachment("meta").and_then(|m| m.get("id"))
            );
        }
    }

    #[tokio::test]
    async fn test_limit_pushdown() {
        let store = store();
        let mut plan = scan_plan(vec![range(0, 99)]);
        plan.limit = Some(Expr::constant(5));
        let (items, _) = run(&store, plan).await;
        assert_eq!(items.len(), 5);
    }

    #[tokio::test]
    async fn test_bad_limit_is_reported() {
        let store = store();
        let mut plan = scan_plan(vec![range(0, 99)]);
        plan.limit = Some(Expr::constant(-3));
        let (items, ctx) = run(&store, plan).await;
        assert!(items.is_empty());
        assert!(matches!(ctx.errors()[0], ExecutionError::InvalidValue(_)));
    }

    #[tokio::test]
    async fn test_failed_span_leaves_siblings_running() {
        let store = store();
        let bad = Span {
            seek: Some(vec![Expr::arith(
                ArithOp::Div,
                Expr::constant(1),
                Expr::constant(0),
            )]),
            range: Range::default(),
        };
        let (items, ctx) = run(&store, scan_plan(vec![bad, range(7, 7)])).await;

        assert_eq!(items.len(), 6);
        let errors = ctx.errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ExecutionError::Evaluation { .. }));
    }

    #[tokio::test]
    async fn test_span_bounds_ignore_parent_row() {
        let store = store();
        let seek = |expr: Expr| Span {
            seek: Some(vec![expr]),
            range: Range::default(),
        };
        let ctx = ContextBuilder::new(store.clone())
            .named_args(HashMap::from([("age".to_string(), json!(42))]))
            .build();
        let parent = ParentValue::new(json!({"age": 42}));

        let index = store.index("default", "users", "by_age").unwrap();
        let plan = scan_plan(vec![seek(Expr::field("age"))]);
        let mut scan = IndexScan::new(Arc::new(plan), index.clone());
        let mut sink = CollectSink::default();
        scan.run_once(&ctx, &parent, &mut sink).await;
        assert!(sink.items.is_empty());

        let plan = scan_plan(vec![seek(Expr::parameter("age"))]);
        let mut scan = IndexScan::new(Arc::new(plan), index);
        let mut sink = CollectSink::default();
        scan.run_once(&ctx, &parent, &mut sink).await;
        assert_eq!(sink.items.len(), 6);
        assert!(!ctx.has_errors());
    }

    #[tokio::test]
    async fn test_stopped_output_ends_scan() {
        let store = store();
        let ctx = ContextBuilder::new(store.clone()).build();
        let index = store.index("default", "users", "by_age").unwrap();
        let mut scan = IndexScan::new(Arc::new(scan_plan(vec![range(0, 99)])), index);

        let mut sink = CollectSink {
            stop_after: Some(3),
            ..Default::default()
        };
        scan.run_once(&ctx, &ParentValue::none(), &mut sink).await;
        assert_eq!(sink.items.len(), 3);
        assert!(!ctx.has_errors());
    }

    #[tokio::test]
    async fn test_dropped_index_reports_backend_error() {
        let store = store();
        let index = store.index("default", "users", "by_age").unwrap();
        index.drop_index().await.unwrap();

        let ctx = ContextBuilder::new(store.clone()).build();
        let mut scan = IndexScan::new(Arc::new(scan_plan(vec![range(0, 99)])), index);
        let mut sink = CollectSink::default();
        scan.run_once(&ctx, &ParentValue::none(), &mut sink).await;

        assert!(sink.items.is_empty());
        assert!(matches!(ctx.errors()[0], ExecutionError::Backend { .. }));
    }
}
