//! Pipeline Semantics Tests
//!
//! Tests for linear operator behavior:
//! - Filter keeps exactly the rows whose condition is true
//! - Limit emits min(k, m) rows and stops its upstream
//! - Invalid limits emit nothing and record one error
//! - Projection attachments round-trip through FinalProject
//! - Readonly requests skip index drops

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use aeroquery::datastore::MemoryDatastore;
use aeroquery::execution::{build, execute, ContextBuilder, FinalProject, QueryStatus, PROJECTION};
use aeroquery::expression::Expr;
use aeroquery::plan::{self, PlanNode, ResultTerm};
use common::{context, run_over, Collect, Rows};
use serde_json::{json, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn ages(ages: &[Value]) -> Rows {
    Rows::new(ages.iter().map(|age| json!({ "age": age })).collect())
}

fn older_than(age: i64) -> PlanNode {
    PlanNode::filter(Expr::gt(Expr::field("age"), Expr::constant(age)))
}

// =============================================================================
// Filter Tests
// =============================================================================

/// Only true conditions pass; null and missing results are dropped silently.
#[tokio::test]
async fn test_filter_keeps_only_true_rows() {
    let ctx = context();
    let op = build(&older_than(30), &ctx).unwrap();
    let input = Rows::new(vec![
        json!({"age": 20}),
        json!({"age": 35}),
        json!({"age": null}),
        json!({}),
        json!({"age": 31}),
    ]);

    let mut sink = Collect::default();
    run_over(op, input, &ctx, &mut sink).await;

    assert_eq!(sink.values(), vec![json!({"age": 35}), json!({"age": 31})]);
    assert!(!ctx.has_errors());
}

/// Filter then Limit(2) halts before the fourth row is produced.
#[tokio::test]
async fn test_filter_then_limit_halts_early() {
    let ctx = context();
    let plan = PlanNode::sequence(vec![older_than(30), PlanNode::limit(Expr::constant(2))]);
    let op = build(&plan, &ctx).unwrap();
    let input = ages(&[json!(20), json!(35), json!(40), json!(50)]);
    let delivered = input.counter();

    let mut sink = Collect::default();
    run_over(op, input, &ctx, &mut sink).await;

    assert_eq!(sink.values(), vec![json!({"age": 35}), json!({"age": 40})]);
    assert_eq!(delivered.load(Ordering::SeqCst), 3);
    assert!(!ctx.has_errors());
}

// =============================================================================
// Limit Tests
// =============================================================================

/// Limit(k) over m rows emits min(k, m).
#[tokio::test]
async fn test_limit_emits_min_of_bound_and_input() {
    for (k, m) in [(0usize, 5usize), (3, 5), (5, 5), (7, 5), (4, 0)] {
        let ctx = context();
        let op = build(&PlanNode::limit(Expr::constant(k)), &ctx).unwrap();
        let mut sink = Collect::default();
        run_over(op, Rows::numbered(m), &ctx, &mut sink).await;

        assert_eq!(sink.items.len(), k.min(m), "k={} m={}", k, m);
        assert!(!ctx.has_errors(), "k={} m={}", k, m);
    }
}

/// A negative, fractional or non-numeric bound records one invalid-value error.
#[tokio::test]
async fn test_invalid_limit_records_one_error() {
    for bound in [json!(-1), json!(1.5), json!("ten"), json!(null)] {
        let ctx = context();
        let op = build(&PlanNode::limit(Expr::constant(bound.clone())), &ctx).unwrap();
        let input = Rows::numbered(4);
        let delivered = input.counter();
        let mut sink = Collect::default();
        run_over(op, input, &ctx, &mut sink).await;

        assert!(sink.items.is_empty(), "{}", bound);
        assert_eq!(delivered.load(Ordering::SeqCst), 0, "{}", bound);
        let errors = ctx.errors();
        assert_eq!(errors.len(), 1, "{}", bound);
        assert_eq!(errors[0].code(), "AERO_EXEC_INVALID_VALUE", "{}", bound);
    }
}

/// The bound may come from a named parameter.
#[tokio::test]
async fn test_limit_from_parameter() {
    let ctx = ContextBuilder::new(common::empty_store())
        .named_arg("n", json!(2))
        .build();
    let op = build(&PlanNode::limit(Expr::parameter("n")), &ctx).unwrap();
    let mut sink = Collect::default();
    run_over(op, Rows::numbered(10), &ctx, &mut sink).await;
    assert_eq!(sink.values(), vec![json!({"n": 1}), json!({"n": 2})]);
}

// =============================================================================
// Projection Tests
// =============================================================================

/// InitialProject then FinalProject emits the projected object only.
#[tokio::test]
async fn test_projection_round_trip() {
    let ctx = context();
    let plan = PlanNode::sequence(vec![
        PlanNode::InitialProject(plan::InitialProject {
            terms: vec![
                ResultTerm {
                    alias: Some("years".into()),
                    expr: Expr::field("age"),
                },
                ResultTerm {
                    alias: None,
                    expr: Expr::gt(Expr::field("age"), Expr::constant(30)),
                },
            ],
            raw: false,
        }),
        PlanNode::FinalProject,
    ]);
    let op = build(&plan, &ctx).unwrap();
    let mut sink = Collect::default();
    run_over(op, ages(&[json!(20), json!(40)]), &ctx, &mut sink).await;

    assert_eq!(
        sink.values(),
        vec![
            json!({"years": 20, "$2": false}),
            json!({"years": 40, "$2": true}),
        ]
    );
    assert!(sink.items.iter().all(|i| i.attachment(PROJECTION).is_none()));
}

/// FinalProject forwards rows that carry no projection unchanged.
#[tokio::test]
async fn test_final_project_without_attachment() {
    let ctx = context();
    let mut sink = Collect::default();
    run_over(
        Box::new(FinalProject::new()),
        Rows::new(vec![json!({"a": 1})]),
        &ctx,
        &mut sink,
    )
    .await;
    assert_eq!(sink.values(), vec![json!({"a": 1})]);
}

// =============================================================================
// Readonly Tests
// =============================================================================

/// Under a readonly request, DropIndex leaves the index alone and succeeds.
#[tokio::test]
async fn test_readonly_skips_index_drop() {
    let store: Arc<MemoryDatastore> = common::people(10);
    let plan = PlanNode::DropIndex(plan::DropIndex {
        index: "by_age".into(),
        term: plan::KeyspaceTerm::new("people"),
    });

    let readonly = ContextBuilder::new(store.clone()).readonly(true);
    let result = execute(&plan, readonly).await;
    assert!(result.rows.is_empty());
    assert_eq!(result.outcome.status, QueryStatus::Success);
    let index = store.memory_index("default", "people", "by_age").unwrap();
    assert!(!index.is_dropped());

    let result = execute(&plan, ContextBuilder::new(store.clone())).await;
    assert_eq!(result.outcome.status, QueryStatus::Success);
    assert!(index.is_dropped());
}
