//! CLI and Configuration Tests
//!
//! Tests for the file-driven surface:
//! - Config files shape the request context
//! - `run` streams rows then an outcome line
//! - `check` builds without running
//!
//! Process-wide settings (`ExecutionConfig::apply`) are never applied here;
//! suites run in parallel and share them.

use std::io::Write;

use aeroquery::cli::{self, CliErrorCode, Inputs};
use aeroquery::config::ExecutionConfig;
use aeroquery::datastore::ScanConsistency;
use aeroquery::execution::QueryStatus;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

// =============================================================================
// Helper Functions
// =============================================================================

fn file(value: &Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(value.to_string().as_bytes()).unwrap();
    file
}

fn data() -> NamedTempFile {
    file(&json!({
        "keyspaces": [{
            "name": "orders",
            "documents": {
                "o1": {"total": 12, "status": "open"},
                "o2": {"total": 80, "status": "shipped"},
                "o3": {"total": 45, "status": "open"},
                "o4": {"total": 7}
            },
            "indexes": [{"name": "by_total", "keys": ["total", "status"]}]
        }]
    }))
}

/// Covering scan on `total >= $min`, projecting the order id and status
fn plan() -> NamedTempFile {
    file(&json!({
        "#operator": "Sequence",
        "children": [
            {
                "#operator": "IndexScan",
                "index": "by_total",
                "term": {"keyspace": "orders"},
                "spans": [{"range": {"low": [{"kind": "parameter", "name": "min"}], "inclusion": "low"}}],
                "covers": [
                    {"kind": "field", "path": ["total"]},
                    {"kind": "field", "path": ["status"]},
                    {"kind": "meta", "field": "id"}
                ]
            },
            {
                "#operator": "InitialProject",
                "terms": [
                    {"expr": {"kind": "meta", "field": "id"}, "as": "id"},
                    {"expr": {"kind": "field", "path": ["status"]}}
                ]
            },
            {"#operator": "FinalProject"},
            {"#operator": "Stream"}
        ]
    }))
}

fn output_lines(out: Vec<u8>) -> Vec<Value> {
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

// =============================================================================
// Config Tests
// =============================================================================

/// Config settings flow into the request context.
#[test]
fn test_config_shapes_context() {
    let config = file(&json!({
        "readonly": true,
        "max_parallelism": 2,
        "scan_consistency": "scan_plus",
        "log_level": "ERROR"
    }));
    let inputs = Inputs::load(plan().path(), data().path(), Some(config.path())).unwrap();
    assert!(inputs.config.readonly);

    let ctx = inputs
        .config
        .context_builder(inputs.datastore.clone())
        .build();
    assert!(ctx.readonly());
    assert_eq!(ctx.max_parallelism(), 2);
    assert_eq!(ctx.scan_consistency(), ScanConsistency::ScanPlus);
}

/// A missing config path is optional; an invalid one is a config error.
#[test]
fn test_config_optional_and_validated() {
    let config = ExecutionConfig::load_or_default(None).unwrap();
    assert_eq!(config, ExecutionConfig::default());

    let bad = file(&json!({"pipeline_cap": 16, "pipeline_batch": 32}));
    let err = Inputs::load(plan().path(), data().path(), Some(bad.path()))
        .err()
        .unwrap();
    assert_eq!(err.code(), &CliErrorCode::ConfigError);
}

// =============================================================================
// Run Tests
// =============================================================================

/// Rows stream first, the outcome line last.
#[tokio::test]
async fn test_run_streams_rows_then_outcome() {
    let inputs = Inputs::load(plan().path(), data().path(), None).unwrap();
    let params = cli::parse_params(&["$min=40".to_string()]).unwrap();

    let mut out = Vec::new();
    let outcome = cli::run(&inputs, params, &mut out).await.unwrap();
    assert_eq!(outcome.status, QueryStatus::Success);
    assert_eq!(outcome.result_count, 2);

    let lines = output_lines(out);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], json!({"id": "o3", "status": "open"}));
    assert_eq!(lines[1], json!({"id": "o2", "status": "shipped"}));
    let summary = &lines[2]["outcome"];
    assert_eq!(summary["status"], json!("success"));
    assert_eq!(summary["result_count"], json!(2));
    assert_eq!(summary["phases"]["stream"]["count"], json!(2));
}

/// An unbound span parameter is reported in the outcome, not as a CLI error.
#[tokio::test]
async fn test_run_reports_errors_in_outcome() {
    let inputs = Inputs::load(plan().path(), data().path(), None).unwrap();
    let mut out = Vec::new();
    let outcome = cli::run(&inputs, Default::default(), &mut out).await.unwrap();

    assert_eq!(outcome.status, QueryStatus::Errors);
    let lines = output_lines(out);
    assert_eq!(lines.len(), 1);
    assert_eq!(
        lines[0]["outcome"]["errors"][0]["code"],
        json!("AERO_EXEC_EVALUATION")
    );
}

// =============================================================================
// Check Tests
// =============================================================================

/// `check` reports the root operator or the build error.
#[test]
fn test_check() {
    let inputs = Inputs::load(plan().path(), data().path(), None).unwrap();
    let mut out = Vec::new();
    cli::check(&inputs, &mut out).unwrap();
    assert_eq!(output_lines(out), vec![json!({"status": "ok", "root": "Sequence"})]);

    let rewritten = file(&json!({"#operator": "Order"}));
    let inputs = Inputs::load(rewritten.path(), data().path(), None).unwrap();
    let mut out = Vec::new();
    let err = cli::check(&inputs, &mut out).unwrap_err();
    assert_eq!(err.code(), &CliErrorCode::BuildFailed);
    let lines = output_lines(out);
    assert_eq!(lines[0]["error"]["code"], json!("AERO_EXEC_PLAN_INVARIANT"));
}
