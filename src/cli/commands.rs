//! CLI command implementations
//!
//! Both commands load the same three inputs: the plan, the data file that
//! seeds the in-memory datastore, and the optional config. Only `run`
//! applies the config's process-wide settings.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::ExecutionConfig;
use crate::datastore::{Datastore, MemoryDatastore};
use crate::execution::{build, QueryOutcome, QueryStatus, ResultStream};
use crate::plan::PlanNode;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, write_final, write_line};

/// Everything a command needs before it touches the engine
pub struct Inputs {
    pub config: ExecutionConfig,
    pub plan: PlanNode,
    pub datastore: Arc<dyn Datastore>,
}

impl Inputs {
    /// Loads config, plan and data, in that order.
    pub fn load(plan: &Path, data: &Path, config: Option<&Path>) -> CliResult<Self> {
        let config = ExecutionConfig::load_or_default(config)?;
        let plan: PlanNode = read_json_file(plan, "plan")?;
        let data: Value = read_json_file(data, "data")?;
        let datastore: Arc<dyn Datastore> = Arc::new(MemoryDatastore::from_json(data)?);
        Ok(Self {
            config,
            plan,
            datastore,
        })
    }
}

/// Execute a CLI command
pub async fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Run {
            plan,
            data,
            config,
            params,
        } => {
            let inputs = Inputs::load(&plan, &data, config.as_deref())?;
            inputs.config.apply();
            let params = parse_params(&params)?;
            let outcome = run(&inputs, params, &mut io::stdout()).await?;
            match outcome.status {
                QueryStatus::Success => Ok(()),
                QueryStatus::Errors => Err(CliError::query_failed(format!(
                    "request {} finished with {} error(s)",
                    outcome.request_id,
                    outcome.errors.len()
                ))),
            }
        }
        Command::Check { plan, data, config } => {
            let inputs = Inputs::load(&plan, &data, config.as_deref())?;
            check(&inputs, &mut io::stdout())
        }
    }
}

/// Parses `name=<json>` pairs; a leading `$` on the name is dropped.
pub fn parse_params(raw: &[String]) -> CliResult<HashMap<String, Value>> {
    let mut params = HashMap::with_capacity(raw.len());
    for pair in raw {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            CliError::invalid_input(format!("Parameter '{}' is not name=value", pair))
        })?;
        let name = name.trim().trim_start_matches('$');
        if name.is_empty() {
            return Err(CliError::invalid_input(format!(
                "Parameter '{}' has an empty name",
                pair
            )));
        }
        let value: Value = serde_json::from_str(value).map_err(|e| {
            CliError::invalid_input(format!("Parameter '{}' is not JSON: {}", name, e))
        })?;
        if params.insert(name.to_string(), value).is_some() {
            return Err(CliError::invalid_input(format!(
                "Parameter '{}' given twice",
                name
            )));
        }
    }
    Ok(params)
}

/// Runs the plan, writing each row and then `{"outcome": ...}` as JSON lines.
///
/// Rows written before an error stay written; the outcome reports it.
pub async fn run<W: Write>(
    inputs: &Inputs,
    params: HashMap<String, Value>,
    out: &mut W,
) -> CliResult<QueryOutcome> {
    let builder = inputs
        .config
        .context_builder(Arc::clone(&inputs.datastore))
        .named_args(params);
    let mut stream = ResultStream::start(&inputs.plan, builder);

    while let Some(row) = stream.next().await {
        if let Err(e) = write_line(out, &row) {
            // Stop the pipeline before reporting the broken output
            stream.finish().await;
            return Err(e);
        }
    }

    let outcome = stream.finish().await;
    write_final(out, &json!({ "outcome": outcome }))?;
    Ok(outcome)
}

/// Builds the pipeline without running it.
pub fn check<W: Write>(inputs: &Inputs, out: &mut W) -> CliResult<()> {
    let context = inputs
        .config
        .context_builder(Arc::clone(&inputs.datastore))
        .build();

    match build(&inputs.plan, &context) {
        Ok(root) => write_final(out, &json!({ "status": "ok", "root": root.name() })),
        Err(e) => {
            write_final(out, &json!({ "status": "error", "error": e }))?;
            Err(CliError::build_failed(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn json_file(value: &Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(value.to_string().as_bytes()).unwrap();
        file
    }

    fn data() -> Value {
        json!({
            "keyspaces": [{
                "name": "people",
                "documents": {
                    "p1": {"name": "ann", "age": 31},
                    "p2": {"name": "bob", "age": 17},
                    "p3": {"name": "cid", "age": 45}
                },
                "indexes": [{"name": "by_age", "keys": ["age"]}]
            }]
        })
    }

    fn plan() -> Value {
        json!({
            "#operator": "Sequence",
            "children": [
                {
                    "#operator": "IndexScan",
                    "index": "by_age",
                    "term": {"keyspace": "people"},
                    "spans": [{"range": {"low": [{"kind": "constant", "value": 18}], "inclusion": "low"}}],
                    "covers": [
                        {"kind": "field", "path": ["age"]},
                        {"kind": "meta", "field": "id"}
                    ]
                },
                {
                    "#operator": "Filter",
                    "condition": {
                        "kind": "compare",
                        "op": ">=",
                        "left": {"kind": "field", "path": ["age"]},
                        "right": {"kind": "parameter", "name": "min"}
                    }
                },
                {
                    "#operator": "InitialProject",
                    "terms": [
                        {"expr": {"kind": "meta", "field": "id"}, "as": "id"},
                        {"expr": {"kind": "field", "path": ["age"]}}
                    ]
                },
                {"#operator": "FinalProject"}
            ]
        })
    }

    fn lines(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "min=18".to_string(),
            "$city=\"Oslo\"".to_string(),
            "tags=[1,2]".to_string(),
        ])
        .unwrap();
        assert_eq!(params["min"], json!(18));
        assert_eq!(params["city"], json!("Oslo"));
        assert_eq!(params["tags"], json!([1, 2]));
    }

    #[test]
    fn test_parse_params_rejects_malformed() {
        for raw in ["noequals", "=1", "x=not json"] {
            let err = parse_params(&[raw.to_string()]).unwrap_err();
            assert_eq!(err.code(), &CliErrorCode::InvalidInput, "{}", raw);
        }
        let err = parse_params(&["a=1".to_string(), "$a=2".to_string()]).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::InvalidInput);
    }

    #[test]
    fn test_load_reports_bad_inputs() {
        let data = json_file(&data());
        let bad_plan = json_file(&json!({"#operator": "NoSuchOperator"}));
        let err = Inputs::load(bad_plan.path(), data.path(), None).err().unwrap();
        assert_eq!(err.code(), &CliErrorCode::InvalidInput);

        let plan = json_file(&plan());
        let err = Inputs::load(plan.path(), Path::new("/nonexistent/data.json"), None)
            .err()
            .unwrap();
        assert_eq!(err.code(), &CliErrorCode::IoError);

        let config = json_file(&json!({"pipeline_cap": 0}));
        let err = Inputs::load(plan.path(), data.path(), Some(config.path()))
            .err()
            .unwrap();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[tokio::test]
    async fn test_run_writes_rows_then_outcome() {
        let plan = json_file(&plan());
        let data = json_file(&data());
        let inputs = Inputs::load(plan.path(), data.path(), None).unwrap();

        let mut out = Vec::new();
        let params = parse_params(&["min=40".to_string()]).unwrap();
        let outcome = run(&inputs, params, &mut out).await.unwrap();
        assert_eq!(outcome.status, QueryStatus::Success);
        assert_eq!(outcome.result_count, 1);

        let lines = lines(out);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], json!({"id": "p3", "age": 45}));
        assert_eq!(lines[1]["outcome"]["status"], json!("success"));
        assert_eq!(lines[1]["outcome"]["result_count"], json!(1));
    }

    #[tokio::test]
    async fn test_run_missing_parameter_reports_errors() {
        let plan = json_file(&plan());
        let data = json_file(&data());
        let inputs = Inputs::load(plan.path(), data.path(), None).unwrap();

        let mut out = Vec::new();
        let outcome = run(&inputs, HashMap::new(), &mut out).await.unwrap();
        assert_eq!(outcome.status, QueryStatus::Errors);

        let lines = lines(out);
        let last = lines.last().unwrap();
        assert_eq!(last["outcome"]["status"], json!("errors"));
        assert!(!last["outcome"]["errors"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_check_reports_root_and_build_errors() {
        let plan_file = json_file(&plan());
        let data = json_file(&data());
        let inputs = Inputs::load(plan_file.path(), data.path(), None).unwrap();
        let mut out = Vec::new();
        check(&inputs, &mut out).unwrap();
        assert_eq!(lines(out)[0], json!({"status": "ok", "root": "Sequence"}));

        let missing = json_file(&json!({
            "#operator": "IndexScan",
            "index": "by_name",
            "term": {"keyspace": "people"},
            "spans": []
        }));
        let inputs = Inputs::load(missing.path(), data.path(), None).unwrap();
        let mut out = Vec::new();
        let err = check(&inputs, &mut out).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::BuildFailed);
        assert_eq!(lines(out)[0]["status"], json!("error"));
    }
}
