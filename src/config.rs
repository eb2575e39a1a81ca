//! Execution configuration
//!
//! A JSON file; every field is optional:
//!
//! ```json
//! {
//!   "pipeline_cap": 512,
//!   "pipeline_batch": 64,
//!   "max_parallelism": 0,
//!   "readonly": false,
//!   "scan_consistency": "not_bounded",
//!   "log_level": "INFO"
//! }
//! ```
//!
//! `apply` pushes the process-wide knobs (pipeline sizing, log level);
//! `context_builder` seeds per-request settings.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::datastore::{Datastore, ScanConsistency};
use crate::execution::{
    set_pipeline_batch, set_pipeline_cap, ContextBuilder, DEFAULT_BATCH_SIZE, DEFAULT_PIPELINE_CAP,
};
use crate::observability::{Event, Logger, Severity};

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "AERO_CONFIG_READ",
            ConfigError::Parse(_) => "AERO_CONFIG_PARSE",
            ConfigError::Invalid(_) => "AERO_CONFIG_INVALID",
        }
    }
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Ceiling on rows in flight per queue (default: 512)
    #[serde(default = "default_pipeline_cap")]
    pub pipeline_cap: usize,

    /// Rows per batch (default: 64)
    #[serde(default = "default_pipeline_batch")]
    pub pipeline_batch: usize,

    /// Request parallelism budget; 0 means available cores (default: 0)
    #[serde(default)]
    pub max_parallelism: usize,

    /// Skip write operators (default: false)
    #[serde(default)]
    pub readonly: bool,

    /// Scan consistency (default: not_bounded)
    #[serde(default)]
    pub scan_consistency: ScanConsistency,

    /// Minimum log severity (default: INFO)
    #[serde(default = "default_log_level")]
    pub log_level: Severity,
}

fn default_pipeline_cap() -> usize {
    DEFAULT_PIPELINE_CAP
}

fn default_pipeline_batch() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_log_level() -> Severity {
    Severity::Info
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            pipeline_cap: default_pipeline_cap(),
            pipeline_batch: default_pipeline_batch(),
            max_parallelism: 0,
            readonly: false,
            scan_consistency: ScanConsistency::default(),
            log_level: default_log_level(),
        }
    }
}

impl ExecutionConfig {
    /// Load and validate a config file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: ExecutionConfig = serde_json::from_str(&content)?;
        config.validate()?;

        let location = path.display().to_string();
        Logger::event(
            Severity::Info,
            Event::ConfigLoaded,
            &[("path", location.as_str())],
        );
        Ok(config)
    }

    /// Load `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.pipeline_cap == 0 {
            return Err(ConfigError::Invalid("pipeline_cap must be > 0".into()));
        }
        if self.pipeline_batch == 0 {
            return Err(ConfigError::Invalid("pipeline_batch must be > 0".into()));
        }
        if self.pipeline_batch > self.pipeline_cap {
            return Err(ConfigError::Invalid(format!(
                "pipeline_batch ({}) must not exceed pipeline_cap ({})",
                self.pipeline_batch, self.pipeline_cap
            )));
        }
        Ok(())
    }

    /// Applies the process-wide settings.
    ///
    /// Requests already running keep the batches and queues they have.
    pub fn apply(&self) {
        Logger::set_min_severity(self.log_level);
        set_pipeline_cap(self.pipeline_cap);
        set_pipeline_batch(self.pipeline_batch);

        let cap = self.pipeline_cap.to_string();
        let batch = self.pipeline_batch.to_string();
        Logger::event(
            Severity::Info,
            Event::PipelineTuned,
            &[("pipeline_batch", batch.as_str()), ("pipeline_cap", cap.as_str())],
        );
    }

    /// Context builder seeded with the per-request settings
    pub fn context_builder(&self, datastore: Arc<dyn Datastore>) -> ContextBuilder {
        ContextBuilder::new(datastore)
            .readonly(self.readonly)
            .max_parallelism(self.max_parallelism)
            .scan_consistency(self.scan_consistency)
    }
}
