//! Observable events of the execution engine
//!
//! Events are explicit and typed.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file loaded
    ConfigLoaded,
    /// Pipeline cap or batch size changed
    PipelineTuned,

    // Requests
    /// Request accepted; pipeline about to be built
    RequestBegin,
    /// Pipeline built from the plan
    PipelineBuilt,
    /// Plan rejected by the builder
    BuildFailed,

    // Operators
    /// An operator instance was asked to run twice
    OperatorRerun,
    /// Write operator skipped under a readonly context
    OperatorSkipped,
    /// Filter dropped a row
    FilterDropped,
    /// Index dropped by a DDL plan
    IndexDropped,

    // Failures
    /// Error recorded in a request's error sink
    ExecutionError,
    /// Worker or sub-scan task panicked
    TaskPanicked,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::PipelineTuned => "PIPELINE_TUNED",

            Event::RequestBegin => "REQUEST_BEGIN",
            Event::PipelineBuilt => "PIPELINE_BUILT",
            Event::BuildFailed => "BUILD_FAILED",

            Event::OperatorRerun => "OPERATOR_RERUN",
            Event::OperatorSkipped => "OPERATOR_SKIPPED",
            Event::FilterDropped => "FILTER_DROPPED",
            Event::IndexDropped => "INDEX_DROPPED",

            Event::ExecutionError => "EXECUTION_ERROR",
            Event::TaskPanicked => "TASK_PANICKED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
