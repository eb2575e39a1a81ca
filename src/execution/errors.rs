//! Execution error types
//!
//! Error codes:
//! - AERO_EXEC_EVALUATION (ERROR)
//! - AERO_EXEC_INVALID_VALUE (ERROR)
//! - AERO_EXEC_PLAN_INVARIANT (FATAL)
//! - AERO_EXEC_BACKEND (ERROR)
//! - AERO_EXEC_TOO_MANY_TARGETS (ERROR)
//! - AERO_EXEC_INDEX_NOT_FOUND (ERROR)
//! - AERO_EXEC_UNAUTHORIZED (ERROR)
//! - AERO_EXEC_INTERNAL (FATAL)

use std::fmt;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::expression::{EvalError, Expr};

/// Severity levels for execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The request fails; sibling work may continue
    Error,
    /// The request is aborted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Result type for execution operations
pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    // ==================
    // Row-local errors
    // ==================
    /// Expression evaluation failed for a row or a per-request term
    #[error("Error evaluating {term}: {message}")]
    Evaluation { term: String, message: String },

    /// A value lacks the required shape
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    // ==================
    // Build errors
    // ==================
    /// Plan node that must be rewritten before execution
    #[error("Unexpected plan operator {0} reached execution")]
    UnexpectedPlanOperator(String),

    /// More than one keyspace scanned under a single scan vector
    #[error("Single scan vector used with multiple targets: {}", .0.join(", "))]
    TooManyScannedTargets(Vec<String>),

    /// Index named by the plan does not exist
    #[error("Index {index} not found on {keyspace}")]
    IndexNotFound { index: String, keyspace: String },

    /// Request lacks a privilege the plan requires
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ==================
    // Storage and runtime
    // ==================
    /// Storage scan or mutation failed
    #[error("Index {index} failed: {message}")]
    Backend { index: String, message: String },

    /// Task failure inside the engine
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Evaluation failure of `expr`
    pub fn evaluation(expr: &Expr, error: EvalError) -> Self {
        ExecutionError::Evaluation {
            term: expr.text(),
            message: error.to_string(),
        }
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Evaluation { .. } => "AERO_EXEC_EVALUATION",
            ExecutionError::InvalidValue(_) => "AERO_EXEC_INVALID_VALUE",
            ExecutionError::UnexpectedPlanOperator(_) => "AERO_EXEC_PLAN_INVARIANT",
            ExecutionError::TooManyScannedTargets(_) => "AERO_EXEC_TOO_MANY_TARGETS",
            ExecutionError::IndexNotFound { .. } => "AERO_EXEC_INDEX_NOT_FOUND",
            ExecutionError::Unauthorized(_) => "AERO_EXEC_UNAUTHORIZED",
            ExecutionError::Backend { .. } => "AERO_EXEC_BACKEND",
            ExecutionError::Internal(_) => "AERO_EXEC_INTERNAL",
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        match self {
            ExecutionError::UnexpectedPlanOperator(_) | ExecutionError::Internal(_) => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }

    /// Returns whether this error aborts the request
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl Serialize for ExecutionError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExecutionError", 3)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("severity", &self.severity().to_string())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
