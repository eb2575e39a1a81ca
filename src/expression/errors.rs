//! Expression evaluation errors

use thiserror::Error;

/// Result type for expression evaluation
pub type EvalResult<T> = Result<T, EvalError>;

/// Typed evaluation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Division or modulo with a zero divisor
    #[error("Division by zero in {0}")]
    DivisionByZero(String),

    /// Named parameter not supplied with the request
    #[error("No value for named parameter ${0}")]
    UnboundParameter(String),

    /// Field expression with no path segments
    #[error("Field expression has an empty path")]
    EmptyPath,
}
