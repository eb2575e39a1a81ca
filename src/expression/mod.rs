//! Expressions carried by plan nodes
//!
//! Plans embed expressions as serde-tagged trees (`"kind": ...`). The
//! engine only needs one capability from them: evaluate against a row
//! and the request parameters, yielding a value or a typed failure.
//!
//! [`Expr::text`] is the canonical rendering; covering scans key their
//! pre-evaluated values by it, and field evaluation consults the row's
//! covers under that key before touching the document.

mod errors;
mod eval;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use errors::{EvalError, EvalResult};

/// Comparison operators, evaluated by collation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
}

impl ArithOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Literal value
    Constant { value: Value },

    /// Dotted path from a top-level identifier
    Field { path: Vec<String> },

    /// `$name` request parameter
    Parameter { name: String },

    /// The row's `"meta"` attachment, or one of its fields
    Meta {
        #[serde(default)]
        field: Option<String>,
    },

    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    And { operands: Vec<Expr> },

    Or { operands: Vec<Expr> },

    Not { operand: Box<Expr> },

    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// True when some element of `over` satisfies the predicate
    Any {
        variable: String,
        over: Box<Expr>,
        satisfies: Box<Expr>,
    },

    /// True when `over` is non-empty and every element satisfies
    AnyEvery {
        variable: String,
        over: Box<Expr>,
        satisfies: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant {
            value: value.into(),
        }
    }

    /// Field path from dotted text, e.g. `"address.city"`.
    pub fn field(path: &str) -> Self {
        Expr::Field {
            path: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn parameter(name: &str) -> Self {
        Expr::Parameter {
            name: name.to_string(),
        }
    }

    /// `meta().id`
    pub fn meta_id() -> Self {
        Expr::Meta {
            field: Some("id".to_string()),
        }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn and(operands: Vec<Expr>) -> Self {
        Expr::And { operands }
    }

    pub fn or(operands: Vec<Expr>) -> Self {
        Expr::Or { operands }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(operand: Expr) -> Self {
        Expr::Not {
            operand: Box::new(operand),
        }
    }

    pub fn arith(op: ArithOp, left: Expr, right: Expr) -> Self {
        Expr::Arith {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn any(variable: &str, over: Expr, satisfies: Expr) -> Self {
        Expr::Any {
            variable: variable.to_string(),
            over: Box::new(over),
            satisfies: Box::new(satisfies),
        }
    }

    pub fn any_every(variable: &str, over: Expr, satisfies: Expr) -> Self {
        Expr::AnyEvery {
            variable: variable.to_string(),
            over: Box::new(over),
            satisfies: Box::new(satisfies),
        }
    }

    /// Canonical text; also the cover key for this expression.
    pub fn text(&self) -> String {
        self.to_string()
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, operands: &[Expr], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, " {} ", sep)?;
        }
        write!(f, "{}", operand)?;
    }
    write!(f, ")")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant { value } => write!(f, "{}", value),
            Expr::Field { path } => write!(f, "{}", path.join(".")),
            Expr::Parameter { name } => write!(f, "${}", name),
            Expr::Meta { field: Some(field) } => write!(f, "meta().{}", field),
            Expr::Meta { field: None } => write!(f, "meta()"),
            Expr::Compare { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Expr::And { operands } => write_joined(f, operands, "and"),
            Expr::Or { operands } => write_joined(f, operands, "or"),
            Expr::Not { operand } => write!(f, "(not {})", operand),
            Expr::Arith { op, left, right } => {
                write!(f, "({} {} {})", left, op.as_str(), right)
            }
            Expr::Any {
                variable,
                over,
                satisfies,
            } => write!(f, "any {} in {} satisfies {} end", variable, over, satisfies),
            Expr::AnyEvery {
                variable,
                over,
                satisfies,
            } => write!(
                f,
                "any and every {} in {} satisfies {} end",
                variable, over, satisfies
            ),
        }
    }
}

/// Request-level values an expression may reference.
pub trait EvalContext {
    /// Value bound to `$name`, if any.
    fn named_arg(&self, name: &str) -> Option<&Value>;
}

impl EvalContext for HashMap<String, Value> {
    fn named_arg(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}
