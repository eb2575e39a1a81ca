//! Expression evaluation
//!
//! Absent fields evaluate to null. Comparisons and logical operators
//! propagate null the way the document query language does.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::{ArithOp, CompareOp, EvalContext, EvalError, EvalResult, Expr};
use crate::value::{collate, path_get, truth, AnnotatedScopeValue, Lookup};

impl Expr {
    /// Evaluates against `item` and the request parameters.
    pub fn evaluate(&self, item: &dyn Lookup, context: &dyn EvalContext) -> EvalResult<Value> {
        match self {
            Expr::Constant { value } => Ok(value.clone()),
            Expr::Field { path } => {
                if let Some(covered) = item.cover(&self.text()) {
                    return Ok(covered.clone());
                }
                let (head, rest) = path.split_first().ok_or(EvalError::EmptyPath)?;
                Ok(item
                    .field(head)
                    .and_then(|v| path_get(v, rest))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            Expr::Parameter { name } => context
                .named_arg(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundParameter(name.clone())),
            Expr::Meta { field } => {
                if let Some(covered) = item.cover(&self.text()) {
                    return Ok(covered.clone());
                }
                let meta = item.attachment("meta");
                let value = match field {
                    Some(field) => meta.and_then(|m| m.get(field)),
                    None => meta,
                };
                Ok(value.cloned().unwrap_or(Value::Null))
            }
            Expr::Compare { op, left, right } => {
                let l = left.evaluate(item, context)?;
                let r = right.evaluate(item, context)?;
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(compare(*op, collate(&l, &r))))
            }
            Expr::And { operands } => {
                let mut saw_null = false;
                for operand in operands {
                    let v = operand.evaluate(item, context)?;
                    if v.is_null() {
                        saw_null = true;
                    } else if !truth(&v) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(if saw_null { Value::Null } else { Value::Bool(true) })
            }
            Expr::Or { operands } => {
                let mut saw_null = false;
                for operand in operands {
                    let v = operand.evaluate(item, context)?;
                    if v.is_null() {
                        saw_null = true;
                    } else if truth(&v) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(if saw_null { Value::Null } else { Value::Bool(false) })
            }
            Expr::Not { operand } => {
                let v = operand.evaluate(item, context)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(!truth(&v)))
            }
            Expr::Arith { op, left, right } => {
                let l = left.evaluate(item, context)?;
                let r = right.evaluate(item, context)?;
                match (l.as_number(), r.as_number()) {
                    (Some(a), Some(b)) => arith(*op, a, b, self),
                    _ => Ok(Value::Null),
                }
            }
            Expr::Any {
                variable,
                over,
                satisfies,
            } => {
                let collection = over.evaluate(item, context)?;
                let Value::Array(elements) = collection else {
                    return Ok(Value::Null);
                };
                for element in elements {
                    let mut scope = AnnotatedScopeValue::new(Value::Null, item);
                    scope.set_field(variable.as_str(), element);
                    if truth(&satisfies.evaluate(&scope, context)?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Expr::AnyEvery {
                variable,
                over,
                satisfies,
            } => {
                let collection = over.evaluate(item, context)?;
                let Value::Array(elements) = collection else {
                    return Ok(Value::Null);
                };
                if elements.is_empty() {
                    return Ok(Value::Bool(false));
                }
                for element in elements {
                    let mut scope = AnnotatedScopeValue::new(Value::Null, item);
                    scope.set_field(variable.as_str(), element);
                    if !truth(&satisfies.evaluate(&scope, context)?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
        }
    }
}

fn compare(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

fn float(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn arith(op: ArithOp, a: &Number, b: &Number, expr: &Expr) -> EvalResult<Value> {
    if matches!(op, ArithOp::Div | ArithOp::Mod) && b.as_f64() == Some(0.0) {
        return Err(EvalError::DivisionByZero(expr.text()));
    }

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            ArithOp::Add => x.checked_add(y),
            ArithOp::Sub => x.checked_sub(y),
            ArithOp::Mul => x.checked_mul(y),
            ArithOp::Mod => x.checked_rem(y),
            ArithOp::Div => None,
        };
        if let Some(n) = exact {
            return Ok(Value::from(n));
        }
    }

    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    Ok(float(match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Mod => x % y,
    }))
}
