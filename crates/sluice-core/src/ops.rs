//! Runtime operator semantics
//!
//! Both the tree-walking interpreter and the compiled closures call into these
//! functions, so an operator behaves identically on either path.

use crate::ast::BinaryOperator;
use sluice_types::{EvaluationError, Type, Value};
use std::cmp::Ordering;

type OpResult = Result<Value, EvaluationError>;

fn overflow(op: BinaryOperator) -> EvaluationError {
    EvaluationError::Overflow { operation: op.symbol().to_string() }
}

fn not_numeric(value: &Value) -> EvaluationError {
    EvaluationError::type_mismatch(Type::Double, value.type_name())
}

/// Apply a binary operator to two evaluated operands
///
/// # Errors
///
/// Null operands of arithmetic or ordering, division by zero, integer
/// overflow and operands whose runtime types do not suit the operator.
pub fn binary(op: BinaryOperator, left: &Value, right: &Value) -> OpResult {
    match op {
        BinaryOperator::Equal => Ok(Value::Boolean(values_equal(left, right))),
        BinaryOperator::NotEqual => Ok(Value::Boolean(!values_equal(left, right))),
        BinaryOperator::LessThan => compare(op, left, right).map(|o| Value::Boolean(o == Some(Ordering::Less))),
        BinaryOperator::LessThanOrEqual => compare(op, left, right)
            .map(|o| Value::Boolean(matches!(o, Some(Ordering::Less | Ordering::Equal)))),
        BinaryOperator::GreaterThan => {
            compare(op, left, right).map(|o| Value::Boolean(o == Some(Ordering::Greater)))
        }
        BinaryOperator::GreaterThanOrEqual => compare(op, left, right)
            .map(|o| Value::Boolean(matches!(o, Some(Ordering::Greater | Ordering::Equal)))),
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulo => arithmetic(op, left, right),
    }
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> OpResult {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Err(EvaluationError::null_value(op.symbol())),
        (Value::Long(a), Value::Long(b)) => long_arithmetic(op, *a, *b),
        (Value::String(a), Value::String(b)) if op == BinaryOperator::Add => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(Value::String(joined))
        }
        _ => {
            let a = left.as_double().ok_or_else(|| not_numeric(left))?;
            let b = right.as_double().ok_or_else(|| not_numeric(right))?;
            double_arithmetic(op, a, b)
        }
    }
}

fn long_arithmetic(op: BinaryOperator, a: i64, b: i64) -> OpResult {
    let result = match op {
        BinaryOperator::Add => a.checked_add(b),
        BinaryOperator::Subtract => a.checked_sub(b),
        BinaryOperator::Multiply => a.checked_mul(b),
        BinaryOperator::Divide | BinaryOperator::Modulo if b == 0 => {
            return Err(EvaluationError::DivisionByZero);
        }
        BinaryOperator::Divide => a.checked_div(b),
        BinaryOperator::Modulo => a.checked_rem(b),
        _ => return Err(EvaluationError::type_mismatch(Type::Boolean, "long")),
    };
    result.map(Value::Long).ok_or_else(|| overflow(op))
}

fn double_arithmetic(op: BinaryOperator, a: f64, b: f64) -> OpResult {
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide | BinaryOperator::Modulo if b == 0.0 => {
            return Err(EvaluationError::DivisionByZero);
        }
        BinaryOperator::Divide => a / b,
        BinaryOperator::Modulo => a % b,
        _ => return Err(EvaluationError::type_mismatch(Type::Boolean, "double")),
    };
    Ok(Value::Double(result))
}

/// Equality with numeric widening; `Null` equals only `Null`
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Long(a), Value::Long(b)) => a == b,
        (Value::Long(_) | Value::Double(_), Value::Long(_) | Value::Double(_)) => {
            left.partial_cmp(right) == Some(Ordering::Equal)
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| b.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => left == right,
    }
}

/// Ordering between two comparable operands. `None` for incomparable doubles (NaN).
fn compare(op: BinaryOperator, left: &Value, right: &Value) -> Result<Option<Ordering>, EvaluationError> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Err(EvaluationError::null_value(op.symbol())),
        (Value::Long(_) | Value::Double(_), Value::Long(_) | Value::Double(_))
        | (Value::String(_), Value::String(_))
        | (Value::DateTime(_), Value::DateTime(_)) => Ok(left.partial_cmp(right)),
        _ => Err(EvaluationError::type_mismatch(left.value_type(), right.type_name())),
    }
}

/// Boolean content of a condition or logical operand
///
/// # Errors
///
/// `NullValue` for `Null`, `TypeMismatch` for any other non-boolean.
pub fn expect_bool(value: &Value, operation: &str) -> Result<bool, EvaluationError> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Null => Err(EvaluationError::null_value(operation)),
        other => Err(EvaluationError::type_mismatch(Type::Boolean, other.type_name())),
    }
}

/// Logical negation
///
/// # Errors
///
/// Non-boolean operand.
pub fn not(value: &Value) -> OpResult {
    expect_bool(value, "not").map(|b| Value::Boolean(!b))
}

/// Arithmetic negation
///
/// # Errors
///
/// Null or non-numeric operand, or negating `i64::MIN`.
pub fn negate(value: &Value) -> OpResult {
    match value {
        Value::Long(n) => n
            .checked_neg()
            .map(Value::Long)
            .ok_or_else(|| EvaluationError::Overflow { operation: "-".to_string() }),
        Value::Double(d) => Ok(Value::Double(-d)),
        Value::Null => Err(EvaluationError::null_value("-")),
        other => Err(not_numeric(other)),
    }
}

/// `target[index]` over arrays (by Long) and maps (by String)
///
/// # Errors
///
/// Null target or index, out of range positions, missing keys and
/// mismatched index types.
pub fn index(target: &Value, index: &Value) -> OpResult {
    match (target, index) {
        (Value::Null, _) | (_, Value::Null) => Err(EvaluationError::null_value("[]")),
        (Value::Array(items), Value::Long(i)) => usize::try_from(*i)
            .ok()
            .and_then(|pos| items.get(pos))
            .cloned()
            .ok_or(EvaluationError::IndexOutOfBounds { index: *i, length: items.len() }),
        (Value::Array(_), other) => Err(EvaluationError::type_mismatch(Type::Long, other.type_name())),
        (Value::Map(map), Value::String(key)) => {
            map.get(key).cloned().ok_or_else(|| EvaluationError::MissingKey { key: key.clone() })
        }
        (Value::Map(_), other) => Err(EvaluationError::type_mismatch(Type::String, other.type_name())),
        (other, _) => Err(EvaluationError::type_mismatch(Type::Map, other.type_name())),
    }
}
