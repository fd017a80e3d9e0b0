//! Runtime values for quillsql
//!
//! This module defines how scalar values are represented in memory and on
//! disk, along with the comparison and arithmetic semantics shared by the
//! expression evaluator, the indexes and the constraint checks.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use time::Date;

use crate::error::{Error, Result};

/// A value in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Signed 64-bit integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Character string
    Text(String),
    /// Calendar date, ordered by (year, month, day)
    Date(Date),
    /// Boolean value
    Boolean(bool),
}

/// A stored row: one value per column, in schema order.
pub type Row = Vec<Value>;

// PartialEq is implemented manually so floats compare bitwise. This keeps
// Value usable as a grouping key and in staged-uniqueness sets.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Date(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
        }
    }
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value (for error messages)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Text(_) => "TEXT",
            Value::Date(_) => "DATE",
            Value::Boolean(_) => "BOOLEAN",
        }
    }

    /// Numeric view of the value, widening integers to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Compare two values under SQL semantics.
    ///
    /// `Ok(None)` when either side is NULL (the comparison itself is NULL),
    /// `Err(TypeMismatch)` for incompatible types. Integer and float compare
    /// numerically after widening; this widening exists only in expression
    /// evaluation, never in storage.
    pub fn try_compare(&self, other: &Value) -> Result<Option<Ordering>> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(None),

            (Value::Integer(a), Value::Integer(b)) => Ok(Some(a.cmp(b))),
            (Value::Float(a), Value::Float(b)) => Ok(a.partial_cmp(b)),
            (Value::Integer(a), Value::Float(b)) => Ok((*a as f64).partial_cmp(b)),
            (Value::Float(a), Value::Integer(b)) => Ok(a.partial_cmp(&(*b as f64))),

            (Value::Text(a), Value::Text(b)) => Ok(Some(a.cmp(b))),
            (Value::Date(a), Value::Date(b)) => Ok(Some(a.cmp(b))),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(Some(a.cmp(b))),

            _ => Err(Error::TypeMismatch(format!(
                "cannot compare {} with {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Add two values. NULL propagates.
    pub fn add(&self, other: &Value) -> Result<Value> {
        self.arith(other, "+", |a, b| a.wrapping_add(b), |a, b| a + b)
    }

    /// Subtract two values. NULL propagates.
    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.arith(other, "-", |a, b| a.wrapping_sub(b), |a, b| a - b)
    }

    /// Multiply two values. NULL propagates.
    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.arith(other, "*", |a, b| a.wrapping_mul(b), |a, b| a * b)
    }

    /// Divide two values. NULL propagates; division by zero yields NULL.
    pub fn div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Integer(_), Value::Integer(0)) => Ok(Value::Null),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_div(*b))),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(_), Some(y)) if y == 0.0 => Ok(Value::Null),
                (Some(x), Some(y)) => Ok(Value::Float(x / y)),
                _ => Err(Error::TypeMismatch(format!(
                    "cannot apply '/' to {} and {}",
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }

    /// Arithmetic negation. NULL propagates.
    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Null => Ok(Value::Null),
            Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(Error::TypeMismatch(format!(
                "cannot negate {} value",
                other.type_name()
            ))),
        }
    }

    /// Three-valued truth of a predicate result: `Some(bool)` for booleans,
    /// `None` for NULL, type error otherwise.
    pub fn as_truth(&self) -> Result<Option<bool>> {
        match self {
            Value::Null => Ok(None),
            Value::Boolean(b) => Ok(Some(*b)),
            other => Err(Error::TypeMismatch(format!(
                "expected a boolean predicate, got {}",
                other.type_name()
            ))),
        }
    }

    fn arith(
        &self,
        other: &Value,
        op: &str,
        int_op: fn(i64, i64) -> i64,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(int_op(*a, *b))),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
                _ => Err(Error::TypeMismatch(format!(
                    "cannot apply '{}' to {} and {}",
                    op,
                    a.type_name(),
                    b.type_name()
                ))),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}
