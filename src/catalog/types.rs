//! Data types for quillsql
//!
//! This module defines the SQL column types supported by the database.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::storage::value::Value;

/// SQL column types
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Signed 64-bit integer
    Integer,
    /// IEEE-754 64-bit floating point
    Float,
    /// Variable-length character string with a maximum length
    Varchar(usize),
    /// Calendar date (year, month, day)
    Date,
    /// Boolean type
    Boolean,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Validate a value for storage into a column of this type.
    ///
    /// Typing is strict at write time: the value's runtime tag must match
    /// the declared type exactly. NULL always passes; NOT NULL is policed
    /// separately. VARCHAR counts characters, not bytes.
    pub fn check(&self, column: &str, value: &Value) -> Result<()> {
        match (self, value) {
            (_, Value::Null) => Ok(()),
            (DataType::Integer, Value::Integer(_)) => Ok(()),
            (DataType::Float, Value::Float(_)) => Ok(()),
            (DataType::Varchar(limit), Value::Text(s)) => {
                let len = s.chars().count();
                if len > *limit {
                    Err(Error::TypeMismatch(format!(
                        "value of length {} exceeds VARCHAR({}) for column '{}'",
                        len, limit, column
                    )))
                } else {
                    Ok(())
                }
            }
            (DataType::Date, Value::Date(_)) => Ok(()),
            (DataType::Boolean, Value::Boolean(_)) => Ok(()),
            _ => Err(Error::TypeMismatch(format!(
                "cannot store {} value into {} column '{}'",
                value.type_name(),
                self,
                column
            ))),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::Varchar(n) => write!(f, "VARCHAR({})", n),
            DataType::Date => write!(f, "DATE"),
            DataType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_storage_typing() {
        assert!(DataType::Integer
            .check("id", &Value::Integer(42))
            .is_ok());
        // No integer-to-float widening at write time.
        assert!(DataType::Float.check("score", &Value::Integer(1)).is_err());
        assert!(DataType::Integer
            .check("id", &Value::Text("42".to_string()))
            .is_err());
        // NULL passes the type check for every type.
        assert!(DataType::Boolean.check("flag", &Value::Null).is_ok());
    }

    #[test]
    fn test_varchar_bounds() {
        let ty = DataType::Varchar(3);
        assert!(ty.check("name", &Value::Text("abc".to_string())).is_ok());
        assert!(ty.check("name", &Value::Text("abcd".to_string())).is_err());
        // Characters, not bytes.
        assert!(ty.check("name", &Value::Text("äöü".to_string())).is_ok());
    }
}
