//! Error types for quillsql
//!
//! This module defines all error types surfaced by the database engine.

use thiserror::Error;

/// The main error type for quillsql
#[derive(Error, Debug)]
pub enum Error {
    // ========== Parse Errors ==========
    #[error("syntax error at position {pos}: {msg}")]
    Syntax { pos: usize, msg: String },

    // ========== Name Resolution Errors ==========
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("ambiguous column reference '{0}'")]
    AmbiguousColumn(String),

    #[error("no such index '{0}'")]
    NoSuchIndex(String),

    // ========== Constraint Errors ==========
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("column '{0}' is NOT NULL")]
    NullViolation(String),

    #[error("unique constraint violated on column '{0}'")]
    UniqueViolation(String),

    #[error("foreign key violation: {0}")]
    FkViolation(String),

    #[error("cannot drop table '{table}': referenced by {referrer}")]
    RefusedDrop { table: String, referrer: String },

    #[error("cannot delete from '{table}': row referenced by {referrer}")]
    RefusedDelete { table: String, referrer: String },

    // ========== DDL Errors ==========
    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("index '{0}' already exists")]
    IndexExists(String),

    // ========== Query Shape Errors ==========
    #[error("aggregate misuse: {0}")]
    AggregateMisuse(String),

    // ========== Environment Errors ==========
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Internal Errors ==========
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for quillsql operations
pub type Result<T> = std::result::Result<T, Error>;
