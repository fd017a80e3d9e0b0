//! quillsql - a small relational database engine written in Rust
//!
//! This library provides the core components of a file-backed SQL database:
//! - SQL parsing (lexer, parser, AST)
//! - Schema, type system and constraint metadata
//! - Storage engine (durable row files, ordered B-tree indexes)
//! - Query execution (joins, grouping, aggregation) and EXPLAIN plans
//! - System catalog with introspection
//!
//! The engine is single-threaded per catalog: one statement at a time runs
//! against a given directory, and every successful mutation is durable
//! before its result is returned.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod sql;
pub mod storage;

pub use catalog::Catalog;
pub use error::{Error, Result};
pub use executor::{IntrospectKind, Plan, QueryEngine, QueryOutput, ResultSet};
pub use storage::Value;
