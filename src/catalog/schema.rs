//! Schema definitions for quillsql
//!
//! This module defines table schemas, column metadata and index definitions.

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::types::DataType;
use crate::error::{Error, Result};

/// A foreign-key reference to a UNIQUE or PRIMARY KEY column of another table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table name
    pub table: String,
    /// Referenced column name
    pub column: String,
}

/// Column definition in a table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name, case preserved as declared
    pub name: String,
    /// Declared type
    pub data_type: DataType,
    /// Is this the primary key column? Implies UNIQUE and NOT NULL.
    pub primary_key: bool,
    /// Is this column UNIQUE?
    pub unique: bool,
    /// Is this column NOT NULL?
    pub not_null: bool,
    /// Foreign-key reference, if any
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    /// Create a new nullable column with no constraints
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            unique: false,
            not_null: false,
            foreign_key: None,
        }
    }

    /// Mark as the primary key
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    /// Mark as UNIQUE
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Add a foreign-key reference
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    /// UNIQUE or PRIMARY KEY
    pub fn is_unique(&self) -> bool {
        self.unique || self.primary_key
    }

    /// May this column hold NULL?
    pub fn is_nullable(&self) -> bool {
        !(self.not_null || self.primary_key)
    }
}

/// Index definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name
    pub name: String,
    /// Table this index belongs to
    pub table: String,
    /// Indexed column
    pub column: String,
    /// Is this a unique index?
    pub unique: bool,
}

impl IndexDef {
    /// Name given to the implicit index backing a PRIMARY KEY or UNIQUE column
    pub fn implicit_name(table: &str, column: &str) -> String {
        format!("{}_{}_idx", table, column)
    }
}

/// Table schema: ordered columns plus index registry, persisted as the
/// table's schema artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name, case preserved as declared
    pub name: String,
    /// Ordered column definitions
    pub columns: Vec<Column>,
    /// Creation timestamp, RFC 3339
    pub created_at: String,
    /// Indexes on this table, implicit and explicit
    pub indexes: Vec<IndexDef>,
}

impl TableSchema {
    /// Build and validate a schema. Checks: at least one column, no
    /// duplicate column names (case-insensitive), at most one primary key.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        if columns.is_empty() {
            return Err(Error::Syntax {
                pos: 0,
                msg: format!("table '{}' must have at least one column", name),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.to_ascii_lowercase()) {
                return Err(Error::Syntax {
                    pos: 0,
                    msg: format!("duplicate column '{}' in table '{}'", col.name, name),
                });
            }
        }

        if columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::Syntax {
                pos: 0,
                msg: format!("table '{}' can have at most one primary key", name),
            });
        }

        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        Ok(Self {
            name,
            columns,
            created_at,
            indexes: Vec::new(),
        })
    }

    /// Look up a column by name, case-insensitively
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Position of a column, case-insensitively
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// The primary-key column, if declared
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Columns carrying UNIQUE or PRIMARY KEY
    pub fn unique_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_unique())
    }

    /// Columns carrying a foreign key
    pub fn foreign_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.foreign_key.is_some())
    }

    /// The index on a column, if one exists
    pub fn index_on(&self, column: &str) -> Option<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.column.eq_ignore_ascii_case(column))
    }

    /// An index by name
    pub fn index_named(&self, name: &str) -> Option<&IndexDef> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }
}
