//! Durable per-table row storage for quillsql
//!
//! Each table is backed by two text-encoded JSON artefacts in the catalog
//! directory: `{table}.schema` (the schema document) and `{table}.data`
//! (the row document). Every save writes the full document to a sibling
//! `.tmp` file, flushes it, then atomically renames it over the target, so
//! a crash leaves either the pre-write or the post-write contents.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::error::{Error, Result};
use crate::storage::value::Row;

/// A row with its table-local id. Row-ids increase monotonically, are never
/// reused and never appear in SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: u64,
    pub values: Row,
}

/// In-memory mirror of a table's row file, kept in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableStore {
    pub next_row_id: u64,
    pub rows: Vec<StoredRow>,
}

impl TableStore {
    /// Append a row, assigning the next row-id
    pub fn append(&mut self, values: Row) -> u64 {
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.push(StoredRow { id, values });
        id
    }

    /// Fetch a row by id. Ids are strictly increasing in `rows`, so a
    /// binary search suffices.
    pub fn get(&self, id: u64) -> Option<&StoredRow> {
        self.rows
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|pos| &self.rows[pos])
    }

    /// Replace a row's values in place
    pub fn mutate(&mut self, id: u64, values: Row) -> Result<()> {
        match self.rows.binary_search_by_key(&id, |r| r.id) {
            Ok(pos) => {
                self.rows[pos].values = values;
                Ok(())
            }
            Err(_) => Err(Error::Internal(format!("row id {} not found", id))),
        }
    }

    /// Remove a row, returning its values
    pub fn remove(&mut self, id: u64) -> Result<Row> {
        match self.rows.binary_search_by_key(&id, |r| r.id) {
            Ok(pos) => Ok(self.rows.remove(pos).values),
            Err(_) => Err(Error::Internal(format!("row id {} not found", id))),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredRow> {
        self.rows.iter()
    }
}

/// Path of a table's schema artefact
pub fn schema_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.schema", table))
}

/// Path of a table's row artefact
pub fn data_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{}.data", table))
}

/// Write a document with the two-step durability protocol: full serialize
/// to `<target>.tmp`, flush to the OS, atomic rename over the target.
pub fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(doc)
        .map_err(|e| Error::Internal(format!("serialize {}: {}", path.display(), e)))?;

    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)?;
    trace!(path = %path.display(), "document saved");
    Ok(())
}

/// Read a document back. A stray `.tmp` sibling left by a crash is ignored;
/// the target is authoritative.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| Error::Internal(format!("parse {}: {}", path.display(), e)))
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
