//! System catalog for quillsql
//!
//! The catalog owns every table's schema and row store for one database
//! directory, plus all ordered indexes. Indexes are keyed by
//! `(table, column)` and owned here rather than by their tables so the
//! executor can hold several index references at once while planning joins.
//! A reverse foreign-key map makes DELETE and DROP protection proportional
//! to the number of referencing columns instead of a catalog-wide scan.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::schema::{IndexDef, TableSchema};
use crate::error::{Error, Result};
use crate::storage::btree::BTreeIndex;
use crate::storage::store::{self, TableStore};
use crate::storage::value::Value;

/// Canonical form of an identifier: names compare case-insensitively and
/// are stored canonically lowercased in catalog keys.
pub fn canonical(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A table's schema together with its in-memory row mirror
#[derive(Debug)]
pub struct TableState {
    pub schema: TableSchema,
    pub store: TableStore,
}

/// Introspection row for one table
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub column_count: usize,
    pub row_count: usize,
    pub primary_key: Option<String>,
    pub indexes: Vec<String>,
    pub created_at: String,
}

/// Introspection row for one index
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    pub column: String,
    pub unique: bool,
    pub entries: usize,
}

/// System catalog: all tables, indexes and FK metadata of one directory
#[derive(Debug)]
pub struct Catalog {
    dir: PathBuf,
    /// Table state keyed by canonical name
    tables: BTreeMap<String, TableState>,
    /// Indexes keyed by (canonical table, canonical column)
    indexes: BTreeMap<(String, String), BTreeIndex>,
    /// (referenced table, column) -> set of (referencing table, column)
    referencing: BTreeMap<(String, String), BTreeSet<(String, String)>>,
}

impl Catalog {
    /// Open a catalog directory, loading every table and rebuilding all
    /// indexes from row data. Stray `.tmp` files are ignored.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut catalog = Self {
            dir: dir.clone(),
            tables: BTreeMap::new(),
            indexes: BTreeMap::new(),
            referencing: BTreeMap::new(),
        };

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_schema = path
                .extension()
                .map(|e| e == "schema")
                .unwrap_or(false);
            if !is_schema {
                continue;
            }

            let schema: TableSchema = store::read_document(&path)?;
            let key = canonical(&schema.name);
            let data_file = store::data_path(&dir, &key);
            let table_store: TableStore = if data_file.exists() {
                store::read_document(&data_file)?
            } else {
                TableStore::default()
            };

            catalog.register_indexes(&key, &schema, &table_store)?;
            catalog.register_foreign_keys(&key, &schema);
            catalog.tables.insert(
                key,
                TableState {
                    schema,
                    store: table_store,
                },
            );
        }

        debug!(dir = %dir.display(), tables = catalog.tables.len(), "catalog opened");
        Ok(catalog)
    }

    /// The directory this catalog persists into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(&canonical(name))
    }

    /// Get a table by name
    pub fn table(&self, name: &str) -> Result<&TableState> {
        self.tables
            .get(&canonical(name))
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut TableState> {
        self.tables
            .get_mut(&canonical(name))
            .ok_or_else(|| Error::UnknownTable(name.to_string()))
    }

    /// Canonical names of all tables, sorted
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    /// Create a table: validate foreign-key targets, build the implicit
    /// unique indexes, persist both artefacts, register FK back-links.
    pub fn create_table(&mut self, mut schema: TableSchema) -> Result<()> {
        let key = canonical(&schema.name);
        if self.tables.contains_key(&key) {
            return Err(Error::TableExists(schema.name.clone()));
        }

        self.validate_foreign_keys(&schema)?;

        // Implicit unique index per PRIMARY KEY / UNIQUE column.
        let implicit: Vec<IndexDef> = schema
            .unique_columns()
            .map(|col| IndexDef {
                name: IndexDef::implicit_name(&key, &canonical(&col.name)),
                table: schema.name.clone(),
                column: col.name.clone(),
                unique: true,
            })
            .collect();
        schema.indexes = implicit;

        let table_store = TableStore::default();
        store::write_document(&store::schema_path(&self.dir, &key), &schema)?;
        store::write_document(&store::data_path(&self.dir, &key), &table_store)?;

        self.register_indexes(&key, &schema, &table_store)?;
        self.register_foreign_keys(&key, &schema);
        debug!(table = %schema.name, "table created");
        self.tables.insert(
            key,
            TableState {
                schema,
                store: table_store,
            },
        );
        Ok(())
    }

    /// Drop a table. Refuses while another table holds a foreign key into it.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        let key = canonical(name);
        if !self.tables.contains_key(&key) {
            return Err(Error::UnknownTable(name.to_string()));
        }

        for (referenced, referrers) in &self.referencing {
            if referenced.0 != key {
                continue;
            }
            if let Some((rt, rc)) = referrers.iter().find(|(rt, _)| *rt != key) {
                return Err(Error::RefusedDrop {
                    table: name.to_string(),
                    referrer: format!("{}.{}", rt, rc),
                });
            }
        }

        self.tables.remove(&key);
        self.indexes.retain(|(table, _), _| *table != key);
        self.referencing.retain(|(table, _), _| *table != key);
        for referrers in self.referencing.values_mut() {
            referrers.retain(|(table, _)| *table != key);
        }

        // Best-effort file removal; the catalog entry is already gone.
        fs::remove_file(store::schema_path(&self.dir, &key)).ok();
        fs::remove_file(store::data_path(&self.dir, &key)).ok();
        debug!(table = name, "table dropped");
        Ok(())
    }

    /// Create an explicit (non-unique) index and backfill it from existing
    /// rows, skipping NULL column values. The definition is persisted in
    /// the schema artefact so the index survives reopen.
    pub fn create_index(&mut self, name: &str, table: &str, column: &str) -> Result<()> {
        let key = canonical(table);
        let col_key = canonical(column);

        let state = self.table(table)?;
        let col_idx = state
            .schema
            .column_index(column)
            .ok_or_else(|| Error::UnknownColumn(column.to_string()))?;

        for t in self.tables.values() {
            if t.schema.index_named(name).is_some() {
                return Err(Error::IndexExists(name.to_string()));
            }
        }
        if self.indexes.contains_key(&(key.clone(), col_key.clone())) {
            return Err(Error::IndexExists(format!("{}.{}", table, column)));
        }

        let mut index = BTreeIndex::new(name, column, false);
        for row in state.store.iter() {
            let value = &row.values[col_idx];
            if !value.is_null() {
                index.insert(value.clone(), row.id)?;
            }
        }

        let def = IndexDef {
            name: name.to_string(),
            table: state.schema.name.clone(),
            column: state.schema.columns[col_idx].name.clone(),
            unique: false,
        };

        let state = self.table_mut(table)?;
        state.schema.indexes.push(def);
        let schema = state.schema.clone();
        self.indexes.insert((key.clone(), col_key), index);
        store::write_document(&store::schema_path(&self.dir, &key), &schema)?;
        debug!(index = name, table, column, "index created");
        Ok(())
    }

    /// The index on `table.column`, if one exists
    pub fn index(&self, table: &str, column: &str) -> Option<&BTreeIndex> {
        self.indexes.get(&(canonical(table), canonical(column)))
    }

    pub fn index_mut(&mut self, table: &str, column: &str) -> Option<&mut BTreeIndex> {
        self.indexes.get_mut(&(canonical(table), canonical(column)))
    }

    /// Look an index up by name across the catalog
    pub fn index_named(&self, name: &str) -> Result<&BTreeIndex> {
        for state in self.tables.values() {
            if let Some(def) = state.schema.index_named(name) {
                return self
                    .index(&def.table, &def.column)
                    .ok_or_else(|| Error::NoSuchIndex(name.to_string()));
            }
        }
        Err(Error::NoSuchIndex(name.to_string()))
    }

    /// Persist a table's row artefact (one atomic save per mutation)
    pub fn save_table(&self, name: &str) -> Result<()> {
        let key = canonical(name);
        let state = self.table(name)?;
        store::write_document(&store::data_path(&self.dir, &key), &state.store)
    }

    /// Columns referencing `table.column`, from the reverse FK map
    pub fn referencing_columns(&self, table: &str, column: &str) -> Vec<(String, String)> {
        self.referencing
            .get(&(canonical(table), canonical(column)))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Does any row of a referencing table hold `value` in its FK column?
    /// Rows of `table` itself listed in `excluded_ids` are skipped, so a
    /// self-referential delete batch does not block itself.
    pub fn value_is_referenced(
        &self,
        table: &str,
        column: &str,
        value: &Value,
        excluded_ids: &HashSet<u64>,
    ) -> Result<Option<(String, String)>> {
        let key = canonical(table);
        for (rt, rc) in self.referencing_columns(table, column) {
            let state = self.table(&rt)?;
            let same_table = rt == key;

            if let Some(index) = self.index(&rt, &rc) {
                let hits = index.point_lookup(value);
                let referenced = if same_table {
                    hits.iter().any(|id| !excluded_ids.contains(id))
                } else {
                    !hits.is_empty()
                };
                if referenced {
                    return Ok(Some((rt, rc)));
                }
                continue;
            }

            let col_idx = state.schema.column_index(&rc).ok_or_else(|| {
                Error::Internal(format!("FK column {}.{} missing", rt, rc))
            })?;
            for row in state.store.iter() {
                if same_table && excluded_ids.contains(&row.id) {
                    continue;
                }
                let held = &row.values[col_idx];
                if !held.is_null() && values_equal(held, value) {
                    return Ok(Some((rt, rc)));
                }
            }
        }
        Ok(None)
    }

    /// Introspection rows for every table
    pub fn table_descriptors(&self) -> Vec<TableDescriptor> {
        self.tables
            .values()
            .map(|state| TableDescriptor {
                name: state.schema.name.clone(),
                column_count: state.schema.columns.len(),
                row_count: state.store.len(),
                primary_key: state.schema.primary_key().map(|c| c.name.clone()),
                indexes: state.schema.indexes.iter().map(|i| i.name.clone()).collect(),
                created_at: state.schema.created_at.clone(),
            })
            .collect()
    }

    /// Introspection rows for every index
    pub fn index_descriptors(&self) -> Vec<IndexDescriptor> {
        let mut out = Vec::new();
        for state in self.tables.values() {
            for def in &state.schema.indexes {
                let entries = self
                    .index(&def.table, &def.column)
                    .map(|i| i.len())
                    .unwrap_or(0);
                out.push(IndexDescriptor {
                    name: def.name.clone(),
                    table: state.schema.name.clone(),
                    column: def.column.clone(),
                    unique: def.unique,
                    entries,
                });
            }
        }
        out
    }

    fn validate_foreign_keys(&self, schema: &TableSchema) -> Result<()> {
        for col in &schema.columns {
            let Some(fk) = &col.foreign_key else {
                continue;
            };
            // A self-reference resolves against the table being created.
            let target = if canonical(&fk.table) == canonical(&schema.name) {
                schema.column(&fk.column)
            } else {
                self.table(&fk.table)?.schema.column(&fk.column)
            };
            let target =
                target.ok_or_else(|| Error::UnknownColumn(format!("{}.{}", fk.table, fk.column)))?;
            if !target.is_unique() {
                return Err(Error::FkViolation(format!(
                    "referenced column {}.{} is not UNIQUE or PRIMARY KEY",
                    fk.table, fk.column
                )));
            }
        }
        Ok(())
    }

    fn register_indexes(
        &mut self,
        key: &str,
        schema: &TableSchema,
        table_store: &TableStore,
    ) -> Result<()> {
        for def in &schema.indexes {
            let col_idx = schema.column_index(&def.column).ok_or_else(|| {
                Error::Internal(format!("indexed column '{}' missing", def.column))
            })?;
            let mut index = BTreeIndex::new(&def.name, &def.column, def.unique);
            for row in table_store.iter() {
                let value = &row.values[col_idx];
                if !value.is_null() {
                    index.insert(value.clone(), row.id)?;
                }
            }
            self.indexes
                .insert((key.to_string(), canonical(&def.column)), index);
        }
        Ok(())
    }

    fn register_foreign_keys(&mut self, key: &str, schema: &TableSchema) {
        for col in &schema.columns {
            let Some(fk) = &col.foreign_key else {
                continue;
            };
            self.referencing
                .entry((canonical(&fk.table), canonical(&fk.column)))
                .or_default()
                .insert((key.to_string(), canonical(&col.name)));
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    matches!(a.try_compare(b), Ok(Some(std::cmp::Ordering::Equal)))
}
