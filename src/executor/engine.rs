//! Query engine facade
//!
//! `QueryEngine` owns one catalog directory and exposes the public
//! contract: `execute` for DDL/DML/queries, `explain` for plans and
//! `introspect` for catalog metadata. One statement runs at a time; a
//! statement's effects are durable before its result is returned, and a
//! failed statement leaves no observable effect.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

use super::eval::{eval, eval_predicate, ColumnLabel, RowFrame};
use super::planner::{build_plan, choose_access_path, table_labels, AccessPath, Plan};
use super::select::run_select;
use crate::catalog::schema::{Column, TableSchema};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::sql::ast::{
    ColumnConstraint, CreateTable, Delete, Insert, Statement, TableConstraint, Update,
};
use crate::sql::Parser;
use crate::storage::value::Value;

/// Tabular query result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Result of `execute`
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// SELECT (and EXPLAIN) results
    Rows(ResultSet),
    /// Rows touched by INSERT/UPDATE/DELETE
    Affected(u64),
    /// DDL acknowledgement
    Ack(String),
}

/// Catalog views exposed by `introspect`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IntrospectKind {
    Tables,
    Indexes,
}

/// The SQL engine for one catalog directory
#[derive(Debug)]
pub struct QueryEngine {
    catalog: Catalog,
}

impl QueryEngine {
    /// Open (or create) a database directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            catalog: Catalog::open(dir)?,
        })
    }

    /// The underlying catalog, read-only
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Parse and execute exactly one statement
    pub fn execute(&mut self, sql: &str) -> Result<QueryOutput> {
        let stmt = Parser::parse_statement(sql)?;
        debug!(sql = sql.trim(), "execute");

        match stmt {
            Statement::CreateTable(ct) => {
                self.execute_create_table(ct)?;
                Ok(QueryOutput::Ack("Table created".to_string()))
            }
            Statement::CreateIndex(ci) => {
                self.catalog.create_index(&ci.name, &ci.table, &ci.column)?;
                Ok(QueryOutput::Ack("Index created".to_string()))
            }
            Statement::DropTable(dt) => {
                self.catalog.drop_table(&dt.table)?;
                Ok(QueryOutput::Ack("Table dropped".to_string()))
            }
            Statement::Insert(ins) => self.execute_insert(ins).map(QueryOutput::Affected),
            Statement::Update(upd) => self.execute_update(upd).map(QueryOutput::Affected),
            Statement::Delete(del) => self.execute_delete(del).map(QueryOutput::Affected),
            Statement::Select(sel) => run_select(&self.catalog, &sel).map(QueryOutput::Rows),
            Statement::Explain(sel) => {
                let plan = build_plan(&self.catalog, &Statement::Select(sel))?;
                Ok(QueryOutput::Rows(ResultSet {
                    columns: vec!["plan".to_string()],
                    rows: plan.lines().into_iter().map(|l| vec![Value::Text(l)]).collect(),
                }))
            }
        }
    }

    /// Produce the structural plan for a statement without executing it
    pub fn explain(&self, sql: &str) -> Result<Plan> {
        let stmt = Parser::parse_statement(sql)?;
        build_plan(&self.catalog, &stmt)
    }

    /// Synthetic result sets describing the catalog
    pub fn introspect(&self, kind: IntrospectKind) -> ResultSet {
        match kind {
            IntrospectKind::Tables => ResultSet {
                columns: vec![
                    "table".to_string(),
                    "columns".to_string(),
                    "rows".to_string(),
                    "primary_key".to_string(),
                    "indexes".to_string(),
                    "created_at".to_string(),
                ],
                rows: self
                    .catalog
                    .table_descriptors()
                    .into_iter()
                    .map(|d| {
                        vec![
                            Value::Text(d.name),
                            Value::Integer(d.column_count as i64),
                            Value::Integer(d.row_count as i64),
                            d.primary_key.map(Value::Text).unwrap_or(Value::Null),
                            Value::Text(d.indexes.join(", ")),
                            Value::Text(d.created_at),
                        ]
                    })
                    .collect(),
            },
            IntrospectKind::Indexes => ResultSet {
                columns: vec![
                    "index".to_string(),
                    "table".to_string(),
                    "column".to_string(),
                    "unique".to_string(),
                    "entries".to_string(),
                ],
                rows: self
                    .catalog
                    .index_descriptors()
                    .into_iter()
                    .map(|d| {
                        vec![
                            Value::Text(d.name),
                            Value::Text(d.table),
                            Value::Text(d.column),
                            Value::Boolean(d.unique),
                            Value::Integer(d.entries as i64),
                        ]
                    })
                    .collect(),
            },
        }
    }

    // ========== CREATE TABLE ==========

    fn execute_create_table(&mut self, ct: CreateTable) -> Result<()> {
        let mut columns: Vec<Column> = ct
            .columns
            .into_iter()
            .map(|def| {
                let mut col = Column::new(def.name, def.data_type);
                for constraint in def.constraints {
                    col = match constraint {
                        ColumnConstraint::PrimaryKey => col.primary_key(),
                        ColumnConstraint::Unique => col.unique(),
                        ColumnConstraint::NotNull => col.not_null(),
                        ColumnConstraint::References { table, column } => {
                            col.references(table, column)
                        }
                    };
                }
                col
            })
            .collect();

        for constraint in ct.constraints {
            match constraint {
                TableConstraint::PrimaryKey { column } => {
                    let col = columns
                        .iter_mut()
                        .find(|c| c.name.eq_ignore_ascii_case(&column))
                        .ok_or_else(|| Error::UnknownColumn(column.clone()))?;
                    col.primary_key = true;
                    col.not_null = true;
                }
                TableConstraint::ForeignKey {
                    column,
                    ref_table,
                    ref_column,
                } => {
                    let col = columns
                        .iter_mut()
                        .find(|c| c.name.eq_ignore_ascii_case(&column))
                        .ok_or_else(|| Error::UnknownColumn(column.clone()))?;
                    *col = col.clone().references(ref_table, ref_column);
                }
            }
        }

        let schema = TableSchema::new(ct.table, columns)?;
        self.catalog.create_table(schema)
    }

    // ========== INSERT ==========

    /// Multi-row insert. The whole batch is validated against the current
    /// state plus a staged overlay before anything mutates; all rows commit
    /// or none do, with one atomic save.
    fn execute_insert(&mut self, ins: Insert) -> Result<u64> {
        let schema = self.catalog.table(&ins.table)?.schema.clone();
        let width = schema.columns.len();

        let positions: Vec<usize> = match &ins.columns {
            Some(cols) => {
                let mut seen = HashSet::new();
                cols.iter()
                    .map(|name| {
                        let idx = schema
                            .column_index(name)
                            .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
                        if !seen.insert(idx) {
                            return Err(Error::AmbiguousColumn(name.clone()));
                        }
                        Ok(idx)
                    })
                    .collect::<Result<_>>()?
            }
            None => (0..width).collect(),
        };

        // VALUES expressions are constant; no row is in scope.
        let no_columns: Vec<ColumnLabel> = Vec::new();
        let no_values: Vec<Value> = Vec::new();
        let const_frame = RowFrame::new(&no_columns, &no_values);

        let mut new_rows = Vec::with_capacity(ins.rows.len());
        for exprs in &ins.rows {
            if exprs.len() != positions.len() {
                return Err(Error::TypeMismatch(format!(
                    "INSERT expects {} values, got {}",
                    positions.len(),
                    exprs.len()
                )));
            }
            let mut row = vec![Value::Null; width];
            for (expr, &pos) in exprs.iter().zip(&positions) {
                row[pos] = eval(expr, &const_frame)?;
            }
            self.check_row_shape(&schema, &row)?;
            new_rows.push(row);
        }

        self.check_unique_for_insert(&schema, &new_rows)?;
        for row in &new_rows {
            self.check_foreign_keys(&schema, row)?;
        }

        // Commit: assign ids, update every index, persist once.
        let inserted = new_rows.len() as u64;
        let ids: Vec<u64> = {
            let state = self.catalog.table_mut(&ins.table)?;
            new_rows.iter().map(|r| state.store.append(r.clone())).collect()
        };
        for (row, id) in new_rows.iter().zip(&ids) {
            self.index_insert_row(&schema, row, *id)?;
        }
        self.catalog.save_table(&ins.table)?;
        debug!(table = %ins.table, rows = inserted, "insert committed");
        Ok(inserted)
    }

    // ========== UPDATE ==========

    fn execute_update(&mut self, upd: Update) -> Result<u64> {
        let schema = self.catalog.table(&upd.table)?.schema.clone();
        let labels = table_labels(&schema, &schema.name);

        // Target selection through the shared access-path chooser, with the
        // full predicate re-applied as residual.
        let mut targets: Vec<(u64, Vec<Value>, Vec<Value>)> = Vec::new();
        for (id, old_row) in self.candidate_rows(&upd.table, &schema.name, upd.filter.as_ref())? {
            let frame = RowFrame::new(&labels, &old_row);
            let selected = match &upd.filter {
                None => true,
                Some(filter) => eval_predicate(filter, &frame)? == Some(true),
            };
            if !selected {
                continue;
            }

            let mut new_row = old_row.clone();
            for assign in &upd.assignments {
                let pos = schema
                    .column_index(&assign.column)
                    .ok_or_else(|| Error::UnknownColumn(assign.column.clone()))?;
                // Assignments see the row's old values.
                new_row[pos] = eval(&assign.value, &frame)?;
            }
            targets.push((id, old_row, new_row));
        }

        for (_, _, new_row) in &targets {
            self.check_row_shape(&schema, new_row)?;
        }
        self.check_unique_for_update(&schema, &targets)?;
        for (_, _, new_row) in &targets {
            self.check_foreign_keys(&schema, new_row)?;
        }
        self.check_referenced_values_unchanged(&upd.table, &schema, &targets)?;

        // Commit: drop every changed old key before inserting any new one,
        // so a same-batch value permutation never trips a unique index on a
        // key another target is about to vacate. Then rewrite the rows and
        // persist once.
        for (id, old_row, new_row) in &targets {
            for def in &schema.indexes {
                let pos = schema.column_index(&def.column).ok_or_else(|| {
                    Error::Internal(format!("indexed column '{}' missing", def.column))
                })?;
                let (old_value, new_value) = (&old_row[pos], &new_row[pos]);
                if old_value == new_value || old_value.is_null() {
                    continue;
                }
                let index = self
                    .catalog
                    .index_mut(&schema.name, &def.column)
                    .ok_or_else(|| Error::Internal(format!("index '{}' missing", def.name)))?;
                index.remove(old_value, *id);
            }
        }
        for (id, old_row, new_row) in &targets {
            for def in &schema.indexes {
                let pos = schema.column_index(&def.column).ok_or_else(|| {
                    Error::Internal(format!("indexed column '{}' missing", def.column))
                })?;
                let (old_value, new_value) = (&old_row[pos], &new_row[pos]);
                if old_value == new_value || new_value.is_null() {
                    continue;
                }
                let index = self
                    .catalog
                    .index_mut(&schema.name, &def.column)
                    .ok_or_else(|| Error::Internal(format!("index '{}' missing", def.name)))?;
                index.insert(new_value.clone(), *id)?;
            }
        }
        {
            let state = self.catalog.table_mut(&upd.table)?;
            for (id, _, new_row) in &targets {
                state.store.mutate(*id, new_row.clone())?;
            }
        }
        if !targets.is_empty() {
            self.catalog.save_table(&upd.table)?;
        }
        debug!(table = %upd.table, rows = targets.len(), "update committed");
        Ok(targets.len() as u64)
    }

    // ========== DELETE ==========

    fn execute_delete(&mut self, del: Delete) -> Result<u64> {
        let schema = self.catalog.table(&del.table)?.schema.clone();
        let labels = table_labels(&schema, &schema.name);

        let mut targets: Vec<(u64, Vec<Value>)> = Vec::new();
        for (id, row) in self.candidate_rows(&del.table, &schema.name, del.filter.as_ref())? {
            let selected = match &del.filter {
                None => true,
                Some(filter) => {
                    eval_predicate(filter, &RowFrame::new(&labels, &row))? == Some(true)
                }
            };
            if selected {
                targets.push((id, row));
            }
        }

        // Rows referenced by another table's foreign key may not go away.
        let excluded: HashSet<u64> = targets.iter().map(|(id, _)| *id).collect();
        for col in &schema.columns {
            if self
                .catalog
                .referencing_columns(&schema.name, &col.name)
                .is_empty()
            {
                continue;
            }
            let pos = schema.column_index(&col.name).ok_or_else(|| {
                Error::Internal(format!("column '{}' missing", col.name))
            })?;
            for (_, row) in &targets {
                let value = &row[pos];
                if value.is_null() {
                    continue;
                }
                if let Some((rt, rc)) =
                    self.catalog
                        .value_is_referenced(&schema.name, &col.name, value, &excluded)?
                {
                    return Err(Error::RefusedDelete {
                        table: del.table.clone(),
                        referrer: format!("{}.{}", rt, rc),
                    });
                }
            }
        }

        // Commit: drop index entries, remove rows, persist once.
        for (id, row) in &targets {
            for def in &schema.indexes {
                let pos = schema.column_index(&def.column).ok_or_else(|| {
                    Error::Internal(format!("indexed column '{}' missing", def.column))
                })?;
                let value = &row[pos];
                if !value.is_null() {
                    let index = self
                        .catalog
                        .index_mut(&schema.name, &def.column)
                        .ok_or_else(|| Error::Internal(format!("index '{}' missing", def.name)))?;
                    index.remove(value, *id);
                }
            }
        }
        {
            let state = self.catalog.table_mut(&del.table)?;
            for (id, _) in &targets {
                state.store.remove(*id)?;
            }
        }
        if !targets.is_empty() {
            self.catalog.save_table(&del.table)?;
        }
        debug!(table = %del.table, rows = targets.len(), "delete committed");
        Ok(targets.len() as u64)
    }

    // ========== Shared validation ==========

    /// Rows selected by the access path, before residual filtering
    fn candidate_rows(
        &self,
        table: &str,
        qualifier: &str,
        filter: Option<&crate::sql::ast::Expr>,
    ) -> Result<Vec<(u64, Vec<Value>)>> {
        let state = self.catalog.table(table)?;
        let path = choose_access_path(&self.catalog, table, qualifier, filter);
        Ok(match path {
            AccessPath::FullScan => state
                .store
                .iter()
                .map(|r| (r.id, r.values.clone()))
                .collect(),
            AccessPath::IndexScan(probe) => {
                let index = self.catalog.index(table, &probe.column).ok_or_else(|| {
                    Error::Internal(format!("chosen index '{}' missing", probe.index))
                })?;
                probe
                    .row_ids(index)
                    .into_iter()
                    .filter_map(|id| state.store.get(id).map(|r| (r.id, r.values.clone())))
                    .collect()
            }
        })
    }

    /// Per-field type check and NOT NULL enforcement
    fn check_row_shape(&self, schema: &TableSchema, row: &[Value]) -> Result<()> {
        for (col, value) in schema.columns.iter().zip(row) {
            col.data_type.check(&col.name, value)?;
            if value.is_null() && !col.is_nullable() {
                return Err(Error::NullViolation(col.name.clone()));
            }
        }
        Ok(())
    }

    /// Batch uniqueness for INSERT: probe the live index, then a staged
    /// overlay of values accepted earlier in the same batch.
    fn check_unique_for_insert(&self, schema: &TableSchema, rows: &[Vec<Value>]) -> Result<()> {
        for col in schema.unique_columns() {
            let pos = schema.column_index(&col.name).ok_or_else(|| {
                Error::Internal(format!("column '{}' missing", col.name))
            })?;
            let mut staged: HashSet<&Value> = HashSet::new();
            for row in rows {
                let value = &row[pos];
                if value.is_null() {
                    continue;
                }
                if let Some(index) = self.catalog.index(&schema.name, &col.name) {
                    if !index.point_lookup(value).is_empty() {
                        return Err(Error::UniqueViolation(col.name.clone()));
                    }
                }
                if !staged.insert(value) {
                    return Err(Error::UniqueViolation(col.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Batch uniqueness for UPDATE, against a staged view of the batch.
    ///
    /// The live index still holds every target row's pre-statement value,
    /// so an index hit on another target row is not a conflict: that row's
    /// final value is judged by the staged map instead. Only rows outside
    /// the batch conflict through the live index. This keeps same-statement
    /// value permutations (two rows swapping their unique values) legal
    /// while an earlier batch row or any untouched row owning the value
    /// still rejects.
    fn check_unique_for_update(
        &self,
        schema: &TableSchema,
        targets: &[(u64, Vec<Value>, Vec<Value>)],
    ) -> Result<()> {
        let target_ids: HashSet<u64> = targets.iter().map(|(id, _, _)| *id).collect();
        for col in schema.unique_columns() {
            let pos = schema.column_index(&col.name).ok_or_else(|| {
                Error::Internal(format!("column '{}' missing", col.name))
            })?;
            let mut staged: HashMap<&Value, u64> = HashMap::new();
            for (id, _, new_row) in targets {
                let value = &new_row[pos];
                if value.is_null() {
                    continue;
                }
                if let Some(index) = self.catalog.index(&schema.name, &col.name) {
                    if index
                        .point_lookup(value)
                        .iter()
                        .any(|hit| !target_ids.contains(hit))
                    {
                        return Err(Error::UniqueViolation(col.name.clone()));
                    }
                }
                if let Some(prev) = staged.insert(value, *id) {
                    if prev != *id {
                        return Err(Error::UniqueViolation(col.name.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Child-side FK enforcement: every non-NULL FK value must exist in the
    /// referenced unique column. NULL skips the check.
    fn check_foreign_keys(&self, schema: &TableSchema, row: &[Value]) -> Result<()> {
        for col in &schema.columns {
            let Some(fk) = &col.foreign_key else {
                continue;
            };
            let pos = schema.column_index(&col.name).ok_or_else(|| {
                Error::Internal(format!("column '{}' missing", col.name))
            })?;
            let value = &row[pos];
            if value.is_null() {
                continue;
            }
            let index = self.catalog.index(&fk.table, &fk.column).ok_or_else(|| {
                Error::Internal(format!("FK target index {}.{} missing", fk.table, fk.column))
            })?;
            if index.point_lookup(value).is_empty() {
                return Err(Error::FkViolation(format!(
                    "value {} does not exist in {}.{}",
                    value, fk.table, fk.column
                )));
            }
        }
        Ok(())
    }

    /// Parent-side guard for UPDATE: changing a value that child rows still
    /// reference would orphan them.
    fn check_referenced_values_unchanged(
        &self,
        table: &str,
        schema: &TableSchema,
        targets: &[(u64, Vec<Value>, Vec<Value>)],
    ) -> Result<()> {
        let no_exclusions = HashSet::new();
        for col in &schema.columns {
            if self
                .catalog
                .referencing_columns(&schema.name, &col.name)
                .is_empty()
            {
                continue;
            }
            let pos = schema.column_index(&col.name).ok_or_else(|| {
                Error::Internal(format!("column '{}' missing", col.name))
            })?;
            for (_, old_row, new_row) in targets {
                let old_value = &old_row[pos];
                if old_value.is_null() || old_value == &new_row[pos] {
                    continue;
                }
                if let Some((rt, rc)) = self.catalog.value_is_referenced(
                    table,
                    &col.name,
                    old_value,
                    &no_exclusions,
                )? {
                    return Err(Error::FkViolation(format!(
                        "value {} in {}.{} is still referenced by {}.{}",
                        old_value, table, col.name, rt, rc
                    )));
                }
            }
        }
        Ok(())
    }

    /// Add one committed row to every index on its table
    fn index_insert_row(&mut self, schema: &TableSchema, row: &[Value], id: u64) -> Result<()> {
        for def in &schema.indexes {
            let pos = schema.column_index(&def.column).ok_or_else(|| {
                Error::Internal(format!("indexed column '{}' missing", def.column))
            })?;
            let value = &row[pos];
            if value.is_null() {
                continue;
            }
            let index = self
                .catalog
                .index_mut(&schema.name, &def.column)
                .ok_or_else(|| Error::Internal(format!("index '{}' missing", def.name)))?;
            index.insert(value.clone(), id)?;
        }
        Ok(())
    }
}
