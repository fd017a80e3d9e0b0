//! SELECT execution pipeline
//!
//! Source resolution, index-aware nested-loop joins, WHERE filtering,
//! grouping and aggregation, HAVING, ORDER BY, LIMIT and projection, in
//! that order. Index selection is delegated to the planner so EXPLAIN and
//! execution can never diverge.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::aggregate::Accumulator;
use super::engine::ResultSet;
use super::eval::{
    eval, eval_predicate, eval_with_aggregates, resolve_column, ColumnLabel, RowFrame,
};
use super::planner::{
    choose_access_path, choose_join_probe, collect_aggregates, table_labels, AccessPath,
};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::sql::ast::{ColumnRef, Expr, JoinKind, OrderKey, Select, SelectItem};
use crate::storage::store::StoredRow;
use crate::storage::value::Value;

/// Run a SELECT statement against the catalog
pub fn run_select(catalog: &Catalog, select: &Select) -> Result<ResultSet> {
    if let Some(filter) = &select.filter {
        if filter.contains_aggregate() {
            return Err(Error::AggregateMisuse(
                "aggregates are not allowed in WHERE".to_string(),
            ));
        }
    }

    let (columns, rows) = scan_and_join(catalog, select)?;
    let rows = apply_filter(select, &columns, rows)?;

    let aggregates = collect_aggregates(select);
    if !select.group_by.is_empty() || !aggregates.is_empty() {
        run_grouped(select, &columns, rows, aggregates)
    } else {
        if select.having.is_some() {
            return Err(Error::AggregateMisuse(
                "HAVING requires GROUP BY or an aggregate".to_string(),
            ));
        }
        run_plain(select, &columns, rows)
    }
}

/// Stages 1-2: source scan (index scan when the WHERE allows it) and joins
fn scan_and_join(
    catalog: &Catalog,
    select: &Select,
) -> Result<(Vec<ColumnLabel>, Vec<Vec<Value>>)> {
    let from_state = catalog.table(&select.from.name)?;
    let from_qualifier = select.from.qualifier();
    let mut columns = table_labels(&from_state.schema, from_qualifier);

    let path = if select.joins.is_empty() {
        choose_access_path(
            catalog,
            &select.from.name,
            from_qualifier,
            select.filter.as_ref(),
        )
    } else {
        AccessPath::FullScan
    };

    let mut rows: Vec<Vec<Value>> = match &path {
        AccessPath::FullScan => from_state.store.iter().map(|r| r.values.clone()).collect(),
        AccessPath::IndexScan(probe) => {
            let index = catalog
                .index(&select.from.name, &probe.column)
                .ok_or_else(|| {
                    Error::Internal(format!("chosen index '{}' missing", probe.index))
                })?;
            probe
                .row_ids(index)
                .into_iter()
                .filter_map(|id| from_state.store.get(id).map(|r| r.values.clone()))
                .collect()
        }
    };

    for join in &select.joins {
        let right_state = catalog.table(&join.table.name)?;
        let right_qualifier = join.table.qualifier();
        let right_labels = table_labels(&right_state.schema, right_qualifier);
        let right_width = right_labels.len();

        let probe = choose_join_probe(
            catalog,
            &join.table.name,
            right_qualifier,
            &columns,
            &join.on,
        );

        let mut joined_columns = columns.clone();
        joined_columns.extend(right_labels);

        let mut out_rows = Vec::new();
        for left_row in &rows {
            let candidates: Vec<&StoredRow> = match &probe {
                Some(probe) => {
                    let key = eval(&probe.left_expr, &RowFrame::new(&columns, left_row))?;
                    if key.is_null() {
                        Vec::new()
                    } else {
                        let index = catalog
                            .index(&join.table.name, &probe.right_column)
                            .ok_or_else(|| {
                                Error::Internal(format!("chosen index '{}' missing", probe.index))
                            })?;
                        index
                            .point_lookup(&key)
                            .into_iter()
                            .filter_map(|id| right_state.store.get(id))
                            .collect()
                    }
                }
                None => right_state.store.iter().collect(),
            };

            let mut matched = false;
            for right_row in candidates {
                let mut combined = left_row.clone();
                combined.extend(right_row.values.iter().cloned());
                // The full ON predicate runs on each pair; with a probe the
                // equality term is already satisfied and any AND residue is
                // the post-filter.
                if eval_predicate(&join.on, &RowFrame::new(&joined_columns, &combined))?
                    == Some(true)
                {
                    matched = true;
                    out_rows.push(combined);
                }
            }

            if !matched && join.kind == JoinKind::Left {
                let mut combined = left_row.clone();
                combined.extend(std::iter::repeat(Value::Null).take(right_width));
                out_rows.push(combined);
            }
        }

        columns = joined_columns;
        rows = out_rows;
    }

    Ok((columns, rows))
}

/// Stage 3: WHERE keeps only rows whose predicate is exactly TRUE
fn apply_filter(
    select: &Select,
    columns: &[ColumnLabel],
    rows: Vec<Vec<Value>>,
) -> Result<Vec<Vec<Value>>> {
    let Some(filter) = &select.filter else {
        return Ok(rows);
    };
    let mut kept = Vec::new();
    for row in rows {
        if eval_predicate(filter, &RowFrame::new(columns, &row))? == Some(true) {
            kept.push(row);
        }
    }
    Ok(kept)
}

/// Stages 7-9 without grouping: sort on source columns, limit, project
fn run_plain(
    select: &Select,
    columns: &[ColumnLabel],
    mut rows: Vec<Vec<Value>>,
) -> Result<ResultSet> {
    let sort_keys = select
        .order_by
        .iter()
        .map(|key| Ok((resolve_column(columns, &key.column)?, key.ascending)))
        .collect::<Result<Vec<_>>>()?;
    sort_rows(&mut rows, &sort_keys);

    if let Some(limit) = select.limit {
        rows.truncate(limit as usize);
    }

    let multi_source = !select.joins.is_empty();
    let mut out_columns = Vec::new();
    let mut items: Vec<ProjectionItem> = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::Wildcard => {
                for (idx, label) in columns.iter().enumerate() {
                    out_columns.push(if multi_source {
                        format!("{}.{}", label.qualifier, label.name)
                    } else {
                        label.name.clone()
                    });
                    items.push(ProjectionItem::Position(idx));
                }
            }
            SelectItem::Expr { expr, alias } => {
                out_columns.push(projection_name(expr, alias));
                items.push(ProjectionItem::Expr(expr));
            }
        }
    }

    let mut out_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        let frame = RowFrame::new(columns, row);
        let mut out_row = Vec::with_capacity(items.len());
        for item in &items {
            match item {
                ProjectionItem::Position(idx) => out_row.push(row[*idx].clone()),
                ProjectionItem::Expr(expr) => out_row.push(eval(expr, &frame)?),
            }
        }
        out_rows.push(out_row);
    }

    Ok(ResultSet {
        columns: out_columns,
        rows: out_rows,
    })
}

enum ProjectionItem<'a> {
    Position(usize),
    Expr(&'a Expr),
}

/// Stages 4-9 with grouping: partition, aggregate, HAVING, sort, limit,
/// project
fn run_grouped(
    select: &Select,
    columns: &[ColumnLabel],
    rows: Vec<Vec<Value>>,
    aggregates: Vec<Expr>,
) -> Result<ResultSet> {
    // Resolve the grouping tuple.
    let group_idxs = select
        .group_by
        .iter()
        .map(|col| resolve_column(columns, col))
        .collect::<Result<Vec<_>>>()?;

    // Every projection item must be an aggregate or grouped column.
    let mut proj_exprs = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::Wildcard => {
                return Err(Error::AggregateMisuse(
                    "SELECT * cannot be combined with GROUP BY or aggregates".to_string(),
                ));
            }
            SelectItem::Expr { expr, alias } => {
                check_grouped_expr(expr, columns, &group_idxs)?;
                proj_exprs.push((expr, alias));
            }
        }
    }
    if let Some(having) = &select.having {
        check_grouped_expr(having, columns, &group_idxs)?;
    }

    // Partition rows; NULL groups with NULL. Without GROUP BY the whole
    // stream is one group, present even when the stream is empty.
    let mut group_keys: Vec<Vec<Value>> = Vec::new();
    let mut group_members: Vec<Vec<usize>> = Vec::new();
    let mut lookup: HashMap<Vec<Value>, usize> = HashMap::new();
    for (row_idx, row) in rows.iter().enumerate() {
        let key: Vec<Value> = group_idxs.iter().map(|&i| row[i].clone()).collect();
        let group = *lookup.entry(key.clone()).or_insert_with(|| {
            group_keys.push(key);
            group_members.push(Vec::new());
            group_keys.len() - 1
        });
        group_members[group].push(row_idx);
    }
    if group_idxs.is_empty() && group_keys.is_empty() {
        group_keys.push(Vec::new());
        group_members.push(Vec::new());
    }

    // Output frame: projection values first, the grouping tuple appended so
    // ORDER BY can reach grouped columns that were not projected.
    let proj_len = proj_exprs.len();
    let mut ext_columns: Vec<ColumnLabel> = proj_exprs
        .iter()
        .map(|(expr, alias)| match expr {
            Expr::Column(col) if alias.is_none() => {
                ColumnLabel::new(col.table.clone().unwrap_or_default(), col.column.clone())
            }
            _ => ColumnLabel::new("", projection_name(expr, alias)),
        })
        .collect();
    for &idx in &group_idxs {
        ext_columns.push(columns[idx].clone());
    }

    let mut ext_rows: Vec<Vec<Value>> = Vec::new();
    for (key, members) in group_keys.iter().zip(&group_members) {
        let mut computed: Vec<(Expr, Value)> = Vec::new();
        for agg_expr in &aggregates {
            let Expr::Aggregate { func, arg } = agg_expr else {
                return Err(Error::Internal("non-aggregate in aggregate list".into()));
            };
            let mut acc = Accumulator::new(*func, arg.is_none());
            for &row_idx in members {
                match arg {
                    None => acc.add(&Value::Null)?,
                    Some(arg) => {
                        let frame = RowFrame::new(columns, &rows[row_idx]);
                        let value = eval(arg, &frame)?;
                        acc.add(&value)?;
                    }
                }
            }
            computed.push((agg_expr.clone(), acc.finish()));
        }

        // Representative row for grouped-column references. The all-NULL
        // fallback only occurs for the aggregate-only empty group, whose
        // projection cannot touch source columns.
        let rep: Vec<Value> = members
            .first()
            .map(|&i| rows[i].clone())
            .unwrap_or_else(|| vec![Value::Null; columns.len()]);
        let rep_frame = RowFrame::new(columns, &rep);

        if let Some(having) = &select.having {
            let keep =
                eval_with_aggregates(having, &rep_frame, &computed)?.as_truth()? == Some(true);
            if !keep {
                continue;
            }
        }

        let mut out_row = Vec::with_capacity(proj_len + key.len());
        for (expr, _) in &proj_exprs {
            out_row.push(eval_with_aggregates(expr, &rep_frame, &computed)?);
        }
        out_row.extend(key.iter().cloned());
        ext_rows.push(out_row);
    }

    // ORDER BY resolves against projected columns first, then the grouping
    // tuple.
    let sort_keys = select
        .order_by
        .iter()
        .map(|key| Ok((resolve_grouped_order_key(key, &ext_columns, proj_len)?, key.ascending)))
        .collect::<Result<Vec<_>>>()?;
    sort_rows(&mut ext_rows, &sort_keys);

    if let Some(limit) = select.limit {
        ext_rows.truncate(limit as usize);
    }

    let out_columns = proj_exprs
        .iter()
        .map(|(expr, alias)| projection_name(expr, alias))
        .collect();
    let out_rows = ext_rows
        .into_iter()
        .map(|mut row| {
            row.truncate(proj_len);
            row
        })
        .collect();

    Ok(ResultSet {
        columns: out_columns,
        rows: out_rows,
    })
}

fn resolve_grouped_order_key(
    key: &OrderKey,
    ext_columns: &[ColumnLabel],
    proj_len: usize,
) -> Result<usize> {
    match resolve_column(&ext_columns[..proj_len], &key.column) {
        Ok(idx) => Ok(idx),
        Err(Error::UnknownColumn(_)) => {
            let idx = resolve_column(&ext_columns[proj_len..], &key.column)?;
            Ok(proj_len + idx)
        }
        Err(other) => Err(other),
    }
}

/// Non-aggregate column references must be part of the grouping tuple.
fn check_grouped_expr(
    expr: &Expr,
    columns: &[ColumnLabel],
    group_idxs: &[usize],
) -> Result<()> {
    match expr {
        Expr::Column(col) => {
            let idx = resolve_column(columns, col)?;
            if group_idxs.contains(&idx) {
                Ok(())
            } else {
                Err(Error::AggregateMisuse(format!(
                    "column '{}' must appear in GROUP BY or inside an aggregate",
                    col
                )))
            }
        }
        Expr::Aggregate { arg, .. } => match arg {
            Some(arg) if arg.contains_aggregate() => Err(Error::AggregateMisuse(
                "aggregates cannot be nested".to_string(),
            )),
            _ => Ok(()),
        },
        Expr::Literal(_) => Ok(()),
        Expr::Binary { left, right, .. } => {
            check_grouped_expr(left, columns, group_idxs)?;
            check_grouped_expr(right, columns, group_idxs)
        }
        Expr::Not(e) | Expr::Neg(e) => check_grouped_expr(e, columns, group_idxs),
        Expr::IsNull { expr, .. } => check_grouped_expr(expr, columns, group_idxs),
        Expr::InList { expr, list } => {
            check_grouped_expr(expr, columns, group_idxs)?;
            for item in list {
                check_grouped_expr(item, columns, group_idxs)?;
            }
            Ok(())
        }
        Expr::Like { expr, pattern } => {
            check_grouped_expr(expr, columns, group_idxs)?;
            check_grouped_expr(pattern, columns, group_idxs)
        }
    }
}

fn projection_name(expr: &Expr, alias: &Option<String>) -> String {
    match alias {
        Some(alias) => alias.clone(),
        None => match expr {
            Expr::Column(ColumnRef { column, .. }) => column.clone(),
            other => other.to_string(),
        },
    }
}

/// Stable multi-key sort. NULLs order last ascending, first descending.
fn sort_rows(rows: &mut [Vec<Value>], keys: &[(usize, bool)]) {
    rows.sort_by(|a, b| {
        for &(idx, ascending) in keys {
            let va = &a[idx];
            let vb = &b[idx];
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => va.try_compare(vb).ok().flatten().unwrap_or(Ordering::Equal),
            };
            let ord = if ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
