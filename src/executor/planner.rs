//! Access-path selection and EXPLAIN plans
//!
//! One chooser decides between full scans and index scans; the executor
//! runs its decisions and EXPLAIN renders them, so the two can never
//! disagree. EXPLAIN consults only the catalog and never touches rows.

use serde::Serialize;
use std::fmt;

use super::eval::{resolve_column, ColumnLabel};
use crate::catalog::{Catalog, TableSchema};
use crate::error::Result;
use crate::sql::ast::{
    BinaryOp, ColumnRef, Expr, Select, SelectItem, Statement,
};
use crate::storage::btree::BTreeIndex;
use crate::storage::value::Value;

/// Comparison operators an index probe understands
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CompareOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    fn from_binary(op: BinaryOp) -> Option<Self> {
        match op {
            BinaryOp::Eq => Some(CompareOp::Eq),
            BinaryOp::Lt => Some(CompareOp::Lt),
            BinaryOp::Lte => Some(CompareOp::Lte),
            BinaryOp::Gt => Some(CompareOp::Gt),
            BinaryOp::Gte => Some(CompareOp::Gte),
            _ => None,
        }
    }

    /// Mirror of the operator for a flipped `literal OP column` condition
    fn flipped(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Lte => CompareOp::Gte,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Gte => CompareOp::Lte,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        };
        write!(f, "{}", text)
    }
}

/// A chosen index probe for a point or range condition
#[derive(Debug, Clone, PartialEq)]
pub struct IndexProbe {
    pub index: String,
    pub column: String,
    pub op: CompareOp,
    pub key: Value,
}

impl IndexProbe {
    /// Candidate row-ids for this probe, in key order
    pub fn row_ids(&self, index: &BTreeIndex) -> Vec<u64> {
        match self.op {
            CompareOp::Eq => index.point_lookup(&self.key),
            CompareOp::Lt => index.range_lookup(None, Some(&self.key), true, false),
            CompareOp::Lte => index.range_lookup(None, Some(&self.key), true, true),
            CompareOp::Gt => index.range_lookup(Some(&self.key), None, false, true),
            CompareOp::Gte => index.range_lookup(Some(&self.key), None, true, true),
        }
    }
}

/// How a table source will be read
#[derive(Debug, Clone, PartialEq)]
pub enum AccessPath {
    FullScan,
    IndexScan(IndexProbe),
}

/// An index-aware nested-loop probe for one join
#[derive(Debug, Clone, PartialEq)]
pub struct JoinProbe {
    pub index: String,
    pub right_column: String,
    /// Evaluated against each accumulated left row to produce the probe key
    pub left_expr: Expr,
}

/// Split a predicate into its top-level AND conjuncts
pub fn conjuncts(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut out = conjuncts(left);
            out.extend(conjuncts(right));
            out
        }
        other => vec![other],
    }
}

/// Pick the access path for a single-table scan under a WHERE predicate.
///
/// The first AND conjunct of the shape `col OP literal` (or flipped) whose
/// column is indexed turns the scan into an index scan; the caller applies
/// the full predicate as a residual on each retrieved row.
pub fn choose_access_path(
    catalog: &Catalog,
    table: &str,
    qualifier: &str,
    filter: Option<&Expr>,
) -> AccessPath {
    let Some(filter) = filter else {
        return AccessPath::FullScan;
    };
    let Ok(state) = catalog.table(table) else {
        return AccessPath::FullScan;
    };

    for conjunct in conjuncts(filter) {
        if let Some(probe) = probe_from_condition(catalog, &state.schema, qualifier, conjunct) {
            return AccessPath::IndexScan(probe);
        }
    }
    AccessPath::FullScan
}

fn probe_from_condition(
    catalog: &Catalog,
    schema: &TableSchema,
    qualifier: &str,
    condition: &Expr,
) -> Option<IndexProbe> {
    let Expr::Binary { left, op, right } = condition else {
        return None;
    };
    let op = CompareOp::from_binary(*op)?;

    let (col, key, op) = match (left.as_ref(), right.as_ref()) {
        (Expr::Column(col), Expr::Literal(lit)) => (col, lit.to_value(), op),
        (Expr::Literal(lit), Expr::Column(col)) => (col, lit.to_value(), op.flipped()),
        _ => return None,
    };

    if let Some(table) = &col.table {
        if !table.eq_ignore_ascii_case(qualifier) {
            return None;
        }
    }
    let column = schema.column(&col.column)?;
    if column.data_type.check(&column.name, &key).is_err() {
        // A key of the wrong type cannot probe the index; leave the
        // condition to the residual filter, which reports the mismatch.
        return None;
    }

    let index = catalog.index(&schema.name, &column.name)?;
    Some(IndexProbe {
        index: index.name.clone(),
        column: column.name.clone(),
        op,
        key,
    })
}

/// Pick an index probe for a join's inner (right) side.
///
/// Scans the ON predicate's AND conjuncts for an equality whose one side is
/// a column of the joined table and whose other side resolves against the
/// rows accumulated so far. If the right-side column carries an index the
/// inner scan becomes a probe; when both sides of the equality are indexed
/// the right side wins by construction, since only it can be probed.
pub fn choose_join_probe(
    catalog: &Catalog,
    right_table: &str,
    right_qualifier: &str,
    left_columns: &[ColumnLabel],
    on: &Expr,
) -> Option<JoinProbe> {
    let state = catalog.table(right_table).ok()?;

    for conjunct in conjuncts(on) {
        let Expr::Binary {
            left,
            op: BinaryOp::Eq,
            right,
        } = conjunct
        else {
            continue;
        };

        for (probe_side, outer_side) in [(left, right), (right, left)] {
            let Expr::Column(col) = probe_side.as_ref() else {
                continue;
            };
            if !column_belongs_to(col, right_qualifier, &state.schema, left_columns) {
                continue;
            }
            // The other side must be computable from the left rows alone.
            if !expr_resolves_in(outer_side, left_columns) {
                continue;
            }
            let Some(column) = state.schema.column(&col.column) else {
                continue;
            };
            if let Some(index) = catalog.index(&state.schema.name, &column.name) {
                return Some(JoinProbe {
                    index: index.name.clone(),
                    right_column: column.name.clone(),
                    left_expr: outer_side.as_ref().clone(),
                });
            }
        }
    }
    None
}

fn column_belongs_to(
    col: &ColumnRef,
    qualifier: &str,
    schema: &TableSchema,
    left_columns: &[ColumnLabel],
) -> bool {
    match &col.table {
        Some(table) => table.eq_ignore_ascii_case(qualifier),
        // Unqualified: it must exist on the right table and not also
        // resolve against the left rows, else it is not unambiguously ours.
        None => {
            schema.column(&col.column).is_some()
                && resolve_column(left_columns, col).is_err()
        }
    }
}

fn expr_resolves_in(expr: &Expr, columns: &[ColumnLabel]) -> bool {
    match expr {
        Expr::Literal(_) => true,
        Expr::Column(col) => resolve_column(columns, col).is_ok(),
        Expr::Binary { left, right, .. } => {
            expr_resolves_in(left, columns) && expr_resolves_in(right, columns)
        }
        Expr::Not(e) | Expr::Neg(e) => expr_resolves_in(e, columns),
        Expr::IsNull { expr, .. } => expr_resolves_in(expr, columns),
        Expr::InList { expr, list } => {
            expr_resolves_in(expr, columns) && list.iter().all(|e| expr_resolves_in(e, columns))
        }
        Expr::Like { expr, pattern } => {
            expr_resolves_in(expr, columns) && expr_resolves_in(pattern, columns)
        }
        Expr::Aggregate { .. } => false,
    }
}

/// Labels a table contributes to an intermediate row
pub fn table_labels(schema: &TableSchema, qualifier: &str) -> Vec<ColumnLabel> {
    schema
        .columns
        .iter()
        .map(|c| ColumnLabel::new(qualifier, c.name.clone()))
        .collect()
}

/// Aggregate calls appearing in the projection and HAVING, deduplicated by
/// structural equality
pub fn collect_aggregates(select: &Select) -> Vec<Expr> {
    let mut out: Vec<Expr> = Vec::new();
    let mut push = |expr: &Expr| {
        collect_from(expr, &mut out);
    };
    for item in &select.projection {
        if let SelectItem::Expr { expr, .. } = item {
            push(expr);
        }
    }
    if let Some(having) = &select.having {
        push(having);
    }
    out
}

fn collect_from(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Aggregate { .. } => {
            if !out.contains(expr) {
                out.push(expr.clone());
            }
        }
        Expr::Literal(_) | Expr::Column(_) => {}
        Expr::Binary { left, right, .. } => {
            collect_from(left, out);
            collect_from(right, out);
        }
        Expr::Not(e) | Expr::Neg(e) => collect_from(e, out),
        Expr::IsNull { expr, .. } => collect_from(expr, out),
        Expr::InList { expr, list } => {
            collect_from(expr, out);
            for item in list {
                collect_from(item, out);
            }
        }
        Expr::Like { expr, pattern } => {
            collect_from(expr, out);
            collect_from(pattern, out);
        }
    }
}

// ========== Plan document ==========

/// Access method as rendered in a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AccessPlan {
    FullScan,
    IndexScan {
        index: String,
        column: String,
        op: String,
        key: String,
    },
}

impl fmt::Display for AccessPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPlan::FullScan => write!(f, "full scan"),
            AccessPlan::IndexScan {
                index,
                column,
                op,
                key,
            } => write!(f, "index scan({}) {} {} {}", index, column, op, key),
        }
    }
}

/// One table source in a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePlan {
    pub table: String,
    pub access: AccessPlan,
}

/// One join step in a plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinPlan {
    pub table: String,
    pub kind: String,
    pub index_aware: bool,
    pub index: Option<String>,
}

/// Structural description of how a statement would execute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub statement: String,
    pub source: Option<SourcePlan>,
    pub joins: Vec<JoinPlan>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
}

impl Plan {
    fn new(statement: &str) -> Self {
        Self {
            statement: statement.to_string(),
            source: None,
            joins: Vec::new(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Render the plan as indented lines, one per step
    pub fn lines(&self) -> Vec<String> {
        let mut out = vec![self.statement.clone()];
        if let Some(source) = &self.source {
            out.push(format!("  scan {} ({})", source.table, source.access));
        }
        for join in &self.joins {
            let method = if join.index_aware {
                format!(
                    "index probe({})",
                    join.index.as_deref().unwrap_or_default()
                )
            } else {
                "nested loop".to_string()
            };
            out.push(format!("  join {} ({} join, {})", join.table, join.kind, method));
        }
        if !self.group_by.is_empty() {
            out.push(format!("  group by {}", self.group_by.join(", ")));
        }
        if !self.aggregates.is_empty() {
            out.push(format!("  aggregates: {}", self.aggregates.join(", ")));
        }
        if !self.order_by.is_empty() {
            out.push(format!("  order by {}", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            out.push(format!("  limit {}", limit));
        }
        out
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.lines().join("\n"))
    }
}

fn access_plan(path: &AccessPath) -> AccessPlan {
    match path {
        AccessPath::FullScan => AccessPlan::FullScan,
        AccessPath::IndexScan(probe) => AccessPlan::IndexScan {
            index: probe.index.clone(),
            column: probe.column.clone(),
            op: probe.op.to_string(),
            key: probe.key.to_string(),
        },
    }
}

/// Build the plan for any statement without reading or writing a row
pub fn build_plan(catalog: &Catalog, stmt: &Statement) -> Result<Plan> {
    match stmt {
        Statement::Select(select) | Statement::Explain(select) => build_select_plan(catalog, select),
        Statement::Insert(insert) => {
            catalog.table(&insert.table)?;
            let mut plan = Plan::new("INSERT");
            plan.source = Some(SourcePlan {
                table: insert.table.clone(),
                access: AccessPlan::FullScan,
            });
            Ok(plan)
        }
        Statement::Update(update) => {
            catalog.table(&update.table)?;
            let mut plan = Plan::new("UPDATE");
            let path =
                choose_access_path(catalog, &update.table, &update.table, update.filter.as_ref());
            plan.source = Some(SourcePlan {
                table: update.table.clone(),
                access: access_plan(&path),
            });
            Ok(plan)
        }
        Statement::Delete(delete) => {
            catalog.table(&delete.table)?;
            let mut plan = Plan::new("DELETE");
            let path =
                choose_access_path(catalog, &delete.table, &delete.table, delete.filter.as_ref());
            plan.source = Some(SourcePlan {
                table: delete.table.clone(),
                access: access_plan(&path),
            });
            Ok(plan)
        }
        Statement::CreateTable(ct) => Ok({
            let mut plan = Plan::new("CREATE TABLE");
            plan.source = Some(SourcePlan {
                table: ct.table.clone(),
                access: AccessPlan::FullScan,
            });
            plan
        }),
        Statement::CreateIndex(ci) => {
            catalog.table(&ci.table)?;
            let mut plan = Plan::new("CREATE INDEX");
            plan.source = Some(SourcePlan {
                table: ci.table.clone(),
                access: AccessPlan::FullScan,
            });
            Ok(plan)
        }
        Statement::DropTable(dt) => {
            catalog.table(&dt.table)?;
            let mut plan = Plan::new("DROP TABLE");
            plan.source = Some(SourcePlan {
                table: dt.table.clone(),
                access: AccessPlan::FullScan,
            });
            Ok(plan)
        }
    }
}

fn build_select_plan(catalog: &Catalog, select: &Select) -> Result<Plan> {
    let mut plan = Plan::new("SELECT");

    let from_state = catalog.table(&select.from.name)?;
    let from_qualifier = select.from.qualifier();

    let path = if select.joins.is_empty() {
        choose_access_path(catalog, &select.from.name, from_qualifier, select.filter.as_ref())
    } else {
        AccessPath::FullScan
    };
    plan.source = Some(SourcePlan {
        table: select.from.name.clone(),
        access: access_plan(&path),
    });

    // Accumulate labels the same way execution does, so probe choices match.
    let mut left_columns = table_labels(&from_state.schema, from_qualifier);
    for join in &select.joins {
        let right_state = catalog.table(&join.table.name)?;
        let right_qualifier = join.table.qualifier();
        let probe = choose_join_probe(
            catalog,
            &join.table.name,
            right_qualifier,
            &left_columns,
            &join.on,
        );
        plan.joins.push(JoinPlan {
            table: join.table.name.clone(),
            kind: join.kind.to_string(),
            index_aware: probe.is_some(),
            index: probe.map(|p| p.index),
        });
        left_columns.extend(table_labels(&right_state.schema, right_qualifier));
    }

    plan.group_by = select.group_by.iter().map(|c| c.to_string()).collect();
    plan.aggregates = collect_aggregates(select)
        .iter()
        .map(|e| e.to_string())
        .collect();
    plan.order_by = select
        .order_by
        .iter()
        .map(|k| {
            format!(
                "{} {}",
                k.column,
                if k.ascending { "ASC" } else { "DESC" }
            )
        })
        .collect();
    plan.limit = select.limit;

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, DataType, TableSchema};
    use crate::error::Error;
    use crate::sql::Parser;

    fn setup() -> (tempfile::TempDir, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = Catalog::open(dir.path()).unwrap();
        catalog
            .create_table(
                TableSchema::new(
                    "emp",
                    vec![
                        Column::new("id", DataType::Integer).primary_key(),
                        Column::new("dept", DataType::Integer),
                        Column::new("salary", DataType::Integer),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        (dir, catalog)
    }

    fn select(sql: &str) -> Select {
        match Parser::parse_statement(sql).unwrap() {
            Statement::Select(s) => s,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_indexed_equality_becomes_index_scan() {
        let (_dir, catalog) = setup();
        let s = select("SELECT * FROM emp WHERE id = 3");
        let path = choose_access_path(&catalog, "emp", "emp", s.filter.as_ref());
        match path {
            AccessPath::IndexScan(probe) => {
                assert_eq!(probe.index, "emp_id_idx");
                assert_eq!(probe.op, CompareOp::Eq);
                assert_eq!(probe.key, Value::Integer(3));
            }
            other => panic!("expected index scan, got {:?}", other),
        }
    }

    #[test]
    fn test_unindexed_column_stays_full_scan() {
        let (_dir, catalog) = setup();
        let s = select("SELECT * FROM emp WHERE dept = 3");
        let path = choose_access_path(&catalog, "emp", "emp", s.filter.as_ref());
        assert_eq!(path, AccessPath::FullScan);
    }

    #[test]
    fn test_flipped_literal_range() {
        let (_dir, catalog) = setup();
        // 10 < id is the same probe as id > 10.
        let s = select("SELECT * FROM emp WHERE 10 < id");
        let path = choose_access_path(&catalog, "emp", "emp", s.filter.as_ref());
        match path {
            AccessPath::IndexScan(probe) => assert_eq!(probe.op, CompareOp::Gt),
            other => panic!("expected index scan, got {:?}", other),
        }
    }

    #[test]
    fn test_indexable_conjunct_found_inside_and() {
        let (_dir, catalog) = setup();
        let s = select("SELECT * FROM emp WHERE dept = 1 AND id = 3");
        let path = choose_access_path(&catalog, "emp", "emp", s.filter.as_ref());
        assert!(matches!(path, AccessPath::IndexScan(_)));
        // OR cannot be reduced to one probe.
        let s = select("SELECT * FROM emp WHERE dept = 1 OR id = 3");
        let path = choose_access_path(&catalog, "emp", "emp", s.filter.as_ref());
        assert_eq!(path, AccessPath::FullScan);
    }

    #[test]
    fn test_mistyped_key_is_not_probed() {
        let (_dir, catalog) = setup();
        let s = select("SELECT * FROM emp WHERE id = 'three'");
        let path = choose_access_path(&catalog, "emp", "emp", s.filter.as_ref());
        assert_eq!(path, AccessPath::FullScan);
    }

    #[test]
    fn test_join_probe_picks_right_side_index() {
        let (_dir, mut catalog) = setup();
        catalog
            .create_table(
                TableSchema::new(
                    "task",
                    vec![
                        Column::new("id", DataType::Integer).primary_key(),
                        Column::new("emp_id", DataType::Integer).references("emp", "id"),
                    ],
                )
                .unwrap(),
            )
            .unwrap();

        let s = select("SELECT * FROM task t JOIN emp e ON t.emp_id = e.id");
        let left = table_labels(&catalog.table("task").unwrap().schema, "t");
        let probe = choose_join_probe(&catalog, "emp", "e", &left, &s.joins[0].on).unwrap();
        assert_eq!(probe.index, "emp_id_idx");
        assert_eq!(probe.right_column, "id");

        // Reversed equality chooses the same probe.
        let s = select("SELECT * FROM task t JOIN emp e ON e.id = t.emp_id");
        let probe = choose_join_probe(&catalog, "emp", "e", &left, &s.joins[0].on).unwrap();
        assert_eq!(probe.index, "emp_id_idx");
    }

    #[test]
    fn test_explain_matches_chooser() {
        let (_dir, catalog) = setup();
        let stmt = Parser::parse_statement(
            "SELECT dept, COUNT(*) FROM emp WHERE id > 5 GROUP BY dept ORDER BY dept LIMIT 3",
        )
        .unwrap();
        let plan = build_plan(&catalog, &stmt).unwrap();

        assert_eq!(plan.statement, "SELECT");
        assert!(matches!(
            plan.source.as_ref().unwrap().access,
            AccessPlan::IndexScan { .. }
        ));
        assert_eq!(plan.group_by, vec!["dept"]);
        assert_eq!(plan.aggregates, vec!["COUNT(*)"]);
        assert_eq!(plan.order_by, vec!["dept ASC"]);
        assert_eq!(plan.limit, Some(3));

        let rendered = plan.to_string();
        assert!(rendered.contains("index scan(emp_id_idx)"));
    }

    #[test]
    fn test_explain_unknown_table_fails() {
        let (_dir, catalog) = setup();
        let stmt = Parser::parse_statement("SELECT * FROM ghosts").unwrap();
        assert!(matches!(
            build_plan(&catalog, &stmt),
            Err(Error::UnknownTable(_))
        ));
    }
}
