//! End-to-end tests for the query engine facade: DDL, DML, constraint
//! enforcement, joins, grouping and EXPLAIN.

use quillsql::{Error, IntrospectKind, QueryEngine, QueryOutput, Value};

fn engine() -> (tempfile::TempDir, QueryEngine) {
    let dir = tempfile::tempdir().unwrap();
    let engine = QueryEngine::open(dir.path()).unwrap();
    (dir, engine)
}

fn exec(engine: &mut QueryEngine, sql: &str) -> QueryOutput {
    engine
        .execute(sql)
        .unwrap_or_else(|e| panic!("{} failed: {}", sql, e))
}

fn rows(engine: &mut QueryEngine, sql: &str) -> Vec<Vec<Value>> {
    match exec(engine, sql) {
        QueryOutput::Rows(rs) => rs.rows,
        other => panic!("{} did not return rows: {:?}", sql, other),
    }
}

fn int(i: i64) -> Value {
    Value::Integer(i)
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

#[test]
fn test_create_insert_select() {
    let (_dir, mut engine) = engine();

    let ack = exec(
        &mut engine,
        "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(50) NOT NULL)",
    );
    assert_eq!(ack, QueryOutput::Ack("Table created".to_string()));

    let out = exec(
        &mut engine,
        "INSERT INTO users VALUES (1, 'Ann'), (2, 'Bob')",
    );
    assert_eq!(out, QueryOutput::Affected(2));

    assert_eq!(
        rows(&mut engine, "SELECT * FROM users"),
        vec![vec![int(1), text("Ann")], vec![int(2), text("Bob")]]
    );
}

#[test]
fn test_unique_enforcement() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE u (id INT PRIMARY KEY, e VARCHAR(20) UNIQUE)",
    );
    exec(&mut engine, "INSERT INTO u VALUES (1, 'a')");

    let err = engine.execute("INSERT INTO u VALUES (2, 'a')").unwrap_err();
    assert!(matches!(err, Error::UniqueViolation(_)), "got {:?}", err);

    // Post-state: exactly one row (1, 'a').
    assert_eq!(
        rows(&mut engine, "SELECT * FROM u"),
        vec![vec![int(1), text("a")]]
    );
}

#[test]
fn test_multi_row_insert_is_atomic() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY)");
    exec(&mut engine, "INSERT INTO t VALUES (10)");

    // The batch conflicts on its last row, so nothing commits.
    let err = engine
        .execute("INSERT INTO t VALUES (1), (2), (10)")
        .unwrap_err();
    assert!(matches!(err, Error::UniqueViolation(_)));
    assert_eq!(rows(&mut engine, "SELECT * FROM t"), vec![vec![int(10)]]);

    // A within-batch duplicate is also rejected wholesale.
    let err = engine
        .execute("INSERT INTO t VALUES (3), (3)")
        .unwrap_err();
    assert!(matches!(err, Error::UniqueViolation(_)));
    assert_eq!(rows(&mut engine, "SELECT * FROM t"), vec![vec![int(10)]]);
}

#[test]
fn test_not_null_and_type_mismatch() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE t (id INT PRIMARY KEY, name VARCHAR(5) NOT NULL, score FLOAT)",
    );

    let err = engine
        .execute("INSERT INTO t VALUES (1, NULL, 1.5)")
        .unwrap_err();
    assert!(matches!(err, Error::NullViolation(_)));

    let err = engine
        .execute("INSERT INTO t VALUES (1, 'ok', 'oops')")
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));

    // Storage typing is strict: no integer-to-float widening on write.
    let err = engine
        .execute("INSERT INTO t VALUES (1, 'ok', 2)")
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));

    exec(&mut engine, "INSERT INTO t VALUES (1, 'ok', 2.0)");
    assert_eq!(rows(&mut engine, "SELECT * FROM t").len(), 1);
}

#[test]
fn test_varchar_bounds() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (s VARCHAR(5))");

    exec(&mut engine, "INSERT INTO t VALUES ('exact')"); // exactly 5
    let err = engine
        .execute("INSERT INTO t VALUES ('toolong')")
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch(_)));
    assert_eq!(rows(&mut engine, "SELECT * FROM t").len(), 1);
}

#[test]
fn test_referential_integrity_on_delete() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE d (id INT PRIMARY KEY)");
    exec(
        &mut engine,
        "CREATE TABLE e (id INT PRIMARY KEY, d_id INT REFERENCES d(id))",
    );
    exec(&mut engine, "INSERT INTO d VALUES (1)");
    exec(&mut engine, "INSERT INTO e VALUES (10, 1)");

    let err = engine.execute("DELETE FROM d WHERE id = 1").unwrap_err();
    assert!(matches!(err, Error::RefusedDelete { .. }), "got {:?}", err);

    assert_eq!(rows(&mut engine, "SELECT * FROM d"), vec![vec![int(1)]]);
    assert_eq!(
        rows(&mut engine, "SELECT * FROM e"),
        vec![vec![int(10), int(1)]]
    );

    // Removing the child first unblocks the parent.
    exec(&mut engine, "DELETE FROM e WHERE id = 10");
    assert_eq!(exec(&mut engine, "DELETE FROM d WHERE id = 1"), QueryOutput::Affected(1));
}

#[test]
fn test_foreign_key_on_insert() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE d (id INT PRIMARY KEY)");
    exec(
        &mut engine,
        "CREATE TABLE e (id INT PRIMARY KEY, d_id INT REFERENCES d(id))",
    );
    exec(&mut engine, "INSERT INTO d VALUES (1)");

    let err = engine.execute("INSERT INTO e VALUES (10, 2)").unwrap_err();
    assert!(matches!(err, Error::FkViolation(_)));

    // A NULL child value skips the check.
    exec(&mut engine, "INSERT INTO e VALUES (10, NULL)");
    exec(&mut engine, "INSERT INTO e VALUES (11, 1)");
    assert_eq!(rows(&mut engine, "SELECT * FROM e").len(), 2);
}

#[test]
fn test_update_of_referenced_parent_value_is_refused() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE d (id INT PRIMARY KEY)");
    exec(
        &mut engine,
        "CREATE TABLE e (id INT PRIMARY KEY, d_id INT REFERENCES d(id))",
    );
    exec(&mut engine, "INSERT INTO d VALUES (1), (2)");
    exec(&mut engine, "INSERT INTO e VALUES (10, 1)");

    let err = engine
        .execute("UPDATE d SET id = 5 WHERE id = 1")
        .unwrap_err();
    assert!(matches!(err, Error::FkViolation(_)), "got {:?}", err);

    // The unreferenced parent row can move freely.
    assert_eq!(
        exec(&mut engine, "UPDATE d SET id = 5 WHERE id = 2"),
        QueryOutput::Affected(1)
    );
}

#[test]
fn test_refused_drop() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE d (id INT PRIMARY KEY)");
    exec(
        &mut engine,
        "CREATE TABLE e (id INT PRIMARY KEY, d_id INT REFERENCES d(id))",
    );

    let err = engine.execute("DROP TABLE d").unwrap_err();
    assert!(matches!(err, Error::RefusedDrop { .. }));

    exec(&mut engine, "DROP TABLE e");
    exec(&mut engine, "DROP TABLE d");
    // DDL is not idempotent: the second drop fails.
    let err = engine.execute("DROP TABLE d").unwrap_err();
    assert!(matches!(err, Error::UnknownTable(_)));
}

#[test]
fn test_update_maintains_indexes() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY, v INT)");
    exec(&mut engine, "INSERT INTO t VALUES (1, 10), (2, 20)");

    exec(&mut engine, "UPDATE t SET id = 3 WHERE id = 1");

    // Point queries go through the rebuilt index entries.
    assert!(rows(&mut engine, "SELECT * FROM t WHERE id = 1").is_empty());
    assert_eq!(
        rows(&mut engine, "SELECT * FROM t WHERE id = 3"),
        vec![vec![int(3), int(10)]]
    );
    // SET expressions see the old row values.
    exec(&mut engine, "UPDATE t SET v = v + 1");
    assert_eq!(
        rows(&mut engine, "SELECT v FROM t WHERE id = 3"),
        vec![vec![int(11)]]
    );
}

#[test]
fn test_update_swaps_unique_values_within_one_batch() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY, x INT UNIQUE)");
    exec(&mut engine, "INSERT INTO t VALUES (1, 10), (2, 20)");

    // Both rows permute their unique values in one statement; the batch's
    // final state is unique, so this must succeed.
    assert_eq!(
        exec(&mut engine, "UPDATE t SET x = 30 - x"),
        QueryOutput::Affected(2)
    );
    assert_eq!(
        rows(&mut engine, "SELECT id, x FROM t ORDER BY id"),
        vec![vec![int(1), int(20)], vec![int(2), int(10)]]
    );

    // The unique index reflects the swapped keys.
    assert_eq!(
        rows(&mut engine, "SELECT id FROM t WHERE x = 20"),
        vec![vec![int(1)]]
    );
    assert_eq!(
        rows(&mut engine, "SELECT id FROM t WHERE x = 10"),
        vec![vec![int(2)]]
    );

    // Colliding with a row outside the batch still rejects wholesale.
    exec(&mut engine, "INSERT INTO t VALUES (3, 30)");
    let err = engine
        .execute("UPDATE t SET x = 30 WHERE id = 1")
        .unwrap_err();
    assert!(matches!(err, Error::UniqueViolation(_)));
    // Two targets converging on one value reject too.
    let err = engine
        .execute("UPDATE t SET x = 7 WHERE id > 1")
        .unwrap_err();
    assert!(matches!(err, Error::UniqueViolation(_)));
    assert_eq!(
        rows(&mut engine, "SELECT x FROM t ORDER BY id"),
        vec![vec![int(20)], vec![int(10)], vec![int(30)]]
    );
}

#[test]
fn test_insertion_order_preserved() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY)");
    exec(&mut engine, "INSERT INTO t VALUES (3), (1), (2)");
    exec(&mut engine, "DELETE FROM t WHERE id = 1");
    exec(&mut engine, "INSERT INTO t VALUES (4)");

    // Without ORDER BY, survivors come back in insertion order.
    assert_eq!(
        rows(&mut engine, "SELECT * FROM t"),
        vec![vec![int(3)], vec![int(2)], vec![int(4)]]
    );
}

#[test]
fn test_index_aware_join_pipeline() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE s (id INT PRIMARY KEY, name VARCHAR(20))",
    );
    exec(
        &mut engine,
        "CREATE TABLE c (id INT PRIMARY KEY, title VARCHAR(20))",
    );
    exec(
        &mut engine,
        "CREATE TABLE e (id INT PRIMARY KEY, s_id INT REFERENCES s(id), c_id INT REFERENCES c(id))",
    );
    exec(&mut engine, "INSERT INTO s VALUES (1, 'A'), (2, 'B')");
    exec(&mut engine, "INSERT INTO c VALUES (10, 'X'), (11, 'Y')");
    exec(
        &mut engine,
        "INSERT INTO e VALUES (100, 1, 10), (101, 2, 10), (102, 1, 11)",
    );

    let sql = "SELECT s.name, c.title FROM e \
               JOIN s ON e.s_id = s.id \
               JOIN c ON e.c_id = c.id \
               ORDER BY s.name, c.title";
    assert_eq!(
        rows(&mut engine, sql),
        vec![
            vec![text("A"), text("X")],
            vec![text("A"), text("Y")],
            vec![text("B"), text("X")],
        ]
    );

    // EXPLAIN reports both joins as index probes on the primary keys.
    let plan = engine.explain(sql).unwrap();
    assert_eq!(plan.joins.len(), 2);
    assert!(plan.joins.iter().all(|j| j.index_aware));
    assert_eq!(plan.joins[0].index.as_deref(), Some("s_id_idx"));
    assert_eq!(plan.joins[1].index.as_deref(), Some("c_id_idx"));
}

#[test]
fn test_left_join_emits_nulls() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE a (id INT PRIMARY KEY)");
    exec(
        &mut engine,
        "CREATE TABLE b (id INT PRIMARY KEY, a_id INT)",
    );
    exec(&mut engine, "INSERT INTO a VALUES (1), (2)");
    exec(&mut engine, "INSERT INTO b VALUES (10, 1)");

    assert_eq!(
        rows(
            &mut engine,
            "SELECT a.id, b.id FROM a LEFT JOIN b ON b.a_id = a.id ORDER BY a.id",
        ),
        vec![vec![int(1), int(10)], vec![int(2), Value::Null]]
    );
}

#[test]
fn test_group_by_having() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE emp (id INT PRIMARY KEY, dept INT, salary INT)",
    );
    exec(
        &mut engine,
        "INSERT INTO emp VALUES (1, 1, 100), (2, 1, 120), (3, 2, 90), (4, 2, 110), (5, 2, 130)",
    );

    assert_eq!(
        rows(
            &mut engine,
            "SELECT dept, COUNT(*), AVG(salary) FROM emp GROUP BY dept HAVING COUNT(*) >= 3",
        ),
        vec![vec![int(2), int(3), Value::Float(110.0)]]
    );
}

#[test]
fn test_aggregates_over_whole_table_and_empty_input() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (x INT)");

    // Empty stream still yields one aggregate row.
    assert_eq!(
        rows(
            &mut engine,
            "SELECT COUNT(*), COUNT(x), SUM(x), AVG(x), MIN(x), MAX(x) FROM t",
        ),
        vec![vec![
            int(0),
            int(0),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
        ]]
    );

    exec(&mut engine, "INSERT INTO t VALUES (1), (NULL), (3)");
    assert_eq!(
        rows(
            &mut engine,
            "SELECT COUNT(*), COUNT(x), SUM(x), MIN(x), MAX(x) FROM t",
        ),
        vec![vec![int(3), int(2), int(4), int(1), int(3)]]
    );
}

#[test]
fn test_non_grouped_projection_is_misuse() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE emp (id INT PRIMARY KEY, dept INT, salary INT)",
    );
    exec(&mut engine, "INSERT INTO emp VALUES (1, 1, 100)");

    let err = engine
        .execute("SELECT dept, salary FROM emp GROUP BY dept")
        .unwrap_err();
    assert!(matches!(err, Error::AggregateMisuse(_)), "got {:?}", err);

    let err = engine
        .execute("SELECT * FROM emp GROUP BY dept")
        .unwrap_err();
    assert!(matches!(err, Error::AggregateMisuse(_)));

    let err = engine
        .execute("SELECT id FROM emp WHERE COUNT(*) > 1")
        .unwrap_err();
    assert!(matches!(err, Error::AggregateMisuse(_)));
}

#[test]
fn test_three_valued_logic() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE emp (id INT PRIMARY KEY, dept INT)",
    );
    exec(
        &mut engine,
        "INSERT INTO emp VALUES (1, 1), (2, NULL), (3, 2)",
    );

    // dept = NULL never selects; IS NULL does.
    assert_eq!(
        rows(&mut engine, "SELECT COUNT(*) FROM emp WHERE dept = NULL"),
        vec![vec![int(0)]]
    );
    assert_eq!(
        rows(&mut engine, "SELECT COUNT(*) FROM emp WHERE dept IS NULL"),
        vec![vec![int(1)]]
    );
    assert_eq!(
        rows(&mut engine, "SELECT COUNT(*) FROM emp WHERE dept IS NOT NULL"),
        vec![vec![int(2)]]
    );
}

#[test]
fn test_like_boundaries() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (s VARCHAR(20))");
    exec(
        &mut engine,
        "INSERT INTO t VALUES (''), ('a'), ('abc'), ('Abc')",
    );

    // '%' matches every TEXT value including the empty string.
    assert_eq!(
        rows(&mut engine, "SELECT COUNT(*) FROM t WHERE s LIKE '%'"),
        vec![vec![int(4)]]
    );
    // '_' does not match empty.
    assert_eq!(
        rows(&mut engine, "SELECT COUNT(*) FROM t WHERE s LIKE '_'"),
        vec![vec![int(1)]]
    );
    // Case-sensitive matching.
    assert_eq!(
        rows(&mut engine, "SELECT COUNT(*) FROM t WHERE s LIKE 'a%'"),
        vec![vec![int(2)]]
    );
}

#[test]
fn test_order_by_null_placement_and_limit() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY, v INT)");
    exec(
        &mut engine,
        "INSERT INTO t VALUES (1, 5), (2, NULL), (3, 1)",
    );

    // NULLs sort last ascending.
    assert_eq!(
        rows(&mut engine, "SELECT id FROM t ORDER BY v"),
        vec![vec![int(3)], vec![int(1)], vec![int(2)]]
    );
    // And first descending.
    assert_eq!(
        rows(&mut engine, "SELECT id FROM t ORDER BY v DESC"),
        vec![vec![int(2)], vec![int(1)], vec![int(3)]]
    );
    assert_eq!(
        rows(&mut engine, "SELECT id FROM t ORDER BY v LIMIT 2"),
        vec![vec![int(3)], vec![int(1)]]
    );
}

#[test]
fn test_where_index_range_scan() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY, v INT)");
    for i in 1..=10 {
        exec(
            &mut engine,
            &format!("INSERT INTO t VALUES ({}, {})", i, i * 10),
        );
    }

    let plan = engine
        .explain("SELECT * FROM t WHERE id > 7 AND v > 0")
        .unwrap();
    let access = format!("{}", plan);
    assert!(access.contains("index scan(t_id_idx)"), "plan: {}", access);

    assert_eq!(
        rows(&mut engine, "SELECT id FROM t WHERE id > 7 AND v > 0"),
        vec![vec![int(8)], vec![int(9)], vec![int(10)]]
    );
    // A range fully outside the key domain yields zero rows.
    assert!(rows(&mut engine, "SELECT * FROM t WHERE id > 100").is_empty());
}

#[test]
fn test_ambiguous_and_unknown_columns() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE a (id INT PRIMARY KEY)");
    exec(&mut engine, "CREATE TABLE b (id INT PRIMARY KEY)");
    exec(&mut engine, "INSERT INTO a VALUES (1)");
    exec(&mut engine, "INSERT INTO b VALUES (1)");

    let err = engine
        .execute("SELECT id FROM a JOIN b ON a.id = b.id")
        .unwrap_err();
    assert!(matches!(err, Error::AmbiguousColumn(_)));

    let err = engine.execute("SELECT nope FROM a").unwrap_err();
    assert!(matches!(err, Error::UnknownColumn(_)));

    let err = engine.execute("SELECT * FROM missing").unwrap_err();
    assert!(matches!(err, Error::UnknownTable(_)));
}

#[test]
fn test_date_columns() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE ev (id INT PRIMARY KEY, happened DATE)",
    );
    exec(
        &mut engine,
        "INSERT INTO ev VALUES (1, '2024-03-01'), (2, '2023-12-31'), (3, '2024-01-15')",
    );

    // Dates order by (year, month, day).
    assert_eq!(
        rows(&mut engine, "SELECT id FROM ev ORDER BY happened"),
        vec![vec![int(2)], vec![int(3)], vec![int(1)]]
    );
    assert_eq!(
        rows(
            &mut engine,
            "SELECT id FROM ev WHERE happened > '2024-01-01' ORDER BY id",
        ),
        vec![vec![int(1)], vec![int(3)]]
    );
}

#[test]
fn test_projection_aliases_and_expressions() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (a INT, b INT)");
    exec(&mut engine, "INSERT INTO t VALUES (3, 4)");

    let out = exec(&mut engine, "SELECT a + b AS total, a * 2 FROM t");
    let QueryOutput::Rows(rs) = out else {
        panic!("expected rows");
    };
    assert_eq!(rs.columns, vec!["total", "a * 2"]);
    assert_eq!(rs.rows, vec![vec![int(7), int(6)]]);
}

#[test]
fn test_in_list_and_not() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY)");
    exec(&mut engine, "INSERT INTO t VALUES (1), (2), (3), (4)");

    assert_eq!(
        rows(&mut engine, "SELECT id FROM t WHERE id IN (2, 4)"),
        vec![vec![int(2)], vec![int(4)]]
    );
    assert_eq!(
        rows(&mut engine, "SELECT id FROM t WHERE NOT id IN (2, 4)"),
        vec![vec![int(1)], vec![int(3)]]
    );
}

#[test]
fn test_execute_explain_statement() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY)");
    exec(&mut engine, "INSERT INTO t VALUES (1)");

    let out = exec(&mut engine, "EXPLAIN SELECT * FROM t WHERE id = 1");
    let QueryOutput::Rows(rs) = out else {
        panic!("expected rows");
    };
    assert_eq!(rs.columns, vec!["plan"]);
    let rendered: Vec<String> = rs
        .rows
        .iter()
        .map(|r| r[0].to_string())
        .collect();
    assert_eq!(rendered[0], "SELECT");
    assert!(rendered[1].contains("index scan(t_id_idx)"));

    // EXPLAIN executed nothing: the table still has its single row.
    assert_eq!(rows(&mut engine, "SELECT * FROM t").len(), 1);
}

#[test]
fn test_introspection() {
    let (_dir, mut engine) = engine();
    exec(
        &mut engine,
        "CREATE TABLE t (id INT PRIMARY KEY, v VARCHAR(10) UNIQUE, w INT)",
    );
    exec(&mut engine, "CREATE INDEX t_w ON t(w)");
    exec(&mut engine, "INSERT INTO t VALUES (1, 'a', 5), (2, 'b', NULL)");

    let tables = engine.introspect(IntrospectKind::Tables);
    assert_eq!(tables.rows.len(), 1);
    assert_eq!(tables.rows[0][0], text("t"));
    assert_eq!(tables.rows[0][1], int(3)); // columns
    assert_eq!(tables.rows[0][2], int(2)); // rows
    assert_eq!(tables.rows[0][3], text("id")); // primary key

    let indexes = engine.introspect(IntrospectKind::Indexes);
    assert_eq!(indexes.rows.len(), 3);
    let w_row = indexes
        .rows
        .iter()
        .find(|r| r[0] == text("t_w"))
        .expect("explicit index listed");
    assert_eq!(w_row[3], Value::Boolean(false));
    // NULL w was not indexed.
    assert_eq!(w_row[4], int(1));
}

#[test]
fn test_single_statement_enforced() {
    let (_dir, mut engine) = engine();
    exec(&mut engine, "CREATE TABLE t (id INT PRIMARY KEY)");

    let err = engine
        .execute("INSERT INTO t VALUES (1); INSERT INTO t VALUES (2)")
        .unwrap_err();
    assert!(matches!(err, Error::Syntax { .. }));
    // Nothing from the rejected text ran.
    assert!(rows(&mut engine, "SELECT * FROM t").is_empty());
}
