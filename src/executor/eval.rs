//! Row-level expression evaluation
//!
//! Evaluates scalar expressions and predicates against one labelled row.
//! Predicates follow three-valued logic: comparisons with NULL yield NULL,
//! `NULL AND FALSE` is FALSE, `NULL OR TRUE` is TRUE, and WHERE/HAVING keep
//! only rows whose predicate is exactly TRUE.

use regex::Regex;

use crate::error::{Error, Result};
use crate::sql::ast::{BinaryOp, ColumnRef, Expr};
use crate::storage::value::Value;

/// Label of one column in an intermediate row: the source qualifier (table
/// alias or table name; empty for computed columns) plus the column name.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLabel {
    pub qualifier: String,
    pub name: String,
}

impl ColumnLabel {
    pub fn new(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            name: name.into(),
        }
    }
}

/// A borrowed row with its column labels
#[derive(Debug, Clone, Copy)]
pub struct RowFrame<'a> {
    pub columns: &'a [ColumnLabel],
    pub values: &'a [Value],
}

impl<'a> RowFrame<'a> {
    pub fn new(columns: &'a [ColumnLabel], values: &'a [Value]) -> Self {
        Self { columns, values }
    }
}

/// Resolve a column reference against a set of labels. Bare names must be
/// unambiguous; qualified names match `qualifier.column`.
pub fn resolve_column(columns: &[ColumnLabel], col: &ColumnRef) -> Result<usize> {
    match &col.table {
        Some(qualifier) => columns
            .iter()
            .position(|l| {
                l.qualifier.eq_ignore_ascii_case(qualifier)
                    && l.name.eq_ignore_ascii_case(&col.column)
            })
            .ok_or_else(|| Error::UnknownColumn(format!("{}.{}", qualifier, col.column))),
        None => {
            let mut matches = columns
                .iter()
                .enumerate()
                .filter(|(_, l)| l.name.eq_ignore_ascii_case(&col.column));
            let first = matches.next();
            let second = matches.next();
            match (first, second) {
                (Some((idx, _)), None) => Ok(idx),
                (Some(_), Some(_)) => Err(Error::AmbiguousColumn(col.column.clone())),
                (None, _) => Err(Error::UnknownColumn(col.column.clone())),
            }
        }
    }
}

/// Evaluate an expression against a row. Aggregate calls are resolved by
/// the grouping layer; one reaching this evaluator is a misuse.
pub fn eval(expr: &Expr, frame: &RowFrame) -> Result<Value> {
    eval_inner(expr, frame, &[])
}

/// Evaluate with a set of pre-computed aggregate results. Aggregate calls
/// are matched by structural equality, as HAVING requires.
pub fn eval_with_aggregates(
    expr: &Expr,
    frame: &RowFrame,
    aggregates: &[(Expr, Value)],
) -> Result<Value> {
    eval_inner(expr, frame, aggregates)
}

fn eval_inner(expr: &Expr, frame: &RowFrame, aggregates: &[(Expr, Value)]) -> Result<Value> {
    if let Some((_, value)) = aggregates.iter().find(|(agg, _)| agg == expr) {
        return Ok(value.clone());
    }

    match expr {
        Expr::Literal(lit) => Ok(lit.to_value()),

        Expr::Column(col) => {
            let idx = resolve_column(frame.columns, col)?;
            Ok(frame.values[idx].clone())
        }

        Expr::Aggregate { .. } => Err(Error::AggregateMisuse(format!(
            "aggregate {} is not allowed here",
            expr
        ))),

        Expr::Binary { left, op, right } => match op {
            BinaryOp::And => {
                let l = eval_inner(left, frame, aggregates)?.as_truth()?;
                let r = eval_inner(right, frame, aggregates)?.as_truth()?;
                Ok(truth_to_value(and3(l, r)))
            }
            BinaryOp::Or => {
                let l = eval_inner(left, frame, aggregates)?.as_truth()?;
                let r = eval_inner(right, frame, aggregates)?.as_truth()?;
                Ok(truth_to_value(or3(l, r)))
            }
            BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt
            | BinaryOp::Gte => {
                let l = eval_inner(left, frame, aggregates)?;
                let r = eval_inner(right, frame, aggregates)?;
                match l.try_compare(&r)? {
                    None => Ok(Value::Null),
                    Some(ord) => {
                        let b = match op {
                            BinaryOp::Eq => ord.is_eq(),
                            BinaryOp::Neq => ord.is_ne(),
                            BinaryOp::Lt => ord.is_lt(),
                            BinaryOp::Lte => ord.is_le(),
                            BinaryOp::Gt => ord.is_gt(),
                            _ => ord.is_ge(),
                        };
                        Ok(Value::Boolean(b))
                    }
                }
            }
            BinaryOp::Add => eval_inner(left, frame, aggregates)?
                .add(&eval_inner(right, frame, aggregates)?),
            BinaryOp::Sub => eval_inner(left, frame, aggregates)?
                .sub(&eval_inner(right, frame, aggregates)?),
            BinaryOp::Mul => eval_inner(left, frame, aggregates)?
                .mul(&eval_inner(right, frame, aggregates)?),
            BinaryOp::Div => eval_inner(left, frame, aggregates)?
                .div(&eval_inner(right, frame, aggregates)?),
        },

        Expr::Not(inner) => {
            let truth = eval_inner(inner, frame, aggregates)?.as_truth()?;
            Ok(truth_to_value(truth.map(|b| !b)))
        }

        Expr::Neg(inner) => eval_inner(inner, frame, aggregates)?.neg(),

        Expr::IsNull { expr, negated } => {
            let value = eval_inner(expr, frame, aggregates)?;
            let is_null = value.is_null();
            Ok(Value::Boolean(if *negated { !is_null } else { is_null }))
        }

        Expr::InList { expr, list } => {
            let needle = eval_inner(expr, frame, aggregates)?;
            if needle.is_null() {
                return Ok(Value::Null);
            }
            let mut saw_null = false;
            for item in list {
                let candidate = eval_inner(item, frame, aggregates)?;
                if candidate.is_null() {
                    saw_null = true;
                    continue;
                }
                if matches!(
                    needle.try_compare(&candidate)?,
                    Some(std::cmp::Ordering::Equal)
                ) {
                    return Ok(Value::Boolean(true));
                }
            }
            // SQL IN: no match is NULL when the list held a NULL.
            Ok(if saw_null {
                Value::Null
            } else {
                Value::Boolean(false)
            })
        }

        Expr::Like { expr, pattern } => {
            let text = eval_inner(expr, frame, aggregates)?;
            let pattern = eval_inner(pattern, frame, aggregates)?;
            match (&text, &pattern) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Text(text), Value::Text(pattern)) => {
                    Ok(Value::Boolean(like_match(text, pattern)?))
                }
                _ => Err(Error::TypeMismatch(format!(
                    "LIKE requires TEXT operands, got {} and {}",
                    text.type_name(),
                    pattern.type_name()
                ))),
            }
        }
    }
}

/// Truth of a predicate over a row: TRUE/FALSE, or None for NULL
pub fn eval_predicate(expr: &Expr, frame: &RowFrame) -> Result<Option<bool>> {
    eval(expr, frame)?.as_truth()
}

/// SQL LIKE matching: `%` matches any run of characters, `_` exactly one.
/// All other characters are literal; matching is case-sensitive.
fn like_match(text: &str, pattern: &str) -> Result<bool> {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push_str("(?s)^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');

    let compiled = Regex::new(&regex)
        .map_err(|e| Error::Internal(format!("LIKE pattern '{}': {}", pattern, e)))?;
    Ok(compiled.is_match(text))
}

fn truth_to_value(truth: Option<bool>) -> Value {
    match truth {
        Some(b) => Value::Boolean(b),
        None => Value::Null,
    }
}

fn and3(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(l: Option<bool>, r: Option<bool>) -> Option<bool> {
    match (l, r) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::Parser;
    use crate::sql::Statement;

    fn where_expr(sql: &str) -> Expr {
        match Parser::parse_statement(&format!("SELECT * FROM t WHERE {}", sql)).unwrap() {
            Statement::Select(s) => s.filter.unwrap(),
            _ => unreachable!(),
        }
    }

    fn frame_eval(sql: &str, columns: &[ColumnLabel], values: &[Value]) -> Result<Option<bool>> {
        eval_predicate(&where_expr(sql), &RowFrame::new(columns, values))
    }

    fn labels() -> Vec<ColumnLabel> {
        vec![
            ColumnLabel::new("t", "a"),
            ColumnLabel::new("t", "b"),
        ]
    }

    #[test]
    fn test_three_valued_logic() {
        let cols = labels();
        let row = vec![Value::Null, Value::Integer(5)];

        // NULL = anything is NULL, never TRUE.
        assert_eq!(frame_eval("a = 5", &cols, &row).unwrap(), None);
        // NULL AND FALSE = FALSE
        assert_eq!(frame_eval("a = 5 AND b = 0", &cols, &row).unwrap(), Some(false));
        // NULL OR TRUE = TRUE
        assert_eq!(frame_eval("a = 5 OR b = 5", &cols, &row).unwrap(), Some(true));
        // NOT NULL is NULL
        assert_eq!(frame_eval("NOT a = 5", &cols, &row).unwrap(), None);
        // IS NULL sees the NULL
        assert_eq!(frame_eval("a IS NULL", &cols, &row).unwrap(), Some(true));
        assert_eq!(frame_eval("b IS NOT NULL", &cols, &row).unwrap(), Some(true));
    }

    #[test]
    fn test_qualified_and_ambiguous_resolution() {
        let cols = vec![
            ColumnLabel::new("x", "id"),
            ColumnLabel::new("y", "id"),
        ];
        let row = vec![Value::Integer(1), Value::Integer(2)];

        assert_eq!(frame_eval("x.id = 1", &cols, &row).unwrap(), Some(true));
        assert_eq!(frame_eval("y.id = 1", &cols, &row).unwrap(), Some(false));
        assert!(matches!(
            frame_eval("id = 1", &cols, &row),
            Err(Error::AmbiguousColumn(_))
        ));
        assert!(matches!(
            frame_eval("z.id = 1", &cols, &row),
            Err(Error::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_in_list_null_semantics() {
        let cols = labels();
        let row = vec![Value::Integer(3), Value::Null];

        assert_eq!(frame_eval("a IN (1, 2, 3)", &cols, &row).unwrap(), Some(true));
        assert_eq!(frame_eval("a IN (1, 2)", &cols, &row).unwrap(), Some(false));
        // Needle NULL -> NULL.
        assert_eq!(frame_eval("b IN (1, 2)", &cols, &row).unwrap(), None);
        // No match but a NULL element -> NULL.
        assert_eq!(frame_eval("a IN (1, NULL)", &cols, &row).unwrap(), None);
    }

    #[test]
    fn test_like_wildcards() {
        let cols = vec![ColumnLabel::new("t", "s")];

        let check = |text: &str, pattern: &str| -> bool {
            let row = vec![Value::Text(text.to_string())];
            frame_eval(
                &format!("s LIKE '{}'", pattern.replace('\'', "''")),
                &cols,
                &row,
            )
            .unwrap()
                == Some(true)
        };

        assert!(check("hello", "h%"));
        assert!(check("hello", "h_llo"));
        assert!(!check("hello", "h_"));
        // '%' matches everything, including the empty string.
        assert!(check("", "%"));
        // '_' does not match empty.
        assert!(!check("", "_"));
        // Regex metacharacters are literal.
        assert!(check("a.b", "a.b"));
        assert!(!check("axb", "a.b"));
        // Case-sensitive.
        assert!(!check("Hello", "hello"));
    }

    #[test]
    fn test_arithmetic_and_division_by_zero() {
        let cols = labels();
        let row = vec![Value::Integer(10), Value::Integer(0)];

        assert_eq!(frame_eval("a / b IS NULL", &cols, &row).unwrap(), Some(true));
        assert_eq!(frame_eval("a + 5 = 15", &cols, &row).unwrap(), Some(true));
        assert_eq!(frame_eval("-a = -10", &cols, &row).unwrap(), Some(true));
    }

    #[test]
    fn test_aggregate_outside_grouping_is_misuse() {
        let cols = labels();
        let row = vec![Value::Integer(1), Value::Integer(2)];
        assert!(matches!(
            frame_eval("COUNT(*) > 1", &cols, &row),
            Err(Error::AggregateMisuse(_))
        ));
    }

    #[test]
    fn test_aggregate_substitution_by_structure() {
        let expr = where_expr("COUNT(*) >= 3");
        let agg = Expr::Aggregate {
            func: crate::sql::ast::AggFunc::Count,
            arg: None,
        };
        let cols: Vec<ColumnLabel> = Vec::new();
        let row: Vec<Value> = Vec::new();
        let frame = RowFrame::new(&cols, &row);

        let result = eval_with_aggregates(
            &expr,
            &frame,
            &[(agg, Value::Integer(3))],
        )
        .unwrap();
        assert_eq!(result, Value::Boolean(true));
    }

    #[test]
    fn test_non_boolean_predicate_rejected() {
        let cols = labels();
        let row = vec![Value::Integer(1), Value::Integer(2)];
        assert!(matches!(
            frame_eval("a + b", &cols, &row),
            Err(Error::TypeMismatch(_))
        ));
    }
}
