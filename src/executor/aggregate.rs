//! Aggregate function accumulators
//!
//! COUNT(*), COUNT(expr), SUM, AVG, MIN and MAX. COUNT(*) counts rows;
//! every other aggregate skips NULL inputs. Over an empty group COUNT is 0
//! and the rest are NULL.

use crate::error::{Error, Result};
use crate::sql::ast::AggFunc;
use crate::storage::value::Value;

/// Streaming accumulator for one aggregate call
#[derive(Debug)]
pub enum Accumulator {
    /// COUNT(*): every row
    CountRows { rows: i64 },
    /// COUNT(expr): non-NULL values
    Count { non_null: i64 },
    /// SUM(expr): integer sums stay integral, float sums stay float
    Sum { total: Option<Value> },
    /// AVG(expr): always a float result
    Avg { total: f64, count: i64 },
    Min { best: Option<Value> },
    Max { best: Option<Value> },
}

impl Accumulator {
    /// Build the accumulator for an aggregate call. `counts_rows` is true
    /// for COUNT(*).
    pub fn new(func: AggFunc, counts_rows: bool) -> Self {
        match func {
            AggFunc::Count if counts_rows => Accumulator::CountRows { rows: 0 },
            AggFunc::Count => Accumulator::Count { non_null: 0 },
            AggFunc::Sum => Accumulator::Sum { total: None },
            AggFunc::Avg => Accumulator::Avg { total: 0.0, count: 0 },
            AggFunc::Min => Accumulator::Min { best: None },
            AggFunc::Max => Accumulator::Max { best: None },
        }
    }

    /// Feed one row's value. For COUNT(*) the value is ignored.
    pub fn add(&mut self, value: &Value) -> Result<()> {
        match self {
            Accumulator::CountRows { rows } => {
                *rows += 1;
                return Ok(());
            }
            _ if value.is_null() => return Ok(()),
            Accumulator::Count { non_null } => *non_null += 1,
            Accumulator::Sum { total } => {
                if !matches!(value, Value::Integer(_) | Value::Float(_)) {
                    return Err(Error::TypeMismatch(format!(
                        "SUM requires a numeric operand, got {}",
                        value.type_name()
                    )));
                }
                *total = Some(match total.take() {
                    None => value.clone(),
                    Some(current) => current.add(value)?,
                });
            }
            Accumulator::Avg { total, count } => match value.as_f64() {
                Some(v) => {
                    *total += v;
                    *count += 1;
                }
                None => {
                    return Err(Error::TypeMismatch(format!(
                        "AVG requires a numeric operand, got {}",
                        value.type_name()
                    )));
                }
            },
            Accumulator::Min { best } => {
                let replace = match best {
                    None => true,
                    Some(current) => matches!(
                        value.try_compare(current)?,
                        Some(std::cmp::Ordering::Less)
                    ),
                };
                if replace {
                    *best = Some(value.clone());
                }
            }
            Accumulator::Max { best } => {
                let replace = match best {
                    None => true,
                    Some(current) => matches!(
                        value.try_compare(current)?,
                        Some(std::cmp::Ordering::Greater)
                    ),
                };
                if replace {
                    *best = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    /// Final aggregate value
    pub fn finish(self) -> Value {
        match self {
            Accumulator::CountRows { rows } => Value::Integer(rows),
            Accumulator::Count { non_null } => Value::Integer(non_null),
            Accumulator::Sum { total } => total.unwrap_or(Value::Null),
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(total / count as f64)
                }
            }
            Accumulator::Min { best } | Accumulator::Max { best } => best.unwrap_or(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(func: AggFunc, counts_rows: bool, values: &[Value]) -> Value {
        let mut acc = Accumulator::new(func, counts_rows);
        for v in values {
            acc.add(v).unwrap();
        }
        acc.finish()
    }

    #[test]
    fn test_count_star_counts_nulls() {
        let values = vec![Value::Integer(1), Value::Null, Value::Integer(2)];
        assert_eq!(run(AggFunc::Count, true, &values), Value::Integer(3));
        assert_eq!(run(AggFunc::Count, false, &values), Value::Integer(2));
    }

    #[test]
    fn test_empty_group_results() {
        assert_eq!(run(AggFunc::Count, true, &[]), Value::Integer(0));
        assert_eq!(run(AggFunc::Count, false, &[]), Value::Integer(0));
        assert_eq!(run(AggFunc::Sum, false, &[]), Value::Null);
        assert_eq!(run(AggFunc::Avg, false, &[]), Value::Null);
        assert_eq!(run(AggFunc::Min, false, &[]), Value::Null);
        assert_eq!(run(AggFunc::Max, false, &[]), Value::Null);
    }

    #[test]
    fn test_sum_preserves_integer_type() {
        let ints = vec![Value::Integer(1), Value::Integer(2), Value::Null];
        assert_eq!(run(AggFunc::Sum, false, &ints), Value::Integer(3));

        let floats = vec![Value::Float(1.5), Value::Float(2.5)];
        assert_eq!(run(AggFunc::Sum, false, &floats), Value::Float(4.0));
    }

    #[test]
    fn test_avg_is_float() {
        let values = vec![Value::Integer(100), Value::Integer(120), Value::Null];
        assert_eq!(run(AggFunc::Avg, false, &values), Value::Float(110.0));
    }

    #[test]
    fn test_min_max_orderable() {
        let values = vec![
            Value::Text("pear".into()),
            Value::Text("apple".into()),
            Value::Null,
        ];
        assert_eq!(run(AggFunc::Min, false, &values), Value::Text("apple".into()));
        assert_eq!(run(AggFunc::Max, false, &values), Value::Text("pear".into()));
    }

    #[test]
    fn test_sum_rejects_text() {
        let mut acc = Accumulator::new(AggFunc::Sum, false);
        assert!(acc.add(&Value::Text("x".into())).is_err());
    }
}
