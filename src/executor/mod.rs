//! Query execution module
//!
//! The engine facade, the expression evaluator, aggregate accumulators,
//! the SELECT pipeline and the access-path planner behind EXPLAIN.

mod aggregate;
mod engine;
mod eval;
mod planner;
mod select;

pub use engine::{IntrospectKind, QueryEngine, QueryOutput, ResultSet};
pub use planner::{AccessPlan, JoinPlan, Plan, SourcePlan};
