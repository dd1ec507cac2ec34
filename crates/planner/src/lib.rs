//! Expressions, logical plans and the rule-based optimizer for skiff.
//!
//! Architecture role:
//! - lazy-frame operations build an immutable [`LogicalPlan`] tree
//! - [`Optimizer`] rewrites it (CSE, predicate/projection pushdown, filter merge)
//! - [`explain_logical`] renders plans for `explain`
//!
//! Key modules:
//! - [`expr`]
//! - [`logical_plan`]
//! - [`optimizer`]
//! - [`explain`]

pub mod explain;
pub mod expr;
pub mod logical_plan;
pub mod optimizer;

pub use explain::explain_logical;
pub use expr::{AggOp, BinaryOp, Expr};
pub use logical_plan::{
    effective_suffix, join_output_columns, next_cache_id, ApplyFn, ColumnFn, JoinOutputColumn,
    JoinSide, JoinType, LogicalPlan, DEFAULT_JOIN_SUFFIX,
};
pub use optimizer::{map_children, try_map_children, Optimizer, OptimizerConfig, OptimizerRule};
