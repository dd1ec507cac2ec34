//! Logical plan tree built by the lazy API and rewritten by the optimizer.
//!
//! Nodes own their inputs as boxed children. Join output naming
//! ([`join_output_columns`]) lives here too, shared by the optimizer and the
//! executor.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use skiff_common::Result;
use skiff_storage::{Series, SourceRef};

use crate::expr::{AggOp, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Outer,
    Cross,
}

impl JoinType {
    pub fn name(self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Outer => "outer",
            JoinType::Cross => "cross",
        }
    }

    /// Whether filters on the given side may move below the join.
    pub fn preserves_filter_on(self, side: JoinSide) -> bool {
        match self {
            JoinType::Inner | JoinType::Cross => true,
            JoinType::Left => side == JoinSide::Left,
            JoinType::Right => side == JoinSide::Right,
            JoinType::Outer => false,
        }
    }
}

/// User column function applied by `Apply` nodes.
pub type ApplyFn = Arc<dyn Fn(&Series) -> Result<Series> + Send + Sync>;

/// Named wrapper so plans stay printable.
#[derive(Clone)]
pub struct ColumnFn {
    pub name: String,
    pub func: ApplyFn,
}

impl ColumnFn {
    pub fn new(name: impl Into<String>, func: ApplyFn) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl fmt::Debug for ColumnFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnFn({})", self.name)
    }
}

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a process-unique identity for a `Cache` node.
pub fn next_cache_id() -> u64 {
    NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Immutable plan tree. Optimizer passes build new trees.
#[derive(Debug, Clone)]
pub enum LogicalPlan {
    /// `projection` is filled in by projection pushdown.
    Scan {
        source: SourceRef,
        projection: Option<Vec<String>>,
    },
    Projection {
        exprs: Vec<Expr>,
        input: Box<LogicalPlan>,
    },
    Filter {
        predicate: Expr,
        input: Box<LogicalPlan>,
    },
    WithColumn {
        expr: Expr,
        input: Box<LogicalPlan>,
    },
    /// Keys must be column references; checked at execution.
    GroupBy {
        keys: Vec<Expr>,
        aggs: Vec<Expr>,
        input: Box<LogicalPlan>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        left_on: Vec<String>,
        right_on: Vec<String>,
        suffix: String,
    },
    Sort {
        by: Vec<String>,
        descending: Vec<bool>,
        input: Box<LogicalPlan>,
    },
    Limit {
        n: usize,
        input: Box<LogicalPlan>,
    },
    Tail {
        n: usize,
        input: Box<LogicalPlan>,
    },
    Distinct {
        subset: Option<Vec<String>>,
        input: Box<LogicalPlan>,
    },
    Pivot {
        index: Vec<String>,
        columns: String,
        values: String,
        agg: AggOp,
        input: Box<LogicalPlan>,
    },
    /// Empty `value_vars` means every non-id column.
    Melt {
        id_vars: Vec<String>,
        value_vars: Vec<String>,
        variable_name: String,
        value_name: String,
        input: Box<LogicalPlan>,
    },
    Cache {
        id: u64,
        input: Box<LogicalPlan>,
    },
    Apply {
        column: String,
        func: ColumnFn,
        input: Box<LogicalPlan>,
    },
}

impl LogicalPlan {
    pub fn scan(source: SourceRef) -> Self {
        LogicalPlan::Scan {
            source,
            projection: None,
        }
    }

    /// Short operator name used for spans, metrics and explain.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::Scan { .. } => "scan",
            LogicalPlan::Projection { .. } => "projection",
            LogicalPlan::Filter { .. } => "filter",
            LogicalPlan::WithColumn { .. } => "with_column",
            LogicalPlan::GroupBy { .. } => "group_by",
            LogicalPlan::Join { .. } => "join",
            LogicalPlan::Sort { .. } => "sort",
            LogicalPlan::Limit { .. } => "limit",
            LogicalPlan::Tail { .. } => "tail",
            LogicalPlan::Distinct { .. } => "distinct",
            LogicalPlan::Pivot { .. } => "pivot",
            LogicalPlan::Melt { .. } => "melt",
            LogicalPlan::Cache { .. } => "cache",
            LogicalPlan::Apply { .. } => "apply",
        }
    }

    /// Child plans, left before right.
    pub fn children(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan { .. } => vec![],
            LogicalPlan::Join { left, right, .. } => vec![left, right],
            LogicalPlan::Projection { input, .. }
            | LogicalPlan::Filter { input, .. }
            | LogicalPlan::WithColumn { input, .. }
            | LogicalPlan::GroupBy { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Tail { input, .. }
            | LogicalPlan::Distinct { input, .. }
            | LogicalPlan::Pivot { input, .. }
            | LogicalPlan::Melt { input, .. }
            | LogicalPlan::Cache { input, .. }
            | LogicalPlan::Apply { input, .. } => vec![input],
        }
    }

    /// Column names this node produces, when knowable without data.
    ///
    /// `None` for pivots (columns depend on values) and for scans whose
    /// source offers no schema hint.
    pub fn output_columns(&self) -> Option<Vec<String>> {
        match self {
            LogicalPlan::Scan { source, projection } => match projection {
                Some(p) => Some(p.clone()),
                None => source
                    .schema_hint()
                    .map(|s| s.into_iter().map(|(n, _)| n).collect()),
            },
            LogicalPlan::Projection { exprs, .. } => {
                Some(exprs.iter().map(Expr::output_name).collect())
            }
            LogicalPlan::WithColumn { expr, input } => {
                let mut cols = input.output_columns()?;
                let name = expr.output_name();
                if !cols.contains(&name) {
                    cols.push(name);
                }
                Some(cols)
            }
            LogicalPlan::GroupBy { keys, aggs, .. } => Some(
                keys.iter()
                    .chain(aggs.iter())
                    .map(Expr::output_name)
                    .collect(),
            ),
            LogicalPlan::Join {
                left,
                right,
                join_type,
                left_on,
                right_on,
                suffix,
            } => {
                let l = left.output_columns()?;
                let r = right.output_columns()?;
                Some(
                    join_output_columns(&l, &r, left_on, right_on, *join_type, suffix)
                        .into_iter()
                        .map(|c| c.name)
                        .collect(),
                )
            }
            LogicalPlan::Pivot { .. } => None,
            LogicalPlan::Melt {
                id_vars,
                variable_name,
                value_name,
                ..
            } => {
                let mut cols = id_vars.clone();
                cols.push(variable_name.clone());
                cols.push(value_name.clone());
                Some(cols)
            }
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. }
            | LogicalPlan::Tail { input, .. }
            | LogicalPlan::Distinct { input, .. }
            | LogicalPlan::Cache { input, .. }
            | LogicalPlan::Apply { input, .. } => input.output_columns(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinSide {
    Left,
    Right,
}

/// One output column of a join and where its values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutputColumn {
    pub side: JoinSide,
    /// Column name on `side`.
    pub source: String,
    /// Name in the joined frame.
    pub name: String,
    /// Right-side key filling this left key where the left row is absent.
    pub coalesce: Option<String>,
}

/// Suffix used when a join is given an empty one.
pub const DEFAULT_JOIN_SUFFIX: &str = "_right";

pub fn effective_suffix(suffix: &str) -> &str {
    if suffix.is_empty() {
        DEFAULT_JOIN_SUFFIX
    } else {
        suffix
    }
}

/// Output layout of a join.
///
/// All left columns come first, then right columns minus right keys that
/// share their paired left key's name. A right column whose name is
/// already taken gets `suffix` (see [`effective_suffix`]) appended until unique. For right and
/// outer joins, shared-name keys are coalesced from the right side.
pub fn join_output_columns(
    left_cols: &[String],
    right_cols: &[String],
    left_on: &[String],
    right_on: &[String],
    join_type: JoinType,
    suffix: &str,
) -> Vec<JoinOutputColumn> {
    let shared: Vec<(&String, &String)> = left_on
        .iter()
        .zip(right_on.iter())
        .filter(|(l, r)| l == r)
        .collect();
    let coalesces = matches!(join_type, JoinType::Right | JoinType::Outer);
    let suffix = effective_suffix(suffix);

    let mut taken: HashSet<String> = left_cols.iter().cloned().collect();
    let mut out: Vec<JoinOutputColumn> = left_cols
        .iter()
        .map(|c| JoinOutputColumn {
            side: JoinSide::Left,
            source: c.clone(),
            name: c.clone(),
            coalesce: shared
                .iter()
                .find(|(l, _)| *l == c)
                .filter(|_| coalesces)
                .map(|(_, r)| (*r).clone()),
        })
        .collect();

    for c in right_cols {
        if shared.iter().any(|(_, r)| *r == c) {
            continue;
        }
        let mut name = c.clone();
        while taken.contains(&name) {
            name.push_str(suffix);
        }
        taken.insert(name.clone());
        out.push(JoinOutputColumn {
            side: JoinSide::Right,
            source: c.clone(),
            name,
            coalesce: None,
        });
    }
    out
}
