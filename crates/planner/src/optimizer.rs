//! Rule-based logical optimizer.
//!
//! Built-in passes run in a fixed order: common-subexpression elimination,
//! predicate pushdown through joins, projection pushdown into scans, filter
//! merge. Each pass can be switched off through [`OptimizerConfig`]. Custom
//! [`OptimizerRule`]s run last, sorted by name.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::{Arc, RwLock};

use skiff_common::Result;
use tracing::debug;

use crate::expr::{BinaryOp, Expr};
use crate::logical_plan::{
    effective_suffix, join_output_columns, ColumnFn, JoinOutputColumn, JoinSide, LogicalPlan,
};

/// Toggles for the built-in passes; all enabled by default.
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    pub common_subexpr_elimination: bool,
    pub predicate_pushdown: bool,
    pub projection_pushdown: bool,
    pub filter_merge: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            common_subexpr_elimination: true,
            predicate_pushdown: true,
            projection_pushdown: true,
            filter_merge: true,
        }
    }
}

/// Custom optimizer rule hook, run after the built-in passes.
pub trait OptimizerRule: Send + Sync {
    /// Stable rule name used by the registry.
    fn name(&self) -> &str;
    /// Rewrite input plan and return the transformed plan.
    fn rewrite(&self, plan: LogicalPlan) -> Result<LogicalPlan>;
}

/// Rule-based optimizer for lazy-frame plans.
///
/// Every pass must preserve the executed result row for row; a rewrite whose
/// preconditions cannot be proven leaves the subtree untouched.
pub struct Optimizer {
    config: OptimizerConfig,
    custom_rules: RwLock<HashMap<String, Arc<dyn OptimizerRule>>>,
}

impl std::fmt::Debug for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .custom_rules
            .read()
            .map(|m| m.len())
            .unwrap_or_default();
        f.debug_struct("Optimizer")
            .field("config", &self.config)
            .field("custom_rules", &count)
            .finish()
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self::with_config(OptimizerConfig::default())
    }

    pub fn with_config(config: OptimizerConfig) -> Self {
        Self {
            config,
            custom_rules: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> OptimizerConfig {
        self.config
    }

    /// Register or replace a custom rule.
    ///
    /// Returns `true` when an existing rule with the same name was replaced.
    pub fn register_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.custom_rules
            .write()
            .expect("optimizer rule lock poisoned")
            .insert(rule.name().to_string(), rule)
            .is_some()
    }

    /// Returns `true` when a rule was removed.
    pub fn deregister_rule(&self, name: &str) -> bool {
        self.custom_rules
            .write()
            .expect("optimizer rule lock poisoned")
            .remove(name)
            .is_some()
    }

    /// Apply the rule pipeline to a logical plan.
    ///
    /// Pass order is fixed:
    /// 1. common-subexpression elimination
    /// 2. predicate pushdown through joins
    /// 3. projection pushdown into scans
    /// 4. filter merge
    /// 5. user-registered rules, by name
    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut plan = plan;
        if self.config.common_subexpr_elimination {
            plan = eliminate_common_subexprs(plan);
            debug!(pass = "cse", "optimizer pass done");
        }
        if self.config.predicate_pushdown {
            plan = predicate_pushdown(plan);
            debug!(pass = "predicate_pushdown", "optimizer pass done");
        }
        if self.config.projection_pushdown {
            plan = proj_rewrite(plan, None);
            debug!(pass = "projection_pushdown", "optimizer pass done");
        }
        if self.config.filter_merge {
            plan = merge_filters(plan);
            debug!(pass = "filter_merge", "optimizer pass done");
        }

        let mut rules = self
            .custom_rules
            .read()
            .expect("optimizer rule lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect::<Vec<_>>();
        rules.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, rule) in rules {
            plan = rule.rewrite(plan)?;
            debug!(pass = %name, "custom optimizer rule done");
        }
        Ok(plan)
    }
}

// -----------------------------
// 1) Common-subexpression elimination
// -----------------------------

const CSE_PREFIX: &str = "__cse_";

/// One node of a linear chain the pass can rewrite as a unit.
enum Layer {
    Projection(Vec<Expr>),
    GroupBy { keys: Vec<Expr>, aggs: Vec<Expr> },
    Filter(Expr),
    WithColumn(Expr),
    Sort { by: Vec<String>, descending: Vec<bool> },
    Limit(usize),
    Tail(usize),
    Apply { column: String, func: ColumnFn },
}

impl Layer {
    /// Column this layer (re)defines for the layers above it.
    fn defines(&self) -> Option<String> {
        match self {
            Layer::WithColumn(e) => Some(e.output_name()),
            Layer::Apply { column, .. } => Some(column.clone()),
            _ => None,
        }
    }

    /// Expressions eligible for counting and rewriting.
    fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Layer::Projection(exprs) => exprs.iter_mut().collect(),
            // keys must stay bare column references
            Layer::GroupBy { aggs, .. } => aggs.iter_mut().collect(),
            Layer::Filter(e) | Layer::WithColumn(e) => vec![e],
            _ => vec![],
        }
    }

    fn wrap(self, input: LogicalPlan) -> LogicalPlan {
        let input = Box::new(input);
        match self {
            Layer::Projection(exprs) => LogicalPlan::Projection { exprs, input },
            Layer::GroupBy { keys, aggs } => LogicalPlan::GroupBy { keys, aggs, input },
            Layer::Filter(predicate) => LogicalPlan::Filter { predicate, input },
            Layer::WithColumn(expr) => LogicalPlan::WithColumn { expr, input },
            Layer::Sort { by, descending } => LogicalPlan::Sort {
                by,
                descending,
                input,
            },
            Layer::Limit(n) => LogicalPlan::Limit { n, input },
            Layer::Tail(n) => LogicalPlan::Tail { n, input },
            Layer::Apply { column, func } => LogicalPlan::Apply {
                column,
                func,
                input,
            },
        }
    }
}

/// Splits `plan` into chain layers (top first) and the base below them.
///
/// A projection or group-by may only head the chain; anything else that is
/// not row-local ends it.
fn peel_chain(plan: LogicalPlan) -> (Vec<Layer>, LogicalPlan) {
    let mut layers = Vec::new();
    let mut cur = plan;
    loop {
        let at_top = layers.is_empty();
        let (layer, next) = match cur {
            LogicalPlan::Projection { exprs, input } if at_top => {
                (Layer::Projection(exprs), *input)
            }
            LogicalPlan::GroupBy { keys, aggs, input } if at_top => {
                (Layer::GroupBy { keys, aggs }, *input)
            }
            LogicalPlan::Filter { predicate, input } => (Layer::Filter(predicate), *input),
            LogicalPlan::WithColumn { expr, input } => (Layer::WithColumn(expr), *input),
            LogicalPlan::Sort {
                by,
                descending,
                input,
            } => (Layer::Sort { by, descending }, *input),
            LogicalPlan::Limit { n, input } => (Layer::Limit(n), *input),
            LogicalPlan::Tail { n, input } => (Layer::Tail(n), *input),
            LogicalPlan::Apply {
                column,
                func,
                input,
            } => (Layer::Apply { column, func }, *input),
            other => return (layers, other),
        };
        layers.push(layer);
        cur = next;
    }
}

fn cse_candidate(e: &Expr) -> bool {
    !e.is_trivial()
        && !e.contains_agg()
        && !matches!(
            e,
            Expr::Alias { .. } | Expr::StructField { .. } | Expr::ListGet { .. }
        )
}

fn count_subexprs(e: &Expr, blocked: &HashSet<String>, counts: &mut HashMap<String, usize>) {
    if cse_candidate(e) && e.columns().iter().all(|c| !blocked.contains(c)) {
        *counts.entry(e.to_string()).or_default() += 1;
    }
    for c in e.children() {
        count_subexprs(c, blocked, counts);
    }
}

/// Replaces selected subexpressions top-down; a replaced node is not
/// descended into.
fn replace_subexprs(
    e: Expr,
    repeated: &HashSet<String>,
    blocked: &HashSet<String>,
    hidden: &mut Vec<(String, Expr)>,
    taken: &HashSet<String>,
) -> Expr {
    if cse_candidate(&e) && e.columns().iter().all(|c| !blocked.contains(c)) {
        let key = e.to_string();
        if repeated.contains(&key) {
            if let Some((name, _)) = hidden.iter().find(|(_, h)| h.to_string() == key) {
                return Expr::Column(name.clone());
            }
            let mut i = hidden.len();
            let mut name = format!("{CSE_PREFIX}{i}");
            while taken.contains(&name) {
                i += 1;
                name = format!("{CSE_PREFIX}{i}");
            }
            hidden.push((name.clone(), e));
            return Expr::Column(name);
        }
    }
    e.map_children(&mut |c| replace_subexprs(c, repeated, blocked, hidden, taken))
}

fn eliminate_common_subexprs(plan: LogicalPlan) -> LogicalPlan {
    let output = plan.output_columns();
    let (mut layers, base) = peel_chain(plan);
    let base = match base {
        LogicalPlan::Scan { .. } => base,
        LogicalPlan::Projection { .. } | LogicalPlan::GroupBy { .. } => {
            eliminate_common_subexprs(base)
        }
        other => map_children(other, eliminate_common_subexprs),
    };
    if layers.is_empty() {
        return base;
    }

    // blocked[i]: columns redefined strictly below layer i
    let mut blocked = vec![HashSet::new(); layers.len()];
    let mut acc = HashSet::new();
    for i in (0..layers.len()).rev() {
        blocked[i] = acc.clone();
        if let Some(c) = layers[i].defines() {
            acc.insert(c);
        }
    }

    let mut counts = HashMap::new();
    for (i, layer) in layers.iter_mut().enumerate() {
        for e in layer.exprs_mut() {
            count_subexprs(e, &blocked[i], &mut counts);
        }
    }
    let repeated: HashSet<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(k, _)| k)
        .collect();

    let heads_projection = matches!(layers[0], Layer::Projection(_) | Layer::GroupBy { .. });
    if repeated.is_empty() || (!heads_projection && output.is_none()) {
        return rebuild_chain(layers, base);
    }

    let mut taken: HashSet<String> = base
        .output_columns()
        .unwrap_or_default()
        .into_iter()
        .collect();
    taken.extend(acc);
    let mut hidden: Vec<(String, Expr)> = Vec::new();
    for (i, layer) in layers.iter_mut().enumerate() {
        let names_matter = !matches!(layer, Layer::Filter(_));
        for e in layer.exprs_mut() {
            let original_name = e.output_name();
            let rewritten = replace_subexprs(e.clone(), &repeated, &blocked[i], &mut hidden, &taken);
            *e = if !names_matter || rewritten.output_name() == original_name {
                rewritten
            } else {
                rewritten.alias(original_name)
            };
        }
    }
    debug!(hidden = hidden.len(), "common subexpressions extracted");

    let mut plan = base;
    for (name, e) in hidden {
        plan = LogicalPlan::WithColumn {
            expr: e.alias(name),
            input: Box::new(plan),
        };
    }
    let plan = rebuild_chain(layers, plan);
    match (heads_projection, output) {
        (false, Some(cols)) => LogicalPlan::Projection {
            exprs: cols.into_iter().map(Expr::Column).collect(),
            input: Box::new(plan),
        },
        _ => plan,
    }
}

fn rebuild_chain(layers: Vec<Layer>, base: LogicalPlan) -> LogicalPlan {
    layers
        .into_iter()
        .rev()
        .fold(base, |input, layer| layer.wrap(input))
}

// -----------------------------
// 2) Predicate pushdown
// -----------------------------

fn predicate_pushdown(plan: LogicalPlan) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter { predicate, input } => {
            let input = predicate_pushdown(*input);
            match input {
                LogicalPlan::Join {
                    left,
                    right,
                    join_type,
                    left_on,
                    right_on,
                    suffix,
                } => {
                    let layout = match (left.output_columns(), right.output_columns()) {
                        (Some(l), Some(r)) => Some(join_output_columns(
                            &l, &r, &left_on, &right_on, join_type, &suffix,
                        )),
                        _ => None,
                    };
                    let mut left_push = Vec::new();
                    let mut right_push = Vec::new();
                    let mut keep = Vec::new();
                    for conj in split_conjuncts(predicate) {
                        match layout.as_deref().and_then(|l| conjunct_side(&conj, l)) {
                            Some(side) if join_type.preserves_filter_on(side) => match side {
                                JoinSide::Left => left_push.push(conj),
                                JoinSide::Right => right_push.push(conj),
                            },
                            _ => keep.push(conj),
                        }
                    }
                    let left = push_filter(*left, left_push);
                    let right = push_filter(*right, right_push);
                    let join = LogicalPlan::Join {
                        left: Box::new(left),
                        right: Box::new(right),
                        join_type,
                        left_on,
                        right_on,
                        suffix,
                    };
                    if keep.is_empty() {
                        join
                    } else {
                        LogicalPlan::Filter {
                            predicate: combine_conjuncts(keep),
                            input: Box::new(join),
                        }
                    }
                }
                other => LogicalPlan::Filter {
                    predicate,
                    input: Box::new(other),
                },
            }
        }
        other => map_children(other, predicate_pushdown),
    }
}

fn push_filter(input: LogicalPlan, conjuncts: Vec<Expr>) -> LogicalPlan {
    if conjuncts.is_empty() {
        return input;
    }
    // the new filter may sit on another join
    predicate_pushdown(LogicalPlan::Filter {
        predicate: combine_conjuncts(conjuncts),
        input: Box::new(input),
    })
}

/// The single join side that fully answers `conj`, if any.
///
/// Only columns that keep their source name and are not coalesced qualify.
fn conjunct_side(conj: &Expr, layout: &[JoinOutputColumn]) -> Option<JoinSide> {
    if conj.contains_agg() {
        return None;
    }
    let mut side = None;
    for c in conj.columns() {
        let col = layout.iter().find(|o| o.name == c)?;
        if col.source != col.name || col.coalesce.is_some() {
            return None;
        }
        match side {
            None => side = Some(col.side),
            Some(s) if s != col.side => return None,
            Some(_) => {}
        }
    }
    side
}

// -----------------------------
// 3) Projection pushdown
// -----------------------------

fn with_cols<'a>(
    required: &Option<HashSet<String>>,
    extra: impl IntoIterator<Item = &'a String>,
) -> Option<HashSet<String>> {
    required.as_ref().map(|r| {
        let mut r = r.clone();
        r.extend(extra.into_iter().cloned());
        r
    })
}

fn expr_set(exprs: &[Expr]) -> HashSet<String> {
    exprs.iter().flat_map(Expr::columns).collect()
}

/// `required == None` means every column of the node is consumed.
fn proj_rewrite(plan: LogicalPlan, required: Option<HashSet<String>>) -> LogicalPlan {
    match plan {
        LogicalPlan::Scan { source, projection } => {
            let projection = match (required, source.schema_hint()) {
                (Some(req), Some(schema)) => Some(
                    schema
                        .into_iter()
                        .map(|(n, _)| n)
                        .filter(|n| req.contains(n))
                        .filter(|n| projection.as_ref().map_or(true, |p| p.contains(n)))
                        .collect(),
                ),
                _ => projection,
            };
            LogicalPlan::Scan { source, projection }
        }
        LogicalPlan::Projection { exprs, input } => {
            let req = expr_set(&exprs);
            LogicalPlan::Projection {
                exprs,
                input: Box::new(proj_rewrite(*input, Some(req))),
            }
        }
        LogicalPlan::Filter { predicate, input } => {
            let req = with_cols(&required, &predicate.columns());
            LogicalPlan::Filter {
                predicate,
                input: Box::new(proj_rewrite(*input, req)),
            }
        }
        LogicalPlan::WithColumn { expr, input } => {
            let req = required.map(|mut r| {
                r.remove(&expr.output_name());
                r.extend(expr.columns());
                r
            });
            LogicalPlan::WithColumn {
                expr,
                input: Box::new(proj_rewrite(*input, req)),
            }
        }
        LogicalPlan::GroupBy { keys, aggs, input } => {
            let mut req = expr_set(&keys);
            req.extend(expr_set(&aggs));
            LogicalPlan::GroupBy {
                keys,
                aggs,
                input: Box::new(proj_rewrite(*input, Some(req))),
            }
        }
        LogicalPlan::Join {
            left,
            right,
            join_type,
            left_on,
            right_on,
            suffix,
        } => {
            let (left_req, right_req) = match (&required, left.output_columns(), right.output_columns()) {
                (Some(req), Some(l), Some(r)) => {
                    let layout = join_output_columns(&l, &r, &left_on, &right_on, join_type, &suffix);
                    join_side_requirements(req, &layout, &left_on, &right_on, &suffix)
                }
                _ => (None, None),
            };
            LogicalPlan::Join {
                left: Box::new(proj_rewrite(*left, left_req)),
                right: Box::new(proj_rewrite(*right, right_req)),
                join_type,
                left_on,
                right_on,
                suffix,
            }
        }
        LogicalPlan::Sort {
            by,
            descending,
            input,
        } => {
            let req = with_cols(&required, &by);
            LogicalPlan::Sort {
                by,
                descending,
                input: Box::new(proj_rewrite(*input, req)),
            }
        }
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: Box::new(proj_rewrite(*input, required)),
        },
        LogicalPlan::Tail { n, input } => LogicalPlan::Tail {
            n,
            input: Box::new(proj_rewrite(*input, required)),
        },
        LogicalPlan::Distinct { subset, input } => {
            let req = match &subset {
                Some(s) => with_cols(&required, s),
                None => None,
            };
            LogicalPlan::Distinct {
                subset,
                input: Box::new(proj_rewrite(*input, req)),
            }
        }
        LogicalPlan::Pivot {
            index,
            columns,
            values,
            agg,
            input,
        } => {
            let mut req: HashSet<String> = index.iter().cloned().collect();
            req.insert(columns.clone());
            req.insert(values.clone());
            LogicalPlan::Pivot {
                index,
                columns,
                values,
                agg,
                input: Box::new(proj_rewrite(*input, Some(req))),
            }
        }
        LogicalPlan::Melt {
            id_vars,
            value_vars,
            variable_name,
            value_name,
            input,
        } => {
            let req = if value_vars.is_empty() {
                None
            } else {
                Some(id_vars.iter().chain(value_vars.iter()).cloned().collect())
            };
            LogicalPlan::Melt {
                id_vars,
                value_vars,
                variable_name,
                value_name,
                input: Box::new(proj_rewrite(*input, req)),
            }
        }
        // cached frames are shared between plans; keep them whole
        LogicalPlan::Cache { id, input } => LogicalPlan::Cache {
            id,
            input: Box::new(proj_rewrite(*input, None)),
        },
        LogicalPlan::Apply {
            column,
            func,
            input,
        } => {
            let req = with_cols(&required, std::iter::once(&column));
            LogicalPlan::Apply {
                column,
                func,
                input: Box::new(proj_rewrite(*input, req)),
            }
        }
    }
}

/// Source columns each join side must keep so that `required` outputs
/// exist under the same names.
///
/// Keys are always kept, and so is any column whose name sits on another
/// column's suffix chain, since dropping it would change suffixing.
fn join_side_requirements(
    required: &HashSet<String>,
    layout: &[JoinOutputColumn],
    left_on: &[String],
    right_on: &[String],
    suffix: &str,
) -> (Option<HashSet<String>>, Option<HashSet<String>>) {
    let mut left: HashSet<String> = left_on.iter().cloned().collect();
    let mut right: HashSet<String> = right_on.iter().cloned().collect();
    let suffix = effective_suffix(suffix);
    for (i, col) in layout.iter().enumerate() {
        let naming_relevant = layout.iter().enumerate().any(|(j, other)| {
                i != j
                    && (in_suffix_chain(&col.source, &other.source, suffix)
                        || in_suffix_chain(&other.source, &col.source, suffix))
            });
        if !(required.contains(&col.name) || naming_relevant) {
            continue;
        }
        match col.side {
            JoinSide::Left => left.insert(col.source.clone()),
            JoinSide::Right => right.insert(col.source.clone()),
        };
        if let Some(r) = &col.coalesce {
            right.insert(r.clone());
        }
    }
    (Some(left), Some(right))
}

/// `name == base + suffix * k` for some `k >= 0`.
fn in_suffix_chain(name: &str, base: &str, suffix: &str) -> bool {
    let mut cur = name;
    loop {
        if cur == base {
            return true;
        }
        match cur.strip_suffix(suffix) {
            Some(rest) => cur = rest,
            None => return false,
        }
    }
}

// -----------------------------
// 4) Filter merge
// -----------------------------

fn merge_filters(plan: LogicalPlan) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter { predicate, input } => {
            let input = merge_filters(*input);
            if let LogicalPlan::Filter {
                predicate: inner_pred,
                input: inner_input,
            } = input
            {
                // Filter(Filter(x, p1), p2) => Filter(x, p1 AND p2)
                LogicalPlan::Filter {
                    predicate: inner_pred.and(predicate),
                    input: inner_input,
                }
            } else {
                LogicalPlan::Filter {
                    predicate,
                    input: Box::new(input),
                }
            }
        }
        other => map_children(other, merge_filters),
    }
}

// -----------------------------
// Helpers
// -----------------------------

/// Rebuilds `plan` with each child passed through `f`.
pub fn map_children(plan: LogicalPlan, mut f: impl FnMut(LogicalPlan) -> LogicalPlan) -> LogicalPlan {
    match try_map_children(plan, &mut |p| Ok::<_, Infallible>(f(p))) {
        Ok(p) => p,
        Err(never) => match never {},
    }
}

/// Fallible form of [`map_children`]; children are visited left to right.
pub fn try_map_children<E>(
    plan: LogicalPlan,
    f: &mut impl FnMut(LogicalPlan) -> std::result::Result<LogicalPlan, E>,
) -> std::result::Result<LogicalPlan, E> {
    let mut g = |input: Box<LogicalPlan>| f(*input).map(Box::new);
    Ok(match plan {
        LogicalPlan::Scan { .. } => plan,
        LogicalPlan::Projection { exprs, input } => LogicalPlan::Projection {
            exprs,
            input: g(input)?,
        },
        LogicalPlan::Filter { predicate, input } => LogicalPlan::Filter {
            predicate,
            input: g(input)?,
        },
        LogicalPlan::WithColumn { expr, input } => LogicalPlan::WithColumn {
            expr,
            input: g(input)?,
        },
        LogicalPlan::GroupBy { keys, aggs, input } => LogicalPlan::GroupBy {
            keys,
            aggs,
            input: g(input)?,
        },
        LogicalPlan::Join {
            left,
            right,
            join_type,
            left_on,
            right_on,
            suffix,
        } => {
            let left = g(left)?;
            LogicalPlan::Join {
                left,
                right: g(right)?,
                join_type,
                left_on,
                right_on,
                suffix,
            }
        }
        LogicalPlan::Sort {
            by,
            descending,
            input,
        } => LogicalPlan::Sort {
            by,
            descending,
            input: g(input)?,
        },
        LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
            n,
            input: g(input)?,
        },
        LogicalPlan::Tail { n, input } => LogicalPlan::Tail {
            n,
            input: g(input)?,
        },
        LogicalPlan::Distinct { subset, input } => LogicalPlan::Distinct {
            subset,
            input: g(input)?,
        },
        LogicalPlan::Pivot {
            index,
            columns,
            values,
            agg,
            input,
        } => LogicalPlan::Pivot {
            index,
            columns,
            values,
            agg,
            input: g(input)?,
        },
        LogicalPlan::Melt {
            id_vars,
            value_vars,
            variable_name,
            value_name,
            input,
        } => LogicalPlan::Melt {
            id_vars,
            value_vars,
            variable_name,
            value_name,
            input: g(input)?,
        },
        LogicalPlan::Cache { id, input } => LogicalPlan::Cache {
            id,
            input: g(input)?,
        },
        LogicalPlan::Apply {
            column,
            func,
            input,
        } => LogicalPlan::Apply {
            column,
            func,
            input: g(input)?,
        },
    })
}

fn split_conjuncts(e: Expr) -> Vec<Expr> {
    match e {
        Expr::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            let mut v = split_conjuncts(*left);
            v.extend(split_conjuncts(*right));
            v
        }
        other => vec![other],
    }
}

fn combine_conjuncts(v: Vec<Expr>) -> Expr {
    let mut it = v.into_iter();
    match it.next() {
        Some(first) => it.fold(first, Expr::and),
        None => Expr::lit(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::AggOp;
    use crate::logical_plan::JoinType;
    use pretty_assertions::assert_eq;
    use skiff_storage::{DataFrame, MemorySource, Series};

    fn scan(cols: &[&str]) -> LogicalPlan {
        let df = DataFrame::new(
            cols.iter()
                .map(|c| Series::from_i64(*c, vec![1, 2, 3]))
                .collect(),
        )
        .expect("frame");
        LogicalPlan::scan(Arc::new(MemorySource::new(df)))
    }

    fn join(left: LogicalPlan, right: LogicalPlan, how: JoinType) -> LogicalPlan {
        LogicalPlan::Join {
            left: Box::new(left),
            right: Box::new(right),
            join_type: how,
            left_on: vec!["id".into()],
            right_on: vec!["id".into()],
            suffix: "_right".into(),
        }
    }

    fn filter(input: LogicalPlan, predicate: Expr) -> LogicalPlan {
        LogicalPlan::Filter {
            predicate,
            input: Box::new(input),
        }
    }

    fn projection_only() -> Optimizer {
        Optimizer::with_config(OptimizerConfig {
            common_subexpr_elimination: false,
            predicate_pushdown: false,
            projection_pushdown: true,
            filter_merge: false,
        })
    }

    #[test]
    fn filter_on_left_key_moves_below_inner_join() {
        let plan = filter(
            join(scan(&["id", "a"]), scan(&["id", "b"]), JoinType::Inner),
            Expr::col("id").gt(Expr::lit(5)),
        );
        let out = predicate_pushdown(plan);
        let LogicalPlan::Join { left, right, .. } = out else {
            panic!("expected join at root");
        };
        assert!(matches!(*left, LogicalPlan::Filter { .. }));
        assert!(matches!(*right, LogicalPlan::Scan { .. }));
    }

    #[test]
    fn conjuncts_split_by_side_and_mixed_ones_stay() {
        let pred = Expr::col("a")
            .gt(Expr::lit(1))
            .and(Expr::col("b").lt(Expr::lit(2)))
            .and(Expr::col("a").gt(Expr::col("b")));
        let plan = filter(
            join(scan(&["id", "a"]), scan(&["id", "b"]), JoinType::Inner),
            pred,
        );
        let LogicalPlan::Filter { predicate, input } = predicate_pushdown(plan) else {
            panic!("mixed conjunct must stay above the join");
        };
        assert_eq!(predicate.to_string(), "(col(a) > col(b))");
        let LogicalPlan::Join { left, right, .. } = *input else {
            panic!("expected join");
        };
        assert!(matches!(*left, LogicalPlan::Filter { .. }));
        assert!(matches!(*right, LogicalPlan::Filter { .. }));
    }

    #[test]
    fn outer_join_blocks_pushdown_and_left_join_only_pushes_left() {
        let outer = filter(
            join(scan(&["id", "a"]), scan(&["id", "b"]), JoinType::Outer),
            Expr::col("a").gt(Expr::lit(1)),
        );
        assert!(matches!(predicate_pushdown(outer), LogicalPlan::Filter { .. }));

        let left = filter(
            join(scan(&["id", "a"]), scan(&["id", "b"]), JoinType::Left),
            Expr::col("b").gt(Expr::lit(1)),
        );
        assert!(matches!(predicate_pushdown(left), LogicalPlan::Filter { .. }));
    }

    #[test]
    fn suffixed_columns_are_not_pushed() {
        let plan = filter(
            join(scan(&["id", "v"]), scan(&["id", "v"]), JoinType::Inner),
            Expr::col("v_right").gt(Expr::lit(0)),
        );
        assert!(matches!(predicate_pushdown(plan), LogicalPlan::Filter { .. }));
    }

    #[test]
    fn nested_filters_merge_into_one_conjunction() {
        let plan = filter(
            filter(scan(&["a"]), Expr::col("a").gt(Expr::lit(0))),
            Expr::col("a").lt(Expr::lit(9)),
        );
        let LogicalPlan::Filter { predicate, input } = merge_filters(plan) else {
            panic!("expected filter");
        };
        assert_eq!(
            predicate.to_string(),
            "((col(a) > lit(0)) and (col(a) < lit(9)))"
        );
        assert!(matches!(*input, LogicalPlan::Scan { .. }));
    }

    #[test]
    fn projection_reaches_scan_in_schema_order() {
        let plan = LogicalPlan::Projection {
            exprs: vec![Expr::col("c"), Expr::col("a")],
            input: Box::new(filter(scan(&["a", "b", "c", "d"]), Expr::col("b").gt(Expr::lit(0)))),
        };
        let out = projection_only().optimize(plan).expect("optimize");
        let LogicalPlan::Projection { input, .. } = out else {
            panic!("expected projection");
        };
        let LogicalPlan::Filter { input, .. } = *input else {
            panic!("expected filter");
        };
        let LogicalPlan::Scan { projection, .. } = *input else {
            panic!("expected scan");
        };
        assert_eq!(projection, Some(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn root_without_projection_keeps_every_column() {
        let out = projection_only().optimize(scan(&["a", "b"])).expect("optimize");
        let LogicalPlan::Scan { projection, .. } = out else {
            panic!("expected scan");
        };
        assert_eq!(projection, None);
    }

    #[test]
    fn join_pruning_keeps_keys_and_suffix_chains() {
        let plan = LogicalPlan::Projection {
            exprs: vec![Expr::col("v_right")],
            input: Box::new(join(
                scan(&["id", "v", "x"]),
                scan(&["id", "v", "y"]),
                JoinType::Inner,
            )),
        };
        let out = projection_only().optimize(plan).expect("optimize");
        let LogicalPlan::Projection { input, .. } = out else {
            panic!("expected projection");
        };
        let LogicalPlan::Join { left, right, .. } = *input else {
            panic!("expected join");
        };
        let LogicalPlan::Scan { projection: lp, .. } = *left else {
            panic!("expected scan");
        };
        let LogicalPlan::Scan { projection: rp, .. } = *right else {
            panic!("expected scan");
        };
        assert_eq!(lp, Some(vec!["id".into(), "v".into()]));
        assert_eq!(rp, Some(vec!["id".into(), "v".into()]));
    }

    #[test]
    fn repeated_subexpression_becomes_hidden_column() {
        let ab = Expr::col("a").mul(Expr::col("b"));
        let plan = LogicalPlan::Projection {
            exprs: vec![
                ab.clone().add(Expr::lit(1)).alias("x"),
                ab.clone().sub(Expr::lit(1)).alias("y"),
            ],
            input: Box::new(scan(&["a", "b"])),
        };
        let out = eliminate_common_subexprs(plan);
        let LogicalPlan::Projection { exprs, input } = out else {
            panic!("expected projection");
        };
        assert_eq!(exprs[0].to_string(), "(col(__cse_0) + lit(1)).alias(x)");
        assert_eq!(exprs[1].to_string(), "(col(__cse_0) - lit(1)).alias(y)");
        let LogicalPlan::WithColumn { expr, input } = *input else {
            panic!("expected hidden column");
        };
        assert_eq!(expr.to_string(), "(col(a) * col(b)).alias(__cse_0)");
        assert!(matches!(*input, LogicalPlan::Scan { .. }));
    }

    #[test]
    fn cse_keeps_output_names_and_skips_redefined_columns() {
        let ab = Expr::col("a").add(Expr::col("b"));
        let plan = LogicalPlan::Projection {
            exprs: vec![ab.clone(), ab.clone().mul(Expr::lit(2)).alias("d")],
            input: Box::new(LogicalPlan::WithColumn {
                expr: Expr::col("a").mul(Expr::lit(10)),
                input: Box::new(scan(&["a", "b"])),
            }),
        };
        // `a` is redefined below the projection, so nothing is hoisted
        let out = eliminate_common_subexprs(plan);
        let LogicalPlan::Projection { exprs, input } = out else {
            panic!("expected projection");
        };
        assert_eq!(exprs[0].output_name(), "a");
        assert!(matches!(*input, LogicalPlan::WithColumn { .. }));
        assert!(!exprs[0].to_string().contains(CSE_PREFIX));
    }

    #[test]
    fn cse_wraps_filter_chains_to_hide_helper_columns() {
        let ab = Expr::col("a").add(Expr::col("b"));
        let plan = filter(
            filter(scan(&["a", "b"]), ab.clone().gt(Expr::lit(0))),
            ab.lt(Expr::lit(10)),
        );
        let out = eliminate_common_subexprs(plan);
        let LogicalPlan::Projection { exprs, .. } = out else {
            panic!("helper columns must be projected away");
        };
        assert_eq!(exprs, vec![Expr::col("a"), Expr::col("b")]);
    }

    #[test]
    fn group_by_aggregates_share_hidden_input() {
        let ab = Expr::col("a").mul(Expr::col("b"));
        let plan = LogicalPlan::GroupBy {
            keys: vec![Expr::col("k")],
            aggs: vec![ab.clone().agg(AggOp::Sum), ab.agg(AggOp::Mean).alias("m")],
            input: Box::new(scan(&["k", "a", "b"])),
        };
        let LogicalPlan::GroupBy { aggs, .. } = eliminate_common_subexprs(plan) else {
            panic!("expected group by");
        };
        assert_eq!(aggs[0].to_string(), "col(__cse_0).sum().alias(a)");
        assert_eq!(aggs[1].output_name(), "m");
    }

    struct Identity;

    impl OptimizerRule for Identity {
        fn name(&self) -> &str {
            "identity"
        }

        fn rewrite(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
            Ok(plan)
        }
    }

    #[test]
    fn custom_rules_register_and_replace() {
        let opt = Optimizer::new();
        assert!(!opt.register_rule(Arc::new(Identity)));
        assert!(opt.register_rule(Arc::new(Identity)));
        assert!(opt.deregister_rule("identity"));
        assert!(!opt.deregister_rule("identity"));
    }
}
