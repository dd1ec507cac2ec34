//! Recursive plan executor.
//!
//! Each node runs its children first (left before right), then its own
//! operation over the materialized frames. The first error aborts the whole
//! call chain; there is no partial result.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use arrow::array::UInt32Array;
use skiff_common::{Result, SkiffError};
use skiff_planner::{AggOp, Expr, LogicalPlan};
use skiff_storage::{DType, DataFrame, Series};
use tracing::{debug, info_span};

use crate::context::ExecContext;
use crate::expressions::{evaluate, evaluate_mask};
use crate::groupby::{aggregate, AggSpec, GroupBy, GroupIndex};
use crate::join::{join, JoinOptions};
use crate::scheduler::parallel_build_columns;

/// Executes `plan` and returns the materialized result.
///
/// Records rows in/out and wall time (children included) per node.
pub fn execute(plan: &LogicalPlan, ctx: &ExecContext) -> Result<DataFrame> {
    let span = info_span!("execute", node = plan.name(), query_id = %ctx.query_id);
    let _guard = span.enter();
    let started = Instant::now();
    let (out, rows_in) = run_node(plan, ctx)?;
    ctx.metrics.record_operator(
        &ctx.query_id.to_string(),
        plan.name(),
        rows_in as u64,
        out.height() as u64,
        started.elapsed().as_secs_f64(),
    );
    Ok(out)
}

/// Returns the node's output and the number of rows it consumed.
fn run_node(plan: &LogicalPlan, ctx: &ExecContext) -> Result<(DataFrame, usize)> {
    let parallel = &ctx.config.parallel;
    match plan {
        LogicalPlan::Scan { source, projection } => {
            let df = source.read(projection.as_deref())?;
            let df = match projection {
                Some(cols) => df.select(cols)?,
                None => df,
            };
            let rows = df.height();
            Ok((df, rows))
        }
        LogicalPlan::Projection { exprs, input } => {
            let input = execute(input, ctx)?;
            let columns = parallel_build_columns(parallel, exprs.len(), input.height(), |i| {
                evaluate(&exprs[i], &input)
            })?;
            let rows = input.height();
            Ok((DataFrame::new(columns)?, rows))
        }
        LogicalPlan::Filter { predicate, input } => {
            let input = execute(input, ctx)?;
            let mask = evaluate_mask(predicate, &input)?;
            Ok((input.filter(&mask)?, input.height()))
        }
        LogicalPlan::WithColumn { expr, input } => {
            let input = execute(input, ctx)?;
            let column = evaluate(expr, &input)?;
            Ok((input.with_column(column)?, input.height()))
        }
        LogicalPlan::GroupBy { keys, aggs, input } => {
            let input = execute(input, ctx)?;
            Ok((run_group_by(keys, aggs, &input, ctx)?, input.height()))
        }
        LogicalPlan::Join {
            left,
            right,
            join_type,
            left_on,
            right_on,
            suffix,
        } => {
            let l = execute(left, ctx)?;
            let r = execute(right, ctx)?;
            let opts = JoinOptions {
                how: *join_type,
                left_on: left_on.clone(),
                right_on: right_on.clone(),
                suffix: suffix.clone(),
            };
            let out = join(&l, &r, &opts, &ctx.config)?;
            Ok((out, l.height() + r.height()))
        }
        LogicalPlan::Sort {
            by,
            descending,
            input,
        } => {
            let input = execute(input, ctx)?;
            Ok((input.sort_by(by, descending)?, input.height()))
        }
        LogicalPlan::Limit { n, input } => {
            let input = execute(input, ctx)?;
            Ok((input.head(*n), input.height()))
        }
        LogicalPlan::Tail { n, input } => {
            let input = execute(input, ctx)?;
            Ok((input.tail(*n), input.height()))
        }
        LogicalPlan::Distinct { subset, input } => {
            let input = execute(input, ctx)?;
            Ok((distinct(&input, subset.as_deref(), ctx)?, input.height()))
        }
        LogicalPlan::Pivot {
            index,
            columns,
            values,
            agg,
            input,
        } => {
            let input = execute(input, ctx)?;
            let out = pivot(&input, index, columns, values, *agg, ctx)?;
            Ok((out, input.height()))
        }
        LogicalPlan::Melt {
            id_vars,
            value_vars,
            variable_name,
            value_name,
            input,
        } => {
            let input = execute(input, ctx)?;
            let out = melt(&input, id_vars, value_vars, variable_name, value_name)?;
            Ok((out, input.height()))
        }
        LogicalPlan::Cache { id, input } => {
            if let Some(df) = ctx.cache.get(*id) {
                debug!(cache_id = *id, rows = df.height(), "cache hit");
                let rows = df.height();
                return Ok((df, rows));
            }
            let df = execute(input, ctx)?;
            ctx.cache.insert(*id, df.clone());
            let rows = df.height();
            Ok((df, rows))
        }
        LogicalPlan::Apply {
            column,
            func,
            input,
        } => {
            let input = execute(input, ctx)?;
            let out = (func.func)(input.column(column)?)?;
            if out.len() != input.height() {
                return Err(SkiffError::Execution(format!(
                    "apply '{}' on column '{column}' returned {} rows, expected {}",
                    func.name,
                    out.len(),
                    input.height()
                )));
            }
            Ok((input.with_column(out.rename(column.clone()))?, input.height()))
        }
    }
}

fn strip_alias(expr: &Expr) -> &Expr {
    match expr {
        Expr::Alias { expr, .. } => strip_alias(expr),
        other => other,
    }
}

/// Keys must be bare column references. Aggregation inputs that are not
/// plain columns are evaluated into hidden columns first.
fn run_group_by(
    keys: &[Expr],
    aggs: &[Expr],
    input: &DataFrame,
    ctx: &ExecContext,
) -> Result<DataFrame> {
    let key_names = keys
        .iter()
        .map(|k| match k {
            Expr::Column(c) => Ok(c.clone()),
            other => Err(SkiffError::Planning(format!(
                "group_by key must be a column reference, got {other}"
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut work = input.clone();
    let mut specs = Vec::with_capacity(aggs.len());
    for (i, agg) in aggs.iter().enumerate() {
        let Expr::Agg { input: arg, op } = strip_alias(agg) else {
            return Err(SkiffError::Planning(format!(
                "group_by expects aggregation expressions, got {agg}"
            )));
        };
        let column = match arg.as_ref() {
            Expr::Column(c) => c.clone(),
            other => {
                let hidden = format!("__agg_{i}");
                work = work.with_column(evaluate(other, input)?.rename(hidden.clone()))?;
                hidden
            }
        };
        specs.push(AggSpec::new(column, *op, agg.output_name()));
    }
    GroupBy::new(&work, &key_names).agg(&ctx.config.parallel, &specs)
}

/// First row of every distinct key tuple, in first-seen order.
fn distinct(input: &DataFrame, subset: Option<&[String]>, ctx: &ExecContext) -> Result<DataFrame> {
    let names = match subset {
        Some(s) => s.to_vec(),
        None => input.column_names(),
    };
    if names.is_empty() {
        return Ok(input.clone());
    }
    let keys = names
        .iter()
        .map(|n| input.column(n))
        .collect::<Result<Vec<_>>>()?;
    let index = GroupIndex::from_keys(&ctx.config.parallel, &keys);
    input.take(&UInt32Array::from(index.first_row_idx().to_vec()))
}

/// One row per distinct index tuple, one Float64 column per distinct pivot
/// value (sorted by string form). Absent combinations are null; rows whose
/// pivot value is null are ignored.
fn pivot(
    input: &DataFrame,
    index: &[String],
    columns: &str,
    values: &str,
    agg: AggOp,
    ctx: &ExecContext,
) -> Result<DataFrame> {
    if index.is_empty() {
        return Err(SkiffError::Planning(
            "pivot requires at least one index column".to_string(),
        ));
    }
    let parallel = &ctx.config.parallel;
    let index_cols = index
        .iter()
        .map(|c| input.column(c))
        .collect::<Result<Vec<_>>>()?;
    let pivot_col = input.column(columns)?;
    let value_col = input.column(values)?;

    let rows = GroupIndex::from_keys(parallel, &index_cols);
    let mut combo_keys = index_cols.clone();
    combo_keys.push(pivot_col);
    let combos = GroupIndex::from_keys(parallel, &combo_keys);
    let cells = aggregate(value_col, agg, &combos)?;

    let labels: BTreeSet<String> = combos
        .first_row_idx()
        .iter()
        .filter(|&&r| !pivot_col.is_null_at(r as usize))
        .map(|&r| pivot_col.get(r as usize).to_plain_string())
        .collect();
    let position: HashMap<&str, usize> = labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();

    let mut grid: Vec<Vec<Option<f64>>> = vec![vec![None; rows.num_groups()]; labels.len()];
    for (combo, &first) in combos.first_row_idx().iter().enumerate() {
        if pivot_col.is_null_at(first as usize) {
            continue;
        }
        let label = pivot_col.get(first as usize).to_plain_string();
        if let Some(&col) = position.get(label.as_str()) {
            let row = rows.row_group_ids()[first as usize] as usize;
            grid[col][row] = cells.f64_at(combo);
        }
    }

    let firsts = UInt32Array::from(rows.first_row_idx().to_vec());
    let mut out = index_cols
        .iter()
        .map(|c| c.take(&firsts))
        .collect::<Result<Vec<_>>>()?;
    out.extend(
        labels
            .iter()
            .zip(grid)
            .map(|(label, column)| Series::from_opt_f64(label.clone(), column)),
    );
    DataFrame::new(out)
}

/// Unpivots `value_vars` into `(variable, value)` pairs, value var by value
/// var. Values become Float64 when every value column is numeric, String
/// otherwise.
fn melt(
    input: &DataFrame,
    id_vars: &[String],
    value_vars: &[String],
    variable_name: &str,
    value_name: &str,
) -> Result<DataFrame> {
    let value_vars: Vec<String> = if value_vars.is_empty() {
        input
            .column_names()
            .into_iter()
            .filter(|c| !id_vars.contains(c))
            .collect()
    } else {
        value_vars.to_vec()
    };
    let height = input.height();
    let values = value_vars
        .iter()
        .map(|c| input.column(c))
        .collect::<Result<Vec<_>>>()?;
    let target = if values.iter().all(|s| s.dtype().is_numeric()) {
        DType::Float64
    } else {
        DType::String
    };

    let repeat: UInt32Array = (0..value_vars.len())
        .flat_map(|_| 0..height as u32)
        .collect();
    let mut out = id_vars
        .iter()
        .map(|c| input.column(c)?.take(&repeat))
        .collect::<Result<Vec<_>>>()?;
    let labels: Vec<&str> = value_vars
        .iter()
        .flat_map(|v| std::iter::repeat(v.as_str()).take(height))
        .collect();
    out.push(Series::from_strs(variable_name, &labels));

    let value = if values.is_empty() {
        Series::nulls_of(value_name, DType::Float64, 0)?
    } else {
        let cast = values
            .iter()
            .map(|s| s.cast(target))
            .collect::<Result<Vec<_>>>()?;
        let parts: Vec<&Series> = cast.iter().collect();
        Series::concat(&parts)?.rename(value_name)
    };
    out.push(value);
    DataFrame::new(out)
}
