use std::sync::Arc;

use skiff_common::Result;
use skiff_execution::{execute, JoinOptions};
use skiff_planner::{
    explain_logical, next_cache_id, AggOp, ColumnFn, Expr, JoinType, LogicalPlan,
};
use skiff_storage::{kernels, DataFrame, FrameSink, Series};
use tracing::{info, info_span};

use crate::session::SharedSession;

/// A deferred query: builder methods only grow the plan, nothing runs until
/// [`LazyFrame::collect`].
#[derive(Debug, Clone)]
pub struct LazyFrame {
    session: SharedSession,
    plan: LogicalPlan,
}

impl LazyFrame {
    pub(crate) fn new(session: SharedSession, plan: LogicalPlan) -> Self {
        Self { session, plan }
    }

    fn wrap(self, build: impl FnOnce(Box<LogicalPlan>) -> LogicalPlan) -> Self {
        Self::new(self.session, build(Box::new(self.plan)))
    }

    pub fn logical_plan(&self) -> &LogicalPlan {
        &self.plan
    }

    /// df.select(exprs)
    pub fn select(self, exprs: Vec<Expr>) -> Self {
        self.wrap(|input| LogicalPlan::Projection { exprs, input })
    }

    /// df.filter(predicate)
    pub fn filter(self, predicate: Expr) -> Self {
        self.wrap(|input| LogicalPlan::Filter { predicate, input })
    }

    /// Replaces the column named by `expr`'s output name, or appends it.
    pub fn with_column(self, expr: Expr) -> Self {
        self.wrap(|input| LogicalPlan::WithColumn { expr, input })
    }

    /// df.group_by(keys); keys must be plain column references when collected.
    pub fn group_by(self, keys: Vec<Expr>) -> LazyGroupBy {
        LazyGroupBy { input: self, keys }
    }

    /// Equi-join on same-named keys, using the session's collision suffix.
    pub fn join<S: AsRef<str>>(self, right: LazyFrame, on: &[S], how: JoinType) -> Self {
        let suffix = self.session.config.join_suffix.clone();
        self.join_with(right, JoinOptions::on(how, on).with_suffix(suffix))
    }

    /// Join with explicit left/right keys and suffix.
    pub fn join_with(self, right: LazyFrame, opts: JoinOptions) -> Self {
        let JoinOptions {
            how,
            left_on,
            right_on,
            suffix,
        } = opts;
        let right = Box::new(right.plan);
        self.wrap(|left| LogicalPlan::Join {
            left,
            right,
            join_type: how,
            left_on,
            right_on,
            suffix,
        })
    }

    /// Cartesian product with `right`.
    pub fn cross_join(self, right: LazyFrame) -> Self {
        let suffix = self.session.config.join_suffix.clone();
        self.join_with(right, JoinOptions::cross().with_suffix(suffix))
    }

    /// Stable single-key sort.
    pub fn sort(self, by: &str, descending: bool) -> Self {
        self.sort_by(&[by], &[descending])
    }

    /// Stable multi-key sort; `descending` pairs positionally with `by`.
    pub fn sort_by<S: AsRef<str>>(self, by: &[S], descending: &[bool]) -> Self {
        let by = by.iter().map(|s| s.as_ref().to_string()).collect();
        let descending = descending.to_vec();
        self.wrap(|input| LogicalPlan::Sort {
            by,
            descending,
            input,
        })
    }

    pub fn head(self, n: usize) -> Self {
        self.wrap(|input| LogicalPlan::Limit { n, input })
    }

    pub fn tail(self, n: usize) -> Self {
        self.wrap(|input| LogicalPlan::Tail { n, input })
    }

    /// Drops rows that repeat an earlier row.
    pub fn distinct(self) -> Self {
        self.wrap(|input| LogicalPlan::Distinct {
            subset: None,
            input,
        })
    }

    /// Keeps the first row of each distinct `subset` tuple.
    pub fn distinct_by<S: AsRef<str>>(self, subset: &[S]) -> Self {
        let subset = Some(subset.iter().map(|s| s.as_ref().to_string()).collect());
        self.wrap(|input| LogicalPlan::Distinct { subset, input })
    }

    /// Spreads `values` into one column per distinct `columns` value.
    pub fn pivot<S: AsRef<str>>(self, index: &[S], columns: &str, values: &str, agg: AggOp) -> Self {
        let index = index.iter().map(|s| s.as_ref().to_string()).collect();
        let (columns, values) = (columns.to_string(), values.to_string());
        self.wrap(|input| LogicalPlan::Pivot {
            index,
            columns,
            values,
            agg,
            input,
        })
    }

    /// Unpivots into `variable`/`value` columns; empty `value_vars` takes
    /// every non-id column.
    pub fn melt<S: AsRef<str>>(self, id_vars: &[S], value_vars: &[S]) -> Self {
        self.melt_as(id_vars, value_vars, "variable", "value")
    }

    pub fn melt_as<S: AsRef<str>>(
        self,
        id_vars: &[S],
        value_vars: &[S],
        variable_name: &str,
        value_name: &str,
    ) -> Self {
        let id_vars = id_vars.iter().map(|s| s.as_ref().to_string()).collect();
        let value_vars = value_vars.iter().map(|s| s.as_ref().to_string()).collect();
        let (variable_name, value_name) = (variable_name.to_string(), value_name.to_string());
        self.wrap(|input| LogicalPlan::Melt {
            id_vars,
            value_vars,
            variable_name,
            value_name,
            input,
        })
    }

    /// Memoizes this frame's result in the session; later collects of any
    /// plan containing this node reuse it until the cache is cleared.
    pub fn cache(self) -> Self {
        let id = next_cache_id();
        self.wrap(|input| LogicalPlan::Cache { id, input })
    }

    /// Replaces `column` with `func(column)`; the output must keep the frame height.
    pub fn apply<F>(self, column: &str, name: &str, func: F) -> Self
    where
        F: Fn(&Series) -> Result<Series> + Send + Sync + 'static,
    {
        let column = column.to_string();
        let func = ColumnFn::new(name, Arc::new(func));
        self.wrap(|input| LogicalPlan::Apply {
            column,
            func,
            input,
        })
    }

    /// The plan `collect` would execute.
    pub fn optimized_plan(&self) -> Result<LogicalPlan> {
        if self.session.config.optimize {
            self.session.optimizer.optimize(self.plan.clone())
        } else {
            Ok(self.plan.clone())
        }
    }

    /// df.collect()
    pub fn collect(&self) -> Result<DataFrame> {
        let plan = self.optimized_plan()?;
        let ctx = self.session.exec_context();
        let span = info_span!("collect", query_id = %ctx.query_id);
        let _guard = span.enter();
        let df = execute(&plan, &ctx)?;
        info!(rows = df.height(), cols = df.width(), "query complete");
        Ok(df)
    }

    /// Collects and hands the result to `sink`.
    pub fn sink(&self, sink: &dyn FrameSink) -> Result<()> {
        sink.write(&self.collect()?)
    }

    /// Indented plan tree, before or after optimization.
    pub fn explain(&self, optimized: bool) -> Result<String> {
        if optimized {
            Ok(explain_logical(&self.optimized_plan()?))
        } else {
            Ok(explain_logical(&self.plan))
        }
    }

    /// Summary statistics of every numeric column of the collected frame.
    ///
    /// One row per statistic (`count`, `null_count`, `mean`, `std`, `min`,
    /// `max`), labelled by a leading `statistic` column. `std` is the sample
    /// deviation and is `NaN` below two values, as are empty means and extrema.
    pub fn describe(&self) -> Result<DataFrame> {
        let df = self.collect()?;
        let mut out = vec![Series::from_strs(
            "statistic",
            &["count", "null_count", "mean", "std", "min", "max"],
        )];
        for s in df.columns().iter().filter(|s| s.dtype().is_numeric()) {
            out.push(describe_column(s)?);
        }
        DataFrame::new(out)
    }
}

fn describe_column(s: &Series) -> Result<Series> {
    let values: Vec<f64> = s.to_f64_vec()?.into_iter().flatten().collect();
    let n = values.len();
    let mean = kernels::mean(s)?.unwrap_or(f64::NAN);
    let std = if n < 2 {
        f64::NAN
    } else {
        let ss: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (n - 1) as f64).sqrt()
    };
    let min = kernels::min(s)?.as_f64().unwrap_or(f64::NAN);
    let max = kernels::max(s)?.as_f64().unwrap_or(f64::NAN);
    Ok(Series::from_f64(
        s.name(),
        vec![n as f64, s.null_count() as f64, mean, std, min, max],
    ))
}

/// Pending grouping of a [`LazyFrame`].
#[derive(Debug, Clone)]
pub struct LazyGroupBy {
    input: LazyFrame,
    keys: Vec<Expr>,
}

impl LazyGroupBy {
    /// df.group_by(keys).agg(exprs); each expr must be an aggregation, optionally aliased.
    pub fn agg(self, aggs: Vec<Expr>) -> LazyFrame {
        let keys = self.keys;
        self.input
            .wrap(|input| LogicalPlan::GroupBy { keys, aggs, input })
    }

    fn agg_columns<S: AsRef<str>>(self, op: AggOp, columns: &[S]) -> LazyFrame {
        let aggs = columns
            .iter()
            .map(|c| {
                let c = c.as_ref();
                Expr::col(c).agg(op).alias(format!("{c}_{}", op.name()))
            })
            .collect();
        self.agg(aggs)
    }

    pub fn sum<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Sum, columns)
    }

    pub fn mean<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Mean, columns)
    }

    pub fn min<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Min, columns)
    }

    pub fn max<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Max, columns)
    }

    pub fn first<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::First, columns)
    }

    pub fn last<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Last, columns)
    }

    pub fn std<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Std, columns)
    }

    pub fn var<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Var, columns)
    }

    pub fn median<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::Median, columns)
    }

    pub fn count_distinct<S: AsRef<str>>(self, columns: &[S]) -> LazyFrame {
        self.agg_columns(AggOp::CountDistinct, columns)
    }

    /// Group sizes as a `count` column.
    pub fn count(self) -> LazyFrame {
        self.agg(vec![Expr::lit(1).count().alias("count")])
    }
}
