//! Hash grouping and per-group aggregation.
//!
//! [`GroupBy::new`] is a cheap builder; key columns are resolved (and a
//! missing key reported) only when groups are computed. Group ids come from
//! [`compute_group_ids`] with a key-equality callback, so rows share a group
//! exactly when their key values are equal, whatever their hashes do.
//!
//! Output frames list the key columns first, gathered at each group's first
//! row, then one column per aggregation in request order. Groups appear in
//! first-seen order.
//!
//! Groups without a single non-null value produce `NaN` for float results,
//! `0` for integer sums, minima, maxima and counts, and null for first/last
//! picks and string extrema. Std and var need at least two values.

use std::borrow::Cow;

use arrow::array::UInt32Array;
use skiff_common::{OperationType, ParallelConfig, Result, SkiffError};
use skiff_planner::AggOp;
use skiff_storage::kernels::{
    aggregate_max_by_group_f64, aggregate_max_by_group_i64, aggregate_min_by_group_f64,
    aggregate_min_by_group_i64, aggregate_sum_by_group_f64, aggregate_sum_by_group_i64,
    combine_hashes, compute_group_ids, gather, hash_column,
};
use skiff_storage::{DType, DataFrame, Series};
use tracing::debug;

use crate::scheduler::{parallel_build_columns, parallel_tasks};

/// One requested aggregation: `op` over `column` (or over whole groups when
/// `column` is `None`), written as `alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggSpec {
    /// Input column; `None` counts rows.
    pub column: Option<String>,
    /// Aggregation function.
    pub op: AggOp,
    /// Output column name.
    pub alias: String,
}

impl AggSpec {
    /// `op` over `column`, written as `alias`.
    pub fn new(column: impl Into<String>, op: AggOp, alias: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            op,
            alias: alias.into(),
        }
    }

    /// `<column>_<op>`, or plain `count` for counts.
    pub fn named(column: impl Into<String>, op: AggOp) -> Self {
        let column = column.into();
        let alias = match op {
            AggOp::Count => "count".to_string(),
            _ => format!("{column}_{}", op.name()),
        };
        Self::new(column, op, alias)
    }

    /// Group sizes.
    pub fn count_rows(alias: impl Into<String>) -> Self {
        Self {
            column: None,
            op: AggOp::Count,
            alias: alias.into(),
        }
    }
}

/// Row-to-group assignment for one frame and key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex {
    row_group_ids: Vec<u32>,
    first_row_idx: Vec<u32>,
    group_counts: Vec<u32>,
}

impl GroupIndex {
    /// Groups rows by `keys`; nulls (and NaN) form their own group.
    pub fn from_keys(config: &ParallelConfig, keys: &[&Series]) -> Self {
        let height = keys.first().map_or(0, |k| k.len());
        let hashes = key_hashes(config, keys, height);
        let ids = compute_group_ids(&hashes, |a, b| keys.iter().all(|k| k.eq_at(a, k, b)));
        let (row_group_ids, num_groups) = ids.into_parts();

        let mut first_row_idx = vec![u32::MAX; num_groups];
        let mut group_counts = vec![0u32; num_groups];
        for (row, &g) in row_group_ids.iter().enumerate() {
            let g = g as usize;
            if group_counts[g] == 0 {
                first_row_idx[g] = row as u32;
            }
            group_counts[g] += 1;
        }
        Self {
            row_group_ids,
            first_row_idx,
            group_counts,
        }
    }

    /// Number of distinct key tuples.
    pub fn num_groups(&self) -> usize {
        self.group_counts.len()
    }

    /// Group of each input row; `height` entries, each below `num_groups`.
    pub fn row_group_ids(&self) -> &[u32] {
        &self.row_group_ids
    }

    /// First input row of each group, ascending.
    pub fn first_row_idx(&self) -> &[u32] {
        &self.first_row_idx
    }

    /// Rows per group; sums to the input height.
    pub fn group_counts(&self) -> &[u32] {
        &self.group_counts
    }

    /// Last input row of each group.
    pub fn last_row_idx(&self) -> Vec<u32> {
        let mut last = vec![0u32; self.num_groups()];
        for (row, &g) in self.row_group_ids.iter().enumerate() {
            last[g as usize] = row as u32;
        }
        last
    }
}

fn key_hashes(config: &ParallelConfig, keys: &[&Series], height: usize) -> Vec<u64> {
    let per_key: Vec<Vec<u64>> =
        if keys.len() > 1 && config.should_parallelize_op(OperationType::GroupByHash, height) {
            parallel_tasks(config, keys.len(), |i| hash_column(keys[i]))
        } else {
            keys.iter().map(|k| hash_column(k)).collect()
        };
    let mut iter = per_key.into_iter();
    let mut acc = iter.next().unwrap_or_else(|| vec![0; height]);
    for h in iter {
        combine_hashes(&mut acc, &h);
    }
    acc
}

/// Eager grouping over a borrowed frame.
#[derive(Debug, Clone)]
pub struct GroupBy<'a> {
    df: &'a DataFrame,
    keys: Vec<String>,
}

impl<'a> GroupBy<'a> {
    /// Groups `df` by `keys`; nothing is computed yet.
    pub fn new<S: AsRef<str>>(df: &'a DataFrame, keys: &[S]) -> Self {
        Self {
            df,
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        }
    }

    /// Key column names.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn key_columns(&self) -> Result<Vec<&'a Series>> {
        if self.keys.is_empty() {
            return Err(SkiffError::Planning(
                "group_by requires at least one key column".to_string(),
            ));
        }
        self.keys
            .iter()
            .map(|k| {
                self.df.get_column(k).ok_or_else(|| {
                    SkiffError::Schema(format!("group_by key column '{k}' not found"))
                })
            })
            .collect()
    }

    /// # Errors
    /// Schema error naming the first missing key column.
    pub fn groups(&self, config: &ParallelConfig) -> Result<GroupIndex> {
        Ok(GroupIndex::from_keys(config, &self.key_columns()?))
    }

    /// Runs every aggregation over one shared [`GroupIndex`].
    ///
    /// Several aggregations over an input past the parallel threshold are
    /// computed one per worker.
    pub fn agg(&self, config: &ParallelConfig, specs: &[AggSpec]) -> Result<DataFrame> {
        let keys = self.key_columns()?;
        let inputs = specs
            .iter()
            .map(|s| match &s.column {
                Some(c) => self.df.get_column(c).map(Some).ok_or_else(|| {
                    SkiffError::Planning(format!("aggregation on nonexistent column '{c}'"))
                }),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?;

        let index = GroupIndex::from_keys(config, &keys);
        let rows = self.df.height();
        let parallel = specs.len() > 1 && config.should_parallelize(rows);
        let aggregated = parallel_build_columns(config, specs.len(), rows, |i| {
            let spec = &specs[i];
            let out = match inputs[i] {
                Some(values) => aggregate(values, spec.op, &index)?,
                None => Series::from_i64(
                    "",
                    index.group_counts().iter().map(|&c| i64::from(c)).collect(),
                ),
            };
            Ok(out.rename(spec.alias.clone()))
        })?;

        let mut columns = keys
            .iter()
            .map(|k| gather(k, index.first_row_idx()))
            .collect::<Result<Vec<_>>>()?;
        columns.extend(aggregated);
        debug!(
            rows,
            groups = index.num_groups(),
            aggs = specs.len(),
            parallel,
            "group_by"
        );
        DataFrame::new(columns)
    }

    /// One aggregation over several columns, aliased `<column>_<op>`.
    pub fn agg_columns<S: AsRef<str>>(
        &self,
        config: &ParallelConfig,
        op: AggOp,
        columns: &[S],
    ) -> Result<DataFrame> {
        let specs: Vec<AggSpec> = columns
            .iter()
            .map(|c| AggSpec::named(c.as_ref(), op))
            .collect();
        self.agg(config, &specs)
    }

    /// Per-group sum of each column, named `<col>_sum`.
    pub fn sum<S: AsRef<str>>(&self, config: &ParallelConfig, columns: &[S]) -> Result<DataFrame> {
        self.agg_columns(config, AggOp::Sum, columns)
    }

    /// Per-group mean of each column.
    pub fn mean<S: AsRef<str>>(&self, config: &ParallelConfig, columns: &[S]) -> Result<DataFrame> {
        self.agg_columns(config, AggOp::Mean, columns)
    }

    /// Per-group minimum of each column.
    pub fn min<S: AsRef<str>>(&self, config: &ParallelConfig, columns: &[S]) -> Result<DataFrame> {
        self.agg_columns(config, AggOp::Min, columns)
    }

    /// Per-group maximum of each column.
    pub fn max<S: AsRef<str>>(&self, config: &ParallelConfig, columns: &[S]) -> Result<DataFrame> {
        self.agg_columns(config, AggOp::Max, columns)
    }

    /// Group sizes as a `count` column.
    pub fn count(&self, config: &ParallelConfig) -> Result<DataFrame> {
        self.agg(config, &[AggSpec::count_rows("count")])
    }
}

// -----------------------------
// Per-op dispatch
// -----------------------------

/// Aggregates `values` per group of `index`; the result is named after `values`.
pub fn aggregate(values: &Series, op: AggOp, index: &GroupIndex) -> Result<Series> {
    let name = values.name();
    let dtype = values.dtype();
    let out = match op {
        AggOp::Count => Series::from_i64(
            name,
            counts(values, index).into_iter().map(i64::from).collect(),
        ),
        AggOp::First => gather(values, index.first_row_idx())?,
        AggOp::Last => gather(values, &index.last_row_idx())?,
        AggOp::Min | AggOp::Max if dtype.is_string_like() => {
            string_extreme(values, op == AggOp::Max, index)?
        }
        AggOp::CountDistinct => count_distinct(values, index),
        _ => {
            require_numeric(values, op)?;
            match op {
                AggOp::Sum => sum(values, index),
                AggOp::Min | AggOp::Max => extreme(values, op == AggOp::Max, index)?,
                AggOp::Mean => {
                    let n = counts(values, index);
                    let sums = float_sums(values, index);
                    Series::from_f64(name, ratio(&sums, &n))
                }
                AggOp::Std | AggOp::Var => {
                    let var = variance(values, index);
                    let out = if op == AggOp::Std {
                        var.into_iter().map(f64::sqrt).collect()
                    } else {
                        var
                    };
                    Series::from_f64(name, out)
                }
                _ => Series::from_f64(name, medians(values, index)),
            }
        }
    };
    Ok(out)
}

fn require_numeric(values: &Series, op: AggOp) -> Result<()> {
    let dtype = values.dtype();
    if dtype.is_numeric() || dtype == DType::Bool || dtype == DType::Null {
        return Ok(());
    }
    Err(SkiffError::Schema(format!(
        "cannot compute {} of column '{}' with type {dtype}",
        op.name(),
        values.name()
    )))
}

fn counts(values: &Series, index: &GroupIndex) -> Vec<u32> {
    let mut n = vec![0u32; index.num_groups()];
    for (row, &g) in index.row_group_ids().iter().enumerate() {
        if !values.is_null_at(row) {
            n[g as usize] += 1;
        }
    }
    n
}

fn ratio(sums: &[f64], n: &[u32]) -> Vec<f64> {
    sums.iter()
        .zip(n)
        .map(|(s, &c)| if c == 0 { f64::NAN } else { s / f64::from(c) })
        .collect()
}

/// Float64 buffer with nulls replaced by `identity`; borrowed when there is
/// nothing to replace.
fn dense_f64(values: &Series, identity: f64) -> Cow<'_, [f64]> {
    match values.f64_values() {
        Some(v) if values.null_count() == 0 => Cow::Borrowed(v),
        _ => Cow::Owned(
            (0..values.len())
                .map(|i| values.f64_at(i).unwrap_or(identity))
                .collect(),
        ),
    }
}

fn dense_i64(values: &Series, identity: i64) -> Cow<'_, [i64]> {
    match values.i64_values() {
        Some(v) if values.null_count() == 0 => Cow::Borrowed(v),
        _ => Cow::Owned(
            (0..values.len())
                .map(|i| values.i64_at(i).unwrap_or(identity))
                .collect(),
        ),
    }
}

fn float_sums(values: &Series, index: &GroupIndex) -> Vec<f64> {
    let mut out = vec![0.0; index.num_groups()];
    if values.dtype() == DType::Float64 {
        aggregate_sum_by_group_f64(&dense_f64(values, 0.0), index.row_group_ids(), &mut out);
    } else {
        for (row, &g) in index.row_group_ids().iter().enumerate() {
            if let Some(v) = values.f64_at(row) {
                out[g as usize] += v;
            }
        }
    }
    out
}

fn sum(values: &Series, index: &GroupIndex) -> Series {
    let name = values.name();
    let ids = index.row_group_ids();
    match values.dtype() {
        DType::Float64 | DType::Float32 => Series::from_f64(name, float_sums(values, index)),
        DType::Int64 => {
            let mut out = vec![0i64; index.num_groups()];
            aggregate_sum_by_group_i64(&dense_i64(values, 0), ids, &mut out);
            Series::from_i64(name, out)
        }
        _ => {
            let mut out = vec![0i64; index.num_groups()];
            for (row, &g) in ids.iter().enumerate() {
                if let Some(v) = values.i64_at(row) {
                    out[g as usize] = out[g as usize].wrapping_add(v);
                }
            }
            Series::from_i64(name, out)
        }
    }
}

fn extreme(values: &Series, max: bool, index: &GroupIndex) -> Result<Series> {
    let name = values.name();
    let ids = index.row_group_ids();
    let groups = index.num_groups();
    let n = counts(values, index);
    let dtype = values.dtype();
    if dtype.is_float() || dtype == DType::Null {
        let identity = if max { f64::NEG_INFINITY } else { f64::INFINITY };
        let mut out = vec![identity; groups];
        if dtype == DType::Float64 {
            let dense = dense_f64(values, identity);
            if max {
                aggregate_max_by_group_f64(&dense, ids, &mut out);
            } else {
                aggregate_min_by_group_f64(&dense, ids, &mut out);
            }
        } else {
            for (row, &g) in ids.iter().enumerate() {
                if let Some(v) = values.f64_at(row) {
                    let slot = &mut out[g as usize];
                    if (max && v > *slot) || (!max && v < *slot) {
                        *slot = v;
                    }
                }
            }
        }
        for (slot, &c) in out.iter_mut().zip(&n) {
            if c == 0 {
                *slot = f64::NAN;
            }
        }
        return Ok(Series::from_f64(name, out));
    }

    let identity = if max { i64::MIN } else { i64::MAX };
    let mut out = vec![identity; groups];
    if dtype == DType::Int64 {
        let dense = dense_i64(values, identity);
        if max {
            aggregate_max_by_group_i64(&dense, ids, &mut out);
        } else {
            aggregate_min_by_group_i64(&dense, ids, &mut out);
        }
    } else {
        for (row, &g) in ids.iter().enumerate() {
            if let Some(v) = values.i64_at(row) {
                let slot = &mut out[g as usize];
                *slot = if max { (*slot).max(v) } else { (*slot).min(v) };
            }
        }
    }
    for (slot, &c) in out.iter_mut().zip(&n) {
        if c == 0 {
            *slot = 0;
        }
    }
    Series::from_i64(name, out).cast(dtype)
}

fn string_extreme(values: &Series, max: bool, index: &GroupIndex) -> Result<Series> {
    let mut best: Vec<Option<u32>> = vec![None; index.num_groups()];
    for (row, &g) in index.row_group_ids().iter().enumerate() {
        if values.is_null_at(row) {
            continue;
        }
        let slot = &mut best[g as usize];
        let replace = match slot {
            None => true,
            Some(b) => {
                let ord = values.cmp_values(row, values, *b as usize);
                if max {
                    ord.is_gt()
                } else {
                    ord.is_lt()
                }
            }
        };
        if replace {
            *slot = Some(row as u32);
        }
    }
    values.take(&best.into_iter().collect::<UInt32Array>())
}

/// Sample variance (ddof = 1), two passes: means first, then squared deviations.
fn variance(values: &Series, index: &GroupIndex) -> Vec<f64> {
    let n = counts(values, index);
    let means = ratio(&float_sums(values, index), &n);
    let mut ssd = vec![0.0; index.num_groups()];
    for (row, &g) in index.row_group_ids().iter().enumerate() {
        if let Some(v) = values.f64_at(row) {
            let d = v - means[g as usize];
            ssd[g as usize] += d * d;
        }
    }
    ssd.iter()
        .zip(&n)
        .map(|(s, &c)| if c < 2 { f64::NAN } else { s / f64::from(c - 1) })
        .collect()
}

fn medians(values: &Series, index: &GroupIndex) -> Vec<f64> {
    let mut per_group: Vec<Vec<f64>> = vec![Vec::new(); index.num_groups()];
    for (row, &g) in index.row_group_ids().iter().enumerate() {
        if let Some(v) = values.f64_at(row) {
            per_group[g as usize].push(v);
        }
    }
    per_group
        .into_iter()
        .map(|mut v| {
            if v.is_empty() {
                return f64::NAN;
            }
            v.sort_by(f64::total_cmp);
            let mid = v.len() / 2;
            if v.len() % 2 == 1 {
                v[mid]
            } else {
                (v[mid - 1] + v[mid]) / 2.0
            }
        })
        .collect()
}

/// Distinct non-null values per group, via group ids over `(group, value)`.
fn count_distinct(values: &Series, index: &GroupIndex) -> Series {
    let ids = index.row_group_ids();
    let mut hashes = hash_column(values);
    let group_hashes: Vec<u64> = ids.iter().map(|&g| u64::from(g)).collect();
    combine_hashes(&mut hashes, &group_hashes);
    let pairs = compute_group_ids(&hashes, |a, b| {
        ids[a] == ids[b] && values.eq_at(a, values, b)
    });
    let mut seen = vec![false; pairs.num_groups()];
    let mut out = vec![0i64; index.num_groups()];
    for (row, &pair) in pairs.ids().iter().enumerate() {
        if values.is_null_at(row) || seen[pair as usize] {
            continue;
        }
        seen[pair as usize] = true;
        out[ids[row] as usize] += 1;
    }
    Series::from_i64(values.name(), out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Series::from_i64("key", vec![1, 1, 2, 2, 2]),
            Series::from_i64("value", vec![10, 20, 30, 40, 50]),
        ])
        .expect("frame")
    }

    fn seq() -> ParallelConfig {
        ParallelConfig::sequential()
    }

    #[test]
    fn sum_mean_count_on_reference_fixture() {
        let df = sample();
        let gb = GroupBy::new(&df, &["key"]);
        let out = gb
            .agg(
                &seq(),
                &[
                    AggSpec::named("value", AggOp::Sum),
                    AggSpec::named("value", AggOp::Mean),
                    AggSpec::count_rows("count"),
                ],
            )
            .expect("agg");
        let expected = DataFrame::new(vec![
            Series::from_i64("key", vec![1, 2]),
            Series::from_i64("value_sum", vec![30, 120]),
            Series::from_f64("value_mean", vec![15.0, 40.0]),
            Series::from_i64("count", vec![2, 3]),
        ])
        .expect("frame");
        assert_eq!(out, expected);
    }

    #[test]
    fn missing_key_is_deferred_to_aggregation() {
        let df = sample();
        let gb = GroupBy::new(&df, &["nope"]);
        let err = gb.count(&seq()).expect_err("missing key");
        assert!(err.to_string().contains("'nope'"));
        let err = GroupBy::new(&df, &["key"])
            .sum(&seq(), &["x"])
            .expect_err("missing value column");
        assert_eq!(
            err.to_string(),
            "planning error: aggregation on nonexistent column 'x'"
        );
    }

    #[test]
    fn statistics_follow_small_group_policy() {
        let df = DataFrame::new(vec![
            Series::from_strs("k", &["a", "b", "a", "a", "c"]),
            Series::from_opt_f64("v", vec![Some(1.0), Some(5.0), Some(3.0), Some(2.0), None]),
        ])
        .expect("frame");
        let gb = GroupBy::new(&df, &["k"]);
        let out = gb
            .agg(
                &seq(),
                &[
                    AggSpec::new("v", AggOp::Var, "var"),
                    AggSpec::new("v", AggOp::Median, "median"),
                    AggSpec::new("v", AggOp::Min, "min"),
                    AggSpec::new("v", AggOp::Count, "n"),
                ],
            )
            .expect("agg");
        assert_eq!(
            out.column("var").expect("var"),
            &Series::from_f64("var", vec![1.0, f64::NAN, f64::NAN])
        );
        assert_eq!(
            out.column("median").expect("median"),
            &Series::from_f64("median", vec![2.0, 5.0, f64::NAN])
        );
        assert_eq!(
            out.column("min").expect("min"),
            &Series::from_f64("min", vec![1.0, 5.0, f64::NAN])
        );
        assert_eq!(
            out.column("n").expect("n"),
            &Series::from_i64("n", vec![3, 1, 0])
        );
    }

    #[test]
    fn first_last_distinct_and_string_extremes() {
        let df = DataFrame::new(vec![
            Series::from_i32("k", vec![7, 8, 7, 7, 8]),
            Series::from_strs("s", &["m", "z", "a", "m", "b"]),
        ])
        .expect("frame");
        let gb = GroupBy::new(&df, &["k"]);
        let out = gb
            .agg(
                &seq(),
                &[
                    AggSpec::new("s", AggOp::First, "first"),
                    AggSpec::new("s", AggOp::Last, "last"),
                    AggSpec::new("s", AggOp::CountDistinct, "distinct"),
                    AggSpec::new("s", AggOp::Max, "max"),
                ],
            )
            .expect("agg");
        let expected = DataFrame::new(vec![
            Series::from_i32("k", vec![7, 8]),
            Series::from_strs("first", &["m", "z"]),
            Series::from_strs("last", &["m", "b"]),
            Series::from_i64("distinct", vec![2, 2]),
            Series::from_strs("max", &["m", "z"]),
        ])
        .expect("frame");
        assert_eq!(out, expected);
    }

    #[test]
    fn null_keys_form_one_group_and_categorical_keys_keep_dictionary() {
        let df = DataFrame::new(vec![
            Series::from_categories("c", vec![Some("x"), None, Some("y"), None, Some("x")]),
            Series::from_i64("v", vec![1, 2, 3, 4, 5]),
        ])
        .expect("frame");
        let out = GroupBy::new(&df, &["c"])
            .sum(&seq(), &["v"])
            .expect("sum");
        assert_eq!(out.column("c").expect("c").dtype(), DType::Categorical);
        assert_eq!(
            out.column("v_sum").expect("sum"),
            &Series::from_i64("v_sum", vec![6, 6, 3])
        );
    }

    #[test]
    fn strings_cannot_be_summed() {
        let df = DataFrame::new(vec![
            Series::from_i64("k", vec![1]),
            Series::from_strs("s", &["a"]),
        ])
        .expect("frame");
        assert!(matches!(
            GroupBy::new(&df, &["k"]).sum(&seq(), &["s"]),
            Err(SkiffError::Schema(_))
        ));
    }

    #[test]
    fn float32_sums_widen_to_float64() {
        let df = DataFrame::new(vec![
            Series::from_i64("k", vec![1, 2, 1]),
            Series::from_f32("x", vec![0.5, 2.0, 1.5]),
        ])
        .expect("frame");
        let out = GroupBy::new(&df, &["k"])
            .sum(&seq(), &["x"])
            .expect("sum");
        assert_eq!(
            out.column("x_sum").expect("sum"),
            &Series::from_f64("x_sum", vec![2.0, 2.0])
        );
    }

    #[test]
    fn parallel_multi_agg_matches_sequential() {
        let n = 20_000;
        let df = DataFrame::new(vec![
            Series::from_i64("k", (0..n).map(|i| i % 13).collect()),
            Series::from_f64("v", (0..n).map(|i| (i % 101) as f64).collect()),
            Series::from_i64("w", (0..n).collect()),
        ])
        .expect("frame");
        let specs = [
            AggSpec::named("v", AggOp::Sum),
            AggSpec::named("v", AggOp::Max),
            AggSpec::named("w", AggOp::Min),
            AggSpec::named("w", AggOp::CountDistinct),
        ];
        let gb = GroupBy::new(&df, &["k"]);
        assert_eq!(
            gb.agg(&ParallelConfig::eager(512, 4), &specs).expect("par"),
            gb.agg(&seq(), &specs).expect("seq")
        );
    }

    proptest! {
        #[test]
        fn groups_partition_rows_by_key_value(
            a in proptest::collection::vec(0i64..4, 0..200),
            b_seed in proptest::collection::vec(0u8..3, 0..200),
        ) {
            let n = a.len().min(b_seed.len());
            let a = Series::from_i64("a", a[..n].to_vec());
            let b = Series::from_opt_strs(
                "b",
                &b_seed[..n]
                    .iter()
                    .map(|v| match v { 0 => None, 1 => Some("p"), _ => Some("q") })
                    .collect::<Vec<_>>(),
            );
            let index = GroupIndex::from_keys(&seq(), &[&a, &b]);
            let ids = index.row_group_ids();
            prop_assert_eq!(ids.len(), n);
            prop_assert_eq!(index.group_counts().iter().map(|&c| c as usize).sum::<usize>(), n);
            for i in 0..n {
                prop_assert!((ids[i] as usize) < index.num_groups());
                for j in 0..n {
                    let same_key = a.eq_at(i, &a, j) && b.eq_at(i, &b, j);
                    prop_assert_eq!(ids[i] == ids[j], same_key);
                }
            }
        }
    }

    #[test]
    fn colliding_hashes_do_not_merge_groups() {
        let keys = Series::from_i64("k", vec![5, 9, 5, 9, 11]);
        let ids = compute_group_ids(&[0; 5], |x, y| keys.eq_at(x, &keys, y));
        assert_eq!(ids.ids(), &[0, 1, 0, 1, 2]);
        assert_eq!(ids.num_groups(), 3);
    }
}
