//! Equi-join and cross-join strategies over materialized frames.
//!
//! The hash strategy indexes the right side in a [`PartitionedHashIndex`] and
//! probes it with left rows through [`collect_matches`]. Sort-merge is picked
//! for inner single-key joins whose key columns already arrive sorted.
//! Either way the match list is ordered by `(left_row, right_row)`, unmatched
//! left rows sit in their left position and unmatched right rows are
//! appended in right-row order.

use std::cmp::Ordering;

use arrow::array::UInt32Array;
use skiff_common::{global_metrics, EngineConfig, Result, SkiffError};
use skiff_planner::{effective_suffix, join_output_columns, JoinSide, JoinType};
use skiff_storage::kernels::{argsort_multi, combine_hashes, hash_column_by_value};
use skiff_storage::{DType, DataFrame, Series};
use tracing::info;

use crate::collector::{collect_matches, MatchPair};
use crate::hash_index::PartitionedHashIndex;

/// What to join on and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    /// Join flavor.
    pub how: JoinType,
    /// Key columns of the left frame.
    pub left_on: Vec<String>,
    /// Key columns of the right frame, paired positionally with `left_on`.
    pub right_on: Vec<String>,
    /// Appended to right columns whose names collide with the left side.
    pub suffix: String,
}

impl JoinOptions {
    /// Options with the default suffix.
    pub fn new(how: JoinType, left_on: Vec<String>, right_on: Vec<String>) -> Self {
        Self {
            how,
            left_on,
            right_on,
            suffix: skiff_planner::DEFAULT_JOIN_SUFFIX.to_string(),
        }
    }

    /// Same key names on both sides.
    pub fn on<S: AsRef<str>>(how: JoinType, keys: &[S]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        Self::new(how, keys.clone(), keys)
    }

    /// Cartesian product, no keys.
    pub fn cross() -> Self {
        Self::new(JoinType::Cross, Vec::new(), Vec::new())
    }

    /// Replaces the collision suffix; empty falls back to the default.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Key lists must pair up one-to-one; cross joins take no keys.
    pub fn validate(&self) -> Result<()> {
        if self.how == JoinType::Cross {
            if !self.left_on.is_empty() || !self.right_on.is_empty() {
                return Err(SkiffError::Planning(
                    "cross join does not take join keys".to_string(),
                ));
            }
            return Ok(());
        }
        if self.left_on.is_empty() {
            return Err(SkiffError::Planning(format!(
                "{} join requires at least one key",
                self.how.name()
            )));
        }
        if self.left_on.len() != self.right_on.len() {
            return Err(SkiffError::Planning(format!(
                "join key count mismatch: left_on has {}, right_on has {}",
                self.left_on.len(),
                self.right_on.len()
            )));
        }
        Ok(())
    }
}

/// Physical algorithm picked for a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Partitioned hash index over the right side, probed by the left.
    Hash,
    /// Two-pointer merge over sorted single keys.
    SortMerge,
    /// Every left row against every right row.
    Cross,
}

impl JoinStrategy {
    /// Metric label.
    pub fn name(self) -> &'static str {
        match self {
            JoinStrategy::Hash => "hash",
            JoinStrategy::SortMerge => "sort_merge",
            JoinStrategy::Cross => "cross",
        }
    }
}

/// Joins two frames with the strategy picked by [`choose_strategy`].
///
/// # Errors
/// Planning errors for malformed key lists, schema errors for missing key
/// columns or key dtypes that cannot be compared.
pub fn join(
    left: &DataFrame,
    right: &DataFrame,
    opts: &JoinOptions,
    config: &EngineConfig,
) -> Result<DataFrame> {
    opts.validate()?;
    let (left_keys, right_keys) = resolve_keys(left, right, opts)?;
    let strategy = choose_strategy(&left_keys, &right_keys, opts.how, config);
    let pairs = match strategy {
        JoinStrategy::Cross => cross_pairs(left.height(), right.height()),
        JoinStrategy::SortMerge => sort_merge_pairs(&left_keys, &right_keys, true),
        JoinStrategy::Hash => hash_pairs(&left_keys, &right_keys, opts.how, config),
    };
    let out = assemble(left, right, opts, &pairs)?;
    global_metrics().record_join_strategy(strategy.name());
    info!(
        strategy = strategy.name(),
        how = opts.how.name(),
        left_rows = left.height(),
        right_rows = right.height(),
        out_rows = out.height(),
        "join"
    );
    Ok(out)
}

/// Inner join by sorting both sides on their keys and merging equal runs.
///
/// Works on unsorted input too; already sorted key columns skip the argsort.
/// Output is deterministic: key order, then left row, then right row.
pub fn sort_merge_join(
    left: &DataFrame,
    right: &DataFrame,
    opts: &JoinOptions,
) -> Result<DataFrame> {
    opts.validate()?;
    if opts.how != JoinType::Inner {
        return Err(SkiffError::Unsupported(format!(
            "sort-merge join only implements inner joins, got {}",
            opts.how.name()
        )));
    }
    let (left_keys, right_keys) = resolve_keys(left, right, opts)?;
    let presorted = left_keys.len() == 1
        && left_keys[0].is_sorted_ascending()
        && right_keys[0].is_sorted_ascending();
    let pairs = sort_merge_pairs(&left_keys, &right_keys, presorted);
    global_metrics().record_join_strategy(JoinStrategy::SortMerge.name());
    assemble(left, right, opts, &pairs)
}

/// Cross joins are always [`JoinStrategy::Cross`]. Sort-merge needs
/// `auto_sort_merge`, an inner join on one key and both key columns sorted
/// ascending without nulls. Everything else hashes.
pub fn choose_strategy(
    left_keys: &[Series],
    right_keys: &[Series],
    how: JoinType,
    config: &EngineConfig,
) -> JoinStrategy {
    if how == JoinType::Cross {
        return JoinStrategy::Cross;
    }
    let sorted_single_key = left_keys.len() == 1
        && right_keys.len() == 1
        && left_keys[0].is_sorted_ascending()
        && right_keys[0].is_sorted_ascending();
    if config.auto_sort_merge && how == JoinType::Inner && sorted_single_key {
        JoinStrategy::SortMerge
    } else {
        JoinStrategy::Hash
    }
}

// -----------------------------
// Key resolution
// -----------------------------

fn resolve_keys(
    left: &DataFrame,
    right: &DataFrame,
    opts: &JoinOptions,
) -> Result<(Vec<Series>, Vec<Series>)> {
    let mut lk = Vec::with_capacity(opts.left_on.len());
    let mut rk = Vec::with_capacity(opts.right_on.len());
    for (l, r) in opts.left_on.iter().zip(&opts.right_on) {
        let (l, r) = comparable_keys(left.column(l)?, right.column(r)?)?;
        lk.push(l);
        rk.push(r);
    }
    Ok((lk, rk))
}

/// Brings a key pair into one hash space: integers share one already, so do
/// string-like columns (hashed by value); mixed int/float goes through Float64.
fn comparable_keys(l: &Series, r: &Series) -> Result<(Series, Series)> {
    let (ld, rd) = (l.dtype(), r.dtype());
    let same_space = ld == rd
        || ld == DType::Null
        || rd == DType::Null
        || (ld.is_integer() && rd.is_integer())
        || (ld.is_float() && rd.is_float())
        || (ld.is_string_like() && rd.is_string_like());
    if same_space {
        return Ok((l.clone(), r.clone()));
    }
    if ld.is_numeric() && rd.is_numeric() {
        return Ok((l.cast(DType::Float64)?, r.cast(DType::Float64)?));
    }
    Err(SkiffError::Schema(format!(
        "cannot join '{}' ({ld}) with '{}' ({rd})",
        l.name(),
        r.name()
    )))
}

fn key_hashes(keys: &[Series]) -> Vec<u64> {
    let mut iter = keys.iter();
    let mut acc = iter.next().map(hash_column_by_value).unwrap_or_default();
    for k in iter {
        combine_hashes(&mut acc, &hash_column_by_value(k));
    }
    acc
}

fn any_null(keys: &[Series], row: usize) -> bool {
    keys.iter().any(|k| k.is_null_at(row))
}

fn keys_match(left: &[Series], l: usize, right: &[Series], r: usize) -> bool {
    left.iter()
        .zip(right)
        .all(|(lk, rk)| lk.join_eq_at(l, rk, r))
}

fn cmp_keys(left: &[Series], l: usize, right: &[Series], r: usize) -> Ordering {
    for (lk, rk) in left.iter().zip(right) {
        let ord = lk.cmp_values(l, rk, r);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

// -----------------------------
// Match strategies
// -----------------------------

fn hash_pairs(
    left_keys: &[Series],
    right_keys: &[Series],
    how: JoinType,
    config: &EngineConfig,
) -> Vec<MatchPair> {
    let left_height = left_keys.first().map_or(0, Series::len);
    let right_height = right_keys.first().map_or(0, Series::len);
    let parallel = &config.parallel;

    let right_hashes = key_hashes(right_keys);
    let index = PartitionedHashIndex::build_filtered(parallel, &right_hashes, |r| {
        !any_null(right_keys, r)
    });
    let left_hashes = key_hashes(left_keys);
    let matches = collect_matches(parallel, left_height, &left_hashes, &index, |l, cands, out| {
        if any_null(left_keys, l) {
            return;
        }
        for &r in cands {
            if keys_match(left_keys, l, right_keys, r as usize) {
                out.push((l as u32, r));
            }
        }
    });

    let keep_left = matches!(how, JoinType::Left | JoinType::Outer);
    let keep_right = matches!(how, JoinType::Right | JoinType::Outer);
    let mut pairs: Vec<MatchPair> = Vec::with_capacity(matches.len());
    if keep_left {
        let mut next = matches.iter().peekable();
        for l in 0..left_height as u32 {
            let mut hit = false;
            while let Some(&&(ml, mr)) = next.peek() {
                if ml != l {
                    break;
                }
                pairs.push((Some(ml), Some(mr)));
                hit = true;
                next.next();
            }
            if !hit {
                pairs.push((Some(l), None));
            }
        }
    } else {
        pairs.extend(matches.iter().map(|&(l, r)| (Some(l), Some(r))));
    }
    if keep_right {
        let mut matched = vec![false; right_height];
        for &(_, r) in &matches {
            matched[r as usize] = true;
        }
        pairs.extend(
            matched
                .iter()
                .enumerate()
                .filter(|(_, hit)| !**hit)
                .map(|(r, _)| (None, Some(r as u32))),
        );
    }
    pairs
}

fn sorted_non_null(keys: &[Series], presorted: bool) -> Vec<u32> {
    let n = keys.first().map_or(0, Series::len);
    let order: Vec<u32> = if presorted {
        (0..n as u32).collect()
    } else {
        let refs: Vec<&Series> = keys.iter().collect();
        argsort_multi(&refs, &vec![false; keys.len()])
    };
    order
        .into_iter()
        .filter(|&row| !any_null(keys, row as usize))
        .collect()
}

fn sort_merge_pairs(left_keys: &[Series], right_keys: &[Series], presorted: bool) -> Vec<MatchPair> {
    let lo = sorted_non_null(left_keys, presorted);
    let ro = sorted_non_null(right_keys, presorted);
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < lo.len() && j < ro.len() {
        match cmp_keys(left_keys, lo[i] as usize, right_keys, ro[j] as usize) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                let (i0, j0) = (i, j);
                while i < lo.len()
                    && cmp_keys(left_keys, lo[i0] as usize, left_keys, lo[i] as usize)
                        == Ordering::Equal
                {
                    i += 1;
                }
                while j < ro.len()
                    && cmp_keys(right_keys, ro[j0] as usize, right_keys, ro[j] as usize)
                        == Ordering::Equal
                {
                    j += 1;
                }
                for &l in &lo[i0..i] {
                    for &r in &ro[j0..j] {
                        pairs.push((Some(l), Some(r)));
                    }
                }
            }
        }
    }
    pairs
}

fn cross_pairs(left_height: usize, right_height: usize) -> Vec<MatchPair> {
    (0..left_height as u32)
        .flat_map(|l| (0..right_height as u32).map(move |r| (Some(l), Some(r))))
        .collect()
}

// -----------------------------
// Output assembly
// -----------------------------

fn assemble(
    left: &DataFrame,
    right: &DataFrame,
    opts: &JoinOptions,
    pairs: &[MatchPair],
) -> Result<DataFrame> {
    let left_idx: UInt32Array = pairs.iter().map(|(l, _)| *l).collect();
    let right_idx: UInt32Array = pairs.iter().map(|(_, r)| *r).collect();
    let layout = join_output_columns(
        &left.column_names(),
        &right.column_names(),
        &opts.left_on,
        &opts.right_on,
        opts.how,
        effective_suffix(&opts.suffix),
    );

    let mut columns = Vec::with_capacity(layout.len());
    for col in layout {
        let series = match (col.side, &col.coalesce) {
            (JoinSide::Left, None) => left.column(&col.source)?.take(&left_idx)?,
            (JoinSide::Left, Some(right_key)) => {
                let l = left.column(&col.source)?;
                let r = right.column(right_key)?;
                let both = Series::concat(&[l, r])?;
                let offset = left.height() as u32;
                let idx: UInt32Array = pairs
                    .iter()
                    .map(|(li, ri)| li.or_else(|| ri.map(|r| r + offset)))
                    .collect();
                both.take(&idx)?
            }
            (JoinSide::Right, _) => right.column(&col.source)?.take(&right_idx)?,
        };
        columns.push(series.rename(col.name));
    }
    DataFrame::new(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skiff_common::ParallelConfig;

    fn people() -> DataFrame {
        DataFrame::new(vec![
            Series::from_opt_i64("id", vec![Some(3), Some(1), Some(2), None, Some(1)]),
            Series::from_strs("name", &["c", "a", "b", "n", "a2"]),
        ])
        .expect("frame")
    }

    fn scores() -> DataFrame {
        DataFrame::new(vec![
            Series::from_opt_i64("id", vec![Some(1), Some(4), None, Some(3)]),
            Series::from_f64("name", vec![0.1, 0.4, 0.0, 0.3]),
        ])
        .expect("frame")
    }

    fn cfg() -> EngineConfig {
        EngineConfig {
            parallel: ParallelConfig::sequential(),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn inner_join_orders_by_left_then_right_and_drops_nulls() {
        let out = join(&people(), &scores(), &JoinOptions::on(JoinType::Inner, &["id"]), &cfg())
            .expect("join");
        let expected = DataFrame::new(vec![
            Series::from_i64("id", vec![3, 1, 1]),
            Series::from_strs("name", &["c", "a", "a2"]),
            Series::from_f64("name_right", vec![0.3, 0.1, 0.1]),
        ])
        .expect("frame");
        assert_eq!(out, expected);
    }

    #[test]
    fn outer_join_coalesces_shared_key() {
        let out = join(&people(), &scores(), &JoinOptions::on(JoinType::Outer, &["id"]), &cfg())
            .expect("join");
        assert_eq!(
            out.column("id").expect("id"),
            &Series::from_opt_i64(
                "id",
                vec![Some(3), Some(1), Some(2), None, Some(1), Some(4), None]
            )
        );
        assert_eq!(
            out.column("name").expect("name"),
            &Series::from_opt_strs(
                "name",
                &[Some("c"), Some("a"), Some("b"), Some("n"), Some("a2"), None, None]
            )
        );
    }

    #[test]
    fn right_join_keeps_unmatched_right_rows_in_order() {
        let out = join(&people(), &scores(), &JoinOptions::on(JoinType::Right, &["id"]), &cfg())
            .expect("join");
        assert_eq!(
            out.column("id").expect("id"),
            &Series::from_opt_i64("id", vec![Some(3), Some(1), Some(1), Some(4), None])
        );
        assert_eq!(out.height(), 5);
    }

    #[test]
    fn left_join_keeps_every_left_row() {
        let out = join(&people(), &scores(), &JoinOptions::on(JoinType::Left, &["id"]), &cfg())
            .expect("join");
        assert_eq!(
            out.column("name_right").expect("score"),
            &Series::from_opt_f64("name_right", vec![Some(0.3), Some(0.1), None, None, Some(0.1)])
        );
    }

    #[test]
    fn sort_merge_matches_hash_on_sorted_inputs() {
        let left = DataFrame::new(vec![
            Series::from_i64("k", vec![1, 1, 2, 4, 5]),
            Series::from_i64("a", vec![10, 11, 20, 40, 50]),
        ])
        .expect("frame");
        let right = DataFrame::new(vec![
            Series::from_i32("k", vec![1, 2, 2, 5]),
            Series::from_i64("b", vec![100, 200, 201, 500]),
        ])
        .expect("frame");
        let opts = JoinOptions::on(JoinType::Inner, &["k"]);
        let (lk, rk) = resolve_keys(&left, &right, &opts).expect("keys");
        assert_eq!(
            choose_strategy(&lk, &rk, JoinType::Inner, &cfg()),
            JoinStrategy::SortMerge
        );
        let merged = join(&left, &right, &opts, &cfg()).expect("merge");
        let hashed = join(
            &left,
            &right,
            &opts,
            &EngineConfig {
                auto_sort_merge: false,
                ..cfg()
            },
        )
        .expect("hash");
        assert_eq!(merged, hashed);
        assert_eq!(merged, sort_merge_join(&left, &right, &opts).expect("direct"));
    }

    #[test]
    fn cross_join_is_cartesian() {
        let a = DataFrame::new(vec![Series::from_i64("x", vec![1, 2])]).expect("a");
        let b = DataFrame::new(vec![Series::from_strs("x", &["p", "q", "r"])]).expect("b");
        let out = join(&a, &b, &JoinOptions::cross(), &cfg()).expect("cross");
        assert_eq!(out.column_names(), vec!["x", "x_right"]);
        assert_eq!(
            out.column("x").expect("x"),
            &Series::from_i64("x", vec![1, 1, 1, 2, 2, 2])
        );
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let bad = JoinOptions::new(JoinType::Inner, vec!["id".into()], vec![]);
        assert!(matches!(
            join(&people(), &scores(), &bad, &cfg()),
            Err(SkiffError::Planning(_))
        ));
        let missing = JoinOptions::on(JoinType::Inner, &["nope"]);
        assert!(matches!(
            join(&people(), &scores(), &missing, &cfg()),
            Err(SkiffError::Schema(_))
        ));
        let strings = JoinOptions::new(JoinType::Inner, vec!["name".into()], vec!["id".into()]);
        assert!(matches!(
            join(&people(), &scores(), &strings, &cfg()),
            Err(SkiffError::Schema(_))
        ));
    }

    #[test]
    fn parallel_hash_join_equals_sequential() {
        let n = 30_000;
        let left = DataFrame::new(vec![Series::from_i64(
            "k",
            (0..n).map(|i| (i * 7919) % 1000).collect(),
        )])
        .expect("left");
        let right = DataFrame::new(vec![
            Series::from_i64("k", (0..1000).rev().collect()),
            Series::from_i64("v", (0..1000).collect()),
        ])
        .expect("right");
        let opts = JoinOptions::on(JoinType::Inner, &["k"]);
        let par = EngineConfig {
            parallel: ParallelConfig::eager(1024, 4),
            ..EngineConfig::default()
        };
        assert_eq!(
            join(&left, &right, &opts, &par).expect("par"),
            join(&left, &right, &opts, &cfg()).expect("seq")
        );
    }
}
