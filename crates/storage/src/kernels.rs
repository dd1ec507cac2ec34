//! Vectorized kernel boundary.
//!
//! Orchestration layers (scheduler, group-by, joins, expression evaluation)
//! reach per-dtype numeric work only through these functions: reductions,
//! elementwise arithmetic/comparison, hashing, group-id assignment, per-group
//! accumulation, argsort and gather. Elementwise work is delegated to arrow
//! compute kernels.

use std::cmp::Ordering;

use ahash::{AHashMap, RandomState};
use arrow::array::{Array, ArrayRef, BooleanArray, Scalar as ArrowScalar, UInt32Array};
use arrow::compute::kernels::{cmp, numeric};
use skiff_common::{Result, SkiffError};

use crate::dtype::DType;
use crate::scalar::Scalar;
use crate::series::{ColumnData, Series};

/// Hash assigned to null (and NaN) rows so nulls land in one bucket.
pub const NULL_HASH: u64 = 0x517c_c1b7_2722_0a95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

// -----------------------------
// Reductions
// -----------------------------

/// Sum of non-null values: integers and booleans sum to `Int64`, floats to `Float64`.
pub fn sum(s: &Series) -> Result<Scalar> {
    match s.data() {
        ColumnData::Int64(_) | ColumnData::Int32(_) | ColumnData::Bool(_) => Ok(Scalar::Int64(
            (0..s.len())
                .filter_map(|i| s.i64_at(i))
                .fold(0i64, i64::wrapping_add),
        )),
        ColumnData::Float64(_) | ColumnData::Float32(_) => Ok(Scalar::Float64(
            (0..s.len()).filter_map(|i| s.f64_at(i)).sum(),
        )),
        ColumnData::Null(_) => Ok(Scalar::Null),
        _ => Err(not_numeric("sum", s)),
    }
}

/// Minimum non-null value, `Null` when every row is null.
pub fn min(s: &Series) -> Result<Scalar> {
    extreme(s, Ordering::Less, "min")
}

/// Maximum non-null value, `Null` when every row is null.
pub fn max(s: &Series) -> Result<Scalar> {
    extreme(s, Ordering::Greater, "max")
}

fn extreme(s: &Series, keep: Ordering, what: &str) -> Result<Scalar> {
    if s.dtype() == DType::Bool {
        return Err(not_numeric(what, s));
    }
    let mut best: Option<usize> = None;
    for i in 0..s.len() {
        if s.is_null_at(i) {
            continue;
        }
        best = match best {
            Some(b) if s.cmp_values(i, s, b) != keep => Some(b),
            _ => Some(i),
        };
    }
    Ok(best.map_or(Scalar::Null, |i| s.get(i)))
}

/// Mean of non-null numeric values; `None` when there are none.
pub fn mean(s: &Series) -> Result<Option<f64>> {
    let values = s.to_f64_vec()?;
    let (total, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
    Ok((n > 0).then(|| total / n as f64))
}

fn not_numeric(op: &str, s: &Series) -> SkiffError {
    SkiffError::Schema(format!(
        "{op} not supported for column '{}' of type {}",
        s.name(),
        s.dtype()
    ))
}

// -----------------------------
// Elementwise
// -----------------------------

/// Vector arithmetic between equal-length numeric columns.
///
/// `Div` always produces `Float64`; other ops use the numeric supertype.
pub fn arith(lhs: &Series, op: ArithOp, rhs: &Series) -> Result<Series> {
    check_lengths(lhs, rhs)?;
    let target = arith_target(lhs.dtype(), op, rhs.dtype())?;
    if lhs.dtype() == DType::Null || rhs.dtype() == DType::Null {
        return Series::nulls_of(lhs.name(), target, lhs.len());
    }
    let l = lhs.cast(target)?.to_array();
    let r = rhs.cast(target)?.to_array();
    let out = apply_arith(&l, op, &r)?;
    Series::from_array(lhs.name(), out)
}

/// Column-vs-literal arithmetic.
pub fn arith_scalar(lhs: &Series, op: ArithOp, rhs: &Scalar) -> Result<Series> {
    let target = arith_target(lhs.dtype(), op, rhs.dtype())?;
    if lhs.dtype() == DType::Null || rhs.is_null() {
        return Series::nulls_of(lhs.name(), target, lhs.len());
    }
    let l = lhs.cast(target)?.to_array();
    let r = ArrowScalar::new(Series::full("", rhs, 1).cast(target)?.to_array());
    let out = apply_arith(&l, op, &r)?;
    Series::from_array(lhs.name(), out)
}

fn arith_target(l: DType, op: ArithOp, r: DType) -> Result<DType> {
    let (l, r) = (null_as(l, r), null_as(r, l));
    let Some(target) = l.arithmetic_supertype(r) else {
        return Err(SkiffError::Schema(format!(
            "arithmetic requires numeric operands, got {l} and {r}"
        )));
    };
    Ok(if op == ArithOp::Div {
        DType::Float64
    } else {
        target
    })
}

fn null_as(t: DType, other: DType) -> DType {
    match (t, other) {
        (DType::Null, DType::Null) => DType::Float64,
        (DType::Null, o) => o,
        (t, _) => t,
    }
}

fn apply_arith(
    l: &ArrayRef,
    op: ArithOp,
    r: &dyn arrow::array::Datum,
) -> Result<ArrayRef> {
    let out = match op {
        ArithOp::Add => numeric::add_wrapping(l, r)?,
        ArithOp::Sub => numeric::sub_wrapping(l, r)?,
        ArithOp::Mul => numeric::mul_wrapping(l, r)?,
        ArithOp::Div => numeric::div(l, r)?,
    };
    Ok(out)
}

/// Vector comparison; result is null where either side is null.
pub fn compare(lhs: &Series, op: CmpOp, rhs: &Series) -> Result<BooleanArray> {
    check_lengths(lhs, rhs)?;
    let Some(target) = compare_target(lhs.dtype(), rhs.dtype()) else {
        return Err(incomparable(lhs.dtype(), rhs.dtype()));
    };
    if target == DType::Null {
        return Ok(BooleanArray::from(vec![None::<bool>; lhs.len()]));
    }
    let l = lhs.cast(target)?.nan_as_null().to_array();
    let r = rhs.cast(target)?.nan_as_null().to_array();
    apply_cmp(&l, op, &r)
}

/// Column-vs-literal comparison.
pub fn compare_scalar(lhs: &Series, op: CmpOp, rhs: &Scalar) -> Result<BooleanArray> {
    let Some(target) = compare_target(lhs.dtype(), rhs.dtype()) else {
        return Err(incomparable(lhs.dtype(), rhs.dtype()));
    };
    if target == DType::Null || rhs.is_null() {
        return Ok(BooleanArray::from(vec![None::<bool>; lhs.len()]));
    }
    let l = lhs.cast(target)?.nan_as_null().to_array();
    let r = ArrowScalar::new(Series::full("", rhs, 1).cast(target)?.to_array());
    apply_cmp(&l, op, &r)
}

fn compare_target(l: DType, r: DType) -> Option<DType> {
    match (l, r) {
        (DType::Null, _) | (_, DType::Null) => Some(DType::Null),
        (a, b) if a == b && a != DType::Categorical => Some(a),
        (a, b) if a.is_numeric() && b.is_numeric() => Some(DType::Float64),
        (a, b) if a.is_string_like() && b.is_string_like() => Some(DType::String),
        _ => None,
    }
}

fn incomparable(l: DType, r: DType) -> SkiffError {
    SkiffError::Schema(format!("cannot compare {l} with {r}"))
}

fn apply_cmp(l: &ArrayRef, op: CmpOp, r: &dyn arrow::array::Datum) -> Result<BooleanArray> {
    let out = match op {
        CmpOp::Eq => cmp::eq(l, r)?,
        CmpOp::NotEq => cmp::neq(l, r)?,
        CmpOp::Lt => cmp::lt(l, r)?,
        CmpOp::LtEq => cmp::lt_eq(l, r)?,
        CmpOp::Gt => cmp::gt(l, r)?,
        CmpOp::GtEq => cmp::gt_eq(l, r)?,
    };
    Ok(out)
}

fn check_lengths(lhs: &Series, rhs: &Series) -> Result<()> {
    if lhs.len() != rhs.len() {
        return Err(SkiffError::Schema(format!(
            "length mismatch between '{}' ({}) and '{}' ({})",
            lhs.name(),
            lhs.len(),
            rhs.name(),
            rhs.len()
        )));
    }
    Ok(())
}

// -----------------------------
// Hashing
// -----------------------------

/// Fixed seeds keep row hashes identical across runs and threads.
fn key_state() -> RandomState {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
}

fn hash_f64(state: &RandomState, v: f64) -> u64 {
    // -0.0 and 0.0 compare equal so they must hash equal.
    let v = if v == 0.0 { 0.0 } else { v };
    state.hash_one(v.to_bits())
}

/// Per-row hash of one key column.
///
/// Integers of either width share one hash space; categorical columns hash
/// their dictionary codes; booleans hash as 0/1. Null and NaN rows hash to
/// [`NULL_HASH`].
pub fn hash_column(s: &Series) -> Vec<u64> {
    let n = s.len();
    let state = key_state();
    match s.data() {
        ColumnData::Int64(a) => (0..n)
            .map(|i| if a.is_null(i) { NULL_HASH } else { state.hash_one(a.value(i)) })
            .collect(),
        ColumnData::Int32(a) => (0..n)
            .map(|i| if a.is_null(i) { NULL_HASH } else { state.hash_one(i64::from(a.value(i))) })
            .collect(),
        ColumnData::Float64(_) | ColumnData::Float32(_) => (0..n)
            .map(|i| s.f64_at(i).map_or(NULL_HASH, |v| hash_f64(&state, v)))
            .collect(),
        ColumnData::Bool(a) => (0..n)
            .map(|i| if a.is_null(i) { NULL_HASH } else { state.hash_one(i64::from(a.value(i))) })
            .collect(),
        ColumnData::String(a) => (0..n)
            .map(|i| if a.is_null(i) { NULL_HASH } else { state.hash_one(a.value(i)) })
            .collect(),
        ColumnData::Categorical(d) => {
            let keys = d.keys();
            (0..n)
                .map(|i| if keys.is_null(i) { NULL_HASH } else { state.hash_one(keys.value(i)) })
                .collect()
        }
        ColumnData::Null(_) => vec![NULL_HASH; n],
    }
}

/// Like [`hash_column`] but categorical rows hash their string value, so two
/// columns with different dictionaries hash alike (join keys).
pub fn hash_column_by_value(s: &Series) -> Vec<u64> {
    match s.data() {
        ColumnData::Categorical(_) => {
            let state = key_state();
            (0..s.len())
                .map(|i| s.str_at(i).map_or(NULL_HASH, |v| state.hash_one(v)))
                .collect()
        }
        _ => hash_column(s),
    }
}

/// Order-sensitive pairwise combine: `acc[i] = combine(acc[i], other[i])`.
pub fn combine_hashes(acc: &mut [u64], other: &[u64]) {
    for (h, o) in acc.iter_mut().zip(other) {
        *h ^= o
            .wrapping_add(0x9e37_79b9_7f4a_7c15)
            .wrapping_add(*h << 6)
            .wrapping_add(*h >> 2);
    }
}

/// Buckets keyed by a row hash.
pub type HashBuckets<V> = AHashMap<u64, V>;

// -----------------------------
// Group assignment
// -----------------------------

/// Row-to-group mapping returned by [`compute_group_ids`]; owns its buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIds {
    ids: Vec<u32>,
    num_groups: usize,
}

impl GroupIds {
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn into_parts(self) -> (Vec<u32>, usize) {
        (self.ids, self.num_groups)
    }
}

/// Assigns dense group ids in first-seen order.
///
/// `key_eq(a, b)` must report whether rows `a` and `b` carry equal keys; it is
/// consulted on every hash match so colliding distinct keys get distinct groups.
pub fn compute_group_ids(hashes: &[u64], key_eq: impl Fn(usize, usize) -> bool) -> GroupIds {
    const END: u32 = u32::MAX;
    let mut heads: HashBuckets<u32> = HashBuckets::default();
    let mut group_first_row: Vec<u32> = Vec::new();
    let mut next_in_bucket: Vec<u32> = Vec::new();
    let mut ids = Vec::with_capacity(hashes.len());

    for (row, h) in hashes.iter().enumerate() {
        let new_group = group_first_row.len() as u32;
        let gid = match heads.get(h) {
            None => {
                heads.insert(*h, new_group);
                new_group
            }
            Some(&head) => {
                let mut g = head;
                loop {
                    if key_eq(group_first_row[g as usize] as usize, row) {
                        break g;
                    }
                    let next = next_in_bucket[g as usize];
                    if next == END {
                        next_in_bucket[g as usize] = new_group;
                        break new_group;
                    }
                    g = next;
                }
            }
        };
        if gid == new_group {
            group_first_row.push(row as u32);
            next_in_bucket.push(END);
        }
        ids.push(gid);
    }
    GroupIds {
        ids,
        num_groups: group_first_row.len(),
    }
}

// -----------------------------
// Per-group accumulation
// -----------------------------
// Callers pre-initialize `out` with the identity (0, +inf, -inf, i64::MAX, ...).

pub fn aggregate_sum_by_group_f64(values: &[f64], group_ids: &[u32], out: &mut [f64]) {
    for (v, g) in values.iter().zip(group_ids) {
        out[*g as usize] += v;
    }
}

pub fn aggregate_min_by_group_f64(values: &[f64], group_ids: &[u32], out: &mut [f64]) {
    for (v, g) in values.iter().zip(group_ids) {
        let slot = &mut out[*g as usize];
        if *v < *slot {
            *slot = *v;
        }
    }
}

pub fn aggregate_max_by_group_f64(values: &[f64], group_ids: &[u32], out: &mut [f64]) {
    for (v, g) in values.iter().zip(group_ids) {
        let slot = &mut out[*g as usize];
        if *v > *slot {
            *slot = *v;
        }
    }
}

pub fn aggregate_sum_by_group_i64(values: &[i64], group_ids: &[u32], out: &mut [i64]) {
    for (v, g) in values.iter().zip(group_ids) {
        let slot = &mut out[*g as usize];
        *slot = slot.wrapping_add(*v);
    }
}

pub fn aggregate_min_by_group_i64(values: &[i64], group_ids: &[u32], out: &mut [i64]) {
    for (v, g) in values.iter().zip(group_ids) {
        let slot = &mut out[*g as usize];
        *slot = (*slot).min(*v);
    }
}

pub fn aggregate_max_by_group_i64(values: &[i64], group_ids: &[u32], out: &mut [i64]) {
    for (v, g) in values.iter().zip(group_ids) {
        let slot = &mut out[*g as usize];
        *slot = (*slot).max(*v);
    }
}

// -----------------------------
// Sort / gather
// -----------------------------

/// Stable argsort of one column; nulls last in both directions.
pub fn argsort(s: &Series, descending: bool) -> Vec<u32> {
    argsort_multi(&[s], &[descending])
}

/// Stable lexicographic argsort over several key columns.
pub fn argsort_multi(keys: &[&Series], descending: &[bool]) -> Vec<u32> {
    let n = keys.first().map_or(0, |s| s.len());
    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (a as usize, b as usize);
        for (s, desc) in keys.iter().zip(descending) {
            let ord = match (s.is_null_at(a), s.is_null_at(b)) {
                (false, false) if *desc => s.cmp_values(b, s, a),
                (false, false) => s.cmp_values(a, s, b),
                _ => s.cmp_at(a, s, b),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    order
}

/// Gathers rows by index into a new column.
pub fn gather(s: &Series, indices: &[u32]) -> Result<Series> {
    s.take(&UInt32Array::from(indices.to_vec()))
}
