//! Morsel-driven work distribution.
//!
//! Every parallel primitive splits `[0, total_rows)` into fixed-size morsels
//! handed out by a single atomic cursor. Workers loop claiming morsels until
//! the cursor passes the end, so a slow worker simply claims fewer of them.
//!
//! Below the configured threshold the body runs once inline over the full
//! range. Callers must not depend on accumulation order: reductions either
//! combine associatively or fold the per-morsel partials afterwards.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::prelude::*;
use rayon::ThreadPool;
use skiff_common::{global_metrics, ParallelConfig, Result, SkiffError};
use skiff_storage::Series;
use tracing::debug;

static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

fn build_pool() -> Option<ThreadPool> {
    let requested = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("skiff-worker-{i}"))
            .build()
    };
    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(_) if requested > 1 => try_build(1).ok(),
        Err(_) => None,
    }
}

/// Process-wide worker pool shared by all parallel calls.
///
/// `None` when no pool could be created; primitives then run inline.
fn pool() -> Option<&'static ThreadPool> {
    POOL.get_or_init(build_pool).as_ref()
}

/// Hands out half-open row ranges from a shared cursor.
///
/// Claiming is a compare-and-swap loop, so no row is handed out twice and
/// the ranges returned across all callers tile `[0, total_rows)` exactly.
#[derive(Debug)]
pub struct MorselIterator {
    next_start: AtomicUsize,
    total_rows: usize,
    morsel_size: usize,
}

impl MorselIterator {
    /// A zero `morsel_size` is treated as 1.
    pub fn new(total_rows: usize, morsel_size: usize) -> Self {
        Self {
            next_start: AtomicUsize::new(0),
            total_rows,
            morsel_size: morsel_size.max(1),
        }
    }

    /// Claims the next morsel; `None` once every row has been handed out.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> Option<Range<usize>> {
        let mut cursor = self.next_start.load(Ordering::Relaxed);
        loop {
            if cursor >= self.total_rows {
                return None;
            }
            let end = cursor
                .saturating_add(self.morsel_size)
                .min(self.total_rows);
            match self.next_start.compare_exchange_weak(
                cursor,
                end,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(cursor..end),
                Err(actual) => cursor = actual,
            }
        }
    }

    /// Rewinds the cursor so the range can be handed out again.
    pub fn reset(&self) {
        self.next_start.store(0, Ordering::Release);
    }

    /// Rows covered by this iterator.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Number of morsels a full pass hands out.
    pub fn num_morsels(&self) -> usize {
        self.total_rows.div_ceil(self.morsel_size)
    }
}

/// Runs `workers` claim loops over one cursor and returns every morsel's
/// result tagged with its start row, in row order.
fn fan_out<T, F>(
    primitive: &'static str,
    workers: usize,
    total_rows: usize,
    morsel_size: usize,
    body: F,
) -> Vec<T>
where
    T: Send,
    F: Fn(Range<usize>) -> T + Sync,
{
    let morsels = MorselIterator::new(total_rows, morsel_size);
    let claim_loop = |_worker: usize| {
        let mut local = Vec::new();
        while let Some(r) = morsels.next() {
            let start = r.start;
            local.push((start, body(r)));
        }
        local
    };
    let workers = workers.clamp(1, morsels.num_morsels().max(1));
    let per_worker: Vec<Vec<(usize, T)>> = match pool() {
        Some(p) if workers > 1 => {
            p.install(|| (0..workers).into_par_iter().map(claim_loop).collect())
        }
        _ => vec![claim_loop(0)],
    };
    let mut parts: Vec<(usize, T)> = per_worker.into_iter().flatten().collect();
    parts.sort_unstable_by_key(|(start, _)| *start);
    global_metrics().record_morsels(primitive, parts.len() as u64);
    parts.into_iter().map(|(_, t)| t).collect()
}

fn sequential_fallback(config: &ParallelConfig, rows: usize) -> bool {
    if config.should_parallelize(rows) {
        return false;
    }
    debug!(
        rows,
        threshold = config.min_rows_for_parallel,
        "scheduler sequential fallback"
    );
    true
}

/// Runs `f(start, end)` once per morsel of `[0, total_rows)`.
pub fn parallel_for<F>(config: &ParallelConfig, total_rows: usize, f: F)
where
    F: Fn(usize, usize) + Sync,
{
    if sequential_fallback(config, total_rows) {
        f(0, total_rows);
        return;
    }
    fan_out(
        "parallel_for",
        config.num_workers(),
        total_rows,
        config.morsel_size,
        |r| f(r.start, r.end),
    );
}

/// Like [`parallel_for`] but the body may fail.
///
/// The first error is kept; morsels already claimed by sibling workers still
/// finish before it is returned.
pub fn try_parallel_for<F>(config: &ParallelConfig, total_rows: usize, f: F) -> Result<()>
where
    F: Fn(usize, usize) -> Result<()> + Sync,
{
    if sequential_fallback(config, total_rows) {
        return f(0, total_rows);
    }
    let first_error: OnceLock<SkiffError> = OnceLock::new();
    fan_out(
        "try_parallel_for",
        config.num_workers(),
        total_rows,
        config.morsel_size,
        |r| {
            if first_error.get().is_some() {
                return;
            }
            if let Err(e) = f(r.start, r.end) {
                let _ = first_error.set(e);
            }
        },
    );
    match first_error.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Runs `f(start, end)` per morsel and returns the partials in row order.
///
/// The inline path yields exactly one partial covering the full range.
pub fn parallel_for_with_result<T, F>(config: &ParallelConfig, total_rows: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize, usize) -> T + Sync,
{
    if sequential_fallback(config, total_rows) {
        return vec![f(0, total_rows)];
    }
    fan_out(
        "parallel_for_with_result",
        config.num_workers(),
        total_rows,
        config.morsel_size,
        |r| f(r.start, r.end),
    )
}

/// Folds per-morsel `f64` partials with `combine`, starting from `identity`.
pub fn parallel_reduce_f64<F, C>(
    config: &ParallelConfig,
    total_rows: usize,
    identity: f64,
    f: F,
    combine: C,
) -> f64
where
    F: Fn(usize, usize) -> f64 + Sync,
    C: Fn(f64, f64) -> f64,
{
    parallel_for_with_result(config, total_rows, f)
        .into_iter()
        .fold(identity, combine)
}

/// Folds per-morsel `i64` partials with `combine`, starting from `identity`.
pub fn parallel_reduce_i64<F, C>(
    config: &ParallelConfig,
    total_rows: usize,
    identity: i64,
    f: F,
    combine: C,
) -> i64
where
    F: Fn(usize, usize) -> i64 + Sync,
    C: Fn(i64, i64) -> i64,
{
    parallel_for_with_result(config, total_rows, f)
        .into_iter()
        .fold(identity, combine)
}

/// Maps every index in `[0, n)` through `f`, preserving index order.
pub fn parallel_map<T, F>(config: &ParallelConfig, n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    parallel_for_with_result(config, n, |start, end| (start..end).map(&f).collect::<Vec<_>>())
        .into_iter()
        .flatten()
        .collect()
}

/// Runs `f(task)` for every task index in `[0, n_tasks)`, one task per claim,
/// and returns the results in task order.
///
/// Ignores the row threshold: callers decide whether the work is worth
/// fanning out. Uses `min(num_workers, n_tasks)` workers.
pub fn parallel_tasks<T, F>(config: &ParallelConfig, n_tasks: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let workers = config.num_workers().min(n_tasks);
    if !config.enabled || workers < 2 {
        return (0..n_tasks).map(f).collect();
    }
    fan_out("parallel_tasks", workers, n_tasks, 1, |r| f(r.start))
}

/// Builds one series per column index, one column per task.
///
/// Fans out over `min(num_workers, n_cols)` workers when `rows` passes the
/// parallel threshold; the first failing column (in index order) is returned.
pub fn parallel_build_columns<F>(
    config: &ParallelConfig,
    n_cols: usize,
    rows: usize,
    f: F,
) -> Result<Vec<Series>>
where
    F: Fn(usize) -> Result<Series> + Sync,
{
    if n_cols < 2 || sequential_fallback(config, rows) {
        return (0..n_cols).map(f).collect();
    }
    parallel_tasks(config, n_cols, f).into_iter().collect()
}
