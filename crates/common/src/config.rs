use serde::{Deserialize, Serialize};

use crate::error::{Result, SkiffError};

/// Fixed cost of handing one morsel loop to a worker, in nanoseconds.
pub const SPAWN_OVERHEAD_NS: u64 = 5_000;

/// Parallel work must beat the spawn overhead by this factor to be worth it.
pub const PARALLEL_SAFETY_FACTOR: u64 = 10;

/// Operator classes known to the parallel cost model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationType {
    Filter,
    Sort,
    JoinBuild,
    JoinProbe,
    GroupByHash,
    GroupByAgg,
    Gather,
    Other,
}

impl OperationType {
    /// Rough per-row cost estimate used by [`ParallelConfig::should_parallelize_op`].
    pub fn estimated_ns_per_row(self) -> u64 {
        match self {
            OperationType::Filter => 2,
            OperationType::Sort => 50,
            OperationType::JoinBuild => 20,
            OperationType::JoinProbe => 30,
            OperationType::GroupByHash => 15,
            OperationType::GroupByAgg => 5,
            OperationType::Gather => 3,
            OperationType::Other => 10,
        }
    }
}

/// Scheduler tunables, threaded explicitly into every parallel entry point.
///
/// `max_workers == 0` means "use available parallelism".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub min_rows_for_parallel: usize,
    pub morsel_size: usize,
    pub max_workers: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_rows_for_parallel: 8192,
            morsel_size: 4096,
            max_workers: 0,
        }
    }
}

impl ParallelConfig {
    /// Config that always takes the inline path.
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Config that parallelizes any non-empty input, handy for exercising the
    /// parallel path on small fixtures.
    pub fn eager(morsel_size: usize, max_workers: usize) -> Self {
        Self {
            enabled: true,
            min_rows_for_parallel: 1,
            morsel_size,
            max_workers,
        }
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    pub fn with_morsel_size(mut self, n: usize) -> Self {
        self.morsel_size = n;
        self
    }

    pub fn with_min_rows_for_parallel(mut self, n: usize) -> Self {
        self.min_rows_for_parallel = n;
        self
    }

    /// Resolved worker count, never zero.
    pub fn num_workers(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Generic row-count threshold check.
    pub fn should_parallelize(&self, rows: usize) -> bool {
        self.enabled && rows >= self.min_rows_for_parallel && self.num_workers() > 1
    }

    /// Cost-model check: estimated work must exceed worker spawn overhead by
    /// [`PARALLEL_SAFETY_FACTOR`].
    pub fn should_parallelize_op(&self, op: OperationType, rows: usize) -> bool {
        if !self.enabled {
            return false;
        }
        let workers = self.num_workers() as u64;
        if workers <= 1 {
            return false;
        }
        let work = (rows as u64).saturating_mul(op.estimated_ns_per_row());
        work > workers * SPAWN_OVERHEAD_NS * PARALLEL_SAFETY_FACTOR
    }

    pub fn validate(&self) -> Result<()> {
        if self.morsel_size == 0 {
            return Err(SkiffError::InvalidConfig(
                "parallel.morsel_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine-wide settings owned by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub parallel: ParallelConfig,
    /// Suffix appended to right-side join columns that collide with left names.
    pub join_suffix: String,
    /// Run the optimizer before executing a plan.
    pub optimize: bool,
    /// Pick sort-merge for inner single-key joins whose inputs are already sorted.
    pub auto_sort_merge: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: ParallelConfig::default(),
            join_suffix: "_right".to_string(),
            optimize: true,
            auto_sort_merge: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.parallel.validate()?;
        if self.join_suffix.is_empty() {
            return Err(SkiffError::InvalidConfig(
                "join_suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let cfg = ParallelConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.min_rows_for_parallel, 8192);
        assert_eq!(cfg.morsel_size, 4096);
        assert!(cfg.num_workers() >= 1);
    }

    #[test]
    fn sequential_config_never_parallelizes() {
        let cfg = ParallelConfig::sequential();
        assert!(!cfg.should_parallelize(10_000_000));
        assert!(!cfg.should_parallelize_op(OperationType::Sort, 10_000_000));
    }

    #[test]
    fn cost_model_scales_with_operation_weight() {
        let cfg = ParallelConfig::default().with_max_workers(4);
        // 4 workers * 5000ns * 10 = 200_000ns budget.
        assert!(!cfg.should_parallelize_op(OperationType::Filter, 50_000));
        assert!(cfg.should_parallelize_op(OperationType::Filter, 200_000));
        assert!(cfg.should_parallelize_op(OperationType::Sort, 5_000));
        assert!(!cfg.should_parallelize_op(OperationType::Sort, 3_000));
    }

    #[test]
    fn partial_json_config_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"parallel":{"morsel_size":128}}"#).expect("parse config");
        assert_eq!(cfg.parallel.morsel_size, 128);
        assert_eq!(cfg.parallel.min_rows_for_parallel, 8192);
        assert_eq!(cfg.join_suffix, "_right");
        assert!(cfg.optimize);
    }

    #[test]
    fn row_threshold_gates_generic_parallelism() {
        let cfg = ParallelConfig::default()
            .with_max_workers(2)
            .with_min_rows_for_parallel(100);
        assert!(!cfg.should_parallelize(99));
        assert!(cfg.should_parallelize(100));
        assert!(!cfg.with_max_workers(1).should_parallelize(1_000));
    }

    #[test]
    fn zero_morsel_size_is_rejected() {
        let cfg = ParallelConfig::default().with_morsel_size(0);
        assert!(cfg.validate().is_err());
    }
}
