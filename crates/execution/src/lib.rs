#![deny(missing_docs)]

//! Query execution for skiff.
//!
//! Architecture role:
//! - morsel scheduler shared by every parallel operator
//! - partitioned hash index and join match collection
//! - hash group-by with per-group aggregation kernels
//! - recursive executor over optimized logical plans
//!
//! Key modules:
//! - [`scheduler`]
//! - [`hash_index`]
//! - [`collector`]
//! - [`join`]
//! - [`groupby`]
//! - [`exec`]
//!
//! Every parallel primitive degrades to an inline loop when
//! [`skiff_common::ParallelConfig`] says the work is too small or
//! parallelism is disabled; results are identical either way.

pub mod collector;
pub mod context;
pub mod exec;
pub mod expressions;
pub mod groupby;
pub mod hash_index;
pub mod join;
pub mod scheduler;

// Re-export only what you want at the crate root (no globs).
pub use collector::{MatchPair, collect_matches};
pub use context::{ExecContext, PlanCache};
pub use exec::execute;
pub use expressions::{evaluate, evaluate_mask};
pub use groupby::{AggSpec, GroupBy, GroupIndex, aggregate};
pub use hash_index::PartitionedHashIndex;
pub use join::{JoinOptions, JoinStrategy, choose_strategy, join, sort_merge_join};
pub use scheduler::{
    MorselIterator, parallel_build_columns, parallel_for, parallel_for_with_result, parallel_map,
    parallel_reduce_f64, parallel_reduce_i64, parallel_tasks, try_parallel_for,
};
