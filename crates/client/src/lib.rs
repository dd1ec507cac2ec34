//! Embedded lazy DataFrame API for skiff.
//!
//! Architecture role:
//! - [`Engine`] owns a session (config, metrics registry, optimizer, plan cache)
//! - [`LazyFrame`] / [`LazyGroupBy`] build logical plans without running them
//! - `collect` optimizes the plan (unless disabled) and runs the executor
//!
//! Key modules:
//! - [`engine`]
//! - [`lazy`]
//! - [`expr`]

mod session;

pub mod engine;
pub mod expr;
pub mod lazy;

pub use engine::Engine;
pub use expr::{coalesce, col, lit, when, Then, When};
pub use lazy::{LazyFrame, LazyGroupBy};

pub use skiff_common::{EngineConfig, ParallelConfig, Result, SkiffError};
pub use skiff_execution::JoinOptions;
pub use skiff_planner::{AggOp, Expr, JoinType, LogicalPlan, OptimizerRule};
pub use skiff_storage::{DType, DataFrame, FrameSink, FrameSource, Scalar, Series, SourceRef};
