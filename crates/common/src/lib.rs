//! Shared configuration, error types, IDs, and observability primitives for skiff crates.
//!
//! Architecture role:
//! - defines engine/parallel configuration passed explicitly across layers
//! - provides common [`SkiffError`] / [`Result`] contracts
//! - hosts the prometheus metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::{EngineConfig, OperationType, ParallelConfig};
pub use error::{Result, SkiffError};
pub use ids::QueryId;
pub use metrics::{global_metrics, MetricsRegistry};
