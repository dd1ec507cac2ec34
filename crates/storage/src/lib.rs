//! Columnar data model and kernel boundary for skiff.
//!
//! Architecture role:
//! - closed [`DType`] set and the arrow-backed [`Series`] / [`DataFrame`] model
//! - [`kernels`]: the vectorized numeric/hash/sort contract the engine calls into
//! - [`provider`]: the format I/O boundary (`FrameSource` / `FrameSink`)
//!
//! Key modules:
//! - [`dtype`]
//! - [`scalar`]
//! - [`series`]
//! - [`frame`]
//! - [`kernels`]
//! - [`provider`]

pub mod dtype;
pub mod frame;
pub mod kernels;
pub mod provider;
pub mod scalar;
pub mod series;

pub use dtype::DType;
pub use frame::{DataFrame, MAX_ROWS};
pub use provider::{FrameSink, FrameSource, MemorySource, SourceRef, Stats};
pub use scalar::Scalar;
pub use series::{ColumnData, Series};
