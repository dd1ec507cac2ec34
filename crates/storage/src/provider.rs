use std::fmt;
use std::sync::Arc;

use skiff_common::Result;
use tracing::trace;

use crate::dtype::DType;
use crate::frame::DataFrame;

/// Lightweight size hints used by explain output and join-side decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Row count, if known without reading.
    pub estimated_rows: Option<usize>,
    /// Column count, if known without reading.
    pub estimated_columns: Option<usize>,
}

/// Producer of a materialized [`DataFrame`] at the edge of a query.
///
/// Implementations are format-specific (CSV, JSON, Parquet, interchange
/// readers); the engine only ever consumes the frame they return.
pub trait FrameSource: Send + Sync + fmt::Debug {
    /// Short label for explain output, for example `memory` or `csv`.
    fn name(&self) -> &str;

    /// Column names and types, when known without reading.
    fn schema_hint(&self) -> Option<Vec<(String, DType)>> {
        None
    }

    fn stats(&self) -> Stats {
        Stats::default()
    }

    /// Reads the source.
    ///
    /// `projection` is a best-effort pushdown hint: providers may return extra
    /// columns, the executor re-selects afterwards.
    ///
    /// # Errors
    /// Forwards reader failures unchanged.
    fn read(&self, projection: Option<&[String]>) -> Result<DataFrame>;
}

/// Consumer of a materialized [`DataFrame`] (format writers).
pub trait FrameSink: Send + Sync {
    /// # Errors
    /// Forwards writer failures unchanged.
    fn write(&self, df: &DataFrame) -> Result<()>;
}

/// Shared handle to a source.
pub type SourceRef = Arc<dyn FrameSource>;

/// In-memory source over an existing frame; projection cannot prune anything
/// since the frame already exists.
#[derive(Debug, Clone)]
pub struct MemorySource {
    df: Arc<DataFrame>,
}

impl MemorySource {
    pub fn new(df: DataFrame) -> Self {
        Self { df: Arc::new(df) }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn schema_hint(&self) -> Option<Vec<(String, DType)>> {
        Some(self.df.schema())
    }

    fn stats(&self) -> Stats {
        Stats {
            estimated_rows: Some(self.df.height()),
            estimated_columns: Some(self.df.width()),
        }
    }

    fn read(&self, projection: Option<&[String]>) -> Result<DataFrame> {
        trace!(
            rows = self.df.height(),
            projected = projection.map_or(0, <[String]>::len),
            "memory source read"
        );
        Ok(self.df.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Series;

    #[test]
    fn memory_source_reports_shape_and_ignores_projection() {
        let df = DataFrame::new(vec![
            Series::from_i64("a", vec![1, 2]),
            Series::from_i64("b", vec![3, 4]),
        ])
        .expect("frame");
        let src = MemorySource::new(df.clone());
        assert_eq!(src.stats().estimated_rows, Some(2));
        let read = src.read(Some(&["a".to_string()])).expect("read");
        assert_eq!(read, df);
    }
}
