use std::sync::Arc;

use skiff_common::{EngineConfig, MetricsRegistry, Result, SkiffError};
use skiff_planner::{LogicalPlan, OptimizerRule};
use skiff_storage::{DataFrame, MemorySource, SourceRef};

use crate::session::{Session, SharedSession};
use crate::LazyFrame;

/// Entry point: owns one session and hands out lazy frames bound to it.
#[derive(Debug, Clone)]
pub struct Engine {
    session: SharedSession,
}

impl Engine {
    /// # Errors
    /// Rejects configs that fail [`EngineConfig::validate`].
    pub fn new(config: EngineConfig) -> Result<Self> {
        let session = Arc::new(Session::new(config)?);
        Ok(Self { session })
    }

    /// Loads a (possibly partial) JSON engine config; absent fields keep their defaults.
    pub fn from_json_config(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| SkiffError::InvalidConfig(format!("engine config: {e}")))?;
        Self::new(config)
    }

    /// Lazy frame over an in-memory frame.
    pub fn lazy(&self, df: DataFrame) -> LazyFrame {
        self.scan(Arc::new(MemorySource::new(df)))
    }

    /// Lazy frame over any frame source.
    pub fn scan(&self, source: SourceRef) -> LazyFrame {
        LazyFrame::new(self.session.clone(), LogicalPlan::scan(source))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.session.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.session.metrics
    }

    pub fn prometheus_metrics(&self) -> String {
        self.session.metrics.render_prometheus()
    }

    /// Register a custom optimizer rule; it runs after the built-in passes.
    ///
    /// Returns `true` when a rule with the same name was replaced.
    pub fn register_optimizer_rule(&self, rule: Arc<dyn OptimizerRule>) -> bool {
        self.session.optimizer.register_rule(rule)
    }

    pub fn deregister_optimizer_rule(&self, name: &str) -> bool {
        self.session.optimizer.deregister_rule(name)
    }

    /// Drops every frame memoized by `cache()` nodes.
    pub fn clear_cache(&self) {
        self.session.clear_cache();
    }

    pub fn cached_frames(&self) -> usize {
        self.session.cache.len()
    }
}
