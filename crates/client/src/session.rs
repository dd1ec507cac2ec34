use std::sync::Arc;

use skiff_common::{EngineConfig, MetricsRegistry, QueryId, Result};
use skiff_execution::{ExecContext, PlanCache};
use skiff_planner::Optimizer;

pub type SharedSession = Arc<Session>;

/// State shared by every lazy frame built from one [`crate::Engine`].
#[derive(Debug)]
pub struct Session {
    pub config: EngineConfig,
    pub metrics: MetricsRegistry,
    pub optimizer: Optimizer,
    pub cache: Arc<PlanCache>,
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: MetricsRegistry::new(),
            optimizer: Optimizer::new(),
            cache: Arc::new(PlanCache::new()),
        })
    }

    /// Fresh query id over the session's registry and cache.
    pub fn exec_context(&self) -> ExecContext {
        ExecContext {
            config: self.config.clone(),
            query_id: QueryId::next(),
            metrics: self.metrics.clone(),
            cache: Arc::clone(&self.cache),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
