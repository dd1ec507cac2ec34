//! Per-query execution state and the session plan cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use skiff_common::{EngineConfig, MetricsRegistry, QueryId};
use skiff_storage::DataFrame;

/// Frames materialized by `Cache` nodes, keyed by cache id.
///
/// Owned by a session; entries live until [`PlanCache::clear`].
#[derive(Debug, Default)]
pub struct PlanCache {
    entries: Mutex<HashMap<u64, DataFrame>>,
}

impl PlanCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached frame for `id`, if any.
    pub fn get(&self, id: u64) -> Option<DataFrame> {
        self.entries
            .lock()
            .expect("plan cache lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Stores `df` under `id`, replacing any earlier entry.
    pub fn insert(&self, id: u64, df: DataFrame) {
        self.entries
            .lock()
            .expect("plan cache lock poisoned")
            .insert(id, df);
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("plan cache lock poisoned").len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached frame.
    pub fn clear(&self) {
        self.entries.lock().expect("plan cache lock poisoned").clear();
    }
}

/// Everything one plan execution needs besides the plan itself.
#[derive(Debug, Clone)]
pub struct ExecContext {
    /// Engine settings; `parallel` drives every scheduler call.
    pub config: EngineConfig,
    /// Label for metrics and spans.
    pub query_id: QueryId,
    /// Per-operator row and time counters.
    pub metrics: MetricsRegistry,
    /// Session-scoped memo for `Cache` nodes.
    pub cache: Arc<PlanCache>,
}

impl ExecContext {
    /// Context with a fresh query id, its own metrics registry and an empty cache.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            query_id: QueryId::next(),
            metrics: MetricsRegistry::new(),
            cache: Arc::new(PlanCache::new()),
        }
    }
}
