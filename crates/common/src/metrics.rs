use std::sync::{Arc, OnceLock};

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Prometheus-backed counters for plan execution and the morsel scheduler.
#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    operator_rows_in: CounterVec,
    operator_rows_out: CounterVec,
    operator_time_seconds: HistogramVec,
    morsels_claimed: CounterVec,
    join_strategy: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    pub fn record_operator(
        &self,
        query_id: &str,
        operator: &str,
        rows_in: u64,
        rows_out: u64,
        secs: f64,
    ) {
        let labels = [query_id, operator];
        self.inner
            .operator_rows_in
            .with_label_values(&labels)
            .inc_by(rows_in as f64);
        self.inner
            .operator_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .operator_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn record_morsels(&self, primitive: &str, morsels: u64) {
        self.inner
            .morsels_claimed
            .with_label_values(&[primitive])
            .inc_by(morsels as f64);
    }

    pub fn record_join_strategy(&self, strategy: &str) {
        self.inner
            .join_strategy
            .with_label_values(&[strategy])
            .inc();
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let operator_rows_in = counter_vec(
            &registry,
            "skiff_operator_rows_in_total",
            "Input rows consumed per plan operator",
            &["query_id", "operator"],
        );
        let operator_rows_out = counter_vec(
            &registry,
            "skiff_operator_rows_out_total",
            "Output rows produced per plan operator",
            &["query_id", "operator"],
        );
        let operator_time_seconds = histogram_vec(
            &registry,
            "skiff_operator_time_seconds",
            "Wall time spent in each plan operator",
            &["query_id", "operator"],
        );
        let morsels_claimed = counter_vec(
            &registry,
            "skiff_morsels_claimed_total",
            "Morsels claimed from the shared cursor",
            &["primitive"],
        );
        let join_strategy = counter_vec(
            &registry,
            "skiff_join_strategy_total",
            "Joins executed per physical strategy",
            &["strategy"],
        );

        Self {
            registry,
            operator_rows_in,
            operator_rows_out,
            operator_time_seconds,
            morsels_claimed,
            join_strategy,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

/// Process-wide registry used by primitives that have no session at hand
/// (scheduler, join strategies).
pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.record_operator("q1", "Filter", 100, 10, 0.01);
        let text = m.render_prometheus();
        assert!(text.contains("skiff_operator_rows_out_total"));
        assert!(text.contains("Filter"));
    }

    #[test]
    fn renders_all_metric_families() {
        let m = MetricsRegistry::new();
        m.record_operator("q1", "Join", 10, 4, 0.02);
        m.record_morsels("parallel_for", 3);
        m.record_join_strategy("hash");
        let text = m.render_prometheus();

        assert!(text.contains("skiff_operator_rows_in_total"));
        assert!(text.contains("skiff_operator_rows_out_total"));
        assert!(text.contains("skiff_operator_time_seconds"));
        assert!(text.contains("skiff_morsels_claimed_total"));
        assert!(text.contains("skiff_join_strategy_total"));
    }
}
