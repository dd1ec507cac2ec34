use std::sync::Arc;

use pretty_assertions::assert_eq;
use skiff_client::{
    col, lit, when, DataFrame, Engine, EngineConfig, JoinOptions, JoinType, LogicalPlan,
    OptimizerRule, ParallelConfig, Result, Series, SkiffError,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn engine(optimize: bool) -> Engine {
    Engine::new(EngineConfig {
        parallel: ParallelConfig::sequential(),
        optimize,
        ..EngineConfig::default()
    })
    .expect("engine")
}

fn people() -> DataFrame {
    DataFrame::new(vec![
        Series::from_i64("id", vec![1, 2, 3, 4]),
        Series::from_strs("name", &["ann", "bob", "cy", "dee"]),
        Series::from_f64("v", vec![1.0, 2.0, 3.0, 4.0]),
    ])
    .expect("frame")
}

fn scores() -> DataFrame {
    DataFrame::new(vec![
        Series::from_i64("id", vec![2, 4, 4, 5]),
        Series::from_f64("v", vec![0.5, 1.5, 2.5, 3.5]),
    ])
    .expect("frame")
}

#[test]
fn inner_join_orders_by_left_then_right_row() {
    let e = engine(true);
    let out = e
        .lazy(people())
        .join(e.lazy(scores()), &["id"], JoinType::Inner)
        .collect()
        .expect("join");
    let expected = DataFrame::new(vec![
        Series::from_i64("id", vec![2, 4, 4]),
        Series::from_strs("name", &["bob", "dee", "dee"]),
        Series::from_f64("v", vec![2.0, 4.0, 4.0]),
        Series::from_f64("v_right", vec![0.5, 1.5, 2.5]),
    ])
    .expect("frame");
    assert_eq!(out, expected);
}

#[test]
fn outer_join_coalesces_keys_and_appends_unmatched_right_rows() {
    let e = engine(true);
    let out = e
        .lazy(people())
        .join(e.lazy(scores()), &["id"], JoinType::Outer)
        .collect()
        .expect("join");
    assert_eq!(
        out.column("id").expect("id"),
        &Series::from_i64("id", vec![1, 2, 3, 4, 4, 5])
    );
    assert_eq!(
        out.column("v_right").expect("v_right"),
        &Series::from_opt_f64(
            "v_right",
            vec![None, Some(0.5), None, Some(1.5), Some(2.5), Some(3.5)]
        )
    );
    assert_eq!(
        out.column("name").expect("name"),
        &Series::from_opt_strs(
            "name",
            &[Some("ann"), Some("bob"), Some("cy"), Some("dee"), Some("dee"), None]
        )
    );
}

#[test]
fn join_with_custom_keys_and_suffix() {
    let e = engine(true);
    let renamed = DataFrame::new(vec![
        Series::from_i64("person", vec![3, 1]),
        Series::from_strs("name", &["third", "first"]),
    ])
    .expect("frame");
    let out = e
        .lazy(people())
        .join_with(
            e.lazy(renamed),
            JoinOptions::new(JoinType::Left, vec!["id".into()], vec!["person".into()])
                .with_suffix("_other"),
        )
        .collect()
        .expect("join");
    assert_eq!(
        out.column_names(),
        vec!["id", "name", "v", "person", "name_other"]
    );
    assert_eq!(
        out.column("name_other").expect("name_other"),
        &Series::from_opt_strs("name_other", &[Some("first"), None, Some("third"), None])
    );
}

#[test]
fn cross_join_and_key_validation() {
    let e = engine(true);
    let out = e
        .lazy(people())
        .cross_join(e.lazy(scores()))
        .collect()
        .expect("cross");
    assert_eq!(out.height(), 16);
    assert_eq!(out.width(), 5);

    let err = e
        .lazy(people())
        .join_with(
            e.lazy(scores()),
            JoinOptions::new(JoinType::Inner, vec!["id".into(), "v".into()], vec!["id".into()]),
        )
        .collect()
        .expect_err("key arity");
    assert!(matches!(err, SkiffError::Planning(_)));
}

fn pipeline(e: &Engine) -> DataFrame {
    e.lazy(people())
        .with_column(col("v").add(col("id")).mul(lit(2)).alias("x"))
        .with_column(col("v").add(col("id")).alias("y"))
        .join(e.lazy(scores()), &["id"], JoinType::Left)
        .filter(col("name").neq(lit("bob")).and(col("x").gt(lit(5))))
        .with_column(
            when(col("v_right").is_null())
                .then(lit("none"))
                .otherwise(lit("some"))
                .alias("matched"),
        )
        .select(vec![col("name"), col("y"), col("matched")])
        .sort_by(&["y", "matched"], &[true, false])
        .collect()
        .expect("pipeline")
}

#[test]
fn optimizer_preserves_results() {
    init_tracing();
    let optimized = pipeline(&engine(true));
    let plain = pipeline(&engine(false));
    assert_eq!(optimized, plain);
    let expected = DataFrame::new(vec![
        Series::from_strs("name", &["dee", "dee", "cy"]),
        Series::from_f64("y", vec![8.0, 8.0, 6.0]),
        Series::from_strs("matched", &["some", "some", "none"]),
    ])
    .expect("frame");
    assert_eq!(optimized, expected);
}

#[test]
fn collect_is_idempotent() {
    let e = engine(true);
    let lf = e
        .lazy(people())
        .filter(col("v").gt_eq(lit(2.0)))
        .sort("v", true)
        .head(2);
    let first = lf.collect().expect("first");
    let second = lf.collect().expect("second");
    assert_eq!(first, second);
    assert_eq!(
        first.column("name").expect("name"),
        &Series::from_strs("name", &["dee", "cy"])
    );
    assert_eq!(
        e.lazy(people()).tail(1).collect().expect("tail").height(),
        1
    );
}

#[test]
fn explain_shows_pushed_down_projection() {
    let e = engine(true);
    let lf = e
        .lazy(people())
        .filter(col("v").gt(lit(1.0)))
        .select(vec![col("name")]);
    let raw = lf.explain(false).expect("explain");
    let optimized = lf.explain(true).expect("explain");
    assert_eq!(
        raw,
        "Projection [col(name)]\n  Filter (col(v) > lit(1.0))\n    Scan memory [4 rows x 3 cols]\n"
    );
    assert!(optimized.contains("projection=[name, v]"));
}

#[test]
fn metrics_follow_collect() {
    init_tracing();
    let e = engine(true);
    e.lazy(people())
        .filter(col("id").gt(lit(1)))
        .collect()
        .expect("collect");
    let text = e.prometheus_metrics();
    assert!(text.contains("skiff_operator_rows_out_total"));
    assert!(text.contains("operator=\"filter\""));
}

#[test]
fn partial_json_config_keeps_defaults() {
    let e = Engine::from_json_config(r#"{"join_suffix": "_r", "parallel": {"enabled": false}}"#)
        .expect("config");
    assert_eq!(e.config().join_suffix, "_r");
    assert!(!e.config().parallel.enabled);
    assert_eq!(e.config().parallel.morsel_size, 4096);
    assert!(matches!(
        Engine::from_json_config(r#"{"parallel": {"morsel_size": 0}}"#),
        Err(SkiffError::InvalidConfig(_))
    ));
}

struct CapLimit;

impl OptimizerRule for CapLimit {
    fn name(&self) -> &str {
        "cap_limit"
    }

    fn rewrite(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        Ok(match plan {
            LogicalPlan::Limit { n, input } => LogicalPlan::Limit {
                n: n.min(1),
                input,
            },
            other => other,
        })
    }
}

#[test]
fn custom_rules_apply_until_deregistered() {
    let e = engine(true);
    let lf = e.lazy(people()).head(3);
    assert!(!e.register_optimizer_rule(Arc::new(CapLimit)));
    assert_eq!(lf.collect().expect("capped").height(), 1);
    assert!(e.register_optimizer_rule(Arc::new(CapLimit)));
    assert!(e.deregister_optimizer_rule("cap_limit"));
    assert!(!e.deregister_optimizer_rule("cap_limit"));
    assert_eq!(lf.collect().expect("uncapped").height(), 3);
}
