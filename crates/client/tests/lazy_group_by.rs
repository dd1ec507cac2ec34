use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use skiff_client::{
    col, lit, DataFrame, Engine, EngineConfig, ParallelConfig, Series, SkiffError,
};

fn engine(parallel: ParallelConfig) -> Engine {
    Engine::new(EngineConfig {
        parallel,
        ..EngineConfig::default()
    })
    .expect("engine")
}

fn fixture() -> DataFrame {
    DataFrame::new(vec![
        Series::from_strs("cat", &["a", "b", "a", "b", "b"]),
        Series::from_i64("val", vec![10, 20, 20, 40, 60]),
    ])
    .expect("frame")
}

#[test]
fn sum_mean_count_per_group() {
    let out = engine(ParallelConfig::sequential())
        .lazy(fixture())
        .group_by(vec![col("cat")])
        .agg(vec![
            col("val").sum().alias("total"),
            col("val").mean().alias("avg"),
            col("val").count().alias("n"),
        ])
        .collect()
        .expect("collect");

    let expected = DataFrame::new(vec![
        Series::from_strs("cat", &["a", "b"]),
        Series::from_i64("total", vec![30, 120]),
        Series::from_f64("avg", vec![15.0, 40.0]),
        Series::from_i64("n", vec![2, 3]),
    ])
    .expect("frame");
    assert_eq!(out, expected);
}

#[test]
fn convenience_aggregations_name_outputs() {
    let engine = engine(ParallelConfig::sequential());
    let sums = engine
        .lazy(fixture())
        .group_by(vec![col("cat")])
        .sum(&["val"])
        .collect()
        .expect("sum");
    assert_eq!(sums.column_names(), vec!["cat", "val_sum"]);

    let counts = engine
        .lazy(fixture())
        .group_by(vec![col("cat")])
        .count()
        .collect()
        .expect("count");
    assert_eq!(
        counts.column("count").expect("count"),
        &Series::from_i64("count", vec![2, 3])
    );

    let distinct = engine
        .lazy(fixture())
        .group_by(vec![col("cat")])
        .count_distinct(&["val"])
        .collect()
        .expect("n_unique");
    assert_eq!(
        distinct.column("val_n_unique").expect("n_unique"),
        &Series::from_i64("val_n_unique", vec![2, 3])
    );
}

#[test]
fn aggregation_on_missing_column_names_it() {
    let err = engine(ParallelConfig::sequential())
        .lazy(fixture())
        .group_by(vec![col("cat")])
        .agg(vec![col("nope").sum()])
        .collect()
        .expect_err("missing column");
    assert!(matches!(err, SkiffError::Planning(_)));
    assert!(err.to_string().contains("aggregation on nonexistent column 'nope'"));
}

#[test]
fn group_sizes_partition_the_input() {
    let n = 5_000i64;
    let df = DataFrame::new(vec![
        Series::from_i64("k", (0..n).map(|i| (i * 7919) % 53).collect()),
        Series::from_i64("v", (0..n).collect()),
    ])
    .expect("frame");
    let out = engine(ParallelConfig::eager(256, 4))
        .lazy(df)
        .group_by(vec![col("k")])
        .agg(vec![lit(1).count().alias("rows"), col("v").sum().alias("s")])
        .collect()
        .expect("collect");

    assert_eq!(out.height(), 53);
    let rows: i64 = (0..out.height())
        .filter_map(|i| out.column("rows").expect("rows").i64_at(i))
        .sum();
    let total: i64 = (0..out.height())
        .filter_map(|i| out.column("s").expect("s").i64_at(i))
        .sum();
    assert_eq!(rows, n);
    assert_eq!(total, n * (n - 1) / 2);
}

#[test]
fn parallel_and_sequential_group_by_agree() {
    let n = 20_000usize;
    let labels = ["x", "y", "z"];
    let df = DataFrame::new(vec![
        Series::from_i64("k1", (0..n as i64).map(|i| i % 37).collect()),
        Series::from_strs("k2", &(0..n).map(|i| labels[i % 3]).collect::<Vec<_>>()),
        Series::from_f64("v", (0..n).map(|i| i as f64 * 0.5).collect()),
    ])
    .expect("frame");

    let run = |parallel: ParallelConfig| {
        engine(parallel)
            .lazy(df.clone())
            .group_by(vec![col("k1"), col("k2")])
            .agg(vec![
                col("v").sum().alias("sum"),
                col("v").mean().alias("mean"),
                col("v").min().alias("min"),
                col("v").max().alias("max"),
                col("v").median().alias("median"),
                col("v").n_unique().alias("distinct"),
            ])
            .collect()
            .expect("collect")
    };

    let sequential = run(ParallelConfig::sequential());
    let parallel = run(ParallelConfig::eager(512, 4));
    assert_eq!(sequential.height(), 111);
    assert_eq!(sequential, parallel);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn group_sums_match_a_naive_fold(
        rows in proptest::collection::vec((0i64..6, -50i64..50), 1..300),
    ) {
        let df = DataFrame::new(vec![
            Series::from_i64("k", rows.iter().map(|r| r.0).collect()),
            Series::from_i64("v", rows.iter().map(|r| r.1).collect()),
        ])
        .expect("frame");
        let out = engine(ParallelConfig::eager(16, 3))
            .lazy(df)
            .group_by(vec![col("k")])
            .agg(vec![col("v").sum().alias("s")])
            .sort("k", false)
            .collect()
            .expect("collect");

        let mut naive: BTreeMap<i64, i64> = BTreeMap::new();
        for (k, v) in &rows {
            *naive.entry(*k).or_default() += v;
        }
        prop_assert_eq!(
            out.column("k").expect("k"),
            &Series::from_i64("k", naive.keys().copied().collect())
        );
        prop_assert_eq!(
            out.column("s").expect("s"),
            &Series::from_i64("s", naive.values().copied().collect())
        );
    }
}
