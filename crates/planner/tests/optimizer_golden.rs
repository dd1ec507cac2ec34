use std::sync::Arc;

use pretty_assertions::assert_eq;
use skiff_planner::{explain_logical, Expr, JoinType, LogicalPlan, Optimizer};
use skiff_storage::{DataFrame, MemorySource, Series};

fn optimizer_snapshot(plan: LogicalPlan) -> String {
    let before = explain_logical(&plan);
    let after = explain_logical(&Optimizer::new().optimize(plan).expect("optimize"));
    format!("## before\n{before}## after\n{after}")
}

fn table_t() -> LogicalPlan {
    let df = DataFrame::new(vec![
        Series::from_i64("id", vec![1, 2, 3, 4]),
        Series::from_strs("name", &["a", "b", "c", "d"]),
        Series::from_i64("v", vec![1, 1, 2, 2]),
    ])
    .expect("frame");
    LogicalPlan::scan(Arc::new(MemorySource::new(df)))
}

fn table_u() -> LogicalPlan {
    let df = DataFrame::new(vec![
        Series::from_i64("id", vec![2, 4]),
        Series::from_f64("score", vec![0.5, 0.25]),
    ])
    .expect("frame");
    LogicalPlan::scan(Arc::new(MemorySource::new(df)))
}

#[test]
fn golden_filter_merge_and_projection_pushdown() {
    let plan = LogicalPlan::Projection {
        exprs: vec![Expr::col("id")],
        input: Box::new(LogicalPlan::Filter {
            predicate: Expr::col("id").gt(Expr::lit(10)),
            input: Box::new(LogicalPlan::Filter {
                predicate: Expr::col("v").eq(Expr::lit(1)),
                input: Box::new(table_t()),
            }),
        }),
    };
    let expected = "\
## before
Projection [col(id)]
  Filter (col(id) > lit(10))
    Filter (col(v) == lit(1))
      Scan memory [4 rows x 3 cols]
## after
Projection [col(id)]
  Filter ((col(v) == lit(1)) and (col(id) > lit(10)))
    Scan memory [4 rows x 3 cols] projection=[id, v]
";
    assert_eq!(optimizer_snapshot(plan), expected);
}

#[test]
fn golden_predicate_pushdown_through_inner_join() {
    let plan = LogicalPlan::Filter {
        predicate: Expr::col("id")
            .gt(Expr::lit(1))
            .and(Expr::col("score").lt(Expr::lit(0.4))),
        input: Box::new(LogicalPlan::Join {
            left: Box::new(table_t()),
            right: Box::new(table_u()),
            join_type: JoinType::Inner,
            left_on: vec!["id".into()],
            right_on: vec!["id".into()],
            suffix: "_right".into(),
        }),
    };
    let expected = "\
## before
Filter ((col(id) > lit(1)) and (col(score) < lit(0.4)))
  Join type=inner left_on=[id] right_on=[id] suffix=_right
    left:
      Scan memory [4 rows x 3 cols]
    right:
      Scan memory [2 rows x 2 cols]
## after
Join type=inner left_on=[id] right_on=[id] suffix=_right
  left:
    Filter (col(id) > lit(1))
      Scan memory [4 rows x 3 cols]
  right:
    Filter (col(score) < lit(0.4))
      Scan memory [2 rows x 2 cols]
";
    assert_eq!(optimizer_snapshot(plan), expected);
}

#[test]
fn golden_common_subexpression_hoisted_above_scan() {
    let vv = Expr::col("v").mul(Expr::col("v"));
    let plan = LogicalPlan::Projection {
        exprs: vec![
            Expr::col("id"),
            vv.clone().add(Expr::lit(1)).alias("a"),
            vv.alias("b"),
        ],
        input: Box::new(table_t()),
    };
    let expected = "\
## before
Projection [col(id), ((col(v) * col(v)) + lit(1)).alias(a), (col(v) * col(v)).alias(b)]
  Scan memory [4 rows x 3 cols]
## after
Projection [col(id), (col(__cse_0) + lit(1)).alias(a), col(__cse_0).alias(b)]
  WithColumn __cse_0 := (col(v) * col(v)).alias(__cse_0)
    Scan memory [4 rows x 3 cols] projection=[id, v]
";
    assert_eq!(optimizer_snapshot(plan), expected);
}
