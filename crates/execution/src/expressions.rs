//! Expression evaluation against a materialized frame.
//!
//! Output contract:
//! - every evaluation returns a [`Series`] of the frame's height, named by
//!   [`Expr::output_name`];
//! - binary ops with a literal right-hand side go through the scalar kernels,
//!   column-vs-column ops through the vector kernels;
//! - `and`/`or` use Kleene logic, so `null and false` is `false`.

use arrow::array::{Array, BooleanArray, UInt32Array};
use arrow::compute::kernels::boolean::{and_kleene, not, or_kleene};
use skiff_common::{Result, SkiffError};
use skiff_planner::{BinaryOp, Expr};
use skiff_storage::kernels::{self, ArithOp, CmpOp};
use skiff_storage::{ColumnData, DataFrame, Series};

/// Evaluates `expr` over every row of `df`.
///
/// # Errors
/// Schema errors for unknown columns or operand types an operator cannot take,
/// planning errors for aggregations outside a group-by, and unsupported errors
/// for struct/list accessors.
pub fn evaluate(expr: &Expr, df: &DataFrame) -> Result<Series> {
    Ok(eval(expr, df)?.rename(expr.output_name()))
}

/// Evaluates a predicate into a filter mask.
pub fn evaluate_mask(expr: &Expr, df: &DataFrame) -> Result<BooleanArray> {
    to_mask(&eval(expr, df)?, expr)
}

fn eval(expr: &Expr, df: &DataFrame) -> Result<Series> {
    match expr {
        Expr::Column(name) => df.column(name).cloned(),
        Expr::Literal(v) => Ok(Series::full("literal", v, df.height())),
        Expr::Alias { expr, .. } => eval(expr, df),
        Expr::Binary { left, op, right } => eval_binary(left, *op, right, df),
        Expr::Not(e) => {
            let mask = to_mask(&eval(e, df)?, e)?;
            Ok(bool_series(not(&mask)?))
        }
        Expr::Agg { .. } => Err(SkiffError::Planning(format!(
            "aggregation {expr} is only valid inside group_by"
        ))),
        Expr::Cast { expr, dtype } => eval(expr, df)?.cast(*dtype),
        Expr::When {
            cond,
            then,
            otherwise,
        } => {
            let mask = to_mask(&eval(cond, df)?, cond)?;
            let then = eval(then, df)?;
            let otherwise = match otherwise {
                Some(o) => eval(o, df)?,
                None => Series::nulls("otherwise", df.height()),
            };
            choose(&then, &otherwise, |i| mask.is_valid(i) && mask.value(i))
        }
        Expr::IsNull(e) => Ok(bool_series(eval(e, df)?.null_mask())),
        Expr::IsNotNull(e) => Ok(bool_series(not(&eval(e, df)?.null_mask())?)),
        Expr::FillNull { expr, value } => {
            let base = eval(expr, df)?;
            let fill = eval(value, df)?;
            choose(&base, &fill, |i| !base.is_null_at(i))
        }
        Expr::Coalesce(inputs) => {
            let mut iter = inputs.iter();
            let Some(first) = iter.next() else {
                return Err(SkiffError::Planning(
                    "coalesce needs at least one input".to_string(),
                ));
            };
            let mut acc = eval(first, df)?;
            for e in iter {
                let next = eval(e, df)?;
                acc = choose(&acc, &next, |i| !acc.is_null_at(i))?;
            }
            Ok(acc)
        }
        Expr::StructField { field, .. } => Err(SkiffError::Unsupported(format!(
            "struct field access '{field}': frames have no struct columns"
        ))),
        Expr::ListGet { index, .. } => Err(SkiffError::Unsupported(format!(
            "list element access [{index}]: frames have no list columns"
        ))),
    }
}

fn eval_binary(left: &Expr, op: BinaryOp, right: &Expr, df: &DataFrame) -> Result<Series> {
    let l = eval(left, df)?;
    if op.is_logical() {
        let lm = to_mask(&l, left)?;
        let rm = to_mask(&eval(right, df)?, right)?;
        let out = match op {
            BinaryOp::And => and_kleene(&lm, &rm)?,
            _ => or_kleene(&lm, &rm)?,
        };
        return Ok(bool_series(out));
    }
    if let Some(cmp) = cmp_op(op) {
        let mask = match right {
            Expr::Literal(v) => kernels::compare_scalar(&l, cmp, v)?,
            _ => kernels::compare(&l, cmp, &eval(right, df)?)?,
        };
        return Ok(bool_series(mask));
    }
    let arith = arith_op(op);
    match right {
        Expr::Literal(v) => kernels::arith_scalar(&l, arith, v),
        _ => kernels::arith(&l, arith, &eval(right, df)?),
    }
}

fn cmp_op(op: BinaryOp) -> Option<CmpOp> {
    Some(match op {
        BinaryOp::Gt => CmpOp::Gt,
        BinaryOp::Lt => CmpOp::Lt,
        BinaryOp::Eq => CmpOp::Eq,
        BinaryOp::NotEq => CmpOp::NotEq,
        BinaryOp::GtEq => CmpOp::GtEq,
        BinaryOp::LtEq => CmpOp::LtEq,
        _ => return None,
    })
}

fn arith_op(op: BinaryOp) -> ArithOp {
    match op {
        BinaryOp::Sub => ArithOp::Sub,
        BinaryOp::Mul => ArithOp::Mul,
        BinaryOp::Div => ArithOp::Div,
        _ => ArithOp::Add,
    }
}

fn bool_series(mask: BooleanArray) -> Series {
    Series::new("mask", ColumnData::Bool(mask))
}

fn to_mask(s: &Series, origin: &Expr) -> Result<BooleanArray> {
    match s.data() {
        ColumnData::Bool(b) => Ok(b.clone()),
        ColumnData::Null(_) => Ok(BooleanArray::from(vec![None::<bool>; s.len()])),
        _ => Err(SkiffError::Schema(format!(
            "expected a boolean expression, {origin} has type {}",
            s.dtype()
        ))),
    }
}

/// Row `i` from `primary` when `take_primary(i)`, else from `fallback`; both
/// sides are coerced to their common dtype.
fn choose(
    primary: &Series,
    fallback: &Series,
    take_primary: impl Fn(usize) -> bool,
) -> Result<Series> {
    if primary.len() != fallback.len() {
        return Err(SkiffError::Schema(format!(
            "length mismatch between '{}' ({}) and '{}' ({})",
            primary.name(),
            primary.len(),
            fallback.name(),
            fallback.len()
        )));
    }
    // Frames are capped at MAX_ROWS, so `n + i` fits in u32.
    let n = primary.len() as u32;
    let idx: UInt32Array = (0..n)
        .map(|i| if take_primary(i as usize) { i } else { n + i })
        .collect();
    Series::concat(&[primary, fallback])?.take(&idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skiff_storage::DType;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Series::from_i64("a", vec![1, 2, 3, 4]),
            Series::from_opt_f64("b", vec![Some(0.5), None, Some(2.5), Some(f64::NAN)]),
            Series::from_opt_bool("flag", vec![Some(true), None, Some(false), None]),
        ])
        .expect("frame")
    }

    #[test]
    fn arithmetic_names_after_left_input() {
        let df = frame();
        let out = evaluate(&Expr::col("a").mul(Expr::lit(2)), &df).expect("mul");
        assert_eq!(out, Series::from_i64("a", vec![2, 4, 6, 8]));
        let out = evaluate(&Expr::col("a").div(Expr::col("a")).alias("one"), &df).expect("div");
        assert_eq!(out, Series::from_f64("one", vec![1.0; 4]));
    }

    #[test]
    fn kleene_logic_and_comparisons() {
        let df = frame();
        let pred = Expr::col("flag").and(Expr::col("a").gt(Expr::lit(2)));
        let out = evaluate(&pred, &df).expect("and");
        assert_eq!(
            out,
            Series::from_opt_bool("flag", vec![Some(false), Some(false), Some(false), None])
        );
        let mask = evaluate_mask(&Expr::col("flag").or(Expr::lit(true)), &df).expect("or");
        assert_eq!(mask.true_count(), 4);
    }

    #[test]
    fn null_handling_treats_nan_as_null() {
        let df = frame();
        let out = evaluate(&Expr::col("b").is_null(), &df).expect("is_null");
        assert_eq!(
            out,
            Series::from_bool("b", vec![false, true, false, true])
        );
        let filled = evaluate(&Expr::col("b").fill_null(Expr::lit(0)), &df).expect("fill");
        assert_eq!(filled, Series::from_f64("b", vec![0.5, 0.0, 2.5, 0.0]));
    }

    #[test]
    fn when_then_otherwise_and_coalesce() {
        let df = frame();
        let when = Expr::When {
            cond: Box::new(Expr::col("a").gt_eq(Expr::lit(3))),
            then: Box::new(Expr::lit("big")),
            otherwise: None,
        };
        let out = evaluate(&when.alias("size"), &df).expect("when");
        assert_eq!(
            out,
            Series::from_opt_strs("size", &[None, None, Some("big"), Some("big")])
        );
        let coalesce = Expr::Coalesce(vec![Expr::col("b"), Expr::col("a")]);
        let out = evaluate(&coalesce, &df).expect("coalesce");
        assert_eq!(out, Series::from_f64("b", vec![0.5, 2.0, 2.5, 4.0]));
    }

    #[test]
    fn null_condition_rows_take_otherwise() {
        let df = frame();
        let when = Expr::When {
            cond: Box::new(Expr::col("flag")),
            then: Box::new(Expr::col("a")),
            otherwise: Some(Box::new(Expr::lit(0))),
        };
        let out = evaluate(&when, &df).expect("when");
        assert_eq!(out, Series::from_i64("a", vec![1, 0, 0, 0]));
    }

    #[test]
    fn cast_and_errors() {
        let df = frame();
        let out = evaluate(&Expr::col("a").cast(DType::String), &df).expect("cast");
        assert_eq!(out, Series::from_strs("a", &["1", "2", "3", "4"]));
        assert!(matches!(
            evaluate(&Expr::col("missing"), &df),
            Err(SkiffError::Schema(_))
        ));
        assert!(matches!(
            evaluate(&Expr::col("a").sum(), &df),
            Err(SkiffError::Planning(_))
        ));
        assert!(matches!(
            evaluate(&Expr::col("a").field("x"), &df),
            Err(SkiffError::Unsupported(_))
        ));
        assert!(matches!(
            evaluate(&Expr::col("a").list_get(0), &df),
            Err(SkiffError::Unsupported(_))
        ));
        assert!(matches!(
            evaluate_mask(&Expr::col("a"), &df),
            Err(SkiffError::Schema(_))
        ));
    }
}
