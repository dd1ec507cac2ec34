use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use skiff_storage::{DType, Scalar};

/// Binary operators over two expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
    Eq,
    NotEq,
    GtEq,
    LtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::GtEq => ">=",
            BinaryOp::LtEq => "<=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

/// Aggregation functions available in group-by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggOp {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    First,
    Last,
    /// Sample standard deviation (ddof = 1).
    Std,
    /// Sample variance (ddof = 1).
    Var,
    Median,
    /// Number of distinct non-null values.
    CountDistinct,
}

impl AggOp {
    pub const ALL: [AggOp; 11] = [
        AggOp::Sum,
        AggOp::Mean,
        AggOp::Min,
        AggOp::Max,
        AggOp::Count,
        AggOp::First,
        AggOp::Last,
        AggOp::Std,
        AggOp::Var,
        AggOp::Median,
        AggOp::CountDistinct,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AggOp::Sum => "sum",
            AggOp::Mean => "mean",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::Count => "count",
            AggOp::First => "first",
            AggOp::Last => "last",
            AggOp::Std => "std",
            AggOp::Var => "var",
            AggOp::Median => "median",
            AggOp::CountDistinct => "n_unique",
        }
    }

    /// Parses a function name; accepts a few common aliases.
    pub fn from_name(name: &str) -> Option<AggOp> {
        let op = match name.to_ascii_lowercase().as_str() {
            "sum" => AggOp::Sum,
            "mean" | "avg" => AggOp::Mean,
            "min" => AggOp::Min,
            "max" => AggOp::Max,
            "count" => AggOp::Count,
            "first" => AggOp::First,
            "last" => AggOp::Last,
            "std" => AggOp::Std,
            "var" => AggOp::Var,
            "median" => AggOp::Median,
            "n_unique" | "count_distinct" => AggOp::CountDistinct,
            _ => return None,
        };
        Some(op)
    }
}

/// Expression tree evaluated against a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(String),
    Literal(Scalar),
    Alias {
        expr: Box<Expr>,
        name: String,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Agg {
        input: Box<Expr>,
        op: AggOp,
    },
    Cast {
        expr: Box<Expr>,
        dtype: DType,
    },
    /// `otherwise: None` yields null where the condition does not hold.
    When {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    FillNull {
        expr: Box<Expr>,
        value: Box<Expr>,
    },
    Coalesce(Vec<Expr>),
    StructField {
        expr: Box<Expr>,
        field: String,
    },
    ListGet {
        expr: Box<Expr>,
        index: i64,
    },
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn lit(value: impl Into<Scalar>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    pub fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn add(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Add, other)
    }

    pub fn sub(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Sub, other)
    }

    pub fn mul(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Mul, other)
    }

    pub fn div(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Div, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn neq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn agg(self, op: AggOp) -> Expr {
        Expr::Agg {
            input: Box::new(self),
            op,
        }
    }

    pub fn sum(self) -> Expr {
        self.agg(AggOp::Sum)
    }

    pub fn mean(self) -> Expr {
        self.agg(AggOp::Mean)
    }

    pub fn min(self) -> Expr {
        self.agg(AggOp::Min)
    }

    pub fn max(self) -> Expr {
        self.agg(AggOp::Max)
    }

    pub fn count(self) -> Expr {
        self.agg(AggOp::Count)
    }

    pub fn first(self) -> Expr {
        self.agg(AggOp::First)
    }

    pub fn last(self) -> Expr {
        self.agg(AggOp::Last)
    }

    pub fn std(self) -> Expr {
        self.agg(AggOp::Std)
    }

    pub fn var(self) -> Expr {
        self.agg(AggOp::Var)
    }

    pub fn median(self) -> Expr {
        self.agg(AggOp::Median)
    }

    pub fn n_unique(self) -> Expr {
        self.agg(AggOp::CountDistinct)
    }

    pub fn cast(self, dtype: DType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    pub fn fill_null(self, value: Expr) -> Expr {
        Expr::FillNull {
            expr: Box::new(self),
            value: Box::new(value),
        }
    }

    pub fn field(self, name: impl Into<String>) -> Expr {
        Expr::StructField {
            expr: Box::new(self),
            field: name.into(),
        }
    }

    pub fn list_get(self, index: i64) -> Expr {
        Expr::ListGet {
            expr: Box::new(self),
            index,
        }
    }

    /// Name of the column this expression produces.
    ///
    /// Derived expressions inherit the name of their leftmost input;
    /// a bare literal is named `literal`.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(c) => c.clone(),
            Expr::Literal(_) => "literal".to_string(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Binary { left, .. } => left.output_name(),
            Expr::StructField { field, .. } => field.clone(),
            Expr::Not(e)
            | Expr::Agg { input: e, .. }
            | Expr::Cast { expr: e, .. }
            | Expr::IsNull(e)
            | Expr::IsNotNull(e)
            | Expr::FillNull { expr: e, .. }
            | Expr::ListGet { expr: e, .. } => e.output_name(),
            Expr::When { then, .. } => then.output_name(),
            Expr::Coalesce(inputs) => inputs
                .first()
                .map_or_else(|| "literal".to_string(), Expr::output_name),
        }
    }

    /// Direct children, left to right.
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) => vec![],
            Expr::Alias { expr, .. }
            | Expr::Not(expr)
            | Expr::Agg { input: expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::StructField { expr, .. }
            | Expr::ListGet { expr, .. } => vec![expr],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::FillNull { expr, value } => vec![expr, value],
            Expr::When {
                cond,
                then,
                otherwise,
            } => {
                let mut v: Vec<&Expr> = vec![cond, then];
                if let Some(o) = otherwise {
                    v.push(o);
                }
                v
            }
            Expr::Coalesce(inputs) => inputs.iter().collect(),
        }
    }

    /// Rebuilds this node with each child passed through `f`.
    pub fn map_children(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let mut b = |e: Box<Expr>| Box::new(f(*e));
        match self {
            Expr::Column(_) | Expr::Literal(_) => self,
            Expr::Alias { expr, name } => Expr::Alias { expr: b(expr), name },
            Expr::Binary { left, op, right } => {
                let left = b(left);
                Expr::Binary {
                    left,
                    op,
                    right: b(right),
                }
            }
            Expr::Not(e) => Expr::Not(b(e)),
            Expr::Agg { input, op } => Expr::Agg { input: b(input), op },
            Expr::Cast { expr, dtype } => Expr::Cast { expr: b(expr), dtype },
            Expr::When {
                cond,
                then,
                otherwise,
            } => {
                let cond = b(cond);
                let then = b(then);
                Expr::When {
                    cond,
                    then,
                    otherwise: otherwise.map(&mut b),
                }
            }
            Expr::IsNull(e) => Expr::IsNull(b(e)),
            Expr::IsNotNull(e) => Expr::IsNotNull(b(e)),
            Expr::FillNull { expr, value } => {
                let expr = b(expr);
                Expr::FillNull {
                    expr,
                    value: b(value),
                }
            }
            Expr::Coalesce(inputs) => Expr::Coalesce(inputs.into_iter().map(|e| f(e)).collect()),
            Expr::StructField { expr, field } => Expr::StructField { expr: b(expr), field },
            Expr::ListGet { expr, index } => Expr::ListGet { expr: b(expr), index },
        }
    }

    /// Column names read by this expression, first-seen order, no duplicates.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Column(c) = e {
                if seen.insert(c.clone()) {
                    out.push(c.clone());
                }
            }
        });
        out
    }

    /// Pre-order visit of every node.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        for c in self.children() {
            c.walk(f);
        }
    }

    pub fn contains_agg(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= matches!(e, Expr::Agg { .. }));
        found
    }

    /// Column refs and literals; never worth caching.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Expr::Column(_) | Expr::Literal(_))
    }
}

/// Canonical form, also used as the common-subexpression key.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "col({c})"),
            Expr::Literal(v) => write!(f, "lit({v})"),
            Expr::Alias { expr, name } => write!(f, "{expr}.alias({name})"),
            Expr::Binary { left, op, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Not(e) => write!(f, "not({e})"),
            Expr::Agg { input, op } => write!(f, "{input}.{}()", op.name()),
            Expr::Cast { expr, dtype } => write!(f, "{expr}.cast({dtype})"),
            Expr::When {
                cond,
                then,
                otherwise,
            } => {
                write!(f, "when({cond}).then({then})")?;
                match otherwise {
                    Some(o) => write!(f, ".otherwise({o})"),
                    None => Ok(()),
                }
            }
            Expr::IsNull(e) => write!(f, "{e}.is_null()"),
            Expr::IsNotNull(e) => write!(f, "{e}.is_not_null()"),
            Expr::FillNull { expr, value } => write!(f, "{expr}.fill_null({value})"),
            Expr::Coalesce(inputs) => {
                f.write_str("coalesce(")?;
                for (i, e) in inputs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
            Expr::StructField { expr, field } => write!(f, "{expr}.field({field:?})"),
            Expr::ListGet { expr, index } => write!(f, "{expr}.list.get({index})"),
        }
    }
}
