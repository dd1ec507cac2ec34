use skiff_planner::Expr;
use skiff_storage::Scalar;

/// Builds a column-reference expression.
pub fn col(name: &str) -> Expr {
    Expr::col(name)
}

/// Builds a literal expression.
pub fn lit(value: impl Into<Scalar>) -> Expr {
    Expr::lit(value)
}

/// First non-null value across `exprs`, row by row.
pub fn coalesce(exprs: Vec<Expr>) -> Expr {
    Expr::Coalesce(exprs)
}

/// Starts a `when(cond).then(a).otherwise(b)` chain.
pub fn when(cond: Expr) -> When {
    When { cond }
}

#[derive(Debug, Clone)]
pub struct When {
    cond: Expr,
}

impl When {
    pub fn then(self, value: Expr) -> Then {
        Then {
            cond: self.cond,
            then: value,
        }
    }
}

/// A `when/then` branch awaiting its fallback.
#[derive(Debug, Clone)]
pub struct Then {
    cond: Expr,
    then: Expr,
}

impl Then {
    pub fn otherwise(self, value: Expr) -> Expr {
        self.build(Some(value))
    }

    /// Closes the chain without a fallback; unmatched rows are null.
    pub fn end(self) -> Expr {
        self.build(None)
    }

    fn build(self, otherwise: Option<Expr>) -> Expr {
        Expr::When {
            cond: Box::new(self.cond),
            then: Box::new(self.then),
            otherwise: otherwise.map(Box::new),
        }
    }
}

impl From<Then> for Expr {
    fn from(t: Then) -> Expr {
        t.end()
    }
}
