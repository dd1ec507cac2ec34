use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;

/// A single dynamically typed value: literals in expressions and per-row reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Boolean(bool),
    Null,
}

impl Scalar {
    /// Dtype a literal of this value broadcasts to.
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Int64(_) => DType::Int64,
            Scalar::Float64(_) => DType::Float64,
            Scalar::Utf8(_) => DType::String,
            Scalar::Boolean(_) => DType::Bool,
            Scalar::Null => DType::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Float64(v) => v.is_nan(),
            _ => false,
        }
    }

    /// Numeric view; booleans map to 0/1, strings and nulls to `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int64(v) => Some(*v as f64),
            Scalar::Float64(v) if !v.is_nan() => Some(*v),
            Scalar::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Unquoted rendering used when casting to string and naming pivot columns.
    pub fn to_plain_string(&self) -> String {
        match self {
            Scalar::Int64(v) => v.to_string(),
            Scalar::Float64(v) => v.to_string(),
            Scalar::Utf8(s) => s.clone(),
            Scalar::Boolean(b) => b.to_string(),
            Scalar::Null => "null".to_string(),
        }
    }
}

/// Canonical form: strings quoted, floats always carry a decimal point so
/// `1` and `1.0` stay distinct keys.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int64(v) => write!(f, "{v}"),
            Scalar::Float64(v) => write!(f, "{v:?}"),
            Scalar::Utf8(s) => write!(f, "{s:?}"),
            Scalar::Boolean(b) => write!(f, "{b}"),
            Scalar::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int64(v as i64)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Utf8(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Utf8(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}
