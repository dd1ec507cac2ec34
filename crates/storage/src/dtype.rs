use std::fmt;

use arrow_schema::DataType;
use serde::{Deserialize, Serialize};

/// Closed set of column types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Float64,
    Float32,
    Int64,
    Int32,
    Bool,
    String,
    /// Dictionary-encoded string: shared category dictionary plus per-row `i32` codes.
    Categorical,
    Null,
}

impl DType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DType::Float64 | DType::Float32 | DType::Int64 | DType::Int32
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float64 | DType::Float32)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DType::Int64 | DType::Int32)
    }

    /// String-like types compare and hash by their string value in joins.
    pub fn is_string_like(self) -> bool {
        matches!(self, DType::String | DType::Categorical)
    }

    /// Arrow physical type backing this dtype.
    pub fn to_arrow(self) -> DataType {
        match self {
            DType::Float64 => DataType::Float64,
            DType::Float32 => DataType::Float32,
            DType::Int64 => DataType::Int64,
            DType::Int32 => DataType::Int32,
            DType::Bool => DataType::Boolean,
            DType::String => DataType::Utf8,
            DType::Categorical => {
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
            }
            DType::Null => DataType::Null,
        }
    }

    /// Result type of `+ - *` between two numeric dtypes.
    ///
    /// Returns `None` when either side is not numeric.
    pub fn arithmetic_supertype(self, other: DType) -> Option<DType> {
        if !self.is_numeric() || !other.is_numeric() {
            return None;
        }
        Some(match (self, other) {
            (DType::Int32, DType::Int32) => DType::Int32,
            (DType::Float32, DType::Float32) => DType::Float32,
            (a, b) if a.is_integer() && b.is_integer() => DType::Int64,
            _ => DType::Float64,
        })
    }

    /// Common type two value branches are coerced to (when/then, coalesce, fill_null).
    pub fn value_supertype(self, other: DType) -> DType {
        match (self, other) {
            (a, b) if a == b => a,
            (DType::Null, b) => b,
            (a, DType::Null) => a,
            (a, b) if a.is_numeric() && b.is_numeric() => {
                a.arithmetic_supertype(b).unwrap_or(DType::Float64)
            }
            (DType::Bool, b) if b.is_numeric() => b,
            (a, DType::Bool) if a.is_numeric() => a,
            _ => DType::String,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Float64 => "f64",
            DType::Float32 => "f32",
            DType::Int64 => "i64",
            DType::Int32 => "i32",
            DType::Bool => "bool",
            DType::String => "str",
            DType::Categorical => "cat",
            DType::Null => "null",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::DType;

    #[test]
    fn arithmetic_promotion() {
        assert_eq!(
            DType::Int32.arithmetic_supertype(DType::Int32),
            Some(DType::Int32)
        );
        assert_eq!(
            DType::Int32.arithmetic_supertype(DType::Int64),
            Some(DType::Int64)
        );
        assert_eq!(
            DType::Float32.arithmetic_supertype(DType::Int64),
            Some(DType::Float64)
        );
        assert_eq!(DType::String.arithmetic_supertype(DType::Int64), None);
    }

    #[test]
    fn value_supertype_prefers_non_null_side() {
        assert_eq!(DType::Null.value_supertype(DType::Int64), DType::Int64);
        assert_eq!(DType::String.value_supertype(DType::Int64), DType::String);
        assert_eq!(
            DType::Categorical.value_supertype(DType::Categorical),
            DType::Categorical
        );
    }
}
