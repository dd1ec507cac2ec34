use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    new_null_array, Array, ArrayRef, AsArray, BooleanArray, DictionaryArray, Float32Array,
    Float64Array, Int32Array, Int64Array, NullArray, StringArray, UInt32Array,
};
use arrow::compute;
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use skiff_common::{Result, SkiffError};

use crate::dtype::DType;
use crate::scalar::Scalar;

/// Typed backing buffer of a [`Series`], one variant per [`DType`].
#[derive(Clone)]
pub enum ColumnData {
    Float64(Float64Array),
    Float32(Float32Array),
    Int64(Int64Array),
    Int32(Int32Array),
    Bool(BooleanArray),
    String(StringArray),
    /// Dictionary keys are the category codes; values are always a `Utf8` array
    /// without duplicates.
    Categorical(DictionaryArray<Int32Type>),
    Null(NullArray),
}

/// A named, typed, immutable column.
///
/// Every operation returns a new `Series`; arrow buffers are shared, never mutated.
#[derive(Clone)]
pub struct Series {
    name: String,
    data: ColumnData,
}

impl Series {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Wraps an arrow array, normalizing physical types outside the closed dtype set
    /// (narrow/unsigned ints, large strings, other dictionary encodings).
    ///
    /// # Errors
    /// Returns a schema error when the arrow type has no engine dtype.
    pub fn from_array(name: impl Into<String>, array: ArrayRef) -> Result<Self> {
        let name = name.into();
        let data = match array.data_type() {
            DataType::Float64 => ColumnData::Float64(array.as_primitive::<Float64Type>().clone()),
            DataType::Float32 => ColumnData::Float32(array.as_primitive::<Float32Type>().clone()),
            DataType::Int64 => ColumnData::Int64(array.as_primitive::<Int64Type>().clone()),
            DataType::Int32 => ColumnData::Int32(array.as_primitive::<Int32Type>().clone()),
            DataType::Boolean => ColumnData::Bool(array.as_boolean().clone()),
            DataType::Utf8 => ColumnData::String(array.as_string::<i32>().clone()),
            DataType::Dictionary(k, v) if **k == DataType::Int32 && **v == DataType::Utf8 => {
                ColumnData::Categorical(array.as_dictionary::<Int32Type>().clone())
            }
            DataType::Null => ColumnData::Null(NullArray::new(array.len())),
            DataType::Int8
            | DataType::Int16
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => {
                return Self::from_array(name, compute::cast(&array, &DataType::Int64)?);
            }
            DataType::Float16 => {
                return Self::from_array(name, compute::cast(&array, &DataType::Float32)?);
            }
            DataType::LargeUtf8 | DataType::Utf8View => {
                return Self::from_array(name, compute::cast(&array, &DataType::Utf8)?);
            }
            DataType::Dictionary(_, _) => {
                let target = DType::Categorical.to_arrow();
                return Self::from_array(name, compute::cast(&array, &target)?);
            }
            other => {
                return Err(SkiffError::Schema(format!(
                    "unsupported arrow type {other} for column '{name}'"
                )))
            }
        };
        Ok(Self { name, data })
    }

    pub fn from_f64(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Float64(Float64Array::from(values)))
    }

    pub fn from_opt_f64(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Float64(Float64Array::from(values)))
    }

    pub fn from_f32(name: impl Into<String>, values: Vec<f32>) -> Self {
        Self::new(name, ColumnData::Float32(Float32Array::from(values)))
    }

    pub fn from_i64(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self::new(name, ColumnData::Int64(Int64Array::from(values)))
    }

    pub fn from_opt_i64(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        Self::new(name, ColumnData::Int64(Int64Array::from(values)))
    }

    pub fn from_i32(name: impl Into<String>, values: Vec<i32>) -> Self {
        Self::new(name, ColumnData::Int32(Int32Array::from(values)))
    }

    pub fn from_bool(name: impl Into<String>, values: Vec<bool>) -> Self {
        Self::new(name, ColumnData::Bool(BooleanArray::from(values)))
    }

    pub fn from_opt_bool(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnData::Bool(BooleanArray::from(values)))
    }

    pub fn from_strs(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(name, ColumnData::String(StringArray::from(values.to_vec())))
    }

    pub fn from_opt_strs(name: impl Into<String>, values: &[Option<&str>]) -> Self {
        Self::new(name, ColumnData::String(StringArray::from(values.to_vec())))
    }

    pub fn from_opt_strings(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        let array: StringArray = values.into_iter().collect();
        Self::new(name, ColumnData::String(array))
    }

    /// Builds a categorical column; categories are numbered in first-seen order.
    pub fn from_categories<'a>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = Option<&'a str>>,
    ) -> Self {
        let mut lookup: HashMap<&'a str, i32> = HashMap::new();
        let mut categories: Vec<&'a str> = Vec::new();
        let codes: Int32Array = values
            .into_iter()
            .map(|v| {
                v.map(|s| {
                    *lookup.entry(s).or_insert_with(|| {
                        categories.push(s);
                        (categories.len() - 1) as i32
                    })
                })
            })
            .collect();
        let dict = DictionaryArray::<Int32Type>::new(codes, Arc::new(StringArray::from(categories)));
        Self::new(name, ColumnData::Categorical(dict))
    }

    pub fn nulls(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, ColumnData::Null(NullArray::new(len)))
    }

    /// All-null column of a concrete dtype.
    pub fn nulls_of(name: impl Into<String>, dtype: DType, len: usize) -> Result<Self> {
        if dtype == DType::Null {
            return Ok(Self::nulls(name, len));
        }
        Self::from_array(name, new_null_array(&dtype.to_arrow(), len))
    }

    /// Broadcasts a scalar to `len` rows.
    pub fn full(name: impl Into<String>, value: &Scalar, len: usize) -> Self {
        let data = match value {
            Scalar::Int64(v) => ColumnData::Int64(Int64Array::from(vec![*v; len])),
            Scalar::Float64(v) => ColumnData::Float64(Float64Array::from(vec![*v; len])),
            Scalar::Boolean(b) => ColumnData::Bool(BooleanArray::from(vec![*b; len])),
            Scalar::Utf8(s) => {
                ColumnData::String(StringArray::from_iter_values(std::iter::repeat(s).take(len)))
            }
            Scalar::Null => ColumnData::Null(NullArray::new(len)),
        };
        Self::new(name, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: self.data.clone(),
        }
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            ColumnData::Float64(_) => DType::Float64,
            ColumnData::Float32(_) => DType::Float32,
            ColumnData::Int64(_) => DType::Int64,
            ColumnData::Int32(_) => DType::Int32,
            ColumnData::Bool(_) => DType::Bool,
            ColumnData::String(_) => DType::String,
            ColumnData::Categorical(_) => DType::Categorical,
            ColumnData::Null(_) => DType::Null,
        }
    }

    pub fn as_array(&self) -> &dyn Array {
        match &self.data {
            ColumnData::Float64(a) => a,
            ColumnData::Float32(a) => a,
            ColumnData::Int64(a) => a,
            ColumnData::Int32(a) => a,
            ColumnData::Bool(a) => a,
            ColumnData::String(a) => a,
            ColumnData::Categorical(a) => a,
            ColumnData::Null(a) => a,
        }
    }

    pub fn to_array(&self) -> ArrayRef {
        match &self.data {
            ColumnData::Float64(a) => Arc::new(a.clone()),
            ColumnData::Float32(a) => Arc::new(a.clone()),
            ColumnData::Int64(a) => Arc::new(a.clone()),
            ColumnData::Int32(a) => Arc::new(a.clone()),
            ColumnData::Bool(a) => Arc::new(a.clone()),
            ColumnData::String(a) => Arc::new(a.clone()),
            ColumnData::Categorical(a) => Arc::new(a.clone()),
            ColumnData::Null(a) => Arc::new(a.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.as_array().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Null at row `i`; float NaN counts as null.
    pub fn is_null_at(&self, i: usize) -> bool {
        match &self.data {
            ColumnData::Float64(a) => a.is_null(i) || a.value(i).is_nan(),
            ColumnData::Float32(a) => a.is_null(i) || a.value(i).is_nan(),
            ColumnData::Null(_) => true,
            _ => self.as_array().is_null(i),
        }
    }

    pub fn null_count(&self) -> usize {
        match &self.data {
            ColumnData::Float64(_) | ColumnData::Float32(_) => {
                (0..self.len()).filter(|&i| self.is_null_at(i)).count()
            }
            ColumnData::Null(a) => a.len(),
            _ => self.as_array().null_count(),
        }
    }

    /// `true` where the row is null (or NaN).
    pub fn null_mask(&self) -> BooleanArray {
        BooleanArray::from((0..self.len()).map(|i| self.is_null_at(i)).collect::<Vec<_>>())
    }

    /// Float columns with NaN rewritten as real nulls; other columns unchanged.
    pub fn nan_as_null(&self) -> Series {
        match &self.data {
            ColumnData::Float64(a) if a.values().iter().any(|v| v.is_nan()) => {
                let values: Float64Array = (0..a.len())
                    .map(|i| (!self.is_null_at(i)).then(|| a.value(i)))
                    .collect();
                Series::new(self.name.clone(), ColumnData::Float64(values))
            }
            ColumnData::Float32(a) if a.values().iter().any(|v| v.is_nan()) => {
                let values: Float32Array = (0..a.len())
                    .map(|i| (!self.is_null_at(i)).then(|| a.value(i)))
                    .collect();
                Series::new(self.name.clone(), ColumnData::Float32(values))
            }
            _ => self.clone(),
        }
    }

    pub fn get(&self, i: usize) -> Scalar {
        if matches!(self.data, ColumnData::Null(_)) || self.as_array().is_null(i) {
            return Scalar::Null;
        }
        match &self.data {
            ColumnData::Float64(a) => Scalar::Float64(a.value(i)),
            ColumnData::Float32(a) => Scalar::Float64(a.value(i) as f64),
            ColumnData::Int64(a) => Scalar::Int64(a.value(i)),
            ColumnData::Int32(a) => Scalar::Int64(a.value(i) as i64),
            ColumnData::Bool(a) => Scalar::Boolean(a.value(i)),
            ColumnData::String(a) => Scalar::Utf8(a.value(i).to_string()),
            ColumnData::Categorical(_) => self
                .str_at(i)
                .map(|s| Scalar::Utf8(s.to_string()))
                .unwrap_or(Scalar::Null),
            ColumnData::Null(_) => Scalar::Null,
        }
    }

    /// String value for `String`/`Categorical` rows; `None` for nulls and other dtypes.
    pub fn str_at(&self, i: usize) -> Option<&str> {
        match &self.data {
            ColumnData::String(a) => a.is_valid(i).then(|| a.value(i)),
            ColumnData::Categorical(d) => {
                let code = d.key(i)?;
                Some(d.values().as_string::<i32>().value(code))
            }
            _ => None,
        }
    }

    /// Numeric value of a row; booleans map to 0/1. `None` for nulls, NaN and strings.
    pub fn f64_at(&self, i: usize) -> Option<f64> {
        if self.is_null_at(i) {
            return None;
        }
        match &self.data {
            ColumnData::Float64(a) => Some(a.value(i)),
            ColumnData::Float32(a) => Some(a.value(i) as f64),
            ColumnData::Int64(a) => Some(a.value(i) as f64),
            ColumnData::Int32(a) => Some(a.value(i) as f64),
            ColumnData::Bool(a) => Some(if a.value(i) { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Integer value for integer/bool rows.
    pub fn i64_at(&self, i: usize) -> Option<i64> {
        if self.is_null_at(i) {
            return None;
        }
        match &self.data {
            ColumnData::Int64(a) => Some(a.value(i)),
            ColumnData::Int32(a) => Some(a.value(i) as i64),
            ColumnData::Bool(a) => Some(a.value(i) as i64),
            _ => None,
        }
    }

    /// Row values as `f64`; string columns are rejected.
    pub fn to_f64_vec(&self) -> Result<Vec<Option<f64>>> {
        match self.dtype() {
            DType::String | DType::Categorical => Err(SkiffError::Schema(format!(
                "column '{}' of type {} is not numeric",
                self.name,
                self.dtype()
            ))),
            _ => Ok((0..self.len()).map(|i| self.f64_at(i)).collect()),
        }
    }

    /// Raw `f64` buffer, only when the column is Float64.
    pub fn f64_values(&self) -> Option<&[f64]> {
        match &self.data {
            ColumnData::Float64(a) => Some(&a.values()[..]),
            _ => None,
        }
    }

    /// Raw `i64` buffer, only when the column is Int64.
    pub fn i64_values(&self) -> Option<&[i64]> {
        match &self.data {
            ColumnData::Int64(a) => Some(&a.values()[..]),
            _ => None,
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Series {
        let offset = offset.min(self.len());
        let len = len.min(self.len() - offset);
        let data = match &self.data {
            ColumnData::Float64(a) => ColumnData::Float64(a.slice(offset, len)),
            ColumnData::Float32(a) => ColumnData::Float32(a.slice(offset, len)),
            ColumnData::Int64(a) => ColumnData::Int64(a.slice(offset, len)),
            ColumnData::Int32(a) => ColumnData::Int32(a.slice(offset, len)),
            ColumnData::Bool(a) => ColumnData::Bool(a.slice(offset, len)),
            ColumnData::String(a) => ColumnData::String(a.slice(offset, len)),
            ColumnData::Categorical(a) => ColumnData::Categorical(a.slice(offset, len)),
            ColumnData::Null(_) => ColumnData::Null(NullArray::new(len)),
        };
        Series::new(self.name.clone(), data)
    }

    /// Gathers rows by index; a null index yields a null row.
    pub fn take(&self, indices: &UInt32Array) -> Result<Series> {
        if let ColumnData::Null(_) = self.data {
            return Ok(Series::nulls(self.name.clone(), indices.len()));
        }
        let taken = compute::take(self.as_array(), indices, None)?;
        Series::from_array(self.name.clone(), taken)
    }

    /// Keeps rows whose mask value is `true`; null mask entries drop the row.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Series> {
        if mask.len() != self.len() {
            return Err(SkiffError::Schema(format!(
                "filter mask length {} does not match column '{}' length {}",
                mask.len(),
                self.name,
                self.len()
            )));
        }
        if let ColumnData::Null(_) = self.data {
            return Ok(Series::nulls(self.name.clone(), mask.true_count()));
        }
        let filtered = compute::filter(self.as_array(), mask)?;
        Series::from_array(self.name.clone(), filtered)
    }

    /// Appends columns end to end, coercing to a common dtype when they differ.
    /// The result takes the name of the first part.
    pub fn concat(parts: &[&Series]) -> Result<Series> {
        let Some(first) = parts.first() else {
            return Err(SkiffError::Schema("cannot concat zero series".to_string()));
        };
        let target = parts
            .iter()
            .fold(first.dtype(), |acc, s| acc.value_supertype(s.dtype()));
        if target == DType::Null {
            let len = parts.iter().map(|s| s.len()).sum();
            return Ok(Series::nulls(first.name.clone(), len));
        }
        if target == DType::Categorical {
            // Rebuild so the merged dictionary stays duplicate-free.
            let strings: Vec<Option<&str>> = parts
                .iter()
                .copied()
                .flat_map(|s| (0..s.len()).map(move |i| s.str_at(i)))
                .collect();
            return Ok(Series::from_categories(first.name.clone(), strings));
        }
        let cast = parts
            .iter()
            .map(|s| s.cast(target))
            .collect::<Result<Vec<_>>>()?;
        let arrays: Vec<&dyn Array> = cast.iter().map(|s| s.as_array()).collect();
        let joined = compute::concat(&arrays)?;
        Series::from_array(first.name.clone(), joined)
    }

    /// Converts to `target`. Numeric targets go through `f64`; the `String`
    /// target stringifies each element; nulls stay null.
    pub fn cast(&self, target: DType) -> Result<Series> {
        if self.dtype() == target {
            return Ok(self.clone());
        }
        let name = self.name.clone();
        let len = self.len();
        let out = match target {
            DType::Float64 => Series::from_opt_f64(name, self.numeric_for_cast()),
            DType::Float32 => {
                let values: Float32Array = self
                    .numeric_for_cast()
                    .into_iter()
                    .map(|v| v.map(|x| x as f32))
                    .collect();
                Series::new(name, ColumnData::Float32(values))
            }
            DType::Int64 => {
                let values: Int64Array = self
                    .numeric_for_cast()
                    .into_iter()
                    .map(|v| v.map(|x| x.trunc() as i64))
                    .collect();
                Series::new(name, ColumnData::Int64(values))
            }
            DType::Int32 => {
                let values: Int32Array = self
                    .numeric_for_cast()
                    .into_iter()
                    .map(|v| v.map(|x| x.trunc() as i32))
                    .collect();
                Series::new(name, ColumnData::Int32(values))
            }
            DType::Bool => {
                let values: BooleanArray = (0..len)
                    .map(|i| match self.str_at(i) {
                        Some(s) => s.trim().parse::<bool>().ok(),
                        None => self.f64_at(i).map(|x| x != 0.0),
                    })
                    .collect();
                Series::new(name, ColumnData::Bool(values))
            }
            DType::String => Series::from_opt_strings(name, self.plain_strings()),
            DType::Categorical => {
                let strings = self.plain_strings();
                Series::from_categories(name, strings.iter().map(|s| s.as_deref()))
            }
            DType::Null => Series::nulls(name, len),
        };
        Ok(out)
    }

    fn numeric_for_cast(&self) -> Vec<Option<f64>> {
        (0..self.len())
            .map(|i| match self.str_at(i) {
                Some(s) => s.trim().parse::<f64>().ok(),
                None => self.f64_at(i),
            })
            .collect()
    }

    fn plain_strings(&self) -> Vec<Option<String>> {
        (0..self.len())
            .map(|i| {
                let v = self.get(i);
                (!v.is_null()).then(|| v.to_plain_string())
            })
            .collect()
    }

    /// Key equality used by grouping: nulls compare equal to each other,
    /// string-like columns compare by value.
    pub fn eq_at(&self, i: usize, other: &Series, j: usize) -> bool {
        let (a_null, b_null) = (self.is_null_at(i), other.is_null_at(j));
        if a_null || b_null {
            return a_null && b_null;
        }
        self.values_equal(i, other, j)
    }

    /// Key equality used by joins: a null never matches anything.
    pub fn join_eq_at(&self, i: usize, other: &Series, j: usize) -> bool {
        if self.is_null_at(i) || other.is_null_at(j) {
            return false;
        }
        self.values_equal(i, other, j)
    }

    fn values_equal(&self, i: usize, other: &Series, j: usize) -> bool {
        match (&self.data, &other.data) {
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.value(i) == b.value(j),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.value(i) == b.value(j),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.value(i) == b.value(j),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.value(i) == b.value(j),
            (ColumnData::String(a), ColumnData::String(b)) => a.value(i) == b.value(j),
            _ => {
                let (l, r) = (self.dtype(), other.dtype());
                if l.is_string_like() && r.is_string_like() {
                    self.str_at(i) == other.str_at(j)
                } else if l.is_integer() && r.is_integer() {
                    self.i64_at(i) == other.i64_at(j)
                } else if l.is_numeric() && r.is_numeric() {
                    self.f64_at(i) == other.f64_at(j)
                } else {
                    false
                }
            }
        }
    }

    /// Total order across rows of two columns: nulls sort after every value.
    pub fn cmp_at(&self, i: usize, other: &Series, j: usize) -> Ordering {
        match (self.is_null_at(i), other.is_null_at(j)) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        self.cmp_values(i, other, j)
    }

    /// Ordering of two non-null rows.
    pub fn cmp_values(&self, i: usize, other: &Series, j: usize) -> Ordering {
        match (&self.data, &other.data) {
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.value(i).cmp(&b.value(j)),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.value(i).cmp(&b.value(j)),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.value(i).total_cmp(&b.value(j)),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.value(i).cmp(&b.value(j)),
            (ColumnData::String(a), ColumnData::String(b)) => a.value(i).cmp(b.value(j)),
            _ => {
                let (l, r) = (self.dtype(), other.dtype());
                if l.is_string_like() && r.is_string_like() {
                    self.str_at(i).cmp(&other.str_at(j))
                } else if l.is_integer() && r.is_integer() {
                    self.i64_at(i).cmp(&other.i64_at(j))
                } else {
                    match (self.f64_at(i), other.f64_at(j)) {
                        (Some(a), Some(b)) => a.total_cmp(&b),
                        _ => Ordering::Equal,
                    }
                }
            }
        }
    }

    /// Non-decreasing and free of nulls.
    pub fn is_sorted_ascending(&self) -> bool {
        if self.null_count() > 0 {
            return false;
        }
        (1..self.len()).all(|i| self.cmp_values(i - 1, self, i) != Ordering::Greater)
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<Scalar> = (0..self.len()).map(|i| self.get(i)).collect();
        f.debug_struct("Series")
            .field("name", &self.name)
            .field("dtype", &self.dtype())
            .field("values", &values)
            .finish()
    }
}

/// Same name, dtype and row values; NaN and null compare equal.
impl PartialEq for Series {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.dtype() == other.dtype()
            && self.len() == other.len()
            && (0..self.len()).all(|i| self.eq_at(i, other, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn categorical_numbers_categories_in_first_seen_order() {
        let s = Series::from_categories("c", [Some("b"), Some("a"), None, Some("b")]);
        assert_eq!(s.dtype(), DType::Categorical);
        assert_eq!(s.str_at(0), Some("b"));
        assert_eq!(s.str_at(2), None);
        match s.data() {
            ColumnData::Categorical(d) => {
                assert_eq!(d.keys().value(3), 0);
                assert_eq!(d.values().len(), 2);
            }
            _ => panic!("expected categorical data"),
        }
    }

    #[test]
    fn cast_goes_through_f64_and_stringifies() {
        let s = Series::from_f64("x", vec![1.9, -2.5]);
        let ints = s.cast(DType::Int64).expect("cast to int");
        assert_eq!(ints, Series::from_i64("x", vec![1, -2]));

        let strs = Series::from_i64("x", vec![3, 4])
            .cast(DType::String)
            .expect("cast to str");
        assert_eq!(strs, Series::from_strs("x", &["3", "4"]));

        let parsed = Series::from_strs("x", &["1.5", "nope"])
            .cast(DType::Float64)
            .expect("cast from str");
        assert_eq!(parsed, Series::from_opt_f64("x", vec![Some(1.5), None]));
    }

    #[test]
    fn take_with_null_indices_produces_nulls() {
        let s = Series::from_strs("s", &["a", "b"]);
        let idx = UInt32Array::from(vec![Some(1), None, Some(0)]);
        let out = s.take(&idx).expect("take");
        assert_eq!(out, Series::from_opt_strs("s", &[Some("b"), None, Some("a")]));
    }

    #[test]
    fn take_preserves_categorical_dictionary() {
        let s = Series::from_categories("c", [Some("x"), Some("y")]);
        let out = s.take(&UInt32Array::from(vec![1, 1, 0])).expect("take");
        assert_eq!(out.dtype(), DType::Categorical);
        assert_eq!(out.str_at(0), Some("y"));
        assert_eq!(out.str_at(2), Some("x"));
    }

    #[test]
    fn join_equality_rejects_nulls_but_grouping_accepts_them() {
        let a = Series::from_opt_i64("a", vec![None, Some(1)]);
        let b = Series::from_opt_i64("b", vec![None, Some(1)]);
        assert!(a.eq_at(0, &b, 0));
        assert!(!a.join_eq_at(0, &b, 0));
        assert!(a.join_eq_at(1, &b, 1));
    }

    #[test]
    fn categorical_compares_by_string_across_dictionaries() {
        let a = Series::from_categories("a", [Some("x"), Some("y")]);
        let b = Series::from_categories("b", [Some("y"), Some("x")]);
        assert!(a.join_eq_at(0, &b, 1));
        let s = Series::from_strs("s", &["y"]);
        assert!(a.join_eq_at(1, &s, 0));
    }

    #[test]
    fn nulls_sort_last() {
        let s = Series::from_opt_f64("f", vec![None, Some(1.0), Some(f64::NAN)]);
        assert_eq!(s.cmp_at(0, &s, 1), Ordering::Greater);
        assert_eq!(s.cmp_at(2, &s, 0), Ordering::Equal);
        assert!(!s.is_sorted_ascending());
        assert!(Series::from_i64("i", vec![1, 1, 3]).is_sorted_ascending());
    }

    #[test]
    fn concat_promotes_mixed_numeric_types() {
        let a = Series::from_i32("v", vec![1]);
        let b = Series::from_f64("v", vec![2.5]);
        let out = Series::concat(&[&a, &b]).expect("concat");
        assert_eq!(out, Series::from_f64("v", vec![1.0, 2.5]));
    }

    #[test]
    fn from_array_normalizes_unsigned_ints() {
        let arr: ArrayRef = Arc::new(arrow::array::UInt8Array::from(vec![1u8, 2]));
        let s = Series::from_array("u", arr).expect("from array");
        assert_eq!(s, Series::from_i64("u", vec![1, 2]));
    }
}
