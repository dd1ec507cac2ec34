use std::collections::HashSet;

use arrow::array::{BooleanArray, UInt32Array};
use skiff_common::{Result, SkiffError};

use crate::dtype::DType;
use crate::kernels;
use crate::scalar::Scalar;
use crate::series::Series;

/// Largest frame height. Row indices are carried as `u32` by gathers, hash
/// buckets and join match lists, and two frames' rows must still be
/// addressable together (coalesced join keys, `when`/`fill_null` picks).
pub const MAX_ROWS: usize = (u32::MAX / 2) as usize;

/// Ordered, uniquely named columns sharing one height, at most [`MAX_ROWS`].
///
/// Immutable: every transformation returns a new frame that shares the
/// untouched column buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    columns: Vec<Series>,
    height: usize,
}

impl DataFrame {
    /// # Errors
    /// Duplicate column names, columns of different length or a height past
    /// [`MAX_ROWS`].
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        let height = columns.first().map_or(0, Series::len);
        if height > MAX_ROWS {
            return Err(SkiffError::Schema(format!(
                "frame of {height} rows exceeds the {MAX_ROWS} row limit"
            )));
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for s in &columns {
            if !seen.insert(s.name()) {
                return Err(SkiffError::Schema(format!(
                    "duplicate column name '{}'",
                    s.name()
                )));
            }
            if s.len() != height {
                return Err(SkiffError::Schema(format!(
                    "column '{}' has {} rows, expected {height}",
                    s.name(),
                    s.len()
                )));
            }
        }
        Ok(Self { columns, height })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Series] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn schema(&self) -> Vec<(String, DType)> {
        self.columns
            .iter()
            .map(|s| (s.name().to_string(), s.dtype()))
            .collect()
    }

    pub fn get_column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|s| s.name() == name)
    }

    pub fn column(&self, name: &str) -> Result<&Series> {
        self.get_column(name)
            .ok_or_else(|| SkiffError::Schema(format!("column '{name}' not found")))
    }

    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<DataFrame> {
        let columns = names
            .iter()
            .map(|n| self.column(n.as_ref()).cloned())
            .collect::<Result<Vec<_>>>()?;
        let height = if columns.is_empty() { self.height } else { 0 };
        let mut out = DataFrame::new(columns)?;
        if out.columns.is_empty() {
            out.height = height;
        }
        Ok(out)
    }

    /// Replaces the column of the same name in place, or appends it.
    pub fn with_column(&self, series: Series) -> Result<DataFrame> {
        if !self.columns.is_empty() && series.len() != self.height {
            return Err(SkiffError::Schema(format!(
                "column '{}' has {} rows, frame has {}",
                series.name(),
                series.len(),
                self.height
            )));
        }
        let mut columns = self.columns.clone();
        match columns.iter().position(|s| s.name() == series.name()) {
            Some(i) => columns[i] = series,
            None => columns.push(series),
        }
        DataFrame::new(columns)
    }

    /// Row-wise concatenation; `other` must have the same column names in order.
    pub fn vstack(&self, other: &DataFrame) -> Result<DataFrame> {
        if self.column_names() != other.column_names() {
            return Err(SkiffError::Schema(format!(
                "vstack column mismatch: {:?} vs {:?}",
                self.column_names(),
                other.column_names()
            )));
        }
        let columns = self
            .columns
            .iter()
            .zip(other.columns.iter())
            .map(|(a, b)| Series::concat(&[a, b]))
            .collect::<Result<Vec<_>>>()?;
        let mut out = DataFrame::new(columns)?;
        out.height = self.height + other.height;
        Ok(out)
    }

    /// Keeps rows where `mask` is `true`.
    pub fn filter(&self, mask: &BooleanArray) -> Result<DataFrame> {
        if mask.len() != self.height {
            return Err(SkiffError::Schema(format!(
                "filter mask has {} rows, frame has {}",
                mask.len(),
                self.height
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|s| s.filter(mask))
            .collect::<Result<Vec<_>>>()?;
        let mut out = DataFrame::new(columns)?;
        out.height = mask.true_count();
        Ok(out)
    }

    pub fn take(&self, indices: &UInt32Array) -> Result<DataFrame> {
        let columns = self
            .columns
            .iter()
            .map(|s| s.take(indices))
            .collect::<Result<Vec<_>>>()?;
        let mut out = DataFrame::new(columns)?;
        out.height = indices.len();
        Ok(out)
    }

    pub fn slice(&self, offset: usize, len: usize) -> DataFrame {
        let offset = offset.min(self.height);
        let len = len.min(self.height - offset);
        DataFrame {
            columns: self.columns.iter().map(|s| s.slice(offset, len)).collect(),
            height: len,
        }
    }

    pub fn head(&self, n: usize) -> DataFrame {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> DataFrame {
        let n = n.min(self.height);
        self.slice(self.height - n, n)
    }

    /// Stable multi-key sort; nulls last in both directions.
    pub fn sort_by<S: AsRef<str>>(&self, by: &[S], descending: &[bool]) -> Result<DataFrame> {
        if by.len() != descending.len() {
            return Err(SkiffError::Planning(format!(
                "sort got {} keys but {} directions",
                by.len(),
                descending.len()
            )));
        }
        let keys = by
            .iter()
            .map(|n| self.column(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let order = kernels::argsort_multi(&keys, descending);
        self.take(&UInt32Array::from(order))
    }

    pub fn row(&self, i: usize) -> Vec<Scalar> {
        self.columns.iter().map(|s| s.get(i)).collect()
    }
}
