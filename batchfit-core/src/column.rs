//! Column implementation for storing typed vectors of data

use std::fmt;

use crate::error::{Error, Result};
use crate::scalar::{MissingValue, Scalar};
use crate::schema::DataType;

/// Typed storage for the values of a column; `None` marks a null
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Boolean values
    Boolean(Vec<Option<bool>>),
    /// 64-bit signed integers
    Int64(Vec<Option<i64>>),
    /// 64-bit floats (NaN is a value, not a null)
    Float64(Vec<Option<f64>>),
    /// UTF-8 strings
    String(Vec<Option<String>>),
    /// Column of the given length holding only nulls
    Null(usize),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Null(len) => *len,
        }
    }
}

/// A column of data with a specific type
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Name of the column
    name: String,

    /// Typed values
    data: ColumnData,
}

impl Column {
    /// Create a new column with the given name and data
    pub fn new(name: &str, data: ColumnData) -> Self {
        Self {
            name: name.to_string(),
            data,
        }
    }

    /// Create a float column without nulls
    pub fn from_f64(name: &str, values: Vec<f64>) -> Self {
        Self::new(name, ColumnData::Float64(values.into_iter().map(Some).collect()))
    }

    /// Create an integer column without nulls
    pub fn from_i64(name: &str, values: Vec<i64>) -> Self {
        Self::new(name, ColumnData::Int64(values.into_iter().map(Some).collect()))
    }

    /// Create a string column without nulls
    pub fn from_strs(name: &str, values: &[&str]) -> Self {
        Self::new(
            name,
            ColumnData::String(values.iter().map(|s| Some((*s).to_string())).collect()),
        )
    }

    /// Create a string column where `None` is null
    pub fn from_opt_strs(name: &str, values: &[Option<&str>]) -> Self {
        Self::new(
            name,
            ColumnData::String(values.iter().map(|s| s.map(str::to_string)).collect()),
        )
    }

    /// Create a column of the given type from scalar values.
    ///
    /// Nulls are accepted for every type. Integers widen into float
    /// columns; any other mismatch is a `TypeMismatch`.
    pub fn from_scalars(name: &str, data_type: DataType, values: &[Scalar]) -> Result<Self> {
        let mismatch = |v: &Scalar| {
            Error::TypeMismatch(format!(
                "cannot store {} value '{}' in {} column '{}'",
                v.data_type(),
                v,
                data_type,
                name
            ))
        };

        let data = match data_type {
            DataType::Boolean => ColumnData::Boolean(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Null => Ok(None),
                        Scalar::Boolean(b) => Ok(Some(*b)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::Int64 => ColumnData::Int64(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Null => Ok(None),
                        Scalar::Int64(i) => Ok(Some(*i)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::Float64 => ColumnData::Float64(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Null => Ok(None),
                        Scalar::Int64(i) => Ok(Some(*i as f64)),
                        Scalar::Float64(f) => Ok(Some(*f)),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::String => ColumnData::String(
                values
                    .iter()
                    .map(|v| match v {
                        Scalar::Null => Ok(None),
                        Scalar::String(s) => Ok(Some(s.clone())),
                        other => Err(mismatch(other)),
                    })
                    .collect::<Result<_>>()?,
            ),
            DataType::Null => {
                if let Some(v) = values.iter().find(|v| !v.is_null()) {
                    return Err(mismatch(v));
                }
                ColumnData::Null(values.len())
            }
        };

        Ok(Self::new(name, data))
    }

    /// Create a column from scalar values, inferring the narrowest common type
    pub fn infer_from_scalars(name: &str, values: &[Scalar]) -> Result<Self> {
        let mut data_type = DataType::Null;
        for value in values {
            data_type = unify_types(name, data_type, value.data_type())?;
        }
        Self::from_scalars(name, data_type, values)
    }

    /// Concatenate columns vertically; the result takes the first column's name
    pub fn concat(name: &str, columns: &[&Column]) -> Result<Self> {
        let mut data_type = DataType::Null;
        for column in columns {
            data_type = unify_types(name, data_type, column.data_type())?;
        }
        let values: Vec<Scalar> = columns.iter().flat_map(|c| c.iter()).collect();
        Self::from_scalars(name, data_type, &values)
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return this column under a different name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Get the data type of this column
    pub fn data_type(&self) -> DataType {
        match &self.data {
            ColumnData::Boolean(_) => DataType::Boolean,
            ColumnData::Int64(_) => DataType::Int64,
            ColumnData::Float64(_) => DataType::Float64,
            ColumnData::String(_) => DataType::String,
            ColumnData::Null(_) => DataType::Null,
        }
    }

    /// Get the typed values
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Number of values in this column
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if this column has no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of null values
    pub fn null_count(&self) -> usize {
        match &self.data {
            ColumnData::Boolean(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Int64(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Float64(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::String(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Null(len) => *len,
        }
    }

    /// Get the value at the given row
    pub fn value(&self, row: usize) -> Scalar {
        match &self.data {
            ColumnData::Boolean(v) => v[row].map_or(Scalar::Null, Scalar::Boolean),
            ColumnData::Int64(v) => v[row].map_or(Scalar::Null, Scalar::Int64),
            ColumnData::Float64(v) => v[row].map_or(Scalar::Null, Scalar::Float64),
            ColumnData::String(v) => v[row].clone().map_or(Scalar::Null, Scalar::String),
            ColumnData::Null(_) => Scalar::Null,
        }
    }

    /// Iterate over the values as scalars
    pub fn iter(&self) -> impl Iterator<Item = Scalar> + '_ {
        (0..self.len()).map(move |row| self.value(row))
    }

    /// Numeric view of the values; strings are a `TypeMismatch`
    pub fn f64_values(&self) -> Result<Vec<Option<f64>>> {
        match &self.data {
            ColumnData::Float64(v) => Ok(v.clone()),
            ColumnData::Int64(v) => Ok(v.iter().map(|x| x.map(|i| i as f64)).collect()),
            ColumnData::Boolean(v) => Ok(v
                .iter()
                .map(|x| x.map(|b| if b { 1.0 } else { 0.0 }))
                .collect()),
            ColumnData::Null(len) => Ok(vec![None; *len]),
            ColumnData::String(_) => Err(Error::TypeMismatch(format!(
                "column '{}' is not numeric",
                self.name
            ))),
        }
    }

    /// Replace every missing cell with null, keeping the data type
    pub fn mask_missing(&self, missing: &MissingValue) -> Result<Self> {
        if matches!(missing, MissingValue::NaN) {
            if let ColumnData::Float64(v) = &self.data {
                let data = v.iter().map(|x| x.filter(|f| !f.is_nan())).collect();
                return Ok(Self::new(&self.name, ColumnData::Float64(data)));
            }
            return Ok(self.clone());
        }
        let values: Vec<Scalar> = self
            .iter()
            .map(|v| if missing.matches(&v) { Scalar::Null } else { v })
            .collect();
        Self::from_scalars(&self.name, self.data_type(), &values)
    }

    /// Boolean column that is true where the cell is missing
    pub fn missing_mask(&self, missing: &MissingValue) -> Self {
        let mask = self.iter().map(|v| Some(missing.matches(&v))).collect();
        Self::new(&self.name, ColumnData::Boolean(mask))
    }

    /// Slice this column to a range of rows
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset + length > self.len() {
            return Err(Error::IndexOutOfBounds);
        }
        let range = offset..offset + length;
        let data = match &self.data {
            ColumnData::Boolean(v) => ColumnData::Boolean(v[range].to_vec()),
            ColumnData::Int64(v) => ColumnData::Int64(v[range].to_vec()),
            ColumnData::Float64(v) => ColumnData::Float64(v[range].to_vec()),
            ColumnData::String(v) => ColumnData::String(v[range].to_vec()),
            ColumnData::Null(_) => ColumnData::Null(length),
        };
        Ok(Self::new(&self.name, data))
    }

    /// Gather the given rows in order
    pub fn take(&self, rows: &[usize]) -> Result<Self> {
        if rows.iter().any(|&r| r >= self.len()) {
            return Err(Error::IndexOutOfBounds);
        }
        let data = match &self.data {
            ColumnData::Boolean(v) => ColumnData::Boolean(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Int64(v) => ColumnData::Int64(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::Float64(v) => ColumnData::Float64(rows.iter().map(|&r| v[r]).collect()),
            ColumnData::String(v) => {
                ColumnData::String(rows.iter().map(|&r| v[r].clone()).collect())
            }
            ColumnData::Null(_) => ColumnData::Null(rows.len()),
        };
        Ok(Self::new(&self.name, data))
    }
}

/// Widen two column types to a common one
fn unify_types(name: &str, current: DataType, next: DataType) -> Result<DataType> {
    match (current, next) {
        (a, b) if a == b => Ok(a),
        (DataType::Null, b) => Ok(b),
        (a, DataType::Null) => Ok(a),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(DataType::Float64),
        (a, b) => Err(Error::TypeMismatch(format!(
            "column '{}' mixes {} and {} values",
            name, a, b
        ))),
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): [", self.name, self.data_type())?;
        for (i, value) in self.iter().take(10).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        if self.len() > 10 {
            write!(f, ", ... ({} more)", self.len() - 10)?;
        }
        write!(f, "]")
    }
}
