//! Single cell values and the missing-value sentinel

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

/// A single value taken from (or destined for) a column.
///
/// Scalars are totally ordered: `Null < Boolean < numeric < String`.
/// `Int64` and `Float64` compare numerically with each other, so
/// `Int64(-1) == Float64(-1.0)`. Float comparison uses `f64::total_cmp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Absent value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit float
    Float64(f64),
    /// UTF-8 string
    String(String),
}

impl Scalar {
    /// Data type this value would be stored as
    pub fn data_type(&self) -> DataType {
        match self {
            Scalar::Null => DataType::Null,
            Scalar::Boolean(_) => DataType::Boolean,
            Scalar::Int64(_) => DataType::Int64,
            Scalar::Float64(_) => DataType::Float64,
            Scalar::String(_) => DataType::String,
        }
    }

    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Check if this value is a float NaN
    pub fn is_nan(&self) -> bool {
        matches!(self, Scalar::Float64(v) if v.is_nan())
    }

    /// Numeric view of this value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int64(v) => Some(*v as f64),
            Scalar::Float64(v) => Some(*v),
            Scalar::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Scalar::Null | Scalar::String(_) => None,
        }
    }

    /// String view of this value, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Boolean(_) => 1,
            Scalar::Int64(_) | Scalar::Float64(_) => 2,
            Scalar::String(_) => 3,
        }
    }
}

impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => Ordering::Equal,
            (Scalar::Boolean(a), Scalar::Boolean(b)) => a.cmp(b),
            (Scalar::Int64(a), Scalar::Int64(b)) => a.cmp(b),
            (Scalar::Float64(a), Scalar::Float64(b)) => a.total_cmp(b),
            (Scalar::Int64(a), Scalar::Float64(b)) => (*a as f64).total_cmp(b),
            (Scalar::Float64(a), Scalar::Int64(b)) => a.total_cmp(&(*b as f64)),
            (Scalar::String(a), Scalar::String(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Boolean(v) => write!(f, "{}", v),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::Float64(v) => write!(f, "{}", v),
            Scalar::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Boolean(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int64(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float64(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

/// Sentinel deciding which cells count as missing.
///
/// Nulls are always missing. With the default `NaN` sentinel float NaN is
/// missing too; with `Value` every cell equal to the sentinel is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MissingValue {
    /// Nulls and float NaN
    #[default]
    NaN,
    /// Nulls and cells equal to this value
    Value(Scalar),
}

impl MissingValue {
    /// Check whether a cell is missing under this sentinel
    pub fn matches(&self, value: &Scalar) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            MissingValue::NaN => value.is_nan(),
            MissingValue::Value(sentinel) => value == sentinel,
        }
    }
}
