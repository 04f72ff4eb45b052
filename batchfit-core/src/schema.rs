//! Column names and types of tables and record batches

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Logical type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// true / false
    Boolean,

    /// 64-bit signed integer
    Int64,

    /// 64-bit float; NaN counts as missing by default
    Float64,

    /// UTF-8 text, used for categorical columns
    String,

    /// Column whose every cell is null
    Null,
}

impl DataType {
    /// Int64 or Float64
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Whether a column of type `other` may stand where `self` was seen.
    ///
    /// Numeric types interchange, and an all-null column fits anywhere.
    pub fn compatible_with(&self, other: &DataType) -> bool {
        self == other
            || (self.is_numeric() && other.is_numeric())
            || *self == DataType::Null
            || *other == DataType::Null
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Boolean => "bool",
            DataType::Int64 => "int64",
            DataType::Float64 => "float64",
            DataType::String => "string",
            DataType::Null => "null",
        };
        f.write_str(name)
    }
}

/// Named, typed column slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Field {
    /// Create a field
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    /// Column name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column type
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = if self.nullable { "?" } else { "" };
        write!(f, "{}: {}{}", self.name, self.data_type, marker)
    }
}

/// Ordered list of fields with name lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,

    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl Schema {
    /// Create a schema; on duplicate names lookups resolve to the last one
    pub fn new(fields: Vec<Field>) -> Self {
        let positions = fields
            .iter()
            .enumerate()
            .map(|(i, field)| (field.name.clone(), i))
            .collect();
        Self { fields, positions }
    }

    /// Fields in column order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field at a position; panics when out of range
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Field with the given name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        Ok(&self.fields[self.index_of(name)?])
    }

    /// Position of a column; `SchemaMismatch` when absent
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| Error::SchemaMismatch(format!("no column named '{}'", name)))
    }

    /// Column names in order
    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no columns
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Schema of the named columns, in the requested order
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let fields = names
            .iter()
            .map(|name| self.field_by_name(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fields))
    }

    /// `SchemaMismatch` unless `other` has the same column names, in order, with compatible types
    pub fn check_compatible(&self, other: &Schema) -> Result<()> {
        if self.names() != other.names() {
            return Err(Error::SchemaMismatch(format!(
                "expected columns {:?}, got {:?}",
                self.names(),
                other.names()
            )));
        }
        let changed = self
            .fields
            .iter()
            .zip(&other.fields)
            .find(|(seen, now)| !seen.data_type.compatible_with(&now.data_type));
        match changed {
            Some((seen, now)) => Err(Error::SchemaMismatch(format!(
                "column '{}' changed type from {} to {}",
                seen.name, seen.data_type, now.data_type
            ))),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", fields.join(", "))
    }
}
