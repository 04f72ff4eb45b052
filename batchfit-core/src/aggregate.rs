//! Aggregation catalog and mergeable partial aggregation states

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::column::Column;
use crate::error::{Error, Result};
use crate::record_batch::RecordBatch;
use crate::scalar::Scalar;
use crate::schema::DataType;

/// Aggregate functions understood by every engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggFunc {
    /// Number of non-missing values
    Count,
    /// Sum of non-missing values
    Sum,
    /// Smallest non-missing value
    Min,
    /// Largest non-missing value
    Max,
    /// Exact median of non-missing values
    Median,
}

impl AggFunc {
    /// Data type of the aggregate given the input column's type
    pub fn output_type(self, input: DataType) -> DataType {
        match self {
            AggFunc::Count => DataType::Int64,
            AggFunc::Sum | AggFunc::Median => DataType::Float64,
            AggFunc::Min | AggFunc::Max => input,
        }
    }

    fn check_input(self, column: &str, input: DataType) -> Result<()> {
        let numeric_only = matches!(self, AggFunc::Sum | AggFunc::Median);
        if numeric_only && input == DataType::String {
            return Err(Error::TypeMismatch(format!(
                "{} requires a numeric column, '{}' is {}",
                self, column, input
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
        };
        write!(f, "{}", name)
    }
}

/// One aggregate over one column, written to an output column named `alias`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// Input column
    pub column: String,

    /// Aggregate function
    pub func: AggFunc,

    /// Output column name
    pub alias: String,
}

impl Aggregation {
    /// Create an aggregation with the default alias `<func>_<column>`
    pub fn new(column: &str, func: AggFunc) -> Self {
        Self {
            column: column.to_string(),
            func,
            alias: format!("{}_{}", func, column),
        }
    }

    /// Count of non-missing values
    pub fn count(column: &str) -> Self {
        Self::new(column, AggFunc::Count)
    }

    /// Sum of non-missing values
    pub fn sum(column: &str) -> Self {
        Self::new(column, AggFunc::Sum)
    }

    /// Minimum of non-missing values
    pub fn min(column: &str) -> Self {
        Self::new(column, AggFunc::Min)
    }

    /// Maximum of non-missing values
    pub fn max(column: &str) -> Self {
        Self::new(column, AggFunc::Max)
    }

    /// Exact median of non-missing values
    pub fn median(column: &str) -> Self {
        Self::new(column, AggFunc::Median)
    }

    /// Rename the output column
    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = alias.to_string();
        self
    }
}

/// Partial state of a single aggregate; partials over disjoint rows merge exactly
#[derive(Debug, Clone, PartialEq)]
pub enum AggState {
    /// Running count
    Count(u64),
    /// Running sum
    Sum(f64),
    /// Running minimum
    Min(Option<Scalar>),
    /// Running maximum
    Max(Option<Scalar>),
    /// Collected values for an exact median
    Values(Vec<f64>),
}

impl AggState {
    /// Empty state for a function
    pub fn new(func: AggFunc) -> Self {
        match func {
            AggFunc::Count => AggState::Count(0),
            AggFunc::Sum => AggState::Sum(0.0),
            AggFunc::Min => AggState::Min(None),
            AggFunc::Max => AggState::Max(None),
            AggFunc::Median => AggState::Values(Vec::new()),
        }
    }

    /// Fold one cell into the state; missing cells (null or NaN) are skipped
    pub fn update(&mut self, value: &Scalar) -> Result<()> {
        if value.is_null() || value.is_nan() {
            return Ok(());
        }
        match self {
            AggState::Count(n) => *n += 1,
            AggState::Sum(total) => *total += numeric(value)?,
            AggState::Min(current) => {
                if current.as_ref().map_or(true, |c| value < c) {
                    *current = Some(value.clone());
                }
            }
            AggState::Max(current) => {
                if current.as_ref().map_or(true, |c| value > c) {
                    *current = Some(value.clone());
                }
            }
            AggState::Values(values) => values.push(numeric(value)?),
        }
        Ok(())
    }

    /// Merge a partial state computed over later rows
    pub fn merge(&mut self, other: AggState) -> Result<()> {
        match (self, other) {
            (AggState::Count(a), AggState::Count(b)) => *a += b,
            (AggState::Sum(a), AggState::Sum(b)) => *a += b,
            (AggState::Min(a), AggState::Min(b)) => {
                if let Some(b) = b {
                    if a.as_ref().map_or(true, |a| b < *a) {
                        *a = Some(b);
                    }
                }
            }
            (AggState::Max(a), AggState::Max(b)) => {
                if let Some(b) = b {
                    if a.as_ref().map_or(true, |a| b > *a) {
                        *a = Some(b);
                    }
                }
            }
            (AggState::Values(a), AggState::Values(b)) => a.extend(b),
            (a, b) => {
                return Err(Error::InvalidOperation(format!(
                    "cannot merge aggregate states {:?} and {:?}",
                    a, b
                )))
            }
        }
        Ok(())
    }

    /// Final value of the aggregate
    pub fn finish(self) -> Scalar {
        match self {
            AggState::Count(n) => Scalar::Int64(i64::try_from(n).unwrap_or(i64::MAX)),
            AggState::Sum(total) => Scalar::Float64(total),
            AggState::Min(value) | AggState::Max(value) => value.unwrap_or(Scalar::Null),
            AggState::Values(mut values) => {
                if values.is_empty() {
                    return Scalar::Null;
                }
                values.sort_by(f64::total_cmp);
                let mid = values.len() / 2;
                if values.len() % 2 == 0 {
                    Scalar::Float64((values[mid - 1] + values[mid]) / 2.0)
                } else {
                    Scalar::Float64(values[mid])
                }
            }
        }
    }
}

fn numeric(value: &Scalar) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        Error::TypeMismatch(format!("cannot aggregate non-numeric value '{}'", value))
    })
}

/// Partial states keyed by group, groups ordered by key
pub type GroupStates = BTreeMap<Vec<Scalar>, Vec<AggState>>;

/// Compute partial states for one partition.
///
/// Rows whose key contains a missing value are skipped. Without keys there is
/// exactly one group, present even for zero rows.
pub fn partial_states(
    batch: &RecordBatch,
    keys: &[Column],
    aggs: &[Aggregation],
) -> Result<GroupStates> {
    let inputs = aggs
        .iter()
        .map(|agg| {
            let column = batch.column_by_name(&agg.column)?;
            agg.func.check_input(&agg.column, column.data_type())?;
            Ok(column)
        })
        .collect::<Result<Vec<_>>>()?;

    if keys.iter().any(|k| k.len() != batch.row_count()) {
        return Err(Error::SchemaMismatch(
            "group keys are not aligned with the batch rows".into(),
        ));
    }

    let fresh = || aggs.iter().map(|a| AggState::new(a.func)).collect::<Vec<_>>();
    let mut groups = GroupStates::new();
    if keys.is_empty() {
        groups.insert(Vec::new(), fresh());
    }

    for row in 0..batch.row_count() {
        let key: Vec<Scalar> = keys.iter().map(|k| k.value(row)).collect();
        if key.iter().any(|v| v.is_null() || v.is_nan()) {
            continue;
        }
        let states = groups.entry(key).or_insert_with(fresh);
        for (state, column) in states.iter_mut().zip(inputs.iter()) {
            state.update(&column.value(row))?;
        }
    }

    Ok(groups)
}

/// Merge the partial states of a later partition into `acc`
pub fn merge_states(acc: &mut GroupStates, other: GroupStates) -> Result<()> {
    for (key, states) in other {
        match acc.get_mut(&key) {
            Some(existing) => {
                for (a, b) in existing.iter_mut().zip(states) {
                    a.merge(b)?;
                }
            }
            None => {
                acc.insert(key, states);
            }
        }
    }
    Ok(())
}

/// Build the output batch: one column per key, then one per aggregate
pub fn finish_states(
    groups: GroupStates,
    key_columns: &[(String, DataType)],
    aggs: &[Aggregation],
    input_types: &[DataType],
) -> Result<RecordBatch> {
    let mut key_values: Vec<Vec<Scalar>> = vec![Vec::with_capacity(groups.len()); key_columns.len()];
    let mut agg_values: Vec<Vec<Scalar>> = vec![Vec::with_capacity(groups.len()); aggs.len()];

    for (key, states) in groups {
        for (values, k) in key_values.iter_mut().zip(key) {
            values.push(k);
        }
        for (values, state) in agg_values.iter_mut().zip(states) {
            values.push(state.finish());
        }
    }

    let mut columns = Vec::with_capacity(key_columns.len() + aggs.len());
    for ((name, data_type), values) in key_columns.iter().zip(key_values) {
        columns.push(Column::from_scalars(name, *data_type, &values)?);
    }
    for ((agg, input), values) in aggs.iter().zip(input_types).zip(agg_values) {
        columns.push(Column::from_scalars(
            &agg.alias,
            agg.func.output_type(*input),
            &values,
        )?);
    }

    RecordBatch::from_columns(columns)
}
