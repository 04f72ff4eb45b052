//! Per-column value counts for most-frequent imputation

use std::collections::BTreeMap;

use batchfit_core::{Aggregation, Error, Result, Scalar, Table};

use super::{ensure_rows, ensure_same_columns};

const COUNT_ALIAS: &str = "__frequency";

/// Count of every non-missing value per column
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyState {
    /// Accumulated columns, in order
    pub columns: Vec<String>,

    /// Value counts per column
    pub counts: Vec<BTreeMap<Scalar, u64>>,
}

impl FrequencyState {
    /// State of a single batch.
    ///
    /// Missing cells must already be null or NaN; they are not counted.
    pub fn update(table: &Table) -> Result<Self> {
        ensure_rows(table, "value frequencies")?;
        let columns = table.column_names();
        let counts = columns
            .iter()
            .map(|name| {
                let out = table.group_by(&[name.as_str()], &[Aggregation::count(name).alias(COUNT_ALIAS)])?;
                let keys = out.column(0)?;
                let totals = out.column_by_name(COUNT_ALIAS)?;
                (0..out.row_count())
                    .map(|row| match totals.value(row) {
                        Scalar::Int64(n) => Ok((keys.value(row), u64::try_from(n).unwrap_or(0))),
                        other => Err(Error::TypeMismatch(format!(
                            "value count is not an integer: {}",
                            other
                        ))),
                    })
                    .collect::<Result<BTreeMap<_, _>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, counts })
    }

    /// Add the counts of a later batch
    pub fn combine(&self, other: &FrequencyState) -> Result<Self> {
        ensure_same_columns(&self.columns, &other.columns)?;
        let counts = self
            .counts
            .iter()
            .zip(&other.counts)
            .map(|(left, right)| {
                let mut merged = left.clone();
                for (value, n) in right {
                    *merged.entry(value.clone()).or_insert(0) += n;
                }
                merged
            })
            .collect();
        Ok(Self {
            columns: self.columns.clone(),
            counts,
        })
    }

    /// Most frequent value per column; among tied values the largest wins.
    ///
    /// `None` for a column without any counted value.
    pub fn most_frequent(&self) -> Vec<Option<Scalar>> {
        self.counts
            .iter()
            .map(|counts| {
                let mut best: Option<(&Scalar, u64)> = None;
                // Ascending key order, so `>=` keeps the largest tied value
                for (value, &n) in counts {
                    if best.map_or(true, |(_, top)| n >= top) {
                        best = Some((value, n));
                    }
                }
                best.map(|(value, _)| value.clone())
            })
            .collect()
    }
}
