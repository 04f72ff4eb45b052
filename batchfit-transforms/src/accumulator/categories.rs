//! Per-column distinct values for categorical encoders

use std::collections::BTreeSet;

use batchfit_core::{Result, Scalar, Table};

use super::{ensure_rows, ensure_same_columns};

/// Distinct values per column in first-occurrence order
#[derive(Debug, Clone, PartialEq)]
pub struct CategoriesState {
    /// Accumulated columns, in order
    pub columns: Vec<String>,

    /// Distinct values per column, nulls included
    pub values: Vec<Vec<Scalar>>,
}

impl CategoriesState {
    /// State of a single batch
    pub fn update(table: &Table) -> Result<Self> {
        ensure_rows(table, "categories")?;
        let columns = table.column_names();
        let values = columns
            .iter()
            .map(|name| table.distinct(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, values })
    }

    /// Union with the values of a later batch, keeping first-occurrence order
    pub fn combine(&self, other: &CategoriesState) -> Result<Self> {
        ensure_same_columns(&self.columns, &other.columns)?;
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(left, right)| {
                let mut seen: BTreeSet<&Scalar> = left.iter().collect();
                let mut merged = left.clone();
                for value in right {
                    if seen.insert(value) {
                        merged.push(value.clone());
                    }
                }
                merged
            })
            .collect();
        Ok(Self {
            columns: self.columns.clone(),
            values,
        })
    }

    /// Sorted categories per column, null last
    pub fn sorted(&self) -> Vec<Vec<Scalar>> {
        self.values
            .iter()
            .map(|values| {
                let mut sorted = values.clone();
                sorted.sort_by(|a, b| a.is_null().cmp(&b.is_null()).then_with(|| a.cmp(b)));
                sorted
            })
            .collect()
    }
}
