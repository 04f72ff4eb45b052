//! Per-column range accumulator for min-max scaling

use batchfit_core::{Aggregation, Result, Table};

use super::{aggregate_f64, ensure_numeric, ensure_rows, ensure_same_columns};

/// Per-column minimum and maximum, ignoring missing values
#[derive(Debug, Clone, PartialEq)]
pub struct RangeState {
    /// Accumulated columns, in order
    pub columns: Vec<String>,

    /// Column minimums; NaN for a column without values
    pub data_min: Vec<f64>,

    /// Column maximums; NaN for a column without values
    pub data_max: Vec<f64>,

    /// Rows seen so far
    pub n_samples_seen: u64,
}

impl RangeState {
    /// State of a single batch
    pub fn update(table: &Table) -> Result<Self> {
        ensure_rows(table, "a range")?;
        ensure_numeric(table)?;

        let columns = table.column_names();
        let aggs: Vec<Aggregation> = columns
            .iter()
            .enumerate()
            .flat_map(|(i, name)| {
                [
                    Aggregation::min(name).alias(&format!("min_{}", i)),
                    Aggregation::max(name).alias(&format!("max_{}", i)),
                ]
            })
            .collect();
        let out = table.aggregate(&aggs)?;

        let mut data_min = Vec::with_capacity(columns.len());
        let mut data_max = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            data_min.push(aggregate_f64(&out, &format!("min_{}", i))?);
            data_max.push(aggregate_f64(&out, &format!("max_{}", i))?);
        }

        Ok(Self {
            columns,
            data_min,
            data_max,
            n_samples_seen: table.row_count() as u64,
        })
    }

    /// Merge with the state of a later batch
    pub fn combine(&self, other: &RangeState) -> Result<Self> {
        ensure_same_columns(&self.columns, &other.columns)?;
        Ok(Self {
            columns: self.columns.clone(),
            // f64::min/max return the non-NaN operand
            data_min: self
                .data_min
                .iter()
                .zip(&other.data_min)
                .map(|(a, b)| a.min(*b))
                .collect(),
            data_max: self
                .data_max
                .iter()
                .zip(&other.data_max)
                .map(|(a, b)| a.max(*b))
                .collect(),
            n_samples_seen: self.n_samples_seen + other.n_samples_seen,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::testing::{chunks, close, table};
    use batchfit_core::{Backend, Column, Error, RecordBatch};
    use proptest::prelude::*;

    #[test]
    fn test_update_ignores_nan() {
        let state = RangeState::update(&table(
            Backend::InMemory,
            vec![Column::from_f64("a", vec![3.0, f64::NAN, -2.0])],
        ))
        .unwrap();
        assert_eq!(state.data_min, vec![-2.0]);
        assert_eq!(state.data_max, vec![3.0]);
        assert_eq!(state.n_samples_seen, 3);
    }

    #[test]
    fn test_rejects_string_columns_and_empty_batches() {
        let strings = table(Backend::InMemory, vec![Column::from_strs("s", &["a"])]);
        assert!(matches!(RangeState::update(&strings), Err(Error::TypeMismatch(_))));

        let empty = table(Backend::InMemory, vec![Column::from_f64("a", vec![])]);
        assert!(matches!(RangeState::update(&empty), Err(Error::EmptyBatch(_))));
    }

    #[test]
    fn test_combine_requires_same_columns() {
        let a = RangeState::update(&table(Backend::InMemory, vec![Column::from_f64("a", vec![1.0])]))
            .unwrap();
        let b = RangeState::update(&table(Backend::InMemory, vec![Column::from_f64("b", vec![1.0])]))
            .unwrap();
        assert!(matches!(a.combine(&b), Err(Error::SchemaMismatch(_))));
    }

    proptest! {
        #[test]
        fn prop_partition_invariance(
            values in prop::collection::vec(-1e6f64..1e6, 2..60),
            cut in 1usize..59,
        ) {
            let cut = cut.min(values.len() - 1);
            let batch = RecordBatch::from_columns(vec![Column::from_f64("x", values.clone())]).unwrap();
            let whole = RangeState::update(&batchfit_core::Table::in_memory(batch.clone())).unwrap();

            let parts = chunks(&batch, &[cut, values.len() - cut]);
            let left = RangeState::update(&batchfit_core::Table::distributed(parts[0].clone(), 2).unwrap()).unwrap();
            let right = RangeState::update(&batchfit_core::Table::in_memory(parts[1].clone())).unwrap();
            let merged = left.combine(&right).unwrap();

            prop_assert!(close(merged.data_min[0], whole.data_min[0]));
            prop_assert!(close(merged.data_max[0], whole.data_max[0]));
            prop_assert_eq!(merged.n_samples_seen, whole.n_samples_seen);
        }
    }
}
