//! Per-column first and second moments, merged with the pairwise update of
//! Chan, Golub and LeVeque

use batchfit_core::{Aggregation, Column, RecordBatch, Result, Table};

use super::{aggregate_count, aggregate_f64, ensure_numeric, ensure_rows, ensure_same_columns};

/// Per-column count, mean and sum of squared deviations of non-missing values
#[derive(Debug, Clone, PartialEq)]
pub struct MomentsState {
    /// Accumulated columns, in order
    pub columns: Vec<String>,

    /// Non-missing values per column
    pub count: Vec<u64>,

    /// Mean per column; NaN while the count is zero
    pub mean: Vec<f64>,

    /// Sum of squared deviations from the mean per column
    pub m2: Vec<f64>,

    /// Rows seen so far, missing or not
    pub n_samples_seen: u64,
}

impl MomentsState {
    /// State of a single batch, in two passes over the table.
    ///
    /// Missing cells must already be null or NaN.
    pub fn update(table: &Table) -> Result<Self> {
        ensure_rows(table, "moments")?;
        ensure_numeric(table)?;

        let columns = table.column_names();
        let first: Vec<Aggregation> = columns
            .iter()
            .enumerate()
            .flat_map(|(i, name)| {
                [
                    Aggregation::sum(name).alias(&format!("sum_{}", i)),
                    Aggregation::count(name).alias(&format!("count_{}", i)),
                ]
            })
            .collect();
        let out = table.aggregate(&first)?;

        let mut count = Vec::with_capacity(columns.len());
        let mut mean = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let n = aggregate_count(&out, &format!("count_{}", i))?;
            let sum = aggregate_f64(&out, &format!("sum_{}", i))?;
            count.push(n);
            mean.push(if n == 0 { f64::NAN } else { sum / n as f64 });
        }

        let centered = {
            let mean = mean.clone();
            table.map_batches(move |batch| squared_deviations(batch, &mean))?
        };
        let second: Vec<Aggregation> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| Aggregation::sum(name).alias(&format!("m2_{}", i)))
            .collect();
        let out = centered.aggregate(&second)?;
        let m2 = (0..columns.len())
            .map(|i| aggregate_f64(&out, &format!("m2_{}", i)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            columns,
            count,
            mean,
            m2,
            n_samples_seen: table.row_count() as u64,
        })
    }

    /// Merge with the state of a later batch
    pub fn combine(&self, other: &MomentsState) -> Result<Self> {
        ensure_same_columns(&self.columns, &other.columns)?;

        let width = self.columns.len();
        let mut count = Vec::with_capacity(width);
        let mut mean = Vec::with_capacity(width);
        let mut m2 = Vec::with_capacity(width);
        for i in 0..width {
            let (na, nb) = (self.count[i], other.count[i]);
            if na == 0 {
                count.push(nb);
                mean.push(other.mean[i]);
                m2.push(other.m2[i]);
                continue;
            }
            if nb == 0 {
                count.push(na);
                mean.push(self.mean[i]);
                m2.push(self.m2[i]);
                continue;
            }
            let n = (na + nb) as f64;
            let (fa, fb) = (na as f64, nb as f64);
            let delta = other.mean[i] - self.mean[i];
            count.push(na + nb);
            mean.push(self.mean[i] + delta * fb / n);
            m2.push(self.m2[i] + other.m2[i] + delta * delta * fa * fb / n);
        }

        Ok(Self {
            columns: self.columns.clone(),
            count,
            mean,
            m2,
            n_samples_seen: self.n_samples_seen + other.n_samples_seen,
        })
    }

    /// Population variance per column; NaN while the count is zero
    pub fn variance(&self) -> Vec<f64> {
        self.m2
            .iter()
            .zip(&self.count)
            .map(|(m2, &n)| if n == 0 { f64::NAN } else { m2 / n as f64 })
            .collect()
    }
}

fn squared_deviations(batch: &RecordBatch, mean: &[f64]) -> Result<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .zip(mean)
        .map(|(column, &mean)| {
            let values = column.f64_values()?;
            let data = values
                .into_iter()
                .map(|v| v.map(|x| (x - mean) * (x - mean)))
                .collect();
            Ok(Column::new(column.name(), batchfit_core::ColumnData::Float64(data)))
        })
        .collect::<Result<Vec<_>>>()?;
    RecordBatch::from_columns(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::testing::{chunks, close, table};
    use batchfit_core::{Backend, Error};
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(Backend::InMemory ; "in memory")]
    #[test_case(Backend::Distributed ; "distributed")]
    fn test_update_skips_missing(backend: Backend) {
        let state = MomentsState::update(&table(
            backend,
            vec![Column::new(
                "a",
                batchfit_core::ColumnData::Float64(vec![Some(1.0), None, Some(3.0), Some(f64::NAN), Some(5.0)]),
            )],
        ))
        .unwrap();
        assert_eq!(state.count, vec![3]);
        assert!(close(state.mean[0], 3.0));
        assert!(close(state.m2[0], 8.0));
        assert_eq!(state.n_samples_seen, 5);
    }

    #[test]
    fn test_string_column_is_type_mismatch() {
        let strings = table(Backend::InMemory, vec![Column::from_strs("s", &["a", "b"])]);
        assert!(matches!(MomentsState::update(&strings), Err(Error::TypeMismatch(_))));
    }

    #[test]
    fn test_combine_with_all_missing_side() {
        let full = MomentsState::update(&table(
            Backend::InMemory,
            vec![Column::from_f64("a", vec![2.0, 4.0])],
        ))
        .unwrap();
        let empty = MomentsState::update(&table(
            Backend::InMemory,
            vec![Column::from_f64("a", vec![f64::NAN])],
        ))
        .unwrap();
        let merged = empty.combine(&full).unwrap();
        assert_eq!(merged.count, vec![2]);
        assert!(close(merged.mean[0], 3.0));
        assert_eq!(merged.n_samples_seen, 3);
    }

    proptest! {
        #[test]
        fn prop_partition_invariance(
            values in prop::collection::vec(-1e3f64..1e3, 3..80),
            a in 1usize..40,
            b in 1usize..40,
        ) {
            let n = values.len();
            let a = a.min(n - 2);
            let b = b.min(n - a - 1);
            let batch = RecordBatch::from_columns(vec![Column::from_f64("x", values)]).unwrap();
            let whole = MomentsState::update(&Table::in_memory(batch.clone())).unwrap();

            let merged = chunks(&batch, &[a, b, n - a - b])
                .into_iter()
                .map(|part| MomentsState::update(&Table::distributed(part, 2).unwrap()).unwrap())
                .reduce(|acc, next| acc.combine(&next).unwrap())
                .unwrap();

            prop_assert!(close(merged.mean[0], whole.mean[0]));
            prop_assert!((merged.variance()[0] - whole.variance()[0]).abs()
                <= 1e-6 * whole.variance()[0].max(1.0));
        }
    }
}
