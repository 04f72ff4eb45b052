//! Mergeable sufficient statistics.
//!
//! Every accumulator is built from one batch through the [`Table`] adapter
//! (`update`) and merged with the state of earlier batches (`combine`).
//! `combine` is associative, so any partitioning of the rows yields the same
//! final state up to floating-point summation order.

mod categories;
mod frequency;
mod moments;
mod range;
mod univariate;

pub use categories::CategoriesState;
pub use frequency::FrequencyState;
pub use moments::MomentsState;
pub use range::RangeState;
pub use univariate::{ClassStats, UnivariateState};

use batchfit_core::{DataType, Error, RecordBatch, Result, Table};

/// Accumulator state of any operator
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorState {
    /// Per-column minimum and maximum
    Range(RangeState),
    /// Per-column count, mean and sum of squared deviations
    Moments(MomentsState),
    /// Per-column distinct values
    Categories(CategoriesState),
    /// Per-column value counts
    Frequency(FrequencyState),
    /// Per-class feature sums for ANOVA F scores
    Univariate(UnivariateState),
}

impl AccumulatorState {
    /// Short name of the state kind
    pub fn kind(&self) -> &'static str {
        match self {
            AccumulatorState::Range(_) => "range",
            AccumulatorState::Moments(_) => "moments",
            AccumulatorState::Categories(_) => "categories",
            AccumulatorState::Frequency(_) => "frequency",
            AccumulatorState::Univariate(_) => "univariate",
        }
    }

    /// Columns this state was accumulated over
    pub fn columns(&self) -> &[String] {
        match self {
            AccumulatorState::Range(s) => &s.columns,
            AccumulatorState::Moments(s) => &s.columns,
            AccumulatorState::Categories(s) => &s.columns,
            AccumulatorState::Frequency(s) => &s.columns,
            AccumulatorState::Univariate(s) => &s.columns,
        }
    }

    /// Merge with the state of a later batch
    pub fn combine(&self, other: &AccumulatorState) -> Result<AccumulatorState> {
        match (self, other) {
            (AccumulatorState::Range(a), AccumulatorState::Range(b)) => {
                a.combine(b).map(AccumulatorState::Range)
            }
            (AccumulatorState::Moments(a), AccumulatorState::Moments(b)) => {
                a.combine(b).map(AccumulatorState::Moments)
            }
            (AccumulatorState::Categories(a), AccumulatorState::Categories(b)) => {
                a.combine(b).map(AccumulatorState::Categories)
            }
            (AccumulatorState::Frequency(a), AccumulatorState::Frequency(b)) => {
                a.combine(b).map(AccumulatorState::Frequency)
            }
            (AccumulatorState::Univariate(a), AccumulatorState::Univariate(b)) => {
                a.combine(b).map(AccumulatorState::Univariate)
            }
            (a, b) => Err(Error::InvalidOperation(format!(
                "cannot combine a {} accumulator with a {} accumulator",
                a.kind(),
                b.kind()
            ))),
        }
    }

    /// Fold one more table into `current` with the owning operator's `update`.
    ///
    /// The first table must yield a statistic. A later table without rows
    /// leaves the state unchanged once its columns match.
    pub fn accumulate<F>(
        current: Option<&AccumulatorState>,
        table: &Table,
        update: F,
    ) -> Result<AccumulatorState>
    where
        F: FnOnce(&Table) -> Result<AccumulatorState>,
    {
        let Some(current) = current else {
            return update(table);
        };
        if table.row_count() > 0 {
            return current.combine(&update(table)?);
        }

        ensure_same_columns(current.columns(), &table.column_names())?;
        if matches!(
            current,
            AccumulatorState::Range(_) | AccumulatorState::Moments(_) | AccumulatorState::Univariate(_)
        ) {
            ensure_numeric(table)?;
        }
        Ok(current.clone())
    }
}

/// Fail with `EmptyBatch` on a table without rows
pub(crate) fn ensure_rows(table: &Table, what: &str) -> Result<()> {
    if table.row_count() == 0 {
        return Err(Error::EmptyBatch(format!(
            "cannot accumulate {} over a batch with no rows",
            what
        )));
    }
    Ok(())
}

/// Fail with `TypeMismatch` if any column is a string column
pub(crate) fn ensure_numeric(table: &Table) -> Result<()> {
    let schema = table.schema();
    match schema
        .fields()
        .iter()
        .find(|f| *f.data_type() == DataType::String)
    {
        Some(field) => Err(Error::TypeMismatch(format!(
            "column '{}' is a string column, a numeric column is required",
            field.name()
        ))),
        None => Ok(()),
    }
}

/// Fail with `SchemaMismatch` unless both states cover the same columns
pub(crate) fn ensure_same_columns(left: &[String], right: &[String]) -> Result<()> {
    if left != right {
        return Err(Error::SchemaMismatch(format!(
            "expected columns {:?}, got {:?}",
            left, right
        )));
    }
    Ok(())
}

/// Numeric value of an aggregate output cell; null (no values) reads as NaN
pub(crate) fn aggregate_f64(out: &RecordBatch, alias: &str) -> Result<f64> {
    Ok(out
        .column_by_name(alias)?
        .value(0)
        .as_f64()
        .unwrap_or(f64::NAN))
}

/// Integer value of a count cell
pub(crate) fn aggregate_count(out: &RecordBatch, alias: &str) -> Result<u64> {
    let value = out.column_by_name(alias)?.value(0);
    match value {
        batchfit_core::Scalar::Int64(n) => u64::try_from(n)
            .map_err(|_| Error::InvalidOperation(format!("negative count in '{}'", alias))),
        other => Err(Error::TypeMismatch(format!(
            "count '{}' is not an integer: {}",
            alias, other
        ))),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use batchfit_core::{Backend, Column, RecordBatch, Table};

    /// Split a batch into contiguous chunks of the given sizes
    pub fn chunks(batch: &RecordBatch, sizes: &[usize]) -> Vec<RecordBatch> {
        let mut offset = 0;
        sizes
            .iter()
            .map(|&size| {
                let chunk = batch.slice(offset, size).unwrap();
                offset += size;
                chunk
            })
            .collect()
    }

    /// Table over the given columns on a backend
    pub fn table(backend: Backend, columns: Vec<Column>) -> Table {
        let batch = RecordBatch::from_columns(columns).unwrap();
        match backend {
            Backend::InMemory => Table::in_memory(batch),
            Backend::Distributed => Table::distributed(batch, 3).unwrap(),
        }
    }

    /// Relative closeness within 1e-6, NaN equal to NaN
    pub fn close(a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return a.is_nan() && b.is_nan();
        }
        (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::table;
    use super::*;
    use batchfit_core::{Backend, Column};

    fn numbers(values: Vec<f64>) -> Table {
        table(Backend::InMemory, vec![Column::from_f64("x", values)])
    }

    fn range(table: &Table) -> Result<AccumulatorState> {
        RangeState::update(table).map(AccumulatorState::Range)
    }

    #[test]
    fn test_combine_rejects_mismatched_kinds() {
        let range = range(&numbers(vec![1.0, 2.0])).unwrap();
        let moments = AccumulatorState::Moments(MomentsState::update(&numbers(vec![1.0])).unwrap());
        assert_eq!(range.kind(), "range");
        assert!(matches!(range.combine(&moments), Err(Error::InvalidOperation(_))));
        assert!(matches!(moments.combine(&range), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_accumulate_merges_later_tables() {
        let first = AccumulatorState::accumulate(None, &numbers(vec![1.0, 2.0]), range).unwrap();
        let merged =
            AccumulatorState::accumulate(Some(&first), &numbers(vec![-4.0]), range).unwrap();
        let AccumulatorState::Range(merged) = merged else {
            panic!("expected a range state");
        };
        assert_eq!(merged.data_min, vec![-4.0]);
        assert_eq!(merged.data_max, vec![2.0]);
        assert_eq!(merged.n_samples_seen, 3);
    }

    #[test]
    fn test_accumulate_empty_table() {
        let empty = numbers(vec![]);
        assert!(matches!(
            AccumulatorState::accumulate(None, &empty, range),
            Err(Error::EmptyBatch(_))
        ));

        let first = AccumulatorState::accumulate(None, &numbers(vec![1.0, 2.0]), range).unwrap();
        let same = AccumulatorState::accumulate(Some(&first), &empty, range).unwrap();
        assert_eq!(same, first);

        let renamed = table(Backend::InMemory, vec![Column::from_f64("y", vec![])]);
        assert!(matches!(
            AccumulatorState::accumulate(Some(&first), &renamed, range),
            Err(Error::SchemaMismatch(_))
        ));

        let strings = table(Backend::InMemory, vec![Column::from_strs("x", &[])]);
        assert!(matches!(
            AccumulatorState::accumulate(Some(&first), &strings, range),
            Err(Error::TypeMismatch(_))
        ));
    }
}
