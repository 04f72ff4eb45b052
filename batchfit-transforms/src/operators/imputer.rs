//! Simple imputation of missing values.
//!
//! Only the mean has a mergeable state that converges to the one-shot
//! statistic, so it and the constant fill are the strategies trained
//! incrementally. The median and the most frequent value are computed by a
//! one-shot `fit`; the median only on the in-memory backend.

use batchfit_core::{
    Aggregation, Batch, Column, DataType, Error, MissingValue, RecordBatch, Result, Scalar, Table,
};
use serde::Serialize;
use tracing::debug;

use super::{ensure_columns, unexpected_state};
use crate::accumulator::{
    ensure_numeric, ensure_same_columns, AccumulatorState, FrequencyState, MomentsState,
};
use crate::config::{ImputeStrategy, SimpleImputerConfig};

/// Default fill of the constant strategy for string columns
pub const DEFAULT_STRING_FILL: &str = "missing_value";

/// Trained parameters of the simple imputer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImputerParams {
    /// Fitted columns
    pub columns: Vec<String>,
    /// Fill value per column
    pub statistics: Vec<Scalar>,
}

#[derive(Debug, Clone, PartialEq)]
enum ImputerState {
    Accumulated(AccumulatorState),
    Schema(Vec<(String, DataType)>),
}

/// Replaces missing cells with a per-column statistic
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleImputer {
    config: SimpleImputerConfig,
    state: Option<ImputerState>,
    params: Option<ImputerParams>,
}

impl SimpleImputer {
    /// Create an untrained imputer
    pub fn new(config: SimpleImputerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
            params: None,
        })
    }

    /// Configuration
    pub fn config(&self) -> &SimpleImputerConfig {
        &self.config
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&ImputerParams> {
        self.params.as_ref()
    }

    /// Accumulated state, for the strategies that have one
    pub fn accumulator(&self) -> Option<&AccumulatorState> {
        match self.state.as_ref()? {
            ImputerState::Accumulated(state) => Some(state),
            ImputerState::Schema(_) => None,
        }
    }

    /// Whether the strategy can be trained incrementally
    pub fn supports_partial_fit(&self) -> bool {
        self.config.strategy.is_incremental()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        self.state = None;
        self.params = None;
    }

    /// Train from scratch on one batch
    pub fn fit(&mut self, batch: &Batch) -> Result<()> {
        if self.config.strategy.is_incremental() {
            self.reset();
            return self.partial_fit(batch);
        }

        let masked = batch.features().mask_missing(&self.config.missing_values)?;
        let (state, params) = if self.config.strategy == ImputeStrategy::MostFrequent {
            let state = ImputerState::Accumulated(AccumulatorState::Frequency(
                FrequencyState::update(&masked)?,
            ));
            let params = self.finalize(&state)?;
            (Some(state), params)
        } else {
            (None, median_params(&masked)?)
        };

        debug!(strategy = ?self.config.strategy, columns = params.columns.len(), "imputer statistics computed");
        self.state = state;
        self.params = Some(params);
        Ok(())
    }

    /// Merge one more batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let features = batch.features();
        let state = match self.config.strategy {
            ImputeStrategy::Median | ImputeStrategy::MostFrequent => {
                return Err(Error::Configuration(format!(
                    "the {:?} strategy cannot be trained incrementally, use fit",
                    self.config.strategy
                )))
            }
            ImputeStrategy::Mean => {
                let masked = features.mask_missing(&self.config.missing_values)?;
                let current = self.accumulator();
                ImputerState::Accumulated(AccumulatorState::accumulate(current, &masked, |t| {
                    MomentsState::update(t).map(AccumulatorState::Moments)
                })?)
            }
            ImputeStrategy::Constant => {
                let schema: Vec<(String, DataType)> = features
                    .column_names()
                    .into_iter()
                    .zip(features.dtypes())
                    .collect();
                if let Some(ImputerState::Schema(current)) = &self.state {
                    let names = |s: &[(String, DataType)]| -> Vec<String> {
                        s.iter().map(|(n, _)| n.clone()).collect()
                    };
                    ensure_same_columns(&names(current), &names(&schema))?;
                }
                ImputerState::Schema(schema)
            }
        };

        let params = self.finalize(&state)?;
        debug!(strategy = ?self.config.strategy, columns = params.columns.len(), "imputer statistics updated");
        self.state = Some(state);
        self.params = Some(params);
        Ok(())
    }

    fn finalize(&self, state: &ImputerState) -> Result<ImputerParams> {
        match state {
            ImputerState::Accumulated(AccumulatorState::Moments(moments)) => {
                let statistics = moments
                    .mean
                    .iter()
                    .zip(&moments.count)
                    .map(|(&mean, &n)| if n == 0 { Scalar::Null } else { Scalar::Float64(mean) })
                    .collect();
                checked_params(moments.columns.clone(), statistics)
            }
            ImputerState::Accumulated(AccumulatorState::Frequency(frequency)) => {
                let statistics = frequency
                    .most_frequent()
                    .into_iter()
                    .map(|v| v.unwrap_or(Scalar::Null))
                    .collect();
                checked_params(frequency.columns.clone(), statistics)
            }
            ImputerState::Accumulated(other) => Err(unexpected_state("simple_imputer", other)),
            ImputerState::Schema(schema) => {
                let statistics = schema
                    .iter()
                    .map(|(name, data_type)| self.constant_fill(name, *data_type))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ImputerParams {
                    columns: schema.iter().map(|(n, _)| n.clone()).collect(),
                    statistics,
                })
            }
        }
    }

    fn constant_fill(&self, column: &str, data_type: DataType) -> Result<Scalar> {
        let fill = match &self.config.fill_value {
            Some(value) => value.clone(),
            None if data_type == DataType::String => Scalar::from(DEFAULT_STRING_FILL),
            None => Scalar::Int64(0),
        };
        let fits = match data_type {
            DataType::String => fill.data_type() == DataType::String,
            DataType::Int64 | DataType::Float64 => fill.data_type().is_numeric(),
            DataType::Boolean => fill.data_type() == DataType::Boolean,
            DataType::Null => true,
        };
        if !fits {
            return Err(Error::TypeMismatch(format!(
                "fill value '{}' does not fit {} column '{}'",
                fill, data_type, column
            )));
        }
        Ok(fill)
    }

    /// Replace missing cells with the trained statistics
    pub fn transform(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "simple_imputer")?;
        ensure_columns(table, &params.columns)?;
        let statistics = params.statistics.clone();
        let missing = self.config.missing_values.clone();
        let averaged = matches!(
            self.config.strategy,
            ImputeStrategy::Mean | ImputeStrategy::Median
        );

        table.map_batches(move |batch| {
            let columns = batch
                .columns()
                .iter()
                .zip(&statistics)
                .map(|(column, fill)| fill_column(column, fill, &missing, averaged))
                .collect::<Result<Vec<_>>>()?;
            RecordBatch::from_columns(columns)
        })
    }
}

fn median_params(masked: &Table) -> Result<ImputerParams> {
    ensure_numeric(masked)?;
    let columns = masked.column_names();
    let aggs: Vec<Aggregation> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| Aggregation::median(name).alias(&format!("median_{}", i)))
        .collect();
    let out = masked.aggregate(&aggs)?;
    let statistics = (0..columns.len())
        .map(|i| out.column_by_name(&format!("median_{}", i)).map(|c| c.value(0)))
        .collect::<Result<Vec<_>>>()?;
    checked_params(columns, statistics)
}

fn checked_params(columns: Vec<String>, statistics: Vec<Scalar>) -> Result<ImputerParams> {
    if let Some((name, _)) = columns
        .iter()
        .zip(&statistics)
        .find(|(_, s)| s.is_null() || s.is_nan())
    {
        return Err(Error::EmptyBatch(format!(
            "column '{}' has no non-missing values",
            name
        )));
    }
    Ok(ImputerParams {
        columns,
        statistics,
    })
}

fn fill_column(
    column: &Column,
    fill: &Scalar,
    missing: &MissingValue,
    averaged: bool,
) -> Result<Column> {
    let data_type = match (column.data_type(), fill.data_type()) {
        (_, _) if averaged => DataType::Float64,
        (DataType::Null, fill) => fill,
        (DataType::Int64, DataType::Float64) => DataType::Float64,
        (current, _) => current,
    };
    let values: Vec<Scalar> = column
        .iter()
        .map(|v| if missing.matches(&v) { fill.clone() } else { v })
        .collect();
    Column::from_scalars(column.name(), data_type, &values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchfit_core::Backend;
    use test_case::test_case;

    fn batch(backend: Backend, columns: Vec<Column>) -> Batch {
        let batch = RecordBatch::from_columns(columns).unwrap();
        let table = match backend {
            Backend::InMemory => Table::in_memory(batch),
            Backend::Distributed => Table::distributed(batch, 2).unwrap(),
        };
        Batch::new(table)
    }

    fn imputer(strategy: ImputeStrategy) -> SimpleImputer {
        SimpleImputer::new(SimpleImputerConfig {
            strategy,
            ..SimpleImputerConfig::default()
        })
        .unwrap()
    }

    #[test_case(Backend::InMemory ; "in memory")]
    #[test_case(Backend::Distributed ; "distributed")]
    fn test_most_frequent_numeric(backend: Backend) {
        let mut op = imputer(ImputeStrategy::MostFrequent);
        let data = batch(
            backend,
            vec![
                Column::from_i64("a", vec![1, 2, 3, 4, 5, 6]),
                Column::from_f64("b", vec![10.0, 14.0, 15.0, 15.0, 14.0, f64::NAN]),
            ],
        );
        op.fit(&data).unwrap();
        assert_eq!(
            op.params().unwrap().statistics,
            vec![Scalar::Int64(6), Scalar::Float64(15.0)]
        );
        assert_eq!(op.accumulator().map(AccumulatorState::kind), Some("frequency"));

        let out = op.transform(data.features()).unwrap();
        assert_eq!(out.column("b").unwrap().value(5), Scalar::Float64(15.0));
    }

    #[test_case(Backend::InMemory ; "in memory")]
    #[test_case(Backend::Distributed ; "distributed")]
    fn test_most_frequent_strings_with_sentinel(backend: Backend) {
        let mut op = SimpleImputer::new(SimpleImputerConfig {
            strategy: ImputeStrategy::MostFrequent,
            missing_values: MissingValue::Value(Scalar::from("missing")),
            fill_value: None,
        })
        .unwrap();
        let data = batch(
            backend,
            vec![
                Column::from_strs("a", &["a", "b", "b", "c", "c", "c"]),
                Column::from_strs("b", &["t", "f", "m", "f", "m", "missing"]),
            ],
        );
        op.fit(&data).unwrap();
        assert_eq!(
            op.params().unwrap().statistics,
            vec![Scalar::from("c"), Scalar::from("m")]
        );
        let out = op.transform(data.features()).unwrap().to_canonical().unwrap();
        assert_eq!(out.column_by_name("b").unwrap().value(5), Scalar::from("m"));
    }

    #[test]
    fn test_most_frequent_is_fit_only() {
        let mut op = SimpleImputer::new(SimpleImputerConfig {
            strategy: ImputeStrategy::MostFrequent,
            missing_values: MissingValue::Value(Scalar::Int64(-1)),
            fill_value: None,
        })
        .unwrap();
        assert!(!op.supports_partial_fit());
        let age = batch(Backend::InMemory, vec![Column::from_i64("age", vec![1, 2, 2, -1])]);
        assert!(matches!(op.partial_fit(&age), Err(Error::Configuration(_))));
        assert!(op.params().is_none());

        op.fit(&age).unwrap();
        let trained = op.clone();
        assert_eq!(op.params().unwrap().statistics, vec![Scalar::Int64(2)]);
        assert!(matches!(op.partial_fit(&age), Err(Error::Configuration(_))));
        assert_eq!(op, trained);
    }

    #[test]
    fn test_mean_ignores_empty_later_batch() {
        let mut op = imputer(ImputeStrategy::Mean);
        let data = batch(Backend::Distributed, vec![Column::from_f64("x", vec![1.0, f64::NAN, 5.0])]);
        op.partial_fit(&data).unwrap();
        op.partial_fit(&data.slice(3, 0).unwrap()).unwrap();
        assert_eq!(op.params().unwrap().statistics, vec![Scalar::Float64(3.0)]);
        assert!(matches!(
            imputer(ImputeStrategy::Mean).partial_fit(&data.slice(0, 0).unwrap()),
            Err(Error::EmptyBatch(_))
        ));
    }

    #[test]
    fn test_mean_fills_ints_as_floats() {
        let mut op = imputer(ImputeStrategy::Mean);
        let data = batch(
            Backend::InMemory,
            vec![Column::new(
                "a",
                batchfit_core::ColumnData::Int64(vec![Some(1), None, Some(4)]),
            )],
        );
        op.partial_fit(&data).unwrap();
        assert_eq!(op.params().unwrap().statistics, vec![Scalar::Float64(2.5)]);
        let out = op.transform(data.features()).unwrap();
        let column = out.column("a").unwrap();
        assert_eq!(column.data_type(), DataType::Float64);
        assert_eq!(column.value(1), Scalar::Float64(2.5));
    }

    #[test]
    fn test_mean_on_strings_is_type_mismatch() {
        let mut op = imputer(ImputeStrategy::Mean);
        let data = batch(Backend::InMemory, vec![Column::from_strs("s", &["a", "b"])]);
        assert!(matches!(op.partial_fit(&data), Err(Error::TypeMismatch(_))));
        assert!(op.params().is_none());
    }

    #[test]
    fn test_median_is_fit_only_and_in_memory_only() {
        let values = vec![Column::from_f64("a", vec![3.0, 1.0, f64::NAN, 2.0])];
        let mut op = imputer(ImputeStrategy::Median);
        assert!(!op.supports_partial_fit());
        assert!(matches!(
            op.partial_fit(&batch(Backend::InMemory, values.clone())),
            Err(Error::Configuration(_))
        ));
        op.fit(&batch(Backend::InMemory, values.clone())).unwrap();
        assert_eq!(op.params().unwrap().statistics, vec![Scalar::Float64(2.0)]);

        let mut distributed = imputer(ImputeStrategy::Median);
        assert!(matches!(
            distributed.fit(&batch(Backend::Distributed, values)),
            Err(Error::BackendUnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_constant_defaults() {
        let mut op = imputer(ImputeStrategy::Constant);
        let data = batch(
            Backend::InMemory,
            vec![
                Column::from_f64("x", vec![f64::NAN, 1.0]),
                Column::from_opt_strs("s", &[None, Some("a")]),
            ],
        );
        op.partial_fit(&data).unwrap();
        assert_eq!(
            op.params().unwrap().statistics,
            vec![Scalar::Int64(0), Scalar::from(DEFAULT_STRING_FILL)]
        );
        let out = op.transform(data.features()).unwrap();
        assert_eq!(out.column("x").unwrap().value(0), Scalar::Float64(0.0));
        assert_eq!(out.column("s").unwrap().value(0), Scalar::from("missing_value"));
    }

    #[test]
    fn test_all_missing_column_is_empty_batch() {
        let mut op = imputer(ImputeStrategy::Mean);
        let data = batch(Backend::InMemory, vec![Column::from_f64("x", vec![f64::NAN])]);
        assert!(matches!(op.partial_fit(&data), Err(Error::EmptyBatch(_))));
    }
}
