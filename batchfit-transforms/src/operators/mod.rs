//! Trainable operators.
//!
//! [`Operator`] is the closed set of operator kinds a pipeline can hold. All
//! kinds share one lifecycle: untrained, trained by `fit` or `partial_fit`,
//! retrained by further `partial_fit` calls. Training is transactional: when
//! a call fails the operator keeps the state it had before the call.

mod encoder;
mod imputer;
mod scaler;
mod select;
mod sgd;

pub use encoder::{CategoriesParams, OneHotEncoder, OrdinalEncoder};
pub use imputer::{ImputerParams, SimpleImputer, DEFAULT_STRING_FILL};
pub use scaler::{MinMaxParams, MinMaxScaler, StandardParams, StandardScaler};
pub use select::{SelectKBest, SelectParams};
pub use sgd::{SgdClassifier, SgdParams, PREDICTION_COLUMN};

use batchfit_core::{Backend, Batch, Column, ColumnData, Error, RecordBatch, Result, Scalar, Table};
use serde::Serialize;
use tracing::debug;

use crate::accumulator::AccumulatorState;
use crate::config::{ImputeStrategy, OperatorConfig};

/// Trained parameters of any operator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TrainedParams {
    /// Min-max scaler parameters
    MinMaxScaler(MinMaxParams),
    /// Standard scaler parameters
    StandardScaler(StandardParams),
    /// Imputation statistics
    SimpleImputer(ImputerParams),
    /// Ordinal encoder categories
    OrdinalEncoder(CategoriesParams),
    /// One-hot encoder categories
    OneHotEncoder(CategoriesParams),
    /// Feature scores and selection mask
    SelectKBest(SelectParams),
    /// Classifier weights
    SgdClassifier(SgdParams),
}

/// A trainable operator of any kind
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Min-max scaler
    MinMaxScaler(MinMaxScaler),
    /// Standard scaler
    StandardScaler(StandardScaler),
    /// Simple imputer
    SimpleImputer(SimpleImputer),
    /// Ordinal encoder
    OrdinalEncoder(OrdinalEncoder),
    /// One-hot encoder
    OneHotEncoder(OneHotEncoder),
    /// Select-k-best
    SelectKBest(SelectKBest),
    /// SGD classifier
    SgdClassifier(SgdClassifier),
}

impl Operator {
    /// Build an untrained operator from a validated configuration
    pub fn new(config: OperatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(match config {
            OperatorConfig::MinMaxScaler(c) => Operator::MinMaxScaler(MinMaxScaler::new(c)?),
            OperatorConfig::StandardScaler(c) => Operator::StandardScaler(StandardScaler::new(c)),
            OperatorConfig::SimpleImputer(c) => Operator::SimpleImputer(SimpleImputer::new(c)?),
            OperatorConfig::OrdinalEncoder(c) => Operator::OrdinalEncoder(OrdinalEncoder::new(c)?),
            OperatorConfig::OneHotEncoder(c) => Operator::OneHotEncoder(OneHotEncoder::new(c)?),
            OperatorConfig::SelectKBest(c) => Operator::SelectKBest(SelectKBest::new(c)?),
            OperatorConfig::SgdClassifier(c) => Operator::SgdClassifier(SgdClassifier::new(c)?),
        })
    }

    /// Build an untrained operator from a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(OperatorConfig::from_json(json)?)
    }

    /// Configuration this operator was built from
    pub fn config(&self) -> OperatorConfig {
        match self {
            Operator::MinMaxScaler(op) => OperatorConfig::MinMaxScaler(op.config().clone()),
            Operator::StandardScaler(op) => OperatorConfig::StandardScaler(op.config().clone()),
            Operator::SimpleImputer(op) => OperatorConfig::SimpleImputer(op.config().clone()),
            Operator::OrdinalEncoder(op) => OperatorConfig::OrdinalEncoder(op.config().clone()),
            Operator::OneHotEncoder(op) => OperatorConfig::OneHotEncoder(op.config().clone()),
            Operator::SelectKBest(op) => OperatorConfig::SelectKBest(op.config().clone()),
            Operator::SgdClassifier(op) => OperatorConfig::SgdClassifier(op.config().clone()),
        }
    }

    /// Operator name
    pub fn name(&self) -> &'static str {
        match self {
            Operator::MinMaxScaler(_) => "min_max_scaler",
            Operator::StandardScaler(_) => "standard_scaler",
            Operator::SimpleImputer(_) => "simple_imputer",
            Operator::OrdinalEncoder(_) => "ordinal_encoder",
            Operator::OneHotEncoder(_) => "one_hot_encoder",
            Operator::SelectKBest(_) => "select_k_best",
            Operator::SgdClassifier(_) => "sgd_classifier",
        }
    }

    /// Whether `partial_fit` is available
    pub fn supports_partial_fit(&self) -> bool {
        match self {
            Operator::SimpleImputer(op) => op.supports_partial_fit(),
            _ => true,
        }
    }

    /// Whether `transform` is available
    pub fn supports_transform(&self) -> bool {
        !self.supports_predict()
    }

    /// Whether `predict` is available
    pub fn supports_predict(&self) -> bool {
        matches!(self, Operator::SgdClassifier(_))
    }

    /// Whether training works on tables of the given backend
    pub fn supports_backend(&self, backend: Backend) -> bool {
        let exact_only = match self {
            Operator::SelectKBest(_) => true,
            Operator::SimpleImputer(op) => op.config().strategy == ImputeStrategy::Median,
            _ => false,
        };
        !(exact_only && backend == Backend::Distributed)
    }

    /// Whether the operator holds trained parameters
    pub fn is_trained(&self) -> bool {
        self.trained_params().is_some()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        match self {
            Operator::MinMaxScaler(op) => op.reset(),
            Operator::StandardScaler(op) => op.reset(),
            Operator::SimpleImputer(op) => op.reset(),
            Operator::OrdinalEncoder(op) => op.reset(),
            Operator::OneHotEncoder(op) => op.reset(),
            Operator::SelectKBest(op) => op.reset(),
            Operator::SgdClassifier(op) => op.reset(),
        }
    }

    /// Train from scratch on one batch
    pub fn fit(&mut self, batch: &Batch) -> Result<()> {
        let mut fresh = self.clone();
        fresh.reset();
        match &mut fresh {
            Operator::SimpleImputer(op) => op.fit(batch)?,
            Operator::SgdClassifier(op) => op.fit(batch)?,
            other => other.merge_batch(batch)?,
        }
        debug!(operator = self.name(), rows = batch.row_count(), "fit");
        *self = fresh;
        Ok(())
    }

    /// Merge one more batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        self.merge_batch(batch)?;
        debug!(operator = self.name(), rows = batch.row_count(), "partial fit");
        Ok(())
    }

    fn merge_batch(&mut self, batch: &Batch) -> Result<()> {
        match self {
            Operator::MinMaxScaler(op) => op.partial_fit(batch),
            Operator::StandardScaler(op) => op.partial_fit(batch),
            Operator::SimpleImputer(op) => op.partial_fit(batch),
            Operator::OrdinalEncoder(op) => op.partial_fit(batch),
            Operator::OneHotEncoder(op) => op.partial_fit(batch),
            Operator::SelectKBest(op) => op.partial_fit(batch),
            Operator::SgdClassifier(op) => op.partial_fit(batch),
        }
    }

    /// Apply the trained transformation
    pub fn transform(&self, table: &Table) -> Result<Table> {
        match self {
            Operator::MinMaxScaler(op) => op.transform(table),
            Operator::StandardScaler(op) => op.transform(table),
            Operator::SimpleImputer(op) => op.transform(table),
            Operator::OrdinalEncoder(op) => op.transform(table),
            Operator::OneHotEncoder(op) => op.transform(table),
            Operator::SelectKBest(op) => op.transform(table),
            Operator::SgdClassifier(_) => Err(Error::InvalidOperation(format!(
                "{} does not support transform",
                self.name()
            ))),
        }
    }

    /// Predict one label per row
    pub fn predict(&self, table: &Table) -> Result<Table> {
        match self {
            Operator::SgdClassifier(op) => op.predict(table),
            _ => Err(Error::InvalidOperation(format!(
                "{} does not support predict",
                self.name()
            ))),
        }
    }

    /// Declare the class labels of a predictor; other operators ignore them
    pub fn set_classes(&mut self, classes: &[Scalar]) -> Result<()> {
        match self {
            Operator::SgdClassifier(op) => op.set_classes(classes.to_vec()),
            _ => Ok(()),
        }
    }

    /// Trained parameters, if trained
    pub fn trained_params(&self) -> Option<TrainedParams> {
        match self {
            Operator::MinMaxScaler(op) => op.params().cloned().map(TrainedParams::MinMaxScaler),
            Operator::StandardScaler(op) => {
                op.params().cloned().map(TrainedParams::StandardScaler)
            }
            Operator::SimpleImputer(op) => op.params().cloned().map(TrainedParams::SimpleImputer),
            Operator::OrdinalEncoder(op) => {
                op.params().cloned().map(TrainedParams::OrdinalEncoder)
            }
            Operator::OneHotEncoder(op) => op.params().cloned().map(TrainedParams::OneHotEncoder),
            Operator::SelectKBest(op) => op.params().cloned().map(TrainedParams::SelectKBest),
            Operator::SgdClassifier(op) => op.params().cloned().map(TrainedParams::SgdClassifier),
        }
    }

    /// Accumulated sufficient statistics, for operators that keep them
    pub fn accumulator(&self) -> Option<&AccumulatorState> {
        match self {
            Operator::MinMaxScaler(op) => op.state(),
            Operator::StandardScaler(op) => op.state(),
            Operator::SimpleImputer(op) => op.accumulator(),
            Operator::OrdinalEncoder(op) => op.state(),
            Operator::OneHotEncoder(op) => op.state(),
            Operator::SelectKBest(op) => op.state(),
            Operator::SgdClassifier(_) => None,
        }
    }
}

pub(crate) fn trained<'a, P>(params: Option<&'a P>, operator: &str) -> Result<&'a P> {
    params.ok_or_else(|| Error::NotFitted(format!("{} must be fitted before use", operator)))
}

pub(crate) fn unexpected_state(operator: &str, state: &AccumulatorState) -> Error {
    Error::InvalidOperation(format!(
        "{} cannot finalize a {} accumulator",
        operator,
        state.kind()
    ))
}

/// Fail with `SchemaMismatch` unless the table has exactly the fitted columns
pub(crate) fn ensure_columns(table: &Table, expected: &[String]) -> Result<()> {
    let actual = table.column_names();
    if actual != expected {
        return Err(Error::SchemaMismatch(format!(
            "fitted on columns {:?}, got {:?}",
            expected, actual
        )));
    }
    Ok(())
}

/// Map every cell of a numeric table through `f(column_index, value)`; nulls stay null
pub(crate) fn map_float_columns<F>(table: &Table, f: F) -> Result<Table>
where
    F: Fn(usize, f64) -> f64 + Send + Sync,
{
    table.map_batches(move |batch| {
        let columns = batch
            .columns()
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let data = column
                    .f64_values()?
                    .into_iter()
                    .map(|v| v.map(|x| f(i, x)))
                    .collect();
                Ok(Column::new(column.name(), ColumnData::Float64(data)))
            })
            .collect::<Result<Vec<_>>>()?;
        RecordBatch::from_columns(columns)
    })
}
