//! Ordinal and one-hot encoding of categorical columns

use std::collections::BTreeMap;

use batchfit_core::{Batch, Column, ColumnData, Error, RecordBatch, Result, Scalar, Table};
use serde::Serialize;

use super::{ensure_columns, unexpected_state};
use crate::accumulator::{AccumulatorState, CategoriesState};
use crate::config::{HandleUnknown, OneHotEncoderConfig, OrdinalEncoderConfig};

/// Trained categories of an encoder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoriesParams {
    /// Fitted columns
    pub columns: Vec<String>,
    /// Sorted categories per column, null last
    pub categories: Vec<Vec<Scalar>>,
}

impl CategoriesParams {
    fn lookup(&self) -> Vec<BTreeMap<Scalar, usize>> {
        self.categories
            .iter()
            .map(|cats| cats.iter().cloned().enumerate().map(|(i, c)| (c, i)).collect())
            .collect()
    }
}

fn merge_categories(
    operator: &str,
    current: Option<&AccumulatorState>,
    batch: &Batch,
) -> Result<(AccumulatorState, CategoriesParams)> {
    let state = AccumulatorState::accumulate(current, batch.features(), |t| {
        CategoriesState::update(t).map(AccumulatorState::Categories)
    })?;
    let AccumulatorState::Categories(categories) = &state else {
        return Err(unexpected_state(operator, &state));
    };
    let params = CategoriesParams {
        columns: categories.columns.clone(),
        categories: categories.sorted(),
    };
    Ok((state, params))
}

fn unknown(column: &Column, value: &Scalar) -> Error {
    Error::UnknownCategory {
        column: column.name().to_string(),
        value: value.to_string(),
    }
}

/// Encodes each category as its position in the sorted category list
#[derive(Debug, Clone, PartialEq)]
pub struct OrdinalEncoder {
    config: OrdinalEncoderConfig,
    state: Option<AccumulatorState>,
    params: Option<CategoriesParams>,
}

impl OrdinalEncoder {
    /// Create an untrained encoder
    pub fn new(config: OrdinalEncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
            params: None,
        })
    }

    /// Configuration
    pub fn config(&self) -> &OrdinalEncoderConfig {
        &self.config
    }

    /// Accumulated state, if trained
    pub fn state(&self) -> Option<&AccumulatorState> {
        self.state.as_ref()
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&CategoriesParams> {
        self.params.as_ref()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        self.state = None;
        self.params = None;
    }

    /// Merge one more batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let (state, params) = merge_categories("ordinal_encoder", self.state.as_ref(), batch)?;
        self.params = Some(params);
        self.state = Some(state);
        Ok(())
    }

    /// Replace every category by its code
    pub fn transform(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "ordinal_encoder")?;
        ensure_columns(table, &params.columns)?;
        let lookup = params.lookup();
        let fallback = match self.config.handle_unknown {
            HandleUnknown::UseEncodedValue => self.config.unknown_value,
            _ => None,
        };

        table.map_batches(move |batch| {
            let columns = batch
                .columns()
                .iter()
                .zip(&lookup)
                .map(|(column, codes)| {
                    let data = column
                        .iter()
                        .map(|value| match (codes.get(&value), fallback) {
                            (Some(&code), _) => Ok(Some(code as f64)),
                            (None, Some(unknown_value)) => Ok(Some(unknown_value)),
                            (None, None) => Err(unknown(column, &value)),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Ok(Column::new(column.name(), ColumnData::Float64(data)))
                })
                .collect::<Result<Vec<_>>>()?;
            RecordBatch::from_columns(columns)
        })
    }
}

/// Expands each column into one indicator column per category
#[derive(Debug, Clone, PartialEq)]
pub struct OneHotEncoder {
    config: OneHotEncoderConfig,
    state: Option<AccumulatorState>,
    params: Option<CategoriesParams>,
}

impl OneHotEncoder {
    /// Create an untrained encoder
    pub fn new(config: OneHotEncoderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
            params: None,
        })
    }

    /// Configuration
    pub fn config(&self) -> &OneHotEncoderConfig {
        &self.config
    }

    /// Accumulated state, if trained
    pub fn state(&self) -> Option<&AccumulatorState> {
        self.state.as_ref()
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&CategoriesParams> {
        self.params.as_ref()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        self.state = None;
        self.params = None;
    }

    /// Merge one more batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let (state, params) = merge_categories("one_hot_encoder", self.state.as_ref(), batch)?;
        self.params = Some(params);
        self.state = Some(state);
        Ok(())
    }

    /// Output column names, `<column>_<category>`
    pub fn feature_names(&self) -> Result<Vec<String>> {
        let params = super::trained(self.params.as_ref(), "one_hot_encoder")?;
        Ok(params
            .columns
            .iter()
            .zip(&params.categories)
            .flat_map(|(column, cats)| cats.iter().map(move |cat| format!("{}_{}", column, cat)))
            .collect())
    }

    /// Replace every column by its indicator columns
    pub fn transform(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "one_hot_encoder")?;
        ensure_columns(table, &params.columns)?;
        let names = self.feature_names()?;
        let lookup = params.lookup();
        let widths: Vec<usize> = params.categories.iter().map(Vec::len).collect();
        let ignore = self.config.handle_unknown == HandleUnknown::Ignore;

        table.map_batches(move |batch| {
            let rows = batch.row_count();
            let mut indicators: Vec<Vec<Option<f64>>> = Vec::with_capacity(names.len());
            for ((column, codes), &width) in batch.columns().iter().zip(&lookup).zip(&widths) {
                let mut block = vec![vec![Some(0.0); rows]; width];
                for (row, value) in column.iter().enumerate() {
                    match codes.get(&value) {
                        Some(&code) => block[code][row] = Some(1.0),
                        None if ignore => {}
                        None => return Err(unknown(column, &value)),
                    }
                }
                indicators.extend(block);
            }
            let columns = names
                .iter()
                .zip(indicators)
                .map(|(name, data)| Column::new(name, ColumnData::Float64(data)))
                .collect();
            RecordBatch::from_columns(columns)
        })
    }
}
