//! Min-max and standard scaling.
//!
//! The min-max transformation is
//! ```text
//! X_scaled = X * scale + min
//! scale    = (high - low) / (data_max - data_min)
//! min      = low - data_min * scale
//! ```
//! with a zero data range treated as 1, so a constant column maps to `low`.

use batchfit_core::{Batch, Result, Table};
use serde::Serialize;

use super::{ensure_columns, map_float_columns, unexpected_state};
use crate::accumulator::{AccumulatorState, MomentsState, RangeState};
use crate::config::{MinMaxScalerConfig, StandardScalerConfig};

/// Trained parameters of the min-max scaler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinMaxParams {
    /// Fitted columns
    pub columns: Vec<String>,
    /// Per-column minimum seen
    pub data_min: Vec<f64>,
    /// Per-column maximum seen
    pub data_max: Vec<f64>,
    /// Per-column `data_max - data_min`
    pub data_range: Vec<f64>,
    /// Per-column multiplicative factor
    pub scale: Vec<f64>,
    /// Per-column additive offset
    pub min: Vec<f64>,
    /// Rows seen
    pub n_samples_seen: u64,
}

/// Scales each column to the configured range
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    config: MinMaxScalerConfig,
    state: Option<AccumulatorState>,
    params: Option<MinMaxParams>,
}

impl MinMaxScaler {
    /// Create an untrained scaler
    pub fn new(config: MinMaxScalerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
            params: None,
        })
    }

    /// Configuration
    pub fn config(&self) -> &MinMaxScalerConfig {
        &self.config
    }

    /// Accumulated state, if trained
    pub fn state(&self) -> Option<&AccumulatorState> {
        self.state.as_ref()
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&MinMaxParams> {
        self.params.as_ref()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        self.state = None;
        self.params = None;
    }

    /// Merge one more batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let state = AccumulatorState::accumulate(self.state.as_ref(), batch.features(), |t| {
            RangeState::update(t).map(AccumulatorState::Range)
        })?;
        self.params = Some(self.finalize(&state)?);
        self.state = Some(state);
        Ok(())
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<MinMaxParams> {
        let AccumulatorState::Range(state) = state else {
            return Err(unexpected_state("min_max_scaler", state));
        };
        let (low, high) = self.config.feature_range;
        let data_range: Vec<f64> = state
            .data_min
            .iter()
            .zip(&state.data_max)
            .map(|(lo, hi)| hi - lo)
            .collect();
        let scale: Vec<f64> = data_range
            .iter()
            .map(|&range| (high - low) / if range == 0.0 { 1.0 } else { range })
            .collect();
        let min = state
            .data_min
            .iter()
            .zip(&scale)
            .map(|(data_min, scale)| low - data_min * scale)
            .collect();

        Ok(MinMaxParams {
            columns: state.columns.clone(),
            data_min: state.data_min.clone(),
            data_max: state.data_max.clone(),
            data_range,
            scale,
            min,
            n_samples_seen: state.n_samples_seen,
        })
    }

    /// Apply the trained scaling
    pub fn transform(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "min_max_scaler")?;
        ensure_columns(table, &params.columns)?;
        let (scale, min) = (params.scale.clone(), params.min.clone());
        map_float_columns(table, move |i, x| x * scale[i] + min[i])
    }
}

/// Trained parameters of the standard scaler
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardParams {
    /// Fitted columns
    pub columns: Vec<String>,
    /// Per-column mean; absent when neither centering nor scaling
    pub mean: Option<Vec<f64>>,
    /// Per-column population variance; absent without scaling
    pub var: Option<Vec<f64>>,
    /// Per-column standard deviation, zero replaced by 1; absent without scaling
    pub scale: Option<Vec<f64>>,
    /// Rows seen
    pub n_samples_seen: u64,
}

/// Centers columns and scales them to unit variance
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    config: StandardScalerConfig,
    state: Option<AccumulatorState>,
    params: Option<StandardParams>,
}

impl StandardScaler {
    /// Create an untrained scaler
    pub fn new(config: StandardScalerConfig) -> Self {
        Self {
            config,
            state: None,
            params: None,
        }
    }

    /// Configuration
    pub fn config(&self) -> &StandardScalerConfig {
        &self.config
    }

    /// Accumulated state, if trained
    pub fn state(&self) -> Option<&AccumulatorState> {
        self.state.as_ref()
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&StandardParams> {
        self.params.as_ref()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        self.state = None;
        self.params = None;
    }

    /// Merge one more batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let state = AccumulatorState::accumulate(self.state.as_ref(), batch.features(), |t| {
            MomentsState::update(t).map(AccumulatorState::Moments)
        })?;
        self.params = Some(self.finalize(&state)?);
        self.state = Some(state);
        Ok(())
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<StandardParams> {
        let AccumulatorState::Moments(state) = state else {
            return Err(unexpected_state("standard_scaler", state));
        };
        let StandardScalerConfig { with_mean, with_std } = self.config;
        let var = state.variance();
        let scale = var
            .iter()
            .map(|&v| if v == 0.0 { 1.0 } else { v.sqrt() })
            .collect();

        Ok(StandardParams {
            columns: state.columns.clone(),
            mean: (with_mean || with_std).then(|| state.mean.clone()),
            var: with_std.then_some(var),
            scale: with_std.then_some(scale),
            n_samples_seen: state.n_samples_seen,
        })
    }

    /// Apply the trained standardization
    pub fn transform(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "standard_scaler")?;
        ensure_columns(table, &params.columns)?;
        let mean = if self.config.with_mean {
            params.mean.clone()
        } else {
            None
        };
        let scale = params.scale.clone();
        map_float_columns(table, move |i, x| {
            let centered = mean.as_ref().map_or(x, |m| x - m[i]);
            scale.as_ref().map_or(centered, |s| centered / s[i])
        })
    }
}
