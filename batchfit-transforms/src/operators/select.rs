//! Univariate feature selection by ANOVA F score

use batchfit_core::{Batch, Error, Result, Table};
use serde::Serialize;

use super::{ensure_columns, unexpected_state};
use crate::accumulator::{AccumulatorState, UnivariateState};
use crate::config::SelectKBestConfig;

/// Trained parameters of select-k-best
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectParams {
    /// Fitted feature columns
    pub columns: Vec<String>,
    /// F score per feature
    pub scores: Vec<f64>,
    /// p-value per feature
    pub pvalues: Vec<f64>,
    /// Whether each feature is kept
    pub selected: Vec<bool>,
}

impl SelectParams {
    /// Names of the kept features, in input order
    pub fn selected_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.selected)
            .filter(|(_, &keep)| keep)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Keeps the `k` features with the highest F scores against the target
#[derive(Debug, Clone, PartialEq)]
pub struct SelectKBest {
    config: SelectKBestConfig,
    state: Option<AccumulatorState>,
    params: Option<SelectParams>,
}

impl SelectKBest {
    /// Create an untrained selector
    pub fn new(config: SelectKBestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: None,
            params: None,
        })
    }

    /// Configuration
    pub fn config(&self) -> &SelectKBestConfig {
        &self.config
    }

    /// Accumulated state, if trained
    pub fn state(&self) -> Option<&AccumulatorState> {
        self.state.as_ref()
    }

    /// Trained parameters, if trained
    pub fn params(&self) -> Option<&SelectParams> {
        self.params.as_ref()
    }

    /// Drop all trained state
    pub fn reset(&mut self) {
        self.state = None;
        self.params = None;
    }

    /// Merge one more labelled batch into the trained state
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        let target = batch.target_table().ok_or_else(|| {
            Error::InvalidArgument("select_k_best requires a target".into())
        })?;
        let state = AccumulatorState::accumulate(self.state.as_ref(), batch.features(), |t| {
            UnivariateState::update(t, target).map(AccumulatorState::Univariate)
        })?;
        let params = self.finalize(&state)?;
        self.state = Some(state);
        self.params = Some(params);
        Ok(())
    }

    fn finalize(&self, state: &AccumulatorState) -> Result<SelectParams> {
        let AccumulatorState::Univariate(state) = state else {
            return Err(unexpected_state("select_k_best", state));
        };
        let n_features = state.columns.len();
        if self.config.k > n_features {
            return Err(Error::Configuration(format!(
                "k = {} exceeds the number of features ({})",
                self.config.k, n_features
            )));
        }

        let (scores, pvalues) = state.f_scores();
        // NaN scores rank lowest; among tied scores the later feature is kept
        let ranked: Vec<f64> = scores
            .iter()
            .map(|&s| if s.is_nan() { f64::MIN } else { s })
            .collect();
        let mut order: Vec<usize> = (0..n_features).collect();
        order.sort_by(|&a, &b| ranked[a].total_cmp(&ranked[b]));

        let mut selected = vec![false; n_features];
        for &i in &order[n_features - self.config.k..] {
            selected[i] = true;
        }

        Ok(SelectParams {
            columns: state.columns.clone(),
            scores,
            pvalues,
            selected,
        })
    }

    /// Keep only the selected columns
    pub fn transform(&self, table: &Table) -> Result<Table> {
        let params = super::trained(self.params.as_ref(), "select_k_best")?;
        ensure_columns(table, &params.columns)?;
        table.project(&params.selected_columns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchfit_core::{Column, RecordBatch};

    fn labelled() -> Batch {
        let features = RecordBatch::from_columns(vec![
            Column::from_f64("noise", vec![5.0, 1.0, 3.0, 2.0, 6.0, 1.0]),
            Column::from_f64("signal", vec![1.0, 2.0, 3.0, 7.0, 8.0, 9.0]),
            Column::from_f64("weak", vec![1.0, 2.0, 2.0, 2.0, 3.0, 3.0]),
        ])
        .unwrap();
        let target = RecordBatch::from_columns(vec![Column::from_i64("y", vec![0, 0, 0, 1, 1, 1])])
            .unwrap();
        Batch::with_target(Table::in_memory(features), Table::in_memory(target)).unwrap()
    }

    #[test]
    fn test_keeps_top_k_in_input_order() {
        let mut select = SelectKBest::new(SelectKBestConfig { k: 2 }).unwrap();
        select.partial_fit(&labelled()).unwrap();
        let params = select.params().unwrap();
        assert_eq!(params.selected, vec![false, true, true]);

        let out = select.transform(labelled().features()).unwrap();
        assert_eq!(out.column_names(), vec!["signal".to_string(), "weak".to_string()]);
    }

    #[test]
    fn test_tied_scores_keep_the_later_feature() {
        let signal = vec![1.0, 2.0, 3.0, 7.0, 8.0, 9.0];
        let features = RecordBatch::from_columns(vec![
            Column::from_f64("first", signal.clone()),
            Column::from_f64("second", signal),
            Column::from_f64("noise", vec![5.0, 1.0, 3.0, 2.0, 6.0, 1.0]),
        ])
        .unwrap();
        let batch = Batch::with_target(
            Table::in_memory(features),
            labelled().target_table().unwrap().clone(),
        )
        .unwrap();

        let mut select = SelectKBest::new(SelectKBestConfig { k: 1 }).unwrap();
        select.partial_fit(&batch).unwrap();
        assert_eq!(select.params().unwrap().selected, vec![false, true, false]);
    }

    #[test]
    fn test_empty_later_batch_keeps_scores() {
        let mut select = SelectKBest::new(SelectKBestConfig { k: 2 }).unwrap();
        let batch = labelled();
        select.partial_fit(&batch).unwrap();
        let before = select.params().cloned();
        select.partial_fit(&batch.slice(6, 0).unwrap()).unwrap();
        assert_eq!(select.params().cloned(), before);
    }

    #[test]
    fn test_k_larger_than_features() {
        let mut select = SelectKBest::new(SelectKBestConfig { k: 4 }).unwrap();
        assert!(matches!(
            select.partial_fit(&labelled()),
            Err(Error::Configuration(_))
        ));
        assert!(select.params().is_none());
    }

    #[test]
    fn test_requires_target() {
        let mut select = SelectKBest::new(SelectKBestConfig { k: 1 }).unwrap();
        let unlabelled = Batch::new(labelled().features().clone());
        assert!(matches!(
            select.partial_fit(&unlabelled),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_distributed_batches_are_rejected() {
        let batch = labelled();
        let features = Table::distributed(batch.features().to_canonical().unwrap(), 2).unwrap();
        let target = Table::distributed(
            batch.target_table().unwrap().to_canonical().unwrap(),
            2,
        )
        .unwrap();
        let mut select = SelectKBest::new(SelectKBestConfig { k: 1 }).unwrap();
        assert!(matches!(
            select.partial_fit(&Batch::with_target(features, target).unwrap()),
            Err(Error::BackendUnsupportedOperation { .. })
        ));
    }
}
