//! Training batches: features with optional target and sample weights

use crate::error::{Error, Result};
use crate::table::Table;

/// One partition of the training data, consumed once per scheduled operator
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Feature columns; carries the backend tag and row index
    features: Table,

    /// Row-aligned target columns
    target: Option<Table>,

    /// Row-aligned per-sample weights
    sample_weight: Option<Vec<f64>>,
}

impl Batch {
    /// Batch without target or weights
    pub fn new(features: Table) -> Self {
        Self {
            features,
            target: None,
            sample_weight: None,
        }
    }

    /// Batch with a row-aligned target table
    pub fn with_target(features: Table, target: Table) -> Result<Self> {
        Self::new(features).target(target)
    }

    /// Attach a target table
    pub fn target(mut self, target: Table) -> Result<Self> {
        if target.row_count() != self.features.row_count() {
            return Err(Error::SchemaMismatch(format!(
                "target has {} rows, features have {}",
                target.row_count(),
                self.features.row_count()
            )));
        }
        if target.backend() != self.features.backend() {
            return Err(Error::InvalidArgument(format!(
                "target lives on the {} backend, features on the {} backend",
                target.backend(),
                self.features.backend()
            )));
        }
        self.target = Some(target);
        Ok(self)
    }

    /// Attach per-sample weights
    pub fn sample_weight(mut self, weights: Vec<f64>) -> Result<Self> {
        if weights.len() != self.features.row_count() {
            return Err(Error::SchemaMismatch(format!(
                "{} sample weights for {} rows",
                weights.len(),
                self.features.row_count()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::InvalidArgument(
                "sample weights must be finite and non-negative".into(),
            ));
        }
        self.sample_weight = Some(weights);
        Ok(self)
    }

    /// Feature table
    pub fn features(&self) -> &Table {
        &self.features
    }

    /// Target table, if any
    pub fn target_table(&self) -> Option<&Table> {
        self.target.as_ref()
    }

    /// Per-sample weights, if any
    pub fn weights(&self) -> Option<&[f64]> {
        self.sample_weight.as_deref()
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.features.row_count()
    }

    /// Same target and weights with different features (after a transform)
    pub fn with_features(&self, features: Table) -> Result<Self> {
        if features.row_count() != self.row_count() {
            return Err(Error::SchemaMismatch(format!(
                "replacement features have {} rows, batch has {}",
                features.row_count(),
                self.row_count()
            )));
        }
        Ok(Self {
            features,
            target: self.target.clone(),
            sample_weight: self.sample_weight.clone(),
        })
    }

    /// Rows `offset..offset + length` of features, target and weights
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        let features = self.features.slice(offset, length)?;
        let target = self
            .target
            .as_ref()
            .map(|t| t.slice(offset, length))
            .transpose()?;
        let sample_weight = self
            .sample_weight
            .as_ref()
            .map(|w| w[offset..offset + length].to_vec());
        Ok(Self {
            features,
            target,
            sample_weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::record_batch::RecordBatch;

    fn table(values: Vec<f64>) -> Table {
        Table::in_memory(RecordBatch::from_columns(vec![Column::from_f64("x", values)]).unwrap())
    }

    #[test]
    fn test_target_must_align() {
        let result = Batch::with_target(table(vec![1.0, 2.0]), table(vec![0.0]));
        assert!(matches!(result, Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_rejects_negative_weights() {
        let result = Batch::new(table(vec![1.0, 2.0])).sample_weight(vec![1.0, -1.0]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_slice_keeps_alignment() {
        let batch = Batch::with_target(table(vec![1.0, 2.0, 3.0]), table(vec![0.0, 1.0, 0.0]))
            .unwrap()
            .sample_weight(vec![1.0, 2.0, 3.0])
            .unwrap();
        let tail = batch.slice(1, 2).unwrap();
        assert_eq!(tail.row_count(), 2);
        assert_eq!(tail.weights(), Some(&[2.0, 3.0][..]));
        assert_eq!(tail.target_table().map(Table::row_count), Some(2));
    }
}
