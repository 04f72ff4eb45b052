//! Linear composition of operators

use batchfit_core::{Batch, Scalar, Table};
use batchfit_transforms::{Operator, OperatorConfig, TrainedParams};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Ordered list of operators; each step consumes the output of the previous one.
///
/// Only the last step may be a predictor. Both training entry points are
/// transactional: they work on a copy and commit it only when every step
/// succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    steps: Vec<Operator>,
}

impl Pipeline {
    /// Create a pipeline from operators
    pub fn new(steps: Vec<Operator>) -> Result<Self> {
        if steps.is_empty() {
            return Err(PipelineError::InvalidPipeline(
                "a pipeline needs at least one step".into(),
            ));
        }
        let upstream = &steps[..steps.len() - 1];
        if let Some((i, op)) = upstream.iter().enumerate().find(|(_, op)| !op.supports_transform()) {
            return Err(PipelineError::InvalidPipeline(format!(
                "step {} ({}) cannot transform and must be the last step",
                i,
                op.name()
            )));
        }
        Ok(Self { steps })
    }

    /// Create a pipeline of untrained operators from their configurations
    pub fn from_configs(configs: Vec<OperatorConfig>) -> Result<Self> {
        let steps = configs
            .into_iter()
            .map(Operator::new)
            .collect::<batchfit_core::Result<Vec<_>>>()?;
        Self::new(steps)
    }

    /// Steps in order
    pub fn steps(&self) -> &[Operator] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Operator] {
        &mut self.steps
    }

    /// Number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Whether every step holds trained parameters
    pub fn is_trained(&self) -> bool {
        self.steps.iter().all(Operator::is_trained)
    }

    /// Copy of this pipeline with every step untrained
    pub fn untrained(&self) -> Self {
        let mut copy = self.clone();
        for op in &mut copy.steps {
            op.reset();
        }
        copy
    }

    /// Declare the class labels of predictor steps
    pub fn set_classes(&mut self, classes: &[Scalar]) -> Result<()> {
        for (i, op) in self.steps.iter_mut().enumerate() {
            let name = op.name();
            op.set_classes(classes).map_err(PipelineError::step(i, name))?;
        }
        Ok(())
    }

    /// Train every step from scratch on one batch
    pub fn fit(&mut self, batch: &Batch) -> Result<()> {
        self.train(batch, false)
    }

    /// Merge one more batch into every step
    pub fn partial_fit(&mut self, batch: &Batch) -> Result<()> {
        self.train(batch, true)
    }

    fn train(&mut self, batch: &Batch, incremental: bool) -> Result<()> {
        let mut staged = self.clone();
        let last = staged.steps.len() - 1;
        let mut current = batch.clone();
        for (i, op) in staged.steps.iter_mut().enumerate() {
            let name = op.name();
            let trained = if incremental {
                op.partial_fit(&current)
            } else {
                op.fit(&current)
            };
            trained.map_err(PipelineError::step(i, name))?;

            if i < last {
                let features = op
                    .transform(current.features())
                    .map_err(PipelineError::step(i, name))?;
                current = current.with_features(features)?;
            }
        }
        debug!(steps = staged.steps.len(), rows = batch.row_count(), incremental, "pipeline trained");
        *self = staged;
        Ok(())
    }

    /// Apply every step; the last step must be a transformer
    pub fn transform(&self, table: &Table) -> Result<Table> {
        self.run_transformers(table, self.steps.len())
    }

    /// Transform through the upstream steps, then predict with the last one
    pub fn predict(&self, table: &Table) -> Result<Table> {
        let last = self.steps.len() - 1;
        let features = self.run_transformers(table, last)?;
        let op = &self.steps[last];
        op.predict(&features).map_err(PipelineError::step(last, op.name()))
    }

    fn run_transformers(&self, table: &Table, count: usize) -> Result<Table> {
        let mut current = table.clone();
        for (i, op) in self.steps[..count].iter().enumerate() {
            current = op
                .transform(&current)
                .map_err(PipelineError::step(i, op.name()))?;
        }
        Ok(current)
    }

    /// Trained parameters per step
    pub fn trained_params(&self) -> Vec<Option<TrainedParams>> {
        self.steps.iter().map(Operator::trained_params).collect()
    }
}
