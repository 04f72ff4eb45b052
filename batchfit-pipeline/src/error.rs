//! Error type for pipeline training and scheduling

use batchfit_core::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for pipeline operations
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A step failed while training, transforming or predicting
    #[error("Step {step} ({operator}) failed: {source}")]
    Step {
        /// Position of the failing step
        step: usize,
        /// Name of the failing operator
        operator: &'static str,
        /// Underlying failure
        #[source]
        source: Error,
    },

    /// Error from the batch source
    #[error("Source error: {0}")]
    Source(String),

    /// Pipeline composition that cannot be trained or applied
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Task graph that cannot make progress
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// General error
    #[error("{0}")]
    Other(#[from] Error),
}

impl PipelineError {
    pub(crate) fn step(step: usize, operator: &'static str) -> impl FnOnce(Error) -> Self {
        move |source| PipelineError::Step {
            step,
            operator,
            source,
        }
    }

    /// Underlying core error, when there is one
    pub fn cause(&self) -> Option<&Error> {
        match self {
            PipelineError::Step { source, .. } => Some(source),
            PipelineError::Other(e) => Some(e),
            _ => None,
        }
    }
}
