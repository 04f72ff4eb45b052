//! Error types for batched pipeline training

use thiserror::Error;

use crate::engine::Backend;

/// Result type for batched pipeline training operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for batched pipeline training operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid hyperparameter value or combination
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Aggregation that cannot be expressed exactly on the given backend
    #[error("Operation '{operation}' is not supported on the {backend} backend")]
    BackendUnsupportedOperation {
        /// Backend that rejected the operation
        backend: Backend,
        /// Description of the rejected operation
        operation: String,
    },

    /// Batch that cannot produce a defined statistic
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    /// Columns disagree with a previously observed schema
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Data type mismatch
    #[error("Data type mismatch: {0}")]
    TypeMismatch(String),

    /// Category not seen during fitting
    #[error("Found unknown category {value} in column '{column}' during transform")]
    UnknownCategory {
        /// Column containing the category
        column: String,
        /// Rendered category value
        value: String,
    },

    /// Operator used before it was trained
    #[error("Operator is not fitted: {0}")]
    NotFitted(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Index out of bounds
    #[error("Index out of bounds")]
    IndexOutOfBounds,
}
