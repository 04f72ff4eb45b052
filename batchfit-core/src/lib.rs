//! Core data structures and the backend adapter for batched pipeline training
//!
//! This crate provides the tabular data model (scalars, columns, record
//! batches), the backend-tagged [`Table`] with its in-memory and distributed
//! engines, training [`Batch`]es and single-pass [`BatchSource`]s. Operators
//! built on top of it see one contract regardless of the backend.

#![warn(missing_docs)]

pub mod aggregate;
pub mod batch;
pub mod column;
pub mod engine;
pub mod error;
pub mod record_batch;
pub mod scalar;
pub mod schema;
pub mod source;
pub mod table;

// Re-export key types for convenience
pub use aggregate::{AggFunc, Aggregation};
pub use batch::Batch;
pub use column::{Column, ColumnData};
pub use engine::{Backend, DistributedEngine, Engine, InMemoryEngine};
pub use error::{Error, Result};
pub use record_batch::RecordBatch;
pub use scalar::{MissingValue, Scalar};
pub use schema::{DataType, Field, Schema};
pub use source::{BatchSource, SplitSource, VecSource};
pub use table::Table;
