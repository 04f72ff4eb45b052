//! Mergeable accumulators and incrementally trainable operators
//!
//! Every operator keeps its sufficient statistics in an accumulator that can
//! be updated from a [`batchfit_core::Table`] on any backend and combined with
//! the statistics of another batch. Training one batch at a time and training
//! on the concatenation of all batches therefore produce the same parameters.

#![warn(missing_docs)]

pub mod accumulator;
pub mod config;
pub mod operators;

pub use accumulator::AccumulatorState;
pub use config::{
    HandleUnknown, ImputeStrategy, MinMaxScalerConfig, OneHotEncoderConfig, OperatorConfig,
    OrdinalEncoderConfig, SelectKBestConfig, SgdClassifierConfig, SimpleImputerConfig,
    StandardScalerConfig,
};
pub use operators::{Operator, TrainedParams};
