//! Pipeline composition and task-graph scheduling for batched training
//!
//! A [`Pipeline`] chains operators from `batchfit-transforms`. It can be
//! trained one batch at a time with [`Pipeline::partial_fit`], or driven over
//! a [`batchfit_core::BatchSource`] by the [`Scheduler`], which decides in
//! which order every (step, batch) task runs.

#![warn(missing_docs)]

pub mod error;
pub mod pipeline;
pub mod schedule;

pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use schedule::{
    fit_with_batches, FitStats, Scheduler, SchedulerConfig, SchedulingPolicy, Task, TaskKind,
};
