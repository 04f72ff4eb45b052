//! Task-graph scheduling of batched pipeline training
//!
//! Training a pipeline over `n` batches is a grid of tasks:
//! `Load(b)` pulls batch `b` from the source, `Fit(s, b)` merges the input of
//! step `s` for batch `b` into that step, and `Transform(s, b)` produces the
//! input of step `s + 1`. The last step has no transform task.
//!
//! In exact mode a step transforms only once it has seen every batch, so
//! downstream steps train on final upstream parameters and the result equals
//! a single-shot fit over the concatenated data. In incremental mode each
//! transform uses the parameters as they stand after its own batch, which
//! keeps at most a few batches in memory.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use batchfit_core::{Batch, BatchSource, Scalar};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;

/// Order in which ready tasks are run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// Finish a step across all batches before the next step
    #[default]
    StepPriority,
    /// Push each batch through all steps before loading the next one
    BatchPriority,
}

impl SchedulingPolicy {
    fn key(self, task: Task) -> (usize, usize, TaskKind) {
        match self {
            SchedulingPolicy::StepPriority => (task.step, task.batch, task.kind),
            SchedulingPolicy::BatchPriority => (task.batch, task.step, task.kind),
        }
    }
}

impl fmt::Display for SchedulingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingPolicy::StepPriority => write!(f, "step_priority"),
            SchedulingPolicy::BatchPriority => write!(f, "batch_priority"),
        }
    }
}

/// Configuration for a scheduled fit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Ready-task ordering
    pub policy: SchedulingPolicy,

    /// Transform each batch with the parameters trained so far instead of the final ones
    pub incremental: bool,

    /// Class labels declared to predictor steps before training
    pub classes: Option<Vec<Scalar>>,
}

/// Statistics from a scheduled fit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FitStats {
    /// Tasks run
    pub tasks_executed: usize,

    /// Batches pulled from the source
    pub batches_loaded: usize,

    /// Largest number of step inputs held at once
    pub peak_in_flight: usize,

    /// Total execution time
    pub execution_time: Duration,
}

/// Kind of a task; also the last component of every priority key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskKind {
    /// Pull a batch from the source
    Load,
    /// Train a step on a batch
    Fit,
    /// Produce the next step's input for a batch
    Transform,
}

/// One unit of work in the task grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Task {
    /// What the task does
    pub kind: TaskKind,
    /// Step index; always 0 for `Load`
    pub step: usize,
    /// Batch index
    pub batch: usize,
}

impl Task {
    fn load(batch: usize) -> Self {
        Self {
            kind: TaskKind::Load,
            step: 0,
            batch,
        }
    }

    fn fit(step: usize, batch: usize) -> Self {
        Self {
            kind: TaskKind::Fit,
            step,
            batch,
        }
    }

    fn transform(step: usize, batch: usize) -> Self {
        Self {
            kind: TaskKind::Transform,
            step,
            batch,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskKind::Load => write!(f, "load({})", self.batch),
            TaskKind::Fit => write!(f, "fit({}, {})", self.step, self.batch),
            TaskKind::Transform => write!(f, "transform({}, {})", self.step, self.batch),
        }
    }
}

/// Dependency tracking over the task grid.
///
/// A task enters the ready queue when its last dependency completes.
struct TaskGraph {
    steps: usize,
    batches: usize,
    incremental: bool,
    policy: SchedulingPolicy,
    done: HashSet<Task>,
    offered: HashSet<Task>,
    ready: BTreeMap<(usize, usize, TaskKind), Task>,
}

impl TaskGraph {
    fn new(steps: usize, batches: usize, policy: SchedulingPolicy, incremental: bool) -> Self {
        let mut graph = Self {
            steps,
            batches,
            incremental,
            policy,
            done: HashSet::new(),
            offered: HashSet::new(),
            ready: BTreeMap::new(),
        };
        graph.offer(Task::load(0));
        graph
    }

    fn total(&self) -> usize {
        self.batches * (2 * self.steps)
    }

    fn completed(&self) -> usize {
        self.done.len()
    }

    fn ready_len(&self) -> usize {
        self.ready.len()
    }

    fn pop(&mut self) -> Option<Task> {
        self.ready.pop_first().map(|(_, task)| task)
    }

    fn complete(&mut self, task: Task) {
        self.done.insert(task);
        for next in self.dependents(task) {
            if self.dependencies(next).iter().all(|t| self.done.contains(t)) {
                self.offer(next);
            }
        }
    }

    fn offer(&mut self, task: Task) {
        if self.offered.insert(task) {
            self.ready.insert(self.policy.key(task), task);
        }
    }

    fn has_transform(&self, step: usize) -> bool {
        step + 1 < self.steps
    }

    fn dependencies(&self, task: Task) -> Vec<Task> {
        let Task { kind, step, batch } = task;
        let mut deps = Vec::with_capacity(3);
        match kind {
            TaskKind::Load => {
                if batch > 0 {
                    deps.push(Task::load(batch - 1));
                }
            }
            TaskKind::Fit => {
                deps.push(if step == 0 {
                    Task::load(batch)
                } else {
                    Task::transform(step - 1, batch)
                });
                if batch > 0 {
                    deps.push(Task::fit(step, batch - 1));
                    if self.incremental && self.has_transform(step) {
                        deps.push(Task::transform(step, batch - 1));
                    }
                }
            }
            TaskKind::Transform => {
                let trained_on = if self.incremental { batch } else { self.batches - 1 };
                deps.push(Task::fit(step, trained_on));
            }
        }
        deps
    }

    fn dependents(&self, task: Task) -> Vec<Task> {
        let Task { kind, step, batch } = task;
        let has_next_batch = batch + 1 < self.batches;
        let mut next = Vec::new();
        match kind {
            TaskKind::Load => {
                if has_next_batch {
                    next.push(Task::load(batch + 1));
                }
                next.push(Task::fit(0, batch));
            }
            TaskKind::Fit => {
                if has_next_batch {
                    next.push(Task::fit(step, batch + 1));
                }
                if self.has_transform(step) {
                    if self.incremental {
                        next.push(Task::transform(step, batch));
                    } else if !has_next_batch {
                        next.extend((0..self.batches).map(|b| Task::transform(step, b)));
                    }
                }
            }
            TaskKind::Transform => {
                next.push(Task::fit(step + 1, batch));
                if self.incremental && has_next_batch {
                    next.push(Task::fit(step, batch + 1));
                }
            }
        }
        next
    }
}

/// Drives a pipeline's task grid over a batch source
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Train untrained copies of the pipeline's steps on `batch_count` batches.
    ///
    /// The given pipeline is not modified. A run over a single batch trains
    /// each step with `fit`; longer runs merge batches with `partial_fit`.
    pub fn run(
        &self,
        pipeline: &Pipeline,
        source: &mut dyn BatchSource,
        batch_count: usize,
    ) -> Result<(Pipeline, FitStats)> {
        if batch_count == 0 {
            return Err(PipelineError::Scheduling(
                "batch_count must be at least 1".into(),
            ));
        }

        let run_id = Uuid::new_v4();
        let span = info_span!(
            "fit_with_batches",
            %run_id,
            policy = %self.config.policy,
            batch_count,
            incremental = self.config.incremental
        );
        let _guard = span.enter();
        let start = Instant::now();

        let mut trained = pipeline.untrained();
        if let Some(classes) = &self.config.classes {
            trained.set_classes(classes)?;
        }
        let steps = trained.step_count();
        let mut graph = TaskGraph::new(steps, batch_count, self.config.policy, self.config.incremental);
        let mut inputs: HashMap<(usize, usize), Batch> = HashMap::new();
        let mut stats = FitStats::default();

        while let Some(task) = graph.pop() {
            debug!(%task, ready = graph.ready_len(), in_flight = inputs.len(), "running task");
            let key = (task.step, task.batch);
            match task.kind {
                TaskKind::Load => {
                    let batch = source
                        .next_batch()
                        .map_err(|e| PipelineError::Source(e.to_string()))?
                        .ok_or_else(|| {
                            PipelineError::Source(format!(
                                "source ended after {} of {} batches",
                                task.batch, batch_count
                            ))
                        })?;
                    inputs.insert(key, batch);
                    stats.batches_loaded += 1;
                }
                TaskKind::Fit => {
                    let input = inputs.get(&key).ok_or_else(|| missing_input(task))?;
                    let op = &mut trained.steps_mut()[task.step];
                    let name = op.name();
                    let result = if batch_count == 1 {
                        op.fit(input)
                    } else {
                        op.partial_fit(input)
                    };
                    result.map_err(PipelineError::step(task.step, name))?;
                    if task.step + 1 == steps {
                        inputs.remove(&key);
                    }
                }
                TaskKind::Transform => {
                    let input = inputs.remove(&key).ok_or_else(|| missing_input(task))?;
                    let op = &trained.steps()[task.step];
                    let features = op
                        .transform(input.features())
                        .map_err(PipelineError::step(task.step, op.name()))?;
                    inputs.insert((task.step + 1, task.batch), input.with_features(features)?);
                }
            }
            stats.peak_in_flight = stats.peak_in_flight.max(inputs.len());
            stats.tasks_executed += 1;
            graph.complete(task);
        }

        if graph.completed() != graph.total() {
            return Err(PipelineError::Scheduling(format!(
                "only {} of {} tasks could run",
                graph.completed(),
                graph.total()
            )));
        }
        if let Some(extra) = source.size_hint().filter(|&n| n > 0) {
            warn!(extra, "source has more batches than were requested");
        }

        stats.execution_time = start.elapsed();
        info!(
            tasks = stats.tasks_executed,
            batches = stats.batches_loaded,
            peak_in_flight = stats.peak_in_flight,
            elapsed = ?stats.execution_time,
            "pipeline fitted"
        );
        Ok((trained, stats))
    }
}

fn missing_input(task: Task) -> PipelineError {
    PipelineError::Scheduling(format!("input of {} is not available", task))
}

/// Train a pipeline over `batch_count` batches in exact mode.
///
/// Returns the trained pipeline; `pipeline` itself is left untouched.
pub fn fit_with_batches(
    pipeline: &Pipeline,
    source: &mut dyn BatchSource,
    batch_count: usize,
    policy: SchedulingPolicy,
) -> Result<Pipeline> {
    let scheduler = Scheduler::new(SchedulerConfig {
        policy,
        ..SchedulerConfig::default()
    });
    scheduler.run(pipeline, source, batch_count).map(|(trained, _)| trained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchfit_core::{Column, RecordBatch, SplitSource, Table, VecSource};
    use batchfit_transforms::OperatorConfig;
    use test_case::test_case;

    fn order(steps: usize, batches: usize, policy: SchedulingPolicy, incremental: bool) -> Vec<String> {
        let mut graph = TaskGraph::new(steps, batches, policy, incremental);
        let mut visited = Vec::new();
        while let Some(task) = graph.pop() {
            visited.push(task.to_string());
            graph.complete(task);
        }
        visited
    }

    #[test_case(SchedulingPolicy::StepPriority, false ; "step exact")]
    #[test_case(SchedulingPolicy::StepPriority, true ; "step incremental")]
    #[test_case(SchedulingPolicy::BatchPriority, false ; "batch exact")]
    #[test_case(SchedulingPolicy::BatchPriority, true ; "batch incremental")]
    fn test_every_task_runs_once(policy: SchedulingPolicy, incremental: bool) {
        let visited = order(3, 4, policy, incremental);
        let unique: HashSet<&String> = visited.iter().collect();
        assert_eq!(visited.len(), 4 * 6);
        assert_eq!(unique.len(), visited.len());
        assert!(!visited.contains(&"transform(2, 0)".to_string()));
    }

    #[test]
    fn test_incremental_orders() {
        assert_eq!(
            order(2, 2, SchedulingPolicy::StepPriority, true),
            vec![
                "load(0)", "fit(0, 0)", "transform(0, 0)", "load(1)", "fit(0, 1)",
                "transform(0, 1)", "fit(1, 0)", "fit(1, 1)",
            ]
        );
        assert_eq!(
            order(2, 2, SchedulingPolicy::BatchPriority, true),
            vec![
                "load(0)", "fit(0, 0)", "transform(0, 0)", "fit(1, 0)", "load(1)",
                "fit(0, 1)", "transform(0, 1)", "fit(1, 1)",
            ]
        );
    }

    #[test]
    fn test_exact_mode_transforms_after_last_fit() {
        let visited = order(2, 3, SchedulingPolicy::BatchPriority, false);
        let last_fit = visited.iter().position(|t| t == "fit(0, 2)").unwrap();
        let first_transform = visited.iter().position(|t| t.starts_with("transform")).unwrap();
        assert!(first_transform > last_fit);
    }

    fn scaler_pipeline() -> Pipeline {
        Pipeline::from_configs(vec![
            OperatorConfig::from_json(r#"{"op": "standard_scaler"}"#).unwrap(),
            OperatorConfig::from_json(r#"{"op": "min_max_scaler"}"#).unwrap(),
        ])
        .unwrap()
    }

    fn data() -> Batch {
        let values: Vec<f64> = (0..12).map(|i| f64::from(i * i % 7)).collect();
        Batch::new(Table::in_memory(
            RecordBatch::from_columns(vec![Column::from_f64("x", values)]).unwrap(),
        ))
    }

    #[test]
    fn test_stats_and_untouched_input() {
        let pipeline = scaler_pipeline();
        let scheduler = Scheduler::new(SchedulerConfig::default());
        let mut source = SplitSource::new(data(), 3).unwrap();
        let (trained, stats) = scheduler.run(&pipeline, &mut source, 3).unwrap();

        assert!(trained.is_trained());
        assert!(!pipeline.is_trained());
        assert_eq!(stats.tasks_executed, 12);
        assert_eq!(stats.batches_loaded, 3);
        assert!(stats.peak_in_flight >= 1);
    }

    #[test]
    fn test_short_source_aborts() {
        let mut source = VecSource::new(vec![data()]);
        let err = fit_with_batches(&scaler_pipeline(), &mut source, 2, SchedulingPolicy::StepPriority)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }

    #[test]
    fn test_zero_batches() {
        let mut source = VecSource::new(vec![]);
        assert!(matches!(
            fit_with_batches(&scaler_pipeline(), &mut source, 0, SchedulingPolicy::StepPriority),
            Err(PipelineError::Scheduling(_))
        ));
    }

    #[test]
    fn test_policies_agree_in_incremental_mode() {
        let run = |policy| {
            let scheduler = Scheduler::new(SchedulerConfig {
                policy,
                incremental: true,
                classes: None,
            });
            let mut source = SplitSource::new(data(), 4).unwrap();
            scheduler.run(&scaler_pipeline(), &mut source, 4).unwrap().0
        };
        assert_eq!(
            run(SchedulingPolicy::StepPriority).trained_params(),
            run(SchedulingPolicy::BatchPriority).trained_params()
        );
    }

    #[test]
    fn test_config_from_json() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"policy": "batch_priority", "incremental": true}"#).unwrap();
        assert_eq!(config.policy, SchedulingPolicy::BatchPriority);
        assert!(config.incremental);
        assert!(config.classes.is_none());
    }
}
