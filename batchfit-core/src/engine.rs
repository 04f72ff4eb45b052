//! Execution engines behind the table abstraction.
//!
//! A table is always a list of partitions. The in-memory engine holds a
//! single partition and evaluates every aggregate directly. The distributed
//! engine evaluates partial aggregate states per partition (in parallel when
//! the `parallel` feature is enabled) and merges them in partition order,
//! rejecting aggregates that have no exact partial form.

use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::aggregate::{merge_states, partial_states, AggFunc, Aggregation, GroupStates};
use crate::column::Column;
use crate::error::{Error, Result};
use crate::record_batch::RecordBatch;
use crate::scalar::Scalar;

/// Tabular engine a table lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// Single-machine, single-partition engine
    InMemory,

    /// Partitioned engine with partial aggregation and ordered merge
    Distributed,
}

impl Backend {
    /// Engine implementing this backend
    pub fn engine(self) -> &'static dyn Engine {
        match self {
            Backend::InMemory => &InMemoryEngine,
            Backend::Distributed => &DistributedEngine,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::InMemory => write!(f, "in-memory"),
            Backend::Distributed => write!(f, "distributed"),
        }
    }
}

/// One partition together with the key columns to group it by
#[derive(Debug, Clone)]
pub struct KeyedPartition<'a> {
    /// Partition rows
    pub batch: &'a RecordBatch,

    /// Key columns, row-aligned with `batch`
    pub keys: Vec<Column>,
}

/// Partition-wise row-preserving transformation
pub type PartitionFn<'f> = dyn Fn(&RecordBatch) -> Result<RecordBatch> + Send + Sync + 'f;

/// Backend-specific evaluation of table operations
pub trait Engine: Send + Sync {
    /// Backend this engine implements
    fn backend(&self) -> Backend;

    /// Whether an aggregate can be evaluated exactly
    fn supports(&self, func: AggFunc) -> bool;

    /// Whether feature rows can be grouped by the rows of a separate target table
    fn supports_target_grouping(&self) -> bool;

    /// Evaluate grouped partial states over all partitions, merged in order
    fn group_states(
        &self,
        partitions: &[KeyedPartition<'_>],
        aggs: &[Aggregation],
    ) -> Result<GroupStates>;

    /// Apply a function to every partition
    fn map_partitions(
        &self,
        partitions: &[RecordBatch],
        f: &PartitionFn<'_>,
    ) -> Result<Vec<RecordBatch>>;

    /// Distinct values of a column across partitions, in first-occurrence order
    fn distinct(&self, columns: &[&Column]) -> Vec<Scalar>;

    /// Fail with `BackendUnsupportedOperation` if any aggregate is not exact here
    fn check_supported(&self, aggs: &[Aggregation]) -> Result<()> {
        match aggs.iter().find(|agg| !self.supports(agg.func)) {
            Some(agg) => Err(Error::BackendUnsupportedOperation {
                backend: self.backend(),
                operation: format!("exact {} of '{}'", agg.func, agg.column),
            }),
            None => Ok(()),
        }
    }
}

/// Single-partition engine evaluating every aggregate directly
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryEngine;

impl Engine for InMemoryEngine {
    fn backend(&self) -> Backend {
        Backend::InMemory
    }

    fn supports(&self, _func: AggFunc) -> bool {
        true
    }

    fn supports_target_grouping(&self) -> bool {
        true
    }

    fn group_states(
        &self,
        partitions: &[KeyedPartition<'_>],
        aggs: &[Aggregation],
    ) -> Result<GroupStates> {
        let mut acc: Option<GroupStates> = None;
        for partition in partitions {
            let states = partial_states(partition.batch, &partition.keys, aggs)?;
            match acc.as_mut() {
                Some(acc) => merge_states(acc, states)?,
                None => acc = Some(states),
            }
        }
        acc.ok_or_else(|| Error::InvalidOperation("table has no partitions".into()))
    }

    fn map_partitions(
        &self,
        partitions: &[RecordBatch],
        f: &PartitionFn<'_>,
    ) -> Result<Vec<RecordBatch>> {
        partitions.iter().map(f).collect()
    }

    fn distinct(&self, columns: &[&Column]) -> Vec<Scalar> {
        union_in_order(columns.iter().map(|c| first_occurrences(c)))
    }
}

/// Partitioned engine: per-partition partial states merged in partition order
#[derive(Debug, Clone, Copy, Default)]
pub struct DistributedEngine;

impl DistributedEngine {
    /// Default number of partitions for new distributed tables
    pub fn default_partitions() -> usize {
        #[cfg(feature = "parallel")]
        {
            num_cpus::get().max(1)
        }
        #[cfg(not(feature = "parallel"))]
        {
            4
        }
    }
}

impl Engine for DistributedEngine {
    fn backend(&self) -> Backend {
        Backend::Distributed
    }

    fn supports(&self, func: AggFunc) -> bool {
        !matches!(func, AggFunc::Median)
    }

    fn supports_target_grouping(&self) -> bool {
        false
    }

    fn group_states(
        &self,
        partitions: &[KeyedPartition<'_>],
        aggs: &[Aggregation],
    ) -> Result<GroupStates> {
        self.check_supported(aggs)?;
        trace!(
            partitions = partitions.len(),
            aggregations = aggs.len(),
            "partial aggregation"
        );

        #[cfg(feature = "parallel")]
        let partials: Vec<Result<GroupStates>> = partitions
            .par_iter()
            .map(|p| partial_states(p.batch, &p.keys, aggs))
            .collect();
        #[cfg(not(feature = "parallel"))]
        let partials: Vec<Result<GroupStates>> = partitions
            .iter()
            .map(|p| partial_states(p.batch, &p.keys, aggs))
            .collect();

        let mut partials = partials.into_iter();
        let mut acc = partials
            .next()
            .ok_or_else(|| Error::InvalidOperation("table has no partitions".into()))??;
        for states in partials {
            merge_states(&mut acc, states?)?;
        }
        Ok(acc)
    }

    fn map_partitions(
        &self,
        partitions: &[RecordBatch],
        f: &PartitionFn<'_>,
    ) -> Result<Vec<RecordBatch>> {
        #[cfg(feature = "parallel")]
        {
            partitions.par_iter().map(f).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            partitions.iter().map(f).collect()
        }
    }

    fn distinct(&self, columns: &[&Column]) -> Vec<Scalar> {
        #[cfg(feature = "parallel")]
        let partials: Vec<Vec<Scalar>> = columns.par_iter().map(|c| first_occurrences(c)).collect();
        #[cfg(not(feature = "parallel"))]
        let partials: Vec<Vec<Scalar>> = columns.iter().map(|c| first_occurrences(c)).collect();

        union_in_order(partials)
    }
}

fn first_occurrences(column: &Column) -> Vec<Scalar> {
    let mut seen = BTreeSet::new();
    column.iter().filter(|v| seen.insert(v.clone())).collect()
}

fn union_in_order(parts: impl IntoIterator<Item = Vec<Scalar>>) -> Vec<Scalar> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for part in parts {
        for value in part {
            if seen.insert(value.clone()) {
                out.push(value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partitions() -> Vec<RecordBatch> {
        let whole = RecordBatch::from_columns(vec![Column::from_f64(
            "x",
            vec![3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0],
        )])
        .unwrap();
        vec![whole.slice(0, 3).unwrap(), whole.slice(3, 4).unwrap()]
    }

    #[test]
    fn test_engines_agree_on_mergeable_aggregates() {
        let parts = partitions();
        let keyed: Vec<KeyedPartition<'_>> = parts
            .iter()
            .map(|batch| KeyedPartition { batch, keys: Vec::new() })
            .collect();
        let aggs = [Aggregation::sum("x"), Aggregation::min("x"), Aggregation::max("x")];

        let local = InMemoryEngine.group_states(&keyed, &aggs).unwrap();
        let distributed = DistributedEngine.group_states(&keyed, &aggs).unwrap();
        assert_eq!(local, distributed);
    }

    #[test]
    fn test_distributed_rejects_median() {
        let parts = partitions();
        let keyed = vec![KeyedPartition { batch: &parts[0], keys: Vec::new() }];
        let err = DistributedEngine
            .group_states(&keyed, &[Aggregation::median("x")])
            .unwrap_err();
        assert_eq!(
            err,
            Error::BackendUnsupportedOperation {
                backend: Backend::Distributed,
                operation: "exact median of 'x'".into(),
            }
        );
    }

    #[test]
    fn test_distinct_first_occurrence_order() {
        let parts = partitions();
        let columns: Vec<&Column> = parts.iter().map(|p| p.column(0).unwrap()).collect();
        let values = DistributedEngine.distinct(&columns);
        let expected: Vec<Scalar> = [3.0, 1.0, 4.0, 5.0, 9.0, 2.0]
            .into_iter()
            .map(Scalar::Float64)
            .collect();
        assert_eq!(values, expected);
        assert_eq!(InMemoryEngine.distinct(&columns), expected);
    }
}
