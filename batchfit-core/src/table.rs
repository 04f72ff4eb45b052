//! Backend-tagged partitioned tables.
//!
//! `Table` is the single data abstraction operators see. Every operation
//! has the same contract on both backends; the differences are confined to
//! the [`Engine`](crate::engine::Engine) implementations.

use std::sync::Arc;

use crate::aggregate::{finish_states, Aggregation};
use crate::column::Column;
use crate::engine::{Backend, DistributedEngine, Engine, KeyedPartition};
use crate::error::{Error, Result};
use crate::record_batch::RecordBatch;
use crate::scalar::{MissingValue, Scalar};
use crate::schema::{DataType, Schema};

#[derive(Debug, Clone, PartialEq)]
struct Partition {
    batch: RecordBatch,
    index: Option<Vec<i64>>,
}

/// A table on a specific backend, split into one or more partitions
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Backend this table lives on
    backend: Backend,

    /// Schema shared by every partition
    schema: Arc<Schema>,

    /// Row partitions, in order
    partitions: Vec<Partition>,

    /// Name of the stable row index, when one is attached
    index_name: Option<String>,
}

/// Sizes of `n` contiguous chunks of `len` rows, larger chunks first
pub fn split_sizes(len: usize, n: usize) -> Vec<usize> {
    let base = len / n;
    let extra = len % n;
    (0..n).map(|i| base + usize::from(i < extra)).collect()
}

impl Table {
    /// Single-partition table on the in-memory backend
    pub fn in_memory(batch: RecordBatch) -> Self {
        Self {
            backend: Backend::InMemory,
            schema: Arc::clone(batch.schema()),
            partitions: vec![Partition { batch, index: None }],
            index_name: None,
        }
    }

    /// Table on the distributed backend, split into `n_partitions` contiguous partitions
    pub fn distributed(batch: RecordBatch, n_partitions: usize) -> Result<Self> {
        if n_partitions == 0 {
            return Err(Error::InvalidArgument(
                "a distributed table needs at least one partition".into(),
            ));
        }

        let mut offset = 0;
        let mut partitions = Vec::with_capacity(n_partitions);
        for size in split_sizes(batch.row_count(), n_partitions) {
            partitions.push(Partition {
                batch: batch.slice(offset, size)?,
                index: None,
            });
            offset += size;
        }

        Ok(Self {
            backend: Backend::Distributed,
            schema: Arc::clone(batch.schema()),
            partitions,
            index_name: None,
        })
    }

    /// Table on the given backend; distributed tables get the default partition count
    pub fn from_batch(backend: Backend, batch: RecordBatch) -> Result<Self> {
        match backend {
            Backend::InMemory => Ok(Self::in_memory(batch)),
            Backend::Distributed => {
                Self::distributed(batch, DistributedEngine::default_partitions())
            }
        }
    }

    /// Attach a stable row index numbering the rows `0..row_count` in order
    #[must_use]
    pub fn with_row_index(mut self, name: &str) -> Self {
        let mut next: i64 = 0;
        for partition in &mut self.partitions {
            let rows = partition.batch.row_count();
            partition.index = Some((next..).take(rows).collect());
            next += i64::try_from(rows).unwrap_or(i64::MAX);
        }
        self.index_name = Some(name.to_string());
        self
    }

    fn with_partitions(&self, schema: Arc<Schema>, partitions: Vec<Partition>) -> Self {
        Self {
            backend: self.backend,
            schema,
            partitions,
            index_name: self.index_name.clone(),
        }
    }

    fn engine(&self) -> &'static dyn Engine {
        self.backend.engine()
    }

    /// Backend this table lives on
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Schema of this table
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition batches, in order
    pub fn partitions(&self) -> impl Iterator<Item = &RecordBatch> {
        self.partitions.iter().map(|p| &p.batch)
    }

    /// Name of the row index, if one is attached
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    /// Row index values in partition order, if one is attached
    pub fn row_index(&self) -> Option<Vec<i64>> {
        self.index_name.as_ref()?;
        let mut values = Vec::with_capacity(self.row_count());
        for partition in &self.partitions {
            values.extend_from_slice(partition.index.as_ref()?);
        }
        Some(values)
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.row_count(), self.column_count())
    }

    /// Total number of rows
    pub fn row_count(&self) -> usize {
        self.partitions.iter().map(|p| p.batch.row_count()).sum()
    }

    /// Number of columns
    pub fn column_count(&self) -> usize {
        self.schema.len()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<String> {
        self.schema.names()
    }

    /// Column data types in order
    pub fn dtypes(&self) -> Vec<DataType> {
        self.schema.fields().iter().map(|f| *f.data_type()).collect()
    }

    /// Whether this table has no rows
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Keep only the named columns, in the given order
    pub fn project(&self, names: &[&str]) -> Result<Self> {
        let schema = Arc::new(self.schema.project_by_names(names)?);
        let partitions = self
            .partitions
            .iter()
            .map(|p| {
                Ok(Partition {
                    batch: p.batch.project_by_names(names)?,
                    index: p.index.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.with_partitions(schema, partitions))
    }

    /// All values of one column, concatenated across partitions
    pub fn column(&self, name: &str) -> Result<Column> {
        let parts = self
            .partitions
            .iter()
            .map(|p| p.batch.column_by_name(name))
            .collect::<Result<Vec<_>>>()?;
        Column::concat(name, &parts)
    }

    /// Rows `offset..offset + length`, keeping backend, partitioning and index
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset + length > self.row_count() {
            return Err(Error::IndexOutOfBounds);
        }

        let (start, end) = (offset, offset + length);
        let mut partitions = Vec::new();
        let mut base = 0;
        for partition in &self.partitions {
            let rows = partition.batch.row_count();
            let lo = start.max(base);
            let hi = end.min(base + rows);
            if lo < hi || (rows == 0 && base >= start && base < end) {
                let local = lo - base;
                let len = hi.saturating_sub(lo);
                partitions.push(Partition {
                    batch: partition.batch.slice(local, len)?,
                    index: partition
                        .index
                        .as_ref()
                        .map(|index| index[local..local + len].to_vec()),
                });
            }
            base += rows;
        }

        if partitions.is_empty() {
            partitions.push(Partition {
                batch: RecordBatch::empty(Arc::clone(&self.schema)),
                index: self.index_name.as_ref().map(|_| Vec::new()),
            });
        }

        Ok(self.with_partitions(Arc::clone(&self.schema), partitions))
    }

    /// Per-column boolean mask of missing cells
    pub fn is_missing(&self, missing: &MissingValue) -> Result<Self> {
        self.map_batches(|batch| {
            let masks = batch
                .columns()
                .iter()
                .map(|c| c.missing_mask(missing))
                .collect();
            RecordBatch::from_columns(masks)
        })
    }

    /// Replace missing cells with nulls, keeping the data types
    pub fn mask_missing(&self, missing: &MissingValue) -> Result<Self> {
        self.map_batches(|batch| {
            let masked = batch
                .columns()
                .iter()
                .map(|c| c.mask_missing(missing))
                .collect::<Result<Vec<_>>>()?;
            RecordBatch::from_columns(masked)
        })
    }

    /// Global aggregates: a one-row batch with one column per aggregate
    pub fn aggregate(&self, aggs: &[Aggregation]) -> Result<RecordBatch> {
        self.group_by(&[], aggs)
    }

    /// Grouped aggregates: one row per distinct key, ordered by key.
    ///
    /// Rows with a missing key are skipped. Output columns are the keys
    /// followed by the aggregates.
    pub fn group_by(&self, keys: &[&str], aggs: &[Aggregation]) -> Result<RecordBatch> {
        let keyed = self
            .partitions
            .iter()
            .map(|p| {
                let keys = keys
                    .iter()
                    .map(|&k| p.batch.column_by_name(k).cloned())
                    .collect::<Result<Vec<_>>>()?;
                Ok(KeyedPartition { batch: &p.batch, keys })
            })
            .collect::<Result<Vec<_>>>()?;

        let key_columns = keys
            .iter()
            .map(|&k| Ok((k.to_string(), *self.schema.field_by_name(k)?.data_type())))
            .collect::<Result<Vec<_>>>()?;

        self.finish_grouped(&keyed, &key_columns, aggs)
    }

    /// Group the rows of this table by the rows of a row-aligned target table.
    ///
    /// The target's columns become the keys.
    pub fn group_by_target(&self, target: &Table, aggs: &[Aggregation]) -> Result<RecordBatch> {
        if !self.engine().supports_target_grouping() {
            return Err(Error::BackendUnsupportedOperation {
                backend: self.backend,
                operation: "grouping features by a separate target table".into(),
            });
        }
        if target.row_count() != self.row_count() {
            return Err(Error::SchemaMismatch(format!(
                "target has {} rows, features have {}",
                target.row_count(),
                self.row_count()
            )));
        }

        let mut keyed = Vec::with_capacity(self.partitions.len());
        let mut offset = 0;
        for partition in &self.partitions {
            let rows = partition.batch.row_count();
            let keys = target
                .schema
                .names()
                .iter()
                .map(|name| target.column(name)?.slice(offset, rows))
                .collect::<Result<Vec<_>>>()?;
            keyed.push(KeyedPartition {
                batch: &partition.batch,
                keys,
            });
            offset += rows;
        }

        let key_columns: Vec<(String, DataType)> = target
            .schema
            .fields()
            .iter()
            .map(|f| (f.name().to_string(), *f.data_type()))
            .collect();

        self.finish_grouped(&keyed, &key_columns, aggs)
    }

    fn finish_grouped(
        &self,
        keyed: &[KeyedPartition<'_>],
        key_columns: &[(String, DataType)],
        aggs: &[Aggregation],
    ) -> Result<RecordBatch> {
        let input_types = aggs
            .iter()
            .map(|agg| Ok(*self.schema.field_by_name(&agg.column)?.data_type()))
            .collect::<Result<Vec<_>>>()?;
        let states = self.engine().group_states(keyed, aggs)?;
        finish_states(states, key_columns, aggs, &input_types)
    }

    /// Distinct values of a column in first-occurrence order, nulls included
    pub fn distinct(&self, column: &str) -> Result<Vec<Scalar>> {
        let columns = self
            .partitions
            .iter()
            .map(|p| p.batch.column_by_name(column))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.engine().distinct(&columns))
    }

    /// Apply a row-preserving function to every partition.
    ///
    /// Backend, partitioning and row index are kept. The function must return
    /// as many rows as it receives and the same schema for every partition.
    pub fn map_batches<F>(&self, f: F) -> Result<Self>
    where
        F: Fn(&RecordBatch) -> Result<RecordBatch> + Send + Sync,
    {
        let inputs: Vec<RecordBatch> = self.partitions.iter().map(|p| p.batch.clone()).collect();
        let outputs = self.engine().map_partitions(&inputs, &f)?;

        let mut schema: Option<Arc<Schema>> = None;
        let mut partitions = Vec::with_capacity(outputs.len());
        for (output, input) in outputs.into_iter().zip(&self.partitions) {
            if output.row_count() != input.batch.row_count() {
                return Err(Error::InvalidOperation(format!(
                    "partition function changed the row count from {} to {}",
                    input.batch.row_count(),
                    output.row_count()
                )));
            }
            match &schema {
                Some(schema) => schema.check_compatible(output.schema())?,
                None => schema = Some(Arc::clone(output.schema())),
            }
            partitions.push(Partition {
                batch: output,
                index: input.index.clone(),
            });
        }

        let schema = schema.unwrap_or_else(|| Arc::clone(&self.schema));
        Ok(self.with_partitions(schema, partitions))
    }

    /// Single in-memory batch; rows are sorted by the row index when one is attached
    pub fn to_canonical(&self) -> Result<RecordBatch> {
        let parts: Vec<&RecordBatch> = self.partitions.iter().map(|p| &p.batch).collect();
        let combined = RecordBatch::concat(&parts)?;
        match self.row_index() {
            Some(index) => {
                let mut order: Vec<usize> = (0..index.len()).collect();
                order.sort_by_key(|&i| index[i]);
                combined.take(&order)
            }
            None => Ok(combined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggFunc;
    use proptest::prelude::*;
    use test_case::test_case;

    fn frame() -> RecordBatch {
        RecordBatch::from_columns(vec![
            Column::from_f64("x", vec![1.0, 10.0, 15.0, 15.0, 14.0, f64::NAN]),
            Column::from_opt_strs(
                "c",
                &[Some("t"), Some("f"), Some("m"), None, Some("m"), Some("f")],
            ),
        ])
        .unwrap()
    }

    fn on(backend: Backend) -> Table {
        match backend {
            Backend::InMemory => Table::in_memory(frame()),
            Backend::Distributed => Table::distributed(frame(), 4).unwrap(),
        }
    }

    #[test]
    fn test_split_sizes_match_array_split() {
        assert_eq!(split_sizes(10, 3), vec![4, 3, 3]);
        assert_eq!(split_sizes(2, 4), vec![1, 1, 0, 0]);
    }

    proptest! {
        #[test]
        fn prop_split_sizes_cover_every_row(len in 0usize..500, n in 1usize..40) {
            let sizes = split_sizes(len, n);
            prop_assert_eq!(sizes.len(), n);
            prop_assert_eq!(sizes.iter().sum::<usize>(), len);
            prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1] && w[0] - w[1] <= 1));
        }

        #[test]
        fn prop_partitioning_does_not_change_aggregates(
            values in prop::collection::vec(-1e3f64..1e3, 8..80),
            partitions in 1usize..8,
        ) {
            let batch = RecordBatch::from_columns(vec![Column::from_f64("x", values)]).unwrap();
            let aggs = [Aggregation::min("x"), Aggregation::max("x"), Aggregation::count("x")];
            let local = Table::in_memory(batch.clone()).aggregate(&aggs).unwrap();
            let spread = Table::distributed(batch, partitions).unwrap().aggregate(&aggs).unwrap();
            prop_assert_eq!(local, spread);
        }
    }

    #[test_case(Backend::InMemory ; "in memory")]
    #[test_case(Backend::Distributed ; "distributed")]
    fn test_aggregate_is_backend_independent(backend: Backend) {
        let table = on(backend);
        assert_eq!(table.shape(), (6, 2));
        let out = table
            .aggregate(&[Aggregation::min("x"), Aggregation::max("x"), Aggregation::count("c")])
            .unwrap();
        assert_eq!(out.column(0).unwrap().value(0), Scalar::Float64(1.0));
        assert_eq!(out.column(1).unwrap().value(0), Scalar::Float64(15.0));
        assert_eq!(out.column(2).unwrap().value(0), Scalar::Int64(5));
    }

    #[test_case(Backend::InMemory ; "in memory")]
    #[test_case(Backend::Distributed ; "distributed")]
    fn test_group_by_orders_keys(backend: Backend) {
        let out = on(backend)
            .group_by(&["c"], &[Aggregation::new("c", AggFunc::Count).alias("n")])
            .unwrap();
        let keys: Vec<Scalar> = out.column(0).unwrap().iter().collect();
        assert_eq!(keys, vec![Scalar::from("f"), Scalar::from("m"), Scalar::from("t")]);
        let counts: Vec<Scalar> = out.column_by_name("n").unwrap().iter().collect();
        assert_eq!(counts, vec![Scalar::Int64(2), Scalar::Int64(2), Scalar::Int64(1)]);
    }

    #[test]
    fn test_median_only_in_memory() {
        let median = [Aggregation::median("x")];
        let out = on(Backend::InMemory).aggregate(&median).unwrap();
        assert_eq!(out.column(0).unwrap().value(0), Scalar::Float64(14.0));
        assert!(matches!(
            on(Backend::Distributed).aggregate(&median),
            Err(Error::BackendUnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_group_by_target_rejected_on_distributed() {
        let table = on(Backend::Distributed);
        let target = table.project(&["c"]).unwrap();
        let features = table.project(&["x"]).unwrap();
        assert!(matches!(
            features.group_by_target(&target, &[Aggregation::sum("x")]),
            Err(Error::BackendUnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_group_by_target_in_memory() {
        let table = on(Backend::InMemory);
        let target = table.project(&["c"]).unwrap();
        let features = table.project(&["x"]).unwrap();
        let out = features
            .group_by_target(&target, &[Aggregation::sum("x")])
            .unwrap();
        assert_eq!(out.column_by_name("sum_x").unwrap().value(1), Scalar::Float64(29.0));
    }

    #[test]
    fn test_distinct_includes_nulls() {
        let values = on(Backend::Distributed).distinct("c").unwrap();
        assert_eq!(
            values,
            vec![Scalar::from("t"), Scalar::from("f"), Scalar::from("m"), Scalar::Null]
        );
    }

    #[test]
    fn test_map_batches_keeps_partitioning_and_index() {
        let table = on(Backend::Distributed).with_row_index("__row");
        let masked = table.is_missing(&MissingValue::NaN).unwrap();
        assert_eq!(masked.partition_count(), 4);
        assert_eq!(masked.row_index(), Some((0..6).collect()));
        let canonical = masked.to_canonical().unwrap();
        assert_eq!(canonical.column(0).unwrap().value(5), Scalar::Boolean(true));
        assert_eq!(canonical.column(1).unwrap().value(3), Scalar::Boolean(true));
    }

    #[test]
    fn test_map_batches_rejects_row_count_change() {
        let result = on(Backend::InMemory).map_batches(|batch| batch.slice(0, 1));
        assert!(matches!(result, Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_slice_across_partitions() {
        let table = on(Backend::Distributed).with_row_index("__row");
        let slice = table.slice(1, 3).unwrap();
        assert_eq!(slice.row_count(), 3);
        assert_eq!(slice.row_index(), Some(vec![1, 2, 3]));
        assert_eq!(slice.backend(), Backend::Distributed);
        let empty = table.slice(6, 0).unwrap();
        assert!(empty.is_empty());
    }
}
