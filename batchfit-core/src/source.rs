//! Batch source trait and implementations for training input

use std::collections::VecDeque;

use crate::batch::Batch;
use crate::error::{Error, Result};
use crate::table::split_sizes;

/// A single-pass source of training batches.
///
/// Sources cannot be reset; callers that need several passes must buffer.
pub trait BatchSource: Send {
    /// Retrieve the next batch; `None` once exhausted
    fn next_batch(&mut self) -> Result<Option<Batch>>;

    /// Number of batches still to come, if known
    fn size_hint(&self) -> Option<usize> {
        None
    }
}

/// Source yielding pre-built batches in order
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    batches: VecDeque<Batch>,
}

impl VecSource {
    /// Create a source over the given batches
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            batches: batches.into(),
        }
    }
}

impl BatchSource for VecSource {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        Ok(self.batches.pop_front())
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.batches.len())
    }
}

/// Source splitting one batch into `n` contiguous batches.
///
/// The first `rows % n` batches get one extra row, so sizes differ by at
/// most one. Batches are sliced lazily as they are requested.
#[derive(Debug, Clone)]
pub struct SplitSource {
    /// Batch being split
    batch: Batch,

    /// Remaining batch sizes
    sizes: VecDeque<usize>,

    /// Offset of the next batch
    offset: usize,
}

impl SplitSource {
    /// Split `batch` into `n_batches` batches
    pub fn new(batch: Batch, n_batches: usize) -> Result<Self> {
        if n_batches == 0 {
            return Err(Error::InvalidArgument(
                "cannot split a batch into zero batches".into(),
            ));
        }
        let sizes = split_sizes(batch.row_count(), n_batches).into();
        Ok(Self {
            batch,
            sizes,
            offset: 0,
        })
    }
}

impl BatchSource for SplitSource {
    fn next_batch(&mut self) -> Result<Option<Batch>> {
        let Some(size) = self.sizes.pop_front() else {
            return Ok(None);
        };
        let next = self.batch.slice(self.offset, size)?;
        self.offset += size;
        Ok(Some(next))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.sizes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::record_batch::RecordBatch;
    use crate::table::Table;

    fn batch(rows: usize) -> Batch {
        let values = (0..rows).map(|i| i as f64).collect();
        Batch::new(Table::in_memory(
            RecordBatch::from_columns(vec![Column::from_f64("x", values)]).unwrap(),
        ))
    }

    #[test]
    fn test_split_source_sizes() {
        let mut source = SplitSource::new(batch(10), 3).unwrap();
        assert_eq!(source.size_hint(), Some(3));
        let mut sizes = Vec::new();
        while let Some(next) = source.next_batch().unwrap() {
            sizes.push(next.row_count());
        }
        assert_eq!(sizes, vec![4, 3, 3]);
        assert!(source.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_split_source_rejects_zero() {
        assert!(matches!(
            SplitSource::new(batch(3), 0),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_vec_source_is_single_pass() {
        let mut source = VecSource::new(vec![batch(1), batch(2)]);
        assert_eq!(source.next_batch().unwrap().map(|b| b.row_count()), Some(1));
        assert_eq!(source.next_batch().unwrap().map(|b| b.row_count()), Some(2));
        assert!(source.next_batch().unwrap().is_none());
        assert_eq!(source.size_hint(), Some(0));
    }
}
