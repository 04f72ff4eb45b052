//! Fixed-schema chunk of equally long columns

use std::fmt;
use std::sync::Arc;

use crate::column::Column;
use crate::error::{Error, Result};
use crate::schema::{Field, Schema};

/// A collection of equally long columns sharing one schema
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: Arc<Schema>,
    columns: Vec<Column>,
    row_count: usize,
}

impl RecordBatch {
    /// Create a batch; columns must follow the schema's names and types and share one length
    pub fn new(schema: Arc<Schema>, columns: Vec<Column>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(Error::InvalidArgument(format!(
                "schema has {} columns, got {}",
                schema.len(),
                columns.len()
            )));
        }

        let misplaced = schema.fields().iter().zip(&columns).find(|(field, column)| {
            column.name() != field.name() || !column.data_type().compatible_with(field.data_type())
        });
        if let Some((field, column)) = misplaced {
            return Err(Error::InvalidArgument(format!(
                "column {}: {} does not fit field {}",
                column.name(),
                column.data_type(),
                field
            )));
        }

        let row_count = columns.first().map_or(0, Column::len);
        if let Some(ragged) = columns.iter().find(|c| c.len() != row_count) {
            return Err(Error::InvalidArgument(format!(
                "column '{}' has {} rows, expected {}",
                ragged.name(),
                ragged.len(),
                row_count
            )));
        }

        Ok(Self {
            schema,
            columns,
            row_count,
        })
    }

    /// Create a record batch, deriving the schema from the columns
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name(), c.data_type(), c.null_count() > 0))
            .collect();

        let mut names: Vec<&str> = fields.iter().map(Field::name).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::InvalidArgument(format!(
                "duplicate column name '{}'",
                pair[0]
            )));
        }

        Self::new(Arc::new(Schema::new(fields)), columns)
    }

    /// Create an empty record batch with the given schema
    pub fn empty(schema: Arc<Schema>) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| {
                // Every data type accepts an empty value list
                Column::from_scalars(f.name(), *f.data_type(), &[])
                    .unwrap_or_else(|_| Column::from_f64(f.name(), Vec::new()))
            })
            .collect();

        Self {
            schema,
            columns,
            row_count: 0,
        }
    }

    /// Schema shared with the table this batch belongs to
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Rows
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Column data in schema order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column at a position
    pub fn column(&self, index: usize) -> Result<&Column> {
        self.columns.get(index).ok_or(Error::IndexOutOfBounds)
    }

    /// Column with the given name
    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        let index = self.schema.index_of(name)?;
        self.column(index)
    }

    /// Named columns only, in the requested order
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let schema = Arc::new(self.schema.project_by_names(names)?);
        let columns = names
            .iter()
            .map(|&name| self.column_by_name(name).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema,
            columns,
            row_count: self.row_count,
        })
    }

    /// Rows `offset..offset + length`
    pub fn slice(&self, offset: usize, length: usize) -> Result<Self> {
        if offset + length > self.row_count {
            return Err(Error::IndexOutOfBounds);
        }

        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(offset, length))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            row_count: length,
        })
    }

    /// Gather the given rows in order
    pub fn take(&self, rows: &[usize]) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.take(rows))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            row_count: rows.len(),
        })
    }

    /// Concatenate batches vertically.
    ///
    /// All batches must have the same column names; column types are widened
    /// where they differ only numerically or by null-ness.
    pub fn concat(batches: &[&RecordBatch]) -> Result<Self> {
        let Some(first) = batches.first() else {
            return Err(Error::InvalidArgument(
                "cannot concatenate zero batches".into(),
            ));
        };

        for batch in &batches[1..] {
            first.schema.check_compatible(&batch.schema)?;
        }

        let columns = (0..first.column_count())
            .map(|i| {
                let parts: Vec<&Column> = batches.iter().map(|b| &b.columns[i]).collect();
                Column::concat(first.columns[i].name(), &parts)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_columns(columns)
    }
}

impl fmt::Display for RecordBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} rows)", self.schema, self.row_count)?;
        self.columns.iter().try_for_each(|column| writeln!(f, "{}", column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::Scalar;
    use crate::schema::DataType;

    fn sample() -> RecordBatch {
        RecordBatch::from_columns(vec![
            Column::from_i64("a", vec![1, 2, 3]),
            Column::from_strs("b", &["x", "y", "z"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_ragged_columns() {
        let result = RecordBatch::from_columns(vec![
            Column::from_i64("a", vec![1, 2, 3]),
            Column::from_i64("b", vec![1]),
        ]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let result = RecordBatch::from_columns(vec![
            Column::from_i64("a", vec![1]),
            Column::from_i64("a", vec![2]),
        ]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_project_and_slice() {
        let batch = sample();
        let projected = batch.project_by_names(&["b"]).unwrap();
        assert_eq!(projected.column_count(), 1);
        assert_eq!(projected.column(0).unwrap().value(2), Scalar::from("z"));

        let sliced = batch.slice(1, 2).unwrap();
        assert_eq!(sliced.row_count(), 2);
        assert_eq!(sliced.column_by_name("a").unwrap().value(0), Scalar::Int64(2));
    }

    #[test]
    fn test_concat_widens_types() {
        let ints = sample();
        let floats = RecordBatch::from_columns(vec![
            Column::from_f64("a", vec![4.5]),
            Column::from_strs("b", &["w"]),
        ])
        .unwrap();
        let merged = RecordBatch::concat(&[&ints, &floats]).unwrap();
        assert_eq!(merged.row_count(), 4);
        assert_eq!(*merged.schema().field(0).data_type(), DataType::Float64);
    }

    #[test]
    fn test_empty_keeps_schema() {
        let batch = RecordBatch::empty(Arc::clone(sample().schema()));
        assert_eq!(batch.row_count(), 0);
        assert_eq!(batch.column_count(), 2);
    }
}
