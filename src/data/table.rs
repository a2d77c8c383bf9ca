//! Dataframe-style CSV tables
//!
//! Loads a CSV file with a header row into Arrow record batches, inferring
//! the column types, and pretty-prints the result.

use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::SchemaRef;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use thiserror::Error;

/// Number of records sampled when inferring column types
const SCHEMA_INFERENCE_RECORDS: usize = 100;

/// Errors that can occur while loading a table
#[derive(Debug, Error)]
pub enum TableError {
    /// Failed to open or rewind the input
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema inference or decoding failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

/// A typed, column-oriented table read from CSV
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    /// Reads a CSV document with a header row.
    ///
    /// The input is read twice: once to infer the schema and once to decode.
    pub fn read_csv<R: Read + Seek>(mut reader: R) -> Result<Self, TableError> {
        let format = Format::default().with_header(true);
        let (schema, _) = format.infer_schema(&mut reader, Some(SCHEMA_INFERENCE_RECORDS))?;
        reader.rewind()?;

        let schema = Arc::new(schema);
        let csv_reader = ReaderBuilder::new(schema.clone())
            .with_format(format)
            .build(reader)?;
        let batches = csv_reader.collect::<Result<Vec<_>, _>>()?;

        Ok(Self { schema, batches })
    }

    /// Opens `path` and reads it as a CSV table
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let file = File::open(path)?;
        Self::read_csv(file)
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .collect()
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns a table holding at most the first `n` rows
    pub fn head(&self, n: usize) -> Self {
        let mut remaining = n;
        let mut batches = Vec::new();
        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            batches.push(batch.slice(0, take));
            remaining -= take;
        }

        Self {
            schema: self.schema.clone(),
            batches,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}x{}] Table", self.num_rows(), self.num_columns())?;
        let grid = pretty_format_batches(&self.batches).map_err(|_| fmt::Error)?;
        write!(f, "{}", grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;
    use std::io::Cursor;

    const IRIS_SAMPLE: &str = "\
sepal_length,sepal_width,petal_length,petal_width,species
5.1,3.5,1.4,0.2,Iris-setosa
7.0,3.2,4.7,1.4,Iris-versicolor
6.3,3.3,6.0,2.5,Iris-virginica
";

    fn sample_table() -> Table {
        Table::read_csv(Cursor::new(IRIS_SAMPLE)).expect("sample should load")
    }

    #[test]
    fn test_read_csv_dimensions() {
        let table = sample_table();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 5);
    }

    #[test]
    fn test_read_csv_uses_header_names() {
        let table = sample_table();
        assert_eq!(
            table.column_names(),
            vec!["sepal_length", "sepal_width", "petal_length", "petal_width", "species"]
        );
    }

    #[test]
    fn test_read_csv_infers_column_types() {
        let table = sample_table();
        let schema = table.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Float64);
        assert_eq!(schema.field(4).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_head_limits_rows() {
        let table = sample_table();
        assert_eq!(table.head(2).num_rows(), 2);
        assert_eq!(table.head(10).num_rows(), 3);
        assert_eq!(table.head(0).num_rows(), 0);
        assert_eq!(table.head(0).num_columns(), 5);
    }

    #[test]
    fn test_display_contains_dimensions_and_values() {
        let rendered = sample_table().to_string();
        assert!(rendered.starts_with("[3x5] Table"));
        assert!(rendered.contains("Iris-versicolor"));
        assert!(rendered.contains("sepal_length"));
    }

    #[test]
    fn test_from_missing_path_is_io_error() {
        let result = Table::from_path(Path::new("/nonexistent/iris.csv"));
        assert!(matches!(result, Err(TableError::Io(_))));
    }
}
