//! Iris CSV readers
//!
//! Reads the five-column iris dataset either as raw string rows or as typed
//! `IrisRecord`s. The typed reader validates every field and skips rows that
//! do not convert, keeping the reasons so callers can report them.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;

/// Number of fields in every iris row
pub const IRIS_FIELDS: usize = 5;

/// Index of the species column
const SPECIES_COLUMN: usize = 4;

/// A single measurement row of the iris dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrisRecord {
    /// Sepal length in centimetres
    pub sepal_length: f64,
    /// Sepal width in centimetres
    pub sepal_width: f64,
    /// Petal length in centimetres
    pub petal_length: f64,
    /// Petal width in centimetres
    pub petal_width: f64,
    /// Species label, never empty
    pub species: String,
}

/// Reasons a CSV row is rejected
#[derive(Debug, Error)]
pub enum RecordError {
    /// Row has the wrong number of fields
    #[error("wrong number of fields: expected {expected}, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A numeric column could not be parsed
    #[error("unexpected type in column {column}: could not parse float from '{value}'")]
    InvalidFloat { column: usize, value: String },

    /// The species column is empty
    #[error("unexpected type in column {column}: empty string value")]
    EmptyLabel { column: usize },

    /// The CSV reader failed on this row
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A row that did not convert into an `IrisRecord`
#[derive(Debug)]
pub struct RejectedRow {
    /// 1-based line number in the input, when known
    pub line: Option<u64>,
    /// Why the row was rejected
    pub error: RecordError,
}

/// Outcome of a validated read
#[derive(Debug, Default)]
pub struct IrisReport {
    /// Valid records in input order
    pub records: Vec<IrisRecord>,
    /// Rows that were skipped
    pub rejected: Vec<RejectedRow>,
}

/// Converts one CSV row into an `IrisRecord`.
///
/// Columns are checked left to right and the first invalid one is reported.
pub fn parse_record(row: &StringRecord) -> Result<IrisRecord, RecordError> {
    if row.len() != IRIS_FIELDS {
        return Err(RecordError::FieldCount {
            expected: IRIS_FIELDS,
            found: row.len(),
        });
    }

    let mut measurements = [0.0_f64; SPECIES_COLUMN];
    for (column, slot) in measurements.iter_mut().enumerate() {
        let value = &row[column];
        *slot = value.parse::<f64>().map_err(|_| RecordError::InvalidFloat {
            column,
            value: value.to_string(),
        })?;
    }

    let species = &row[SPECIES_COLUMN];
    if species.is_empty() {
        return Err(RecordError::EmptyLabel {
            column: SPECIES_COLUMN,
        });
    }

    let [sepal_length, sepal_width, petal_length, petal_width] = measurements;
    Ok(IrisRecord {
        sepal_length,
        sepal_width,
        petal_length,
        petal_width,
        species: species.to_string(),
    })
}

fn builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true);
    builder
}

/// Reads every row as raw strings, accepting any number of fields per row.
pub fn read_all<R: Read>(reader: R) -> Result<Vec<StringRecord>, csv::Error> {
    builder().from_reader(reader).records().collect()
}

/// Opens `path` and reads every row as raw strings.
pub fn read_all_from_path(path: &Path) -> Result<Vec<StringRecord>, csv::Error> {
    let file = File::open(path)?;
    read_all(file)
}

/// Reads rows one at a time, keeping the ones that convert into `IrisRecord`.
///
/// Only an I/O failure aborts the read; anything wrong with a single row is
/// logged and the row is skipped.
pub fn read_records<R: Read>(reader: R) -> Result<IrisReport, csv::Error> {
    let mut csv_reader = builder().from_reader(reader);
    let mut report = IrisReport::default();

    for result in csv_reader.records() {
        let (line, parsed) = match result {
            Ok(row) => (row.position().map(|p| p.line()), parse_record(&row)),
            Err(err) if err.is_io_error() => return Err(err),
            Err(err) => (err.position().map(|p| p.line()), Err(err.into())),
        };

        match parsed {
            Ok(record) => report.records.push(record),
            Err(error) => {
                match line {
                    Some(line) => warn!("skipping line {}: {}", line, error),
                    None => warn!("skipping row: {}", error),
                }
                report.rejected.push(RejectedRow { line, error });
            }
        }
    }

    debug!(
        "read {} iris records, rejected {}",
        report.records.len(),
        report.rejected.len()
    );
    Ok(report)
}

/// Opens `path` and reads validated iris records from it.
pub fn read_records_from_path(path: &Path) -> Result<IrisReport, csv::Error> {
    let file = File::open(path)?;
    read_records(file)
}
