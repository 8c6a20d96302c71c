//! # Sample Loading and Validation
//!
//! Reads a tab-separated file (or an in-memory `DataFrame`) holding one row
//! per individual and turns the time and realized-state columns into a
//! [`Sample`]. Row order defines individual identity.
//!
//! - Column names are configurable through [`SampleColumns`]; every other
//!   column is ignored.
//! - Failures are assumed to be user-input errors, and [`SampleDataError`]
//!   names the offending column and row.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::sample::{Sample, SampleError};

pub const DEFAULT_TIME_COLUMN: &str = "times";
pub const DEFAULT_STATE_COLUMN: &str = "reals";

/// Names of the input columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleColumns {
    pub time: String,
    pub state: String,
}

impl Default for SampleColumns {
    fn default() -> Self {
        Self {
            time: DEFAULT_TIME_COLUMN.to_string(),
            state: DEFAULT_STATE_COLUMN.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SampleDataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. Every individual needs a time and a realized state."
    )]
    MissingValuesFound(String),
    #[error("Column '{column_name}' row {row} holds {value}, which is not a valid state code.")]
    InvalidState {
        column_name: String,
        row: usize,
        value: f64,
    },
    #[error("Invalid sample: {0}")]
    Sample(#[from] SampleError),
}

/// Loads a sample from a tab-separated file with a header row.
pub fn load_sample(path: &str, columns: &SampleColumns) -> Result<Sample, SampleDataError> {
    log::info!("Loading sample from '{path}'");
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b'\t')),
        )
        .finish()?;
    let sample = sample_from_dataframe(&df, columns)?;
    log::info!("Loaded {} individuals", sample.len());
    Ok(sample)
}

/// Builds a sample from the configured columns of `df`.
pub fn sample_from_dataframe(
    df: &DataFrame,
    columns: &SampleColumns,
) -> Result<Sample, SampleDataError> {
    for name in [&columns.time, &columns.state] {
        if !df.get_column_names().iter().any(|c| c.as_str() == name.as_str()) {
            return Err(SampleDataError::ColumnNotFound(name.clone()));
        }
    }

    let times = extract_numeric_column(df, &columns.time)?;
    let states = extract_numeric_column(df, &columns.state)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64
            {
                Ok(value as u32)
            } else {
                Err(SampleDataError::InvalidState {
                    column_name: columns.state.clone(),
                    row,
                    value,
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Sample::new(times, states)?)
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, SampleDataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(SampleDataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || SampleDataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let chunked = casted.f64()?.rechunk();
    Ok(chunked.into_no_null_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_tsv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    fn load(content: &str) -> Result<Sample, SampleDataError> {
        let file = create_test_tsv(content).unwrap();
        load_sample(file.path().to_str().unwrap(), &SampleColumns::default())
    }

    #[test]
    fn loads_times_and_states_in_row_order() {
        let sample = load("id\ttimes\treals\na\t10\t1\nb\t20.5\t0\nc\t30\t2").unwrap();
        assert_eq!(sample.len(), 3);
        assert_eq!(sample.times().collect::<Vec<_>>(), vec![10.0, 20.5, 30.0]);
        assert_eq!(sample.states().collect::<Vec<_>>(), vec![1, 0, 2]);
        assert_eq!(sample.individuals()[2].index, 2);
    }

    #[test]
    fn custom_column_names() {
        let file = create_test_tsv("t\tstatus\n1\t0\n2\t1").unwrap();
        let columns = SampleColumns {
            time: "t".to_string(),
            state: "status".to_string(),
        };
        let sample = load_sample(file.path().to_str().unwrap(), &columns).unwrap();
        assert_eq!(sample.states().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn error_column_not_found() {
        match load("times\tstate\n1\t0").unwrap_err() {
            SampleDataError::ColumnNotFound(col) => assert_eq!(col, "reals"),
            other => panic!("Expected ColumnNotFound, got {:?}", other),
        }
    }

    #[test]
    fn error_missing_values() {
        match load("times\treals\n1\t0\n\t1\n3\t2").unwrap_err() {
            SampleDataError::MissingValuesFound(col) => assert_eq!(col, "times"),
            other => panic!("Expected MissingValuesFound, got {:?}", other),
        }
    }

    #[test]
    fn error_wrong_type() {
        match load("times\treals\n1\t0\nsoon\t1").unwrap_err() {
            SampleDataError::ColumnWrongType { column_name, .. } => {
                assert_eq!(column_name, "times")
            }
            other => panic!("Expected ColumnWrongType, got {:?}", other),
        }
    }

    #[test]
    fn error_fractional_or_negative_state() {
        match load("times\treals\n1\t0.5\n2\t1").unwrap_err() {
            SampleDataError::InvalidState { row, .. } => assert_eq!(row, 0),
            other => panic!("Expected InvalidState, got {:?}", other),
        }
        match load("times\treals\n1\t0\n2\t-1").unwrap_err() {
            SampleDataError::InvalidState { row, .. } => assert_eq!(row, 1),
            other => panic!("Expected InvalidState, got {:?}", other),
        }
    }

    #[test]
    fn error_negative_time() {
        match load("times\treals\n1\t0\n-2\t1").unwrap_err() {
            SampleDataError::Sample(SampleError::NegativeTime { index, .. }) => {
                assert_eq!(index, 1)
            }
            other => panic!("Expected NegativeTime, got {:?}", other),
        }
    }

    #[test]
    fn from_dataframe() {
        let df = df!(
            "times" => &[5.0f64, 7.0],
            "reals" => &[2i64, 0],
        )
        .unwrap();
        let sample = sample_from_dataframe(&df, &SampleColumns::default()).unwrap();
        assert_eq!(sample.states().collect::<Vec<_>>(), vec![2, 0]);
    }
}
