//! Canonical parsers for the supported export formats.
//!
//! Each parser turns one exported file into validated records, failing with
//! a [`ParseError`] that names the file kind, line and column at fault.

mod ezeit;
mod kapow;
mod outlook;

use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use thiserror::Error;

use crate::types::ValidationError;

pub use ezeit::parse_ezeit_days;
pub use kapow::parse_kapow_sessions;
pub use outlook::parse_outlook_events;

/// Errors raised while parsing an exported file.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The header lacks mandatory columns.
    #[error("import of {file} file failed: missing mandatory columns {missing:?}, got {received:?}")]
    Columns {
        file: &'static str,
        missing: Vec<String>,
        received: Vec<String>,
    },

    /// The file has no header or no data rows.
    #[error("import of {file} file failed: file is empty")]
    Empty { file: &'static str },

    /// A required field is blank.
    #[error("import of {file} file failed: line {line}: empty field \"{column}\" is not allowed")]
    EmptyField {
        file: &'static str,
        line: u64,
        column: &'static str,
    },

    /// A date or time field does not match the expected format.
    #[error(
        "import of {file} file failed: line {line}: invalid value \"{value}\" in \"{column}\", expected {expected}"
    )]
    Format {
        file: &'static str,
        line: u64,
        column: &'static str,
        value: String,
        expected: &'static str,
    },

    /// The day category code is not one of the known codes.
    #[error("import of {file} file failed: line {line}: unknown day category \"{value}\"")]
    UnknownDayCategory {
        file: &'static str,
        line: u64,
        value: String,
    },

    /// The parsed dates do not cover the requested period exactly.
    #[error(
        "import of {file} file failed: all dates from {from} to {to} have to be included; expected {expected} dates, got {got}; unexpected dates: {unexpected:?}"
    )]
    DateRange {
        file: &'static str,
        from: NaiveDate,
        to: NaiveDate,
        expected: usize,
        got: usize,
        unexpected: Vec<NaiveDate>,
    },

    /// A row produced an invalid record.
    #[error("import of {file} file failed: line {line}: {source}")]
    Record {
        file: &'static str,
        line: u64,
        #[source]
        source: ValidationError,
    },

    /// An XML element lacks a required attribute.
    #[error("import of {file} file failed: line {line}: <{element}> lacks attribute \"{attribute}\"")]
    MissingAttribute {
        file: &'static str,
        line: u64,
        element: String,
        attribute: &'static str,
    },

    /// The file could not be read.
    #[error("import of {file} file failed: {source}")]
    Io {
        file: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The XML is not well-formed.
    #[error("import of {file} file failed: {source}")]
    Xml {
        file: &'static str,
        #[source]
        source: roxmltree::Error,
    },

    /// The CSV itself could not be read.
    #[error("import of {file} file failed: {source}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
}

/// One non-blank CSV data row with trimmed values keyed by column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CsvRow {
    line: u64,
    fields: BTreeMap<String, String>,
}

impl CsvRow {
    /// Value of a column; mandatory columns are checked up front, so a
    /// missing key only happens on short rows and reads as blank.
    fn get(&self, column: &str) -> &str {
        self.fields.get(column).map_or("", String::as_str)
    }
}

/// Reads a headed CSV file, checks mandatory columns and drops blank rows.
fn read_rows<R: Read>(
    reader: R,
    delimiter: u8,
    file: &'static str,
    mandatory: &[&str],
) -> Result<Vec<CsvRow>, ParseError> {
    let csv_error = |source| ParseError::Csv { file, source };
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(ParseError::Empty { file });
    }

    let missing: Vec<String> = mandatory
        .iter()
        .filter(|column| !headers.iter().any(|header| header == *column))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ParseError::Columns {
            file,
            missing,
            received: headers,
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, csv::Position::line);
        let fields = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(CsvRow { line, fields });
    }

    if rows.is_empty() {
        return Err(ParseError::Empty { file });
    }
    Ok(rows)
}
