//! Outlook calendar export (German column headers, `,`-separated).

use std::collections::HashSet;
use std::io::Read;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::json;

use super::{CsvRow, ParseError, read_rows};
use crate::cost_unit::DEFAULT_CATEGORY;
use crate::record::{EventRecord, EventSource};
use crate::types::{DateRange, RecordId};

const FILE: &str = "Outlook";

const SUBJECT: &str = "Betreff";
const START_DATE: &str = "Beginnt am";
const START_TIME: &str = "Beginnt um";
const END_DATE: &str = "Endet am";
const END_TIME: &str = "Endet um";
const CATEGORIES: &str = "Kategorien";

const MANDATORY_COLUMNS: [&str; 6] = [SUBJECT, START_DATE, END_DATE, START_TIME, END_TIME, CATEGORIES];

/// Parses an Outlook calendar export, keeping events that start within `period`.
///
/// Identical rows are dropped (calendar sync occasionally exports an
/// appointment twice). Events are returned sorted by start.
pub fn parse_outlook_events<R: Read>(
    reader: R,
    period: DateRange,
) -> Result<Vec<EventRecord>, ParseError> {
    let rows = read_rows(reader, b',', FILE, &MANDATORY_COLUMNS)?;

    let mut seen = HashSet::new();
    let total = rows.len();
    let unique: Vec<&CsvRow> = rows
        .iter()
        .filter(|row| seen.insert(&row.fields))
        .collect();
    if unique.len() < total {
        tracing::debug!(dropped = total - unique.len(), "dropped duplicate outlook rows");
    }

    let mut events = Vec::new();
    for row in unique {
        let start = timestamp(row, START_DATE, START_TIME)?;
        if !period.contains(start.date()) {
            continue;
        }
        let end = timestamp(row, END_DATE, END_TIME)?;
        let event = EventRecord::new(
            RecordId::generate(),
            start,
            end,
            categories(row.get(CATEGORIES)),
            EventSource::Outlook,
            Some(json!({ "outlook_subject": row.get(SUBJECT) })),
        )
        .map_err(|source| ParseError::Record {
            file: FILE,
            line: row.line,
            source,
        })?;
        events.push(event);
    }

    events.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
    Ok(events)
}

fn timestamp(
    row: &CsvRow,
    date_column: &'static str,
    time_column: &'static str,
) -> Result<NaiveDateTime, ParseError> {
    let format_error = |column: &'static str, value: &str, expected: &'static str| {
        ParseError::Format {
            file: FILE,
            line: row.line,
            column,
            value: value.to_string(),
            expected,
        }
    };
    let raw_date = row.get(date_column);
    let date = NaiveDate::parse_from_str(raw_date, "%d.%m.%Y")
        .map_err(|_| format_error(date_column, raw_date, "DD.MM.YYYY"))?;
    let raw_time = row.get(time_column);
    let time = NaiveTime::parse_from_str(raw_time, "%H:%M:%S")
        .map_err(|_| format_error(time_column, raw_time, "HH:MM:SS"))?;
    Ok(date.and_time(time))
}

/// Splits the `;`-separated category field. No category at all maps to
/// [`DEFAULT_CATEGORY`].
fn categories(raw: &str) -> Vec<String> {
    let categories: Vec<String> = raw
        .split(';')
        .map(str::trim)
        .filter(|category| !category.is_empty())
        .map(str::to_string)
        .collect();
    if categories.is_empty() {
        vec![DEFAULT_CATEGORY.to_string()]
    } else {
        categories
    }
}
