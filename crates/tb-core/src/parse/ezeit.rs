//! EZeit attendance export: one `;`-separated row per calendar day.

use std::collections::BTreeSet;
use std::io::Read;

use chrono::{NaiveDate, NaiveTime, Timelike};

use super::{CsvRow, ParseError, read_rows};
use crate::record::{DayCategory, DayRecord};
use crate::types::DateRange;

const FILE: &str = "EZeit";

const MANDATORY_COLUMNS: [&str; 4] = ["date", "time_worked", "day_category", "comment"];

/// Comment marking a day that started as work and ended in sick leave.
const SICK_AT_WORK_MARKER: &str = "Erkrankung im Dienst";

/// Parses an EZeit export that must contain exactly the days of `period`.
///
/// Records are returned sorted by date, each with a fresh ID.
pub fn parse_ezeit_days<R: Read>(reader: R, period: DateRange) -> Result<Vec<DayRecord>, ParseError> {
    let rows = read_rows(reader, b';', FILE, &MANDATORY_COLUMNS)?;

    let mut days = rows
        .iter()
        .map(parse_row)
        .collect::<Result<Vec<_>, _>>()?;
    days.sort_by_key(|day| day.date);

    let expected: Vec<NaiveDate> = period.days().collect();
    let parsed: Vec<NaiveDate> = days.iter().map(|day| day.date).collect();
    if parsed != expected {
        let unexpected: BTreeSet<NaiveDate> = parsed
            .iter()
            .filter(|date| !period.contains(**date))
            .copied()
            .collect();
        return Err(ParseError::DateRange {
            file: FILE,
            from: period.from_date(),
            to: period.to_date(),
            expected: expected.len(),
            got: parsed.len(),
            unexpected: unexpected.into_iter().collect(),
        });
    }

    Ok(days)
}

fn parse_row(row: &CsvRow) -> Result<DayRecord, ParseError> {
    let raw_date = row.get("date");
    if raw_date.is_empty() {
        return Err(ParseError::EmptyField {
            file: FILE,
            line: row.line,
            column: "date",
        });
    }
    let date = NaiveDate::parse_from_str(raw_date, "%d.%m.%Y").map_err(|_| ParseError::Format {
        file: FILE,
        line: row.line,
        column: "date",
        value: raw_date.to_string(),
        expected: "DD.MM.YYYY",
    })?;

    let raw_time = match row.get("time_worked") {
        "" => "00:00",
        value => value,
    };
    let time = NaiveTime::parse_from_str(raw_time, "%H:%M").map_err(|_| ParseError::Format {
        file: FILE,
        line: row.line,
        column: "time_worked",
        value: raw_time.to_string(),
        expected: "HH:MM",
    })?;
    let booked_minutes = time.hour() * 60 + time.minute();

    let raw_category = row.get("day_category");
    if raw_category.is_empty() {
        return Err(ParseError::EmptyField {
            file: FILE,
            line: row.line,
            column: "day_category",
        });
    }
    let mut day_category =
        category_from_code(raw_category).ok_or_else(|| ParseError::UnknownDayCategory {
            file: FILE,
            line: row.line,
            value: raw_category.to_string(),
        })?;
    if row.get("comment").contains(SICK_AT_WORK_MARKER) {
        day_category = DayCategory::SickLeave;
    }

    Ok(DayRecord::new(date, booked_minutes, day_category))
}

/// Maps an EZeit day code to a category. The regular working-day code is the
/// contractual daily target time.
fn category_from_code(code: &str) -> Option<DayCategory> {
    match code.to_lowercase().as_str() {
        "07:48" => Some(DayCategory::OnWork),
        "frei" => Some(DayCategory::OffWork),
        "fza" => Some(DayCategory::OvertimeLeave),
        "kr" => Some(DayCategory::SickLeave),
        "url" => Some(DayCategory::Vacation),
        _ => None,
    }
}
