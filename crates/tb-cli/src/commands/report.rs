//! Report command: committed time per cost unit for one month.
//!
//! This module implements `tb report`. The human-readable output has one
//! table per ISO calendar week with a column per date and a row per figure:
//!
//! 1. Day category
//! 2. Default cost unit including non-event minutes
//! 3. User-defined cost units
//! 4. Reserved cost units (default, overhead), event minutes only
//! 5. Booked, event and non-event minutes
//!
//! `--json` prints the aggregated rows unchanged.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::Datelike;

use tb_core::cost_unit::RESERVED_COST_UNITS;
use tb_core::{AggregationError, CostUnitConfig, DEFAULT_COST_UNIT, DateRange, DayAggregate};
use tb_db::{Database, DbError};

use crate::MonthArgs;

/// Unit used to render durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Minutes,
    /// Decimal hours, floored to two places.
    Hours,
}

impl Unit {
    pub fn format(self, minutes: i64) -> String {
        match self {
            Self::Minutes => minutes.to_string(),
            Self::Hours => format_hours(minutes),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Minutes => "minutes",
            Self::Hours => "hours",
        }
    }
}

/// Formats minutes as decimal hours, always rounding down to two places.
pub fn format_hours(minutes: i64) -> String {
    let hundredths = (minutes * 100).div_euclid(60);
    let sign = if hundredths < 0 { "-" } else { "" };
    let hundredths = hundredths.abs();
    format!("{sign}{}.{:02}", hundredths / 100, hundredths % 100)
}

/// One table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line<'a> {
    DayCategory,
    DefaultInclNonEvent,
    CostUnit(&'a str),
    Booked,
    Event,
    NonEvent,
}

impl<'a> Line<'a> {
    fn all(config: &'a CostUnitConfig) -> Vec<Self> {
        let mut lines = vec![Self::DayCategory, Self::DefaultInclNonEvent];
        lines.extend(config.user_defined_ids().map(Self::CostUnit));
        lines.extend(RESERVED_COST_UNITS.into_iter().map(Self::CostUnit));
        lines.extend([Self::Booked, Self::Event, Self::NonEvent]);
        lines
    }

    fn label(self, config: &CostUnitConfig, unit: Unit) -> String {
        let default_label = config.label(DEFAULT_COST_UNIT);
        let label = match self {
            Self::DayCategory => "Day category".to_string(),
            Self::DefaultInclNonEvent => format!("{default_label} (incl. non-event minutes)"),
            Self::CostUnit(DEFAULT_COST_UNIT) => format!("{default_label} (only event minutes)"),
            Self::CostUnit(id) => config.label(id).to_string(),
            Self::Booked => "Booked minutes".to_string(),
            Self::Event => "Event minutes".to_string(),
            Self::NonEvent => "Non-event minutes".to_string(),
        };
        label.replace("minutes", unit.name())
    }

    fn value(self, row: &DayAggregate, unit: Unit) -> String {
        match self {
            Self::DayCategory => row
                .day_category
                .map_or_else(|| "-".to_string(), |category| category.to_string()),
            Self::DefaultInclNonEvent => unit.format(row.default_cost_unit_inkl_non_event_minutes),
            Self::CostUnit(id) => unit.format(row.minutes_in(id)),
            Self::Booked => unit.format(row.booked_minutes),
            Self::Event => unit.format(row.event_minutes),
            Self::NonEvent => unit.format(row.display_non_event_minutes()),
        }
    }
}

/// Writes one table per ISO calendar week.
pub fn write_report<W: Write>(
    writer: &mut W,
    config: &CostUnitConfig,
    period: DateRange,
    rows: &[DayAggregate],
    unit: Unit,
) -> Result<()> {
    writeln!(
        writer,
        "TIME BY COST UNIT: {} to {}",
        period.from_date(),
        period.to_date()
    )?;

    for week in rows.chunk_by(|a, b| a.date.iso_week() == b.date.iso_week()) {
        let iso_week = week[0].date.iso_week();
        let title = if iso_week.year() == period.from_date().year() {
            format!("Calendar Week {}", iso_week.week())
        } else {
            format!("Calendar Week {} ({})", iso_week.week(), iso_week.year())
        };
        writeln!(writer)?;
        write_week(writer, config, &title, week, unit)?;
    }
    Ok(())
}

fn write_week<W: Write>(
    writer: &mut W,
    config: &CostUnitConfig,
    title: &str,
    rows: &[DayAggregate],
    unit: Unit,
) -> Result<()> {
    let lines = Line::all(config);
    let labels: Vec<String> = lines.iter().map(|line| line.label(config, unit)).collect();
    let cells: Vec<Vec<String>> = lines
        .iter()
        .map(|line| rows.iter().map(|row| line.value(row, unit)).collect())
        .collect();
    let headers: Vec<String> = rows
        .iter()
        .map(|row| row.date.format("%a %d.%m").to_string())
        .collect();

    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(column, header)| {
            cells
                .iter()
                .map(|values| values[column].chars().count())
                .fold(header.chars().count(), usize::max)
        })
        .collect();

    writeln!(writer, "{title}")?;
    writeln!(writer, "{}", "─".repeat(title.chars().count()))?;
    write!(writer, "{:label_width$}", "")?;
    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "  {header:>width$}")?;
    }
    writeln!(writer)?;
    for (label, values) in labels.iter().zip(&cells) {
        write!(writer, "{label:<label_width$}")?;
        for (value, width) in values.iter().zip(&widths) {
            write!(writer, "  {value:>width$}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Explains why no trustworthy aggregate exists.
pub fn write_aggregation_error<W: Write>(writer: &mut W, err: &AggregationError) -> Result<()> {
    match err {
        AggregationError::AmbiguousMapping(events) => {
            writeln!(writer, "AMBIGUOUS COST-UNIT MAPPINGS")?;
            writeln!(writer, "────────────────────────────")?;
            writeln!(
                writer,
                "These events carry categories of more than one cost unit."
            )?;
            writeln!(
                writer,
                "Fix them at the source or in the cost-unit configuration, then import again."
            )?;
            for event in events {
                writeln!(
                    writer,
                    "- {:<8} {}  {}",
                    event.source.as_str(),
                    event.id,
                    event.category_combination()
                )?;
            }
        }
        AggregationError::AccountingAnomaly(rows) => {
            writeln!(writer, "ACCOUNTING ANOMALIES")?;
            writeln!(writer, "────────────────────")?;
            writeln!(
                writer,
                "Event minutes exceed booked minutes on these dates."
            )?;
            for row in rows {
                writeln!(
                    writer,
                    "- {}  booked {:>4}  events {:>4}  excess {:>4}",
                    row.date,
                    row.booked_minutes,
                    row.event_minutes,
                    row.event_minutes - row.booked_minutes
                )?;
            }
        }
    }
    Ok(())
}

/// Runs the report command.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &CostUnitConfig,
    month: MonthArgs,
    json: bool,
    unit: Unit,
) -> Result<()> {
    let period = month.range()?;
    let rows = match db.aggregate(config, period.from_date(), period.to_date()) {
        Ok(rows) => rows,
        Err(DbError::Aggregation(err)) => {
            write_aggregation_error(writer, &err)?;
            return Err(err.into());
        }
        Err(err) => return Err(err).context("failed to aggregate committed records"),
    };

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        write_report(writer, config, period, &rows, unit)?;
    }
    Ok(())
}
