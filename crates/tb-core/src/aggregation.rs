//! Per-day, per-cost-unit time aggregation.
//!
//! Allocates committed event time to cost units and sets it against the
//! minutes booked in the attendance system.
//!
//! # Algorithm Summary
//!
//! 1. Reject the input if any event maps to more than one cost unit
//! 2. For every date of the range, sum event durations per cost unit
//!    (events without a mapped category go to `default_cost_unit`)
//! 3. Fold booked-but-unallocated time into the default bucket
//! 4. Reject the result if any date allocates more event time than was booked

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::cost_unit::{CostUnitConfig, DEFAULT_COST_UNIT, Resolution};
use crate::record::{DayCategory, DayRecord, EventRecord, EventSource};
use crate::types::{DateRange, RecordId};

/// Reasons an aggregate cannot be trusted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// Events whose categories map to more than one cost unit.
    #[error(
        "found {} events with redundant or ambiguous mappings to cost units",
        .0.len()
    )]
    AmbiguousMapping(Vec<AmbiguousEvent>),

    /// Dates where allocated event time exceeds booked time.
    #[error("event time exceeds booked time on {} dates", .0.len())]
    AccountingAnomaly(Vec<DayAggregate>),
}

/// An event whose time cannot be attributed to a single cost unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousEvent {
    pub id: RecordId,
    pub source: EventSource,
    /// The mapped labels that collide, in event order.
    pub categories: Vec<String>,
}

impl AmbiguousEvent {
    /// The offending labels as a single display string.
    pub fn category_combination(&self) -> String {
        self.categories.join(" | ")
    }
}

/// Aggregated time for one calendar date. All values are minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAggregate {
    pub date: NaiveDate,
    /// `None` when no day record exists for the date.
    pub day_category: Option<DayCategory>,
    pub booked_minutes: i64,
    /// Sum over all cost units.
    pub event_minutes: i64,
    /// `booked_minutes - event_minutes`. Negative on anomalous dates.
    pub non_event_minutes: i64,
    /// Event minutes per cost unit; every configured cost unit is present.
    pub cost_units: BTreeMap<String, i64>,
    pub default_cost_unit_inkl_non_event_minutes: i64,
    pub event_minutes_exceed_booked_minutes: bool,
}

impl DayAggregate {
    /// Non-event minutes clamped at zero, for display.
    pub fn display_non_event_minutes(&self) -> i64 {
        self.non_event_minutes.max(0)
    }

    /// Event minutes allocated to one cost unit.
    pub fn minutes_in(&self, cost_unit: &str) -> i64 {
        self.cost_units.get(cost_unit).copied().unwrap_or(0)
    }
}

/// Lists events whose categories resolve to more than one cost unit.
///
/// Sources are checked one after another; within a source, events keep
/// their input order.
pub fn find_ambiguous_events(
    config: &CostUnitConfig,
    events: &[EventRecord],
) -> Vec<AmbiguousEvent> {
    let mut ambiguous = Vec::new();
    for source in EventSource::ALL {
        for event in events.iter().filter(|event| event.source == source) {
            if let Resolution::Ambiguous(labels) = config.resolve(source, &event.categories) {
                ambiguous.push(AmbiguousEvent {
                    id: event.id.clone(),
                    source,
                    categories: labels.into_iter().map(str::to_string).collect(),
                });
            }
        }
    }
    ambiguous
}

/// Aggregates day and event records over `range`.
///
/// The ambiguity check covers every event passed in, including those outside
/// `range`. Days and events outside `range` are otherwise ignored.
pub fn aggregate(
    config: &CostUnitConfig,
    range: DateRange,
    days: &[DayRecord],
    events: &[EventRecord],
) -> Result<Vec<DayAggregate>, AggregationError> {
    let ambiguous = find_ambiguous_events(config, events);
    if !ambiguous.is_empty() {
        return Err(AggregationError::AmbiguousMapping(ambiguous));
    }

    let mut days_by_date: HashMap<NaiveDate, &DayRecord> = HashMap::new();
    for day in days.iter().filter(|day| range.contains(day.date)) {
        if let Some(previous) = days_by_date.insert(day.date, day) {
            tracing::warn!(
                date = %day.date,
                kept = %day.id,
                dropped = %previous.id,
                "multiple day records for one date"
            );
        }
    }

    let mut minutes: HashMap<NaiveDate, BTreeMap<String, i64>> = HashMap::new();
    for event in events
        .iter()
        .filter(|event| range.contains(event.primary_date()))
    {
        let cost_unit = config
            .resolve(event.source, &event.categories)
            .cost_unit()
            .unwrap_or(DEFAULT_COST_UNIT);
        *minutes
            .entry(event.primary_date())
            .or_default()
            .entry(cost_unit.to_string())
            .or_default() += event.duration_minutes();
    }

    let rows: Vec<DayAggregate> = range
        .days()
        .map(|date| {
            let day = days_by_date.get(&date);
            let allocated = minutes.remove(&date).unwrap_or_default();
            build_row(config, date, day.copied(), &allocated)
        })
        .collect();

    let anomalies: Vec<DayAggregate> = rows
        .iter()
        .filter(|row| row.event_minutes_exceed_booked_minutes)
        .cloned()
        .collect();
    if !anomalies.is_empty() {
        return Err(AggregationError::AccountingAnomaly(anomalies));
    }

    Ok(rows)
}

fn build_row(
    config: &CostUnitConfig,
    date: NaiveDate,
    day: Option<&DayRecord>,
    allocated: &BTreeMap<String, i64>,
) -> DayAggregate {
    let cost_units: BTreeMap<String, i64> = config
        .ids()
        .map(|id| (id.to_string(), allocated.get(id).copied().unwrap_or(0)))
        .collect();
    let booked_minutes = day.map_or(0, |day| i64::from(day.booked_minutes));
    let event_minutes: i64 = cost_units.values().sum();
    let non_event_minutes = booked_minutes - event_minutes;
    let default_minutes = cost_units.get(DEFAULT_COST_UNIT).copied().unwrap_or(0);

    DayAggregate {
        date,
        day_category: day.map(|day| day.day_category),
        booked_minutes,
        event_minutes,
        non_event_minutes,
        cost_units,
        default_cost_unit_inkl_non_event_minutes: default_minutes + non_event_minutes,
        event_minutes_exceed_booked_minutes: event_minutes > booked_minutes,
    }
}
