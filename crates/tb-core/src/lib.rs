//! Core domain logic for the timebook.
//!
//! This crate contains the fundamental types and logic for:
//! - Records: attendance days and calendar/session events
//! - Cost units: validated mapping from source categories to buckets
//! - Aggregation: per-day minutes per cost unit, with consistency checks
//! - Parsing: canonical readers for the supported export formats

pub mod aggregation;
pub mod cost_unit;
pub mod parse;
pub mod record;
pub mod types;

pub use aggregation::{AggregationError, AmbiguousEvent, DayAggregate, aggregate};
pub use cost_unit::{
    ConfigError, CostUnit, CostUnitConfig, DEFAULT_CATEGORY, DEFAULT_COST_UNIT,
    OVERHEAD_COST_UNIT, Resolution,
};
pub use parse::{ParseError, parse_ezeit_days, parse_kapow_sessions, parse_outlook_events};
pub use record::{DayCategory, DayRecord, EventRecord, EventSource};
pub use types::{BatchId, DateRange, RecordId, ValidationError};
