//! Core type definitions with validation.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for core types.
///
/// Raised before anything is written, so a caller can always fix the input
/// and retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An event ends before it starts.
    #[error("event {id} ends before it starts ({start} > {end})")]
    EndBeforeStart {
        id: String,
        start: String,
        end: String,
    },

    /// A date range whose lower bound is after its upper bound.
    #[error("invalid date range: {from} is after {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },

    /// Staged records are dated outside the range they are committed for.
    #[error("{count} staged records are dated outside {from} to {to}")]
    OutsideRange {
        count: usize,
        from: NaiveDate,
        to: NaiveDate,
    },

    /// A set of records written together contains the same key twice.
    #[error("duplicate record ID in batch: {id}")]
    DuplicateRecordId { id: String },

    /// Invalid day category value.
    #[error("invalid day category: {value}")]
    InvalidDayCategory { value: String },

    /// Invalid event source value.
    #[error("invalid event source: {value}")]
    InvalidEventSource { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Generates a fresh random ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

define_string_id!(
    /// A validated record identifier.
    ///
    /// Primary key of both day and event records. Parsers mint a fresh one for
    /// every row they produce, so the same source file imported twice yields
    /// different identifiers.
    RecordId, "record ID"
);

define_string_id!(
    /// A validated batch identifier.
    ///
    /// Groups every record staged by one ingestion attempt, across record types.
    BatchId, "batch ID"
);

/// An inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `from > to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from > to {
            return Err(ValidationError::InvalidDateRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// The full calendar month `year`-`month`.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let from = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        let to = next.pred_opt()?;
        Some(Self { from, to })
    }

    pub const fn from_date(&self) -> NaiveDate {
        self.from
    }

    pub const fn to_date(&self) -> NaiveDate {
        self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Iterates every date of the range in order.
    pub fn days(self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |day| *day <= to)
    }
}
