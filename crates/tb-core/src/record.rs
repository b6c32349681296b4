//! Day and event records, the two kinds of data that are staged and committed.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::types::{RecordId, ValidationError};

/// How a calendar day was spent according to the attendance system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayCategory {
    OnWork,
    OffWork,
    OvertimeLeave,
    Vacation,
    SickLeave,
}

impl DayCategory {
    pub const ALL: [Self; 5] = [
        Self::OnWork,
        Self::OffWork,
        Self::OvertimeLeave,
        Self::Vacation,
        Self::SickLeave,
    ];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OnWork => "on_work",
            Self::OffWork => "off_work",
            Self::OvertimeLeave => "overtime_leave",
            Self::Vacation => "vacation",
            Self::SickLeave => "sick_leave",
        }
    }
}

impl fmt::Display for DayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DayCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidDayCategory {
                value: s.to_string(),
            })
    }
}

impl Serialize for DayCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DayCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The system an event was exported from.
///
/// Category labels are only meaningful within their source's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventSource {
    Kapow,
    Outlook,
}

impl EventSource {
    pub const ALL: [Self; 2] = [Self::Kapow, Self::Outlook];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Kapow => "kapow",
            Self::Outlook => "outlook",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kapow" => Ok(Self::Kapow),
            "outlook" => Ok(Self::Outlook),
            _ => Err(ValidationError::InvalidEventSource {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for EventSource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One attendance day: how long was worked and what kind of day it was.
///
/// Permanent storage holds at most one row per date. That is not a database
/// constraint; it follows from commits replacing whole date ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayRecord {
    pub id: RecordId,
    pub date: NaiveDate,
    pub booked_minutes: u32,
    pub day_category: DayCategory,
}

impl DayRecord {
    /// Creates a day record with a freshly generated ID.
    pub fn new(date: NaiveDate, booked_minutes: u32, day_category: DayCategory) -> Self {
        Self {
            id: RecordId::generate(),
            date,
            booked_minutes,
            day_category,
        }
    }

    /// The date used for range operations.
    pub const fn primary_date(&self) -> NaiveDate {
        self.date
    }
}

/// A calendar appointment or tracked work session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: RecordId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Source-specific labels, in the order the source listed them.
    pub categories: Vec<String>,
    pub source: EventSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl EventRecord {
    /// Creates an event after checking `end >= start` and that at least one
    /// non-blank category is present.
    pub fn new(
        id: RecordId,
        start: NaiveDateTime,
        end: NaiveDateTime,
        categories: Vec<String>,
        source: EventSource,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::EndBeforeStart {
                id: id.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        if categories.is_empty() || categories.iter().any(|c| c.trim().is_empty()) {
            return Err(ValidationError::Empty {
                field: "event category",
            });
        }
        Ok(Self {
            id,
            start,
            end,
            categories,
            source,
            metadata,
        })
    }

    /// The date used for range operations: the start timestamp truncated to its day.
    pub fn primary_date(&self) -> NaiveDate {
        self.start.date()
    }

    /// Duration in whole minutes, truncated.
    pub fn duration_minutes(&self) -> i64 {
        self.end.signed_duration_since(self.start).num_minutes()
    }
}
