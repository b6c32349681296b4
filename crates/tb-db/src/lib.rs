//! Storage layer for the timebook.
//!
//! Provides the staging cache, the commit engine and committed-record queries
//! using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The store is single-writer: every write goes through `&mut Database`, and one
//! commit is one `SQLite` transaction. Nothing here isolates a reader from a
//! commit that lands between two of its queries.
//!
//! # Schema
//!
//! Every record type has a permanent table and a cache table. The cache table
//! repeats the permanent columns and adds `batch_id` and `ingested_at`; it is
//! keyed on `(batch_id, id)`:
//!
//! | Record | Permanent | Cache          | Primary date |
//! |--------|-----------|----------------|--------------|
//! | Day    | `days`    | `days_cache`   | `date`       |
//! | Event  | `events`  | `events_cache` | `start_at`   |
//!
//! Table and column names only ever come from [`RecordKind`]; all values are
//! bound as parameters.
//!
//! ## Timestamp Format
//!
//! - `ingested_at`: RFC 3339 UTC with milliseconds (e.g. `2025-06-01T10:30:00.000Z`),
//!   so lexicographic ordering matches chronological ordering
//! - `date`: `YYYY-MM-DD`
//! - `start_at`/`end_at`: naive local time `YYYY-MM-DDTHH:MM:SS` as exported by the
//!   source; sub-second precision is dropped
//!
//! Event categories are stored as a JSON array, metadata as nullable JSON.

mod commit;
mod query;
mod staging;

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, Params, Row};
use tb_core::{
    AggregationError, DayCategory, DayRecord, EventRecord, EventSource, RecordId,
    ValidationError,
};
use thiserror::Error;

pub use query::Page;
pub use staging::StagedBatch;

const DATE_FORMAT: &str = "%Y-%m-%d";
const EVENT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database. Any such error aborts the
    /// surrounding transaction.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Malformed input, rejected before anything was written.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    /// The committed data cannot produce a trustworthy aggregate.
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    /// Cache retention is negative.
    #[error("invalid cache retention: {0} minutes")]
    InvalidRetention(i64),
    /// Failed to parse a stored ingestion timestamp.
    #[error("invalid ingestion timestamp for batch {batch_id}: {timestamp}")]
    TimestampParse {
        batch_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row does not decode into a valid record.
    #[error("invalid {table} row {id}: {message}")]
    InvalidRow {
        table: &'static str,
        id: String,
        message: String,
    },
}

/// The closed set of record types and their storage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Day,
    Event,
}

impl RecordKind {
    pub const ALL: [Self; 2] = [Self::Day, Self::Event];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Event => "event",
        }
    }

    /// Permanent table.
    pub const fn table(self) -> &'static str {
        match self {
            Self::Day => "days",
            Self::Event => "events",
        }
    }

    /// Staging table.
    pub const fn cache_table(self) -> &'static str {
        match self {
            Self::Day => "days_cache",
            Self::Event => "events_cache",
        }
    }

    /// Columns shared by the permanent and the cache table, in storage order.
    pub const fn columns(self) -> &'static str {
        match self {
            Self::Day => "id, date, booked_minutes, day_category",
            Self::Event => "id, start_at, end_at, categories, source, metadata",
        }
    }

    const fn column_count(self) -> usize {
        match self {
            Self::Day => 4,
            Self::Event => 6,
        }
    }

    /// Column holding the date used for range operations.
    pub const fn primary_date_column(self) -> &'static str {
        match self {
            Self::Day => "date",
            Self::Event => "start_at",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for tb_core::DayRecord {}
    impl Sealed for tb_core::EventRecord {}
}

/// A record type with a storage layout.
///
/// Sealed: implemented exactly for [`DayRecord`] and [`EventRecord`], which
/// ties each Rust type to its [`RecordKind`] at compile time.
pub trait Record: sealed::Sealed + Sized {
    const KIND: RecordKind;

    fn id(&self) -> &RecordId;

    /// Column values in [`RecordKind::columns`] order.
    fn to_values(&self) -> Result<Vec<Value>, DbError>;

    /// Decodes a row selected with [`RecordKind::columns`].
    fn from_row(row: &Row<'_>) -> Result<Self, DbError>;
}

impl Record for DayRecord {
    const KIND: RecordKind = RecordKind::Day;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>, DbError> {
        Ok(vec![
            Value::Text(self.id.to_string()),
            Value::Text(self.date.format(DATE_FORMAT).to_string()),
            Value::Integer(i64::from(self.booked_minutes)),
            Value::Text(self.day_category.as_str().to_string()),
        ])
    }

    fn from_row(row: &Row<'_>) -> Result<Self, DbError> {
        let id: String = row.get(0)?;
        let date: String = row.get(1)?;
        let booked_minutes: i64 = row.get(2)?;
        let day_category: String = row.get(3)?;

        let invalid = |message: String| DbError::InvalidRow {
            table: Self::KIND.table(),
            id: id.clone(),
            message,
        };
        let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|err| invalid(format!("date {date}: {err}")))?;
        let booked_minutes = u32::try_from(booked_minutes)
            .map_err(|_| invalid(format!("booked_minutes out of range: {booked_minutes}")))?;
        let day_category: DayCategory = day_category
            .parse()
            .map_err(|err: ValidationError| invalid(err.to_string()))?;
        let record_id = RecordId::new(id.clone()).map_err(|err| invalid(err.to_string()))?;

        Ok(Self {
            id: record_id,
            date,
            booked_minutes,
            day_category,
        })
    }
}

impl Record for EventRecord {
    const KIND: RecordKind = RecordKind::Event;

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn to_values(&self) -> Result<Vec<Value>, DbError> {
        let encode_error = |err: serde_json::Error| DbError::InvalidRow {
            table: Self::KIND.table(),
            id: self.id.to_string(),
            message: err.to_string(),
        };
        let categories = serde_json::to_string(&self.categories).map_err(encode_error)?;
        let metadata = match &self.metadata {
            Some(metadata) => Value::Text(serde_json::to_string(metadata).map_err(encode_error)?),
            None => Value::Null,
        };
        Ok(vec![
            Value::Text(self.id.to_string()),
            Value::Text(self.start.format(EVENT_TIME_FORMAT).to_string()),
            Value::Text(self.end.format(EVENT_TIME_FORMAT).to_string()),
            Value::Text(categories),
            Value::Text(self.source.as_str().to_string()),
            metadata,
        ])
    }

    fn from_row(row: &Row<'_>) -> Result<Self, DbError> {
        let id: String = row.get(0)?;
        let start: String = row.get(1)?;
        let end: String = row.get(2)?;
        let categories: String = row.get(3)?;
        let source: String = row.get(4)?;
        let metadata: Option<String> = row.get(5)?;

        let invalid = |message: String| DbError::InvalidRow {
            table: Self::KIND.table(),
            id: id.clone(),
            message,
        };
        let start = NaiveDateTime::parse_from_str(&start, EVENT_TIME_FORMAT)
            .map_err(|err| invalid(format!("start_at {start}: {err}")))?;
        let end = NaiveDateTime::parse_from_str(&end, EVENT_TIME_FORMAT)
            .map_err(|err| invalid(format!("end_at {end}: {err}")))?;
        let categories: Vec<String> = serde_json::from_str(&categories)
            .map_err(|err| invalid(format!("categories: {err}")))?;
        let source: EventSource = source
            .parse()
            .map_err(|err: ValidationError| invalid(err.to_string()))?;
        let metadata = metadata
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| invalid(format!("metadata: {err}")))?;
        let record_id = RecordId::new(id.clone()).map_err(|err| invalid(err.to_string()))?;

        Self::new(record_id, start, end, categories, source, metadata)
            .map_err(|err| invalid(err.to_string()))
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for the concurrency model.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS days (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                booked_minutes INTEGER NOT NULL,
                day_category TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_days_date ON days(date);

            -- record IDs are unique per batch; re-importing a file stages
            -- the same IDs under a fresh batch
            CREATE TABLE IF NOT EXISTS days_cache (
                id TEXT NOT NULL,
                date TEXT NOT NULL,
                booked_minutes INTEGER NOT NULL,
                day_category TEXT NOT NULL,
                batch_id TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (batch_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_days_cache_batch ON days_cache(batch_id);
            CREATE INDEX IF NOT EXISTS idx_days_cache_ingested ON days_cache(ingested_at);

            -- start_at/end_at: naive local time, e.g. '2025-06-02T09:00:00'
            -- categories: JSON array of source-specific labels
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                categories TEXT NOT NULL,
                source TEXT NOT NULL,
                metadata TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_at);
            CREATE INDEX IF NOT EXISTS idx_events_source ON events(source);

            CREATE TABLE IF NOT EXISTS events_cache (
                id TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                categories TEXT NOT NULL,
                source TEXT NOT NULL,
                metadata TEXT,
                batch_id TEXT NOT NULL,
                ingested_at TEXT NOT NULL,
                PRIMARY KEY (batch_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_events_cache_batch ON events_cache(batch_id);
            CREATE INDEX IF NOT EXISTS idx_events_cache_ingested ON events_cache(ingested_at);
            ",
        )?;
        Ok(())
    }

    /// Turns statement tracing on or off.
    ///
    /// When on, every executed statement is emitted as a `trace` event on the
    /// `tb_db::sql` target, with bound values expanded.
    pub fn set_sql_trace(&mut self, enabled: bool) {
        let trace_fn: Option<fn(&str)> = if enabled { Some(log_sql) } else { None };
        self.conn.trace(trace_fn);
    }
}

fn log_sql(sql: &str) {
    tracing::trace!(target: "tb_db::sql", "{sql}");
}

/// Runs a record query and decodes every row.
fn query_records<R: Record, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<R>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(R::from_row(row)?);
    }
    Ok(records)
}

fn parse_timestamp(timestamp: &str, batch_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            batch_id: batch_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn to_count(count: i64) -> usize {
    usize::try_from(count).unwrap_or_default()
}
