//! Read access to committed records and the aggregation entry point.

use chrono::NaiveDate;
use rusqlite::params;
use tb_core::{
    CostUnitConfig, DateRange, DayAggregate, DayCategory, DayRecord, EventRecord, EventSource,
};

use crate::{Database, DbError, RecordKind, format_date, query_records, to_count};

/// A window into a listing: at most `limit` rows after skipping `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    fn bounds(self) -> (i64, i64) {
        (
            i64::try_from(self.limit).unwrap_or(i64::MAX),
            i64::try_from(self.offset).unwrap_or(i64::MAX),
        )
    }
}

impl Database {
    /// Committed day records dated within `[from, to]`, ordered by date.
    pub fn list_days_in_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayRecord>, DbError> {
        let range = DateRange::new(from, to)?;
        let kind = RecordKind::Day;
        let sql = format!(
            "SELECT {} FROM {} WHERE date BETWEEN ?1 AND ?2 ORDER BY date, id",
            kind.columns(),
            kind.table(),
        );
        query_records(
            &self.conn,
            &sql,
            params![format_date(range.from_date()), format_date(range.to_date())],
        )
    }

    /// Every committed event, ordered by start.
    pub fn list_events(&self) -> Result<Vec<EventRecord>, DbError> {
        let kind = RecordKind::Event;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY start_at, id",
            kind.columns(),
            kind.table(),
        );
        query_records(&self.conn, &sql, [])
    }

    /// One page of committed days ordered by date, optionally only on-work days.
    pub fn list_days(&self, on_work_only: bool, page: Page) -> Result<Vec<DayRecord>, DbError> {
        let kind = RecordKind::Day;
        let sql = format!(
            "SELECT {} FROM {}
             WHERE ?1 IS NULL OR day_category = ?1
             ORDER BY date, id LIMIT ?2 OFFSET ?3",
            kind.columns(),
            kind.table(),
        );
        let category = on_work_only.then_some(DayCategory::OnWork.as_str());
        let (limit, offset) = page.bounds();
        query_records(&self.conn, &sql, params![category, limit, offset])
    }

    /// One page of committed events ordered by start, optionally from one source.
    pub fn list_events_page(
        &self,
        source: Option<EventSource>,
        page: Page,
    ) -> Result<Vec<EventRecord>, DbError> {
        let kind = RecordKind::Event;
        let sql = format!(
            "SELECT {} FROM {}
             WHERE ?1 IS NULL OR source = ?1
             ORDER BY start_at, id LIMIT ?2 OFFSET ?3",
            kind.columns(),
            kind.table(),
        );
        let source = source.map(|source| source.as_str());
        let (limit, offset) = page.bounds();
        query_records(&self.conn, &sql, params![source, limit, offset])
    }

    /// Number of committed rows of `kind`.
    pub fn count_committed(&self, kind: RecordKind) -> Result<usize, DbError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(to_count(count))
    }

    /// Aggregates committed records over `[from, to]`.
    ///
    /// The ambiguity check covers every committed event, not only the range.
    pub fn aggregate(
        &self,
        config: &CostUnitConfig,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DayAggregate>, DbError> {
        let range = DateRange::new(from, to)?;
        let days = self.list_days_in_range(from, to)?;
        let events = self.list_events()?;
        tracing::debug!(
            days = days.len(),
            events = events.len(),
            "loaded committed records for aggregation"
        );
        Ok(tb_core::aggregate(config, range, &days, &events)?)
    }
}
