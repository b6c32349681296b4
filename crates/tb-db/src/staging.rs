//! Staging cache: append-only holding area for not-yet-trusted records.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Transaction, params_from_iter};
use rusqlite::types::Value;
use tb_core::{BatchId, DayRecord, EventRecord, EventSource, ValidationError};

use crate::{
    Database, DbError, Record, RecordKind, format_timestamp, parse_timestamp, query_records,
    to_count,
};

/// A batch waiting in the staging cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBatch {
    pub batch_id: BatchId,
    pub kind: RecordKind,
    pub rows: usize,
    /// Earliest ingestion timestamp of the batch.
    pub ingested_at: DateTime<Utc>,
}

impl Database {
    /// Stages `records` under `batch`.
    ///
    /// Rejects an empty set and duplicate record IDs before writing. The set is
    /// written in one transaction.
    pub fn stage<R: Record>(
        &mut self,
        records: &[R],
        batch: &BatchId,
        ingested_at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        check_staged(records)?;
        let tx = self.conn.transaction()?;
        let staged = insert_staged(&tx, records, batch, ingested_at)?;
        tx.commit()?;
        Ok(staged)
    }

    /// Stages one import: the month's days plus any events, under one batch
    /// and in one transaction. Either everything is staged or nothing is.
    ///
    /// Returns the number of days and events staged.
    pub fn stage_import(
        &mut self,
        days: &[DayRecord],
        events: &[EventRecord],
        batch: &BatchId,
        ingested_at: DateTime<Utc>,
    ) -> Result<(usize, usize), DbError> {
        check_staged(days)?;
        if !events.is_empty() {
            check_staged(events)?;
        }

        let tx = self.conn.transaction()?;
        let staged_days = insert_staged(&tx, days, batch, ingested_at)?;
        let staged_events = if events.is_empty() {
            0
        } else {
            insert_staged(&tx, events, batch, ingested_at)?
        };
        tx.commit()?;
        Ok((staged_days, staged_events))
    }

    /// Returns every record staged under `batch`, ordered by primary date.
    ///
    /// An unknown batch yields an empty list.
    pub fn fetch_staged<R: Record>(&self, batch: &BatchId) -> Result<Vec<R>, DbError> {
        let kind = R::KIND;
        let sql = format!(
            "SELECT {} FROM {} WHERE batch_id = ?1 ORDER BY {}, id",
            kind.columns(),
            kind.cache_table(),
            kind.primary_date_column(),
        );
        query_records(&self.conn, &sql, [batch.as_str()])
    }

    /// Returns staged events for `batch`, optionally only those from `source`.
    pub fn fetch_staged_events(
        &self,
        batch: &BatchId,
        source: Option<EventSource>,
    ) -> Result<Vec<EventRecord>, DbError> {
        let Some(source) = source else {
            return self.fetch_staged(batch);
        };
        let kind = RecordKind::Event;
        let sql = format!(
            "SELECT {} FROM {} WHERE batch_id = ?1 AND source = ?2 ORDER BY {}, id",
            kind.columns(),
            kind.cache_table(),
            kind.primary_date_column(),
        );
        query_records(&self.conn, &sql, [batch.as_str(), source.as_str()])
    }

    /// Deletes every record of `kind` staged under `batch`.
    ///
    /// Discarding an unknown or already-empty batch succeeds and returns 0.
    pub fn discard(&mut self, kind: RecordKind, batch: &BatchId) -> Result<usize, DbError> {
        let removed = self.conn.execute(
            &format!("DELETE FROM {} WHERE batch_id = ?1", kind.cache_table()),
            [batch.as_str()],
        )?;
        tracing::debug!(kind = %kind, batch = %batch, removed, "discarded staged batch");
        Ok(removed)
    }

    /// Evicts staged records ingested more than `max_age` ago.
    pub fn evict_older_than(&mut self, max_age: Duration) -> Result<usize, DbError> {
        self.evict_older_than_at(max_age, Utc::now())
    }

    /// Evicts staged records ingested before `now - max_age`, across every
    /// cache table, in one transaction. Returns the number of rows removed.
    pub fn evict_older_than_at(
        &mut self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        if max_age < Duration::zero() {
            return Err(DbError::InvalidRetention(max_age.num_minutes()));
        }
        let cutoff = format_timestamp(now - max_age);

        let tx = self.conn.transaction()?;
        let mut removed = 0;
        for kind in RecordKind::ALL {
            removed += tx.execute(
                &format!("DELETE FROM {} WHERE ingested_at < ?1", kind.cache_table()),
                [&cutoff],
            )?;
        }
        tx.commit()?;

        tracing::debug!(%cutoff, removed, "evicted stale staged records");
        Ok(removed)
    }

    /// Lists pending batches per record kind, oldest first.
    pub fn staged_batches(&self) -> Result<Vec<StagedBatch>, DbError> {
        let mut batches = Vec::new();
        for kind in RecordKind::ALL {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT batch_id, COUNT(*), MIN(ingested_at) FROM {}
                 GROUP BY batch_id
                 ORDER BY MIN(ingested_at), batch_id",
                kind.cache_table()
            ))?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (batch_id, count, ingested_at) = row?;
                let ingested_at = parse_timestamp(&ingested_at, &batch_id)?;
                batches.push(StagedBatch {
                    batch_id: BatchId::new(batch_id)?,
                    kind,
                    rows: to_count(count),
                    ingested_at,
                });
            }
        }
        batches.sort_by(|a, b| a.ingested_at.cmp(&b.ingested_at));
        Ok(batches)
    }
}

/// Rejects an empty set and duplicate record IDs.
fn check_staged<R: Record>(records: &[R]) -> Result<(), ValidationError> {
    if records.is_empty() {
        return Err(ValidationError::Empty {
            field: "staged records",
        });
    }
    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(record.id()) {
            return Err(ValidationError::DuplicateRecordId {
                id: record.id().to_string(),
            });
        }
    }
    Ok(())
}

fn insert_staged<R: Record>(
    tx: &Transaction<'_>,
    records: &[R],
    batch: &BatchId,
    ingested_at: DateTime<Utc>,
) -> Result<usize, DbError> {
    let kind = R::KIND;
    let placeholders = vec!["?"; kind.column_count() + 2].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}, batch_id, ingested_at) VALUES ({placeholders})",
        kind.cache_table(),
        kind.columns(),
    );
    let ingested_at = format_timestamp(ingested_at);

    let mut stmt = tx.prepare(&sql)?;
    for record in records {
        let mut values = record.to_values()?;
        values.push(Value::Text(batch.to_string()));
        values.push(Value::Text(ingested_at.clone()));
        stmt.execute(params_from_iter(values))?;
    }

    tracing::debug!(kind = %kind, batch = %batch, rows = records.len(), "staged records");
    Ok(records.len())
}
