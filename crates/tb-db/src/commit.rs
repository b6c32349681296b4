//! Commit engine: promotes a staged batch into permanent storage.
//!
//! A commit replaces the permanent rows of one record kind over a date range
//! with the rows staged under a batch:
//!
//! 1. Count staged rows; if there are none, the commit is a no-op
//! 2. Refuse the batch if any staged row is dated outside the range
//! 3. Delete permanent rows whose primary date falls in the range
//! 4. Copy the staged rows into the permanent table
//! 5. Delete the staged rows
//!
//! Steps 1-5 run in one transaction. Any error drops the transaction, which
//! rolls every step back.

use chrono::NaiveDate;
use rusqlite::{Transaction, params};
use tb_core::{BatchId, DateRange, ValidationError};

use crate::{Database, DbError, RecordKind, format_date, to_count};

impl Database {
    /// Commits the `kind` rows staged under `batch`, replacing permanent rows
    /// dated within `[min_date, max_date]`.
    ///
    /// Returns the number of rows inserted. A batch with nothing staged (for
    /// example, one that was already committed) commits 0 rows and leaves
    /// permanent storage untouched. A batch holding rows dated outside the
    /// range fails with [`ValidationError::OutsideRange`] and is left staged.
    pub fn commit(
        &mut self,
        kind: RecordKind,
        batch: &BatchId,
        min_date: NaiveDate,
        max_date: NaiveDate,
    ) -> Result<usize, DbError> {
        self.commit_with(kind, batch, min_date, max_date, |_| Ok(()))
    }

    /// Commit with a hook that runs inside the transaction between the range
    /// delete and the insert.
    fn commit_with<F>(
        &mut self,
        kind: RecordKind,
        batch: &BatchId,
        min_date: NaiveDate,
        max_date: NaiveDate,
        after_delete: F,
    ) -> Result<usize, DbError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<(), DbError>,
    {
        let range = DateRange::new(min_date, max_date)?;
        let table = kind.table();
        let cache_table = kind.cache_table();
        let columns = kind.columns();

        let tx = self.conn.transaction()?;

        let staged: i64 = tx.query_row(
            &format!("SELECT COUNT(*) FROM {cache_table} WHERE batch_id = ?1"),
            [batch.as_str()],
            |row| row.get(0),
        )?;
        if staged == 0 {
            tracing::debug!(kind = %kind, batch = %batch, "nothing staged, commit skipped");
            return Ok(0);
        }

        let primary_date = kind.primary_date_column();
        let outside: i64 = tx.query_row(
            &format!(
                "SELECT COUNT(*) FROM {cache_table}
                 WHERE batch_id = ?1 AND DATE({primary_date}) NOT BETWEEN ?2 AND ?3"
            ),
            params![
                batch.as_str(),
                format_date(range.from_date()),
                format_date(range.to_date())
            ],
            |row| row.get(0),
        )?;
        if outside > 0 {
            return Err(ValidationError::OutsideRange {
                count: to_count(outside),
                from: range.from_date(),
                to: range.to_date(),
            }
            .into());
        }

        let replaced = tx.execute(
            &format!("DELETE FROM {table} WHERE DATE({primary_date}) BETWEEN ?1 AND ?2"),
            params![format_date(range.from_date()), format_date(range.to_date())],
        )?;

        after_delete(&tx)?;

        let inserted = tx.execute(
            &format!(
                "INSERT INTO {table} ({columns})
                 SELECT {columns} FROM {cache_table} WHERE batch_id = ?1"
            ),
            [batch.as_str()],
        )?;
        tx.execute(
            &format!("DELETE FROM {cache_table} WHERE batch_id = ?1"),
            [batch.as_str()],
        )?;

        tx.commit()?;

        tracing::debug!(
            kind = %kind,
            batch = %batch,
            from = %range.from_date(),
            to = %range.to_date(),
            replaced,
            inserted,
            "committed staged batch"
        );
        Ok(inserted)
    }

    /// Rejects a staged batch. Permanent storage is not touched.
    pub fn reject(&mut self, kind: RecordKind, batch: &BatchId) -> Result<usize, DbError> {
        self.discard(kind, batch)
    }
}
