//! Commit and reject commands: the two terminal decisions on a staged batch.

use std::io::Write;

use anyhow::{Context, Result};

use tb_core::BatchId;
use tb_db::{Database, RecordKind};

use crate::MonthArgs;

/// Commits days, then events, replacing the month's committed data.
pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    batch: &BatchId,
    month: MonthArgs,
) -> Result<()> {
    let period = month.range()?;
    let days = db
        .commit(RecordKind::Day, batch, period.from_date(), period.to_date())
        .context("failed to commit day records")?;
    let events = db
        .commit(
            RecordKind::Event,
            batch,
            period.from_date(),
            period.to_date(),
        )
        .context("failed to commit events")?;

    if days == 0 && events == 0 {
        writeln!(
            writer,
            "Nothing staged under batch {batch}; it may already be committed, rejected or expired."
        )?;
        return Ok(());
    }

    writeln!(writer, "Committed batch {batch} for {} to {}", period.from_date(), period.to_date())?;
    writeln!(writer, "EZeit days: {days}")?;
    writeln!(writer, "Events: {events}")?;
    Ok(())
}

/// Discards every record kind staged under `batch`.
pub fn reject<W: Write>(writer: &mut W, db: &mut Database, batch: &BatchId) -> Result<()> {
    let mut discarded = 0;
    for kind in RecordKind::ALL {
        discarded += db
            .reject(kind, batch)
            .with_context(|| format!("failed to discard staged {kind} records"))?;
    }
    writeln!(writer, "Rejected batch {batch}: {discarded} staged rows discarded")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{NaiveDate, Utc};
    use insta::assert_snapshot;
    use tb_core::{DayCategory, DayRecord};

    fn june() -> MonthArgs {
        MonthArgs {
            year: 2025,
            month: 6,
        }
    }

    fn stage_days(db: &mut Database, batch: &BatchId, minutes: u32) {
        let days: Vec<DayRecord> = (1..=30)
            .map(|d| {
                DayRecord::new(
                    NaiveDate::from_ymd_opt(2025, 6, d).unwrap(),
                    minutes,
                    DayCategory::OnWork,
                )
            })
            .collect();
        db.stage(&days, batch, Utc::now()).unwrap();
    }

    #[test]
    fn commit_moves_batch_and_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let batch = BatchId::new("b1").unwrap();
        stage_days(&mut db, &batch, 480);

        let mut output = Vec::new();
        run(&mut output, &mut db, &batch, june()).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Committed batch b1 for 2025-06-01 to 2025-06-30
        EZeit days: 30
        Events: 0
        ");

        let mut output = Vec::new();
        run(&mut output, &mut db, &batch, june()).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"Nothing staged under batch b1; it may already be committed, rejected or expired.");

        assert_eq!(db.count_committed(RecordKind::Day).unwrap(), 30);
    }

    #[test]
    fn recommitting_a_month_replaces_it() {
        let mut db = Database::open_in_memory().unwrap();
        let first = BatchId::new("first").unwrap();
        let second = BatchId::new("second").unwrap();
        stage_days(&mut db, &first, 480);
        run(&mut Vec::new(), &mut db, &first, june()).unwrap();
        stage_days(&mut db, &second, 420);
        run(&mut Vec::new(), &mut db, &second, june()).unwrap();

        let days = db
            .list_days_in_range(
                NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(),
            )
            .unwrap();
        assert_eq!(days.len(), 30);
        assert!(days.iter().all(|day| day.booked_minutes == 420));
    }

    #[test]
    fn commit_with_the_wrong_month_changes_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        let july = MonthArgs {
            year: 2025,
            month: 7,
        };
        let july_days: Vec<DayRecord> = (1..=31)
            .map(|d| {
                DayRecord::new(
                    NaiveDate::from_ymd_opt(2025, 7, d).unwrap(),
                    480,
                    DayCategory::OnWork,
                )
            })
            .collect();
        let july_batch = BatchId::new("july").unwrap();
        db.stage(&july_days, &july_batch, Utc::now()).unwrap();
        run(&mut Vec::new(), &mut db, &july_batch, july).unwrap();
        let june_batch = BatchId::new("june").unwrap();
        stage_days(&mut db, &june_batch, 480);
        run(&mut Vec::new(), &mut db, &june_batch, june()).unwrap();

        let corrected = BatchId::new("corrected").unwrap();
        stage_days(&mut db, &corrected, 420);
        let err = run(&mut Vec::new(), &mut db, &corrected, july).unwrap_err();
        assert!(format!("{err:#}").contains("30 staged records are dated outside 2025-07-01 to 2025-07-31"));

        let range = |month: MonthArgs| month.range().unwrap();
        let stored_july = db
            .list_days_in_range(range(july).from_date(), range(july).to_date())
            .unwrap();
        assert_eq!(stored_july.len(), 31);
        let stored_june = db
            .list_days_in_range(range(june()).from_date(), range(june()).to_date())
            .unwrap();
        assert_eq!(stored_june.len(), 30);
        assert!(stored_june.iter().all(|day| day.booked_minutes == 480));
        assert_eq!(db.staged_batches().unwrap().len(), 1);
    }

    #[test]
    fn reject_discards_the_batch() {
        let mut db = Database::open_in_memory().unwrap();
        let batch = BatchId::new("b1").unwrap();
        stage_days(&mut db, &batch, 480);

        let mut output = Vec::new();
        reject(&mut output, &mut db, &batch).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @"Rejected batch b1: 30 staged rows discarded");

        assert!(db.staged_batches().unwrap().is_empty());
        assert_eq!(db.count_committed(RecordKind::Day).unwrap(), 0);
    }
}
