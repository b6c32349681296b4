//! Preview command: shows what a staged batch would commit.

use std::io::Write;

use anyhow::{Result, bail};

use tb_core::{BatchId, DayRecord, EventRecord, EventSource};
use tb_db::Database;

const SAMPLE_ROWS: usize = 3;

pub fn run<W: Write>(writer: &mut W, db: &Database, batch: &BatchId) -> Result<()> {
    let days: Vec<DayRecord> = db.fetch_staged(batch)?;
    let outlook = db.fetch_staged_events(batch, Some(EventSource::Outlook))?;
    let kapow = db.fetch_staged_events(batch, Some(EventSource::Kapow))?;

    if days.is_empty() {
        bail!("no EZeit days staged under batch {batch}; it may have expired, been committed or been rejected");
    }
    if outlook.is_empty() {
        bail!("no Outlook events staged under batch {batch}");
    }

    writeln!(writer, "Batch {batch}")?;

    writeln!(writer)?;
    writeln!(writer, "EZeit: {} rows", days.len())?;
    for day in days.iter().take(SAMPLE_ROWS) {
        writeln!(
            writer,
            "  {}  {:<14}  {:>4} min",
            day.date,
            day.day_category.as_str(),
            day.booked_minutes
        )?;
    }
    write_more(writer, days.len())?;

    for (label, events) in [("Outlook", &outlook), ("Kapow", &kapow)] {
        writeln!(writer)?;
        writeln!(writer, "{label}: {} rows", events.len())?;
        for event in events.iter().take(SAMPLE_ROWS) {
            write_event(writer, event)?;
        }
        write_more(writer, events.len())?;
    }

    Ok(())
}

fn write_event<W: Write>(writer: &mut W, event: &EventRecord) -> Result<()> {
    writeln!(
        writer,
        "  {} - {}  {:>4} min  {}",
        event.start.format("%Y-%m-%d %H:%M"),
        event.end.format("%H:%M"),
        event.duration_minutes(),
        event.categories.join("; ")
    )?;
    Ok(())
}

fn write_more<W: Write>(writer: &mut W, total: usize) -> Result<()> {
    if total > SAMPLE_ROWS {
        writeln!(writer, "  ... and {} more", total - SAMPLE_ROWS)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
    use insta::assert_snapshot;
    use tb_core::{DayCategory, RecordId};

    fn stage_sample(db: &mut Database, batch: &BatchId, with_outlook: bool) {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).unwrap();
        let days: Vec<DayRecord> = (1..=4)
            .map(|d| {
                let category = if d == 1 {
                    DayCategory::OffWork
                } else {
                    DayCategory::OnWork
                };
                DayRecord::new(
                    NaiveDate::from_ymd_opt(2025, 6, d).unwrap(),
                    if d == 1 { 0 } else { 480 },
                    category,
                )
            })
            .collect();
        db.stage(&days, batch, now).unwrap();

        if with_outlook {
            let start =
                NaiveDateTime::parse_from_str("2025-06-02 09:00", "%Y-%m-%d %H:%M").unwrap();
            let events = vec![
                EventRecord::new(
                    RecordId::new("o1").unwrap(),
                    start,
                    start + Duration::minutes(15),
                    vec!["Project A".to_string(), "Admin".to_string()],
                    EventSource::Outlook,
                    None,
                )
                .unwrap(),
                EventRecord::new(
                    RecordId::new("k1").unwrap(),
                    start + Duration::hours(1),
                    start + Duration::hours(2),
                    vec!["alpha".to_string()],
                    EventSource::Kapow,
                    None,
                )
                .unwrap(),
            ];
            db.stage(&events, batch, now).unwrap();
        }
    }

    #[test]
    fn preview_shows_counts_and_samples() {
        let mut db = Database::open_in_memory().unwrap();
        let batch = BatchId::new("b1").unwrap();
        stage_sample(&mut db, &batch, true);

        let mut output = Vec::new();
        run(&mut output, &db, &batch).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Batch b1

        EZeit: 4 rows
          2025-06-01  off_work           0 min
          2025-06-02  on_work          480 min
          2025-06-03  on_work          480 min
          ... and 1 more

        Outlook: 1 rows
          2025-06-02 09:00 - 09:15    15 min  Project A; Admin

        Kapow: 1 rows
          2025-06-02 10:00 - 11:00    60 min  alpha
        ");
    }

    #[test]
    fn preview_requires_outlook_events() {
        let mut db = Database::open_in_memory().unwrap();
        let batch = BatchId::new("b1").unwrap();
        stage_sample(&mut db, &batch, false);

        let err = run(&mut Vec::new(), &db, &batch).unwrap_err();
        assert!(err.to_string().contains("no Outlook events"));
    }

    #[test]
    fn preview_of_unknown_batch_fails() {
        let db = Database::open_in_memory().unwrap();
        let err = run(&mut Vec::new(), &db, &BatchId::new("nope").unwrap()).unwrap_err();
        assert!(err.to_string().contains("no EZeit days"));
    }
}
