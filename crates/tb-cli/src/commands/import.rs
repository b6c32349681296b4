//! Import command: parses one month of source exports and stages them.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use clap::Args;
use serde::Deserialize;

use tb_core::{
    BatchId, DateRange, EventRecord, EventSource, RecordId, ValidationError, parse_ezeit_days,
    parse_kapow_sessions, parse_outlook_events,
};
use tb_db::Database;

use crate::MonthArgs;

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub month: MonthArgs,

    /// EZeit attendance export (`;`-separated CSV).
    #[arg(long)]
    pub ezeit: PathBuf,

    /// Outlook calendar export (`,`-separated CSV).
    #[arg(long)]
    pub outlook: PathBuf,

    /// Kapow session export (XML).
    #[arg(long)]
    pub kapow: Option<PathBuf>,

    /// Additional pre-parsed events, one JSON object per line.
    #[arg(long)]
    pub events: Option<PathBuf>,
}

/// Stages every source under one fresh batch and returns its ID.
pub fn run<W: Write>(writer: &mut W, db: &mut Database, args: &ImportArgs) -> Result<BatchId> {
    let period = args.month.range()?;

    let days = parse_ezeit_days(open(&args.ezeit)?, period)
        .with_context(|| format!("failed to parse {}", args.ezeit.display()))?;
    let mut events = parse_outlook_events(open(&args.outlook)?, period)
        .with_context(|| format!("failed to parse {}", args.outlook.display()))?;
    let outlook_count = events.len();

    if let Some(path) = &args.kapow {
        let sessions = parse_kapow_sessions(open(path)?, period)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        events.extend(sessions);
    }
    let kapow_count = events.len() - outlook_count;

    if let Some(path) = &args.events {
        let extra = parse_events(BufReader::new(open(path)?), period)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        events.extend(extra);
    }

    let batch = BatchId::generate();
    let ingested_at = Utc::now();
    db.stage_import(&days, &events, &batch, ingested_at)
        .context("failed to stage import")?;
    tracing::debug!(batch = %batch, days = days.len(), events = events.len(), "import staged");

    writeln!(writer, "Staged batch {batch}")?;
    writeln!(
        writer,
        "Period: {} to {}",
        period.from_date(),
        period.to_date()
    )?;
    writeln!(writer, "EZeit days: {}", days.len())?;
    writeln!(writer, "Outlook events: {outlook_count}")?;
    writeln!(writer, "Kapow events: {kapow_count}")?;
    writeln!(
        writer,
        "Other events: {}",
        events.len() - outlook_count - kapow_count
    )?;
    writeln!(writer)?;
    writeln!(
        writer,
        "Review with 'tb preview {batch}', then run 'tb commit {batch} --year {} --month {}'.",
        args.month.year, args.month.month
    )?;

    Ok(batch)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("failed to open {}", path.display()))
}

/// Reads JSON-lines events, keeping those that start within `period`.
fn parse_events<R: BufRead>(reader: R, period: DateRange) -> Result<Vec<EventRecord>> {
    let mut events = Vec::new();
    let mut skipped = 0_usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed: ImportEvent = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        let record = parsed
            .into_record()
            .with_context(|| format!("invalid event on line {}", idx + 1))?;
        if period.contains(record.primary_date()) {
            events.push(record);
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "skipped events outside the import period");
    }
    Ok(events)
}

#[derive(Debug, Deserialize)]
struct ImportEvent {
    #[serde(default)]
    id: Option<RecordId>,
    start: NaiveDateTime,
    end: NaiveDateTime,
    categories: Vec<String>,
    source: EventSource,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

impl ImportEvent {
    fn into_record(self) -> Result<EventRecord, ValidationError> {
        EventRecord::new(
            self.id.unwrap_or_else(RecordId::generate),
            self.start,
            self.end,
            self.categories,
            self.source,
            self.metadata,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fmt::Write as _;
    use std::fs;
    use std::io::Cursor;

    use tb_core::DayRecord;

    fn june() -> DateRange {
        DateRange::month(2025, 6).unwrap()
    }

    #[test]
    fn parse_events_reads_json_lines() {
        let input = concat!(
            r#"{"id":"k1","start":"2025-06-02T09:00:00","end":"2025-06-02T10:30:00","categories":["alpha"],"source":"kapow"}"#,
            "\n\n",
            r#"{"start":"2025-06-03T09:00:00","end":"2025-06-03T09:30:00","categories":["beta"],"source":"kapow","metadata":{"ticket":7}}"#,
        );
        let events = parse_events(Cursor::new(input), june()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_str(), "k1");
        assert_eq!(events[0].duration_minutes(), 90);
        assert_eq!(events[1].source, EventSource::Kapow);
        assert_eq!(events[1].metadata, Some(serde_json::json!({"ticket": 7})));
    }

    #[test]
    fn parse_events_skips_events_outside_period() {
        let input = r#"{"start":"2025-07-01T09:00:00","end":"2025-07-01T10:00:00","categories":["alpha"],"source":"kapow"}"#;
        let events = parse_events(Cursor::new(input), june()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn parse_events_rejects_invalid_events() {
        let input = r#"{"start":"2025-06-02T10:00:00","end":"2025-06-02T09:00:00","categories":["alpha"],"source":"kapow"}"#;
        let err = parse_events(Cursor::new(input), june()).unwrap_err();
        assert!(err.to_string().contains("invalid event on line 1"));

        let input = r#"{"start":"2025-06-02T09:00:00","end":"2025-06-02T10:00:00","categories":["alpha"],"source":"jira"}"#;
        let err = parse_events(Cursor::new(input), june()).unwrap_err();
        assert!(err.to_string().contains("invalid JSON on line 1"));
    }

    /// Writes one source file of each kind for June 2025 and returns import
    /// arguments pointing at them.
    fn june_sources(dir: &Path) -> ImportArgs {
        let ezeit = dir.join("ezeit.csv");
        let outlook = dir.join("outlook.csv");
        let kapow = dir.join("kapow.xml");
        let events = dir.join("events.jsonl");

        let mut ezeit_body = String::from("date;time_worked;day_category;comment\n");
        for day in 1..=30 {
            writeln!(ezeit_body, "{day:02}.06.2025;08:00;07:48;").unwrap();
        }
        fs::write(&ezeit, ezeit_body).unwrap();
        fs::write(
            &outlook,
            "Betreff,Beginnt am,Beginnt um,Endet am,Endet um,Kategorien\n\
             Standup,02.06.2025,09:00:00,02.06.2025,09:15:00,Project A\n",
        )
        .unwrap();
        fs::write(
            &kapow,
            r#"<kapow>
  <project name="alpha">
    <session date="2025-06-03" start="09:00:00" stop="10:00:00" billed="1" note="review"/>
    <session date="2025-07-01" start="09:00:00" stop="10:00:00" billed="0" note=""/>
  </project>
</kapow>
"#,
        )
        .unwrap();
        fs::write(
            &events,
            r#"{"id":"k1","start":"2025-06-02T10:00:00","end":"2025-06-02T11:00:00","categories":["alpha"],"source":"kapow"}"#,
        )
        .unwrap();

        ImportArgs {
            month: MonthArgs {
                year: 2025,
                month: 6,
            },
            ezeit,
            outlook,
            kapow: Some(kapow),
            events: Some(events),
        }
    }

    #[test]
    fn run_stages_all_sources_under_one_batch() {
        let temp = tempfile::tempdir().unwrap();
        let args = june_sources(temp.path());

        let mut db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();
        let batch = run(&mut output, &mut db, &args).unwrap();

        let days: Vec<DayRecord> = db.fetch_staged(&batch).unwrap();
        assert_eq!(days.len(), 30);
        let outlook = db
            .fetch_staged_events(&batch, Some(EventSource::Outlook))
            .unwrap();
        assert_eq!(outlook.len(), 1);
        let kapow = db
            .fetch_staged_events(&batch, Some(EventSource::Kapow))
            .unwrap();
        assert_eq!(kapow.len(), 2);
        assert!(kapow.iter().any(|event| event.metadata
            == Some(serde_json::json!({ "kapow_billed": 1, "kapow_note": "review" }))));

        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with(&format!("Staged batch {batch}\n")));
        assert!(output.contains("Period: 2025-06-01 to 2025-06-30"));
        assert!(output.contains("Kapow events: 1\nOther events: 1\n"));
    }

    #[test]
    fn importing_the_same_files_twice_stages_two_batches() {
        let temp = tempfile::tempdir().unwrap();
        let args = june_sources(temp.path());

        let mut db = Database::open_in_memory().unwrap();
        let first = run(&mut Vec::new(), &mut db, &args).unwrap();
        let second = run(&mut Vec::new(), &mut db, &args).unwrap();
        assert_ne!(first, second);

        for batch in [&first, &second] {
            let days: Vec<DayRecord> = db.fetch_staged(batch).unwrap();
            assert_eq!(days.len(), 30);
            let events = db.fetch_staged_events(batch, None).unwrap();
            assert_eq!(events.len(), 3);
            assert!(events.iter().any(|event| event.id.as_str() == "k1"));
        }
    }

    #[test]
    fn failed_import_stages_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let mut args = june_sources(temp.path());
        let events = args.events.clone().unwrap();
        let line = fs::read_to_string(&events).unwrap();
        fs::write(&events, format!("{line}\n{line}\n")).unwrap();
        args.kapow = None;

        let mut db = Database::open_in_memory().unwrap();
        let err = run(&mut Vec::new(), &mut db, &args).unwrap_err();
        assert!(format!("{err:#}").contains("duplicate record ID in batch: k1"));
        assert!(db.staged_batches().unwrap().is_empty());
    }

    #[test]
    fn run_reports_parser_errors_with_file_name() {
        let temp = tempfile::tempdir().unwrap();
        let ezeit = temp.path().join("ezeit.csv");
        fs::write(&ezeit, "date;time_worked\n01.06.2025;08:00\n").unwrap();

        let mut db = Database::open_in_memory().unwrap();
        let args = ImportArgs {
            month: MonthArgs {
                year: 2025,
                month: 6,
            },
            ezeit: ezeit.clone(),
            outlook: temp.path().join("missing.csv"),
            kapow: None,
            events: None,
        };
        let err = run(&mut Vec::new(), &mut db, &args).unwrap_err();
        assert!(err.to_string().contains(&ezeit.display().to_string()));
        assert!(db.staged_batches().unwrap().is_empty());
    }
}
