//! Listing commands for committed records.
//!
//! Both commands write one JSON object per line, for inspection or piping
//! into other tools.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use tb_core::EventSource;
use tb_db::{Database, Page};

/// Writes one page of committed days.
pub fn days<W: Write>(writer: &mut W, db: &Database, on_work_only: bool, page: Page) -> Result<()> {
    write_lines(writer, &db.list_days(on_work_only, page)?)
}

/// Writes one page of committed events.
pub fn events<W: Write>(
    writer: &mut W,
    db: &Database,
    source: Option<EventSource>,
    page: Page,
) -> Result<()> {
    write_lines(writer, &db.list_events_page(source, page)?)
}

fn write_lines<W: Write, T: Serialize>(writer: &mut W, records: &[T]) -> Result<()> {
    for record in records {
        serde_json::to_writer(&mut *writer, record)?;
        writeln!(writer)?;
    }
    Ok(())
}
