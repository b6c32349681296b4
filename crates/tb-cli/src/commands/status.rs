//! Status command: committed row counts and pending batches.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use tb_db::{Database, RecordKind};

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    writeln!(writer, "Timebook status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(
        writer,
        "Committed: {} days, {} events",
        db.count_committed(RecordKind::Day)?,
        db.count_committed(RecordKind::Event)?
    )?;

    let batches = db.staged_batches()?;
    if batches.is_empty() {
        writeln!(writer, "No pending batches.")?;
        return Ok(());
    }

    writeln!(writer, "Pending batches:")?;
    for batch in batches {
        writeln!(
            writer,
            "- {}  {:<5}  {:>4} rows  staged {}",
            batch.batch_id,
            batch.kind.as_str(),
            batch.rows,
            batch.ingested_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
    }

    Ok(())
}
