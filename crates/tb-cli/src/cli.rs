//! Command-line argument definitions.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tb_core::{BatchId, DateRange, EventSource};
use tb_db::Page;

use crate::commands::import::ImportArgs;

/// Monthly timebook.
///
/// Imports attendance and calendar exports, stages them for review, and
/// reports booked time per cost unit.
#[derive(Debug, Parser)]
#[command(name = "tb", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse source exports for one month and stage them for review.
    Import(ImportArgs),

    /// Show what a staged batch contains.
    Preview {
        /// Batch ID printed by `tb import`.
        batch: BatchId,
    },

    /// Replace the month's committed data with a staged batch.
    Commit {
        /// Batch ID printed by `tb import`.
        batch: BatchId,

        #[command(flatten)]
        month: MonthArgs,
    },

    /// Discard a staged batch.
    Reject {
        /// Batch ID printed by `tb import`.
        batch: BatchId,
    },

    /// Report committed time per cost unit for one month.
    Report {
        #[command(flatten)]
        month: MonthArgs,

        /// Output the aggregated rows as JSON.
        #[arg(long)]
        json: bool,

        /// Show decimal hours instead of minutes.
        #[arg(long)]
        hours: bool,
    },

    /// Show committed row counts and pending batches.
    Status,

    /// List committed EZeit days as JSON lines.
    Days {
        /// Only list days worked.
        #[arg(long)]
        on_work: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// List committed events as JSON lines.
    Events {
        /// Only list events from this source (kapow, outlook).
        #[arg(long)]
        source: Option<EventSource>,

        #[command(flatten)]
        page: PageArgs,
    },
}

/// Paging for the listing commands.
#[derive(Debug, Clone, Copy, Args)]
pub struct PageArgs {
    /// Maximum number of rows.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,

    /// Rows to skip.
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

impl From<PageArgs> for Page {
    fn from(args: PageArgs) -> Self {
        Self {
            limit: args.limit,
            offset: args.offset,
        }
    }
}

/// A calendar month.
#[derive(Debug, Clone, Copy, Args)]
pub struct MonthArgs {
    /// Year, e.g. 2025.
    #[arg(long)]
    pub year: i32,

    /// Month number (1-12).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,
}

impl MonthArgs {
    /// Every date of the month.
    pub fn range(self) -> Result<DateRange> {
        DateRange::month(self.year, self.month)
            .ok_or_else(|| anyhow!("invalid month: {}-{:02}", self.year, self.month))
    }
}
