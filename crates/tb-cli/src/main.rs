use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tb_cli::commands::report::Unit;
use tb_cli::commands::{commit, import, list, preview, report, status};
use tb_cli::{Cli, Commands, Config};
use tb_db::Database;

/// Open the database, ensuring the parent directory exists, and sweep stale
/// staged batches.
fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let mut db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    db.set_sql_trace(config.trace_sql);

    let evicted = db
        .evict_older_than(config.cache_max_age())
        .context("failed to evict stale staged records")?;
    if evicted > 0 {
        tracing::info!(evicted, "evicted stale staged records");
    }
    Ok(db)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    let mut db = open_database(&config)?;

    let mut out = io::stdout().lock();
    match command {
        Commands::Import(args) => {
            import::run(&mut out, &mut db, args)?;
        }
        Commands::Preview { batch } => preview::run(&mut out, &db, batch)?,
        Commands::Commit { batch, month } => commit::run(&mut out, &mut db, batch, *month)?,
        Commands::Reject { batch } => commit::reject(&mut out, &mut db, batch)?,
        Commands::Report { month, json, hours } => {
            let unit = if *hours { Unit::Hours } else { Unit::Minutes };
            report::run(&mut out, &db, &config.cost_units, *month, *json, unit)?;
        }
        Commands::Status => status::run(&mut out, &db, &config.database_path)?,
        Commands::Days { on_work, page } => list::days(&mut out, &db, *on_work, (*page).into())?,
        Commands::Events { source, page } => {
            list::events(&mut out, &db, *source, (*page).into())?;
        }
    }

    Ok(())
}
