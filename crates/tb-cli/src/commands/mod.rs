//! CLI subcommand implementations.

pub mod commit;
pub mod import;
pub mod list;
pub mod preview;
pub mod report;
pub mod status;
