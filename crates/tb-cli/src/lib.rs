//! Timebook CLI library.
//!
//! This crate provides the CLI interface for the timebook.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, MonthArgs, PageArgs};
pub use config::Config;
