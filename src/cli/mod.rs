//! CLI command definitions for `sb`.
//!
//! This module defines the CLI structure using clap's derive macros and maps
//! each subcommand onto the library. Commands print JSON; warnings go to
//! stderr. The main entry point is the `Cli` struct.

pub mod export;
pub mod tags;
pub mod todos;

use crate::config::Config;
use crate::db::Database;
use crate::types::TodoStatus;
use anyhow::Result;
use clap::{Parser, Subcommand};
use export::ExportArgs;
use serde::Serialize;
use tags::TagCommand;
use todos::TodoCommand;

/// sitback: todos under a tag tree, with dependencies and leases
#[derive(Parser, Debug)]
#[command(name = "sb", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize the database schema
    Init,

    /// Manage todos
    #[command(subcommand)]
    Todo(TodoCommand),

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommand),

    /// Export tag and todo trees
    Export(ExportArgs),
}

impl Command {
    /// Whether the command needs an already-migrated database.
    pub fn requires_initialized_db(&self) -> bool {
        !matches!(self, Command::Init)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Init => "init",
            Command::Todo(cmd) => cmd.name(),
            Command::Tag(cmd) => cmd.name(),
            Command::Export(_) => "export",
        }
    }
}

/// What a command prints: the payload on stdout, warnings on stderr.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub output: String,
    pub warnings: Vec<String>,
}

impl CommandOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            warnings: Vec::new(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::text(serde_json::to_string_pretty(value)?))
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Run one command against an open database.
pub fn execute(db: &Database, config: &Config, command: Command) -> Result<CommandOutput> {
    match command {
        Command::Init => {
            db.run_migrations()?;
            Ok(CommandOutput::text("Database initialized."))
        }
        Command::Todo(cmd) => todos::run(db, config, cmd),
        Command::Tag(cmd) => tags::run(db, cmd),
        Command::Export(args) => export::run_export(db, args),
    }
}

/// clap value parser for todo statuses.
pub(crate) fn parse_status(value: &str) -> std::result::Result<TodoStatus, String> {
    value.parse::<TodoStatus>().map_err(|e| e.to_string())
}

/// clap value parser for ids, which are positive integers.
pub(crate) fn parse_positive_id(value: &str) -> std::result::Result<i64, String> {
    match value.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(format!("'{}' is not a positive integer", value)),
    }
}
