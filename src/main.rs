//! sitback CLI
//!
//! Thin front end over the `sitback` library: parse arguments, set up
//! logging, load configuration, open the database, run one command and print
//! its JSON output.

use anyhow::{Context, Result};
use clap::Parser;
use sitback::cli::{self, Cli};
use sitback::config::Config;
use sitback::db::Database;
use sitback::logging::{self, LogTarget};
use std::path::Path;
use tracing::{debug, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut config = Config::resolve(cli.config.as_deref().map(Path::new))?;

    // Override paths from CLI arguments
    if let Some(db_path) = &cli.database {
        config.database.path = db_path.into();
    }

    config.ensure_db_dir()?;

    let db = Database::connect(&config.database.path, config.database.busy_timeout_ms)
        .with_context(|| format!("opening {}", config.database.path.display()))?;

    if cli.command.requires_initialized_db() {
        if let Some(warning) = db.initialization_warning()? {
            warn!(location = db.location(), "{}", warning);
        }
        db.assert_initialized()?;
    }

    debug!(command = cli.command.name(), location = db.location(), "Dispatching command");

    let result = cli::execute(&db, &config, cli.command)?;

    for warning in &result.warnings {
        eprintln!("{}", warning);
    }
    println!("{}", result.output);

    Ok(())
}
