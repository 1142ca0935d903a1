use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tally_cli::commands::{backfill, classify, gaps, import, reconcile, rules, validate};
use tally_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(tally_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = tally_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(ExitCode::SUCCESS);
    };

    let (mut db, config) = open_database(cli.config.as_deref())?;
    let now = Utc::now();
    let mut stdout = io::stdout().lock();

    let ok = match command {
        Commands::Import => {
            let summary = import::run(io::stdin().lock(), &mut db)?;
            writeln!(
                stdout,
                "Imported {} intervals, {} sessions, {} rules",
                summary.intervals, summary.sessions, summary.rules
            )?;
            true
        }
        Commands::Classify(args) => {
            classify::run(&mut stdout, &db, args)?;
            true
        }
        Commands::Validate(args) => validate::run(&mut stdout, &db, args, &config, now)?,
        Commands::Gaps(args) => {
            gaps::run(&mut stdout, &db, args, &config, now)?;
            true
        }
        Commands::Reconcile(args) => reconcile::run(&mut stdout, &db, args, now)?,
        Commands::Backfill(args) => backfill::run(&mut stdout, &db, args, &config)?
            .failures
            .is_empty(),
        Commands::Rules { action } => {
            rules::run(&mut stdout, &db, action)?;
            true
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
