//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::backfill::BackfillArgs;
use crate::commands::classify::ClassifyArgs;
use crate::commands::gaps::GapsArgs;
use crate::commands::reconcile::ReconcileArgs;
use crate::commands::rules::RulesAction;
use crate::commands::validate::ValidateArgs;

/// Time accounting and productivity classification.
///
/// Classifies application usage into productivity categories, aggregates it
/// into work-session statistics, and checks stored statistics against the
/// raw intervals.
#[derive(Debug, Parser)]
#[command(name = "tally", version, about, long_about = None)]
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
    /// Import intervals, sessions and rules as JSON lines from stdin.
    Import,

    /// Classify one record against the stored rules.
    Classify(ClassifyArgs),

    /// Validate stored session statistics.
    Validate(ValidateArgs),

    /// Show untracked time within a session.
    Gaps(GapsArgs),

    /// Overwrite stored session statistics with recomputed values.
    Reconcile(ReconcileArgs),

    /// Reclassify stored intervals with the current rules.
    Backfill(BackfillArgs),

    /// Manage classification rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}
