//! Reconcile command: overwrite stored statistics with recomputed values.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use tally_core::{Reconciliation, reconcile, reconcile_batch};
use tally_db::Database;

use super::util::{SessionSelection, format_secs};

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Reconcile one session.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub session: Option<String>,

    /// Reconcile every session clocking in at or after this time.
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Reconcile every session clocking in before this time.
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Runs reconciliation and returns whether every session succeeded.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    args: &ReconcileArgs,
    now: DateTime<Utc>,
) -> Result<bool> {
    let selection = SessionSelection::from_args(
        args.session.as_deref(),
        args.start.as_deref(),
        args.end.as_deref(),
        now,
    )?;

    if let SessionSelection::One(id) = &selection {
        let result = reconcile(db, id, now)?;
        if args.json {
            writeln!(writer, "{}", serde_json::to_string_pretty(&result)?)?;
        } else {
            write_result(writer, &result)?;
        }
        return Ok(true);
    }

    let ids = selection.session_ids(db)?;
    let batch = reconcile_batch(db, &ids, now);
    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&batch)?)?;
    } else {
        for result in &batch.results {
            write_result(writer, result)?;
        }
        for failure in &batch.failures {
            writeln!(writer, "{}  FAILED: {}", failure.item, failure.error)?;
        }
        writeln!(
            writer,
            "Reconciled {} sessions: {} changed, {} failed",
            batch.reconciled, batch.changed, batch.failed
        )?;
    }
    Ok(batch.failed == 0)
}

fn write_result<W: Write>(writer: &mut W, result: &Reconciliation) -> Result<()> {
    if result.changed {
        writeln!(
            writer,
            "{}  updated: total work {} -> {}",
            result.session_id,
            format_secs(result.before.total_work),
            format_secs(result.after.total_work)
        )?;
    } else {
        writeln!(writer, "{}  already up to date", result.session_id)?;
    }
    Ok(())
}
