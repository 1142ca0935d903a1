//! Validate command: compare stored session statistics with recomputed ones.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tally_core::{
    BatchValidation, GapReport, IntervalSource, SessionStore, SessionValidationReport, load_units,
    validate_batch, validate_session,
};
use tally_db::Database;

use super::util::{SessionSelection, format_secs};
use crate::Config;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Validate one session.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub session: Option<String>,

    /// Validate every session clocking in at or after this time.
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Validate every session clocking in before this time.
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Runs validation and returns whether everything passed.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    args: &ValidateArgs,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<bool> {
    let selection = SessionSelection::from_args(
        args.session.as_deref(),
        args.start.as_deref(),
        args.end.as_deref(),
        now,
    )?;
    let validation = config.validation_config();

    if let SessionSelection::One(id) = &selection {
        let session = db
            .get_session(id)
            .context("failed to load session")?
            .with_context(|| format!("session {id} not found"))?;
        let intervals = db
            .fetch_session_intervals(&session, now)
            .context("failed to load intervals")?;
        let report = validate_session(&session, &intervals, &validation, now);
        if args.json {
            writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
        } else {
            write_report(writer, &report)?;
        }
        return Ok(report.overall);
    }

    let ids = selection.session_ids(db)?;
    let (units, failures) = load_units(db, &ids, now);
    let mut batch = validate_batch(&units, &validation, now, config.top_gappiest);
    batch.failures = failures;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&batch)?)?;
    } else {
        write_batch(writer, &batch)?;
    }
    Ok(batch.all_valid())
}

fn write_report<W: Write>(writer: &mut W, report: &SessionValidationReport) -> Result<()> {
    let summary = report.summary();
    let verdict = if summary.valid { "VALID" } else { "INVALID" };
    writeln!(writer, "{}  {verdict}", report.session_id)?;
    for line in &summary.discrepancies {
        writeln!(writer, "  - {line}")?;
    }
    if report.gaps.gap_count > 0 {
        writeln!(
            writer,
            "  gaps: {} totalling {}",
            report.gaps.gap_count,
            format_secs(report.gaps.total_gap_secs)
        )?;
    }
    Ok(())
}

fn write_batch<W: Write>(writer: &mut W, batch: &BatchValidation) -> Result<()> {
    for report in &batch.reports {
        write_report(writer, report)?;
    }
    for failure in &batch.failures {
        writeln!(writer, "{}  FAILED: {}", failure.item, failure.error)?;
    }
    writeln!(
        writer,
        "Checked {} sessions: {} valid, {} invalid, {} failed",
        batch.checked,
        batch.valid,
        batch.invalid,
        batch.failures.len()
    )?;
    if !batch.top_gappiest.is_empty() {
        writeln!(writer, "Most untracked time:")?;
        for gaps in &batch.top_gappiest {
            write_gappy(writer, gaps)?;
        }
    }
    Ok(())
}

fn write_gappy<W: Write>(writer: &mut W, gaps: &GapReport) -> Result<()> {
    writeln!(
        writer,
        "  {}  {} in {} gaps",
        gaps.session_id,
        format_secs(gaps.total_gap_secs),
        gaps.gap_count
    )?;
    Ok(())
}
