//! Gaps command: untracked time inside one session.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;
use tally_core::{IntervalSource, SessionId, SessionStore, detect_gaps};
use tally_db::Database;

use super::util::format_secs;
use crate::Config;

#[derive(Debug, Args)]
pub struct GapsArgs {
    /// Session to inspect.
    #[arg(long)]
    pub session: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    args: &GapsArgs,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<()> {
    let id = SessionId::new(args.session.as_str())?;
    let session = db
        .get_session(&id)
        .context("failed to load session")?
        .with_context(|| format!("session {id} not found"))?;
    let intervals = db
        .fetch_session_intervals(&session, now)
        .context("failed to load intervals")?;
    let report = detect_gaps(&session, &intervals, &config.validation_config(), now);

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    writeln!(
        writer,
        "Session {}: {} gaps, {} untracked",
        report.session_id,
        report.gap_count,
        format_secs(report.total_gap_secs)
    )?;
    for gap in &report.gaps {
        writeln!(
            writer,
            "  {} .. {}  {}",
            gap.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            gap.end.to_rfc3339_opts(SecondsFormat::Secs, true),
            format_secs(gap.duration_secs)
        )?;
    }
    if let Some(largest) = &report.largest_gap {
        writeln!(writer, "Largest gap: {}", format_secs(largest.duration_secs))?;
    }
    Ok(())
}
