//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tally_core::SessionId;
use tally_db::Database;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$"));

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either RFC 3339 or relative time.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let re = RELATIVE_TIME_RE
        .as_ref()
        .map_err(|err| anyhow::anyhow!("relative time pattern failed to compile: {err}"))?;
    let Some(caps) = re.captures(s.trim()) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use RFC 3339 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now - Duration::minutes(n * minutes_per_unit))
}

/// Which sessions a command operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelection {
    One(SessionId),
    /// Sessions clocking in within `[start, end)`.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl SessionSelection {
    /// Builds a selection from `--session` or `--start`/`--end`.
    pub fn from_args(
        session: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        match (session, start, end) {
            (Some(id), None, None) => Ok(Self::One(SessionId::new(id)?)),
            (None, Some(start), Some(end)) => {
                let start = parse_datetime(start, now).context("invalid --start")?;
                let end = parse_datetime(end, now).context("invalid --end")?;
                if end <= start {
                    anyhow::bail!("--end must be after --start");
                }
                Ok(Self::Range { start, end })
            }
            _ => anyhow::bail!("pass either --session ID or both --start and --end"),
        }
    }

    /// Resolves the selection to session ids.
    pub fn session_ids(&self, db: &Database) -> Result<Vec<SessionId>> {
        match self {
            Self::One(id) => Ok(vec![id.clone()]),
            Self::Range { start, end } => db
                .list_session_ids_in_range(*start, *end)
                .context("failed to list sessions"),
        }
    }
}

/// Formats seconds as `1h 5m 3s`, dropping leading zero units.
pub fn format_secs(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.unsigned_abs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{sign}{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m {seconds}s")
    } else {
        format!("{sign}{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_rfc3339_and_relative_times() {
        assert_eq!(
            parse_datetime("2025-03-10T09:00:00+01:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 8, 0, 0).unwrap()
        );
        assert_eq!(
            parse_datetime("2 hours ago", now()).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 10, 10, 0, 0).unwrap()
        );
        assert_eq!(
            parse_datetime("1 week ago", now()).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_garbage_and_huge_relative_times() {
        assert!(parse_datetime("yesterday-ish", now()).is_err());
        assert!(parse_datetime("99999999 weeks ago", now()).is_err());
    }

    #[test]
    fn selection_requires_session_or_full_range() {
        assert_eq!(
            SessionSelection::from_args(Some("s1"), None, None, now()).unwrap(),
            SessionSelection::One(SessionId::new("s1").unwrap())
        );
        assert!(SessionSelection::from_args(None, None, None, now()).is_err());
        assert!(SessionSelection::from_args(None, Some("1 day ago"), None, now()).is_err());
        assert!(
            SessionSelection::from_args(None, Some("1 hour ago"), Some("2 hours ago"), now())
                .is_err()
        );
        assert!(SessionSelection::from_args(Some("  "), None, None, now()).is_err());
    }

    #[test]
    fn formats_seconds() {
        assert_eq!(format_secs(0), "0s");
        assert_eq!(format_secs(65), "1m 5s");
        assert_eq!(format_secs(18_000), "5h 0m 0s");
        assert_eq!(format_secs(-50), "-50s");
    }
}
