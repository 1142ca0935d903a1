//! Import command for loading intervals, sessions and rules from JSON lines.
//!
//! Each line is an object tagged with `"type"`:
//!
//! ```text
//! {"type":"session","id":"s1","employee_id":"e1","device_id":"d1","clock_in":"2025-03-10T09:00:00Z"}
//! {"type":"interval","employee_id":"e1","device_id":"d1","app_name":"Code","start":"2025-03-10T09:00:00Z","end":"2025-03-10T10:00:00Z"}
//! {"type":"rule","kind":"domain","matcher":"SUFFIX","pattern":"github.com","category":"PRODUCTIVE"}
//! ```
//!
//! Intervals without an `id` are appended after the highest existing id.
//! Rules without an `id` get a random one.

use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tally_core::{
    Category, DEFAULT_PRIORITY, DeviceId, EmployeeId, IntervalId, IntervalSpan, Matcher,
    RuleDefinition, RuleId, RuleKind, RuleScope, ScopeId, UsageInterval, WorkSession,
};
use tally_db::Database;
use uuid::Uuid;

/// Counts of records written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub intervals: usize,
    pub sessions: usize,
    pub rules: usize,
}

pub fn run<R: BufRead>(reader: R, db: &mut Database) -> Result<ImportSummary> {
    let records = parse_records(reader)?;
    store(db, records)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImportRecord {
    Interval(ImportInterval),
    Session(WorkSession),
    Rule(ImportRule),
}

#[derive(Debug, Deserialize)]
struct ImportInterval {
    #[serde(default)]
    id: Option<IntervalId>,
    employee_id: EmployeeId,
    device_id: DeviceId,
    app_name: String,
    #[serde(default)]
    app_identifier: Option<String>,
    #[serde(default)]
    window_title: Option<String>,
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    category: Option<Category>,
    start: DateTime<Utc>,
    /// Missing for an interval that is still open.
    #[serde(default)]
    end: Option<DateTime<Utc>>,
    /// Stored duration. Defaults to `end - start` for closed intervals.
    #[serde(default)]
    duration_secs: Option<i64>,
    #[serde(default)]
    is_idle: bool,
}

impl ImportInterval {
    fn into_interval(self, id: IntervalId) -> UsageInterval {
        let span = match self.end {
            Some(end) => match self.duration_secs {
                Some(duration_secs) => IntervalSpan::Closed {
                    start: self.start,
                    end,
                    duration_secs,
                },
                None => IntervalSpan::closed(self.start, end),
            },
            None => IntervalSpan::Open {
                start: self.start,
                recorded_secs: self.duration_secs.unwrap_or(0),
            },
        };
        UsageInterval {
            id,
            employee_id: self.employee_id,
            device_id: self.device_id,
            app_name: self.app_name,
            app_identifier: self.app_identifier,
            window_title: self.window_title,
            domain: self.domain,
            category: self.category,
            span,
            is_idle: self.is_idle,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImportRule {
    #[serde(default)]
    id: Option<RuleId>,
    kind: RuleKind,
    matcher: String,
    pattern: String,
    category: Category,
    #[serde(default = "default_priority")]
    priority: i32,
    /// Tenant scope. Global when absent.
    #[serde(default)]
    scope: Option<ScopeId>,
    #[serde(default = "default_active")]
    is_active: bool,
}

const fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

const fn default_active() -> bool {
    true
}

impl ImportRule {
    fn into_rule(self) -> Result<RuleDefinition> {
        let matcher = Matcher::parse(self.kind, &self.matcher)?;
        let id = match self.id {
            Some(id) => id,
            None => RuleId::new(Uuid::new_v4().to_string())?,
        };
        Ok(RuleDefinition {
            id,
            kind: self.kind,
            scope: self.scope.map_or(RuleScope::Global, RuleScope::Tenant),
            matcher,
            pattern: self.pattern,
            category: self.category,
            priority: self.priority,
            is_active: self.is_active,
        })
    }
}

fn parse_records<R: BufRead>(reader: R) -> Result<Vec<ImportRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record: ImportRecord = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid record on line {}", idx + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn store(db: &mut Database, records: Vec<ImportRecord>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    let explicit_max = records
        .iter()
        .filter_map(|record| match record {
            ImportRecord::Interval(interval) => interval.id.map(IntervalId::value),
            _ => None,
        })
        .max();
    let mut next_id = db.next_interval_id()?.value();
    if let Some(max) = explicit_max {
        next_id = next_id.max(max + 1);
    }

    let mut intervals = Vec::new();
    for record in records {
        match record {
            ImportRecord::Interval(interval) => {
                let id = interval.id.unwrap_or_else(|| {
                    let id = IntervalId(next_id);
                    next_id += 1;
                    id
                });
                intervals.push(interval.into_interval(id));
            }
            ImportRecord::Session(session) => {
                db.upsert_session(&session)
                    .with_context(|| format!("failed to store session {}", session.id))?;
                summary.sessions += 1;
            }
            ImportRecord::Rule(rule) => {
                let rule = rule.into_rule()?;
                if db
                    .insert_rule(&rule)
                    .with_context(|| format!("failed to store rule {}", rule.id))?
                {
                    summary.rules += 1;
                }
            }
        }
    }
    summary.intervals = db
        .insert_intervals(&intervals)
        .context("failed to store intervals")?;

    tracing::info!(
        intervals = summary.intervals,
        sessions = summary.sessions,
        rules = summary.rules,
        "import complete"
    );
    Ok(summary)
}
