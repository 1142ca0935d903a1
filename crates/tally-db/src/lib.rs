//! Storage layer for the tally engine.
//!
//! Implements the collaborator traits from [`tally_core::store`] on top of
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Batch validation therefore loads sessions up front and only parallelizes
//! the pure validation step.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with millisecond precision
//! (e.g. `2025-03-10T09:00:00.000Z`), so lexicographic order matches
//! chronological order.
//!
//! - `usage_intervals.id` is the monotonic backfill cursor. An interval with
//!   a NULL `end_time` is still open.
//! - `rules.created_seq` records insertion order, which breaks priority ties.
//!   A NULL `scope_id` marks a global rule.
//! - `work_sessions` holds the six stored statistics columns.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tally_core::store::{
    ActiveRules, IntervalPager, IntervalSource, PageEntry, RuleSource, SessionStore,
    UndecodableInterval,
};
use tally_core::{
    Category, DeviceId, EmployeeId, IntervalId, IntervalSpan, Matcher, RuleDefinition, RuleId,
    RuleKind, RuleScope, ScopeId, SessionId, SessionStatistics, TimeRange, UsageInterval,
    ValidationError, WorkSession,
};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp in {table} row {id}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored value failed domain validation.
    #[error("invalid value in {table} row {id}: {source}")]
    Validation {
        table: &'static str,
        id: String,
        #[source]
        source: ValidationError,
    },
    /// A row targeted by an update does not exist.
    #[error("{table} row {id} not found")]
    NotFound { table: &'static str, id: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS usage_intervals (
                id INTEGER PRIMARY KEY,
                employee_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                app_name TEXT NOT NULL,
                app_identifier TEXT,
                window_title TEXT,
                domain TEXT,
                category TEXT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                is_idle INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_intervals_owner_start
                ON usage_intervals(employee_id, device_id, start_time);

            -- scope_id NULL: global rule
            CREATE TABLE IF NOT EXISTS rules (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                scope_id TEXT,
                matcher_type TEXT NOT NULL,
                pattern TEXT NOT NULL,
                category TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 100,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_seq INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_rules_scope ON rules(scope_id, kind);

            CREATE TABLE IF NOT EXISTS work_sessions (
                id TEXT PRIMARY KEY,
                employee_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                clock_in TEXT NOT NULL,
                clock_out TEXT,
                total_work INTEGER NOT NULL DEFAULT 0,
                active_time INTEGER NOT NULL DEFAULT 0,
                idle_time INTEGER NOT NULL DEFAULT 0,
                productive_time INTEGER NOT NULL DEFAULT 0,
                neutral_time INTEGER NOT NULL DEFAULT 0,
                unproductive_time INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_clock_in ON work_sessions(clock_in);
            ",
        )?;
        Ok(())
    }

    // ========== Intervals ==========

    /// Inserts a batch of intervals, ignoring duplicates by ID.
    pub fn insert_intervals(&mut self, intervals: &[UsageInterval]) -> Result<usize, DbError> {
        if intervals.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO usage_intervals
                (id, employee_id, device_id, app_name, app_identifier, window_title, domain,
                 category, start_time, end_time, duration_seconds, is_idle)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for interval in intervals {
                let (end_time, duration) = match interval.span {
                    IntervalSpan::Closed {
                        end, duration_secs, ..
                    } => (Some(format_timestamp(end)), duration_secs),
                    IntervalSpan::Open { recorded_secs, .. } => (None, recorded_secs),
                };
                inserted += stmt.execute(params![
                    interval.id.value(),
                    interval.employee_id.as_str(),
                    interval.device_id.as_str(),
                    interval.app_name,
                    interval.app_identifier,
                    interval.window_title,
                    interval.domain,
                    interval.category.map(|c| c.as_str()),
                    format_timestamp(interval.start()),
                    end_time,
                    duration,
                    interval.is_idle,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// The id the next appended interval should use.
    pub fn next_interval_id(&self) -> Result<IntervalId, DbError> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(id) FROM usage_intervals", [], |row| row.get(0))?;
        Ok(IntervalId(max.unwrap_or(0) + 1))
    }

    // ========== Rules ==========

    /// Inserts a rule, ignoring duplicates by ID. Returns whether a row was added.
    pub fn insert_rule(&self, rule: &RuleDefinition) -> Result<bool, DbError> {
        let scope_id = match &rule.scope {
            RuleScope::Global => None,
            RuleScope::Tenant(scope) => Some(scope.as_str()),
        };
        let inserted = self.conn.execute(
            "
            INSERT OR IGNORE INTO rules
            (id, kind, scope_id, matcher_type, pattern, category, priority, is_active, created_seq)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                    (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM rules))
            ",
            params![
                rule.id.as_str(),
                rule.kind.as_str(),
                scope_id,
                rule.matcher.as_str(),
                rule.pattern,
                rule.category.as_str(),
                rule.priority,
                rule.is_active,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Lists every rule, active or not, in creation order.
    pub fn list_rules(&self) -> Result<Vec<RuleDefinition>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, kind, scope_id, matcher_type, pattern, category, priority, is_active
            FROM rules
            ORDER BY created_seq ASC
            ",
        )?;
        let rows = stmt.query_map([], RuleRow::from_row)?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row?.into_rule()?);
        }
        Ok(rules)
    }

    // ========== Sessions ==========

    /// Inserts or replaces a work session, including its stored statistics.
    pub fn upsert_session(&self, session: &WorkSession) -> Result<(), DbError> {
        let stats = &session.stored;
        self.conn.execute(
            "
            INSERT INTO work_sessions
            (id, employee_id, device_id, clock_in, clock_out, total_work, active_time,
             idle_time, productive_time, neutral_time, unproductive_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                employee_id = excluded.employee_id,
                device_id = excluded.device_id,
                clock_in = excluded.clock_in,
                clock_out = excluded.clock_out,
                total_work = excluded.total_work,
                active_time = excluded.active_time,
                idle_time = excluded.idle_time,
                productive_time = excluded.productive_time,
                neutral_time = excluded.neutral_time,
                unproductive_time = excluded.unproductive_time
            ",
            params![
                session.id.as_str(),
                session.employee_id.as_str(),
                session.device_id.as_str(),
                format_timestamp(session.clock_in),
                session.clock_out.map(format_timestamp),
                stats.total_work,
                stats.active_time,
                stats.idle_time,
                stats.productive_time,
                stats.neutral_time,
                stats.unproductive_time,
            ],
        )?;
        Ok(())
    }

    /// Lists ids of sessions that clocked in within a time range.
    ///
    /// The range is inclusive of `start` and exclusive of `end`.
    pub fn list_session_ids_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionId>, DbError> {
        if end <= start {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT id FROM work_sessions
            WHERE clock_in >= ? AND clock_in < ?
            ORDER BY clock_in ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([format_timestamp(start), format_timestamp(end)], |row| {
            row.get::<_, String>(0)
        })?;
        let mut ids = Vec::new();
        for row in rows {
            let id = row?;
            ids.push(SessionId::new(&id).map_err(|source| DbError::Validation {
                table: "work_sessions",
                id,
                source,
            })?);
        }
        Ok(ids)
    }
}

impl IntervalSource for Database {
    type Error = DbError;

    fn fetch_intervals(
        &self,
        employee: &EmployeeId,
        device: &DeviceId,
        range: TimeRange,
    ) -> Result<Vec<UsageInterval>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {INTERVAL_COLUMNS}
            FROM usage_intervals
            WHERE employee_id = ? AND device_id = ? AND start_time >= ? AND start_time < ?
            ORDER BY start_time ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                employee.as_str(),
                device.as_str(),
                format_timestamp(range.start),
                format_timestamp(range.end),
            ],
            IntervalRow::from_row,
        )?;
        collect_intervals(rows)
    }
}

impl RuleSource for Database {
    type Error = DbError;

    fn fetch_active_rules(&self, scope: Option<&ScopeId>) -> Result<ActiveRules, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, kind, scope_id, matcher_type, pattern, category, priority, is_active
            FROM rules
            WHERE is_active = 1 AND (scope_id IS NULL OR scope_id = ?)
            ORDER BY created_seq ASC
            ",
        )?;
        let rows = stmt.query_map([scope.map(ScopeId::as_str)], RuleRow::from_row)?;
        let mut active = ActiveRules::default();
        for row in rows {
            let rule = row?.into_rule()?;
            match rule.kind {
                RuleKind::App => active.app_rules.push(rule),
                RuleKind::Domain => active.domain_rules.push(rule),
            }
        }
        tracing::debug!(
            scope = scope.map(ScopeId::as_str),
            app_rules = active.app_rules.len(),
            domain_rules = active.domain_rules.len(),
            "loaded active rules"
        );
        Ok(active)
    }
}

impl SessionStore for Database {
    fn get_session(&self, id: &SessionId) -> Result<Option<WorkSession>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, employee_id, device_id, clock_in, clock_out, total_work, active_time,
                       idle_time, productive_time, neutral_time, unproductive_time
                FROM work_sessions
                WHERE id = ?
                ",
                [id.as_str()],
                SessionRow::from_row,
            )
            .optional()?;
        row.map(SessionRow::into_session).transpose()
    }

    fn update_session_stats(
        &self,
        id: &SessionId,
        stats: &SessionStatistics,
    ) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "
            UPDATE work_sessions
            SET total_work = ?, active_time = ?, idle_time = ?,
                productive_time = ?, neutral_time = ?, unproductive_time = ?
            WHERE id = ?
            ",
            params![
                stats.total_work,
                stats.active_time,
                stats.idle_time,
                stats.productive_time,
                stats.neutral_time,
                stats.unproductive_time,
                id.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound {
                table: "work_sessions",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

impl IntervalPager for Database {
    type Error = DbError;

    fn fetch_interval_page(
        &self,
        after: Option<IntervalId>,
        limit: usize,
    ) -> Result<Vec<PageEntry<DbError>>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {INTERVAL_COLUMNS}
            FROM usage_intervals
            WHERE id > ?
            ORDER BY id ASC
            LIMIT ?
            "
        ))?;
        let after = after.map_or(i64::MIN, IntervalId::value);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        // The id is read on its own so a row with bad columns still has one.
        let rows = stmt.query_map(params![after, limit], |row| {
            Ok((row.get::<_, i64>(0)?, IntervalRow::from_row(row)))
        })?;

        let mut page = Vec::new();
        for row in rows {
            let (id, decoded) = row?;
            let entry = decoded
                .map_err(DbError::from)
                .and_then(IntervalRow::into_interval)
                .map_err(|error| UndecodableInterval {
                    id: IntervalId(id),
                    error,
                });
            page.push(entry);
        }
        Ok(page)
    }

    fn update_interval_category(&self, id: IntervalId, category: Category) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE usage_intervals SET category = ? WHERE id = ?",
            params![category.as_str(), id.value()],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound {
                table: "usage_intervals",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

// ========== Row mapping ==========

const INTERVAL_COLUMNS: &str = "id, employee_id, device_id, app_name, app_identifier, \
     window_title, domain, category, start_time, end_time, duration_seconds, is_idle";

struct IntervalRow {
    id: i64,
    employee_id: String,
    device_id: String,
    app_name: String,
    app_identifier: Option<String>,
    window_title: Option<String>,
    domain: Option<String>,
    category: Option<String>,
    start_time: String,
    end_time: Option<String>,
    duration_seconds: i64,
    is_idle: bool,
}

impl IntervalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            employee_id: row.get(1)?,
            device_id: row.get(2)?,
            app_name: row.get(3)?,
            app_identifier: row.get(4)?,
            window_title: row.get(5)?,
            domain: row.get(6)?,
            category: row.get(7)?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
            duration_seconds: row.get(10)?,
            is_idle: row.get(11)?,
        })
    }

    fn into_interval(self) -> Result<UsageInterval, DbError> {
        const TABLE: &str = "usage_intervals";
        let row_id = self.id.to_string();
        let invalid = |source| DbError::Validation {
            table: TABLE,
            id: row_id.clone(),
            source,
        };

        let start = parse_timestamp(&self.start_time, TABLE, &row_id)?;
        let span = match self.end_time {
            Some(end) => IntervalSpan::Closed {
                start,
                end: parse_timestamp(&end, TABLE, &row_id)?,
                duration_secs: self.duration_seconds,
            },
            None => IntervalSpan::Open {
                start,
                recorded_secs: self.duration_seconds,
            },
        };
        let category = self
            .category
            .map(|value| value.parse::<Category>())
            .transpose()
            .map_err(invalid)?;

        Ok(UsageInterval {
            id: IntervalId(self.id),
            employee_id: EmployeeId::new(self.employee_id).map_err(invalid)?,
            device_id: DeviceId::new(self.device_id).map_err(invalid)?,
            app_name: self.app_name,
            app_identifier: self.app_identifier,
            window_title: self.window_title,
            domain: self.domain,
            category,
            span,
            is_idle: self.is_idle,
        })
    }
}

fn collect_intervals(
    rows: impl Iterator<Item = rusqlite::Result<IntervalRow>>,
) -> Result<Vec<UsageInterval>, DbError> {
    let mut intervals = Vec::new();
    for row in rows {
        intervals.push(row?.into_interval()?);
    }
    Ok(intervals)
}

struct RuleRow {
    id: String,
    kind: String,
    scope_id: Option<String>,
    matcher_type: String,
    pattern: String,
    category: String,
    priority: i32,
    is_active: bool,
}

impl RuleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            scope_id: row.get(2)?,
            matcher_type: row.get(3)?,
            pattern: row.get(4)?,
            category: row.get(5)?,
            priority: row.get(6)?,
            is_active: row.get(7)?,
        })
    }

    fn into_rule(self) -> Result<RuleDefinition, DbError> {
        let invalid = |source| DbError::Validation {
            table: "rules",
            id: self.id.clone(),
            source,
        };
        let kind: RuleKind = self.kind.parse().map_err(invalid)?;
        let scope = match &self.scope_id {
            Some(scope) => RuleScope::Tenant(ScopeId::new(scope.as_str()).map_err(invalid)?),
            None => RuleScope::Global,
        };
        Ok(RuleDefinition {
            id: RuleId::new(self.id.as_str()).map_err(invalid)?,
            kind,
            scope,
            matcher: Matcher::parse(kind, &self.matcher_type).map_err(invalid)?,
            pattern: self.pattern.clone(),
            category: self.category.parse().map_err(invalid)?,
            priority: self.priority,
            is_active: self.is_active,
        })
    }
}

struct SessionRow {
    id: String,
    employee_id: String,
    device_id: String,
    clock_in: String,
    clock_out: Option<String>,
    stats: SessionStatistics,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            employee_id: row.get(1)?,
            device_id: row.get(2)?,
            clock_in: row.get(3)?,
            clock_out: row.get(4)?,
            stats: SessionStatistics {
                total_work: row.get(5)?,
                active_time: row.get(6)?,
                idle_time: row.get(7)?,
                productive_time: row.get(8)?,
                neutral_time: row.get(9)?,
                unproductive_time: row.get(10)?,
            },
        })
    }

    fn into_session(self) -> Result<WorkSession, DbError> {
        const TABLE: &str = "work_sessions";
        let invalid = |source| DbError::Validation {
            table: TABLE,
            id: self.id.clone(),
            source,
        };
        Ok(WorkSession {
            id: SessionId::new(self.id.as_str()).map_err(invalid)?,
            employee_id: EmployeeId::new(self.employee_id.as_str()).map_err(invalid)?,
            device_id: DeviceId::new(self.device_id.as_str()).map_err(invalid)?,
            clock_in: parse_timestamp(&self.clock_in, TABLE, &self.id)?,
            clock_out: self
                .clock_out
                .as_deref()
                .map(|value| parse_timestamp(value, TABLE, &self.id))
                .transpose()?,
            stored: self.stats,
        })
    }
}

fn parse_timestamp(
    timestamp: &str,
    table: &'static str,
    id: &str,
) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            id: id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;
    use tally_core::{
        BackfillOptions, RuleSet, ValidationConfig, backfill_categories, reconcile,
        validate_session,
    };

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn decoded(page: Vec<PageEntry<DbError>>) -> Vec<UsageInterval> {
        page.into_iter().map(Result::unwrap).collect()
    }

    fn interval(id: i64, from: i64, to: Option<i64>, app: &str) -> UsageInterval {
        UsageInterval {
            id: IntervalId(id),
            employee_id: EmployeeId::new("emp-1").unwrap(),
            device_id: DeviceId::new("dev-1").unwrap(),
            app_name: app.to_string(),
            app_identifier: None,
            window_title: None,
            domain: None,
            category: None,
            span: match to {
                Some(to) => IntervalSpan::closed(ts(from), ts(to)),
                None => IntervalSpan::open(ts(from)),
            },
            is_idle: false,
        }
    }

    fn session(id: &str, clock_out: Option<i64>) -> WorkSession {
        WorkSession {
            id: SessionId::new(id).unwrap(),
            employee_id: EmployeeId::new("emp-1").unwrap(),
            device_id: DeviceId::new("dev-1").unwrap(),
            clock_in: ts(0),
            clock_out: clock_out.map(ts),
            stored: SessionStatistics::default(),
        }
    }

    fn rule(
        id: &str,
        kind: RuleKind,
        matcher: Matcher,
        pattern: &str,
        category: Category,
    ) -> RuleDefinition {
        RuleDefinition::new(RuleId::new(id).unwrap(), kind, matcher, pattern, category)
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "usage_intervals"),
            vec![
                "id",
                "employee_id",
                "device_id",
                "app_name",
                "app_identifier",
                "window_title",
                "domain",
                "category",
                "start_time",
                "end_time",
                "duration_seconds",
                "is_idle",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "rules"),
            vec![
                "id",
                "kind",
                "scope_id",
                "matcher_type",
                "pattern",
                "category",
                "priority",
                "is_active",
                "created_seq",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "work_sessions"),
            vec![
                "id",
                "employee_id",
                "device_id",
                "clock_in",
                "clock_out",
                "total_work",
                "active_time",
                "idle_time",
                "productive_time",
                "neutral_time",
                "unproductive_time",
            ]
        );
        assert!(index_names(&db.conn, "usage_intervals").contains("idx_intervals_owner_start"));
        assert!(index_names(&db.conn, "work_sessions").contains("idx_sessions_clock_in"));
    }

    #[test]
    fn reopening_a_file_keeps_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tally.db");
        {
            let db = Database::open(&path).expect("open db");
            db.upsert_session(&session("s1", Some(60))).unwrap();
        }
        let db = Database::open(&path).expect("reopen db");
        let loaded = db.get_session(&SessionId::new("s1").unwrap()).unwrap();
        assert_eq!(loaded, Some(session("s1", Some(60))));
    }

    #[test]
    fn insert_intervals_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let a = interval(1, 0, Some(10), "Code");
        assert_eq!(db.insert_intervals(&[a.clone(), a]).unwrap(), 1);
        assert_eq!(db.next_interval_id().unwrap(), IntervalId(2));
    }

    #[test]
    fn fetch_intervals_filters_owner_and_range() {
        let mut db = Database::open_in_memory().unwrap();
        let mut other_device = interval(4, 5, Some(6), "Code");
        other_device.device_id = DeviceId::new("dev-2").unwrap();
        db.insert_intervals(&[
            interval(3, 20, Some(30), "Slack"),
            interval(1, 0, Some(10), "Code"),
            interval(2, 60, None, "Code"),
            other_device,
        ])
        .unwrap();

        let found = db
            .fetch_intervals(
                &EmployeeId::new("emp-1").unwrap(),
                &DeviceId::new("dev-1").unwrap(),
                TimeRange::new(ts(0), ts(60)),
            )
            .unwrap();
        let ids: Vec<_> = found.iter().map(|i| i.id.value()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(found[0], interval(1, 0, Some(10), "Code"));
    }

    #[test]
    fn open_intervals_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let mut open = interval(7, 5, None, "Code");
        open.span = IntervalSpan::Open {
            start: ts(5),
            recorded_secs: 42,
        };
        open.category = Some(Category::Productive);
        db.insert_intervals(std::slice::from_ref(&open)).unwrap();

        let page = decoded(db.fetch_interval_page(None, 10).unwrap());
        assert_eq!(page, vec![open]);
    }

    #[test]
    fn active_rules_respect_scope_activity_and_creation_order() {
        let db = Database::open_in_memory().unwrap();
        let acme = ScopeId::new("acme").unwrap();
        db.insert_rule(&rule("r1", RuleKind::App, Matcher::Exact, "code", Category::Productive))
            .unwrap();
        db.insert_rule(
            &rule("r2", RuleKind::App, Matcher::Glob, "*slack*", Category::Neutral)
                .with_scope(RuleScope::Tenant(acme.clone())),
        )
        .unwrap();
        db.insert_rule(
            &rule("r3", RuleKind::App, Matcher::Exact, "steam", Category::Unproductive)
                .with_scope(RuleScope::Tenant(ScopeId::new("other").unwrap())),
        )
        .unwrap();
        let github =
            rule("r4", RuleKind::Domain, Matcher::DomainSuffix, "github.com", Category::Productive);
        db.insert_rule(&github).unwrap();
        db.insert_rule(
            &rule("r5", RuleKind::App, Matcher::Exact, "zoom", Category::Neutral).inactive(),
        )
        .unwrap();
        assert!(!db
            .insert_rule(&rule("r1", RuleKind::App, Matcher::Exact, "dup", Category::Neutral))
            .unwrap());

        let scoped = db.fetch_active_rules(Some(&acme)).unwrap();
        let app: Vec<_> = scoped.app_rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(app, vec!["r1", "r2"]);
        assert_eq!(scoped.domain_rules.len(), 1);
        assert_eq!(scoped.domain_rules[0].matcher, Matcher::DomainSuffix);

        let global = db.fetch_active_rules(None).unwrap();
        let app: Vec<_> = global.app_rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(app, vec!["r1"]);

        assert_eq!(db.list_rules().unwrap().len(), 5);
    }

    #[test]
    fn corrupt_rule_row_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO rules (id, kind, matcher_type, pattern, category, created_seq)
                 VALUES ('bad', 'app', 'exact', 'x', 'SOMETIMES', 1)",
                [],
            )
            .unwrap();
        let err = db.fetch_active_rules(None).unwrap_err();
        assert!(matches!(err, DbError::Validation { table: "rules", .. }));
    }

    #[test]
    fn session_ids_in_range() {
        let db = Database::open_in_memory().unwrap();
        let mut late = session("late", None);
        late.clock_in = ts(120);
        db.upsert_session(&late).unwrap();
        db.upsert_session(&session("early", Some(60))).unwrap();

        let ids = db.list_session_ids_in_range(ts(0), ts(121)).unwrap();
        let ids: Vec<_> = ids.iter().map(SessionId::as_str).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(db.list_session_ids_in_range(ts(0), ts(0)).unwrap().is_empty());
    }

    #[test]
    fn update_missing_rows_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .update_session_stats(&SessionId::new("ghost").unwrap(), &SessionStatistics::default())
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { table: "work_sessions", .. }));
        let err = db
            .update_interval_category(IntervalId(9), Category::Neutral)
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { table: "usage_intervals", .. }));
    }

    #[test]
    fn interval_pages_follow_id_order() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_intervals(&[
            interval(5, 0, Some(1), "a"),
            interval(2, 9, Some(10), "b"),
            interval(9, 3, Some(4), "c"),
        ])
        .unwrap();

        let first = decoded(db.fetch_interval_page(None, 2).unwrap());
        let ids: Vec<_> = first.iter().map(|i| i.id.value()).collect();
        assert_eq!(ids, vec![2, 5]);
        let rest = decoded(db.fetch_interval_page(Some(IntervalId(5)), 2).unwrap());
        let ids: Vec<_> = rest.iter().map(|i| i.id.value()).collect();
        assert_eq!(ids, vec![9]);
    }

    #[test]
    fn reconcile_and_validate_against_sqlite() {
        let mut db = Database::open_in_memory().unwrap();
        let mut coding = interval(1, 0, Some(30), "Code");
        coding.category = Some(Category::Productive);
        let mut idle = interval(2, 30, Some(40), "Code");
        idle.is_idle = true;
        db.insert_intervals(&[coding, idle]).unwrap();
        db.upsert_session(&session("s1", Some(40))).unwrap();

        let id = SessionId::new("s1").unwrap();
        let config = ValidationConfig::default();
        let before = db.get_session(&id).unwrap().unwrap();
        let intervals = db.fetch_session_intervals(&before, ts(999)).unwrap();
        assert!(!validate_session(&before, &intervals, &config, ts(999)).overall);

        let result = reconcile(&db, &id, ts(999)).unwrap();
        assert!(result.changed);
        let after = db.get_session(&id).unwrap().unwrap();
        assert_eq!(after.stored.total_work, 2400);
        assert_eq!(after.stored.idle_time, 600);
        assert_eq!(after.stored.productive_time, 1800);
        assert!(validate_session(&after, &intervals, &config, ts(999)).overall);
    }

    #[test]
    fn backfill_rewrites_categories_in_sqlite() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_intervals(&[
            interval(1, 0, Some(10), "Code"),
            interval(2, 10, Some(20), "Steam"),
        ])
        .unwrap();
        let steam = rule("r1", RuleKind::App, Matcher::Exact, "steam", Category::Unproductive);
        db.insert_rule(&steam).unwrap();

        let active = db.fetch_active_rules(None).unwrap();
        let rules = RuleSet::new(&active.app_rules, &active.domain_rules);
        let options = BackfillOptions {
            page_size: 1,
            start_after: None,
        };
        let progress = backfill_categories(&db, &rules, options).unwrap();
        assert_eq!(progress.updated, 2);

        let page = decoded(db.fetch_interval_page(None, 10).unwrap());
        let categories: Vec<_> = page.iter().map(|i| i.category).collect();
        assert_eq!(categories, vec![Some(Category::Neutral), Some(Category::Unproductive)]);
    }

    #[test]
    fn undecodable_rows_keep_their_slot_in_the_page() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_intervals(&[
            interval(1, 0, Some(10), "Code"),
            interval(2, 10, Some(20), "Code"),
            interval(3, 20, Some(30), "Code"),
        ])
        .unwrap();
        db.conn
            .execute("UPDATE usage_intervals SET category = 'focused' WHERE id = 2", [])
            .unwrap();
        db.conn
            .execute("UPDATE usage_intervals SET start_time = 'yesterday' WHERE id = 3", [])
            .unwrap();

        let page = db.fetch_interval_page(None, 10).unwrap();
        assert_eq!(page.len(), 3);
        assert!(page[0].is_ok());
        let bad = page[1].as_ref().unwrap_err();
        assert_eq!(bad.id, IntervalId(2));
        assert!(matches!(bad.error, DbError::Validation { .. }));
        let bad = page[2].as_ref().unwrap_err();
        assert_eq!(bad.id, IntervalId(3));
        assert!(matches!(bad.error, DbError::TimestampParse { .. }));
    }

    #[test]
    fn backfill_skips_corrupt_row_and_finishes() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_intervals(&[
            interval(1, 0, Some(10), "Code"),
            interval(2, 10, Some(20), "Steam"),
            interval(3, 20, Some(30), "Steam"),
        ])
        .unwrap();
        db.conn
            .execute("UPDATE usage_intervals SET category = 'focused' WHERE id = 2", [])
            .unwrap();
        let steam = rule("r1", RuleKind::App, Matcher::Exact, "steam", Category::Unproductive);
        db.insert_rule(&steam).unwrap();

        let active = db.fetch_active_rules(None).unwrap();
        let rules = RuleSet::new(&active.app_rules, &active.domain_rules);
        let options = BackfillOptions {
            page_size: 1,
            start_after: None,
        };
        let progress = backfill_categories(&db, &rules, options).unwrap();
        assert_eq!(progress.scanned, 3);
        assert_eq!(progress.updated, 2);
        assert_eq!(progress.failures.len(), 1);
        assert_eq!(progress.failures[0].item, "2");
        assert_eq!(progress.last_cursor, Some(IntervalId(3)));

        let rest = decoded(db.fetch_interval_page(Some(IntervalId(2)), 10).unwrap());
        assert_eq!(rest[0].category, Some(Category::Unproductive));
    }
}
