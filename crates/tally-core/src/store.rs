//! Collaborator interfaces the engine reads from and writes to.
//!
//! The engine owns no persistence. A host provides these traits (e.g. the
//! `SQLite` store in `tally-db`, or in-memory fixtures in tests).

use chrono::{DateTime, Utc};

use crate::aggregate::SessionStatistics;
use crate::interval::UsageInterval;
use crate::rules::RuleDefinition;
use crate::session::WorkSession;
use crate::types::{Category, DeviceId, EmployeeId, IntervalId, ScopeId, SessionId};

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

/// Source of usage intervals.
pub trait IntervalSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Intervals for one employee/device starting inside `range`, ordered by
    /// start time ascending.
    fn fetch_intervals(
        &self,
        employee: &EmployeeId,
        device: &DeviceId,
        range: TimeRange,
    ) -> Result<Vec<UsageInterval>, Self::Error>;

    /// Intervals belonging to a session, with open intervals included up to
    /// `now` when the session has not clocked out.
    fn fetch_session_intervals(
        &self,
        session: &WorkSession,
        now: DateTime<Utc>,
    ) -> Result<Vec<UsageInterval>, Self::Error> {
        let range = TimeRange::new(session.clock_in, session.end_or(now));
        self.fetch_intervals(&session.employee_id, &session.device_id, range)
    }
}

/// Active app and domain rules visible to a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveRules {
    pub app_rules: Vec<RuleDefinition>,
    pub domain_rules: Vec<RuleDefinition>,
}

/// Source of classification rules.
pub trait RuleSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Tenant-scoped and global rules, filtered to active, in creation order.
    fn fetch_active_rules(&self, scope: Option<&ScopeId>) -> Result<ActiveRules, Self::Error>;
}

/// Persisted work sessions.
pub trait SessionStore: IntervalSource {
    fn get_session(&self, id: &SessionId) -> Result<Option<WorkSession>, Self::Error>;

    /// Overwrites the stored statistics of one session.
    fn update_session_stats(
        &self,
        id: &SessionId,
        stats: &SessionStatistics,
    ) -> Result<(), Self::Error>;
}

/// A stored interval row that could not be decoded.
///
/// It keeps its id so a paged scan can record it and move past it.
#[derive(Debug)]
pub struct UndecodableInterval<E> {
    pub id: IntervalId,
    pub error: E,
}

/// One row of an interval page.
pub type PageEntry<E> = Result<UsageInterval, UndecodableInterval<E>>;

/// Id of a page row, whether or not it decoded.
pub const fn page_entry_id<E>(entry: &PageEntry<E>) -> IntervalId {
    match entry {
        Ok(interval) => interval.id,
        Err(bad) => bad.id,
    }
}

/// Cursor-paginated access to intervals for backfill jobs.
///
/// Pages are ordered by [`IntervalId`] ascending; the cursor is the last id
/// of the previous page, never a timestamp. A row that fails to decode is
/// returned as an [`UndecodableInterval`] in its slot. Only a failure of the
/// page query itself fails the whole call.
pub trait IntervalPager {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_interval_page(
        &self,
        after: Option<IntervalId>,
        limit: usize,
    ) -> Result<Vec<PageEntry<Self::Error>>, Self::Error>;

    fn update_interval_category(
        &self,
        id: IntervalId,
        category: Category,
    ) -> Result<(), Self::Error>;
}
