//! Batch jobs over many sessions or intervals.
//!
//! Each session is an independent unit of work. Validation runs sessions in
//! parallel but never splits a single session's intervals, because gap and
//! overlap detection depend on their order. One failing item never aborts a
//! batch: failures are collected and counters are always produced.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::classify::RuleSet;
use crate::interval::UsageInterval;
use crate::reconcile::{Reconciliation, reconcile};
use crate::session::WorkSession;
use crate::store::{IntervalPager, SessionStore, page_entry_id};
use crate::types::{IntervalId, SessionId};
use crate::validate::{
    GapReport, SessionValidationReport, ValidationConfig, top_gappiest, validate_session,
};

/// A per-item failure in a batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    /// Session id or interval id, as text.
    pub item: String,
    pub error: String,
}

impl BatchFailure {
    fn new(item: impl ToString, error: &impl std::fmt::Display) -> Self {
        Self {
            item: item.to_string(),
            error: error.to_string(),
        }
    }
}

// ========== Validation ==========

/// One session with all of its intervals, ready to validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUnit {
    pub session: WorkSession,
    pub intervals: Vec<UsageInterval>,
}

/// Loads sessions and their intervals one at a time.
///
/// Missing sessions and store errors become failures instead of aborting.
pub fn load_units<S: SessionStore>(
    store: &S,
    ids: &[SessionId],
    now: DateTime<Utc>,
) -> (Vec<SessionUnit>, Vec<BatchFailure>) {
    let mut units = Vec::with_capacity(ids.len());
    let mut failures = Vec::new();
    for id in ids {
        let loaded = store.get_session(id).and_then(|session| {
            session
                .map(|session| {
                    store
                        .fetch_session_intervals(&session, now)
                        .map(|intervals| SessionUnit { session, intervals })
                })
                .transpose()
        });
        match loaded {
            Ok(Some(unit)) => units.push(unit),
            Ok(None) => failures.push(BatchFailure::new(id, &"session not found")),
            Err(err) => {
                tracing::warn!(session_id = %id, error = %err, "failed to load session");
                failures.push(BatchFailure::new(id, &err));
            }
        }
    }
    (units, failures)
}

/// Results of validating many sessions.
#[derive(Debug, Clone, Serialize)]
pub struct BatchValidation {
    pub reports: Vec<SessionValidationReport>,
    pub failures: Vec<BatchFailure>,
    pub checked: usize,
    pub valid: usize,
    pub invalid: usize,
    /// Sessions with the most untracked time, largest first.
    pub top_gappiest: Vec<GapReport>,
}

impl BatchValidation {
    #[must_use]
    pub fn all_valid(&self) -> bool {
        self.invalid == 0 && self.failures.is_empty()
    }
}

/// Validates sessions in parallel. Report order follows input order.
pub fn validate_batch(
    units: &[SessionUnit],
    config: &ValidationConfig,
    now: DateTime<Utc>,
    top_n: usize,
) -> BatchValidation {
    let reports: Vec<SessionValidationReport> = units
        .par_iter()
        .map(|unit| validate_session(&unit.session, &unit.intervals, config, now))
        .collect();

    let valid = reports.iter().filter(|r| r.overall).count();
    let gap_reports: Vec<GapReport> = reports.iter().map(|r| r.gaps.clone()).collect();
    let batch = BatchValidation {
        checked: reports.len(),
        valid,
        invalid: reports.len() - valid,
        top_gappiest: top_gappiest(&gap_reports, top_n),
        reports,
        failures: Vec::new(),
    };
    tracing::info!(
        checked = batch.checked,
        valid = batch.valid,
        invalid = batch.invalid,
        "batch validation complete"
    );
    batch
}

// ========== Reconciliation ==========

/// Results of reconciling many sessions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReconciliation {
    pub results: Vec<Reconciliation>,
    pub failures: Vec<BatchFailure>,
    pub reconciled: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Reconciles sessions one after another, collecting per-session failures.
pub fn reconcile_batch<S: SessionStore>(
    store: &S,
    ids: &[SessionId],
    now: DateTime<Utc>,
) -> BatchReconciliation {
    let mut batch = BatchReconciliation::default();
    for id in ids {
        match reconcile(store, id, now) {
            Ok(result) => {
                batch.reconciled += 1;
                if result.changed {
                    batch.changed += 1;
                }
                batch.results.push(result);
            }
            Err(err) => {
                tracing::warn!(session_id = %id, error = %err, "reconciliation failed");
                batch.failed += 1;
                batch.failures.push(BatchFailure::new(id, &err));
            }
        }
    }
    tracing::info!(
        reconciled = batch.reconciled,
        changed = batch.changed,
        failed = batch.failed,
        "batch reconciliation complete"
    );
    batch
}

// ========== Category backfill ==========

/// Paging parameters for a backfill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub page_size: usize,
    /// Resume after this interval id (exclusive).
    pub start_after: Option<IntervalId>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            page_size: 500,
            start_after: None,
        }
    }
}

/// Progress of a backfill run. `last_cursor` is where to resume.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillProgress {
    pub pages: usize,
    pub scanned: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failures: Vec<BatchFailure>,
    pub last_cursor: Option<IntervalId>,
}

#[derive(Debug, Error)]
pub enum BackfillError<E> {
    #[error("page size must be positive")]
    InvalidPageSize,
    /// A page could not be fetched. `progress` covers every completed page.
    #[error("failed to fetch page after {:?}: {source}", .progress.last_cursor)]
    Fetch {
        #[source]
        source: E,
        progress: BackfillProgress,
    },
}

/// Reclassifies every interval and rewrites categories that changed.
///
/// Intervals are visited in id order, one page at a time. The cursor only
/// advances, so concurrent inserts never cause rows to be skipped or
/// visited twice, and an interrupted run resumes from `last_cursor`.
/// Rows the pager cannot decode are recorded as failures and the cursor
/// moves past them.
pub fn backfill_categories<P: IntervalPager>(
    pager: &P,
    rules: &RuleSet,
    options: BackfillOptions,
) -> Result<BackfillProgress, BackfillError<P::Error>> {
    if options.page_size == 0 {
        return Err(BackfillError::InvalidPageSize);
    }

    let mut progress = BackfillProgress {
        last_cursor: options.start_after,
        ..BackfillProgress::default()
    };

    loop {
        let page = match pager.fetch_interval_page(progress.last_cursor, options.page_size) {
            Ok(page) => page,
            Err(source) => return Err(BackfillError::Fetch { source, progress }),
        };
        let Some(page_cursor) = page.last().map(page_entry_id) else {
            break;
        };

        for entry in &page {
            progress.scanned += 1;
            let interval = match entry {
                Ok(interval) => interval,
                Err(bad) => {
                    tracing::warn!(
                        interval_id = %bad.id,
                        error = %bad.error,
                        "skipping undecodable interval"
                    );
                    progress.failures.push(BatchFailure::new(bad.id, &bad.error));
                    continue;
                }
            };
            let category = rules.classify_interval(interval).category;
            if interval.category == Some(category) {
                progress.unchanged += 1;
                continue;
            }
            match pager.update_interval_category(interval.id, category) {
                Ok(()) => progress.updated += 1,
                Err(err) => {
                    tracing::warn!(
                        interval_id = %interval.id,
                        error = %err,
                        "failed to update category"
                    );
                    progress.failures.push(BatchFailure::new(interval.id, &err));
                }
            }
        }

        progress.pages += 1;
        progress.last_cursor = Some(page_cursor);
        tracing::info!(
            pages = progress.pages,
            scanned = progress.scanned,
            updated = progress.updated,
            cursor = page_cursor.value(),
            "backfill page complete"
        );

        if page.len() < options.page_size {
            break;
        }
    }

    Ok(progress)
}
