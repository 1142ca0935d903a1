//! Session validation: recompute, diff, and integrity checks.
//!
//! All checks are pure. Callers pass `now` explicitly so a session that is
//! still clocked in validates the same way on every call with the same input.
//! Findings are reported, never thrown; the caller decides what to repair.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateOptions, SessionStatistics, StatField, aggregate};
use crate::interval::{IntervalSpan, UsageInterval};
use crate::session::WorkSession;
use crate::types::{IntervalId, SessionId};

/// Thresholds for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Largest stored-vs-calculated difference that is not a discrepancy.
    /// Default: 5 seconds (absorbs rounding at clock boundaries).
    pub discrepancy_tolerance_secs: i64,

    /// Shortest untracked span reported as a gap.
    /// Default: 10 seconds.
    pub gap_threshold_secs: i64,

    /// Total work above this is suspect.
    /// Default: 86400 (24 hours).
    pub max_session_secs: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            discrepancy_tolerance_secs: 5,
            gap_threshold_secs: 10,
            max_session_secs: 86_400,
        }
    }
}

// ========== Stored vs calculated ==========

/// One field whose stored value drifted from the recomputed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiscrepancy {
    pub field: StatField,
    pub stored: i64,
    pub calculated: i64,
    /// `calculated - stored`.
    pub delta: i64,
}

impl fmt::Display for FieldDiscrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch: stored {}s, calculated {}s (delta {:+}s)",
            self.field, self.stored, self.calculated, self.delta
        )
    }
}

/// Result of diffing persisted statistics against a fresh aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsComparison {
    pub valid: bool,
    pub stored: SessionStatistics,
    pub calculated: SessionStatistics,
    pub discrepancies: Vec<FieldDiscrepancy>,
}

/// Statistics recomputed for a session, with open intervals running until
/// clock-out (or `now` while the session is open).
pub fn recompute(
    session: &WorkSession,
    intervals: &[UsageInterval],
    now: DateTime<Utc>,
) -> SessionStatistics {
    aggregate(intervals, &AggregateOptions::open_until(session.end_or(now)))
}

/// Recomputes the session and diffs every field against the stored row.
pub fn compare_stored_to_calculated(
    session: &WorkSession,
    intervals: &[UsageInterval],
    config: &ValidationConfig,
    now: DateTime<Utc>,
) -> StatsComparison {
    let calculated = recompute(session, intervals, now);
    let stored = session.stored;
    let discrepancies: Vec<FieldDiscrepancy> = StatField::ALL
        .iter()
        .filter_map(|&field| {
            let stored_value = stored.get(field);
            let calculated_value = calculated.get(field);
            let delta = calculated_value - stored_value;
            (delta.abs() > config.discrepancy_tolerance_secs).then_some(FieldDiscrepancy {
                field,
                stored: stored_value,
                calculated: calculated_value,
                delta,
            })
        })
        .collect();
    StatsComparison {
        valid: discrepancies.is_empty(),
        stored,
        calculated,
        discrepancies,
    }
}

// ========== Negative values ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeField {
    pub field: StatField,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegativeValueCheck {
    pub valid: bool,
    pub fields: Vec<NegativeField>,
}

/// Flags every statistic below zero.
pub fn check_negative_values(stats: &SessionStatistics) -> NegativeValueCheck {
    let fields: Vec<NegativeField> = StatField::ALL
        .iter()
        .filter(|&&field| stats.get(field) < 0)
        .map(|&field| NegativeField {
            field,
            value: stats.get(field),
        })
        .collect();
    NegativeValueCheck {
        valid: fields.is_empty(),
        fields,
    }
}

// ========== Max duration ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationCheck {
    pub valid: bool,
    pub stored_total: i64,
    pub calculated_total: i64,
    pub limit: i64,
}

/// Flags sessions whose stored or recomputed total work exceeds the ceiling.
///
/// Suspect sessions are only reported; nothing here caps the value.
pub fn check_max_duration(
    stored: &SessionStatistics,
    calculated: &SessionStatistics,
    config: &ValidationConfig,
) -> DurationCheck {
    let limit = config.max_session_secs;
    DurationCheck {
        valid: stored.total_work <= limit && calculated.total_work <= limit,
        stored_total: stored.total_work,
        calculated_total: calculated.total_work,
        limit,
    }
}

// ========== Interval integrity ==========

/// A data-integrity problem found among a session's intervals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityFinding {
    /// Open interval inside a session that has already clocked out.
    OpenIntervalInClosedSession { interval_id: IntervalId },
    /// Open interval that is not the most recent one.
    StaleOpenInterval {
        interval_id: IntervalId,
        superseded_by: IntervalId,
    },
    /// Closed interval with zero or negative duration.
    NonPositiveDuration {
        interval_id: IntervalId,
        duration_secs: i64,
    },
    /// Closed interval whose stored duration disagrees with its endpoints.
    DurationMismatch {
        interval_id: IntervalId,
        stored_secs: i64,
        span_secs: i64,
    },
    /// `second` starts before `first` ends.
    Overlap {
        first: IntervalId,
        second: IntervalId,
        overlap_secs: i64,
    },
    /// Non-idle interval with no category.
    MissingCategory { interval_id: IntervalId },
}

impl fmt::Display for IntegrityFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenIntervalInClosedSession { interval_id } => {
                write!(f, "interval {interval_id} is still open in a closed session")
            }
            Self::StaleOpenInterval {
                interval_id,
                superseded_by,
            } => write!(
                f,
                "interval {interval_id} is open but interval {superseded_by} starts after it"
            ),
            Self::NonPositiveDuration {
                interval_id,
                duration_secs,
            } => write!(
                f,
                "interval {interval_id} has non-positive duration {duration_secs}s"
            ),
            Self::DurationMismatch {
                interval_id,
                stored_secs,
                span_secs,
            } => write!(
                f,
                "interval {interval_id} stores {stored_secs}s but spans {span_secs}s"
            ),
            Self::Overlap {
                first,
                second,
                overlap_secs,
            } => write!(f, "intervals {first} and {second} overlap by {overlap_secs}s"),
            Self::MissingCategory { interval_id } => {
                write!(f, "active interval {interval_id} has no category")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub valid: bool,
    pub findings: Vec<IntegrityFinding>,
}

/// Intervals in start order, ties broken by id. Never reorders the caller's slice.
fn sorted_by_start(intervals: &[UsageInterval]) -> Vec<&UsageInterval> {
    let mut sorted: Vec<&UsageInterval> = intervals.iter().collect();
    sorted.sort_by_key(|interval| (interval.start(), interval.id));
    sorted
}

/// Checks open-interval placement, durations, overlaps and missing categories.
///
/// Overlaps are detected with a single sweep in start order: an interval that
/// starts before the latest end seen so far overlaps the interval owning that
/// end.
pub fn check_interval_integrity(
    session: &WorkSession,
    intervals: &[UsageInterval],
    now: DateTime<Utc>,
) -> IntegrityCheck {
    let horizon = session.end_or(now);
    let sorted = sorted_by_start(intervals);
    let mut findings = Vec::new();

    let mut latest: Option<(IntervalId, DateTime<Utc>)> = None;
    for (idx, interval) in sorted.iter().enumerate() {
        match interval.span {
            IntervalSpan::Open { start, .. } => {
                if session.is_closed() {
                    findings.push(IntegrityFinding::OpenIntervalInClosedSession {
                        interval_id: interval.id,
                    });
                }
                if let Some(next) = sorted[idx + 1..].iter().find(|later| later.start() > start) {
                    findings.push(IntegrityFinding::StaleOpenInterval {
                        interval_id: interval.id,
                        superseded_by: next.id,
                    });
                }
            }
            IntervalSpan::Closed {
                start,
                end,
                duration_secs,
            } => {
                if duration_secs <= 0 {
                    findings.push(IntegrityFinding::NonPositiveDuration {
                        interval_id: interval.id,
                        duration_secs,
                    });
                }
                let span_secs = (end - start).num_seconds();
                if span_secs != duration_secs {
                    findings.push(IntegrityFinding::DurationMismatch {
                        interval_id: interval.id,
                        stored_secs: duration_secs,
                        span_secs,
                    });
                }
            }
        }

        if !interval.is_idle && interval.category.is_none() {
            findings.push(IntegrityFinding::MissingCategory {
                interval_id: interval.id,
            });
        }

        let start = interval.start();
        let end = interval.span.effective_end(horizon);
        match latest {
            Some((prev_id, prev_end)) if start < prev_end => {
                findings.push(IntegrityFinding::Overlap {
                    first: prev_id,
                    second: interval.id,
                    overlap_secs: (prev_end.min(end) - start).num_seconds().max(0),
                });
                if end > prev_end {
                    latest = Some((interval.id, end));
                }
            }
            Some((_, prev_end)) if end <= prev_end => {}
            _ => latest = Some((interval.id, end)),
        }
    }

    IntegrityCheck {
        valid: findings.is_empty(),
        findings,
    }
}

// ========== Gap detection ==========

/// An untracked span inside a bounded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: i64,
}

impl TimeGap {
    fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            duration_secs: (end - start).num_seconds(),
        }
    }
}

/// Untracked time within one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub session_id: SessionId,
    pub gaps: Vec<TimeGap>,
    pub gap_count: usize,
    pub total_gap_secs: i64,
    pub largest_gap: Option<TimeGap>,
}

/// Finds spans of at least `gap_threshold_secs` with no tracked usage between
/// clock-in, the intervals, and clock-out (or `now` while open).
pub fn detect_gaps(
    session: &WorkSession,
    intervals: &[UsageInterval],
    config: &ValidationConfig,
    now: DateTime<Utc>,
) -> GapReport {
    let session_end = session.end_or(now);
    let threshold = config.gap_threshold_secs;
    let mut gaps = Vec::new();
    let mut push_gap = |from: DateTime<Utc>, to: DateTime<Utc>| {
        let to = to.min(session_end);
        if to > from && (to - from).num_seconds() >= threshold {
            gaps.push(TimeGap::between(from, to));
        }
    };

    let mut cursor = session.clock_in;
    for interval in sorted_by_start(intervals) {
        push_gap(cursor, interval.start());
        cursor = cursor.max(interval.span.effective_end(session_end));
    }
    push_gap(cursor, session_end);

    let total_gap_secs = gaps.iter().map(|gap| gap.duration_secs).sum();
    // Earliest gap wins ties.
    let largest_gap = gaps
        .iter()
        .copied()
        .reduce(|best, gap| if gap.duration_secs > best.duration_secs { gap } else { best });
    GapReport {
        session_id: session.id.clone(),
        gap_count: gaps.len(),
        gaps,
        total_gap_secs,
        largest_gap,
    }
}

/// The `n` sessions with the most untracked time, largest first.
pub fn top_gappiest(reports: &[GapReport], n: usize) -> Vec<GapReport> {
    let mut ranked: Vec<&GapReport> = reports.iter().filter(|r| r.gap_count > 0).collect();
    ranked.sort_by(|a, b| {
        b.total_gap_secs
            .cmp(&a.total_gap_secs)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });
    ranked.into_iter().take(n).cloned().collect()
}

// ========== Comprehensive report ==========

/// All checks for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionValidationReport {
    pub session_id: SessionId,
    pub stats: StatsComparison,
    pub negative_values: NegativeValueCheck,
    pub max_duration: DurationCheck,
    pub integrity: IntegrityCheck,
    /// Informational; does not affect `overall`.
    pub gaps: GapReport,
    pub overall: bool,
}

/// Flat pass/fail view of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub discrepancies: Vec<String>,
}

impl SessionValidationReport {
    /// Flattens every finding into one human-readable line each.
    pub fn summary(&self) -> ValidationReport {
        let mut lines: Vec<String> = self
            .stats
            .discrepancies
            .iter()
            .map(ToString::to_string)
            .collect();
        lines.extend(
            self.negative_values
                .fields
                .iter()
                .map(|n| format!("negative value: {} = {}", n.field, n.value)),
        );
        if !self.max_duration.valid {
            lines.push(format!(
                "total work exceeds {}s: stored {}s, calculated {}s",
                self.max_duration.limit,
                self.max_duration.stored_total,
                self.max_duration.calculated_total
            ));
        }
        lines.extend(self.integrity.findings.iter().map(ToString::to_string));
        ValidationReport {
            valid: self.overall,
            discrepancies: lines,
        }
    }
}

/// Runs every check against one session and ANDs the results.
pub fn validate_session(
    session: &WorkSession,
    intervals: &[UsageInterval],
    config: &ValidationConfig,
    now: DateTime<Utc>,
) -> SessionValidationReport {
    let stats = compare_stored_to_calculated(session, intervals, config, now);
    let negative_values = check_negative_values(&session.stored);
    let max_duration = check_max_duration(&stats.stored, &stats.calculated, config);
    let integrity = check_interval_integrity(session, intervals, now);
    let gaps = detect_gaps(session, intervals, config, now);
    let overall = stats.valid && negative_values.valid && max_duration.valid && integrity.valid;

    tracing::debug!(
        session_id = %session.id,
        intervals = intervals.len(),
        discrepancies = stats.discrepancies.len(),
        integrity_findings = integrity.findings.len(),
        gaps = gaps.gap_count,
        overall,
        "validated session"
    );

    SessionValidationReport {
        session_id: session.id.clone(),
        stats,
        negative_values,
        max_duration,
        integrity,
        gaps,
        overall,
    }
}
