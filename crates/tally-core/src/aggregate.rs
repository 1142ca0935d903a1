//! Folding usage intervals into work-session statistics.
//!
//! Durations are summed exactly as stored. The idle threshold is a detection
//! parameter of the upstream agent and is never added on top of raw
//! durations here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::{IntervalSpan, UsageInterval};
use crate::types::Category;

/// Aggregated time for one work session, in whole seconds.
///
/// Computed values always satisfy `total_work == active_time + idle_time` and
/// `active_time == productive_time + neutral_time + unproductive_time`.
/// Persisted copies may drift and are what the validator checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_work: i64,
    pub active_time: i64,
    pub idle_time: i64,
    pub productive_time: i64,
    pub neutral_time: i64,
    pub unproductive_time: i64,
}

/// Names of the [`SessionStatistics`] fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    TotalWork,
    ActiveTime,
    IdleTime,
    ProductiveTime,
    NeutralTime,
    UnproductiveTime,
}

impl StatField {
    pub const ALL: [Self; 6] = [
        Self::TotalWork,
        Self::ActiveTime,
        Self::IdleTime,
        Self::ProductiveTime,
        Self::NeutralTime,
        Self::UnproductiveTime,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TotalWork => "total_work",
            Self::ActiveTime => "active_time",
            Self::IdleTime => "idle_time",
            Self::ProductiveTime => "productive_time",
            Self::NeutralTime => "neutral_time",
            Self::UnproductiveTime => "unproductive_time",
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionStatistics {
    #[must_use]
    pub const fn get(&self, field: StatField) -> i64 {
        match field {
            StatField::TotalWork => self.total_work,
            StatField::ActiveTime => self.active_time,
            StatField::IdleTime => self.idle_time,
            StatField::ProductiveTime => self.productive_time,
            StatField::NeutralTime => self.neutral_time,
            StatField::UnproductiveTime => self.unproductive_time,
        }
    }

    /// Returns true if both conservation identities hold.
    ///
    /// Sums that overflow `i64` never hold.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        let total = self.active_time.checked_add(self.idle_time);
        let active = match self.productive_time.checked_add(self.neutral_time) {
            Some(partial) => partial.checked_add(self.unproductive_time),
            None => None,
        };
        matches!(total, Some(total) if total == self.total_work)
            && matches!(active, Some(active) if active == self.active_time)
    }

    fn add_active(&mut self, category: Option<Category>, secs: i64) {
        self.active_time = self.active_time.saturating_add(secs);
        let bucket = match category.unwrap_or(Category::Neutral) {
            Category::Productive => &mut self.productive_time,
            Category::Neutral => &mut self.neutral_time,
            Category::Unproductive => &mut self.unproductive_time,
        };
        *bucket = bucket.saturating_add(secs);
    }
}

/// How open (in-progress) intervals are accounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Upper bound used for open intervals.
    pub current_time: Option<DateTime<Utc>>,
    /// Extrapolate open intervals to `current_time` instead of using the
    /// recorded duration.
    pub include_open_entries: bool,
}

impl AggregateOptions {
    /// Options that extrapolate open intervals up to `now`.
    #[must_use]
    pub const fn open_until(now: DateTime<Utc>) -> Self {
        Self {
            current_time: Some(now),
            include_open_entries: true,
        }
    }
}

/// Effective duration of one interval under the given options.
pub fn effective_duration(span: &IntervalSpan, options: &AggregateOptions) -> i64 {
    match (span, options.include_open_entries, options.current_time) {
        (IntervalSpan::Open { start, .. }, true, Some(now)) => (now - *start).num_seconds().max(0),
        _ => span.recorded_secs(),
    }
}

/// Folds intervals into session statistics.
///
/// Idle intervals count toward idle time only. Non-idle intervals count toward
/// active time and their category; an active interval with no category is
/// counted as neutral. Negative stored durations are summed as-is, since
/// repairing them is the validator's job.
pub fn aggregate(intervals: &[UsageInterval], options: &AggregateOptions) -> SessionStatistics {
    let mut stats = SessionStatistics::default();
    for interval in intervals {
        let secs = effective_duration(&interval.span, options);
        if interval.is_idle {
            stats.idle_time = stats.idle_time.saturating_add(secs);
        } else {
            stats.add_active(interval.category, secs);
        }
    }
    stats.total_work = stats.active_time.saturating_add(stats.idle_time);
    stats
}


#[cfg(test)]
mod tests {
    use super::fixtures::{closed, open, ts};
    use super::*;

    #[test]
    fn empty_input_is_all_zero() {
        let stats = aggregate(&[], &AggregateOptions::default());
        assert_eq!(stats, SessionStatistics::default());
        assert!(stats.is_consistent());
    }

    #[test]
    fn splits_active_idle_and_categories() {
        let intervals = [
            closed(1, 0, 30, Some(Category::Productive), false),
            closed(2, 30, 40, Some(Category::Unproductive), false),
            closed(3, 40, 45, Some(Category::Productive), true),
            closed(4, 45, 60, Some(Category::Neutral), false),
        ];
        let stats = aggregate(&intervals, &AggregateOptions::default());
        assert_eq!(stats.active_time, 55 * 60);
        assert_eq!(stats.idle_time, 5 * 60);
        assert_eq!(stats.total_work, 60 * 60);
        assert_eq!(stats.productive_time, 30 * 60);
        assert_eq!(stats.unproductive_time, 10 * 60);
        assert_eq!(stats.neutral_time, 15 * 60);
        assert!(stats.is_consistent());
    }

    #[test]
    fn idle_intervals_never_reach_category_buckets() {
        let intervals = [closed(1, 0, 10, Some(Category::Productive), true)];
        let stats = aggregate(&intervals, &AggregateOptions::default());
        assert_eq!(stats.idle_time, 600);
        assert_eq!(stats.productive_time, 0);
    }

    #[test]
    fn uncategorized_active_time_counts_as_neutral() {
        let intervals = [closed(1, 0, 10, None, false)];
        let stats = aggregate(&intervals, &AggregateOptions::default());
        assert_eq!(stats.neutral_time, 600);
        assert!(stats.is_consistent());
    }

    #[test]
    fn open_interval_extrapolated_only_when_requested() {
        let intervals = [open(1, 0, 42, Some(Category::Productive))];

        let stored = aggregate(&intervals, &AggregateOptions::default());
        assert_eq!(stored.active_time, 42);

        let live = aggregate(&intervals, &AggregateOptions::open_until(ts(15)));
        assert_eq!(live.active_time, 15 * 60);

        let no_clock = AggregateOptions {
            current_time: None,
            include_open_entries: true,
        };
        assert_eq!(aggregate(&intervals, &no_clock).active_time, 42);
    }

    #[test]
    fn open_interval_clamped_when_clock_precedes_start() {
        let intervals = [open(1, 30, 0, Some(Category::Neutral))];
        let stats = aggregate(&intervals, &AggregateOptions::open_until(ts(10)));
        assert_eq!(stats.active_time, 0);
    }

    #[test]
    fn closed_interval_ignores_current_time() {
        let intervals = [closed(1, 0, 10, Some(Category::Neutral), false)];
        let stats = aggregate(&intervals, &AggregateOptions::open_until(ts(500)));
        assert_eq!(stats.active_time, 600);
    }

    #[test]
    fn inverted_interval_is_summed_verbatim() {
        let intervals = [closed(1, 10, 0, Some(Category::Neutral), false)];
        let stats = aggregate(&intervals, &AggregateOptions::default());
        assert_eq!(stats.active_time, -600);
        assert!(stats.is_consistent());
    }

    #[test]
    fn aggregation_is_deterministic() {
        let intervals = [
            closed(1, 0, 7, Some(Category::Productive), false),
            closed(2, 7, 9, None, true),
            open(3, 9, 5, Some(Category::Unproductive)),
        ];
        let options = AggregateOptions::open_until(ts(20));
        let first = aggregate(&intervals, &options);
        for _ in 0..5 {
            assert_eq!(aggregate(&intervals, &options), first);
        }
        assert!(first.is_consistent());
    }

    #[test]
    fn consistency_check_survives_extreme_values() {
        let drifted = SessionStatistics {
            total_work: i64::MIN,
            active_time: i64::MAX,
            idle_time: i64::MAX,
            productive_time: i64::MAX,
            neutral_time: 1,
            unproductive_time: 0,
        };
        assert!(!drifted.is_consistent());

        let saturated = SessionStatistics {
            total_work: i64::MAX,
            active_time: i64::MAX,
            idle_time: 0,
            productive_time: i64::MAX,
            neutral_time: 0,
            unproductive_time: 0,
        };
        assert!(saturated.is_consistent());
    }
}
