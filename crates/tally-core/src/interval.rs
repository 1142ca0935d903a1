//! Usage intervals reported by the desktop agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, DeviceId, EmployeeId, IntervalId};

/// Time span of a usage interval.
///
/// An interval is either still being recorded (`Open`) or finished (`Closed`).
/// Durations are kept exactly as the ingestion path stored them; the validator
/// checks them against the endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IntervalSpan {
    /// In progress. `recorded_secs` is whatever the agent last flushed.
    Open {
        start: DateTime<Utc>,
        #[serde(default)]
        recorded_secs: i64,
    },
    /// Finished interval.
    Closed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        duration_secs: i64,
    },
}

impl IntervalSpan {
    /// Builds a closed span whose duration is derived from its endpoints.
    #[must_use]
    pub fn closed(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::Closed {
            start,
            end,
            duration_secs: (end - start).num_seconds(),
        }
    }

    #[must_use]
    pub const fn open(start: DateTime<Utc>) -> Self {
        Self::Open {
            start,
            recorded_secs: 0,
        }
    }

    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        match self {
            Self::Open { start, .. } | Self::Closed { start, .. } => *start,
        }
    }

    /// End timestamp, `None` while the interval is open.
    #[must_use]
    pub const fn end(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Open { .. } => None,
            Self::Closed { end, .. } => Some(*end),
        }
    }

    /// Duration as stored, without extrapolating open intervals.
    #[must_use]
    pub const fn recorded_secs(&self) -> i64 {
        match self {
            Self::Open { recorded_secs, .. } => *recorded_secs,
            Self::Closed { duration_secs, .. } => *duration_secs,
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// End used for ordering checks: the real end, or `horizon` while open.
    #[must_use]
    pub fn effective_end(&self, horizon: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Open { start, .. } => horizon.max(*start),
            Self::Closed { end, .. } => *end,
        }
    }
}

/// A contiguous span during which a device reported one focused application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInterval {
    pub id: IntervalId,
    pub employee_id: EmployeeId,
    pub device_id: DeviceId,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Assigned category. `None` only for rows the ingestion path never classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(flatten)]
    pub span: IntervalSpan,
    #[serde(default)]
    pub is_idle: bool,
}

impl UsageInterval {
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.span.start()
    }

    #[must_use]
    pub const fn end(&self) -> Option<DateTime<Utc>> {
        self.span.end()
    }
}
