//! Work sessions bounded by clock-in and clock-out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::SessionStatistics;
use crate::types::{DeviceId, EmployeeId, SessionId};

/// A persisted work session and the statistics stored for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
    pub id: SessionId,
    pub employee_id: EmployeeId,
    pub device_id: DeviceId,
    pub clock_in: DateTime<Utc>,
    /// `None` while the employee is still clocked in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_out: Option<DateTime<Utc>>,
    /// Statistics as last written to the store.
    #[serde(default)]
    pub stored: SessionStatistics,
}

impl WorkSession {
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.clock_out.is_some()
    }

    /// Where the session ends for accounting purposes.
    #[must_use]
    pub fn end_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.clock_out.unwrap_or(now)
    }
}
