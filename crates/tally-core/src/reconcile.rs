//! Overwriting persisted session statistics with recomputed values.
//!
//! The engine assumes at most one reconciler runs per session at a time;
//! callers serialize concurrent attempts (e.g. with row-level locks).

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::aggregate::SessionStatistics;
use crate::store::SessionStore;
use crate::types::SessionId;
use crate::validate::recompute;

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError<E> {
    /// No session with this id exists. Nothing was written.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    /// The store failed to read or write.
    #[error("store error while reconciling {session_id}: {source}")]
    Store {
        session_id: SessionId,
        #[source]
        source: E,
    },
}

/// Outcome of reconciling one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub session_id: SessionId,
    pub before: SessionStatistics,
    pub after: SessionStatistics,
    /// False when the stored values were already correct.
    pub changed: bool,
}

/// Recomputes a session's statistics and overwrites the stored row.
///
/// Open intervals run until the session's clock-out, or `now` while the
/// session is open. Reconciling an already-correct session rewrites the same
/// values, so running this twice yields the same result as running it once.
pub fn reconcile<S: SessionStore>(
    store: &S,
    session_id: &SessionId,
    now: DateTime<Utc>,
) -> Result<Reconciliation, ReconcileError<S::Error>> {
    let store_err = |source| ReconcileError::Store {
        session_id: session_id.clone(),
        source,
    };

    let session = store
        .get_session(session_id)
        .map_err(store_err)?
        .ok_or_else(|| ReconcileError::SessionNotFound(session_id.clone()))?;
    let intervals = store
        .fetch_session_intervals(&session, now)
        .map_err(store_err)?;

    let after = recompute(&session, &intervals, now);
    store
        .update_session_stats(session_id, &after)
        .map_err(store_err)?;

    let before = session.stored;
    let changed = before != after;
    if changed {
        tracing::info!(
            session_id = %session_id,
            before_total = before.total_work,
            after_total = after.total_work,
            "reconciled session statistics"
        );
    } else {
        tracing::debug!(session_id = %session_id, "session statistics already correct");
    }

    Ok(Reconciliation {
        session_id: session_id.clone(),
        before,
        after,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::fixtures::{closed, open, ts};
    use crate::session::WorkSession;
    use crate::store::memory::MemoryStore;
    use crate::types::{Category, DeviceId, EmployeeId};

    fn work_session(id: &str, clock_out: Option<i64>, stored: SessionStatistics) -> WorkSession {
        WorkSession {
            id: SessionId::new(id).unwrap(),
            employee_id: EmployeeId::new("emp-1").unwrap(),
            device_id: DeviceId::new("dev-1").unwrap(),
            clock_in: ts(0),
            clock_out: clock_out.map(ts),
            stored,
        }
    }

    fn drifted() -> SessionStatistics {
        SessionStatistics {
            total_work: 10,
            active_time: 10,
            idle_time: -5,
            productive_time: 10,
            neutral_time: 0,
            unproductive_time: 0,
        }
    }

    fn store() -> MemoryStore {
        MemoryStore::with(
            vec![work_session("s1", Some(60), drifted())],
            vec![
                closed(1, 0, 30, Some(Category::Productive), false),
                closed(2, 30, 40, None, true),
                closed(3, 40, 60, Some(Category::Unproductive), false),
                // Outside the session window.
                closed(4, 60, 90, Some(Category::Productive), false),
            ],
        )
    }

    #[test]
    fn overwrites_stored_stats_with_recomputed_values() {
        let store = store();
        let id = SessionId::new("s1").unwrap();
        let result = reconcile(&store, &id, ts(999)).unwrap();

        assert!(result.changed);
        assert_eq!(result.before, drifted());
        let expected = SessionStatistics {
            total_work: 3600,
            active_time: 3000,
            idle_time: 600,
            productive_time: 1800,
            neutral_time: 0,
            unproductive_time: 1200,
        };
        assert_eq!(result.after, expected);
        assert_eq!(store.stored("s1"), expected);
    }

    #[test]
    fn reconciling_twice_is_a_no_op() {
        let store = store();
        let id = SessionId::new("s1").unwrap();
        let first = reconcile(&store, &id, ts(999)).unwrap();
        let second = reconcile(&store, &id, ts(999)).unwrap();

        assert!(!second.changed);
        assert_eq!(second.before, first.after);
        assert_eq!(second.after, first.after);
    }

    #[test]
    fn open_session_uses_now() {
        let store = MemoryStore::with(
            vec![work_session("s1", None, SessionStatistics::default())],
            vec![open(1, 0, 0, Some(Category::Productive))],
        );
        let id = SessionId::new("s1").unwrap();
        let result = reconcile(&store, &id, ts(45)).unwrap();
        assert_eq!(result.after.productive_time, 45 * 60);
    }

    #[test]
    fn missing_session_is_a_structured_error_without_writes() {
        let store = store();
        let id = SessionId::new("nope").unwrap();
        let err = reconcile(&store, &id, ts(999)).unwrap_err();
        assert!(matches!(err, ReconcileError::SessionNotFound(ref missing) if missing == &id));
        assert_eq!(err.to_string(), "session nope not found");
        assert_eq!(store.stat_writes.get(), 0);
    }

    #[test]
    fn store_failure_is_reported_without_writes() {
        let mut store = store();
        store.broken_sessions.insert(SessionId::new("s1").unwrap());
        let err = reconcile(&store, &SessionId::new("s1").unwrap(), ts(999)).unwrap_err();
        assert!(matches!(err, ReconcileError::Store { .. }));
        assert_eq!(store.stat_writes.get(), 0);
    }
}
