// Operator-driven batch recomputation of statistics caches

use log::{error, info, warn};

use crate::cache::InvalidationController;
use crate::errors::LapStatsError;
use crate::laps::SessionId;
use crate::storage::SessionStore;

/// Which sessions a batch recompute covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeTarget {
    Session(SessionId),
    All,
    /// Sessions whose cache is absent, stale or empty
    OutdatedOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecomputeFailure {
    pub session_id: SessionId,
    pub message: String,
}

/// Outcome of a batch recompute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeReport {
    /// Sessions selected, in processing order
    pub planned: Vec<SessionId>,
    pub succeeded: Vec<SessionId>,
    pub failed: Vec<RecomputeFailure>,
    pub dry_run: bool,
}

impl RecomputeReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// The failure recorded for `session_id`, if its recompute failed
    pub fn failure_for(&self, session_id: SessionId) -> Option<&RecomputeFailure> {
        self.failed.iter().find(|f| f.session_id == session_id)
    }
}

/// Resolve `target` to a list of sessions
pub fn plan<S: SessionStore + ?Sized>(
    store: &S,
    target: RecomputeTarget,
) -> Result<Vec<SessionId>, LapStatsError> {
    match target {
        RecomputeTarget::Session(session_id) => {
            if !store.session_exists(session_id)? {
                return Err(LapStatsError::SessionNotFound { session_id });
            }
            Ok(vec![session_id])
        }
        RecomputeTarget::All => store.list_sessions(),
        RecomputeTarget::OutdatedOnly => {
            let mut outdated = Vec::new();
            for session_id in store.list_sessions()? {
                match store.load_cache(session_id) {
                    Ok(state) if !state.is_outdated() => {}
                    Ok(_) => outdated.push(session_id),
                    Err(e) => {
                        // left to the recompute to report
                        warn!("Could not read cache state of session {}: {}", session_id, e);
                        outdated.push(session_id);
                    }
                }
            }
            Ok(outdated)
        }
    }
}

/// Recompute every session `target` selects.
///
/// A failing session is recorded in the report and does not stop the batch.
/// With `dry_run` nothing is written and every planned session counts as done.
pub fn run<S: SessionStore + ?Sized>(
    store: &mut S,
    target: RecomputeTarget,
    dry_run: bool,
) -> Result<RecomputeReport, LapStatsError> {
    let planned = plan(&*store, target)?;
    info!(
        "Recomputing statistics for {} session(s){}",
        planned.len(),
        if dry_run { " (dry run)" } else { "" }
    );

    let mut report = RecomputeReport {
        planned: planned.clone(),
        dry_run,
        ..Default::default()
    };
    if dry_run {
        report.succeeded = planned;
        return Ok(report);
    }

    let mut controller = InvalidationController::new(store);
    for session_id in planned {
        match controller.recompute(session_id) {
            Ok(_) => report.succeeded.push(session_id),
            Err(e) => {
                error!("Failed to recompute session {}: {}", session_id, e);
                report.failed.push(RecomputeFailure {
                    session_id,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheState, CacheStatus};
    use crate::laps::{NewLap, SessionInfo};
    use crate::storage::InMemoryStore;
    use crate::storage::testing::FaultyStore;

    /// Three sessions: fresh, stale, never computed
    fn seeded_store() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        for track in ["Spa", "Monza", "Suzuka"] {
            let id = store
                .create_session(&SessionInfo::new(track.into(), "Porsche 911 GT3 R".into(), "Race".into()))
                .unwrap();
            store
                .insert_laps(
                    id,
                    &[
                        NewLap::new(1, "A", 0, 100.0).into_lap(id),
                        NewLap::new(2, "A", 0, 101.0).into_lap(id),
                    ],
                )
                .unwrap();
        }
        InvalidationController::new(&mut store).recompute(SessionId(1)).unwrap();
        store.store_cache(SessionId(2), &CacheState::stale()).unwrap();
        store
    }

    #[test]
    fn test_plan_outdated_only() {
        let store = seeded_store();
        assert_eq!(
            plan(&store, RecomputeTarget::OutdatedOnly).unwrap(),
            vec![SessionId(2), SessionId(3)]
        );
        assert_eq!(plan(&store, RecomputeTarget::All).unwrap().len(), 3);
    }

    #[test]
    fn test_plan_unknown_session() {
        let store = seeded_store();
        assert!(matches!(
            plan(&store, RecomputeTarget::Session(SessionId(42))),
            Err(LapStatsError::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_run_all() {
        let mut store = seeded_store();
        let report = run(&mut store, RecomputeTarget::All, false).unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 3);
        for id in store.list_sessions().unwrap() {
            assert_eq!(store.load_cache(id).unwrap().status(), CacheStatus::Fresh);
        }
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let mut store = seeded_store();
        let report = run(&mut store, RecomputeTarget::OutdatedOnly, true).unwrap();

        assert!(report.dry_run);
        assert_eq!(report.planned, vec![SessionId(2), SessionId(3)]);
        assert_eq!(store.load_cache(SessionId(2)).unwrap().status(), CacheStatus::Stale);
        assert_eq!(store.load_cache(SessionId(3)).unwrap().status(), CacheStatus::Absent);
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let mut store = FaultyStore::new(seeded_store());
        store.fail_cache_writes = true;

        let report = run(&mut store, RecomputeTarget::All, false).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 3);
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed[0].session_id, SessionId(1));
    }

    #[test]
    fn test_unreadable_cache_is_planned_and_reported() {
        let mut store = FaultyStore::new(seeded_store());
        store.fail_cache_reads = true;
        store.fail_cache_writes = true;

        let report = run(&mut store, RecomputeTarget::OutdatedOnly, false).unwrap();
        assert_eq!(report.planned.len(), 3);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failure_for(SessionId(2)).is_some());
        assert!(report.failure_for(SessionId(7)).is_none());
    }
}
