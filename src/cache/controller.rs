use log::{debug, info, warn};

use crate::errors::LapStatsError;
use crate::laps::SessionId;
use crate::statistics::StatisticsCalculator;
use crate::storage::SessionStore;

use super::{CacheState, StatisticsSnapshot};

/// Decides when a session's statistics cache is recomputed or cleared.
///
/// Collaborators that mutate the lap log call the matching hook explicitly.
/// Deletions and updates invalidate before the log write, so a rejected
/// invalidation never leaves a fresh snapshot over a changed log. Transitions:
///
/// - absent/stale -> fresh: [`recompute`](Self::recompute), at the end of an
///   ingestion batch or on operator request
/// - fresh -> stale: [`before_lap_updated`](Self::before_lap_updated) and
///   [`before_laps_deleted`](Self::before_laps_deleted)
/// - lap creation never transitions on its own, ingestion recomputes once per
///   batch instead
pub struct InvalidationController<'s, S: SessionStore + ?Sized> {
    store: &'s mut S,
}

impl<'s, S: SessionStore + ?Sized> InvalidationController<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    /// Recompute the statistics from the live lap log and store them as the
    /// new fresh snapshot. Nothing is written if the calculation fails, and a
    /// rejected write leaves the previous cache state in place.
    pub fn recompute(&mut self, session_id: SessionId) -> Result<StatisticsSnapshot, LapStatsError> {
        let laps = self.store.load_laps(session_id)?;
        let statistics = StatisticsCalculator::new(&laps).calculate_all()?;
        let snapshot = StatisticsSnapshot::new(statistics);

        self.store.store_cache(
            session_id,
            &CacheState::Fresh {
                snapshot: snapshot.clone(),
            },
        )?;
        info!(
            "Recalculated statistics for session {} ({} laps, {} drivers)",
            session_id, snapshot.statistics.total_laps, snapshot.statistics.total_drivers
        );
        Ok(snapshot)
    }

    /// Recompute after ingestion. Failures are logged and swallowed since the
    /// session stays readable through the read-time fallback.
    pub fn recompute_best_effort(&mut self, session_id: SessionId) -> Option<StatisticsSnapshot> {
        match self.recompute(session_id) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    "Could not precompute statistics for session {}, reads will calculate on demand: {}",
                    session_id, e
                );
                None
            }
        }
    }

    /// Clear the cache, marking it stale as of now
    pub fn invalidate(&mut self, session_id: SessionId) -> Result<(), LapStatsError> {
        let previous = self.store.load_cache(session_id)?;
        self.store.store_cache(session_id, &CacheState::stale())?;
        info!(
            "Invalidated statistics cache for session {} (was {})",
            session_id,
            previous.status()
        );
        Ok(())
    }

    /// A new lap was written. The cache is left as is; the caller recomputes
    /// once the whole batch is in.
    pub fn on_lap_created(&mut self, session_id: SessionId, lap_number: u32) {
        debug!(
            "Lap {} created in session {}, cache left untouched until recompute",
            lap_number, session_id
        );
    }

    /// An existing lap is about to be overwritten
    pub fn before_lap_updated(&mut self, session_id: SessionId) -> Result<(), LapStatsError> {
        self.invalidate(session_id)
    }

    /// `count` laps are about to be deleted from the session
    pub fn before_laps_deleted(
        &mut self,
        session_id: SessionId,
        count: usize,
    ) -> Result<(), LapStatsError> {
        if count == 0 {
            debug!("No laps to remove from session {}, cache unchanged", session_id);
            return Ok(());
        }
        self.invalidate(session_id)
    }
}
