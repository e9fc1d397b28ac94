// Read-only access to a session's derived statistics
//
// Every query prefers the cached snapshot and falls back to calculating over
// the live lap log when the cache is absent or stale. The fallback result is
// not written back; only ingestion and explicit recomputes fill the cache.

use log::{debug, info};

use crate::errors::LapStatsError;
use crate::laps::SessionId;
use crate::statistics::{
    ChartData, DriverStatisticsMap, FastestLap, SectorStatistics, SessionStatistics,
    StatisticsCalculator,
};
use crate::storage::SessionStore;

pub struct QueryFacade<'s, S: SessionStore + ?Sized> {
    store: &'s S,
}

impl<'s, S: SessionStore + ?Sized> QueryFacade<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Full statistics for a session, cached or calculated on demand
    pub fn statistics(&self, session_id: SessionId) -> Result<SessionStatistics, LapStatsError> {
        let cache = self.store.load_cache(session_id)?;
        let status = cache.status();
        if let Some(snapshot) = cache.into_usable_snapshot() {
            debug!("Serving cached statistics for session {}", session_id);
            return Ok(snapshot.statistics);
        }

        info!(
            "Statistics cache for session {} is {}, calculating on demand",
            session_id, status
        );
        let laps = self.store.load_laps(session_id)?;
        StatisticsCalculator::new(&laps).calculate_all()
    }

    pub fn get_driver_statistics(
        &self,
        session_id: SessionId,
    ) -> Result<DriverStatisticsMap, LapStatsError> {
        Ok(self.statistics(session_id)?.driver_statistics)
    }

    pub fn get_chart_data(&self, session_id: SessionId) -> Result<ChartData, LapStatsError> {
        Ok(self.statistics(session_id)?.chart_data)
    }

    pub fn get_sector_statistics(
        &self,
        session_id: SessionId,
    ) -> Result<SectorStatistics, LapStatsError> {
        Ok(self.statistics(session_id)?.sector_statistics)
    }

    /// Fastest racing lap as `(time, driver)`, `None` without racing laps
    pub fn get_fastest_lap(&self, session_id: SessionId) -> Result<Option<FastestLap>, LapStatsError> {
        Ok(self.statistics(session_id)?.fastest_lap())
    }
}
