// In-memory session store, used by tests and when embedding the core

use std::collections::BTreeMap;

use crate::cache::CacheState;
use crate::errors::LapStatsError;
use crate::laps::{Lap, SessionId, SessionInfo};

use super::{SessionStore, check_insert, check_lap};

#[derive(Clone, Debug)]
struct SessionRecord {
    info: SessionInfo,
    laps: Vec<Lap>,
    cache: CacheState,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryStore {
    sessions: BTreeMap<SessionId, SessionRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, session_id: SessionId) -> Result<&SessionRecord, LapStatsError> {
        self.sessions
            .get(&session_id)
            .ok_or(LapStatsError::SessionNotFound { session_id })
    }

    fn record_mut(&mut self, session_id: SessionId) -> Result<&mut SessionRecord, LapStatsError> {
        self.sessions
            .get_mut(&session_id)
            .ok_or(LapStatsError::SessionNotFound { session_id })
    }
}

impl SessionStore for InMemoryStore {
    fn create_session(&mut self, info: &SessionInfo) -> Result<SessionId, LapStatsError> {
        let session_id = SessionId(
            self.sessions
                .keys()
                .next_back()
                .map(|id| id.0 + 1)
                .unwrap_or(1),
        );
        self.sessions.insert(
            session_id,
            SessionRecord {
                info: info.clone(),
                laps: Vec::new(),
                cache: CacheState::Absent,
            },
        );
        Ok(session_id)
    }

    fn session_info(&self, session_id: SessionId) -> Result<Option<SessionInfo>, LapStatsError> {
        Ok(self.sessions.get(&session_id).map(|r| r.info.clone()))
    }

    fn list_sessions(&self) -> Result<Vec<SessionId>, LapStatsError> {
        Ok(self.sessions.keys().copied().collect())
    }

    fn delete_session(&mut self, session_id: SessionId) -> Result<(), LapStatsError> {
        self.sessions.remove(&session_id);
        Ok(())
    }

    fn load_laps(&self, session_id: SessionId) -> Result<Vec<Lap>, LapStatsError> {
        Ok(self.record(session_id)?.laps.clone())
    }

    fn insert_laps(&mut self, session_id: SessionId, laps: &[Lap]) -> Result<(), LapStatsError> {
        let record = self.record_mut(session_id)?;
        check_insert(session_id, &record.laps, laps)?;
        record.laps.extend_from_slice(laps);
        Ok(())
    }

    fn replace_lap(&mut self, session_id: SessionId, lap: &Lap) -> Result<(), LapStatsError> {
        check_lap(session_id, lap)?;
        let record = self.record_mut(session_id)?;
        let existing = record
            .laps
            .iter_mut()
            .find(|l| l.key() == lap.key())
            .ok_or(LapStatsError::LapNotFound {
                session_id,
                lap_number: lap.lap_number,
                car_index: lap.car_index,
            })?;
        *existing = lap.clone();
        Ok(())
    }

    fn remove_laps(
        &mut self,
        session_id: SessionId,
        predicate: &dyn Fn(&Lap) -> bool,
    ) -> Result<usize, LapStatsError> {
        let record = self.record_mut(session_id)?;
        let before = record.laps.len();
        record.laps.retain(|lap| !predicate(lap));
        Ok(before - record.laps.len())
    }

    fn load_cache(&self, session_id: SessionId) -> Result<CacheState, LapStatsError> {
        Ok(self.record(session_id)?.cache.clone())
    }

    fn store_cache(
        &mut self,
        session_id: SessionId,
        state: &CacheState,
    ) -> Result<(), LapStatsError> {
        self.record_mut(session_id)?.cache = state.clone();
        Ok(())
    }
}
