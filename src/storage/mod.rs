// Storage module
// Persistence of session lap logs and their statistics cache

pub mod file_based;
pub mod memory;

use crate::cache::CacheState;
use crate::errors::LapStatsError;
use crate::laps::{Lap, SessionId, SessionInfo, ensure_unique};

pub use file_based::FileBasedStore;
pub use memory::InMemoryStore;

/// Trait defining the interface for session persistence.
///
/// Each session owns its lap log and one cache state. Sessions are independent
/// of each other, so implementations need no cross-session locking.
pub trait SessionStore {
    /// Create a new, empty session and return its identifier
    fn create_session(&mut self, info: &SessionInfo) -> Result<SessionId, LapStatsError>;

    /// Load descriptive attributes, `None` when the session does not exist
    fn session_info(&self, session_id: SessionId) -> Result<Option<SessionInfo>, LapStatsError>;

    /// All session identifiers in ascending order
    fn list_sessions(&self) -> Result<Vec<SessionId>, LapStatsError>;

    /// Delete a session together with its laps and cache
    fn delete_session(&mut self, session_id: SessionId) -> Result<(), LapStatsError>;

    /// Load the lap log in insertion order
    fn load_laps(&self, session_id: SessionId) -> Result<Vec<Lap>, LapStatsError>;

    /// Append laps to the log. Either the whole batch is written or nothing is.
    fn insert_laps(&mut self, session_id: SessionId, laps: &[Lap]) -> Result<(), LapStatsError>;

    /// Overwrite the lap sharing `lap`'s `(lap_number, car_index)`
    fn replace_lap(&mut self, session_id: SessionId, lap: &Lap) -> Result<(), LapStatsError>;

    /// Remove every lap matching `predicate`, returning how many were removed
    fn remove_laps(
        &mut self,
        session_id: SessionId,
        predicate: &dyn Fn(&Lap) -> bool,
    ) -> Result<usize, LapStatsError>;

    /// Load the cache state, `Absent` if none was ever stored
    fn load_cache(&self, session_id: SessionId) -> Result<CacheState, LapStatsError>;

    /// Replace the cache state as a whole. On failure the previous state must
    /// be left intact.
    fn store_cache(&mut self, session_id: SessionId, state: &CacheState)
    -> Result<(), LapStatsError>;

    fn session_exists(&self, session_id: SessionId) -> Result<bool, LapStatsError> {
        Ok(self.session_info(session_id)?.is_some())
    }
}

/// Validate a batch before it is added to a session's existing laps
pub(crate) fn check_insert(
    session_id: SessionId,
    existing: &[Lap],
    incoming: &[Lap],
) -> Result<(), LapStatsError> {
    for lap in incoming {
        check_lap(session_id, lap)?;
    }
    ensure_unique(session_id, existing, incoming)
}

pub(crate) fn check_lap(session_id: SessionId, lap: &Lap) -> Result<(), LapStatsError> {
    if lap.session_id != session_id {
        return Err(LapStatsError::InvalidUserInput {
            field: "session_id".to_string(),
            reason: format!(
                "lap belongs to session {} but was written to session {}",
                lap.session_id, session_id
            ),
        });
    }
    lap.validate()
}
