// Lap log mutations
//
// Deletions and updates mark the cache stale before they touch the lap log. A
// failed invalidation leaves both untouched, and a failed log write only costs
// an extra stale mark.

use log::info;

use crate::cache::InvalidationController;
use crate::errors::LapStatsError;
use crate::laps::{Lap, NewLap, SessionId};
use crate::storage::SessionStore;

/// How fresh the cache should be once a mutation returns
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Leave the cache stale, readers calculate on demand until the next recompute
    #[default]
    Lazy,
    /// Recompute straight after invalidating
    Immediate,
}

pub struct LapLogEditor<'s, S: SessionStore + ?Sized> {
    store: &'s mut S,
}

impl<'s, S: SessionStore + ?Sized> LapLogEditor<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    /// Remove every lap of `driver_name`, returning how many were removed
    pub fn delete_driver(
        &mut self,
        session_id: SessionId,
        driver_name: &str,
        freshness: Freshness,
    ) -> Result<usize, LapStatsError> {
        let removed = self.delete_matching(session_id, &|lap| lap.driver_name == driver_name)?;
        info!(
            "Removed {} laps of {} from session {}",
            removed, driver_name, session_id
        );
        self.refresh(session_id, removed > 0 && freshness == Freshness::Immediate)?;
        Ok(removed)
    }

    /// Remove one lap by its `(lap_number, car_index)` key
    pub fn delete_lap(
        &mut self,
        session_id: SessionId,
        lap_number: u32,
        car_index: u32,
        freshness: Freshness,
    ) -> Result<(), LapStatsError> {
        let removed = self.delete_matching(session_id, &|lap| {
            lap.lap_number == lap_number && lap.car_index == car_index
        })?;
        if removed == 0 {
            return Err(LapStatsError::LapNotFound {
                session_id,
                lap_number,
                car_index,
            });
        }
        self.refresh(session_id, freshness == Freshness::Immediate)
    }

    /// Overwrite an existing lap record
    pub fn update_lap(&mut self, lap: &Lap, freshness: Freshness) -> Result<(), LapStatsError> {
        let session_id = lap.session_id;
        if !self
            .store
            .load_laps(session_id)?
            .iter()
            .any(|existing| existing.key() == lap.key())
        {
            return Err(LapStatsError::LapNotFound {
                session_id,
                lap_number: lap.lap_number,
                car_index: lap.car_index,
            });
        }

        InvalidationController::new(&mut *self.store).before_lap_updated(session_id)?;
        self.store.replace_lap(session_id, lap)?;
        self.refresh(session_id, freshness == Freshness::Immediate)
    }

    /// Append a single lap outside an ingestion batch. The cache is not
    /// touched; it catches up on the next explicit recompute.
    pub fn add_lap(&mut self, session_id: SessionId, new_lap: NewLap) -> Result<Lap, LapStatsError> {
        let lap = new_lap.into_lap(session_id);
        self.store.insert_laps(session_id, std::slice::from_ref(&lap))?;
        InvalidationController::new(&mut *self.store).on_lap_created(session_id, lap.lap_number);
        Ok(lap)
    }

    /// Invalidate for the laps `predicate` selects, then remove them.
    /// Nothing matching means no transition at all.
    fn delete_matching(
        &mut self,
        session_id: SessionId,
        predicate: &dyn Fn(&Lap) -> bool,
    ) -> Result<usize, LapStatsError> {
        let matching = self
            .store
            .load_laps(session_id)?
            .iter()
            .filter(|&lap| predicate(lap))
            .count();

        InvalidationController::new(&mut *self.store).before_laps_deleted(session_id, matching)?;
        if matching == 0 {
            return Ok(0);
        }
        self.store.remove_laps(session_id, predicate)
    }

    fn refresh(&mut self, session_id: SessionId, recompute: bool) -> Result<(), LapStatsError> {
        if recompute {
            InvalidationController::new(&mut *self.store).recompute(session_id)?;
        }
        Ok(())
    }
}
