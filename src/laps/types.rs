// Core data structures for the lap log of a racing session

use std::collections::HashSet;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::errors::LapStatsError;

use super::format::format_lap_time;

/// Identifier of a session within a store
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive attributes of a session. Not consumed by the statistics core.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionInfo {
    /// Optional user-facing name (e.g., "Sunday league race")
    pub session_name: Option<String>,
    pub track: String,
    pub car: String,
    /// e.g., "Practice", "Qualifying", "Race"
    pub session_type: String,
    /// Timestamp when the session was uploaded
    pub upload_date: SystemTime,
}

impl SessionInfo {
    /// Create session info stamped with the current time
    pub fn new(track: String, car: String, session_type: String) -> Self {
        Self {
            session_name: None,
            track,
            car,
            session_type,
            upload_date: SystemTime::now(),
        }
    }

    pub fn with_name(mut self, session_name: String) -> Self {
        self.session_name = Some(session_name);
        self
    }
}

impl fmt::Display for SessionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_name {
            Some(name) => write!(f, "{} - {} - {}", name, self.track, self.car),
            None => write!(f, "{} - {} ({})", self.track, self.car, self.session_type),
        }
    }
}

/// A lap record as handed over by ingestion, before it is attached to a session.
///
/// Times are already normalized to seconds and the driver is already resolved.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewLap {
    /// Lap number, `0` is the out lap
    pub lap_number: u32,
    pub driver_name: String,
    /// Position of the car in the session roster
    pub car_index: u32,
    /// Total lap time in seconds
    pub total_time: f64,
    /// Sector times in seconds, in physical sector order. May be shorter than
    /// the track's sector count when telemetry is missing.
    #[serde(default)]
    pub sectors: Vec<f64>,
    #[serde(default = "unknown_compound")]
    pub tyre_compound: String,
    /// Number of track limit violations
    #[serde(default)]
    pub cuts: u32,
}

fn unknown_compound() -> String {
    "Unknown".to_string()
}

impl NewLap {
    pub fn new(lap_number: u32, driver_name: &str, car_index: u32, total_time: f64) -> Self {
        Self {
            lap_number,
            driver_name: driver_name.to_string(),
            car_index,
            total_time,
            sectors: Vec::new(),
            tyre_compound: unknown_compound(),
            cuts: 0,
        }
    }

    pub fn with_sectors(mut self, sectors: Vec<f64>) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn with_tyre(mut self, tyre_compound: &str) -> Self {
        self.tyre_compound = tyre_compound.to_string();
        self
    }

    /// Attach the record to its owning session
    pub fn into_lap(self, session_id: SessionId) -> Lap {
        Lap {
            session_id,
            lap_number: self.lap_number,
            driver_name: self.driver_name,
            car_index: self.car_index,
            total_time: self.total_time,
            sectors: self.sectors,
            tyre_compound: self.tyre_compound,
            cuts: self.cuts,
        }
    }
}

/// A lap belonging to exactly one session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Lap {
    pub session_id: SessionId,
    pub lap_number: u32,
    pub driver_name: String,
    pub car_index: u32,
    pub total_time: f64,
    #[serde(default)]
    pub sectors: Vec<f64>,
    pub tyre_compound: String,
    #[serde(default)]
    pub cuts: u32,
}

impl Lap {
    /// Out laps are not representative racing laps
    pub fn is_out_lap(&self) -> bool {
        self.lap_number == 0
    }

    pub fn is_racing_lap(&self) -> bool {
        self.lap_number > 0
    }

    /// Sector time at `idx`, if telemetry recorded it
    pub fn sector(&self, idx: usize) -> Option<f64> {
        self.sectors.get(idx).copied()
    }

    /// The `(lap_number, car_index)` pair that is unique within a session
    pub fn key(&self) -> (u32, u32) {
        (self.lap_number, self.car_index)
    }

    /// Reject values the calculator cannot reason about
    pub fn validate(&self) -> Result<(), LapStatsError> {
        if !self.total_time.is_finite() || self.total_time <= 0.0 {
            return Err(LapStatsError::MalformedLap {
                reason: format!(
                    "lap {} of {} in session {} has invalid total time {}",
                    self.lap_number, self.driver_name, self.session_id, self.total_time
                ),
            });
        }
        if let Some((idx, value)) = self
            .sectors
            .iter()
            .enumerate()
            .find(|(_, s)| !s.is_finite() || **s < 0.0)
        {
            return Err(LapStatsError::MalformedLap {
                reason: format!(
                    "lap {} of {} in session {} has invalid sector {} time {}",
                    self.lap_number,
                    self.driver_name,
                    self.session_id,
                    idx + 1,
                    value
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Lap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lap {} - {} ({})",
            self.lap_number,
            self.driver_name,
            format_lap_time(Some(self.total_time))
        )
    }
}

/// Check that `incoming` laps can be added next to `existing` without breaking
/// the `(session_id, lap_number, car_index)` uniqueness invariant
pub fn ensure_unique(
    session_id: SessionId,
    existing: &[Lap],
    incoming: &[Lap],
) -> Result<(), LapStatsError> {
    let mut seen: HashSet<(u32, u32)> = existing.iter().map(Lap::key).collect();
    for lap in incoming {
        if !seen.insert(lap.key()) {
            return Err(LapStatsError::DuplicateLap {
                session_id,
                lap_number: lap.lap_number,
                car_index: lap.car_index,
            });
        }
    }
    Ok(())
}
