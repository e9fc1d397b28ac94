// Statistics cache module
// Persisted snapshot of a session's derived statistics and the protocol that
// keeps it consistent with the lap log

pub mod controller;

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::statistics::SessionStatistics;

pub use controller::InvalidationController;

/// Derived statistics together with the moment they were computed.
///
/// Always replaced as a whole, never edited field by field.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatisticsSnapshot {
    pub statistics: SessionStatistics,
    pub last_calculated: SystemTime,
}

impl StatisticsSnapshot {
    pub fn new(statistics: SessionStatistics) -> Self {
        Self {
            statistics,
            last_calculated: SystemTime::now(),
        }
    }
}

/// Cache state of a single session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CacheState {
    /// Nothing has been computed yet
    #[default]
    Absent,
    /// Computed from the lap log as it currently stands
    Fresh { snapshot: StatisticsSnapshot },
    /// Cleared after the lap log changed, pending recompute
    Stale { invalidated_at: SystemTime },
}

impl CacheState {
    pub fn fresh(statistics: SessionStatistics) -> Self {
        CacheState::Fresh {
            snapshot: StatisticsSnapshot::new(statistics),
        }
    }

    pub fn stale() -> Self {
        CacheState::Stale {
            invalidated_at: SystemTime::now(),
        }
    }

    /// The snapshot readers may serve, if any. A fresh snapshot without any
    /// driver statistics counts as absent.
    pub fn usable_snapshot(&self) -> Option<&StatisticsSnapshot> {
        match self {
            CacheState::Fresh { snapshot } if !snapshot.statistics.is_empty() => Some(snapshot),
            _ => None,
        }
    }

    pub fn into_usable_snapshot(self) -> Option<StatisticsSnapshot> {
        match self {
            CacheState::Fresh { snapshot } if !snapshot.statistics.is_empty() => Some(snapshot),
            _ => None,
        }
    }

    /// When the cache last changed state, `None` if it never did
    pub fn last_calculated(&self) -> Option<SystemTime> {
        match self {
            CacheState::Absent => None,
            CacheState::Fresh { snapshot } => Some(snapshot.last_calculated),
            CacheState::Stale { invalidated_at } => Some(*invalidated_at),
        }
    }

    pub fn status(&self) -> CacheStatus {
        match self {
            CacheState::Absent => CacheStatus::Absent,
            CacheState::Fresh { .. } => CacheStatus::Fresh,
            CacheState::Stale { .. } => CacheStatus::Stale,
        }
    }

    /// Whether an "outdated only" recompute should pick this session up
    pub fn is_outdated(&self) -> bool {
        self.usable_snapshot().is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    Absent,
    Fresh,
    Stale,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStatus::Absent => write!(f, "absent"),
            CacheStatus::Fresh => write!(f, "fresh"),
            CacheStatus::Stale => write!(f, "stale"),
        }
    }
}
