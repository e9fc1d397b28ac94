// Session statistics module
// Derived analytics computed from a session's lap log

pub mod calculator;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use calculator::StatisticsCalculator;

/// Sector count assumed when no lap in the session carries sector data
pub const DEFAULT_SECTOR_COUNT: usize = 3;

/// Performance summary for a single driver.
///
/// Times are computed over the driver's racing laps (lap number > 0), falling
/// back to all of the driver's laps when only out laps were recorded.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DriverStatistics {
    pub best_lap_time: f64,
    /// Sum of the best time at each sector index, `None` without sector data
    pub optimal_lap_time: Option<f64>,
    /// Count of all laps, out laps included
    pub lap_count: usize,
    /// Count of the laps used for the time calculations
    pub racing_lap_count: usize,
    pub avg_lap_time: f64,
    /// Population standard deviation of lap times, two slowest laps trimmed
    /// when more than three are available
    pub consistency: f64,
    /// Display toggle, always true when computed
    pub visible: bool,
}

pub type DriverStatisticsMap = BTreeMap<String, DriverStatistics>;

/// Per-driver lap time series keyed by lap number. Every driver carries every
/// lap number seen in the session, `None` marking a lap the driver did not log.
pub type ChartData = BTreeMap<String, BTreeMap<u32, Option<f64>>>;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SectorHighlight {
    pub fastest: f64,
    pub slowest: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct LapHighlights {
    pub fastest_total: Option<f64>,
    pub slowest_total: Option<f64>,
    /// Personal best total time per driver over racing laps
    pub driver_pb_total: BTreeMap<String, f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SectorStatistics {
    /// Session-wide fastest and slowest time per sector index
    pub sector_highlights: BTreeMap<usize, SectorHighlight>,
    /// Personal best per driver per sector index, over racing laps
    pub driver_pb_sectors: BTreeMap<String, BTreeMap<usize, f64>>,
    pub lap_highlights: LapHighlights,
    pub sector_count: usize,
}

impl Default for SectorStatistics {
    fn default() -> Self {
        Self {
            sector_highlights: BTreeMap::new(),
            driver_pb_sectors: BTreeMap::new(),
            lap_highlights: LapHighlights::default(),
            sector_count: DEFAULT_SECTOR_COUNT,
        }
    }
}

/// The fastest racing lap of a session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FastestLap {
    pub time: f64,
    pub driver: String,
}

/// Everything the calculator derives from one session's lap log
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct SessionStatistics {
    pub driver_statistics: DriverStatisticsMap,
    pub chart_data: ChartData,
    pub sector_statistics: SectorStatistics,
    pub fastest_lap_time: Option<f64>,
    pub fastest_lap_driver: Option<String>,
    pub total_laps: usize,
    pub total_drivers: usize,
}

impl SessionStatistics {
    pub fn fastest_lap(&self) -> Option<FastestLap> {
        match (self.fastest_lap_time, &self.fastest_lap_driver) {
            (Some(time), Some(driver)) => Some(FastestLap {
                time,
                driver: driver.clone(),
            }),
            _ => None,
        }
    }

    /// No driver statistics means nothing worth serving from a cache
    pub fn is_empty(&self) -> bool {
        self.driver_statistics.is_empty()
    }
}
