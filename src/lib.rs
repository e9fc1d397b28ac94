// Library interface for lapstats
// Lap statistics for racing sessions and the cache that keeps them consistent

pub mod cache;
pub mod config;
pub mod editor;
pub mod errors;
pub mod ingest;
pub mod laps;
pub mod query;
pub mod recompute;
pub mod statistics;
pub mod storage;

// Re-export commonly used types
pub use cache::{CacheState, CacheStatus, InvalidationController, StatisticsSnapshot};
pub use config::AppConfig;
pub use editor::{Freshness, LapLogEditor};
pub use errors::LapStatsError;
pub use ingest::{IngestOutcome, ingest_session, read_laps_jsonl};
pub use laps::{Lap, NewLap, SessionId, SessionInfo, format_lap_time};
pub use query::QueryFacade;
pub use recompute::{RecomputeReport, RecomputeTarget};
pub use statistics::{
    ChartData, DriverStatistics, DriverStatisticsMap, FastestLap, SectorStatistics,
    SessionStatistics, StatisticsCalculator,
};
pub use storage::{FileBasedStore, InMemoryStore, SessionStore};
