// Session ingestion
//
// Creates a session, writes its whole lap batch, then precomputes the
// statistics cache once for the batch.

use std::path::Path;

use log::{info, warn};

use crate::cache::InvalidationController;
use crate::errors::LapStatsError;
use crate::laps::{Lap, NewLap, SessionId, SessionInfo};
use crate::storage::SessionStore;

/// Result of ingesting one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub session_id: SessionId,
    pub lap_count: usize,
    /// Whether the statistics cache was filled at the end of the batch
    pub cache_fresh: bool,
}

/// Store a new session with its laps.
///
/// The lap batch is written as a whole; if it is rejected the freshly created
/// session is removed again. When `recompute_after` is set the cache is
/// precomputed, and a failure there only costs the precomputation.
pub fn ingest_session<S: SessionStore + ?Sized>(
    store: &mut S,
    info: &SessionInfo,
    laps: Vec<NewLap>,
    recompute_after: bool,
) -> Result<IngestOutcome, LapStatsError> {
    let session_id = store.create_session(info)?;
    let laps: Vec<Lap> = laps.into_iter().map(|l| l.into_lap(session_id)).collect();

    if let Err(e) = store.insert_laps(session_id, &laps) {
        warn!("Rejected lap batch for session {}: {}", session_id, e);
        if let Err(cleanup) = store.delete_session(session_id) {
            warn!("Could not remove session {}: {}", session_id, cleanup);
        }
        return Err(e);
    }

    let mut controller = InvalidationController::new(store);
    for lap in &laps {
        controller.on_lap_created(session_id, lap.lap_number);
    }
    let cache_fresh =
        recompute_after && controller.recompute_best_effort(session_id).is_some();

    info!(
        "Ingested session {} ({}) with {} laps",
        session_id,
        info,
        laps.len()
    );
    Ok(IngestOutcome {
        session_id,
        lap_count: laps.len(),
        cache_fresh,
    })
}

/// Read lap records from a JSON Lines file, one [`NewLap`] per line
pub fn read_laps_jsonl(path: &Path) -> Result<Vec<NewLap>, LapStatsError> {
    serde_jsonlines::json_lines(path)
        .map_err(|e| LapStatsError::storage_io("open_lap_file", e))?
        .collect::<Result<Vec<NewLap>, std::io::Error>>()
        .map_err(|e| LapStatsError::storage_io("parse_lap_file", e))
}
