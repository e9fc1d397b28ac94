// Error types for lapstats

use crate::laps::SessionId;
use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum LapStatsError {
    // Lap log errors
    #[snafu(display("Session {session_id} not found"))]
    SessionNotFound { session_id: SessionId },
    #[snafu(display("Lap {lap_number} for car {car_index} not found in session {session_id}"))]
    LapNotFound {
        session_id: SessionId,
        lap_number: u32,
        car_index: u32,
    },
    #[snafu(display(
        "Duplicate lap {lap_number} for car {car_index} in session {session_id}"
    ))]
    DuplicateLap {
        session_id: SessionId,
        lap_number: u32,
        car_index: u32,
    },

    // Computation errors
    #[snafu(display("Malformed lap data: {reason}"))]
    MalformedLap { reason: String },

    // Statistics cache errors
    #[snafu(display("Failed to write statistics cache for session {session_id}: {reason}"))]
    CacheWriteFailure {
        session_id: SessionId,
        reason: String,
    },

    // Storage errors
    #[snafu(display("Storage operation failed: {operation}"))]
    StorageIo {
        operation: String,
        source: io::Error,
    },
    #[snafu(display("Error serializing {what}"))]
    Serialization {
        what: String,
        source: serde_json::Error,
    },

    // Config management errors
    #[snafu(display("Could not find application data directory"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}

impl LapStatsError {
    pub(crate) fn storage_io(operation: impl Into<String>, source: io::Error) -> Self {
        LapStatsError::StorageIo {
            operation: operation.into(),
            source,
        }
    }
}
