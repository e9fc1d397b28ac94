// Lap log module
// Lap records owned by a session, plus the session's descriptive attributes

pub mod format;
pub mod types;

// Re-export commonly used types
pub use format::format_lap_time;
pub use types::{Lap, NewLap, SessionId, SessionInfo, ensure_unique};
