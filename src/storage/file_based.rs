// File-based session store
//
// Layout, one directory per session:
//   <root>/<session_id>/session.json     descriptive attributes
//   <root>/<session_id>/laps.jsonl       lap log, one lap per line
//   <root>/<session_id>/statistics.json  statistics cache state

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_jsonlines::JsonLinesWriter;
use tempfile::NamedTempFile;

use crate::cache::CacheState;
use crate::errors::LapStatsError;
use crate::laps::{Lap, SessionId, SessionInfo};

use super::{SessionStore, check_insert, check_lap};

const SESSION_FILE: &str = "session.json";
const LAPS_FILE: &str = "laps.jsonl";
const CACHE_FILE: &str = "statistics.json";

pub struct FileBasedStore {
    /// Base directory holding one sub-directory per session
    storage_path: PathBuf,
}

impl FileBasedStore {
    /// Create a store rooted at `storage_path`, creating the directory if needed
    pub fn new(storage_path: PathBuf) -> Result<Self, LapStatsError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path)
                .map_err(|e| LapStatsError::storage_io("create_storage_dir", e))?;
        }

        Ok(Self { storage_path })
    }

    pub fn default_storage_path() -> Result<PathBuf, LapStatsError> {
        let app_data_dir = dirs::data_dir().ok_or(LapStatsError::NoConfigDir)?;
        Ok(app_data_dir.join("lapstats").join("sessions"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn session_dir(&self, session_id: SessionId) -> PathBuf {
        self.storage_path.join(session_id.to_string())
    }

    /// Directory of an existing session
    fn existing_session_dir(&self, session_id: SessionId) -> Result<PathBuf, LapStatsError> {
        let dir = self.session_dir(session_id);
        if dir.join(SESSION_FILE).is_file() {
            Ok(dir)
        } else {
            Err(LapStatsError::SessionNotFound { session_id })
        }
    }

    /// Write into a uniquely named temp file next to `path` and move it into
    /// place, so readers observe either the previous file or the new one
    fn write_atomically(
        path: &Path,
        write: impl FnOnce(&mut fs::File) -> io::Result<()>,
    ) -> Result<(), LapStatsError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(dir)
            .map_err(|e| LapStatsError::storage_io("create_temp_file", e))?;

        write(temp_file.as_file_mut())
            .map_err(|e| LapStatsError::storage_io("write_temp_file", e))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| LapStatsError::storage_io("sync_temp_file", e))?;

        // the temp file is removed when persisting fails
        temp_file
            .persist(path)
            .map_err(|e| LapStatsError::storage_io("atomic_move", e.error))?;
        Ok(())
    }

    fn write_json(path: &Path, content: &[u8]) -> Result<(), LapStatsError> {
        Self::write_atomically(path, |file| file.write_all(content))
    }

    fn write_laps(dir: &Path, laps: &[Lap]) -> Result<(), LapStatsError> {
        Self::write_atomically(&dir.join(LAPS_FILE), |file| {
            let mut writer = JsonLinesWriter::new(BufWriter::new(file));
            writer.write_all(laps)?;
            writer.flush()
        })
    }

    fn read_laps(dir: &Path) -> Result<Vec<Lap>, LapStatsError> {
        let path = dir.join(LAPS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        serde_jsonlines::json_lines(&path)
            .map_err(|e| LapStatsError::storage_io("read_laps", e))?
            .collect::<Result<Vec<Lap>, std::io::Error>>()
            .map_err(|e| LapStatsError::storage_io("parse_laps", e))
    }
}

impl SessionStore for FileBasedStore {
    fn create_session(&mut self, info: &SessionInfo) -> Result<SessionId, LapStatsError> {
        let session_id = SessionId(
            self.list_sessions()?
                .last()
                .map(|id| id.0 + 1)
                .unwrap_or(1),
        );
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).map_err(|e| LapStatsError::storage_io("create_session", e))?;

        let content =
            serde_json::to_vec_pretty(info).map_err(|e| LapStatsError::Serialization {
                what: "session info".to_string(),
                source: e,
            })?;
        Self::write_json(&dir.join(SESSION_FILE), &content)?;

        debug!("Created session {} in {:?}", session_id, dir);
        Ok(session_id)
    }

    fn session_info(&self, session_id: SessionId) -> Result<Option<SessionInfo>, LapStatsError> {
        let path = self.session_dir(session_id).join(SESSION_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&path).map_err(|e| LapStatsError::storage_io("read_session", e))?;
        let info = serde_json::from_str(&content).map_err(|e| LapStatsError::Serialization {
            what: "session info".to_string(),
            source: e,
        })?;
        Ok(Some(info))
    }

    fn list_sessions(&self) -> Result<Vec<SessionId>, LapStatsError> {
        let entries = fs::read_dir(&self.storage_path)
            .map_err(|e| LapStatsError::storage_io("list_sessions", e))?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| LapStatsError::storage_io("list_sessions", e))?;
            let path = entry.path();
            if !path.join(SESSION_FILE).is_file() {
                continue;
            }
            if let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse::<u64>().ok())
            {
                sessions.push(SessionId(id));
            }
        }

        sessions.sort();
        Ok(sessions)
    }

    fn delete_session(&mut self, session_id: SessionId) -> Result<(), LapStatsError> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| LapStatsError::storage_io("delete_session", e))?;
        }
        Ok(())
    }

    fn load_laps(&self, session_id: SessionId) -> Result<Vec<Lap>, LapStatsError> {
        let dir = self.existing_session_dir(session_id)?;
        Self::read_laps(&dir)
    }

    fn insert_laps(&mut self, session_id: SessionId, laps: &[Lap]) -> Result<(), LapStatsError> {
        let dir = self.existing_session_dir(session_id)?;
        let mut all_laps = Self::read_laps(&dir)?;
        check_insert(session_id, &all_laps, laps)?;

        all_laps.extend_from_slice(laps);
        Self::write_laps(&dir, &all_laps)
    }

    fn replace_lap(&mut self, session_id: SessionId, lap: &Lap) -> Result<(), LapStatsError> {
        check_lap(session_id, lap)?;
        let dir = self.existing_session_dir(session_id)?;
        let mut all_laps = Self::read_laps(&dir)?;

        let existing = all_laps
            .iter_mut()
            .find(|l| l.key() == lap.key())
            .ok_or(LapStatsError::LapNotFound {
                session_id,
                lap_number: lap.lap_number,
                car_index: lap.car_index,
            })?;
        *existing = lap.clone();

        Self::write_laps(&dir, &all_laps)
    }

    fn remove_laps(
        &mut self,
        session_id: SessionId,
        predicate: &dyn Fn(&Lap) -> bool,
    ) -> Result<usize, LapStatsError> {
        let dir = self.existing_session_dir(session_id)?;
        let all_laps = Self::read_laps(&dir)?;
        let before = all_laps.len();

        let kept: Vec<Lap> = all_laps.into_iter().filter(|lap| !predicate(lap)).collect();
        let removed = before - kept.len();
        if removed > 0 {
            Self::write_laps(&dir, &kept)?;
        }
        Ok(removed)
    }

    fn load_cache(&self, session_id: SessionId) -> Result<CacheState, LapStatsError> {
        let path = self.existing_session_dir(session_id)?.join(CACHE_FILE);
        if !path.exists() {
            return Ok(CacheState::Absent);
        }

        let content =
            fs::read_to_string(&path).map_err(|e| LapStatsError::storage_io("read_cache", e))?;
        match serde_json::from_str(&content) {
            Ok(state) => Ok(state),
            Err(e) => {
                // derived data, readers fall back to the lap log
                warn!(
                    "Unreadable statistics cache for session {}, treating as absent: {}",
                    session_id, e
                );
                Ok(CacheState::Absent)
            }
        }
    }

    fn store_cache(
        &mut self,
        session_id: SessionId,
        state: &CacheState,
    ) -> Result<(), LapStatsError> {
        let dir = self.existing_session_dir(session_id)?;
        let content =
            serde_json::to_vec_pretty(state).map_err(|e| LapStatsError::CacheWriteFailure {
                session_id,
                reason: format!("Failed to serialize cache: {}", e),
            })?;

        Self::write_json(&dir.join(CACHE_FILE), &content).map_err(|e| {
            LapStatsError::CacheWriteFailure {
                session_id,
                reason: e.to_string(),
            }
        })
    }
}
