use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::LapStatsError;
use crate::storage::FileBasedStore;

const CONFIG_DIR_NAME: &str = "lapstats";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Where session directories live, the platform data dir when unset
    pub storage_path: Option<PathBuf>,
    /// Precompute statistics at the end of every ingestion
    pub recompute_after_ingest: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            recompute_after_ingest: true,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf, LapStatsError> {
        Ok(dirs::config_dir()
            .ok_or(LapStatsError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Load the config from the user's config directory, `None` if there is none
    pub fn from_local_file() -> Result<Option<Self>, LapStatsError> {
        match dirs::config_dir() {
            Some(dir) => Self::from_file(&dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)),
            None => Ok(None),
        }
    }

    pub fn from_file(config_path: &Path) -> Result<Option<Self>, LapStatsError> {
        if !config_path.exists() {
            return Ok(None);
        }

        let file = std::fs::File::open(config_path)
            .map_err(|e| LapStatsError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| LapStatsError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), LapStatsError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), LapStatsError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LapStatsError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| LapStatsError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| LapStatsError::ConfigSerializeError { source: e })
    }

    /// Storage directory to use: the explicit override first, then the
    /// configured path, then the platform default
    pub fn resolve_storage_path(&self, cli_override: Option<&Path>) -> Result<PathBuf, LapStatsError> {
        if let Some(path) = cli_override {
            return Ok(path.to_path_buf());
        }
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => FileBasedStore::default_storage_path(),
        }
    }
}
