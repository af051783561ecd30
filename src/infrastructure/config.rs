//! User settings read from a TOML file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::errors::StorageResult;
use super::persistence::DEFAULT_KEY_PREFIX;
use crate::domain::{StoreConfig, MAX_COLUMNS};

const APP_DIR: &str = "gridcalc";
const CONFIG_FILE: &str = "config.toml";

/// Startup settings. Every field is optional in the file.
///
/// ```toml
/// rows = 40
/// columns = 12
/// storage_dir = "/home/me/sheets"
/// undo_limit = 200
/// detect_indirect_cycles = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rows: usize,
    pub columns: usize,
    pub storage_dir: Option<PathBuf>,
    pub key_prefix: String,
    pub undo_limit: usize,
    pub detect_indirect_cycles: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rows: 20,
            columns: 8,
            storage_dir: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            undo_limit: 100,
            detect_indirect_cycles: true,
        }
    }
}

impl Settings {
    /// `<config dir>/gridcalc/config.toml`, when the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Parses a settings file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> StorageResult<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err.into()),
        };
        let settings: Settings = toml::from_str(&text)?;
        info!(path = %path.display(), "loaded settings");
        Ok(settings.normalized())
    }

    /// Loads from `path` or the default location, falling back to defaults
    /// when the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "ignoring unreadable settings");
            Self::default()
        })
    }

    /// Where saved spreadsheets live.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            detect_indirect_cycles: self.detect_indirect_cycles,
        }
    }

    fn normalized(mut self) -> Self {
        self.rows = self.rows.max(1);
        self.columns = self.columns.clamp(1, MAX_COLUMNS);
        self
    }
}
