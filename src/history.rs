//! Local record of past results, kept as a JSON array on disk.

use crate::errors::{ErrorKind, SpeedTestError};
use crate::results::SpeedTestResult;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "speed-pulse";
const HISTORY_FILE: &str = "history.json";

/// A stored result and its generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(flatten)]
    pub result: SpeedTestResult,
}

/// JSON file holding every saved result, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/speed-pulse/history.json`, if the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(APP_DIR).join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All saved entries.
    ///
    /// A missing file is an empty history. A file that cannot be parsed is
    /// logged and also treated as empty.
    pub fn load(&self) -> Result<Vec<HistoryEntry>, SpeedTestError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error("read", e)),
        };

        match serde_json::from_str(&text) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                warn!(
                    "Failed to parse history at {}, ignoring it: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Save `result` under a fresh id and return the stored entry.
    pub fn append(
        &self,
        result: SpeedTestResult,
    ) -> Result<HistoryEntry, SpeedTestError> {
        let mut entries = self.load()?;
        let entry = HistoryEntry { id: uuid::Uuid::new_v4().to_string(), result };
        entries.push(entry.clone());
        self.write(&entries)?;

        debug!("Saved result {} to {}", entry.id, self.path.display());
        Ok(entry)
    }

    /// Remove every saved entry.
    pub fn clear(&self) -> Result<(), SpeedTestError> {
        self.write(&[])
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<(), SpeedTestError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error("create", e))?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, json).map_err(|e| self.io_error("write", e))
    }

    fn io_error(&self, action: &str, error: io::Error) -> SpeedTestError {
        SpeedTestError::new(
            ErrorKind::Config,
            format!("failed to {} history file {}", action, self.path.display()),
        )
        .with_suggestion("Check the permissions of the history location or pass --history-file.")
        .with_source(error)
    }
}
