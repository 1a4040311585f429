//! PID file written at launch and consulted by the locator.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::PidFileError;

/// Represents the PID file structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidRecord {
    /// PID of the launched backend.
    pub pid: u32,
    /// When the launcher spawned it.
    pub started_at: DateTime<Utc>,
    /// Command line that was executed.
    pub command: String,
    /// Log sink receiving its output.
    pub log_file: PathBuf,
}

/// Handle on the PID file location.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates a handle for the PID file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the PID file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the record, or `None` when no PID file exists.
    pub fn load(&self) -> Result<Option<PidRecord>, PidFileError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let record = serde_json::from_str::<PidRecord>(&contents)?;
        Ok(Some(record))
    }

    /// Saves the record, creating parent directories as needed.
    pub fn save(&self, record: &PidRecord) -> Result<(), PidFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }

    /// Removes the PID file. A missing file is not an error.
    pub fn remove(&self) -> Result<(), PidFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
