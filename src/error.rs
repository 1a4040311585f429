//! Error handling for warden.
use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Defines every failure a lifecycle operation can report.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Error reading the supervisor configuration file.
    #[error("Failed to read config file: {0}")]
    ConfigRead(#[source] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("Invalid YAML format: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// A configuration value was present but unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A runtime, configuration or source artifact required for start is absent.
    #[error("Environment incomplete, missing: {}", display_paths(.missing))]
    EnvironmentMissing {
        /// Every artifact found missing, in check order.
        missing: Vec<PathBuf>,
    },

    /// Another instance (or some other port occupant) is present and the
    /// operator did not confirm starting alongside it.
    #[error(
        "Service already appears to be running (PIDs: {pids:?}); start not confirmed, run `stop` first"
    )]
    ConflictDetected {
        /// PIDs found by the locator.
        pids: Vec<u32>,
    },

    /// The entry point could not be spawned at all.
    #[error("Failed to launch `{command}`: {source}")]
    LaunchFailure {
        /// Command line that failed to spawn.
        command: String,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The process was spawned but never answered the health endpoint.
    #[error(
        "Health check against {url} failed after {waited:?}; PID {pid} left running for inspection"
    )]
    HealthCheckFailure {
        /// Endpoint that was probed.
        url: String,
        /// PID of the spawned process (not terminated).
        pid: u32,
        /// Total time spent waiting.
        waited: Duration,
        /// Last lines of the log sink.
        log_tail: Vec<String>,
    },

    /// The spawned process died while something else answered the health endpoint.
    #[error("PID {pid} exited during startup; {url} was answered by another process")]
    ExitedDuringStartup {
        /// PID of the spawned process.
        pid: u32,
        /// Endpoint that answered.
        url: String,
        /// Last lines of the log sink.
        log_tail: Vec<String>,
    },

    /// One or more processes survived the kill signal.
    #[error("Processes still present after termination: {survivors:?}; manual intervention required")]
    TerminationIncomplete {
        /// PIDs that were still found on re-locate.
        survivors: Vec<u32>,
    },

    /// Error delivering a signal.
    #[error("Failed to signal PID {pid}: {source}")]
    Signal {
        /// Target PID.
        pid: u32,
        /// The errno returned by `kill(2)`.
        #[source]
        source: nix::errno::Errno,
    },

    /// Error for PID file.
    #[error("PID file error: {0}")]
    PidFile(#[from] PidFileError),

    /// Generic I/O failure (log sink, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error type for PID file operations.
#[derive(Debug, Error)]
pub enum PidFileError {
    /// Error reading or writing the PID file.
    #[error("Failed to access PID file: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing the PID file contents.
    #[error("Failed to parse PID file: {0}")]
    Parse(#[from] serde_json::Error),
}
