//! Command-line interface for Warden.
use std::{path::PathBuf, str::FromStr};

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use crate::constants::DEFAULT_LOG_LINES;

/// `--log-level` value: a level name (`warn`, `debug`, ...) or a 0-5 shorthand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevelArg(LevelFilter);

impl LogLevelArg {
    /// Directive for `EnvFilter`.
    pub fn directive(&self) -> String {
        self.0.to_string().to_ascii_lowercase()
    }
}

impl FromStr for LogLevelArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let requested = value.trim();
        if requested.is_empty() {
            return Err("log level cannot be empty".into());
        }

        // `LevelFilter` already accepts 0-5 and the canonical names.
        let canonical = match requested.to_ascii_lowercase().as_str() {
            "err" => "error",
            "warning" => "warn",
            _ => requested,
        };
        canonical.parse::<LevelFilter>().map(LogLevelArg).map_err(|_| {
            format!(
                "invalid log level '{requested}' (expected off, error, warn, info, debug, trace or 0-5)"
            )
        })
    }
}

/// Command-line interface for Warden.
#[derive(Parser)]
#[command(name = "warden", version, author)]
#[command(about = "Start, stop and restart a single local backend service", long_about = None)]
pub struct Cli {
    /// Override the logging verbosity for this invocation only.
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Path to the supervisor configuration (defaults to `warden.yaml` if present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for warden.
#[derive(Subcommand)]
pub enum Commands {
    /// Start the service unless an instance is already running.
    Start {
        /// Continue without prompting when an existing instance is found.
        #[arg(short, long)]
        yes: bool,
    },

    /// Stop every process belonging to the service.
    Stop,

    /// Stop unconditionally, then start again.
    Restart,

    /// Show the processes belonging to the service and whether it answers.
    Status,

    /// Show the tail of the service log.
    Logs {
        /// Number of lines to show.
        #[arg(short = 'n', long, default_value_t = DEFAULT_LOG_LINES)]
        lines: usize,
    },
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
