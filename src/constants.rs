//! Constants and deployment defaults for warden.
//!
//! This module centralizes the fixed values of the supervised deployment so the
//! configuration layer and the components agree on them.

use std::time::Duration;

// ============================================================================
// File System Constants
// ============================================================================

/// Supervisor configuration file looked up in the project directory.
pub const DEFAULT_CONFIG_FILE: &str = "warden.yaml";

/// PID file written by the launcher, relative to the project directory.
pub const DEFAULT_PID_FILE: &str = ".warden/backend.pid";

/// Allowed drift between a process start time and the `started_at` in its PID record.
pub const PID_START_TOLERANCE: Duration = Duration::from_secs(2);

/// Lock file suffix guarding concurrent lifecycle operations.
pub const PID_LOCK_SUFFIX: &str = ".lock";

/// Log sink receiving the backend's stdout and stderr.
pub const DEFAULT_LOG_FILE: &str = "app.log";

// ============================================================================
// Service Target
// ============================================================================

/// Human-readable service name used in reports.
pub const DEFAULT_SERVICE_NAME: &str = "backend";

/// Port the backend listens on.
pub const DEFAULT_PORT: u16 = 5001;

/// Regex matched against full command lines to find the backend.
pub const DEFAULT_PROCESS_PATTERN: &str = r"app\.py";

/// Entry point, run through the shell from the project directory.
pub const DEFAULT_COMMAND: &str = "venv/bin/python app.py";

// ============================================================================
// Preflight
// ============================================================================

/// Isolated environment directory holding the runtime.
pub const DEFAULT_RUNTIME_DIR: &str = "venv";

/// Interpreter expected inside the runtime directory.
pub const DEFAULT_RUNTIME: &str = "venv/bin/python";

/// Backend configuration file that must exist before start.
pub const DEFAULT_APP_CONFIG: &str = "config/config.yaml";

/// Source files that must exist before start.
pub const DEFAULT_SOURCES: &[&str] = &[
    "app.py",
    "proof_assistant/__init__.py",
    "proof_assistant/llm_client.py",
    "proof_assistant/lean_executor.py",
    "proof_assistant/proof_processor.py",
];

// ============================================================================
// Timing
// ============================================================================

/// Liveness endpoint path.
pub const DEFAULT_HEALTH_PATH: &str = "/health";

/// Bootstrap allowance before the first health request.
pub const HEALTH_INITIAL_DELAY: Duration = Duration::from_secs(5);

/// Total window for health polling after the initial delay.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between health requests.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pause between stop and start during restart.
pub const RESTART_PAUSE: Duration = Duration::from_secs(2);

/// Number of re-locate passes after signalling before reporting survivors.
pub const STOP_VERIFY_ATTEMPTS: usize = 10;

/// Delay between re-locate passes.
pub const STOP_VERIFY_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// Logging and Output Constants
// ============================================================================

/// Lines of the log sink attached to a failed health report.
pub const MAX_LOG_TAIL_LINES: usize = 20;

/// Default line count for the `logs` command.
pub const DEFAULT_LOG_LINES: usize = 50;

/// Default shell used for the entry point and hooks.
pub const DEFAULT_SHELL: &str = "sh";

/// Shell argument flag for executing command strings.
pub const SHELL_COMMAND_FLAG: &str = "-c";
