//! Service launcher: spawns the backend detached from the supervisor's session.
use chrono::{DateTime, Utc};
use std::{
    fs::{self, File},
    io,
    os::unix::process::{CommandExt, ExitStatusExt},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    constants::{DEFAULT_SHELL, SHELL_COMMAND_FLAG},
    error::SupervisorError,
    pidfile::{PidFile, PidRecord},
};

/// How long to watch for an immediate exec failure after spawning.
const EXEC_SETTLE: Duration = Duration::from_millis(150);

/// Exit codes the shell uses when the command cannot be executed.
const SHELL_NOT_EXECUTABLE: i32 = 126;
const SHELL_NOT_FOUND: i32 = 127;

/// Describes a freshly spawned backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchResult {
    /// PID of the spawned process.
    pub pid: u32,
    /// Log sink receiving stdout and stderr.
    pub log_file: PathBuf,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
}

/// What to launch and where its output goes.
#[derive(Debug, Clone)]
pub struct LaunchSpec<'a> {
    /// Entry point command line, run through the shell.
    pub command: &'a str,
    /// Working directory for the process.
    pub working_dir: &'a Path,
    /// Log sink; truncated on every launch.
    pub log_file: &'a Path,
    /// PID file to record the new PID in.
    pub pid_file: &'a PidFile,
}

/// Spawns the entry point in a new session and returns without waiting for readiness.
///
/// stdout and stderr share the truncated log sink; stdin is `/dev/null`. The
/// child handle is released on return and the process outlives the supervisor.
pub fn launch(spec: &LaunchSpec<'_>) -> Result<LaunchResult, SupervisorError> {
    let launch_error = |source: io::Error| SupervisorError::LaunchFailure {
        command: spec.command.to_string(),
        source,
    };

    if let Some(parent) = spec.log_file.parent() {
        fs::create_dir_all(parent).map_err(launch_error)?;
    }
    let stdout = File::create(spec.log_file).map_err(launch_error)?;
    let stderr = stdout.try_clone().map_err(launch_error)?;

    let mut cmd = Command::new(DEFAULT_SHELL);
    cmd.arg(SHELL_COMMAND_FLAG)
        .arg(format!("exec {}", spec.command))
        .current_dir(spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    debug!("Executing command: {cmd:?}");

    unsafe {
        cmd.pre_exec(|| {
            // New session: no controlling terminal, no signals aimed at our group.
            if libc::setsid() < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(launch_error)?;
    let pid = child.id();
    let started_at = Utc::now();

    thread::sleep(EXEC_SETTLE);
    if let Some(status) = child.try_wait()? {
        match status.code() {
            Some(SHELL_NOT_FOUND) => {
                return Err(launch_error(io::Error::new(
                    io::ErrorKind::NotFound,
                    "entry point not found",
                )));
            }
            Some(SHELL_NOT_EXECUTABLE) => {
                return Err(launch_error(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "entry point is not executable",
                )));
            }
            _ => warn!(
                "Process {pid} exited immediately (code {:?}, signal {:?})",
                status.code(),
                status.signal()
            ),
        }
    }

    spec.pid_file.save(&PidRecord {
        pid,
        started_at,
        command: spec.command.to_string(),
        log_file: spec.log_file.to_path_buf(),
    })?;

    info!(
        "Launched `{}` with PID {pid}, logging to {}",
        spec.command,
        spec.log_file.display()
    );

    Ok(LaunchResult {
        pid,
        log_file: spec.log_file.to_path_buf(),
        started_at,
    })
}
