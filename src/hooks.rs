//! Lifecycle hooks run through the shell.
use std::{
    path::Path,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};
use strum::{AsRefStr, Display};
use tracing::{debug, error, warn};

use crate::constants::{DEFAULT_SHELL, SHELL_COMMAND_FLAG};

/// Upper bound on how long a hook may run before it is killed.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle points that can carry a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum HookStage {
    /// After a restart brought the service up healthy.
    PostRestart,
}

/// How a hook run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Exited zero.
    Success,
    /// Exited non-zero or was killed by a signal.
    Failed(Option<i32>),
    /// Exceeded the timeout and was killed.
    TimedOut,
    /// Could not be spawned.
    SpawnFailed,
}

/// Runs `command` with `sh -c` in `working_dir`. Failures are logged, never propagated.
pub fn run_hook(stage: HookStage, command: &str, working_dir: &Path, timeout: Duration) -> HookOutcome {
    debug!("Running {stage} hook: `{command}`");

    let mut cmd = Command::new(DEFAULT_SHELL);
    cmd.arg(SHELL_COMMAND_FLAG)
        .arg(command)
        .current_dir(working_dir)
        .stdin(Stdio::null());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!("Failed to run {stage} hook: {err}");
            return HookOutcome::SpawnFailed;
        }
    };

    match wait_with_timeout(&mut child, timeout) {
        Ok(Some(status)) if status.success() => {
            debug!("{stage} hook completed successfully.");
            HookOutcome::Success
        }
        Ok(Some(status)) => {
            warn!("{stage} hook exited with status: {status:?}");
            HookOutcome::Failed(status.code())
        }
        Ok(None) => {
            warn!("{stage} hook timed out after {timeout:?}. Terminating hook process.");
            if let Err(err) = child.kill() {
                error!("Failed to terminate timed-out {stage} hook: {err}");
            }
            let _ = child.wait();
            HookOutcome::TimedOut
        }
        Err(err) => {
            error!("Failed while waiting for {stage} hook: {err}");
            HookOutcome::Failed(None)
        }
    }
}

/// Wait for a child process with a timeout, returning `Ok(None)` on timeout.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None => {
                if Instant::now() >= deadline {
                    return Ok(None);
                }
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
}
