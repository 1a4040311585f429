//! Process termination.
//!
//! Signals are fire-and-forget: delivery is not synchronous with teardown, so
//! survivors are established by re-locating rather than by waiting on PIDs.
use nix::{
    errno::Errno,
    sys::signal::{self, Signal},
    unistd::Pid,
};
use std::{thread, time::Duration};
use tracing::{debug, info, warn};

use crate::locate::{ProcessHandle, ServiceTarget, locate};

/// Outcome of one signalling pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminationReport {
    /// PIDs the kill signal was delivered to.
    pub signalled: Vec<u32>,
    /// PIDs that had already exited before the signal.
    pub already_exited: Vec<u32>,
    /// PIDs the signal could not be delivered to, with the errno.
    pub failed: Vec<(u32, Errno)>,
    /// PIDs that were refused outright (the supervisor itself, init).
    pub skipped: Vec<u32>,
}

/// Sends SIGKILL to every handle.
///
/// A process that exited between locate and terminate counts as a success.
/// Terminating an empty set is a no-op.
pub fn terminate(handles: &[ProcessHandle]) -> TerminationReport {
    terminate_with(handles, Signal::SIGKILL)
}

fn terminate_with(handles: &[ProcessHandle], sig: Signal) -> TerminationReport {
    let mut report = TerminationReport::default();
    let own = std::process::id();

    for handle in handles {
        if handle.pid <= 1 || handle.pid == own {
            warn!("Refusing to signal PID {}", handle.pid);
            report.skipped.push(handle.pid);
            continue;
        }

        let Ok(raw) = i32::try_from(handle.pid) else {
            report.skipped.push(handle.pid);
            continue;
        };

        match signal::kill(Pid::from_raw(raw), Some(sig)) {
            Ok(()) => {
                info!("Sent {sig} to {handle}");
                report.signalled.push(handle.pid);
            }
            Err(Errno::ESRCH) => {
                debug!("PID {} exited before it could be signalled", handle.pid);
                report.already_exited.push(handle.pid);
            }
            Err(err) => {
                warn!("Failed to send {sig} to {handle}: {err}");
                report.failed.push((handle.pid, err));
            }
        }
    }

    report
}

/// Re-locates until nothing belongs to the target or `attempts` passes elapse.
///
/// Returns the handles still present after the last pass.
pub fn survivors(
    target: &ServiceTarget,
    attempts: usize,
    interval: Duration,
) -> Vec<ProcessHandle> {
    let mut remaining = locate(target);
    for _ in 1..attempts.max(1) {
        if remaining.is_empty() {
            break;
        }
        thread::sleep(interval);
        remaining = locate(target);
    }
    remaining
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::Selector;
    use regex::Regex;
    use std::{
        collections::BTreeSet,
        net::TcpListener,
        process::{Command, Stdio},
    };

    fn handle(pid: u32) -> ProcessHandle {
        ProcessHandle {
            pid,
            selectors: BTreeSet::from([Selector::Name]),
        }
    }

    #[test]
    fn empty_set_is_a_noop() {
        assert_eq!(terminate(&[]), TerminationReport::default());
    }

    #[test]
    fn exited_process_counts_as_success() {
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let report = terminate(&[handle(pid)]);
        assert_eq!(report.already_exited, vec![pid]);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn refuses_to_signal_itself_or_init() {
        let report = terminate(&[handle(std::process::id()), handle(1), handle(0)]);
        assert_eq!(report.skipped.len(), 3);
        assert!(report.signalled.is_empty());
    }

    #[test]
    fn kills_running_process() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();

        let report = terminate(&[handle(pid)]);
        assert_eq!(report.signalled, vec![pid]);

        let status = child.wait().unwrap();
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn survivors_is_empty_when_nothing_matches() {
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let target = ServiceTarget {
            pattern: Regex::new("warden-no-such-process-marker-7f3a").unwrap(),
            port,
            pid_file: None,
        };
        assert!(survivors(&target, 3, Duration::from_millis(10)).is_empty());
    }
}
