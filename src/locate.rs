//! Process discovery: finds every process that belongs to the supervised service.
//!
//! A process belongs to the service when any selector matches it: the PID recorded
//! in the PID file, a command line matching the name pattern, or a listening socket
//! on the service port. Results are never cached; every call reads the OS tables
//! fresh because PIDs are reused.
use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use strum::{AsRefStr, Display};
use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind,
};
use tracing::{debug, warn};

use crate::{
    config::SupervisorConfig,
    constants::PID_START_TOLERANCE,
    error::SupervisorError,
    pidfile::{PidFile, PidRecord},
};

/// How a process was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Selector {
    /// PID recorded by the launcher.
    PidFile,
    /// Command line matched the name pattern.
    Name,
    /// Holds a listening socket on the service port.
    Port,
}

/// Identifies what is being supervised.
#[derive(Debug, Clone)]
pub struct ServiceTarget {
    /// Regex matched against full command lines.
    pub pattern: Regex,
    /// TCP port the service listens on.
    pub port: u16,
    /// PID file written by the launcher, if any.
    pub pid_file: Option<PidFile>,
}

impl ServiceTarget {
    /// Builds the target described by the configuration.
    pub fn from_config(config: &SupervisorConfig) -> Result<Self, SupervisorError> {
        Ok(Self {
            pattern: config.process_regex()?,
            port: config.service.port,
            pid_file: Some(PidFile::new(config.pid_path())),
        })
    }
}

/// A discovered process. Valid for one lifecycle operation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    /// OS process identifier.
    pub pid: u32,
    /// Every selector that matched this PID.
    pub selectors: BTreeSet<Selector>,
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let selectors: Vec<&str> = self.selectors.iter().map(|s| s.as_ref()).collect();
        write!(f, "PID {} (via {})", self.pid, selectors.join(", "))
    }
}

/// Returns the union of all processes matched by any selector, ordered by PID.
///
/// An empty result is the normal state when the service is not running.
pub fn locate(target: &ServiceTarget) -> Vec<ProcessHandle> {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );

    let mut found: BTreeMap<u32, BTreeSet<Selector>> = BTreeMap::new();

    if let Some(pid) = recorded_pid(target, &system) {
        found.entry(pid).or_default().insert(Selector::PidFile);
    }
    for pid in pids_by_pattern(&system, &target.pattern) {
        found.entry(pid).or_default().insert(Selector::Name);
    }
    for pid in pids_by_port(target.port) {
        found.entry(pid).or_default().insert(Selector::Port);
    }

    let handles: Vec<ProcessHandle> = found
        .into_iter()
        .map(|(pid, selectors)| ProcessHandle { pid, selectors })
        .collect();
    debug!("Located {} process(es) for port {}: {:?}", handles.len(), target.port, handles);
    handles
}

/// Returns the PIDs of `handles`.
pub fn pids(handles: &[ProcessHandle]) -> Vec<u32> {
    handles.iter().map(|handle| handle.pid).collect()
}

/// Whether `pid` names a live, non-zombie process.
pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing(),
    );
    process_is_live(&system, target)
}

fn process_is_live(system: &System, pid: Pid) -> bool {
    system.process(pid).is_some_and(|process| {
        !matches!(
            process.status(),
            ProcessStatus::Zombie | ProcessStatus::Dead
        )
    })
}

/// Whether `record` still describes the process the launcher spawned.
///
/// The PID must be alive, have started within [`PID_START_TOLERANCE`] of
/// `record.started_at`, and run a command line matching `pattern` or the
/// recorded command. Anything else is a reused PID.
pub fn record_is_current(record: &PidRecord, pattern: &Regex) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(record.pid);
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    owns_record(&system, record, pattern)
}

fn owns_record(system: &System, record: &PidRecord, pattern: &Regex) -> bool {
    let Some(process) = system.process(Pid::from_u32(record.pid)) else {
        return false;
    };
    if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
        return false;
    }

    let drift = (process.start_time() as i64 - record.started_at.timestamp()).unsigned_abs();
    if drift > PID_START_TOLERANCE.as_secs() {
        debug!(
            "PID {} started {drift}s away from its record; treating as reused",
            record.pid
        );
        return false;
    }

    let cmdline = command_line(process);
    let command = record.command.trim();
    pattern.is_match(&cmdline) || (!command.is_empty() && cmdline.contains(command))
}

fn recorded_pid(target: &ServiceTarget, system: &System) -> Option<u32> {
    let pid_file = target.pid_file.as_ref()?;
    match pid_file.load() {
        Ok(Some(record)) if owns_record(system, &record, &target.pattern) => Some(record.pid),
        Ok(Some(record)) => {
            debug!(
                "PID file {:?} names PID {} which no longer belongs to the service",
                pid_file.path(),
                record.pid
            );
            None
        }
        Ok(None) => None,
        Err(err) => {
            warn!("Ignoring unreadable PID file {:?}: {err}", pid_file.path());
            None
        }
    }
}

fn command_line(process: &Process) -> String {
    process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn pids_by_pattern(system: &System, pattern: &Regex) -> Vec<u32> {
    let own = std::process::id();
    let parent = std::os::unix::process::parent_id();

    system
        .processes()
        .iter()
        .filter(|(pid, process)| {
            let pid = pid.as_u32();
            if pid == own || pid == parent {
                return false;
            }
            if matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead) {
                return false;
            }
            if process.cmd().is_empty() {
                return false;
            }
            pattern.is_match(&command_line(process))
        })
        .map(|(pid, _)| pid.as_u32())
        .collect()
}

/// Finds processes holding a listening TCP socket on `port` via `/proc`.
#[cfg(target_os = "linux")]
fn pids_by_port(port: u16) -> Vec<u32> {
    use std::{collections::HashSet, fs};

    let mut inodes = HashSet::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(content) = fs::read_to_string(table) {
            inodes.extend(listening_inodes(&content, port));
        }
    }
    if inodes.is_empty() {
        return Vec::new();
    }

    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let holds_socket = fds.flatten().any(|fd| {
            fs::read_link(fd.path())
                .ok()
                .and_then(|link| socket_inode(&link.to_string_lossy()))
                .is_some_and(|inode| inodes.contains(&inode))
        });
        if holds_socket {
            pids.push(pid);
        }
    }
    pids
}

/// Falls back to `lsof` where `/proc` socket tables are unavailable.
#[cfg(not(target_os = "linux"))]
fn pids_by_port(port: u16) -> Vec<u32> {
    use std::process::Command;

    let output = match Command::new("lsof")
        .args(["-nP", "-t", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
        .output()
    {
        Ok(output) => output,
        Err(err) => {
            debug!("lsof unavailable for port lookup: {err}");
            return Vec::new();
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Extracts socket inodes in LISTEN state on `port` from a `/proc/net/tcp{,6}` table.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn listening_inodes(content: &str, port: u16) -> Vec<u64> {
    const TCP_LISTEN: &str = "0A";

    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            // sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 10 || parts[3] != TCP_LISTEN {
                return None;
            }
            let (_, port_hex) = parts[1].rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            let inode = parts[9].parse::<u64>().ok()?;
            (local_port == port && inode != 0).then_some(inode)
        })
        .collect()
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}
