#![allow(dead_code)]

use std::{
    fs,
    net::TcpListener,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use assert_cmd::cargo::cargo_bin_cmd;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tempfile::TempDir;
use warden::pidfile::{PidFile, PidRecord};

/// A temporary project directory provisioned with every preflight artifact.
///
/// Dropping it runs `warden stop` so a failed assertion does not leak backends.
pub struct Project {
    dir: TempDir,
    pub marker: String,
    pub port: u16,
    pub health_timeout: &'static str,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let root = dir.path();

        fs::create_dir_all(root.join("venv/bin")).unwrap();
        fs::write(root.join("venv/bin/python"), "").unwrap();
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/config.yaml"), "llm: {}\n").unwrap();
        fs::write(root.join("app.py"), "").unwrap();

        Self {
            dir,
            marker: unique_marker(),
            port: free_port(),
            health_timeout: "5s",
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `warden.yaml` for a backend launched with `command`.
    pub fn configure(&self, command: &str, pattern: &str, extra: &str) {
        fs::write(
            self.path().join("warden.yaml"),
            format!(
                r#"service:
  port: {port}
  command: "{command}"
  process_pattern: '{pattern}'
health:
  initial_delay: "0s"
  timeout: "{timeout}"
  interval: "100ms"
preflight:
  sources: ["app.py"]
restart:
  pause: "0s"
{extra}"#,
                port = self.port,
                timeout = self.health_timeout,
            ),
        )
        .expect("failed to write warden.yaml");
    }

    /// Configures a `sleep` backend that never listens; only the name selector finds it.
    pub fn configure_sleeper(&self) {
        let command = format!("sh -c 'sleep 60; echo {}'", self.marker);
        self.configure(&command, &self.marker, "");
    }

    /// Configures a Python HTTP server backend on the project port.
    pub fn configure_http(&self, extra: &str) {
        let command = format!("python3 -m http.server {} --bind 127.0.0.1", self.port);
        let pattern = format!(r"http\.server {}", self.port);
        self.configure(&command, &pattern, extra);
    }

    pub fn warden(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("warden");
        cmd.current_dir(self.path()).env_remove("RUST_LOG");
        cmd
    }

    pub fn pid_record(&self) -> Option<PidRecord> {
        PidFile::new(self.path().join(".warden/backend.pid"))
            .load()
            .expect("readable pid file")
    }

    /// Spawns a process whose command line carries the project marker.
    pub fn spawn_marked(&self) -> Child {
        let child = Command::new("sh")
            .arg("-c")
            .arg(format!("sleep 60; echo {}", self.marker))
            .stdout(Stdio::null())
            .spawn()
            .expect("failed to spawn marked process");
        thread::sleep(Duration::from_millis(200));
        child
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        if self.path().join("warden.yaml").exists() {
            let _ = self.warden().arg("stop").output();
        }
    }
}

pub fn unique_marker() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("warden-it-{}-{nanos}", std::process::id())
}

pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Zombies count as exited: they hold no sockets and will never run again.
pub fn is_process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
}

pub fn wait_for_process_exit(pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !is_process_alive(pid) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Timed out waiting for PID {} to exit", pid);
}

pub fn write_lines(path: &PathBuf, count: usize) {
    let content: String = (1..=count).map(|n| format!("log line {n}\n")).collect();
    fs::write(path, content).unwrap();
}
