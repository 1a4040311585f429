//! Integration tests for `warden stop`.

#[path = "common/mod.rs"]
mod common;

use std::{
    os::unix::process::ExitStatusExt,
    process::{Command, Stdio},
    thread,
    time::Duration,
};

use common::{Project, python_available, unique_marker};
use predicates::str::contains;

#[test]
fn stop_with_nothing_running_succeeds() {
    let project = Project::new();
    project.configure_sleeper();

    project
        .warden()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn stop_kills_name_matched_process() {
    let project = Project::new();
    project.configure_sleeper();
    let mut existing = project.spawn_marked();
    let pid = existing.id();

    project
        .warden()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains(format!("Killed PID {pid}")));

    let status = existing.wait().unwrap();
    assert_eq!(status.signal(), Some(libc::SIGKILL));
}

#[test]
fn stop_kills_orphan_bound_to_port() {
    if !python_available() {
        eprintln!("Skipping stop_kills_orphan_bound_to_port: python3 not available");
        return;
    }

    let project = Project::new();
    // The name pattern matches nothing; only the port selector can find the orphan.
    project.configure("sleep 60", &unique_marker(), "");

    let mut orphan = Command::new("python3")
        .args(["-m", "http.server", &project.port.to_string(), "--bind", "127.0.0.1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    thread::sleep(Duration::from_millis(1000));

    project
        .warden()
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("via port"));

    assert_eq!(orphan.wait().unwrap().signal(), Some(libc::SIGKILL));
    project
        .warden()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("not running"));
}
