//! Integration tests for `warden start`.

#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{Project, python_available};
use predicates::prelude::*;
use predicates::str::contains;

#[test]
fn missing_config_fails_without_spawning() {
    let project = Project::new();
    project.configure_sleeper();
    fs::remove_file(project.path().join("config/config.yaml")).unwrap();

    project
        .warden()
        .args(["start", "--yes"])
        .assert()
        .failure()
        .stderr(contains("config/config.yaml"));

    assert!(project.pid_record().is_none());
    assert!(!project.path().join("app.log").exists());
}

#[test]
fn missing_runtime_is_reported_first() {
    let project = Project::new();
    project.configure_sleeper();
    fs::remove_dir_all(project.path().join("venv")).unwrap();

    project
        .warden()
        .args(["start", "--yes"])
        .assert()
        .failure()
        .stderr(contains("venv").and(contains("Environment incomplete")));
}

#[test]
fn declined_confirmation_keeps_existing_instance() {
    let project = Project::new();
    project.configure_sleeper();
    let mut existing = project.spawn_marked();

    project
        .warden()
        .arg("start")
        .write_stdin("n\n")
        .assert()
        .failure()
        .stderr(contains("already appears to be running"));

    assert!(existing.try_wait().unwrap().is_none(), "existing instance was touched");
    assert!(project.pid_record().is_none());

    existing.kill().unwrap();
    existing.wait().unwrap();
}

#[test]
fn closed_stdin_counts_as_decline() {
    let project = Project::new();
    project.configure_sleeper();
    let mut existing = project.spawn_marked();

    project
        .warden()
        .arg("start")
        .write_stdin("")
        .assert()
        .failure();

    assert!(existing.try_wait().unwrap().is_none());
    existing.kill().unwrap();
    existing.wait().unwrap();
}

#[test]
fn unhealthy_start_reports_log_tail_and_leaves_process() {
    let mut project = Project::new();
    project.health_timeout = "500ms";
    let command = format!("sh -c 'echo booting {}; sleep 60'", project.marker);
    project.configure(&command, &project.marker, "");

    project
        .warden()
        .args(["start", "--yes"])
        .assert()
        .failure()
        .stderr(contains("left running").and(contains("booting")));

    let record = project.pid_record().expect("pid file written at launch");
    assert!(common::is_process_alive(record.pid));

    project.warden().arg("stop").assert().success();
    common::wait_for_process_exit(record.pid);
}

#[test]
fn start_launches_healthy_backend() {
    if !python_available() {
        eprintln!("Skipping start_launches_healthy_backend: python3 not available");
        return;
    }

    let project = Project::new();
    project.configure_http("");

    project
        .warden()
        .arg("start")
        .assert()
        .success()
        .stdout(contains("started with PID"));

    let record = project.pid_record().expect("pid file written");
    assert!(common::is_process_alive(record.pid));

    project
        .warden()
        .arg("status")
        .assert()
        .success()
        .stdout(contains(format!("PID {}", record.pid)).and(contains("answered HTTP")));

    project.warden().arg("stop").assert().success();
    common::wait_for_process_exit(record.pid);
    project
        .warden()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("not running"));
}
