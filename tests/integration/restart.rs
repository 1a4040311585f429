//! Integration tests for `warden restart`.

#[path = "common/mod.rs"]
mod common;

use common::{Project, is_process_alive, python_available, wait_for_process_exit};
use predicates::str::contains;

#[test]
fn restart_from_nothing_still_starts() {
    if !python_available() {
        eprintln!("Skipping restart_from_nothing_still_starts: python3 not available");
        return;
    }

    let project = Project::new();
    project.configure_http("");

    project
        .warden()
        .arg("restart")
        .assert()
        .success()
        .stdout(contains("restarted with PID"));

    let record = project.pid_record().expect("pid file written");
    assert!(is_process_alive(record.pid));
}

#[test]
fn restart_replaces_running_instance() {
    if !python_available() {
        eprintln!("Skipping restart_replaces_running_instance: python3 not available");
        return;
    }

    let project = Project::new();
    project.configure_http("hooks:\n  post_restart: \"touch reopened\"\n");

    project.warden().args(["start", "--yes"]).assert().success();
    let first = project.pid_record().expect("pid after start").pid;

    // An existing instance must not trigger the confirmation prompt.
    project
        .warden()
        .arg("restart")
        .write_stdin("")
        .assert()
        .success()
        .stdout(contains(format!("Killed PID {first}")));

    let second = project.pid_record().expect("pid after restart").pid;
    assert_ne!(first, second);
    wait_for_process_exit(first);
    assert!(is_process_alive(second));
    assert!(project.path().join("reopened").exists());
}
