//! Integration tests for configuration handling and auxiliary commands.

#[path = "common/mod.rs"]
mod common;

use std::fs;

use common::{Project, write_lines};
use predicates::prelude::*;
use predicates::str::contains;

#[test]
fn logs_prints_the_tail() {
    let project = Project::new();
    project.configure_sleeper();
    write_lines(&project.path().join("app.log"), 10);

    project
        .warden()
        .args(["logs", "-n", "2"])
        .assert()
        .success()
        .stdout(contains("log line 9").and(contains("log line 10")).and(contains("log line 8").not()));
}

#[test]
fn status_reports_not_running() {
    let project = Project::new();
    project.configure_sleeper();

    project
        .warden()
        .arg("status")
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn invalid_config_is_rejected() {
    let project = Project::new();
    fs::write(project.path().join("warden.yaml"), "service:\n  port: \"not a port\"\n").unwrap();

    project
        .warden()
        .arg("stop")
        .assert()
        .failure()
        .stderr(contains("Invalid YAML"));
    fs::remove_file(project.path().join("warden.yaml")).unwrap();
}

#[test]
fn explicit_config_path_sets_project_dir() {
    let mut project = Project::new();
    project.health_timeout = "300ms";
    project.configure_sleeper();
    let elsewhere = tempfile::tempdir().unwrap();

    let mut cmd = project.warden();
    cmd.current_dir(elsewhere.path())
        .args(["--config", project.path().join("warden.yaml").to_str().unwrap(), "start", "--yes"]);
    cmd.assert().failure().stderr(contains("Health check"));

    let record = project.pid_record().expect("pid file under the config's directory");
    project.warden().arg("stop").assert().success();
    common::wait_for_process_exit(record.pid);
}
