//! Integration tests for the `run` command.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_run_command() {
    Command::cargo_bin("quark_cli")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_run_demo_round_trip() {
    Command::cargo_bin("quark_cli")
        .unwrap()
        .args(["run", "--workers", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 workers echoed"));
}

#[test]
fn test_run_with_deadline_override() {
    Command::cargo_bin("quark_cli")
        .unwrap()
        .args(["run", "--workers", "2", "--deadline-ms", "5000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 workers echoed"));
}

#[test]
fn test_run_with_config_file() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(
        file.path(),
        r#"{"shutdown_timeout_secs": 5, "kernel": {"max_message_bytes": 4096}}"#,
    )
    .unwrap();

    Command::cargo_bin("quark_cli")
        .unwrap()
        .args(["run", "--workers", "1"])
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 workers echoed"));
}

#[test]
fn test_run_rejects_invalid_config() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), r#"{"shutdown_timeout_secs": 0}"#).unwrap();

    Command::cargo_bin("quark_cli")
        .unwrap()
        .arg("run")
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("shutdown timeout"));
}
