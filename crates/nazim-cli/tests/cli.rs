//! Integration tests for the nazim CLI.
//!
//! Every test points the config directory at a fresh temporary directory and only exercises
//! paths that fail or finish before the scheduler is contacted, so no system state is touched.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::{tempdir, TempDir};

// Helper to create a command sandboxed in its own config directory
fn nazim() -> (TempDir, Command) {
  let dir = tempdir().unwrap();
  let mut cmd = Command::cargo_bin("nazim").unwrap();
  cmd.env("XDG_CONFIG_HOME", dir.path()).env("HOME", dir.path()).env_remove("RUST_LOG");
  (dir, cmd)
}

#[test]
fn test_help_lists_commands() {
  let (_dir, mut cmd) = nazim();
  cmd.arg("--help").assert().success().stdout(
    predicate::str::contains("add")
      .and(predicate::str::contains("list"))
      .and(predicate::str::contains("status"))
      .and(predicate::str::contains("edit"))
      .and(predicate::str::contains("remove"))
      .and(predicate::str::contains("enable"))
      .and(predicate::str::contains("disable"))
      .and(predicate::str::contains("run")),
  );
}

#[test]
fn test_version() {
  let (_dir, mut cmd) = nazim();
  cmd.arg("--version").assert().success().stdout(predicate::str::contains("nazim"));
}

#[test]
#[serial]
fn test_list_empty() {
  let (_dir, mut cmd) = nazim();
  cmd.arg("list").assert().success().stdout(predicate::str::contains("No services configured"));
}

#[test]
#[serial]
fn test_add_rejects_invalid_name() {
  let (_dir, mut cmd) = nazim();
  cmd
    .args(["add", "-n", "bad/name", "-c", "echo", "-i", "1h"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("invalid service"));
}

#[test]
#[serial]
fn test_add_requires_trigger() {
  let (_dir, mut cmd) = nazim();
  cmd
    .args(["add", "-n", "backup", "-c", "echo"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("one of"));
}

#[test]
#[serial]
fn test_add_rejects_conflicting_triggers() {
  let (_dir, mut cmd) = nazim();
  cmd
    .args(["add", "-n", "backup", "-c", "echo", "--on-startup", "-i", "1h"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
#[serial]
fn test_add_rejects_zero_interval() {
  let (_dir, mut cmd) = nazim();
  cmd
    .args(["add", "-n", "backup", "-c", "echo", "-i", "0m"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("must be positive"));
}

#[test]
#[serial]
fn test_unknown_service() {
  for command in ["status", "remove", "enable", "disable", "run"] {
    let (_dir, mut cmd) = nazim();
    cmd.arg(command).arg("ghost");
    if command == "remove" {
      cmd.arg("--yes");
    }
    cmd.assert().failure().stderr(predicate::str::contains("service ghost does not exist"));
  }
}

#[test]
#[serial]
fn test_status_joins_multi_word_names() {
  let (_dir, mut cmd) = nazim();
  cmd
    .args(["info", "init", "script"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("service init script does not exist"));
}

#[test]
#[serial]
fn test_edit_unknown_service() {
  let (_dir, mut cmd) = nazim();
  cmd
    .args(["edit", "ghost", "-i", "5m"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("does not exist"));
}

#[test]
#[serial]
fn test_remove_accepts_yes_flags() {
  for flag in ["--yes", "-y"] {
    let (_dir, mut cmd) = nazim();
    cmd
      .args(["remove", "ghost", flag])
      .assert()
      .failure()
      .stderr(predicate::str::contains("service ghost does not exist"));
  }
}

#[test]
#[serial]
fn test_add_rejects_name_sharing_native_id() {
  let (dir, mut cmd) = nazim();
  let config = dir.path().join("nazim");
  std::fs::create_dir_all(&config).unwrap();
  std::fs::write(
    config.join("services.yaml"),
    "- name: my svc\n  command: job.sh\n  on_startup: true\n  enabled: true\n  platform: linux\n",
  )
  .unwrap();

  cmd
    .args(["add", "-n", "mysvc", "-c", "other.sh", "--on-startup"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("service my svc already exists"));

  let stored = std::fs::read_to_string(config.join("services.yaml")).unwrap();
  assert!(!stored.contains("other.sh"));
}
