//! Integration tests for the codeloop CLI.
//!
//! These run the real binary. None of them need Docker or network access:
//! every `solve` case fails during setup, before a model or container is
//! contacted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// -----------------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------------

#[allow(deprecated)]
fn codeloop() -> Command {
    Command::cargo_bin("codeloop").expect("failed to find codeloop binary")
}

fn codeloop_in(dir: &TempDir) -> Command {
    let mut cmd = codeloop();
    cmd.current_dir(dir.path());
    cmd
}

// -----------------------------------------------------------------------------
// Help and version
// -----------------------------------------------------------------------------

#[test]
fn test_help_shows_all_commands() {
    codeloop()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("codeloop"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("solve"))
        .stdout(predicate::str::contains("image"))
        .stdout(predicate::str::contains("clean"));
}

#[test]
fn test_version_shows_version() {
    codeloop()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("codeloop"));
}

#[test]
fn test_solve_help_shows_all_options() {
    codeloop()
        .args(["solve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--request"))
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--max-attempts"));
}

#[test]
fn test_image_help_shows_subcommands() {
    codeloop()
        .args(["image", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pull"))
        .stdout(predicate::str::contains("status"));
}

// -----------------------------------------------------------------------------
// Init
// -----------------------------------------------------------------------------

#[test]
fn test_init_creates_files() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("codeloop initialized"));

    let config = fs::read_to_string(dir.path().join("codeloop.toml")).unwrap();
    assert!(config.contains("[sandbox]"));
    assert!(config.contains("gemini-2.5-flash"));

    let request = fs::read_to_string(dir.path().join("request.json")).unwrap();
    assert!(request.contains("\"task\""));
}

#[test]
fn test_init_skips_existing_without_force() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("codeloop.toml"), "# existing").unwrap();

    codeloop_in(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"))
        .stdout(predicate::str::contains("--force"));

    let content = fs::read_to_string(dir.path().join("codeloop.toml")).unwrap();
    assert_eq!(content, "# existing");
}

#[test]
fn test_init_force_overwrites_existing() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("codeloop.toml"), "# existing").unwrap();

    codeloop_in(&dir)
        .args(["init", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("overwritten"));

    let content = fs::read_to_string(dir.path().join("codeloop.toml")).unwrap();
    assert!(content.contains("[model]"));
}

// -----------------------------------------------------------------------------
// Solve: setup failures
// -----------------------------------------------------------------------------

#[test]
fn test_solve_without_api_key() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .env_remove("GOOGLE_API_KEY")
        .args(["solve", "print hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_API_KEY"));
}

#[test]
fn test_solve_respects_configured_key_variable() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("codeloop.toml"),
        "[model]\napi_key_env = \"CODELOOP_TEST_MISSING_KEY\"\n",
    )
    .unwrap();

    codeloop_in(&dir)
        .env_remove("CODELOOP_TEST_MISSING_KEY")
        .args(["solve", "print hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CODELOOP_TEST_MISSING_KEY"));
}

#[test]
fn test_solve_without_task() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .arg("solve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No task given"));
}

#[test]
fn test_solve_task_and_request_conflict() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .args(["solve", "print hello", "--request", "request.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not both"));
}

#[test]
fn test_solve_missing_request_file() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .args(["solve", "--request", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read request file"));
}

#[test]
fn test_solve_invalid_request_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("request.json"), r#"{"goal": "x"}"#).unwrap();

    codeloop_in(&dir)
        .args(["solve", "--request", "request.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse request file"));
}

#[test]
fn test_solve_request_from_stdin_without_key() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .env_remove("GOOGLE_API_KEY")
        .args(["solve", "--request", "-"])
        .write_stdin(r#"{"task": "print hello"}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("GOOGLE_API_KEY"));
}

#[test]
fn test_solve_invalid_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("codeloop.toml"), "[run\nmax_attempts =").unwrap();

    codeloop_in(&dir)
        .args(["solve", "print hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_solve_rejects_zero_attempts() {
    codeloop()
        .args(["solve", "print hello", "--max-attempts", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max-attempts"));
}

#[test]
fn test_solve_rejects_budget_above_limit() {
    codeloop()
        .args(["solve", "print hello", "--max-attempts", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max-attempts"));
}

// -----------------------------------------------------------------------------
// Errors and global flags
// -----------------------------------------------------------------------------

#[test]
fn test_unknown_command_suggests_help() {
    codeloop()
        .arg("unknown")
        .assert()
        .failure()
        .stderr(predicate::str::contains("help"));
}

#[test]
fn test_verbose_flag_global() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir).args(["-v", "init"]).assert().success();

    assert!(dir.path().join("codeloop.toml").exists());
}

#[test]
fn test_log_file_receives_json_logs() {
    let dir = TempDir::new().unwrap();

    codeloop_in(&dir)
        .args(["--log-file", "logs/codeloop.log", "init"])
        .assert()
        .success();

    let log = fs::read_to_string(dir.path().join("logs/codeloop.log")).unwrap();
    assert!(log.contains("Initializing codeloop"));
    assert!(log.trim_start().starts_with('{'));
}
