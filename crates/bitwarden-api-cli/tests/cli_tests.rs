//! Integration tests for the `bwapi` binary.
//!
//! The binary runs as a subprocess against an address where nothing listens,
//! so these cover argument handling and error reporting without a vault.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::process::Command;

/// Run bwapi with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_bwapi"))
        .args(args)
        .env("BW_SERVE_URL", "http://127.0.0.1:19999") // Non-existent server
        .env_remove("BW_PASSWORD")
        .env_remove("BWAPI_LOG")
        .output()
        .expect("failed to execute bwapi");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn test_version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("bwapi"), "version output: {stdout}");
}

#[test]
fn test_help_lists_subcommands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0);
    for sub in ["serve", "status", "list", "get", "create", "edit", "delete", "lock"] {
        assert!(stdout.contains(sub), "help should list '{sub}': {stdout}");
    }
    assert!(stdout.contains("BW_PASSWORD"));
}

#[test]
fn test_subcommand_help() {
    let (code, stdout, _) = run(&["create", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("--login-password"));
    assert!(stdout.contains("--uri"));

    let (code, stdout, _) = run(&["serve", "--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("--startup-timeout-secs"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let (code, _, stderr) = run(&["frobnicate"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("frobnicate"));
}

#[test]
fn test_get_requires_id() {
    let (code, _, stderr) = run(&["get"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("<ID>"), "stderr: {stderr}");
}

// ── Error reporting ──────────────────────────────────────────────────

#[test]
fn test_missing_password_is_config_error() {
    let (code, _, stderr) = run(&["list"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("BW_PASSWORD"), "stderr: {stderr}");
}

#[test]
fn test_unreachable_server_fails_to_authenticate() {
    let (code, _, stderr) = run(&["--password", "hunter2", "list"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("127.0.0.1:19999"), "stderr: {stderr}");
    assert!(
        stderr.contains("unable to authenticate"),
        "stderr: {stderr}"
    );
}

#[test]
fn test_edit_without_changes_is_rejected() {
    let (code, _, stderr) = run(&["--password", "hunter2", "edit", "some-id"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("nothing to change"), "stderr: {stderr}");
}

#[test]
fn test_serve_with_missing_program_fails() {
    let (code, _, stderr) = run(&[
        "serve",
        "--program",
        "/nonexistent/bitwarden-cli-for-tests",
        "--startup-timeout-secs",
        "1",
    ]);
    assert_eq!(code, 1);
    assert!(
        stderr.contains("/nonexistent/bitwarden-cli-for-tests"),
        "stderr: {stderr}"
    );
}
