//! Tests for the binary's startup sequence and argument handling.
//!
//! None of these reach the browser: each one stops at configuration loading,
//! argument validation or input validation.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn portal_verifier() -> assert_cmd::Command {
    cargo_bin_cmd!("portal-verifier")
}

/// Copy the shipped config into `tmp` so the binary finds
/// `./config/portal-verifier.toml` relative to its working directory.
fn setup_config_dir(tmp: &TempDir) {
    let src = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
    let dst = tmp.path().join("config");
    fs::create_dir_all(&dst).unwrap();
    fs::copy(src.join("portal-verifier.toml"), dst.join("portal-verifier.toml")).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Missing config
// ─────────────────────────────────────────────────────────────────────────────

/// stdin is piped under assert_cmd, so the create-config prompt is skipped
/// and the binary exits instead of waiting for an answer.
#[test]
fn test_missing_config_exits_with_init_hint() {
    let tmp = TempDir::new().expect("create temp dir");

    portal_verifier()
        .current_dir(tmp.path())
        .args(["verify", "--input", "records.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration file not found"))
        .stderr(predicate::str::contains("--init"));
}

#[test]
fn test_explicit_config_path_is_honoured() {
    let tmp = TempDir::new().expect("create temp dir");

    portal_verifier()
        .current_dir(tmp.path())
        .args(["--config", "elsewhere.toml", "verify", "--input", "records.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("elsewhere.toml"));
}

#[test]
fn test_invalid_config_reports_field() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let path = tmp.path().join("config").join("portal-verifier.toml");
    let content = fs::read_to_string(&path)
        .unwrap()
        .replace("https://portal.example.org", "ftp://portal.example.org");
    fs::write(&path, content).unwrap();

    portal_verifier()
        .current_dir(tmp.path())
        .args(["verify", "--input", "records.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("portal.base_url"));
}

// ─────────────────────────────────────────────────────────────────────────────
// --init
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_init_creates_config_file() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = tmp.path().join("config").join("portal-verifier.toml");

    assert!(!config_path.exists(), "config should not exist yet");

    portal_verifier()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("Created default configuration file"));

    let content = fs::read_to_string(&config_path).expect("config file should have been created");
    assert!(content.contains("[portal]"), "config should have [portal] section");
    assert!(content.contains("[portal.login]"), "config should have [portal.login] section");
    assert!(content.contains("[batch]"), "config should have [batch] section");
}

#[test]
fn test_init_refuses_to_overwrite() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    let config_path = tmp.path().join("config").join("portal-verifier.toml");
    fs::write(&config_path, "# edited\n").unwrap();

    portal_verifier()
        .current_dir(tmp.path())
        .arg("--init")
        .timeout(Duration::from_secs(10))
        .assert()
        .failure();

    assert_eq!(fs::read_to_string(&config_path).unwrap(), "# edited\n");
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and subcommands
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_works_without_config() {
    let tmp = TempDir::new().expect("create temp dir");

    portal_verifier()
        .current_dir(tmp.path())
        .arg("--help")
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("portal-verifier"))
        .stdout(predicate::str::contains("verify"));
}

#[test]
fn test_health_prints_json_report() {
    let tmp = TempDir::new().expect("create temp dir");

    // Exit status depends on whether Chrome is installed on the test host
    let output = portal_verifier()
        .current_dir(tmp.path())
        .arg("health")
        .timeout(Duration::from_secs(30))
        .output()
        .expect("binary should run");

    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("health output should be JSON");
    assert_eq!(report["service"], "portal-verifier");
    assert!(report["browser_available"].is_boolean());
    assert_eq!(
        output.status.success(),
        report["browser_available"].as_bool().unwrap()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation happens before the browser starts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_conflicting_batch_flags_rejected() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    portal_verifier()
        .current_dir(tmp.path())
        .args(["verify", "--input", "records.csv", "--test-variant", "--batch-size", "3"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be combined"));
}

#[test]
fn test_missing_key_column_fails_before_browser() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);
    fs::write(
        tmp.path().join("records.csv"),
        "Identifier,Paciente,Fecha\n1,Ana,01/01/2024\n",
    )
    .unwrap();

    let output = portal_verifier()
        .current_dir(tmp.path())
        .args(["verify", "--input", "records.csv", "--columns", "Paciente,Fecha"])
        .timeout(Duration::from_secs(10))
        .output()
        .expect("binary should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation error"), "got: {}", stderr);
    assert!(stderr.contains("Id"), "got: {}", stderr);

    // No reports are written for a rejected input
    let written: Vec<_> = fs::read_dir(tmp.path())
        .unwrap()
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().starts_with("verif"))
        .collect();
    assert!(written.is_empty());
}

#[test]
fn test_unreadable_input_file_fails() {
    let tmp = TempDir::new().expect("create temp dir");
    setup_config_dir(&tmp);

    portal_verifier()
        .current_dir(tmp.path())
        .args(["verify", "--input", "does-not-exist.csv"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.csv"));
}
