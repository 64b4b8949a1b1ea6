//! CLI integration tests

use std::process::{Command, Output};

fn vexctl(args: &[&str]) -> Output {
    let home = tempfile::tempdir().expect("Failed to create temp dir");
    Command::new(env!("CARGO_BIN_EXE_vexctl"))
        .args(args)
        .env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("TOKEN")
        .env_remove("EXPANDER_DEFAULT_POLLING_INTERVAL")
        .env_remove("EXPANDER_DEFAULT_EXPAND_BY_PERCENT")
        .env_remove("EXPANDER_DEFAULT_EXPAND_THRESHOLD_PERCENT")
        .env_remove("EXPANDER_DEFAULT_EXPAND_UP_TO")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = vexctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Volume Expander"), "Should show app name");
    assert!(stdout.contains("claims"), "Should show claims command");
    assert!(stdout.contains("plan"), "Should show plan command");
    assert!(stdout.contains("policy"), "Should show policy command");
    assert!(stdout.contains("--prometheus-url"));
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = vexctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("vexctl"), "Should show binary name");
}

#[test]
fn test_claims_help() {
    let output = vexctl(&["claims", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--namespace"));
    assert!(stdout.contains("--all-namespaces"));
    assert!(stdout.contains("--all"));
}

#[test]
fn test_plan_requires_claim_name() {
    let output = vexctl(&["plan"]);

    assert!(!output.status.success(), "Plan without a name should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("<NAME>"));
}

#[test]
fn test_policy_json_output() {
    let output = vexctl(&[
        "policy",
        "-a",
        "autoexpand=true",
        "-a",
        "expand-by-percent=40",
        "-a",
        "expand-up-to=50Gi",
        "-o",
        "json",
    ]);

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output should be JSON");
    assert_eq!(report["opted_in"], true);
    assert_eq!(report["policy"]["growth_percent"], 40);
    assert_eq!(report["policy"]["threshold_percent"], 80);
    assert_eq!(report["policy"]["ceiling"], "50Gi");
    assert_eq!(report["issues"].as_array().map(Vec::len), Some(0));
}

#[test]
fn test_policy_reports_invalid_values() {
    let output = vexctl(&["policy", "-a", "polling-frequency=sometimes"]);

    assert!(output.status.success(), "Invalid values fall back to defaults");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("30s"));
    assert!(stdout.contains("polling-frequency"));
    assert!(stdout.contains("default used"));
}

#[test]
fn test_policy_uses_operator_defaults() {
    let home = tempfile::tempdir().expect("Failed to create temp dir");
    let output = Command::new(env!("CARGO_BIN_EXE_vexctl"))
        .args(["policy", "-a", "autoexpand=true", "-o", "json"])
        .env("HOME", home.path())
        .env("EXPANDER_DEFAULT_EXPAND_THRESHOLD_PERCENT", "90")
        .env("EXPANDER_DEFAULT_EXPAND_UP_TO", "1Ti")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output should be JSON");
    assert_eq!(report["policy"]["threshold_percent"], 90);
    assert_eq!(report["policy"]["ceiling"], "1Ti");
}

#[test]
fn test_policy_rejects_malformed_pair() {
    let output = vexctl(&["policy", "-a", "autoexpand"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("KEY=VALUE"));
}
