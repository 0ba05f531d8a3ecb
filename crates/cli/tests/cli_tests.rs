//! CLI integration tests

use std::process::{Command, Output};

fn vmp(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vmp"))
        .args(args)
        .env_remove("VMP_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = vmp(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("VM placement"), "Should show app description");
    for command in [
        "initialize",
        "results",
        "performance",
        "features",
        "predict",
        "tune",
        "dataset",
        "vms",
        "health",
        "score-hosts",
    ] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = vmp(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("vmp"), "Should show binary name");
}

/// Test predict subcommand help
#[test]
fn test_predict_help() {
    let output = vmp(&["predict", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Predict help should succeed");
    for flag in ["--cpu", "--memory", "--network-io", "--power", "--vm", "--cost-weight"] {
        assert!(stdout.contains(flag), "Should show {} option", flag);
    }
}

/// Test features subcommand help
#[test]
fn test_features_help() {
    let output = vmp(&["features", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Features help should succeed");
    assert!(stdout.contains("--model"), "Should show model option");
}

/// Test that predict requires its resource arguments
#[test]
fn test_predict_requires_arguments() {
    let output = vmp(&["predict", "--cpu", "50"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Missing arguments should fail");
    assert!(stderr.contains("--memory"), "Should name the missing option");
}

/// Test invalid output format
#[test]
fn test_invalid_format() {
    let output = vmp(&["--format", "yaml", "results"]);

    assert!(!output.status.success(), "Invalid format should fail");
}

/// Test unreachable server reports an error
#[test]
fn test_unreachable_server() {
    let output = vmp(&["--api-url", "http://127.0.0.1:9", "results"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Unreachable server should fail");
    assert!(
        stderr.contains("Failed to send request"),
        "Should report the connection failure"
    );
}
