//! Integration tests for the `walker-harness` CLI

use assert_cmd::cargo;
use predicates::prelude::*;
use std::fs;
use std::net::TcpListener;
use tempfile::TempDir;
use walker_harness_core::{HarnessConfig, ServerFixture};

const STUB: &str = env!("CARGO_BIN_EXE_stub-walker-server");

/// Working directory that stops config discovery and holds a walker entrypoint.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("main.jac"), "walker Supervisor {}\n").unwrap();
    dir
}

fn harness(dir: &TempDir) -> assert_cmd::Command {
    let mut cmd = cargo::cargo_bin_cmd!("walker-harness");
    cmd.current_dir(dir.path())
        .env_remove("WALKER_HARNESS_FIXTURE_DIR")
        .env_remove("WALKER_HARNESS_PROGRAM")
        .env_remove("WALKER_HARNESS_CREDENTIAL_ENV")
        .env("WALKER_HARNESS_LOG", "warn");
    cmd
}

#[test]
fn test_free_port_prints_bindable_port() {
    let dir = workspace();
    let output = harness(&dir).arg("free-port").output().unwrap();
    assert!(output.status.success());

    let port: u16 = String::from_utf8(output.stdout).unwrap().trim().parse().unwrap();
    assert!(port > 0);
}

#[test]
fn test_wait_port_succeeds_on_listening_port() {
    let dir = workspace();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    harness(&dir)
        .args(["wait-port", "--port", &port.to_string(), "--timeout", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ready after"));
}

#[test]
fn test_wait_port_times_out_on_closed_port() {
    let dir = workspace();
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    harness(&dir)
        .args(["wait-port", "--port", &port.to_string(), "--timeout", "1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Timed out"));
}

#[test]
fn test_run_without_credential_skips_everything() {
    let dir = workspace();
    harness(&dir)
        .args([
            "run",
            "--program",
            "/nonexistent/jac",
            "--credential-env",
            "WALKER_HARNESS_TEST_UNSET_CREDENTIAL",
        ])
        .env_remove("WALKER_HARNESS_TEST_UNSET_CREDENTIAL")
        .assert()
        .success()
        .stdout(predicate::str::contains("SKIP"))
        .stdout(predicate::str::contains("0 passed, 0 failed, 4 skipped"));
}

#[test]
fn test_run_against_stub_server_passes() {
    let dir = workspace();
    harness(&dir)
        .args(["run", "--no-gate", "--quiet-server", "--program", STUB])
        .args(["--fixture-dir", "."])
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS  math_agent"))
        .stdout(predicate::str::contains("4 passed, 0 failed, 0 skipped"));
}

#[test]
fn test_run_json_reports_failures_and_exits_nonzero() {
    let dir = workspace();
    let output = harness(&dir)
        .args(["run", "--no-gate", "--quiet-server", "--json", "--program", STUB])
        .args(["--fixture-dir", "."])
        .env("STUB_MODE", "misroute")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error: 2 of 4 scenarios failed"), "{stderr}");

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let scenarios = report["scenarios"].as_array().unwrap();
    assert_eq!(scenarios.len(), 4);
    assert_eq!(scenarios[0]["name"], "server_starts");
    assert_eq!(scenarios[2]["name"], "math_agent");
    assert_eq!(scenarios[2]["status"], "failed");
    assert_eq!(scenarios[2]["kind"], "validation_failure");
    assert_eq!(report["teardown"]["result"], "graceful");
}

/// Server wrapper that prints a startup banner on stdout before serving.
#[cfg(unix)]
fn noisy_server(dir: &TempDir) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.path().join("noisy-server.sh");
    fs::write(
        &script,
        format!("#!/bin/sh\necho \"INFO: Jac server listening\"\nexec \"{STUB}\" \"$@\"\n"),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
#[test]
fn test_run_json_stdout_stays_parseable_with_chatty_server() {
    let dir = workspace();
    let script = noisy_server(&dir);

    let output = harness(&dir)
        .args(["run", "--no-gate", "--json", "--fixture-dir", "."])
        .arg("--program")
        .arg(&script)
        .output()
        .unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["scenarios"].as_array().unwrap().len(), 4);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("INFO: Jac server listening"), "{stderr}");
}

#[test]
fn test_run_logs_resolved_configuration_at_debug_level() {
    let dir = workspace();
    harness(&dir)
        .args([
            "run",
            "--program",
            "/nonexistent/jac",
            "--credential-env",
            "WALKER_HARNESS_TEST_UNSET_CREDENTIAL",
        ])
        .env_remove("WALKER_HARNESS_TEST_UNSET_CREDENTIAL")
        .env("WALKER_HARNESS_LOG", "debug")
        .assert()
        .success()
        .stderr(predicate::str::contains("resolved run configuration"));
}

#[test]
fn test_run_selects_cases_by_name() {
    let dir = workspace();
    harness(&dir)
        .args(["run", "--no-gate", "--quiet-server", "--program", STUB])
        .args(["--fixture-dir", ".", "--case", "research_agent"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS  research_agent"))
        .stdout(predicate::str::contains("math_agent").not());
}

#[test]
fn test_run_rejects_unknown_case() {
    let dir = workspace();
    harness(&dir)
        .args(["run", "--no-gate", "--program", STUB, "--case", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown case 'nope'"));
}

#[test]
fn test_run_reads_cases_from_config_file() {
    let dir = workspace();
    let config = format!(
        r#"
[server]
program = "{STUB}"
fixture_dir = "."
inherit_output = false

[gate]
enabled = false

[timeouts]
settle_ms = 0

[[cases]]
name = "addition"
query = "What is 2 + 2?"
handler = "MathAgent"
fields = [{{ name = "response" }}]
"#
    );
    fs::write(dir.path().join("walker-harness.toml"), config).unwrap();

    harness(&dir)
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS  addition"))
        .stdout(predicate::str::contains("2 passed, 0 failed, 0 skipped"));
}

#[test]
fn test_run_with_missing_config_file_fails() {
    let dir = workspace();
    harness(&dir)
        .args(["run", "--config", "absent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration not found"));
}

#[test]
fn test_query_validates_against_running_server() {
    let dir = workspace();
    let mut config = HarnessConfig::default();
    config.server.program = STUB.to_string();
    config.server.fallback = Vec::new();
    config.server.fixture_dir = dir.path().to_path_buf();
    config.server.inherit_output = false;
    config.timeouts.settle_ms = 0;

    let fixture = ServerFixture::launch(&config).unwrap();
    let port = fixture.endpoint().port.to_string();

    harness(&dir)
        .args(["query", "--port", &port, "--text", "What is 2 + 2?"])
        .args(["--handler", "MathAgent", "--field", "response"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"agent\": \"MathAgent\""));

    harness(&dir)
        .args(["query", "--port", &port, "--text", "What is 2 + 2?"])
        .args(["--handler", "ConceptAgent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected ConceptAgent, got MathAgent"));

    fixture.teardown();
}
