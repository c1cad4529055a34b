//! CLI surface tests for clamscan-exporter.
//!
//! Startup failures must exit before any signal wait, with the documented
//! exit code and a human-readable reason on stderr.

use std::net::TcpListener;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

/// Exporter command with a clean environment, so stray `CE_*` variables
/// cannot leak into the test.
fn exporter() -> Command {
    let mut cmd = cargo_bin_cmd!("clamscan-exporter");
    cmd.env_clear();
    cmd
}

#[test]
fn help_flag_works() {
    exporter()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("clamscan"))
        .stdout(predicate::str::contains("--tcp-port"))
        .stdout(predicate::str::contains("--http-port"))
        .stdout(predicate::str::contains("--grace-period"))
        .stdout(predicate::str::contains("CE_TCP_PORT"));
}

#[test]
fn version_flag_works() {
    exporter()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unknown_flag_is_an_argument_error() {
    exporter()
        .arg("--no-such-flag")
        .assert()
        .code(10)
        .stderr(predicate::str::contains("--no-such-flag"));
}

#[test]
fn bad_port_is_an_argument_error() {
    exporter().args(["--tcp-port", "99999"]).assert().code(10);
}

#[test]
fn missing_config_file_is_a_config_error() {
    exporter()
        .args(["--config", "/definitely/not/here.toml"])
        .assert()
        .code(11)
        .stderr(predicate::str::contains("Configuration Error"));
}

#[test]
fn invalid_metrics_path_is_a_config_error() {
    exporter()
        .args(["--metrics-path", "metrics"])
        .assert()
        .code(11)
        .stderr(predicate::str::contains("metrics.path"));
}

#[test]
fn unknown_config_key_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("exporter.toml");
    std::fs::write(&path, "[listen]\nport = 9000\n").unwrap();

    exporter()
        .arg("--config")
        .arg(&path)
        .assert()
        .code(11);
}

#[test]
fn config_from_environment() {
    exporter()
        .env("CE_GRACE_PERIOD", "0")
        .assert()
        .code(11)
        .stderr(predicate::str::contains("shutdown_grace_secs"));
}

#[test]
fn occupied_scan_port_is_a_bind_error() {
    let holder = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    exporter()
        .args(["--bind", "127.0.0.1", "--tcp-port", &port.to_string()])
        .args(["--http-bind", "127.0.0.1", "--http-port", "0"])
        .assert()
        .code(12)
        .stderr(predicate::str::contains("Listener Bind Failed"));
}
