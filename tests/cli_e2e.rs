//! End-to-end CLI tests for the release-aggregator binary.

#![allow(deprecated)]

mod support;
use support::socket_guard::start_mock_server_or_skip;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Aggregate upcoming and recent"))
        .stdout(predicate::str::contains("--config"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("release-aggregator"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_missing_explicit_config_fails() {
    let tempdir = TempDir::new().unwrap();
    let missing = tempdir.path().join("nope.toml");

    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("--config")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_binary_invalid_config_value_fails() {
    let tempdir = TempDir::new().unwrap();
    let config_path = tempdir.path().join("config.toml");
    std::fs::write(&config_path, "max_pages = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_pages"));
}

#[test]
fn test_binary_delay_floor_below_three_seconds_fails() {
    let tempdir = TempDir::new().unwrap();
    let config_path = tempdir.path().join("config.toml");
    std::fs::write(&config_path, "delay_floor_secs = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("delay_floor_secs"));
}

/// Runs at the default 3 second floor: one robots read, one listing request.
#[tokio::test]
async fn test_binary_full_run_writes_snapshot() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path("/events/upcoming_releases.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<table><tr><td>Band U</td><td><a href=\"/album.php?album_id=9\">Someday</a></td><td>TBA</td></tr></table>",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let tempdir = TempDir::new().unwrap();
    let config_path = tempdir.path().join("config.toml");
    let output = tempdir.path().join("out").join("snapshot.json");
    std::fs::write(
        &config_path,
        format!(
            r#"[enrichment]
enabled = false

[sources.metal-archives]
enabled = false

[sources.metalstorm-new]
enabled = false

[sources.musicbrainz]
enabled = false

[sources.metalstorm-upcoming]
base_url = "{}"
"#,
            mock_server.uri()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("release-aggregator").unwrap();
    cmd.arg("-q")
        .arg("--config")
        .arg(&config_path)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let raw = std::fs::read_to_string(&output).unwrap();
    let snapshot: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(snapshot["count"], 1);
    let release = &snapshot["releases"][0];
    assert_eq!(release["artist"], "Band U");
    assert_eq!(release["title"], "Someday");
    assert!(release["releaseDate"].is_null());
    assert_eq!(release["source"], "metalstorm-upcoming");
    assert!(snapshot["generatedAt"].as_str().unwrap().ends_with('Z'));
}
