//! Integration tests for configuration layering.
//!
//! Tests the full priority chain: hardcoded defaults < XDG config < project config < CLI args

#![allow(clippy::unwrap_used)] // Test code uses unwrap for brevity
#![allow(deprecated)] // cargo_bin deprecation warning

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use serde_json::Value;

/// Runs `--print-config` in `home` with any extra args and parses the JSON.
fn effective(home: &Path, cwd: &Path, args: &[&str]) -> Value {
    let output = Command::cargo_bin("mood-lens")
        .unwrap()
        .current_dir(cwd)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .arg("--print-config")
        .args(args)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

fn write_xdg(home: &Path, content: &str) {
    let dir = home.join("config").join("mood-lens");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), content).unwrap();
}

#[test]
fn test_hardcoded_defaults() {
    let home = tempfile::tempdir().unwrap();
    let settings = effective(home.path(), home.path(), &[]);

    assert_eq!(settings["device"], 0);
    assert_eq!(settings["models"], "models");
    assert_eq!(settings["fps"], 60);
    assert_eq!(settings["retain_on_empty"], true);
    assert_eq!(settings["format"], "text");
    assert!(settings["width"].is_null());
}

#[test]
fn test_xdg_config_applies() {
    let home = tempfile::tempdir().unwrap();
    write_xdg(home.path(), "[display]\nfps = 24\n\n[camera]\ndevice = 2\n");

    let settings = effective(home.path(), home.path(), &[]);
    assert_eq!(settings["fps"], 24);
    assert_eq!(settings["device"], 2);
}

#[test]
fn test_project_config_overrides_xdg() {
    let home = tempfile::tempdir().unwrap();
    write_xdg(home.path(), "[display]\nfps = 24\n\n[camera]\ndevice = 2\n");
    let project = home.path().join("project");
    let nested = project.join("src");
    fs::create_dir_all(&nested).unwrap();
    fs::write(
        project.join(".mood-lens.toml"),
        "[display]\nfps = 10\n\n[output]\nformat = 'jsonl'\n",
    )
    .unwrap();

    // Found by searching up from a subdirectory.
    let settings = effective(home.path(), &nested, &[]);
    assert_eq!(settings["fps"], 10);
    assert_eq!(settings["device"], 2);
    assert_eq!(settings["format"], "jsonl");
}

#[test]
fn test_cli_overrides_project_config() {
    let home = tempfile::tempdir().unwrap();
    fs::write(
        home.path().join(".mood-lens.toml"),
        "[emotion]\nretain_on_empty = true\n\n[output]\nformat = 'jsonl'\n",
    )
    .unwrap();

    let settings = effective(
        home.path(),
        home.path(),
        &["--format", "text", "--reset-on-empty", "--fps", "5"],
    );
    assert_eq!(settings["format"], "text");
    assert_eq!(settings["retain_on_empty"], false);
    assert_eq!(settings["fps"], 5);
}

#[test]
fn test_explicit_config_file_skips_discovery() {
    let home = tempfile::tempdir().unwrap();
    write_xdg(home.path(), "[camera]\ndevice = 2\n");
    let explicit = home.path().join("custom.toml");
    fs::write(&explicit, "[models]\nlocation = '/srv/weights'\n").unwrap();

    let settings = effective(
        home.path(),
        home.path(),
        &["--config", explicit.to_str().unwrap()],
    );
    assert_eq!(settings["models"], "/srv/weights");
    assert_eq!(settings["device"], 0);
}

#[test]
fn test_invalid_project_config_falls_back_to_defaults() {
    let home = tempfile::tempdir().unwrap();
    fs::write(home.path().join(".mood-lens.toml"), "[display\nfps = 10").unwrap();

    let settings = effective(home.path(), home.path(), &[]);
    assert_eq!(settings["fps"], 60);
}

#[test]
fn test_out_of_range_config_warns() {
    let home = tempfile::tempdir().unwrap();
    fs::write(
        home.path().join(".mood-lens.toml"),
        "[detector]\nscore_threshold = 3.0\n",
    )
    .unwrap();

    Command::cargo_bin("mood-lens")
        .unwrap()
        .current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .arg("--print-config")
        .assert()
        .success()
        .stderr(predicates::str::contains("detector.score_threshold must be 0.0-1.0"));
}
