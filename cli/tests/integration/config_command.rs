//! Integration tests for `kvmkit config`.

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn kvmkit() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kvmkit"));
    cmd.env("NO_COLOR", "1").env_remove("KVMKIT_HOME");
    cmd
}

#[test]
fn test_config_path_honors_env_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("custom.yaml");
    kvmkit()
        .env("KVMKIT_CONFIG", &path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.yaml"));
}

#[test]
fn test_config_show_uses_file_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    let base = dir.path().join("vms-root");
    std::fs::write(
        &path,
        format!(
            "base_dir: {}\ndefaults:\n  memory_mb: 4096\nforward:\n  poll_ms: 250\n",
            base.display()
        ),
    )
    .expect("write config");

    let output = kvmkit()
        .env("KVMKIT_CONFIG", &path)
        .args(["config", "show", "--json"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["defaults"]["memory_mb"], 4096);
    assert_eq!(value["defaults"]["vcpus"], 2);
    assert_eq!(value["forward"]["poll_ms"], 250);
    assert_eq!(value["base_dir"], base.display().to_string());
    assert_eq!(value["forward"]["channels"].as_array().map(Vec::len), Some(4));
}

#[test]
fn test_config_show_rejects_broken_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "defaults: [not, a, map]\n").expect("write config");
    kvmkit()
        .env("KVMKIT_CONFIG", &path)
        .args(["config", "show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot parse"));
}

#[test]
fn test_config_init_writes_defaults_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kvm").join("config.yaml");
    kvmkit()
        .env("KVMKIT_CONFIG", &path)
        .args(["config", "init"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&path).expect("config written");
    assert!(written.contains("memory_mb: 2048"), "got: {written}");
    assert!(written.contains("postgres"), "got: {written}");

    kvmkit()
        .env("KVMKIT_CONFIG", &path)
        .args(["config", "init"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--force"));

    kvmkit()
        .env("KVMKIT_CONFIG", &path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}
