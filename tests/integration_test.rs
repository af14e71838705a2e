use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_help_command() {
    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("materialize secrets"));
}

#[test]
fn test_version_command() {
    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vaultsync"));
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("init")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success();

    // Check that config file was created
    assert!(config_path.exists());

    // Check config content
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[vault]"));
    assert!(content.contains("[mirror]"));
    assert!(content.contains("[scan]"));
}

#[test]
fn test_init_fails_when_config_exists() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    // Create config file
    fs::write(&config_path, "test").unwrap();

    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("init")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_init_force_overwrites() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    // Create config file with test content
    fs::write(&config_path, "test content").unwrap();

    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("init")
        .arg("--config")
        .arg(&config_path)
        .arg("--force")
        .assert()
        .success();

    // Check that config was overwritten
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(!content.contains("test content"));
    assert!(content.contains("[vault]"));
}

#[test]
fn test_config_show_without_init_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("config")
        .arg("--show")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("BW_SESSION"));
}

#[test]
fn test_env_build_without_session_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let output = temp_dir.path().join("secrets.env");

    // Non-interactive environment, no session configured
    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("env")
        .arg("build")
        .arg("anything")
        .arg("--output")
        .arg(&output)
        .arg("--config")
        .arg(&config_path)
        .env_remove("BW_SESSION")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not authenticated"));

    assert!(!output.exists());
}

#[test]
fn test_mirror_same_platform_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("mirror")
        .arg("someone")
        .arg("--from")
        .arg("github")
        .arg("--to")
        .arg("github")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("same"));
}

#[test]
fn test_mirror_without_dest_token_fails_fast() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let mut cmd = Command::cargo_bin("vaultsync").unwrap();
    cmd.arg("mirror")
        .arg("someone")
        .arg("--from")
        .arg("github")
        .arg("--to")
        .arg("gitlab")
        .arg("--yes")
        .arg("--config")
        .arg(&config_path)
        .env_remove("GITLAB_TOKEN")
        .env_remove("GL_TOKEN")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not authenticated"));
}
