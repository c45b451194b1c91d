// ABOUTME: Integration tests for the shipit CLI commands.
// ABOUTME: Validates --help output and init command behavior.

use assert_cmd::Command;
use predicates::prelude::*;
use shipit::config::RunConfig;
use std::fs;

fn shipit_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("shipit"))
}

#[test]
fn help_shows_commands() {
    shipit_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("logs"));
}

#[test]
fn deploy_help_mentions_cache_flag() {
    shipit_cmd()
        .args(["deploy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--use-cache"));
}

#[test]
fn init_creates_parseable_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("shipit.yml");

    shipit_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--container", "trader", "--image", "trader:v1"])
        .assert()
        .success();

    assert!(config_path.exists(), "shipit.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    let config = RunConfig::from_yaml(&content).unwrap();
    assert_eq!(config.container.as_str(), "trader");
    assert_eq!(config.image.to_string(), "trader:v1");
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("shipit.yml");

    fs::write(&config_path, "existing: config").unwrap();

    shipit_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&config_path).unwrap(), "existing: config");
}

#[test]
fn init_force_overwrites() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("shipit.yml");
    fs::write(&config_path, "existing: config").unwrap();

    shipit_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--force"])
        .assert()
        .success();

    assert!(fs::read_to_string(&config_path).unwrap().contains("image:"));
}

#[test]
fn deploy_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    shipit_cmd()
        .current_dir(temp_dir.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}
