// ABOUTME: Integration tests for the shipwright CLI commands.
// ABOUTME: Runs the binary against a temporary project whose commands are plain shell builtins.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const PROJECT_YAML: &str = r#"
application: shop
artifact: registry.example.com/shop:{version}
environments:
  - name: dev
    apply: "true"
  - name: production
    apply: "true"
    allow_prerelease: false
    approval:
      required: 1
      approvers: [alice]
"#;

fn shipwright_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("shipwright"));
    cmd.env_remove("SHIPWRIGHT_ACTOR");
    cmd
}

fn project() -> tempfile::TempDir {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("shipwright.yml"), PROJECT_YAML).unwrap();
    temp_dir
}

fn run(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    shipwright_cmd()
        .current_dir(dir)
        .args(["--actor", "ci"])
        .args(args)
        .assert()
}

#[test]
fn help_shows_commands() {
    shipwright_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("promote"))
        .stdout(predicate::str::contains("approve"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("shipwright.yml");

    shipwright_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--application", "billing"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created shipwright.yml"));

    assert!(config_path.exists(), "shipwright.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("application: billing"));
    assert!(content.contains("environments:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("shipwright.yml");

    fs::write(&config_path, "existing: config").unwrap();

    shipwright_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn missing_config_is_reported() {
    let temp_dir = tempfile::tempdir().unwrap();

    shipwright_cmd()
        .current_dir(temp_dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn validate_accepts_and_rejects() {
    let dir = project();

    run(dir.path(), &["validate", "dev", "1.0.0"])
        .success()
        .stdout(predicate::str::contains("registry.example.com/shop:1.0.0"));

    run(dir.path(), &["validate", "production", "2.0.0-rc.1"])
        .failure()
        .stderr(predicate::str::contains(
            "prerelease 2.0.0-rc.1 is not allowed in production",
        ));
}

#[test]
fn deploy_then_status_and_history() {
    let dir = project();

    run(dir.path(), &["deploy", "dev", "1.0.0"])
        .success()
        .stdout(predicate::str::contains("Deployed 1.0.0 to dev"));
    run(dir.path(), &["deploy", "dev", "1.1.0"])
        .success()
        .stdout(predicate::str::contains("replacing 1.0.0"));

    run(dir.path(), &["status"])
        .success()
        .stdout(predicate::str::contains("Application: shop"))
        .stdout(predicate::str::contains(
            "dev: 1.1.0 (registry.example.com/shop:1.1.0)",
        ))
        .stdout(predicate::str::contains("production: nothing deployed"));

    run(dir.path(), &["history", "dev"])
        .success()
        .stdout(predicate::str::contains("1.0.0"))
        .stdout(predicate::str::contains("by ci"));

    run(dir.path(), &["audit", "verify"])
        .success()
        .stdout(predicate::str::contains("Audit log intact (6 events)"));
}

#[test]
fn status_json_is_machine_readable() {
    let dir = project();
    run(dir.path(), &["deploy", "dev", "1.0.0"]).success();

    let output = run(dir.path(), &["--json", "status"]).success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();

    assert_eq!(json["event"], "status");
    assert_eq!(json["data"][0]["environment"], "dev");
    assert_eq!(json["data"][0]["current"]["version"], "1.0.0");
    assert_eq!(json["data"][0]["current"]["status"], "succeeded");
    assert!(json["data"][1]["current"].is_null());
}

#[test]
fn promotion_waits_for_approval() {
    let dir = project();
    run(dir.path(), &["deploy", "dev", "1.0.0"]).success();

    run(dir.path(), &["promote", "1.0.0", "--to", "production"])
        .failure()
        .stderr(predicate::str::contains("needs 1 approval(s)"));

    shipwright_cmd()
        .current_dir(dir.path())
        .args(["--actor", "alice", "approve", "production", "1.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.0.0 approved for production (1/1)"));

    run(dir.path(), &["promote", "1.0.0", "--to", "production"])
        .success()
        .stdout(predicate::str::contains("Deployed 1.0.0 to production"));
}

#[test]
fn rollback_restores_previous_version() {
    let dir = project();
    run(dir.path(), &["deploy", "dev", "1.0.0"]).success();
    run(dir.path(), &["deploy", "dev", "1.1.0"]).success();

    run(dir.path(), &["rollback", "dev"])
        .success()
        .stdout(predicate::str::contains("Rolled back dev from 1.1.0 to 1.0.0"));

    run(dir.path(), &["history", "dev"])
        .success()
        .stdout(predicate::str::contains("(rollback from 1.1.0)"));
}

#[test]
fn failed_deploy_exits_nonzero() {
    let dir = project();
    fs::write(
        dir.path().join("shipwright.yml"),
        PROJECT_YAML.replacen("apply: \"true\"", "apply: \"echo broken >&2; exit 2\"", 1),
    )
    .unwrap();

    run(dir.path(), &["deploy", "dev", "1.0.0"])
        .failure()
        .stderr(predicate::str::contains("deployment of 1.0.0 to dev failed"))
        .stderr(predicate::str::contains("broken"));
}

#[test]
fn quiet_and_json_conflict() {
    shipwright_cmd()
        .args(["--quiet", "--json", "status"])
        .assert()
        .failure();
}
