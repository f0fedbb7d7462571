//! End-to-end checks against the built `repo-migrate` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn repo_migrate(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_repo-migrate"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn repo-migrate")
}

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let state_dir = dir.join("state");
    let text = format!(
        "state_dir = '{}'\n\n[health]\nnetwork_targets = []\n\n{}",
        state_dir.display(),
        extra
    );
    let path = dir.join("migration.toml");
    std::fs::write(&path, text).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_invalid_config_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[batch]\nbatch_size = 0\n");

    let output = repo_migrate(&config, &["status"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("batch_size"));
}

#[test]
fn test_status_without_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = repo_migrate(&config, &["status"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("status-latest: none"));
    assert!(text.contains("batch-report: none"));
}

#[test]
fn test_alert_reaches_console_channel() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = repo_migrate(&config, &["test-alert", "--severity", "low", "-m", "hello ops"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Enabled channels: console"));
    assert!(text.contains("hello ops"));
}

#[test]
fn test_unknown_severity_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = repo_migrate(&config, &["test-alert", "--severity", "urgent"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown severity"));
}

#[test]
fn test_health_with_no_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");

    let output = repo_migrate(&config, &["health"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No dependencies configured"));
}

#[cfg(unix)]
#[test]
fn test_run_migrates_inventory_and_persists_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[batch]\nbatch_size = 2\nretry_count = 0\nbatch_delay_secs = 0\nretry_delay_secs = 0\ncommand = [\"true\"]\n",
    );
    let inventory = dir.path().join("inventory.txt");
    std::fs::write(&inventory, "# repos\nproj/alpha\nproj/beta,beta-new\nproj/gamma\n").unwrap();

    let output = repo_migrate(&config, &["run", "--inventory", inventory.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "{}", stdout(&output));
    assert!(stdout(&output).contains("3/3"));

    let output = repo_migrate(&config, &["status"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("== batch-report (written"));
    assert!(!text.contains("batch-report: none"));
}

#[cfg(unix)]
#[test]
fn test_run_with_failing_command_exits_with_two() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[batch]\nretry_count = 1\nbatch_delay_secs = 0\nretry_delay_secs = 0\ncommand = [\"false\"]\n",
    );
    let inventory = dir.path().join("inventory.txt");
    std::fs::write(&inventory, "proj/alpha\nproj/beta\n").unwrap();

    let output = repo_migrate(&config, &["run", "--inventory", inventory.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}
