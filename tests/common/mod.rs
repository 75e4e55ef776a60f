//! Shared helpers for the `tfe` integration tests.

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Path to the `tfe` binary, honoring custom target directories.
#[allow(deprecated)]
pub fn tfe_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_tfe")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("tfe"))
}

/// A `tfe` command bound to `project_dir`, with HOME isolated inside it.
pub fn tfe_in(project_dir: &Path) -> Command {
    let mut cmd = Command::new(tfe_binary());
    cmd.current_dir(project_dir)
        .env("HOME", project_dir.join("home"))
        .env("TASKFLOW_PROJECT_DIR", project_dir)
        .env_remove("RUST_LOG");
    cmd
}

pub fn setup_test_env() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Run a command that must succeed and parse its stdout as JSON.
pub fn run_json(project_dir: &Path, args: &[&str]) -> serde_json::Value {
    let output = tfe_in(project_dir).args(args).assert().success();
    serde_json::from_slice(&output.get_output().stdout).expect("stdout is not JSON")
}

/// Create a plain task with a fixed id.
#[allow(dead_code)]
pub fn add_task(project_dir: &Path, id: &str, project: &str) {
    run_json(
        project_dir,
        &["task", "add", "--id", id, "--name", id, "--project", project],
    );
}
