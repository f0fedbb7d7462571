//! The per-item migration operation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::WorkItem;
use crate::error::{MigrationError, Result};

/// Migrates one work item. `Ok(())` means the item is fully migrated.
///
/// Implementations must be safe to call concurrently for different items.
/// An error for which [`MigrationError::is_fatal`] holds aborts the run.
#[async_trait]
pub trait MigrationOperation: Send + Sync {
    async fn migrate(&self, item: &WorkItem) -> Result<()>;
}

/// Runs an external migration tool once per item.
///
/// Arguments are a template; `{id}`, `{source}` and `{target}` are replaced
/// with the item's fields. Exit status 0 means success unless a completion
/// marker is configured, in which case stdout must also contain it.
#[derive(Debug, Clone)]
pub struct CommandMigrationOperation {
    command: Vec<String>,
    completion_marker: Option<String>,
    working_dir: Option<PathBuf>,
}

impl CommandMigrationOperation {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.first().map_or(true, |exe| exe.trim().is_empty()) {
            return Err(MigrationError::Configuration(
                "batch.command must name an executable".to_string(),
            ));
        }
        Ok(Self {
            command,
            completion_marker: None,
            working_dir: None,
        })
    }

    pub fn with_completion_marker(mut self, marker: Option<String>) -> Self {
        self.completion_marker = marker.filter(|m| !m.is_empty());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn render(&self, item: &WorkItem) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{id}", &item.id)
                    .replace("{source}", &item.source_ref)
                    .replace("{target}", &item.target_ref)
            })
            .collect()
    }
}

#[async_trait]
impl MigrationOperation for CommandMigrationOperation {
    async fn migrate(&self, item: &WorkItem) -> Result<()> {
        let argv = self.render(item);
        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| MigrationError::Configuration("empty migration command".into()))?;

        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let started = Instant::now();
        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                MigrationError::Configuration(format!("cannot run {exe}: {e}"))
            }
            _ => MigrationError::ItemFailed {
                item: item.id.clone(),
                reason: format!("spawn failed: {e}"),
            },
        })?;
        let output = child.wait_with_output().await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            item = %item.id,
            exit_code = output.status.code().unwrap_or(-1),
            duration_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "migration command finished"
        );

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(MigrationError::ItemFailed {
                item: item.id.clone(),
                reason: format!("exit code {code}: {}", last_line(&stderr, &stdout)),
            });
        }
        if let Some(marker) = &self.completion_marker {
            if !stdout.contains(marker.as_str()) {
                return Err(MigrationError::ItemFailed {
                    item: item.id.clone(),
                    reason: format!("completion marker {marker:?} not found in output"),
                });
            }
        }
        Ok(())
    }
}

/// Last non-empty line of stderr, falling back to stdout.
fn last_line<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    [stderr, stdout]
        .into_iter()
        .flat_map(|s| s.lines().rev())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("no output")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new("ledger", "payments/ledger", "ledger")
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandMigrationOperation::new(vec![]).is_err());
        assert!(CommandMigrationOperation::new(vec![" ".into()]).is_err());
    }

    #[test]
    fn test_template_substitution() {
        let op = CommandMigrationOperation::new(vec![
            "migrate".into(),
            "--source={source}".into(),
            "--target={target}".into(),
            "{id}".into(),
        ])
        .unwrap();
        assert_eq!(
            op.render(&item()),
            vec!["migrate", "--source=payments/ledger", "--target=ledger", "ledger"]
        );
    }

    #[tokio::test]
    async fn test_zero_exit_is_success() {
        let op = CommandMigrationOperation::new(sh("echo migrating {id}")).unwrap();
        op.migrate(&item()).await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let op = CommandMigrationOperation::new(sh("echo 'repo locked' >&2; exit 3")).unwrap();
        match op.migrate(&item()).await.unwrap_err() {
            MigrationError::ItemFailed { item, reason } => {
                assert_eq!(item, "ledger");
                assert_eq!(reason, "exit code 3: repo locked");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_completion_marker_fails() {
        let op = CommandMigrationOperation::new(sh("echo partial"))
            .unwrap()
            .with_completion_marker(Some("State: Succeeded".into()));
        assert!(op.migrate(&item()).await.is_err());

        let op = CommandMigrationOperation::new(sh("echo 'State: Succeeded'"))
            .unwrap()
            .with_completion_marker(Some("State: Succeeded".into()));
        op.migrate(&item()).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_executable_is_fatal() {
        let op = CommandMigrationOperation::new(vec!["/nonexistent/gei".into()]).unwrap();
        assert!(op.migrate(&item()).await.unwrap_err().is_fatal());
    }
}
