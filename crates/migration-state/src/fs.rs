//! Filesystem backends.
//!
//! Layout under a state directory:
//! - `<root>/metrics.jsonl`: one JSON-encoded [`MetricSample`] per line
//! - `<root>/snapshots/<name>.json`: one [`SnapshotRecord`] per file

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{
    validate_snapshot_name, MetricLog, MetricSample, SnapshotRecord, SnapshotStore, StorageResult,
};

/// JSON-lines metric log.
///
/// Appends are serialised through an async mutex so concurrent writers never
/// interleave partial lines.
pub struct FsMetricLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FsMetricLog {
    /// Open (or create) the log at `path`. Parent directories are created.
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Log at `<root>/metrics.jsonl`.
    pub fn in_dir(root: impl AsRef<Path>) -> StorageResult<Self> {
        Self::new(root.as_ref().join("metrics.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MetricLog for FsMetricLog {
    async fn append(&self, sample: &MetricSample) -> StorageResult<()> {
        let mut line = serde_json::to_vec(sample)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn read_all(&self) -> StorageResult<Vec<MetricSample>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(StorageError::from))
            .collect()
    }
}

/// Directory of JSON snapshot files with atomic replace-on-write.
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    /// Create a store rooted at `root`. Creates `root/snapshots/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = root.as_ref().join("snapshots");
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn snapshot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn write(
        &self,
        name: &str,
        payload: serde_json::Value,
    ) -> StorageResult<SnapshotRecord> {
        validate_snapshot_name(name)?;
        let record = SnapshotRecord {
            name: name.to_string(),
            written_at: Utc::now(),
            payload,
        };
        let bytes = serde_json::to_vec_pretty(&record)?;
        let dir = self.dir.clone();
        let path = self.snapshot_path(name);

        // Write to a temp file in the same directory, then rename over the target.
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e.to_string())))??;

        debug!(snapshot = %name, "snapshot written");
        Ok(record)
    }

    async fn read(&self, name: &str) -> StorageResult<SnapshotRecord> {
        validate_snapshot_name(name)?;
        match tokio::fs::read(self.snapshot_path(name)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::SnapshotNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(".json") {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metric_log_appends_one_line_per_sample() {
        let dir = tempfile::tempdir().unwrap();
        let log = FsMetricLog::in_dir(dir.path()).unwrap();

        log.append(&MetricSample::now("migrated_count", 1.0))
            .await
            .unwrap();
        log.append(&MetricSample::now("migrated_count", 2.0).with_tag("pass", "0"))
            .await
            .unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);

        let samples = log.read_all().await.unwrap();
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(samples[1].tags.get("pass").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn metric_log_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FsMetricLog::new(dir.path().join("nested/metrics.jsonl")).unwrap();
        assert!(log.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_write_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path()).unwrap();

        store
            .write("status-latest", serde_json::json!({ "migrated": 1 }))
            .await
            .unwrap();
        store
            .write("status-latest", serde_json::json!({ "migrated": 7 }))
            .await
            .unwrap();

        let record = store.read("status-latest").await.unwrap();
        assert_eq!(record.payload["migrated"], 7);
        assert_eq!(store.list().await.unwrap(), vec!["status-latest".to_string()]);
    }

    #[tokio::test]
    async fn snapshot_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path()).unwrap();
        let err = store
            .write("../outside", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSnapshotName { .. }));
    }
}
