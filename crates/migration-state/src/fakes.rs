//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryMetricLog` and `MemorySnapshotStore` that satisfy the
//! trait contracts without touching the filesystem.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryMetricLog
// ---------------------------------------------------------------------------

/// In-memory metric log backed by a `Vec<MetricSample>`.
#[derive(Debug, Default)]
pub struct MemoryMetricLog {
    samples: Mutex<Vec<MetricSample>>,
}

impl MemoryMetricLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of samples appended so far.
    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetricLog for MemoryMetricLog {
    async fn append(&self, sample: &MetricSample) -> StorageResult<()> {
        let mut samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        samples.push(sample.clone());
        Ok(())
    }

    async fn read_all(&self) -> StorageResult<Vec<MetricSample>> {
        let samples = self
            .samples
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(samples.clone())
    }
}

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store backed by a `BTreeMap<name, SnapshotRecord>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<String, SnapshotRecord>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
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
        let mut snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshots.insert(name.to_string(), record.clone());
        Ok(record)
    }

    async fn read(&self, name: &str) -> StorageResult<SnapshotRecord> {
        let snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snapshots
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::SnapshotNotFound {
                name: name.to_string(),
            })
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let snapshots = self
            .snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(snapshots.keys().cloned().collect())
    }
}
