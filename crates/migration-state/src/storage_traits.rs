//! Storage trait definitions for the migration orchestrator
//!
//! - `MetricLog`: append-only time series (one record per line on disk)
//! - `SnapshotStore`: named full-state snapshots used for run summaries
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// MetricLog - append-only time series
// ---------------------------------------------------------------------------

/// One point of a named metric series.
///
/// Samples are never mutated after they are appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl MetricSample {
    /// Sample stamped with the current time.
    pub fn now(name: impl Into<String>, value: f64) -> Self {
        Self::at(Utc::now(), name, value)
    }

    pub fn at(timestamp: DateTime<Utc>, name: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp,
            name: name.into(),
            value,
            tags: BTreeMap::new(),
        }
    }

    /// Attach a tag, replacing any previous value for `key`.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Append-only metric log.
///
/// Guarantees:
/// - `append` never rewrites earlier records.
/// - `read_all` returns samples in append order.
#[async_trait]
pub trait MetricLog: Send + Sync {
    /// Append one sample.
    async fn append(&self, sample: &MetricSample) -> StorageResult<()>;

    /// Read back every sample in append order.
    async fn read_all(&self) -> StorageResult<Vec<MetricSample>>;
}

// ---------------------------------------------------------------------------
// SnapshotStore - full-state snapshots
// ---------------------------------------------------------------------------

/// A stored snapshot: a name, when it was written, and its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub name: String,
    pub written_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Named snapshot store.
///
/// Semantics:
/// - `write` replaces the previous snapshot with the same name atomically;
///   readers observe either the old or the new snapshot, never a partial one.
/// - Names are restricted to `[A-Za-z0-9._-]` and must not start with `.`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Write (or replace) the snapshot `name`.
    async fn write(&self, name: &str, payload: serde_json::Value)
        -> StorageResult<SnapshotRecord>;

    /// Read the snapshot `name`. Fails with `SnapshotNotFound` if absent.
    async fn read(&self, name: &str) -> StorageResult<SnapshotRecord>;

    /// List snapshot names in lexicographic order.
    async fn list(&self) -> StorageResult<Vec<String>>;
}

/// Validate a snapshot name against the rules documented on [`SnapshotStore`].
pub fn validate_snapshot_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidSnapshotName {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_name_rules() {
        assert!(validate_snapshot_name("monitor-summary").is_ok());
        assert!(validate_snapshot_name("batch_report.v1").is_ok());
        assert!(validate_snapshot_name("").is_err());
        assert!(validate_snapshot_name(".hidden").is_err());
        assert!(validate_snapshot_name("../escape").is_err());
        assert!(validate_snapshot_name("a/b").is_err());
    }

    #[test]
    fn test_sample_tags_are_omitted_when_empty() {
        let sample = MetricSample::now("migrated_count", 3.0);
        let json = serde_json::to_string(&sample).unwrap();
        assert!(!json.contains("tags"));

        let tagged = sample.with_tag("source", "tracker");
        let json = serde_json::to_string(&tagged).unwrap();
        assert!(json.contains("\"source\":\"tracker\""));
    }
}
