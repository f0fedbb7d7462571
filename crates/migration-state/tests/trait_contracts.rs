//! Trait contract tests for MetricLog and SnapshotStore.
//!
//! The same assertions run against the in-memory fakes and the filesystem
//! backends; any conforming implementation must pass them.

use migration_state::fakes::{MemoryMetricLog, MemorySnapshotStore};
use migration_state::storage_traits::*;
use migration_state::{FsMetricLog, FsSnapshotStore, StorageError};

async fn assert_metric_log_contract(log: &dyn MetricLog) {
    assert!(log.read_all().await.unwrap().is_empty());

    for value in [1.0, 1.0, 4.0] {
        log.append(&MetricSample::now("migrated_count", value))
            .await
            .unwrap();
    }
    log.append(&MetricSample::now("failed_count", 2.0))
        .await
        .unwrap();

    let samples = log.read_all().await.unwrap();
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1.0, 1.0, 4.0, 2.0], "append order preserved");
    assert_eq!(samples[3].name, "failed_count");
}

async fn assert_snapshot_contract(store: &dyn SnapshotStore) {
    let err = store.read("missing").await.unwrap_err();
    assert!(matches!(err, StorageError::SnapshotNotFound { .. }));

    store
        .write("b-summary", serde_json::json!({ "ok": true }))
        .await
        .unwrap();
    store
        .write("a-summary", serde_json::json!({ "ok": false }))
        .await
        .unwrap();

    assert_eq!(
        store.list().await.unwrap(),
        vec!["a-summary".to_string(), "b-summary".to_string()]
    );
    assert_eq!(store.read("a-summary").await.unwrap().payload["ok"], false);

    assert!(store.write("", serde_json::json!({})).await.is_err());
}

#[tokio::test]
async fn memory_metric_log_contract() {
    assert_metric_log_contract(&MemoryMetricLog::new()).await;
}

#[tokio::test]
async fn fs_metric_log_contract() {
    let dir = tempfile::tempdir().unwrap();
    let log = FsMetricLog::in_dir(dir.path()).unwrap();
    assert_metric_log_contract(&log).await;
}

#[tokio::test]
async fn memory_snapshot_contract() {
    assert_snapshot_contract(&MemorySnapshotStore::new()).await;
}

#[tokio::test]
async fn fs_snapshot_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsSnapshotStore::new(dir.path()).unwrap();
    assert_snapshot_contract(&store).await;
}

#[tokio::test]
async fn fs_metric_log_concurrent_appends_do_not_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let log = std::sync::Arc::new(FsMetricLog::in_dir(dir.path()).unwrap());

    let mut tasks = tokio::task::JoinSet::new();
    for worker in 0..8 {
        let log = std::sync::Arc::clone(&log);
        tasks.spawn(async move {
            for i in 0..25 {
                let sample = MetricSample::now("item_completed", i as f64)
                    .with_tag("worker", worker.to_string());
                log.append(&sample).await.unwrap();
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.unwrap();
    }

    let samples = log.read_all().await.unwrap();
    assert_eq!(samples.len(), 200);
}
