//! Chunked migration with retry rounds.
//!
//! Items are split into consecutive chunks of `batch_size`. Each chunk runs
//! one task per item in a [`JoinSet`] and is fully joined before the next
//! chunk starts, with `batch_delay` in between. After a pass, every item that
//! failed is retried together in the next round, up to `retry_count` rounds.
//! Item failures and worker panics never affect siblings; a fatal error
//! (bad credentials, bad configuration) ends the run at the chunk barrier.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use migration_state::SnapshotStore;
use tokio::task::JoinSet;
use tracing::{info, warn, Instrument};

use crate::alerts::AlertDispatcher;
use crate::batch::operation::MigrationOperation;
use crate::batch::report::{BatchReport, ItemFailure, PassSummary, RunClassification};
use crate::batch::BatchConfig;
use crate::domain::{Alert, AlertType, ItemStatus, Severity, WorkItem};
use crate::error::{MigrationError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::stop::{stop_channel, StopHandle, StopSignal};
use crate::tracker::MigrationStateTracker;

/// Snapshot name the final report is persisted under.
pub const REPORT_SNAPSHOT: &str = "batch-report";

pub struct BatchExecutor {
    config: BatchConfig,
    operation: Arc<dyn MigrationOperation>,
    tracker: Arc<MigrationStateTracker>,
    dispatcher: Option<Arc<AlertDispatcher>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    stop: StopHandle,
}

struct PassOutcome {
    summary: PassSummary,
    stopped: bool,
}

impl BatchExecutor {
    pub fn new(
        config: BatchConfig,
        operation: Arc<dyn MigrationOperation>,
        tracker: Arc<MigrationStateTracker>,
    ) -> Self {
        let (stop, _) = stop_channel();
        Self {
            config,
            operation,
            tracker,
            dispatcher: None,
            snapshots: None,
            stop,
        }
    }

    /// Send `MigrationStarted`, `MigrationFailed`, `BatchCompleted` and
    /// `HighFailureRate` alerts through `dispatcher`.
    pub fn with_dispatcher(mut self, dispatcher: Arc<AlertDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Persist the final report as the `batch-report` snapshot.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Handle that stops the run before its next chunk or retry round.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Migrate `items` in place.
    ///
    /// Items already `Migrated` are skipped; `Failed` or `InProgress` items
    /// left by an earlier run are queued again. Returns the report unless a
    /// fatal error aborted the run.
    pub async fn run(&self, items: &mut [WorkItem]) -> Result<BatchReport> {
        if self.config.batch_size == 0 {
            return Err(MigrationError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        check_unique_ids(items)?;

        let run_id = obs::new_run_id();
        let span = obs::run_span("batch", &run_id);
        self.run_inner(run_id, items).instrument(span).await
    }

    async fn run_inner(&self, run_id: String, items: &mut [WorkItem]) -> Result<BatchReport> {
        let started = Instant::now();
        let mut signal = self.stop.signal();

        for item in items.iter_mut() {
            item.requeue();
        }
        self.tracker
            .register_items(items.iter().map(|i| (i.id.as_str(), i.status)))
            .await;

        let skipped = items
            .iter()
            .filter(|i| i.status == ItemStatus::Migrated)
            .count();
        let mut queue: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.status == ItemStatus::Pending)
            .map(|(idx, _)| idx)
            .collect();

        obs::emit_run_started(&run_id, items.len(), self.config.batch_size);
        if !queue.is_empty() {
            self.notify(
                Alert::new(
                    AlertType::MigrationStarted,
                    Severity::Info,
                    format!(
                        "Migrating {} repositories in batches of {}",
                        queue.len(),
                        self.config.batch_size
                    ),
                )
                .with_data("run_id", run_id.clone())
                .with_data("queued", queue.len() as u64)
                .with_data("skipped", skipped as u64),
            )
            .await;
        }

        let mut passes = Vec::new();
        let mut stopped = false;
        let mut round = 0u32;
        while !queue.is_empty() && round <= self.config.retry_count {
            if round > 0 {
                let delay = self.config.backoff.delay_for(round);
                info!(
                    round = round,
                    items = queue.len(),
                    delay_secs = delay.as_secs(),
                    "retrying failed items"
                );
                if !pause(delay, &mut signal).await {
                    stopped = true;
                    break;
                }
            }

            let outcome = match self.run_pass(round, &queue, items, &mut signal).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    obs::emit_run_aborted(&run_id, &err);
                    self.notify(
                        Alert::new(
                            AlertType::MigrationFailed,
                            Severity::Critical,
                            format!("Migration run aborted: {err}"),
                        )
                        .with_data("run_id", run_id.clone()),
                    )
                    .await;
                    return Err(err);
                }
            };
            obs::emit_pass_finished(
                round,
                outcome.summary.chunks,
                outcome.summary.attempted,
                outcome.summary.failed,
            );
            passes.push(outcome.summary);
            if outcome.stopped {
                stopped = true;
                break;
            }

            queue.retain(|&idx| items[idx].status == ItemStatus::Pending);
            round += 1;
        }
        if stopped {
            warn!(remaining = queue.len(), "run stopped by operator");
        }

        let succeeded = items
            .iter()
            .filter(|i| i.status == ItemStatus::Migrated)
            .count();
        let failures = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .map(|i| ItemFailure {
                item: i.id.clone(),
                reason: i.last_error.clone().unwrap_or_default(),
                attempts: i.attempt_count,
            })
            .collect();

        let report = BatchReport::new(
            run_id,
            items.len(),
            succeeded,
            skipped,
            passes,
            failures,
            stopped,
            started.elapsed(),
        );
        obs::emit_run_finished(
            &report.run_id,
            report.duration.as_millis() as u64,
            report.succeeded,
            report.failed,
        );
        self.finish(&report).await;
        Ok(report)
    }

    async fn run_pass(
        &self,
        round: u32,
        queue: &[usize],
        items: &mut [WorkItem],
        signal: &mut StopSignal,
    ) -> Result<PassOutcome> {
        let mut summary = PassSummary {
            round,
            chunks: 0,
            attempted: 0,
            succeeded: 0,
            failed: 0,
        };

        for (n, chunk) in queue.chunks(self.config.batch_size).enumerate() {
            let proceed = if n == 0 {
                !signal.is_stopped()
            } else {
                pause(self.config.batch_delay, signal).await
            };
            if !proceed {
                return Ok(PassOutcome {
                    summary,
                    stopped: true,
                });
            }
            summary.chunks += 1;

            let mut tasks = JoinSet::new();
            for &idx in chunk {
                let item = &mut items[idx];
                if !item.begin_attempt() {
                    continue;
                }
                self.tracker
                    .record_transition(&item.id, ItemStatus::InProgress)
                    .await;
                summary.attempted += 1;

                let operation = Arc::clone(&self.operation);
                let snapshot = item.clone();
                let timeout = self.config.item_timeout;
                tasks.spawn(async move {
                    let outcome = attempt(operation, &snapshot, timeout).await;
                    (idx, outcome)
                });
            }

            let mut fatal = None;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((idx, outcome)) => {
                        self.settle(&mut items[idx], round, outcome, &mut summary, &mut fatal)
                            .await
                    }
                    Err(e) => warn!(error = %e, "migration worker could not be joined"),
                }
            }
            // A worker that could not be joined leaves its item in progress.
            for &idx in chunk {
                if items[idx].status == ItemStatus::InProgress {
                    let lost = Err(MigrationError::ItemFailed {
                        item: items[idx].id.clone(),
                        reason: "worker task ended without a result".to_string(),
                    });
                    self.settle(&mut items[idx], round, lost, &mut summary, &mut fatal)
                        .await;
                }
            }

            if let Some(err) = fatal {
                return Err(err);
            }
        }

        Ok(PassOutcome {
            summary,
            stopped: false,
        })
    }

    async fn settle(
        &self,
        item: &mut WorkItem,
        round: u32,
        outcome: Result<()>,
        summary: &mut PassSummary,
        fatal: &mut Option<MigrationError>,
    ) {
        match outcome {
            Ok(()) => {
                item.mark_migrated();
                summary.succeeded += 1;
                METRICS.inc_items_migrated();
                obs::emit_item_attempt(&item.id, round, item.attempt_count, true);
            }
            Err(err) => {
                let is_fatal = err.is_fatal();
                let exhausted = !is_fatal && round >= self.config.retry_count;
                let reason = failure_reason(&err);
                warn!(
                    item = %item.id,
                    round = round,
                    attempt = item.attempt_count,
                    exhausted = exhausted,
                    error = %reason,
                    "migration attempt failed"
                );
                item.mark_failed(reason.clone(), exhausted);
                summary.failed += 1;
                METRICS.inc_items_failed();
                obs::emit_item_attempt(&item.id, round, item.attempt_count, false);

                if exhausted {
                    self.notify(
                        Alert::new(
                            AlertType::MigrationFailed,
                            Severity::High,
                            format!(
                                "Migration of {} failed after {} attempts",
                                item.id, item.attempt_count
                            ),
                        )
                        .with_data("item", item.id.clone())
                        .with_data("source", item.source_ref.clone())
                        .with_data("target", item.target_ref.clone())
                        .with_data("error", reason),
                    )
                    .await;
                }
                if is_fatal && fatal.is_none() {
                    *fatal = Some(err);
                }
            }
        }
        self.tracker.record_transition(&item.id, item.status).await;
    }

    async fn finish(&self, report: &BatchReport) {
        info!(
            classification = %report.classification,
            success_rate = report.success_rate,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch run finished"
        );

        let severity = match report.classification {
            RunClassification::Ok => Severity::Info,
            RunClassification::Warning => Severity::Medium,
            RunClassification::Error => Severity::High,
        };
        self.notify(
            Alert::new(
                AlertType::BatchCompleted,
                severity,
                format!(
                    "Batch run finished: {}/{} migrated ({:.1}%)",
                    report.succeeded, report.total, report.success_rate
                ),
            )
            .with_data("run_id", report.run_id.clone())
            .with_data("succeeded", report.succeeded as u64)
            .with_data("failed", report.failed as u64)
            .with_data("skipped", report.skipped as u64)
            .with_data("classification", report.classification.to_string()),
        )
        .await;

        if report.classification == RunClassification::Error {
            self.notify(
                Alert::new(
                    AlertType::HighFailureRate,
                    Severity::High,
                    format!(
                        "{} of {} repositories failed to migrate",
                        report.failed, report.total
                    ),
                )
                .with_data("run_id", report.run_id.clone())
                .with_data("success_rate", report.success_rate),
            )
            .await;
        }

        if let Some(store) = &self.snapshots {
            let persisted = match serde_json::to_value(report) {
                Ok(payload) => store.write(REPORT_SNAPSHOT, payload).await.map(|_| ()),
                Err(e) => Err(e.into()),
            };
            if let Err(e) = persisted {
                warn!(error = %e, "failed to persist batch report");
            }
        }
    }

    async fn notify(&self, alert: Alert) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.send(alert).await;
        }
    }
}

async fn attempt(
    operation: Arc<dyn MigrationOperation>,
    item: &WorkItem,
    timeout: Option<Duration>,
) -> Result<()> {
    let work = AssertUnwindSafe(operation.migrate(item)).catch_unwind();
    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(caught) => caught,
            Err(_) => {
                return Err(MigrationError::ItemFailed {
                    item: item.id.clone(),
                    reason: format!("timed out after {}s", limit.as_secs()),
                })
            }
        },
        None => work.await,
    };
    caught.unwrap_or_else(|panic| {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(MigrationError::ItemFailed {
            item: item.id.clone(),
            reason: format!("worker panicked: {message}"),
        })
    })
}

/// `false` if a stop arrived before or during the pause.
async fn pause(delay: Duration, signal: &mut StopSignal) -> bool {
    if signal.is_stopped() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    let slept = tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = signal.stopped() => false,
    };
    slept && !signal.is_stopped()
}

fn failure_reason(err: &MigrationError) -> String {
    match err {
        MigrationError::ItemFailed { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

fn check_unique_ids(items: &[WorkItem]) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.id.as_str()) {
            return Err(MigrationError::Configuration(format!(
                "duplicate work item id {:?}",
                item.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_rejected() {
        let items = vec![
            WorkItem::new("web", "a/web", "web"),
            WorkItem::new("api", "a/api", "api"),
            WorkItem::new("web", "b/web", "web"),
        ];
        let err = check_unique_ids(&items).unwrap_err();
        assert!(matches!(err, MigrationError::Configuration(msg) if msg.contains("\"web\"")));
    }

    #[test]
    fn test_failure_reason_strips_item_prefix() {
        let err = MigrationError::ItemFailed {
            item: "web".into(),
            reason: "exit code 1: boom".into(),
        };
        assert_eq!(failure_reason(&err), "exit code 1: boom");
        let err = MigrationError::Authentication("remote returned HTTP 401".into());
        assert_eq!(
            failure_reason(&err),
            "authentication failed: remote returned HTTP 401"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_interrupted_by_stop() {
        let (handle, mut signal) = stop_channel();
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.stop();
        });
        assert!(!pause(Duration::from_secs(30), &mut signal).await);
        assert!(!pause(Duration::ZERO, &mut signal).await);
        drop(handle);
    }
}
