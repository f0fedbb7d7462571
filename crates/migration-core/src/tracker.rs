//! Migration State Tracker.
//!
//! Keeps the aggregate item counts and an append-only series of
//! [`MetricSample`]s from which throughput, ETA and stalls are derived.
//! Batch workers publish transitions concurrently, so all state sits behind
//! one async mutex; samples are additionally forwarded to a persisted
//! [`MetricLog`] when one is attached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migration_state::{MetricLog, MetricSample};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::ItemStatus;

pub const MIGRATED_COUNT: &str = "migrated_count";
pub const FAILED_COUNT: &str = "failed_count";
pub const PENDING_COUNT: &str = "pending_count";
pub const IN_PROGRESS_COUNT: &str = "in_progress_count";

/// Aggregate counts at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub migrated: u64,
    pub failed: u64,
    pub updated_at: DateTime<Utc>,
}

impl StatusSnapshot {
    pub fn empty() -> Self {
        Self {
            total: 0,
            pending: 0,
            in_progress: 0,
            migrated: 0,
            failed: 0,
            updated_at: Utc::now(),
        }
    }

    /// Snapshot where everything not yet migrated or failed is pending.
    pub fn from_counts(total: u64, migrated: u64, failed: u64) -> Self {
        Self {
            total,
            pending: total.saturating_sub(migrated + failed),
            in_progress: 0,
            migrated,
            failed,
            updated_at: Utc::now(),
        }
    }

    /// Items still to be worked on.
    pub fn remaining(&self) -> u64 {
        self.pending + self.in_progress
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.remaining() == 0
    }

    /// Percent of items migrated so far.
    pub fn percent_migrated(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.migrated as f64 * 100.0 / self.total as f64
    }

    fn slot(&mut self, status: ItemStatus) -> &mut u64 {
        match status {
            ItemStatus::Pending => &mut self.pending,
            ItemStatus::InProgress => &mut self.in_progress,
            ItemStatus::Migrated => &mut self.migrated,
            ItemStatus::Failed => &mut self.failed,
        }
    }
}

/// Result of a stall evaluation for one metric.
#[derive(Debug, Clone, PartialEq)]
pub enum StallStatus {
    /// Fewer than two samples recorded.
    InsufficientData,
    Progressing,
    Stalled {
        value: f64,
        since: DateTime<Utc>,
        unchanged_for: Duration,
    },
}

/// Serializable view for persisted run summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSummary {
    pub status: StatusSnapshot,
    /// Items migrated per hour over the session, if known.
    pub migrated_per_hour: Option<f64>,
    pub eta_secs: Option<u64>,
    pub sample_count: usize,
}

#[derive(Debug)]
struct TrackerState {
    samples: Vec<MetricSample>,
    items: HashMap<String, ItemStatus>,
    status: StatusSnapshot,
}

pub struct MigrationStateTracker {
    stalled_threshold: Duration,
    state: Mutex<TrackerState>,
    log: Option<Arc<dyn MetricLog>>,
}

impl MigrationStateTracker {
    pub fn new(stalled_threshold: Duration) -> Self {
        Self {
            stalled_threshold,
            state: Mutex::new(TrackerState {
                samples: Vec::new(),
                items: HashMap::new(),
                status: StatusSnapshot::empty(),
            }),
            log: None,
        }
    }

    /// Forward every recorded sample to `log`.
    pub fn with_metric_log(mut self, log: Arc<dyn MetricLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn stalled_threshold(&self) -> Duration {
        self.stalled_threshold
    }

    /// Append a sample stamped with the current time.
    pub async fn record_sample(&self, name: &str, value: f64, tags: BTreeMap<String, String>) {
        self.record_sample_at(Utc::now(), name, value, tags).await;
    }

    pub async fn record_sample_at(
        &self,
        timestamp: DateTime<Utc>,
        name: &str,
        value: f64,
        tags: BTreeMap<String, String>,
    ) {
        let sample = MetricSample {
            timestamp,
            name: name.to_string(),
            value,
            tags,
        };
        self.state.lock().await.samples.push(sample.clone());
        self.persist(&[sample]).await;
    }

    async fn persist(&self, samples: &[MetricSample]) {
        let Some(log) = &self.log else { return };
        for sample in samples {
            if let Err(e) = log.append(sample).await {
                warn!(metric = %sample.name, error = %e, "failed to persist metric sample");
            }
        }
    }

    /// Latest aggregate snapshot.
    pub async fn current_status(&self) -> StatusSnapshot {
        self.state.lock().await.status.clone()
    }

    /// Register the inventory for an in-process run. Items already known keep
    /// their status; new items start as `Pending`.
    pub async fn register_items<'a>(&self, items: impl IntoIterator<Item = (&'a str, ItemStatus)>) {
        let mut state = self.state.lock().await;
        for (id, status) in items {
            if state.items.contains_key(id) {
                continue;
            }
            state.items.insert(id.to_string(), status);
            state.status.total += 1;
            *state.status.slot(status) += 1;
        }
        state.status.updated_at = Utc::now();
    }

    /// Publish one item's status change. Terminal transitions also append
    /// `migrated_count` / `failed_count` samples.
    pub async fn record_transition(&self, item_id: &str, status: ItemStatus) {
        let now = Utc::now();
        let samples = {
            let mut state = self.state.lock().await;
            let previous = state.items.insert(item_id.to_string(), status);
            match previous {
                Some(previous) => {
                    let slot = state.status.slot(previous);
                    *slot = slot.saturating_sub(1);
                }
                None => state.status.total += 1,
            }
            *state.status.slot(status) += 1;
            state.status.updated_at = now;

            if !status.is_terminal() {
                return;
            }
            let samples = vec![
                MetricSample::at(now, MIGRATED_COUNT, state.status.migrated as f64),
                MetricSample::at(now, FAILED_COUNT, state.status.failed as f64),
            ];
            state.samples.extend(samples.iter().cloned());
            samples
        };
        debug!(item = %item_id, status = %status, "item transition recorded");
        self.persist(&samples).await;
    }

    /// Replace the aggregate counts with an externally observed snapshot and
    /// append one sample per count, stamped with `snapshot.updated_at`.
    pub async fn apply_progress(&self, snapshot: StatusSnapshot) {
        let ts = snapshot.updated_at;
        let samples = vec![
            MetricSample::at(ts, MIGRATED_COUNT, snapshot.migrated as f64),
            MetricSample::at(ts, FAILED_COUNT, snapshot.failed as f64),
            MetricSample::at(ts, PENDING_COUNT, snapshot.pending as f64),
            MetricSample::at(ts, IN_PROGRESS_COUNT, snapshot.in_progress as f64),
        ];
        {
            let mut state = self.state.lock().await;
            state.status = snapshot;
            state.samples.extend(samples.iter().cloned());
        }
        self.persist(&samples).await;
    }

    /// Samples recorded for `name`, in append order.
    pub async fn samples(&self, name: &str) -> Vec<MetricSample> {
        let state = self.state.lock().await;
        state
            .samples
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    /// Change per second between the earliest and latest sample of `name`.
    /// `None` with fewer than two samples or no elapsed time.
    pub async fn rate(&self, name: &str) -> Option<f64> {
        let state = self.state.lock().await;
        rate_of(state.samples.iter().filter(|s| s.name == name))
    }

    /// Remaining items divided by the migration rate. `None` while the rate
    /// is unknown or not positive, or when the result does not fit a `Duration`.
    pub async fn eta(&self) -> Option<Duration> {
        let state = self.state.lock().await;
        let rate = rate_of(state.samples.iter().filter(|s| s.name == MIGRATED_COUNT))?;
        if rate <= 0.0 {
            return None;
        }
        let secs = state.status.remaining() as f64 / rate;
        Duration::try_from_secs_f64(secs).ok()
    }

    /// Evaluate whether `name` has stopped moving for longer than the
    /// stalled threshold, judged by the sample timestamps. Every call
    /// re-evaluates from scratch; repeated `Stalled` results are expected
    /// while the stall persists.
    pub async fn stall_status(&self, name: &str) -> StallStatus {
        let state = self.state.lock().await;
        let series: Vec<&MetricSample> = state.samples.iter().filter(|s| s.name == name).collect();
        let Some(latest) = series.last() else {
            return StallStatus::InsufficientData;
        };
        if series.len() < 2 {
            return StallStatus::InsufficientData;
        }

        let since = series
            .iter()
            .rev()
            .take_while(|s| (s.value - latest.value).abs() < f64::EPSILON)
            .last()
            .map(|s| s.timestamp)
            .unwrap_or(latest.timestamp);

        let unchanged_for = (latest.timestamp - since).to_std().unwrap_or_default();
        if unchanged_for > self.stalled_threshold {
            StallStatus::Stalled {
                value: latest.value,
                since,
                unchanged_for,
            }
        } else {
            StallStatus::Progressing
        }
    }

    pub async fn is_stalled(&self, name: &str) -> bool {
        matches!(self.stall_status(name).await, StallStatus::Stalled { .. })
    }

    pub async fn is_complete(&self) -> bool {
        self.state.lock().await.status.is_complete()
    }

    pub async fn summary(&self) -> TrackerSummary {
        let migrated_per_hour = self.rate(MIGRATED_COUNT).await.map(|r| r * 3600.0);
        let eta_secs = self.eta().await.map(|d| d.as_secs());
        let state = self.state.lock().await;
        TrackerSummary {
            status: state.status.clone(),
            migrated_per_hour,
            eta_secs,
            sample_count: state.samples.len(),
        }
    }
}

fn rate_of<'a>(mut series: impl Iterator<Item = &'a MetricSample>) -> Option<f64> {
    let first = series.next()?;
    let last = series.last()?;
    let elapsed = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return None;
    }
    Some((last.value - first.value) / elapsed)
}
