//! Orchestration Loop.
//!
//! One cycle checks dependency health, pulls progress, evaluates stall and
//! completion, and writes a status projection. Cycles never overlap:
//! [`MonitorLoop::run`] takes `&mut self` and awaits each step in turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use migration_state::SnapshotStore;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

use crate::alerts::{AlertDispatcher, DispatcherStats};
use crate::domain::{Alert, AlertType, HealthReport, Severity};
use crate::error::{MigrationError, Result};
use crate::gateway::ProgressSource;
use crate::health::HealthMonitor;
use crate::obs;
use crate::stop::{stop_channel, StopHandle};
use crate::tracker::{
    MigrationStateTracker, StallStatus, StatusSnapshot, TrackerSummary, MIGRATED_COUNT,
};

pub const STATUS_SNAPSHOT: &str = "status-latest";
pub const SUMMARY_SNAPSHOT: &str = "monitor-summary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Checking,
    Reporting,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every inventory item reached a terminal state.
    Completed,
    /// Continuous mode is off.
    SingleCycle,
    MaxRuntime,
    Operator,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub continuous: bool,
    pub max_runtime: Option<Duration>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            continuous: true,
            max_runtime: None,
        }
    }
}

/// What one cycle observed. Logged and written as `status-latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusProjection {
    pub cycle: u64,
    pub status: StatusSnapshot,
    pub percent_migrated: f64,
    pub migrated_per_hour: Option<f64>,
    pub eta_secs: Option<u64>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub stalled: bool,
    pub healthy: bool,
    pub unhealthy: Vec<String>,
    pub degraded: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub run_id: String,
    pub cycles: u64,
    pub stop_reason: StopReason,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub progress: TrackerSummary,
    pub alerts: DispatcherStats,
}

pub struct MonitorLoop {
    config: MonitorConfig,
    health: HealthMonitor,
    progress: Arc<dyn ProgressSource>,
    tracker: Arc<MigrationStateTracker>,
    dispatcher: Arc<AlertDispatcher>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    stop: StopHandle,
    state: LoopState,
    cycles: u64,
}

impl MonitorLoop {
    pub fn new(
        config: MonitorConfig,
        health: HealthMonitor,
        progress: Arc<dyn ProgressSource>,
        tracker: Arc<MigrationStateTracker>,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        let (stop, _) = stop_channel();
        Self {
            config,
            health,
            progress,
            tracker,
            dispatcher,
            snapshots: None,
            stop,
            state: LoopState::Idle,
            cycles: 0,
        }
    }

    /// Write `status-latest` every cycle and `monitor-summary` on exit.
    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run cycles until completion, single-cycle mode, max runtime or an
    /// operator stop. A fatal error from the progress source ends the loop
    /// with that error.
    pub async fn run(&mut self) -> Result<MonitorSummary> {
        let run_id = obs::new_run_id();
        let span = obs::run_span("monitor", &run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: String) -> Result<MonitorSummary> {
        let started = Instant::now();
        let started_at = Utc::now();
        let mut signal = self.stop.signal();
        info!(
            interval_secs = self.config.interval.as_secs(),
            continuous = self.config.continuous,
            dependencies = ?self.health.dependencies(),
            "monitor loop starting"
        );

        let reason = loop {
            if signal.is_stopped() {
                break StopReason::Operator;
            }
            self.cycles += 1;

            let completed = match self.cycle().await {
                Ok(completed) => completed,
                Err(err) => {
                    self.state = LoopState::Stopped;
                    warn!(error = %err, "monitor loop aborted");
                    return Err(err);
                }
            };
            if completed {
                break StopReason::Completed;
            }
            if !self.config.continuous {
                break StopReason::SingleCycle;
            }
            if self
                .config
                .max_runtime
                .is_some_and(|max| started.elapsed() >= max)
            {
                break StopReason::MaxRuntime;
            }

            self.state = LoopState::Sleeping;
            let slept = tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => true,
                _ = signal.stopped() => false,
            };
            if !slept {
                break StopReason::Operator;
            }
        };

        self.state = LoopState::Stopped;
        info!(cycles = self.cycles, reason = ?reason, "monitor loop stopped");
        if reason != StopReason::Completed {
            self.dispatcher
                .send(
                    Alert::new(
                        AlertType::MonitoringStopped,
                        Severity::Info,
                        format!("Monitoring stopped after {} cycle(s)", self.cycles),
                    )
                    .with_data("reason", format!("{reason:?}")),
                )
                .await;
        }

        let summary = MonitorSummary {
            run_id,
            cycles: self.cycles,
            stop_reason: reason,
            started_at,
            finished_at: Utc::now(),
            progress: self.tracker.summary().await,
            alerts: self.dispatcher.stats().await,
        };
        self.persist(SUMMARY_SNAPSHOT, &summary).await;
        Ok(summary)
    }

    /// One Checking + Reporting pass. Returns `true` once the migration is complete.
    async fn cycle(&mut self) -> Result<bool> {
        self.state = LoopState::Checking;
        let health = self.health.check_all().await;
        if !health.overall {
            self.alert_unhealthy(&health).await;
        }

        self.state = LoopState::Reporting;
        match self.progress.fetch_progress().await {
            Ok(snapshot) => self.tracker.apply_progress(snapshot).await,
            Err(err) => {
                let err = MigrationError::from(err);
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(error = %err, "could not fetch migration progress");
            }
        }

        let status = self.tracker.current_status().await;
        let complete = status.is_complete();
        let stall = self.tracker.stall_status(MIGRATED_COUNT).await;
        let stalled = !complete && matches!(stall, StallStatus::Stalled { .. });

        if let (true, StallStatus::Stalled { unchanged_for, .. }) = (stalled, &stall) {
            self.dispatcher
                .send(
                    Alert::new(
                        AlertType::MigrationStalled,
                        Severity::High,
                        format!(
                            "Migration stalled at {}/{} repositories",
                            status.migrated, status.total
                        ),
                    )
                    .with_data("minutes_without_progress", unchanged_for.as_secs() / 60)
                    .with_data("pending", status.pending),
                )
                .await;
        }
        if complete {
            self.dispatcher
                .send(
                    Alert::new(
                        AlertType::MigrationCompleted,
                        Severity::Info,
                        format!(
                            "Migration completed: {}/{} repositories migrated",
                            status.migrated, status.total
                        ),
                    )
                    .with_data("migrated", status.migrated)
                    .with_data("failed", status.failed),
                )
                .await;
        }

        let projection = self.project(status, stalled, &health).await;
        info!(
            cycle = projection.cycle,
            migrated = projection.status.migrated,
            total = projection.status.total,
            percent = projection.percent_migrated,
            per_hour = ?projection.migrated_per_hour,
            eta_secs = ?projection.eta_secs,
            stalled = projection.stalled,
            "migration status"
        );
        obs::emit_cycle_completed(
            self.cycles,
            health.overall,
            projection.status.migrated,
            projection.status.total,
        );
        self.persist(STATUS_SNAPSHOT, &projection).await;

        Ok(complete)
    }

    async fn alert_unhealthy(&self, health: &HealthReport) {
        let unhealthy = health.unhealthy();
        let details: Vec<String> = health
            .statuses
            .iter()
            .filter(|s| unhealthy.contains(&s.dependency))
            .map(|s| {
                format!(
                    "{}: {}",
                    s.dependency,
                    s.detail.as_deref().unwrap_or("unreachable")
                )
            })
            .collect();
        self.dispatcher
            .send(
                Alert::new(
                    AlertType::HealthCheckFailed,
                    Severity::High,
                    format!("Unhealthy dependencies: {}", unhealthy.join(", ")),
                )
                .with_data("unhealthy", unhealthy.join(", "))
                .with_data("details", details.join("; ")),
            )
            .await;
    }

    async fn project(
        &self,
        status: StatusSnapshot,
        stalled: bool,
        health: &HealthReport,
    ) -> StatusProjection {
        let migrated_per_hour = self.tracker.rate(MIGRATED_COUNT).await.map(|r| r * 3600.0);
        let eta = self.tracker.eta().await;
        let now = Utc::now();
        StatusProjection {
            cycle: self.cycles,
            percent_migrated: status.percent_migrated(),
            status,
            migrated_per_hour,
            eta_secs: eta.map(|d| d.as_secs()),
            estimated_completion: eta
                .and_then(|d| chrono::Duration::from_std(d).ok())
                .and_then(|d| now.checked_add_signed(d)),
            stalled,
            healthy: health.overall,
            unhealthy: health.unhealthy(),
            degraded: health.degraded(),
            generated_at: now,
        }
    }

    async fn persist<T: Serialize>(&self, name: &str, value: &T) {
        let Some(store) = &self.snapshots else { return };
        let result = match serde_json::to_value(value) {
            Ok(payload) => store.write(name, payload).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(snapshot = name, error = %e, "failed to write snapshot");
        }
    }
}
