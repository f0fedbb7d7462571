//! repo-migrate core library
//!
//! Batch execution, progress tracking, health checks, alerting and the
//! monitor loop for moving many repositories between platforms.

pub mod alerts;
pub mod batch;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod stop;
pub mod telemetry;
pub mod tracker;

pub use alerts::{
    AlertChannel, AlertDispatcher, ChannelError, ChannelKind, DispatchOutcome, DispatcherConfig,
    DispatcherStats, QuietHours, SuppressionReason,
};

pub use batch::{
    BatchConfig, BatchExecutor, BatchReport, CommandMigrationOperation, MigrationOperation,
    RetryBackoff, RunClassification,
};

pub use config::MigrationConfig;

pub use domain::{
    Alert, AlertType, HealthReport, HealthState, HealthStatus, ItemStatus, Severity, WorkItem,
};

pub use error::{MigrationError, Result};

pub use gateway::{GatewayConfig, GatewayError, HttpGateway, ProgressSource, TargetOrgProgress};

pub use health::{GatewayProbe, HealthConfig, HealthMonitor, HealthProbe, NetworkProbe};

pub use inventory::{load_inventory, parse_inventory};

pub use orchestrator::{LoopState, MonitorConfig, MonitorLoop, MonitorSummary, StopReason};

pub use stop::{stop_channel, StopHandle, StopSignal};

pub use tracker::{MigrationStateTracker, StallStatus, StatusSnapshot, MIGRATED_COUNT};

pub use migration_state::{FsMetricLog, FsSnapshotStore, MetricLog, SnapshotStore};
