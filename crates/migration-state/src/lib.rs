//! Migration-State: persistence for the repository migration orchestrator.
//!
//! This crate owns everything the orchestration core writes to disk. From the
//! core's point of view the data is write-only: metrics are appended one
//! record per line and run summaries are written as whole-file snapshots.
//!
//! ## Layer 0 - Data/Persistence
//!
//! ## Key Components
//!
//! - [`MetricLog`]: append-only time series of [`MetricSample`]s
//! - [`SnapshotStore`]: named full-state JSON snapshots
//! - [`fs`]: filesystem backends, [`fakes`]: in-memory backends for tests

mod error;
pub mod fakes;
pub mod fs;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::{FsMetricLog, FsSnapshotStore};
pub use storage_traits::{MetricLog, MetricSample, SnapshotRecord, SnapshotStore, StorageResult};
