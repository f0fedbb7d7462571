//! Health Monitor.
//!
//! Provides:
//! - [`probe::HealthProbe`]: one dependency check, with gateway and TCP implementations
//! - [`monitor::HealthMonitor`]: concurrent, timeout-bounded probing with retries

pub mod monitor;
pub mod probe;

use std::time::Duration;

pub use monitor::HealthMonitor;
pub use probe::{GatewayProbe, HealthProbe, NetworkProbe};

#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Bound on a single probe attempt.
    pub timeout: Duration,
    /// Attempts after the first before a probe counts as failed.
    pub retries: u32,
    /// A successful attempt slower than this is `Degraded`.
    pub degraded_latency: Duration,
    /// Consecutive failed cycles before a dependency is `Unhealthy`.
    /// Earlier failed cycles report `Degraded`.
    pub unhealthy_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            degraded_latency: Duration::from_secs(2),
            unhealthy_after: 1,
        }
    }
}
