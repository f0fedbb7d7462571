//! Concurrent dependency checks.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{HealthReport, HealthState, HealthStatus};
use crate::health::probe::HealthProbe;
use crate::health::HealthConfig;

pub struct HealthMonitor {
    config: HealthConfig,
    probes: Vec<Arc<dyn HealthProbe>>,
    /// Consecutive failed cycles per dependency.
    failures: Mutex<HashMap<String, u32>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            probes: Vec::new(),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&mut self, probe: Arc<dyn HealthProbe>) {
        self.probes.push(probe);
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.register(probe);
        self
    }

    pub fn dependencies(&self) -> Vec<String> {
        self.probes.iter().map(|p| p.name().to_string()).collect()
    }

    /// Probe every dependency concurrently.
    pub async fn check_all(&self) -> HealthReport {
        let mut statuses =
            join_all(self.probes.iter().map(|probe| self.check_one(probe.as_ref()))).await;

        {
            let mut failures = self.failures.lock().await;
            for status in &mut statuses {
                let streak = failures.entry(status.dependency.clone()).or_insert(0);
                if status.state == HealthState::Unhealthy {
                    *streak += 1;
                    if *streak < self.config.unhealthy_after {
                        status.state = HealthState::Degraded;
                    }
                } else {
                    *streak = 0;
                }
            }
        }

        let report = HealthReport::from_statuses(statuses);
        if report.overall {
            info!(
                dependencies = report.statuses.len(),
                degraded = ?report.degraded(),
                "health check passed"
            );
        } else {
            warn!(unhealthy = ?report.unhealthy(), "health check failed");
        }
        report
    }

    async fn check_one(&self, probe: &dyn HealthProbe) -> HealthStatus {
        let attempts = self.config.retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.config.timeout, probe.probe()).await;
            let latency = started.elapsed();
            match outcome {
                Ok(Ok(())) => {
                    let slow = latency > self.config.degraded_latency;
                    let state = if attempt == 1 && !slow {
                        HealthState::Healthy
                    } else {
                        HealthState::Degraded
                    };
                    let detail = match (slow, last_error) {
                        (true, _) => Some(format!("slow response: {}ms", latency.as_millis())),
                        (false, Some(err)) => Some(format!("recovered after retry: {err}")),
                        (false, None) => None,
                    };
                    debug!(dependency = %probe.name(), attempt, latency_ms = latency.as_millis() as u64, "probe succeeded");
                    return HealthStatus {
                        dependency: probe.name().to_string(),
                        state,
                        last_checked_at: Utc::now(),
                        latency: Some(latency),
                        detail,
                        attempts: attempt,
                    };
                }
                Ok(Err(err)) => {
                    debug!(dependency = %probe.name(), attempt, error = %err, "probe failed");
                    last_error = Some(err);
                }
                Err(_) => {
                    debug!(dependency = %probe.name(), attempt, "probe timed out");
                    last_error = Some(format!(
                        "timed out after {}ms",
                        self.config.timeout.as_millis()
                    ));
                }
            }
        }

        HealthStatus {
            dependency: probe.name().to_string(),
            state: HealthState::Unhealthy,
            last_checked_at: Utc::now(),
            latency: None,
            detail: last_error,
            attempts,
        }
    }
}
