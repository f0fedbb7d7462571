//! Dependency health signals.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Availability classification of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    /// Reachable, but only after retries or slower than the latency budget.
    Degraded,
    Unhealthy,
}

/// Latest probe result for one dependency. Overwritten every probe cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub dependency: String,
    pub state: HealthState,
    pub last_checked_at: DateTime<Utc>,
    /// Latency of the last successful attempt.
    pub latency: Option<Duration>,
    /// Error from the last failed attempt, if any.
    pub detail: Option<String>,
    pub attempts: u32,
}

/// Result of one `check_all` pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub statuses: Vec<HealthStatus>,
    /// `true` unless some dependency is `Unhealthy`.
    pub overall: bool,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_statuses(statuses: Vec<HealthStatus>) -> Self {
        let overall = statuses.iter().all(|s| s.state != HealthState::Unhealthy);
        Self {
            statuses,
            overall,
            checked_at: Utc::now(),
        }
    }

    /// Names of dependencies currently `Unhealthy`.
    pub fn unhealthy(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|s| s.state == HealthState::Unhealthy)
            .map(|s| s.dependency.clone())
            .collect()
    }

    pub fn degraded(&self) -> Vec<String> {
        self.statuses
            .iter()
            .filter(|s| s.state == HealthState::Degraded)
            .map(|s| s.dependency.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(name: &str, state: HealthState) -> HealthStatus {
        HealthStatus {
            dependency: name.to_string(),
            state,
            last_checked_at: Utc::now(),
            latency: None,
            detail: None,
            attempts: 1,
        }
    }

    #[test]
    fn test_degraded_does_not_fail_overall() {
        let report = HealthReport::from_statuses(vec![
            status("source_api", HealthState::Healthy),
            status("target_api", HealthState::Degraded),
        ]);
        assert!(report.overall);
        assert_eq!(report.degraded(), vec!["target_api".to_string()]);
    }

    #[test]
    fn test_unhealthy_fails_overall() {
        let report = HealthReport::from_statuses(vec![
            status("source_api", HealthState::Healthy),
            status("network", HealthState::Unhealthy),
        ]);
        assert!(!report.overall);
        assert_eq!(report.unhealthy(), vec!["network".to_string()]);
    }

    #[test]
    fn test_empty_report_is_healthy() {
        assert!(HealthReport::from_statuses(vec![]).overall);
    }
}
