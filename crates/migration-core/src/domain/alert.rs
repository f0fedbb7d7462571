//! Typed operator alerts.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    /// Hex color used by chat cards.
    pub fn color(self) -> &'static str {
        match self {
            Severity::Critical => "#8B0000",
            Severity::High => "#FF0000",
            Severity::Medium => "#FFA500",
            Severity::Low => "#FFD700",
            Severity::Info => "#2EB886",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened. Together with the message this forms the dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    MigrationStarted,
    BatchCompleted,
    MigrationFailed,
    MigrationCompleted,
    MigrationStalled,
    HealthCheckFailed,
    HighFailureRate,
    MonitoringStopped,
    Custom(String),
}

impl AlertType {
    pub fn title(&self) -> String {
        match self {
            AlertType::MigrationStarted => "Migration Started".to_string(),
            AlertType::BatchCompleted => "Batch Completed".to_string(),
            AlertType::MigrationFailed => "Migration Failed".to_string(),
            AlertType::MigrationCompleted => "Migration Completed".to_string(),
            AlertType::MigrationStalled => "Migration Stalled".to_string(),
            AlertType::HealthCheckFailed => "Health Check Failed".to_string(),
            AlertType::HighFailureRate => "High Failure Rate".to_string(),
            AlertType::MonitoringStopped => "Monitoring Stopped".to_string(),
            AlertType::Custom(name) => name.clone(),
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertType::Custom(name) => write!(f, "custom:{name}"),
            other => {
                let title = other.title();
                f.write_str(&title.to_lowercase().replace(' ', "_"))
            }
        }
    }
}

/// An operator notification. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    /// Structured context rendered by every channel as key/value fields.
    pub data: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(alert_type: AlertType, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            alert_type,
            severity,
            message: message.into(),
            data: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach one structured field.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn title(&self) -> String {
        self.alert_type.title()
    }

    /// Structured data flattened to `(key, display value)` pairs, in key order.
    pub fn fields(&self) -> Vec<(String, String)> {
        self.data
            .iter()
            .map(|(k, v)| {
                let shown = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), shown)
            })
            .collect()
    }
}
