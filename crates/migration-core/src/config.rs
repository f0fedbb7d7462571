//! Startup configuration.
//!
//! Read once from a TOML file, overlaid with secrets from the environment,
//! validated, and then handed to each component as an immutable value.
//!
//! ```toml
//! state_dir = ".repo-migrate"
//!
//! [source]
//! name = "azure-devops"
//! base_url = "https://dev.azure.com/contoso"
//! health_path = "/_apis/projects?$top=1"
//!
//! [target]
//! name = "github"
//! base_url = "https://api.github.com"
//! organization = "contoso"
//! health_path = "/rate_limit"
//!
//! [batch]
//! batch_size = 10
//! retry_count = 3
//! command = ["gh", "ado2gh", "migrate-repo", "--ado-repo", "{source}", "--github-repo", "{target}"]
//!
//! [alerts.quiet_hours]
//! start = "22:00"
//! end = "07:00"
//! allow_critical = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alerts::QuietHours;
use crate::batch::{BatchConfig, RetryBackoff};
use crate::domain::Severity;
use crate::error::{MigrationError, Result};
use crate::health::HealthConfig;
use crate::orchestrator::MonitorConfig;

pub const ENV_SOURCE_TOKEN: &str = "MIGRATION_SOURCE_TOKEN";
pub const ENV_TARGET_TOKEN: &str = "MIGRATION_TARGET_TOKEN";
pub const ENV_SLACK_WEBHOOK: &str = "MIGRATION_SLACK_WEBHOOK";
pub const ENV_TEAMS_WEBHOOK: &str = "MIGRATION_TEAMS_WEBHOOK";
pub const ENV_SMTP_PASSWORD: &str = "MIGRATION_SMTP_PASSWORD";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Directory for the metric log and snapshots.
    pub state_dir: PathBuf,
    pub source: PlatformConfig,
    pub target: PlatformConfig,
    pub batch: BatchSettings,
    pub health: HealthSettings,
    pub alerts: AlertSettings,
    pub monitor: MonitorSettings,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".repo-migrate"),
            source: PlatformConfig {
                name: "source".to_string(),
                ..PlatformConfig::default()
            },
            target: PlatformConfig {
                name: "target".to_string(),
                ..PlatformConfig::default()
            },
            batch: BatchSettings::default(),
            health: HealthSettings::default(),
            alerts: AlertSettings::default(),
            monitor: MonitorSettings::default(),
        }
    }
}

/// Connection settings for one REST platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub name: String,
    pub base_url: String,
    /// Bearer token. Normally supplied through the environment.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Organization whose repositories count as migrated (target side).
    pub organization: Option<String>,
    /// Path requested by the health probe.
    pub health_path: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: String::new(),
            token: None,
            organization: None,
            health_path: "/".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub retry_count: u32,
    pub batch_delay_secs: u64,
    pub retry_delay_secs: u64,
    pub backoff: BackoffKind,
    pub backoff_factor: f64,
    pub max_retry_delay_secs: u64,
    /// Per-item timeout for the migration command; 0 disables it.
    pub item_timeout_secs: u64,
    /// Migration command template. `{id}`, `{source}` and `{target}` are substituted.
    pub command: Vec<String>,
    /// Text that must appear in stdout for a zero exit to count as success.
    pub completion_marker: Option<String>,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            retry_count: 3,
            batch_delay_secs: 5,
            retry_delay_secs: 30,
            backoff: BackoffKind::Fixed,
            backoff_factor: 2.0,
            max_retry_delay_secs: 600,
            item_timeout_secs: 3600,
            command: Vec::new(),
            completion_marker: None,
        }
    }
}

impl BatchSettings {
    pub fn executor_config(&self) -> BatchConfig {
        let retry_delay = Duration::from_secs(self.retry_delay_secs);
        BatchConfig {
            batch_size: self.batch_size,
            retry_count: self.retry_count,
            batch_delay: Duration::from_secs(self.batch_delay_secs),
            backoff: match self.backoff {
                BackoffKind::Fixed => RetryBackoff::Fixed(retry_delay),
                BackoffKind::Exponential => RetryBackoff::Exponential {
                    initial: retry_delay,
                    factor: self.backoff_factor,
                    max: Duration::from_secs(self.max_retry_delay_secs),
                },
            },
            item_timeout: (self.item_timeout_secs > 0)
                .then(|| Duration::from_secs(self.item_timeout_secs)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub timeout_secs: u64,
    pub retries: u32,
    pub degraded_latency_ms: u64,
    /// Consecutive failed cycles before a dependency reports `Unhealthy`.
    pub unhealthy_after: u32,
    /// `host:port` pairs probed with a TCP connect.
    pub network_targets: Vec<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 2,
            degraded_latency_ms: 2000,
            unhealthy_after: 1,
            network_targets: vec!["github.com:443".to_string()],
        }
    }
}

impl HealthSettings {
    pub fn monitor_config(&self) -> HealthConfig {
        HealthConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            degraded_latency: Duration::from_millis(self.degraded_latency_ms),
            unhealthy_after: self.unhealthy_after.max(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHoursSettings {
    /// `HH:MM`
    pub start: String,
    /// `HH:MM`
    pub end: String,
    pub allow_critical: bool,
    /// Offset of the operators' wall clock from UTC.
    pub utc_offset_minutes: i32,
}

impl Default for QuietHoursSettings {
    fn default() -> Self {
        Self {
            start: "22:00".to_string(),
            end: "07:00".to_string(),
            allow_critical: true,
            utc_offset_minutes: 0,
        }
    }
}

impl QuietHoursSettings {
    pub fn quiet_hours(&self) -> Result<QuietHours> {
        let parse = |field: &str, value: &str| {
            NaiveTime::parse_from_str(value, "%H:%M").map_err(|e| {
                MigrationError::Configuration(format!(
                    "alerts.quiet_hours.{field} = {value:?}: {e}"
                ))
            })
        };
        let start = parse("start", &self.start)?;
        let end = parse("end", &self.end)?;
        QuietHours::new(start, end, self.allow_critical, self.utc_offset_minutes)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub enabled: bool,
    #[serde(skip_serializing)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub enabled: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub starttls: bool,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub from: String,
    pub to: Vec<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            starttls: true,
            username: None,
            password: None,
            from: String::new(),
            to: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub enabled_severities: Vec<Severity>,
    pub quiet_hours: Option<QuietHoursSettings>,
    pub dedup_cooldown_minutes: u64,
    pub console: ConsoleSettings,
    pub slack: WebhookSettings,
    pub teams: WebhookSettings,
    pub email: EmailSettings,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled_severities: Severity::ALL.to_vec(),
            quiet_hours: None,
            dedup_cooldown_minutes: 15,
            console: ConsoleSettings::default(),
            slack: WebhookSettings::default(),
            teams: WebhookSettings::default(),
            email: EmailSettings::default(),
        }
    }
}

impl AlertSettings {
    pub fn dedup_cooldown(&self) -> Duration {
        Duration::from_secs(self.dedup_cooldown_minutes * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_secs: u64,
    pub continuous: bool,
    pub max_runtime_minutes: Option<u64>,
    pub stalled_threshold_minutes: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            continuous: true,
            max_runtime_minutes: None,
            stalled_threshold_minutes: 30,
        }
    }
}

impl MonitorSettings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.interval_secs),
            continuous: self.continuous,
            max_runtime: self.max_runtime_minutes.map(|m| Duration::from_secs(m * 60)),
        }
    }

    pub fn stalled_threshold(&self) -> Duration {
        Duration::from_secs(self.stalled_threshold_minutes * 60)
    }
}

impl MigrationConfig {
    /// Load `path` if it exists (defaults otherwise), apply environment
    /// overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            info!(path = %path.display(), "loaded configuration");
            Self::from_toml_str(&text)?
        } else {
            warn!(path = %path.display(), "configuration file not found, using defaults");
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MigrationError::Configuration(e.to_string()))
    }

    /// Overlay secrets from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay secrets using `lookup` as the environment.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_SOURCE_TOKEN) {
            self.source.token = Some(token);
        }
        if let Some(token) = lookup(ENV_TARGET_TOKEN) {
            self.target.token = Some(token);
        }
        if let Some(url) = lookup(ENV_SLACK_WEBHOOK) {
            self.alerts.slack.webhook_url = Some(url);
        }
        if let Some(url) = lookup(ENV_TEAMS_WEBHOOK) {
            self.alerts.teams.webhook_url = Some(url);
        }
        if let Some(password) = lookup(ENV_SMTP_PASSWORD) {
            self.alerts.email.password = Some(password);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MigrationError::Configuration(msg));

        if self.batch.batch_size == 0 {
            return fail("batch.batch_size must be at least 1".to_string());
        }
        if self.batch.backoff == BackoffKind::Exponential && self.batch.backoff_factor < 1.0 {
            return fail("batch.backoff_factor must be >= 1.0".to_string());
        }
        if self.batch.retry_delay_secs < self.batch.batch_delay_secs {
            warn!(
                retry_delay_secs = self.batch.retry_delay_secs,
                batch_delay_secs = self.batch.batch_delay_secs,
                "retry delay is shorter than the inter-batch delay"
            );
        }
        if self.monitor.interval_secs == 0 {
            return fail("monitor.interval_secs must be at least 1".to_string());
        }

        let alerts = &self.alerts;
        if alerts.enabled_severities.is_empty() {
            warn!("alerts.enabled_severities is empty, every alert will be dropped");
        }
        if let Some(quiet) = &alerts.quiet_hours {
            quiet.quiet_hours()?;
        }
        if alerts.slack.enabled && alerts.slack.webhook_url.is_none() {
            return fail(format!("slack is enabled but {ENV_SLACK_WEBHOOK} is not set"));
        }
        if alerts.teams.enabled && alerts.teams.webhook_url.is_none() {
            return fail(format!("teams is enabled but {ENV_TEAMS_WEBHOOK} is not set"));
        }
        let email = &alerts.email;
        if email.enabled && (email.smtp_host.is_empty() || email.from.is_empty() || email.to.is_empty())
        {
            return fail("email is enabled but smtp_host, from or to is missing".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MigrationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.alerts.dedup_cooldown(), Duration::from_secs(900));
        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.batch.retry_count, 3);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MigrationConfig::from_toml_str(
            r#"
            [batch]
            batch_size = 4
            backoff = "exponential"

            [alerts]
            enabled_severities = ["critical", "high"]

            [alerts.quiet_hours]
            start = "23:30"
            end = "06:00"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch.batch_size, 4);
        assert_eq!(config.batch.retry_count, 3);
        assert_eq!(
            config.alerts.enabled_severities,
            vec![Severity::Critical, Severity::High]
        );
        let quiet = config.alerts.quiet_hours.as_ref().unwrap();
        assert!(quiet.allow_critical);
        assert!(quiet.quiet_hours().is_ok());

        let exec = config.batch.executor_config();
        assert!(matches!(exec.backoff, RetryBackoff::Exponential { .. }));
    }

    #[test]
    fn test_zero_batch_size_is_configuration_error() {
        let mut config = MigrationConfig::default();
        config.batch.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_enabled_webhook_requires_url() {
        let mut config = MigrationConfig::default();
        config.alerts.slack.enabled = true;
        assert!(config.validate().is_err());

        config.apply_env_from(|key| {
            (key == ENV_SLACK_WEBHOOK).then(|| "https://hooks.example/T0".to_string())
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_quiet_hours_rejected() {
        let mut config = MigrationConfig::default();
        config.alerts.quiet_hours = Some(QuietHoursSettings {
            start: "25:00".to_string(),
            ..QuietHoursSettings::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tokens_never_serialized() {
        let mut config = MigrationConfig::default();
        config.apply_env_from(|key| (key == ENV_TARGET_TOKEN).then(|| "ghp_secret".to_string()));
        assert_eq!(config.target.token.as_deref(), Some("ghp_secret"));
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("ghp_secret"));
    }

    #[test]
    fn test_item_timeout_zero_disables() {
        let mut settings = BatchSettings::default();
        settings.item_timeout_secs = 0;
        assert!(settings.executor_config().item_timeout.is_none());
    }
}
