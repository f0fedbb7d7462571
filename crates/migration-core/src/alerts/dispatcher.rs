//! Routes alerts to channels.
//!
//! Every [`AlertDispatcher::send`] goes through the same gates, in order:
//! severity filter, quiet hours, then dedup on `(alert_type, message)`
//! within the cooldown. Only then is the alert fanned out to all channels
//! concurrently. A channel failure is logged and reported in the outcome
//! but never stops the other channels.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::alerts::channel::{AlertChannel, ChannelKind};
use crate::alerts::chat::{SlackChannel, TeamsChannel};
use crate::alerts::console::ConsoleChannel;
use crate::alerts::email::EmailChannel;
use crate::alerts::quiet_hours::QuietHours;
use crate::clock::{Clock, SystemClock};
use crate::config::AlertSettings;
use crate::domain::{Alert, AlertType, Severity};
use crate::error::{MigrationError, Result};
use crate::metrics::METRICS;
use crate::obs;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub enabled_severities: BTreeSet<Severity>,
    pub quiet_hours: Option<QuietHours>,
    pub dedup_cooldown: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled_severities: Severity::ALL.into_iter().collect(),
            quiet_hours: None,
            dedup_cooldown: Duration::from_secs(15 * 60),
        }
    }
}

impl DispatcherConfig {
    pub fn from_settings(settings: &AlertSettings) -> Result<Self> {
        Ok(Self {
            enabled_severities: settings.enabled_severities.iter().copied().collect(),
            quiet_hours: settings
                .quiet_hours
                .as_ref()
                .map(|q| q.quiet_hours())
                .transpose()?,
            dedup_cooldown: settings.dedup_cooldown(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    SeverityDisabled,
    QuietHours,
    Duplicate,
}

/// What [`AlertDispatcher::send`] did with an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum DispatchOutcome {
    Suppressed { reason: SuppressionReason },
    /// Passed every gate but no channel is configured.
    NoChannels,
    Dispatched {
        delivered: Vec<ChannelKind>,
        failed: Vec<(ChannelKind, String)>,
    },
}

impl DispatchOutcome {
    /// At least one channel accepted the alert.
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Dispatched { delivered, .. } if !delivered.is_empty())
    }

    pub fn suppression(&self) -> Option<SuppressionReason> {
        match self {
            DispatchOutcome::Suppressed { reason } => Some(*reason),
            _ => None,
        }
    }
}

/// Counters for the end-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub delivered: u64,
    pub suppressed_severity: u64,
    pub suppressed_quiet_hours: u64,
    pub suppressed_duplicate: u64,
    /// Alerts that no channel accepted.
    pub undelivered: u64,
    pub channel_failures: u64,
}

#[derive(Default)]
struct DispatchState {
    recent: HashMap<(AlertType, String), DateTime<Utc>>,
    stats: DispatcherStats,
}

pub struct AlertDispatcher {
    config: DispatcherConfig,
    channels: Vec<Arc<dyn AlertChannel>>,
    clock: Arc<dyn Clock>,
    state: Mutex<DispatchState>,
}

impl AlertDispatcher {
    pub fn new(config: DispatcherConfig, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self {
            config,
            channels,
            clock: Arc::new(SystemClock),
            state: Mutex::new(DispatchState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the dispatcher and every enabled channel from `[alerts]`.
    pub fn from_settings(settings: &AlertSettings) -> Result<Self> {
        let config = DispatcherConfig::from_settings(settings)?;
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();

        if settings.console.enabled {
            channels.push(Arc::new(ConsoleChannel));
        }
        if settings.slack.enabled {
            let url = required_url(ChannelKind::Slack, settings.slack.webhook_url.as_deref())?;
            let channel = SlackChannel::new(url)
                .map_err(|e| MigrationError::Configuration(format!("alerts.slack: {e}")))?;
            channels.push(Arc::new(channel));
        }
        if settings.teams.enabled {
            let url = required_url(ChannelKind::Teams, settings.teams.webhook_url.as_deref())?;
            let channel = TeamsChannel::new(url)
                .map_err(|e| MigrationError::Configuration(format!("alerts.teams: {e}")))?;
            channels.push(Arc::new(channel));
        }
        if settings.email.enabled {
            let channel = EmailChannel::from_settings(&settings.email).map_err(|e| {
                MigrationError::Configuration(format!("alerts.email: {e}"))
            })?;
            channels.push(Arc::new(channel));
        }

        Ok(Self::new(config, channels))
    }

    pub fn channel_kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    pub async fn stats(&self) -> DispatcherStats {
        self.state.lock().await.stats.clone()
    }

    pub async fn send(&self, alert: Alert) -> DispatchOutcome {
        let now = self.clock.now();

        if !self.config.enabled_severities.contains(&alert.severity) {
            return self.suppress(&alert, SuppressionReason::SeverityDisabled).await;
        }
        if let Some(quiet) = &self.config.quiet_hours {
            if quiet.suppresses(alert.severity, now) {
                return self.suppress(&alert, SuppressionReason::QuietHours).await;
            }
        }

        if self.channels.is_empty() {
            debug!(alert_type = %alert.alert_type, "no alert channels configured");
            return DispatchOutcome::NoChannels;
        }

        let key = (alert.alert_type.clone(), alert.message.clone());
        if !self.reserve(&key, now).await {
            return self.suppress(&alert, SuppressionReason::Duplicate).await;
        }

        let results = join_all(self.channels.iter().map(|channel| {
            let alert = &alert;
            async move { (channel.kind(), channel.deliver(alert).await) }
        }))
        .await;

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(()) => delivered.push(kind),
                Err(e) => {
                    let err = e.into_delivery_error(kind);
                    warn!(alert_type = %alert.alert_type, error = %err, "alert channel failed");
                    failed.push((kind, err.to_string()));
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            state.stats.channel_failures += failed.len() as u64;
            if delivered.is_empty() {
                // Nothing went out, so a later identical alert may try again.
                state.recent.remove(&key);
                state.stats.undelivered += 1;
            } else {
                state.stats.delivered += 1;
                METRICS.inc_alerts_delivered();
            }
        }
        obs::emit_alert_dispatched(
            &alert.alert_type.to_string(),
            alert.severity.as_str(),
            delivered.len(),
            failed.len(),
        );

        DispatchOutcome::Dispatched { delivered, failed }
    }

    /// Claim `key` for this send unless it was sent within the cooldown.
    /// Check and claim happen under one lock, so concurrent sends of the
    /// same alert see each other. Also prunes entries older than the cooldown.
    async fn reserve(&self, key: &(AlertType, String), now: DateTime<Utc>) -> bool {
        let cooldown = chrono::Duration::from_std(self.config.dedup_cooldown)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let mut state = self.state.lock().await;
        state.recent.retain(|_, sent_at| now - *sent_at < cooldown);
        if state.recent.contains_key(key) {
            return false;
        }
        state.recent.insert(key.clone(), now);
        true
    }

    async fn suppress(&self, alert: &Alert, reason: SuppressionReason) -> DispatchOutcome {
        debug!(
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            reason = ?reason,
            "alert suppressed"
        );
        {
            let mut state = self.state.lock().await;
            match reason {
                SuppressionReason::SeverityDisabled => state.stats.suppressed_severity += 1,
                SuppressionReason::QuietHours => state.stats.suppressed_quiet_hours += 1,
                SuppressionReason::Duplicate => state.stats.suppressed_duplicate += 1,
            }
        }
        METRICS.inc_alerts_suppressed();
        DispatchOutcome::Suppressed { reason }
    }
}

fn required_url(kind: ChannelKind, url: Option<&str>) -> Result<&str> {
    url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
        MigrationError::Configuration(format!("alerts.{kind}: enabled without a webhook_url"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_url() {
        assert!(required_url(ChannelKind::Slack, None).is_err());
        assert!(required_url(ChannelKind::Slack, Some("  ")).is_err());
        assert_eq!(
            required_url(ChannelKind::Teams, Some("https://hooks.example/x")).unwrap(),
            "https://hooks.example/x"
        );
    }

    #[test]
    fn test_config_from_default_settings() {
        let config = DispatcherConfig::from_settings(&AlertSettings::default()).unwrap();
        assert_eq!(config.enabled_severities.len(), 5);
        assert!(config.quiet_hours.is_none());
        assert_eq!(config.dedup_cooldown, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_no_channels_outcome() {
        let dispatcher = AlertDispatcher::new(DispatcherConfig::default(), Vec::new());
        let outcome = dispatcher
            .send(Alert::new(AlertType::MigrationStarted, Severity::Info, "go"))
            .await;
        assert_eq!(outcome, DispatchOutcome::NoChannels);
    }
}
