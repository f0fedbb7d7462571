//! Slack and Microsoft Teams incoming-webhook channels.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::alerts::channel::{AlertChannel, ChannelError, ChannelKind};
use crate::domain::Alert;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

fn webhook_client() -> Result<reqwest::Client, ChannelError> {
    reqwest::Client::builder()
        .user_agent(concat!("repo-migrate/", env!("CARGO_PKG_VERSION")))
        .timeout(WEBHOOK_TIMEOUT)
        .build()
        .map_err(|e| ChannelError::Transport(e.to_string()))
}

async fn post_json(client: &reqwest::Client, url: &str, payload: &Value) -> Result<(), ChannelError> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChannelError::Http {
        status: status.as_u16(),
        body: body.chars().take(256).collect(),
    })
}

pub struct SlackChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, ChannelError> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            client: webhook_client()?,
        })
    }

    /// Attachment-style message colored by severity.
    pub fn payload(alert: &Alert) -> Value {
        let mut fields = vec![json!({
            "title": "Severity",
            "value": alert.severity.as_str().to_uppercase(),
            "short": true,
        })];
        fields.extend(alert.fields().into_iter().map(|(key, value)| {
            json!({ "title": key, "value": value, "short": true })
        }));

        json!({
            "text": alert.title(),
            "attachments": [{
                "color": alert.severity.color(),
                "title": alert.title(),
                "text": alert.message,
                "fields": fields,
                "footer": "repo-migrate",
                "ts": alert.timestamp.timestamp(),
            }],
        })
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Slack
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        post_json(&self.client, &self.webhook_url, &Self::payload(alert)).await
    }
}

pub struct TeamsChannel {
    webhook_url: String,
    client: reqwest::Client,
}

impl TeamsChannel {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, ChannelError> {
        Ok(Self {
            webhook_url: webhook_url.into(),
            client: webhook_client()?,
        })
    }

    /// Legacy connector `MessageCard`.
    pub fn payload(alert: &Alert) -> Value {
        let mut facts = vec![
            json!({ "name": "Severity", "value": alert.severity.as_str().to_uppercase() }),
            json!({ "name": "Time", "value": alert.timestamp.to_rfc3339() }),
        ];
        facts.extend(
            alert
                .fields()
                .into_iter()
                .map(|(key, value)| json!({ "name": key, "value": value })),
        );

        json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "themeColor": alert.severity.color().trim_start_matches('#'),
            "summary": alert.title(),
            "title": alert.title(),
            "sections": [{
                "activityTitle": alert.title(),
                "activitySubtitle": alert.timestamp.to_rfc3339(),
                "text": alert.message,
                "facts": facts,
            }],
        })
    }
}

#[async_trait]
impl AlertChannel for TeamsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Teams
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError> {
        post_json(&self.client, &self.webhook_url, &Self::payload(alert)).await
    }
}
