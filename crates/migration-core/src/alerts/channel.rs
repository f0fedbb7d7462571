//! The channel seam.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Alert;
use crate::error::MigrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Console,
    Slack,
    Teams,
    Email,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Console => "console",
            ChannelKind::Slack => "slack",
            ChannelKind::Teams => "teams",
            ChannelKind::Email => "email",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP {status}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// The alert could not be turned into a message (bad address, ...).
    #[error("cannot build message: {0}")]
    Message(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChannelError {
    pub fn into_delivery_error(self, channel: ChannelKind) -> MigrationError {
        MigrationError::ChannelDelivery {
            channel,
            reason: self.to_string(),
        }
    }
}

/// One delivery target. Every channel renders the title, severity,
/// timestamp, message and all structured data of the alert.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn deliver(&self, alert: &Alert) -> Result<(), ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_names_channel() {
        let err = ChannelError::Http {
            status: 500,
            body: "oops".into(),
        }
        .into_delivery_error(ChannelKind::Slack);
        assert_eq!(err.to_string(), "slack delivery failed: HTTP 500");
        assert!(!err.is_fatal());
    }
}
