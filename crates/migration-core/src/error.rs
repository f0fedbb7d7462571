//! Error taxonomy for the migration orchestrator.
//!
//! Every failure is classified along two axes: whether the run must stop
//! ([`MigrationError::is_fatal`]) and whether retrying can help
//! ([`MigrationError::is_retryable`]).

use std::time::Duration;

use crate::alerts::ChannelKind;
use crate::gateway::GatewayError;

/// Errors produced by the orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Network blip, connection reset, 5xx. Retryable.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Credential rejected. Aborts the whole run.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Remote throttled us. Retryable after a longer pause.
    #[error("rate limited{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    /// A single work item failed; retried at item granularity.
    #[error("migration of {item} failed: {reason}")]
    ItemFailed { item: String, reason: String },

    /// Invalid or missing configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// One alert channel could not deliver. Logged, never fails a send.
    #[error("{channel} delivery failed: {reason}")]
    ChannelDelivery { channel: ChannelKind, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] migration_state::StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrationError {
    /// Errors that abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MigrationError::Authentication(_) | MigrationError::Configuration(_)
        )
    }

    /// Errors that a later attempt may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MigrationError::TransientNetwork(_)
                | MigrationError::RateLimited { .. }
                | MigrationError::ItemFailed { .. }
        )
    }
}

impl From<GatewayError> for MigrationError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Auth { status } => {
                MigrationError::Authentication(format!("remote returned HTTP {status}"))
            }
            GatewayError::RateLimited { retry_after } => MigrationError::RateLimited { retry_after },
            GatewayError::InvalidUrl(detail) => MigrationError::Configuration(detail),
            other => MigrationError::TransientNetwork(other.to_string()),
        }
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_and_retryable_classification() {
        assert!(MigrationError::Authentication("bad token".into()).is_fatal());
        assert!(MigrationError::Configuration("batch_size = 0".into()).is_fatal());
        assert!(!MigrationError::TransientNetwork("reset".into()).is_fatal());

        assert!(MigrationError::RateLimited { retry_after: None }.is_retryable());
        assert!(MigrationError::ItemFailed {
            item: "org/a".into(),
            reason: "exit 1".into()
        }
        .is_retryable());
        assert!(!MigrationError::Authentication("x".into()).is_retryable());
    }

    #[test]
    fn test_rate_limited_display_includes_retry_after() {
        let err = MigrationError::RateLimited {
            retry_after: Some(Duration::from_secs(60)),
        };
        assert!(err.to_string().contains("retry after 60s"));
        let err = MigrationError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn test_gateway_auth_maps_to_fatal() {
        let err: MigrationError = GatewayError::Auth { status: 401 }.into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_channel_delivery_display() {
        let err = MigrationError::ChannelDelivery {
            channel: ChannelKind::Slack,
            reason: "HTTP 500".into(),
        };
        assert_eq!(err.to_string(), "slack delivery failed: HTTP 500");
    }
}
