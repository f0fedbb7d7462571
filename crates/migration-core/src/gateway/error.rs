//! Error types for the service gateway.

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by [`super::HttpGateway`].
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication rejected (HTTP {status})")]
    Auth { status: u16 },

    #[error("not found: {url}")]
    NotFound { url: String },

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// Connection failures and 5xx responses.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("unexpected HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_) | GatewayError::RateLimited { .. } | GatewayError::Transient(_)
        )
    }
}

/// Convenience result alias.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(GatewayError::Transient("502".into()).is_retryable());
        assert!(GatewayError::RateLimited { retry_after: None }.is_retryable());
        assert!(!GatewayError::Auth { status: 401 }.is_retryable());
        assert!(!GatewayError::NotFound { url: "/x".into() }.is_retryable());
    }
}
