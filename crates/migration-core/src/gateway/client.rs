//! Authenticated HTTP client for the source and target platform APIs.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::PlatformConfig;
use crate::gateway::error::{GatewayError, GatewayResult};

/// Gateway settings for one platform.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Label used in logs and health reports.
    pub name: String,
    pub base_url: String,
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retries after the first attempt for retryable failures.
    pub max_retries: u32,
    /// First backoff for transient failures; doubled on every retry.
    pub retry_base_delay: Duration,
    /// Pause after a rate-limit response without a `Retry-After` header.
    pub rate_limit_delay: Duration,
}

impl GatewayConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            rate_limit_delay: Duration::from_secs(60),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl From<&PlatformConfig> for GatewayConfig {
    fn from(platform: &PlatformConfig) -> Self {
        Self {
            token: platform.token.clone(),
            timeout: platform.timeout(),
            max_retries: platform.max_retries,
            ..GatewayConfig::new(platform.name.clone(), platform.base_url.clone())
        }
    }
}

/// JSON REST client with bounded retries.
pub struct HttpGateway {
    config: GatewayConfig,
    http_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> GatewayResult<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(GatewayError::InvalidUrl(format!(
                "{}: base_url {:?} must start with http:// or https://",
                config.name, config.base_url
            )));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("repo-migrate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Absolute URLs pass through untouched; anything else is joined onto `base_url`.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.config.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> GatewayResult<T> {
        let response = self.get_with_retry(path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))
    }

    /// GET `path`, discard the body, and return how long the successful attempt took.
    pub async fn probe(&self, path: &str) -> GatewayResult<Duration> {
        let started = Instant::now();
        self.get_once(&self.url_for(path)).await?;
        Ok(started.elapsed())
    }

    /// Confirm the credential is accepted. Auth failures are never retried.
    pub async fn verify_credentials(&self, path: &str) -> GatewayResult<()> {
        self.get_with_retry(path).await.map(|_| ())
    }

    async fn get_with_retry(&self, path: &str) -> GatewayResult<reqwest::Response> {
        let url = self.url_for(path);
        let mut attempt = 0u32;
        loop {
            match self.get_once(&url).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_for(&err, attempt);
                    warn!(
                        gateway = %self.config.name,
                        url = %url,
                        attempt = attempt + 1,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "gateway request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn backoff_for(&self, err: &GatewayError, attempt: u32) -> Duration {
        match err {
            GatewayError::RateLimited { retry_after } => {
                retry_after.unwrap_or(self.config.rate_limit_delay)
            }
            _ => self
                .config
                .retry_base_delay
                .saturating_mul(2u32.saturating_pow(attempt)),
        }
    }

    async fn get_once(&self, url: &str) -> GatewayResult<reqwest::Response> {
        let mut request = self
            .http_client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.classify_send_error(e))?;
        let status = response.status();
        debug!(gateway = %self.config.name, url = %url, status = status.as_u16(), "gateway response");

        if status.is_success() {
            return Ok(response);
        }

        let retry_after = parse_retry_after(response.headers());
        let rate_limit_exhausted = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");

        match status {
            StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited { retry_after }),
            StatusCode::FORBIDDEN if rate_limit_exhausted => {
                Err(GatewayError::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Auth {
                status: status.as_u16(),
            }),
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound {
                url: url.to_string(),
            }),
            s if s.is_server_error() => Err(GatewayError::Transient(format!("HTTP {}", s.as_u16()))),
            s => {
                let body = response.text().await.unwrap_or_default();
                Err(GatewayError::Http {
                    status: s.as_u16(),
                    body: body.chars().take(512).collect(),
                })
            }
        }
    }

    fn classify_send_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.config.timeout)
        } else if err.is_builder() {
            GatewayError::InvalidUrl(err.to_string())
        } else {
            GatewayError::Transient(err.to_string())
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
