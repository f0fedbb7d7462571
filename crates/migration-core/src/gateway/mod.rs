//! External Service Gateway.
//!
//! Provides:
//! - [`client::HttpGateway`]: authenticated JSON client with timeouts and bounded retries
//! - [`error::GatewayError`]: typed failures (timeout, auth, not-found, rate-limited, ...)
//! - [`progress::ProgressSource`]: where the monitor loop gets migration progress from

pub mod client;
pub mod error;
pub mod progress;

pub use client::{GatewayConfig, HttpGateway};
pub use error::{GatewayError, GatewayResult};
pub use progress::{ProgressSource, TargetOrgProgress};
