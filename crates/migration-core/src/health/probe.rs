//! Dependency probes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::gateway::HttpGateway;

/// A single reachability check. Timeouts and retries are applied by the
/// monitor; a probe only reports whether one attempt succeeded.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    async fn probe(&self) -> Result<(), String>;
}

/// GETs a lightweight endpoint through a platform gateway.
pub struct GatewayProbe {
    name: String,
    gateway: Arc<HttpGateway>,
    path: String,
}

impl GatewayProbe {
    pub fn new(name: impl Into<String>, gateway: Arc<HttpGateway>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gateway,
            path: path.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for GatewayProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<(), String> {
        self.gateway
            .probe(&self.path)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Opens a TCP connection to `host:port`.
pub struct NetworkProbe {
    name: String,
    address: String,
}

impl NetworkProbe {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: format!("network:{address}"),
            address,
        }
    }
}

#[async_trait]
impl HealthProbe for NetworkProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<(), String> {
        TcpStream::connect(&self.address)
            .await
            .map(|_| ())
            .map_err(|e| format!("connect {}: {e}", self.address))
    }
}
