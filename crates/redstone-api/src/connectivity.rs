//! TCP reachability probe
//!
//! Opens (and immediately drops) a TCP connection to the API host. A
//! successful connect is taken as "online"; anything else, including DNS
//! failure, is "offline".

use std::time::Duration;

use anyhow::{Context, Result};
use redstone_core::ports::IConnectivity;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

/// `IConnectivity` implementation probing the API host over TCP
#[derive(Debug, Clone)]
pub struct TcpConnectivityProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpConnectivityProbe {
    /// Creates a probe for the host and port of `base_url`
    pub fn from_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
        let host = url
            .host_str()
            .with_context(|| format!("Base URL has no host: {base_url}"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .with_context(|| format!("Base URL has no port: {base_url}"))?;

        Ok(Self {
            host,
            port,
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait::async_trait]
impl IConnectivity for TcpConnectivityProbe {
    async fn is_online(&self) -> bool {
        let target = (self.host.as_str(), self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.host, port = self.port, error = %e, "Connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(host = %self.host, port = self.port, "Connectivity probe timed out");
                false
            }
        }
    }
}
