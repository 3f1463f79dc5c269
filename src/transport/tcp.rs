//! TCP transport implementation for network-attached devices

use crate::config::NetworkConfig;
use crate::error::{LinkError, Result};
use crate::transport::traits::{BoxedStream, Endpoint, TransportConnector};
use async_trait::async_trait;
use device_link_shared::TransportKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// TCP connector for devices reachable by host and port
pub struct TcpConnector {
    config: NetworkConfig,
}

impl TcpConnector {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

#[async_trait]
impl TransportConnector for TcpConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::Network
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        self.check_endpoint(endpoint)?;
        let Endpoint::Network { host, port } = endpoint else {
            return Err(LinkError::InvalidEndpoint(endpoint.to_string()));
        };

        debug!("[TCP] Connecting to {}:{}", host, port);
        let stream = match timeout(
            self.config.connect_timeout,
            TcpStream::connect((host.as_str(), *port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(LinkError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(LinkError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.config.connect_timeout,
                })
            }
        };

        // Short command lines should not wait for Nagle
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn read_timeout(&self) -> Duration {
        self.config.read_timeout
    }

    fn read_buffer_size(&self) -> usize {
        self.config.read_buffer_size
    }
}
