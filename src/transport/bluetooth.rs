//! Bluetooth transport layer using RFCOMM
//!
//! The RFCOMM backend needs BlueZ and is compiled in with the `bluetooth`
//! feature. Without it, or without a usable adapter, the connector reports
//! itself unavailable and fails connects and scans up front.

use crate::config::BluetoothConfig;
use crate::error::{LinkError, Result};
use crate::transport::traits::{BoxedStream, Endpoint, TransportConnector};
use async_trait::async_trait;
use device_link_shared::TransportKind;
use std::time::Duration;

#[cfg(feature = "bluetooth")]
use crate::transport::rfcomm as backend;
#[cfg(not(feature = "bluetooth"))]
use self::unavailable as backend;

/// A device seen during a Bluetooth scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Bluetooth MAC address
    pub address: String,
    /// Advertised name, empty if unknown
    pub name: String,
    /// Class-of-device bits, 0 if unknown
    pub device_class: u32,
}

impl DiscoveredDevice {
    /// Name for display, falling back to the address
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }

    /// Endpoint for connecting to this device
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::bluetooth(self.address.clone(), self.name.clone())
    }
}

/// Bluetooth connector for RFCOMM serial devices
pub struct BluetoothConnector {
    config: BluetoothConfig,
}

impl BluetoothConnector {
    pub fn new(config: BluetoothConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BluetoothConfig {
        &self.config
    }
}

impl Default for BluetoothConnector {
    fn default() -> Self {
        Self::new(BluetoothConfig::default())
    }
}

#[async_trait]
impl TransportConnector for BluetoothConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::Bluetooth
    }

    async fn is_available(&self) -> bool {
        backend::is_available().await
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        self.check_endpoint(endpoint)?;
        let Endpoint::Bluetooth { address, .. } = endpoint else {
            return Err(LinkError::InvalidEndpoint(endpoint.to_string()));
        };
        backend::connect(address, endpoint, &self.config).await
    }

    fn read_timeout(&self) -> Duration {
        self.config.read_timeout
    }

    fn read_buffer_size(&self) -> usize {
        self.config.read_buffer_size
    }

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>> {
        backend::scan(&self.config).await
    }
}

#[cfg(not(feature = "bluetooth"))]
mod unavailable {
    use super::*;

    pub async fn is_available() -> bool {
        false
    }

    pub async fn connect(
        _address: &str,
        _endpoint: &Endpoint,
        _config: &BluetoothConfig,
    ) -> Result<BoxedStream> {
        Err(LinkError::BluetoothUnavailable)
    }

    pub async fn scan(_config: &BluetoothConfig) -> Result<Vec<DiscoveredDevice>> {
        Err(LinkError::BluetoothUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_device_label() {
        let named = DiscoveredDevice {
            address: "00:11:22:33:44:55".into(),
            name: "HC-05".into(),
            device_class: 0x1f00,
        };
        assert_eq!(named.label(), "HC-05");
        assert_eq!(named.endpoint().label(), "Bluetooth: HC-05");

        let unnamed = DiscoveredDevice {
            name: String::new(),
            ..named
        };
        assert_eq!(unnamed.label(), "00:11:22:33:44:55");
    }

    #[tokio::test]
    async fn test_rejects_network_endpoint() {
        let connector = BluetoothConnector::default();
        let result = connector.connect(&Endpoint::network("127.0.0.1", 8080)).await;
        assert!(matches!(result, Err(LinkError::TransportMismatch { .. })));
    }

    #[cfg(not(feature = "bluetooth"))]
    #[tokio::test]
    async fn test_unavailable_without_backend() {
        let connector = BluetoothConnector::default();
        assert!(!connector.is_available().await);

        let result = connector
            .connect(&Endpoint::bluetooth("00:11:22:33:44:55", "HC-05"))
            .await;
        assert!(matches!(result, Err(LinkError::BluetoothUnavailable)));
        assert!(matches!(connector.scan().await, Err(LinkError::BluetoothUnavailable)));
    }
}
