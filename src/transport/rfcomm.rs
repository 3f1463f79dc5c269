//! RFCOMM backend for Bluetooth connections

use crate::config::BluetoothConfig;
use crate::error::{LinkError, Result};
use crate::transport::bt_discovery;
use crate::transport::traits::{BoxedStream, Endpoint};
use crate::transport::DiscoveredDevice;
use bluer::rfcomm::{SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Adapter, Address};
use tokio::time::timeout;
use tracing::{debug, info};

/// Get the default Bluetooth adapter, powered on
pub async fn default_adapter() -> Result<Adapter> {
    let session = bluer::Session::new().await.map_err(|e| {
        debug!("[BT] No Bluetooth session: {}", e);
        LinkError::BluetoothUnavailable
    })?;
    let adapter = session.default_adapter().await.map_err(|e| {
        debug!("[BT] No default adapter: {}", e);
        LinkError::BluetoothUnavailable
    })?;
    adapter
        .set_powered(true)
        .await
        .map_err(|e| LinkError::Bluetooth(e.to_string()))?;
    Ok(adapter)
}

pub async fn is_available() -> bool {
    default_adapter().await.is_ok()
}

/// Open an RFCOMM stream to `address` on the configured channel
pub async fn connect(
    address: &str,
    endpoint: &Endpoint,
    config: &BluetoothConfig,
) -> Result<BoxedStream> {
    let target: Address = address
        .parse()
        .map_err(|_| LinkError::InvalidEndpoint(address.to_string()))?;

    // Fail before any socket I/O when the host has no adapter
    default_adapter().await?;

    let socket_addr = RfcommAddr::new(target, config.channel);
    info!("[BT] Connecting to {} channel {}", target, config.channel);

    match timeout(config.connect_timeout, RfcommStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => {
            info!("[BT] Connected to {}", target);
            Ok(Box::new(stream))
        }
        Ok(Err(source)) => Err(LinkError::Connect {
            endpoint: endpoint.to_string(),
            source,
        }),
        Err(_) => Err(LinkError::Timeout {
            endpoint: endpoint.to_string(),
            timeout: config.connect_timeout,
        }),
    }
}

/// Scan for nearby devices for the configured duration
pub async fn scan(config: &BluetoothConfig) -> Result<Vec<DiscoveredDevice>> {
    let adapter = default_adapter().await?;
    bt_discovery::discover_devices(&adapter, config.scan_duration).await
}
