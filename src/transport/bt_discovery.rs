//! Bluetooth device discovery

use crate::error::{LinkError, Result};
use crate::transport::DiscoveredDevice;
use bluer::{Adapter, AdapterEvent, Address, Device};
use futures::StreamExt;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

/// Collect devices announced by the adapter during `scan_duration`
pub async fn discover_devices(
    adapter: &Adapter,
    scan_duration: Duration,
) -> Result<Vec<DiscoveredDevice>> {
    let mut devices = Vec::new();
    let mut seen: HashSet<Address> = HashSet::new();

    let discover = adapter
        .discover_devices()
        .await
        .map_err(|e| LinkError::Bluetooth(e.to_string()))?;
    tokio::pin!(discover);

    let scan_result = timeout(scan_duration, async {
        while let Some(evt) = discover.next().await {
            if let AdapterEvent::DeviceAdded(addr) = evt {
                if !seen.insert(addr) {
                    continue;
                }
                if let Ok(device) = adapter.device(addr) {
                    devices.push(describe(&device).await);
                }
            }
        }
    })
    .await;

    // Timeout is the normal end of a scan
    if scan_result.is_err() {
        info!("[BT] Discovery scan completed, {} device(s)", devices.len());
    }

    Ok(devices)
}

async fn describe(device: &Device) -> DiscoveredDevice {
    DiscoveredDevice {
        address: device.address().to_string(),
        name: device.name().await.ok().flatten().unwrap_or_default(),
        device_class: device.class().await.ok().flatten().unwrap_or(0),
    }
}
