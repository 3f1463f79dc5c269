//! Device manager composing one controller per transport kind

use crate::config::LinkConfig;
use crate::connection::ConnectionController;
use crate::error::{LinkError, Result};
use crate::events::{self, CurrentDeviceView, DeviceEvent, EventReceiver, EventSender};
use crate::transport::{BluetoothConnector, Endpoint, TcpConnector, TransportConnector};
use device_link_shared::{MessageEvent, TransportKind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const BLUETOOTH_UNAVAILABLE_HINT: &str =
    "Bluetooth is not available on this host (build with the `bluetooth` feature and enable BlueZ)";

/// Owns the network and Bluetooth controllers and decides which one is
/// the current device.
///
/// Controller events are relayed unchanged to the receiver returned by
/// the constructor. Every status change is followed by a
/// `CurrentDeviceChanged` event carrying the recomputed view.
pub struct DeviceManager {
    network: Arc<ConnectionController>,
    bluetooth: Arc<ConnectionController>,
    events: EventSender,
    relay: JoinHandle<()>,
}

impl DeviceManager {
    /// Create a manager with the TCP and RFCOMM transports
    pub fn new(config: LinkConfig) -> (Self, EventReceiver) {
        Self::build(
            Arc::new(TcpConnector::new(config.network)),
            Arc::new(BluetoothConnector::new(config.bluetooth)),
        )
    }

    /// Create a manager over custom connectors, one of each kind
    pub fn with_connectors(
        network: Arc<dyn TransportConnector>,
        bluetooth: Arc<dyn TransportConnector>,
    ) -> Result<(Self, EventReceiver)> {
        for (connector, expected) in [
            (&network, TransportKind::Network),
            (&bluetooth, TransportKind::Bluetooth),
        ] {
            if connector.kind() != expected {
                return Err(LinkError::TransportMismatch {
                    expected,
                    actual: connector.kind(),
                });
            }
        }
        Ok(Self::build(network, bluetooth))
    }

    fn build(
        network: Arc<dyn TransportConnector>,
        bluetooth: Arc<dyn TransportConnector>,
    ) -> (Self, EventReceiver) {
        let (controller_tx, controller_rx) = events::channel();
        let (events_tx, events_rx) = events::channel();

        let network = Arc::new(ConnectionController::new(network, controller_tx.clone()));
        let bluetooth = Arc::new(ConnectionController::new(bluetooth, controller_tx));

        let relay = tokio::spawn(relay_events(
            controller_rx,
            events_tx.clone(),
            network.clone(),
            bluetooth.clone(),
        ));

        let manager = Self {
            network,
            bluetooth,
            events: events_tx,
            relay,
        };
        (manager, events_rx)
    }

    /// Controller for one transport kind
    pub fn controller(&self, kind: TransportKind) -> &ConnectionController {
        match kind {
            TransportKind::Network => &self.network,
            TransportKind::Bluetooth => &self.bluetooth,
        }
    }

    /// Connect the controller matching the endpoint's kind
    pub async fn connect(&self, endpoint: Endpoint) -> Result<()> {
        self.controller(endpoint.kind()).connect(endpoint).await
    }

    pub async fn connect_network(&self, host: impl Into<String>, port: u16) -> Result<()> {
        self.connect(Endpoint::network(host, port)).await
    }

    pub async fn connect_bluetooth(
        &self,
        address: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<()> {
        self.connect(Endpoint::bluetooth(address, name)).await
    }

    /// Send to the connected device, preferring the network link
    pub async fn send(&self, text: &str) -> Result<()> {
        if self.network.is_connected().await {
            return self.network.send(text).await;
        }
        if self.bluetooth.is_connected().await {
            return self.bluetooth.send(text).await;
        }
        Err(LinkError::NotConnected)
    }

    /// Close both controllers, whatever their state
    pub async fn disconnect_all(&self) {
        futures::join!(self.network.close(), self.bluetooth.close());
    }

    pub async fn is_connected(&self) -> bool {
        self.network.is_connected().await || self.bluetooth.is_connected().await
    }

    pub async fn current_device(&self) -> CurrentDeviceView {
        current_view(&self.network, &self.bluetooth).await
    }

    pub async fn is_bluetooth_available(&self) -> bool {
        self.bluetooth.connector().is_available().await
    }

    /// Scan for Bluetooth devices in the background.
    ///
    /// The result arrives as a `DevicesFound` event. When Bluetooth is
    /// unavailable the list is empty and a hint is logged as a system
    /// message.
    pub fn scan_bluetooth_devices(&self) -> JoinHandle<()> {
        let connector = self.bluetooth.connector().clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            if !connector.is_available().await {
                report_unavailable(&events);
                return;
            }

            match connector.scan().await {
                Ok(devices) => {
                    info!("[BT] Scan found {} device(s)", devices.len());
                    let _ = events.send(DeviceEvent::DevicesFound(devices));
                }
                Err(LinkError::BluetoothUnavailable) => report_unavailable(&events),
                Err(e) => {
                    warn!("[BT] Scan failed: {}", e);
                    let _ = events.send(DeviceEvent::Message {
                        kind: TransportKind::Bluetooth,
                        message: MessageEvent::error(format!("Bluetooth scan failed: {}", e)),
                    });
                }
            }
        })
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

fn report_unavailable(events: &EventSender) {
    let _ = events.send(DeviceEvent::Message {
        kind: TransportKind::Bluetooth,
        message: MessageEvent::system(BLUETOOTH_UNAVAILABLE_HINT),
    });
    let _ = events.send(DeviceEvent::DevicesFound(Vec::new()));
}

async fn current_view(
    network: &ConnectionController,
    bluetooth: &ConnectionController,
) -> CurrentDeviceView {
    if let Some(label) = network.connected_label().await {
        return CurrentDeviceView::connected(TransportKind::Network, label);
    }
    if let Some(label) = bluetooth.connected_label().await {
        return CurrentDeviceView::connected(TransportKind::Bluetooth, label);
    }
    CurrentDeviceView::none()
}

/// Forward controller events and recompute the view on status changes
async fn relay_events(
    mut controller_rx: EventReceiver,
    events: EventSender,
    network: Arc<ConnectionController>,
    bluetooth: Arc<ConnectionController>,
) {
    while let Some(event) = controller_rx.recv().await {
        let status_changed = matches!(event, DeviceEvent::StatusChanged { .. });
        if events.send(event).is_err() {
            break;
        }
        if status_changed {
            let view = current_view(&network, &bluetooth).await;
            let _ = events.send(DeviceEvent::CurrentDeviceChanged(view));
        }
    }
}
