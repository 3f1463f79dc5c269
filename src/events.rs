//! Events delivered to the presentation layer
//!
//! Events travel over unbounded channels, so they can be emitted from the
//! background receive loops and the caller's task alike without blocking.

use crate::transport::DiscoveredDevice;
use device_link_shared::{MessageEvent, TransportKind};
use tokio::sync::mpsc;

/// Label of the current-device view when nothing is connected
pub const NOT_CONNECTED_LABEL: &str = "Not connected";

/// Events emitted by connection controllers and the device manager
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// A line for the message log
    Message {
        kind: TransportKind,
        message: MessageEvent,
    },
    /// A controller connected or disconnected
    StatusChanged {
        kind: TransportKind,
        connected: bool,
        label: String,
    },
    /// Result of a Bluetooth scan (possibly empty)
    DevicesFound(Vec<DiscoveredDevice>),
    /// The device manager recomputed its current device
    CurrentDeviceChanged(CurrentDeviceView),
}

pub type EventSender = mpsc::UnboundedSender<DeviceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DeviceEvent>;

/// Create a new event channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Which device, if any, outbound messages go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDeviceView {
    pub kind: Option<TransportKind>,
    pub label: String,
    pub connected: bool,
}

impl CurrentDeviceView {
    pub fn connected(kind: TransportKind, label: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            label: label.into(),
            connected: true,
        }
    }

    pub fn none() -> Self {
        Self {
            kind: None,
            label: NOT_CONNECTED_LABEL.into(),
            connected: false,
        }
    }
}

impl Default for CurrentDeviceView {
    fn default() -> Self {
        Self::none()
    }
}
