//! Device link
//!
//! Talks to an embedded device over TCP or Bluetooth RFCOMM. The device
//! speaks newline-delimited text; inbound lines and link changes are
//! reported as [`DeviceEvent`]s on an unbounded channel.

pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod events;
pub mod transport;

pub use config::{BluetoothConfig, LinkConfig, NetworkConfig};
pub use connection::{ConnectionController, ConnectionInfo};
pub use device::DeviceManager;
pub use error::{LinkError, Result};
pub use events::{CurrentDeviceView, DeviceEvent, EventReceiver, EventSender};
pub use transport::{DiscoveredDevice, Endpoint};

pub use device_link_shared::{Category, ConnectionState, MessageEvent, TransportKind};
