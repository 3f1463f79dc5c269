pub mod bluetooth;
#[cfg(feature = "bluetooth")]
pub mod bt_discovery;
pub mod memory;
#[cfg(feature = "bluetooth")]
pub mod rfcomm;
pub mod tcp;
pub mod traits;

pub use bluetooth::{BluetoothConnector, DiscoveredDevice};
pub use memory::{MemoryConnector, MemoryPeers};
pub use tcp::TcpConnector;
pub use traits::{
    BoxedStream, Endpoint, Received, TransportConnector, TransportReader, TransportStream,
    TransportWriter,
};
