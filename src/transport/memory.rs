//! In-memory transport
//!
//! Each successful connect creates a `tokio::io::duplex` pipe, returns one
//! end to the caller and hands the other end to [`MemoryPeers`], which
//! plays the remote device. Used by the crate's tests and handy for
//! driving the controller without hardware.

use crate::error::{LinkError, Result};
use crate::transport::traits::{BoxedStream, Endpoint, TransportConnector};
use crate::transport::DiscoveredDevice;
use async_trait::async_trait;
use device_link_shared::TransportKind;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

/// Capacity of each direction of the pipe
const PIPE_CAPACITY: usize = 4096;

/// Connector producing in-memory streams
pub struct MemoryConnector {
    kind: TransportKind,
    read_timeout: Duration,
    available: AtomicBool,
    refuse: AtomicBool,
    connect_delay_ms: AtomicU64,
    connects: AtomicUsize,
    devices: Mutex<Vec<DiscoveredDevice>>,
    peer_tx: mpsc::UnboundedSender<DuplexStream>,
}

/// Remote ends of the pipes opened by a [`MemoryConnector`]
pub struct MemoryPeers {
    peer_rx: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryPeers {
    /// Wait for the next connection's remote end
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.peer_rx.recv().await
    }
}

impl MemoryConnector {
    pub fn new(kind: TransportKind, read_timeout: Duration) -> (Self, MemoryPeers) {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let connector = Self {
            kind,
            read_timeout,
            available: AtomicBool::new(true),
            refuse: AtomicBool::new(false),
            connect_delay_ms: AtomicU64::new(0),
            connects: AtomicUsize::new(0),
            devices: Mutex::new(Vec::new()),
            peer_tx,
        };
        (connector, MemoryPeers { peer_rx })
    }

    /// Report the transport as missing from the host
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Refuse further connection attempts
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Delay each connect attempt
    pub fn set_connect_delay(&self, delay: Duration) {
        self.connect_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Devices returned by scans
    pub fn set_devices(&self, devices: Vec<DiscoveredDevice>) {
        if let Ok(mut guard) = self.devices.lock() {
            *guard = devices;
        }
    }

    /// Number of connect attempts that reached the transport
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn unavailable(&self, endpoint: &Endpoint) -> LinkError {
        match self.kind {
            TransportKind::Bluetooth => LinkError::BluetoothUnavailable,
            TransportKind::Network => LinkError::Connect {
                endpoint: endpoint.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "transport unavailable"),
            },
        }
    }
}

#[async_trait]
impl TransportConnector for MemoryConnector {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedStream> {
        self.check_endpoint(endpoint)?;
        if !self.available.load(Ordering::SeqCst) {
            return Err(self.unavailable(endpoint));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = self.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.refuse.load(Ordering::SeqCst) {
            return Err(LinkError::Connect {
                endpoint: endpoint.to_string(),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            });
        }

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        // A dropped MemoryPeers just means the remote end closes at once
        let _ = self.peer_tx.send(remote);
        Ok(Box::new(local))
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    async fn scan(&self) -> Result<Vec<DiscoveredDevice>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LinkError::BluetoothUnavailable);
        }
        Ok(self
            .devices
            .lock()
            .map(|devices| devices.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_hands_out_remote_end() {
        let (connector, mut peers) =
            MemoryConnector::new(TransportKind::Network, Duration::from_millis(50));
        let mut stream = connector
            .connect(&Endpoint::network("device", 1))
            .await
            .unwrap();
        let mut remote = peers.accept().await.unwrap();

        remote.write_all(b"hello\n").await.unwrap();
        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
        assert_eq!(connector.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_and_unavailable() {
        let (connector, _peers) =
            MemoryConnector::new(TransportKind::Bluetooth, Duration::from_millis(50));
        let endpoint = Endpoint::bluetooth("00:11:22:33:44:55", "");

        connector.set_refuse(true);
        assert!(matches!(
            connector.connect(&endpoint).await,
            Err(LinkError::Connect { .. })
        ));

        connector.set_available(false);
        assert!(matches!(
            connector.connect(&endpoint).await,
            Err(LinkError::BluetoothUnavailable)
        ));
        assert_eq!(connector.connect_count(), 1);
    }
}
