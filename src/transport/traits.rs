//! Transport trait abstraction for pluggable device links

use crate::error::{LinkError, Result};
use crate::transport::DiscoveredDevice;
use async_trait::async_trait;
use bytes::Bytes;
use device_link_shared::TransportKind;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::timeout;

/// Where to connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Stream socket to host:port
    Network { host: String, port: u16 },
    /// RFCOMM socket to a device address, with a display name
    Bluetooth { address: String, name: String },
}

impl Endpoint {
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        Self::Network {
            host: host.into(),
            port,
        }
    }

    /// Bluetooth endpoint; an empty name falls back to the address
    pub fn bluetooth(address: impl Into<String>, name: impl Into<String>) -> Self {
        let address = address.into();
        let mut name = name.into();
        if name.trim().is_empty() {
            name = address.clone();
        }
        Self::Bluetooth { address, name }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Endpoint::Network { .. } => TransportKind::Network,
            Endpoint::Bluetooth { .. } => TransportKind::Bluetooth,
        }
    }

    /// Label shown while connected, e.g. "Network: 192.168.4.1:8080"
    pub fn label(&self) -> String {
        match self {
            Endpoint::Network { host, port } => format!("Network: {}:{}", host, port),
            Endpoint::Bluetooth { name, .. } => format!("Bluetooth: {}", name),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Network { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Bluetooth { address, name } if name != address => {
                write!(f, "{} ({})", name, address)
            }
            Endpoint::Bluetooth { address, .. } => write!(f, "{}", address),
        }
    }
}

/// A byte stream to a device
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> TransportStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub type BoxedStream = Box<dyn TransportStream>;

/// Factory for device connections of one transport kind
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// The kind of endpoint this connector accepts
    fn kind(&self) -> TransportKind;

    /// Whether the host can use this transport at all
    async fn is_available(&self) -> bool {
        true
    }

    /// Open a stream, bounded by the transport's connect timeout
    async fn connect(&self, endpoint: &Endpoint) -> Result<BoxedStream>;

    /// Bound on each read of the receive loop
    fn read_timeout(&self) -> Duration;

    /// Bytes requested per read
    fn read_buffer_size(&self) -> usize {
        device_link_shared::timeouts::READ_BUFFER_SIZE
    }

    /// Discover nearby devices
    async fn scan(&self) -> Result<Vec<DiscoveredDevice>> {
        Err(LinkError::ScanUnsupported(self.kind()))
    }

    /// Reject endpoints of the wrong kind
    fn check_endpoint(&self, endpoint: &Endpoint) -> Result<()> {
        if endpoint.kind() == self.kind() {
            Ok(())
        } else {
            Err(LinkError::TransportMismatch {
                expected: self.kind(),
                actual: endpoint.kind(),
            })
        }
    }
}

/// Outcome of one bounded read
#[derive(Debug)]
pub enum Received {
    Data(Bytes),
    /// Remote closed the stream
    Eof,
    /// Nothing arrived within the read timeout
    TimedOut,
    Failed(io::Error),
}

/// Receiving half of an open transport
pub struct TransportReader {
    inner: ReadHalf<BoxedStream>,
    read_buf: Vec<u8>,
    read_timeout: Duration,
}

impl TransportReader {
    /// Wait up to the read timeout for the next chunk
    pub async fn receive_chunk(&mut self) -> Received {
        match timeout(self.read_timeout, self.inner.read(&mut self.read_buf)).await {
            Ok(Ok(0)) => Received::Eof,
            Ok(Ok(n)) => Received::Data(Bytes::copy_from_slice(&self.read_buf[..n])),
            Ok(Err(e)) => Received::Failed(e),
            Err(_) => Received::TimedOut,
        }
    }
}

/// Sending half of an open transport
pub struct TransportWriter {
    inner: WriteHalf<BoxedStream>,
    write_timeout: Duration,
}

impl TransportWriter {
    /// Write all bytes and flush
    pub async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        let limit = self.write_timeout;
        let inner = &mut self.inner;
        let write = async move {
            inner.write_all(payload).await?;
            inner.flush().await
        };
        match timeout(limit, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        }
    }

    /// Shut down the write side; the socket closes once both halves drop
    pub async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Split a stream into the halves used by the send path and the receive loop
pub fn split(
    stream: BoxedStream,
    read_timeout: Duration,
    read_buffer_size: usize,
) -> (TransportReader, TransportWriter) {
    let (reader, writer) = tokio::io::split(stream);
    (
        TransportReader {
            inner: reader,
            read_buf: vec![0u8; read_buffer_size.max(1)],
            read_timeout,
        },
        TransportWriter {
            inner: writer,
            write_timeout: read_timeout,
        },
    )
}
