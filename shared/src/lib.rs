//! Device Link Shared Types
//!
//! This crate provides the transport-independent pieces shared by the
//! device-link library, console and device emulator: newline framing,
//! the connection state machine and the message event model.

pub mod codec;
pub mod state_machine;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub use state_machine::ConnectionState;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Timing parameters for the two transports
pub mod timeouts {
    /// Network connect timeout in milliseconds
    pub const NETWORK_CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Network per-read timeout; expiry only re-polls the receive loop
    pub const NETWORK_READ_TIMEOUT_MS: u64 = 5000;

    /// Bluetooth RFCOMM connect timeout in milliseconds
    pub const BLUETOOTH_CONNECT_TIMEOUT_MS: u64 = 10000;

    /// Bluetooth per-read timeout in milliseconds
    pub const BLUETOOTH_READ_TIMEOUT_MS: u64 = 10000;

    /// How long a Bluetooth device scan runs
    pub const BLUETOOTH_SCAN_DURATION_MS: u64 = 8000;

    /// Size of a single receive buffer
    pub const READ_BUFFER_SIZE: usize = 1024;
}

/// Available transport kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Network,
    Bluetooth,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Network => write!(f, "Network"),
            TransportKind::Bluetooth => write!(f, "Bluetooth"),
        }
    }
}

/// Category of a message event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Lifecycle notices (connected, disconnected, hints)
    System,
    /// A failure on the connect, send or receive path
    Error,
    /// A line written to the device
    Sent,
    /// A line received from the device
    Device,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::System => write!(f, "System"),
            Category::Error => write!(f, "Error"),
            Category::Sent => write!(f, "Sent"),
            Category::Device => write!(f, "Device"),
        }
    }
}

/// A timestamped line for the message log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Emission time, milliseconds since Unix epoch
    pub timestamp_ms: u64,
    pub category: Category,
    pub text: String,
}

impl MessageEvent {
    /// Create an event stamped with the current time
    pub fn new(category: Category, text: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            category,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Category::System, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Category::Error, text)
    }

    pub fn sent(text: impl Into<String>) -> Self {
        Self::new(Category::Sent, text)
    }

    pub fn device(text: impl Into<String>) -> Self {
        Self::new(Category::Device, text)
    }
}

impl fmt::Display for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.timestamp_ms, self.category, self.text)
    }
}
