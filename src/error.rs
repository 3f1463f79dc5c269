//! Error types for device connections

use device_link_shared::{ConnectionState, TransportKind};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors from connecting to, talking to, or discovering devices
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("connection to {endpoint} timed out after {}s", timeout.as_secs_f32())]
    Timeout { endpoint: String, timeout: Duration },

    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("Bluetooth is not available on this host")]
    BluetoothUnavailable,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("{actual} endpoint given to the {expected} transport")]
    TransportMismatch {
        expected: TransportKind,
        actual: TransportKind,
    },

    #[error("connection is already {0}")]
    Busy(ConnectionState),

    #[error("not connected")]
    NotConnected,

    #[error("connect cancelled by close")]
    Cancelled,

    #[error("{0} transport does not support device scanning")]
    ScanUnsupported(TransportKind),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LinkError::Timeout {
            endpoint: "10.0.0.2:8080".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "connection to 10.0.0.2:8080 timed out after 5s");

        let err = LinkError::TransportMismatch {
            expected: TransportKind::Network,
            actual: TransportKind::Bluetooth,
        };
        assert_eq!(err.to_string(), "Bluetooth endpoint given to the Network transport");

        let err = LinkError::Busy(ConnectionState::Connected);
        assert_eq!(err.to_string(), "connection is already connected");
    }
}
