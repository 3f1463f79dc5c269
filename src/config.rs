//! Transport configuration

use device_link_shared::timeouts;
use std::time::Duration;

/// Default RFCOMM channel of the device's serial service
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Network (TCP) transport configuration
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-read timeout; expiry re-polls instead of failing
    pub read_timeout: Duration,
    /// Bytes requested per read
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(timeouts::NETWORK_CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(timeouts::NETWORK_READ_TIMEOUT_MS),
            read_buffer_size: timeouts::READ_BUFFER_SIZE,
        }
    }
}

/// Bluetooth (RFCOMM) transport configuration
#[derive(Debug, Clone)]
pub struct BluetoothConfig {
    /// RFCOMM channel number
    pub channel: u8,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-read timeout
    pub read_timeout: Duration,
    /// How long a device scan runs
    pub scan_duration: Duration,
    /// Bytes requested per read
    pub read_buffer_size: usize,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_RFCOMM_CHANNEL,
            connect_timeout: Duration::from_millis(timeouts::BLUETOOTH_CONNECT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(timeouts::BLUETOOTH_READ_TIMEOUT_MS),
            scan_duration: Duration::from_millis(timeouts::BLUETOOTH_SCAN_DURATION_MS),
            read_buffer_size: timeouts::READ_BUFFER_SIZE,
        }
    }
}

/// Configuration for the device manager
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    pub network: NetworkConfig,
    pub bluetooth: BluetoothConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.network.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.network.read_timeout, Duration::from_secs(5));
        assert_eq!(config.bluetooth.channel, DEFAULT_RFCOMM_CHANNEL);
        assert_eq!(config.bluetooth.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.bluetooth.scan_duration, Duration::from_secs(8));
    }
}
