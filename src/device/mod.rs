//! Device management across the network and Bluetooth transports

mod manager;

pub use manager::DeviceManager;
