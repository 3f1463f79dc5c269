//! Connection control for a single transport
//!
//! This module handles:
//! - Connecting through a transport with its timeout
//! - The background receive loop and line framing
//! - Sending newline-terminated messages
//! - Idempotent close and lost-link detection

mod controller;

pub use controller::{ConnectionController, ConnectionInfo};
