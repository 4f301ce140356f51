//! Hardware link abstraction
//!
//! A [`HardwareLink`] is the physical/radio endpoint the transport drives.
//! The transport owns exactly one link at a time and never shares it.
//!
//! - `AtCommandLink` - LoRaWAN module over a serial port speaking an
//!   AT-command dialect (requires `serial` feature)
//! - [`MockLink`](crate::test_utils::MockLink) - deterministic in-memory fake
//!
//! # Feature Requirements
//!
//! - `serial`: Requires `libudev-dev` and `pkg-config` on Linux
//!   ```bash
//!   # Ubuntu/Debian
//!   apt install libudev-dev pkg-config
//!   ```

#[cfg(feature = "serial")]
mod serial;

#[cfg(feature = "serial")]
pub use serial::AtCommandLink;

pub mod at;

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::error::LinkError;

/// Contract every radio driver implements
///
/// `receive` blocks for at most the duration given to `set_timeout` and
/// reports [`LinkError::Timeout`] when nothing arrives. The transport
/// additionally bounds every receive by its acknowledgement timeout.
#[async_trait]
pub trait HardwareLink: Send {
    /// Open the device at the given baud rate
    async fn open(&mut self, device: &str, baud_rate: u32) -> Result<(), LinkError>;

    /// Close the device
    async fn close(&mut self) -> Result<(), LinkError>;

    /// Transmit one payload
    async fn send(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Wait for the next inbound payload
    async fn receive(&mut self) -> Result<Bytes, LinkError>;

    /// Set how long `receive` waits
    fn set_timeout(&mut self, timeout: Duration);

    /// Check if the device is open
    fn is_open(&self) -> bool;

    /// Link name (for logging)
    fn name(&self) -> &str;
}

/// Connection state for links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Not open
    Closed,
    /// Open in progress (e.g. network join)
    Opening,
    /// Ready to transmit
    Open,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Closed => write!(f, "closed"),
            LinkState::Opening => write!(f, "opening"),
            LinkState::Open => write!(f, "open"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_state_display() {
        assert_eq!(LinkState::Open.to_string(), "open");
        assert_eq!(LinkState::Closed.to_string(), "closed");
    }
}
