//! Compressed command transport over constrained packet-radio links
//!
//! This crate carries building-automation commands (GET/SET/LIST/...) over
//! LoRa-class links where every byte counts. Commands are squeezed into a
//! compact binary frame, split into fragments when they exceed the link's
//! payload limit, and sent with acknowledgement, retry and backoff.
//!
//! # Architecture
//!
//! 1. **Codebook** - path abbreviations, building alias and status codes
//! 2. **Codec** - compact binary frames with trailing CRC32
//! 3. **Fragmentation** - splitting frames above the link payload limit
//! 4. **Retry** - acknowledged transmission with exponential backoff
//! 5. **Transport** - sequencing, building context and the public API
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // Enable the `serial` feature to use AtCommandLink
//! // Cargo.toml: arx-radio = { version = "0.1", features = ["serial"] }
//!
//! use arx_radio::{AtCommandLink, Command, RadioConfig, RadioTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RadioConfig::builder()
//!         .device("/dev/ttyUSB0")
//!         .max_payload(222)
//!         .build();
//!
//!     let transport = RadioTransport::new(config)?;
//!     transport.connect(Box::new(AtCommandLink::new())).await?;
//!     transport.establish_context("ARXOS-NA-US-NY-NYC-0001");
//!
//!     let response = transport
//!         .send(&Command::get(
//!             "/building/ARXOS-NA-US-NY-NYC-0001/floor-02/room-203/electrical/outlet-02",
//!         ))
//!         .await?;
//!     println!("status {}: {}", response.status, response.text());
//!
//!     let latency = transport.ping().await?;
//!     println!("round trip {:?}", latency);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `serial` - AT-command serial driver (requires `libudev-dev` on Linux)
//!
//! # Protocol Details
//!
//! ```text
//! byte 0      : header (0x20 high compression, 0x10 ack requested)
//! byte 1      : command code
//! byte 2      : sequence number (wraps)
//! byte 3      : path length N
//! bytes 4..   : compressed path
//! next 2      : args length M (big-endian)
//! next M      : compressed args
//! last 4      : CRC32 (IEEE) of everything before, big-endian
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Wire format
pub mod codebook;
pub mod codec;
pub mod command;
pub mod fragment;

// Configuration and errors
pub mod config;
pub mod error;

// Hardware
pub mod link;

// Transmission
pub mod cancel;
pub mod retry;
pub mod transport;

// Testing utilities
pub mod test_utils;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use codebook::{PathAbbreviator, StatusCode, BUILDING_ALIAS};
pub use codec::{Compressor, Frame, FrameHeader};
pub use command::{ArgValue, Command, CommandCode, Method, Response};
pub use config::{CompressionLevel, RadioConfig, RadioConfigBuilder};
pub use error::{EncodingError, LinkError, RadioError, Result};
pub use fragment::{Fragment, Fragmenter};
pub use link::{HardwareLink, LinkState};
pub use retry::{LinkMode, RetryCoordinator};
pub use test_utils::MockLink;
pub use transport::RadioTransport;

#[cfg(feature = "serial")]
pub use link::AtCommandLink;

// Protocol constants re-exports
pub use config::{DEFAULT_BAUD_RATE, DEFAULT_MAX_PAYLOAD, FRAGMENT_OVERHEAD};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
