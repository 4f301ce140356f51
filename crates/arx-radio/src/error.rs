//! Error types for radio transport operations
//!
//! Errors are split by the layer that raises them:
//!
//! - [`EncodingError`] - a [`Command`](crate::Command) cannot be put on the wire
//! - [`LinkError`] - raised by a [`HardwareLink`](crate::HardwareLink) driver
//! - [`RadioError`] - everything the transport surfaces to callers

use thiserror::Error;

/// Failures raised by a hardware link driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Operation attempted on a link that is not open
    #[error("Link is not open")]
    NotOpen,

    /// Device could not be opened
    #[error("Failed to open device {device}: {reason}")]
    OpenFailed {
        /// Device identifier
        device: String,
        /// Failure reason
        reason: String,
    },

    /// Write to the device failed
    #[error("Link write error: {0}")]
    Write(String),

    /// Read from the device failed
    #[error("Link read error: {0}")]
    Read(String),

    /// No reply arrived in time
    #[error("Link timeout after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        duration_ms: u64,
    },

    /// The radio module reported an error condition
    #[error("Device error: {0}")]
    Device(String),

    /// IO error, stored as kind and message so the error stays cloneable
    #[error("IO error ({kind:?}): {message}")]
    Io {
        /// Original error kind
        kind: std::io::ErrorKind,
        /// Original error message
        message: String,
    },
}

impl LinkError {
    /// Check if the retry path should try again after this error
    pub fn is_retriable(&self) -> bool {
        !matches!(self, LinkError::NotOpen | LinkError::OpenFailed { .. })
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            return LinkError::Timeout { duration_ms: 0 };
        }
        LinkError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// A command that cannot be encoded within the wire format limits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Compressed path does not fit the 1-byte length prefix
    #[error("Compressed path is {len} bytes, maximum is 255")]
    PathTooLong {
        /// Compressed path length
        len: usize,
    },

    /// Compressed args do not fit the 2-byte length prefix
    #[error("Compressed args are {len} bytes, maximum is 65535")]
    ArgsTooLong {
        /// Compressed args length
        len: usize,
    },

    /// Argument key does not fit its 1-byte length prefix
    #[error("Argument key '{key}' is {len} bytes, maximum is 255")]
    KeyTooLong {
        /// Offending key (truncated for display)
        key: String,
        /// Key length in bytes
        len: usize,
    },

    /// Text value does not fit its 1-byte length prefix
    #[error("Text value for '{key}' is {len} bytes, maximum is 255")]
    TextTooLong {
        /// Key the value belongs to
        key: String,
        /// Value length in bytes
        len: usize,
    },

    /// Frame needs more fragments than the 1-byte count allows
    #[error("Frame of {size} bytes needs {count} fragments, maximum is 255")]
    TooManyFragments {
        /// Encoded frame size
        size: usize,
        /// Fragments that would be needed
        count: usize,
    },
}

/// Main error type for radio transport operations
#[derive(Error, Debug)]
pub enum RadioError {
    // ===== Encoding Errors =====
    /// Command could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    // ===== Link Errors =====
    /// Error raised by the hardware link
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// Hardware-mode transport has no bound link
    #[error("Radio transport is not connected")]
    NotConnected,

    // ===== Protocol Errors =====
    /// Reply bytes are too short or structurally invalid
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Command frame is structurally invalid
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Trailing CRC32 does not match the frame contents
    #[error("Checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch {
        /// CRC32 carried by the frame
        expected: u32,
        /// CRC32 computed over the received bytes
        actual: u32,
    },

    /// The far end answered with an error status
    #[error("Remote error (status {status}): {message}")]
    Remote {
        /// Response status
        status: u16,
        /// Error message from the far end
        message: String,
    },

    // ===== Retry Errors =====
    /// Every transmission attempt failed
    #[error("Transmission failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: LinkError,
    },

    /// One fragment of a multi-fragment send failed
    #[error("Fragment {index} of {count} failed: {source}")]
    FragmentFailure {
        /// Index of the failed fragment
        index: u8,
        /// Total fragments in the logical message
        count: u8,
        /// Why the fragment failed
        #[source]
        source: Box<RadioError>,
    },

    // ===== Cancellation =====
    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller's deadline passed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    // ===== Configuration Errors =====
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RadioError {
    /// Check if this error may succeed on a later attempt
    pub fn is_retriable(&self) -> bool {
        match self {
            RadioError::Link(err) => err.is_retriable(),
            _ => false,
        }
    }

    /// Check if this is a protocol error (bad bytes on the wire)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            RadioError::MalformedResponse(_)
                | RadioError::MalformedFrame(_)
                | RadioError::ChecksumMismatch { .. }
        )
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RadioError::Encoding(_) => "ENCODING_ERROR",
            RadioError::Link(_) => "LINK_ERROR",
            RadioError::NotConnected => "NOT_CONNECTED",
            RadioError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            RadioError::MalformedFrame(_) => "MALFORMED_FRAME",
            RadioError::ChecksumMismatch { .. } => "CHECKSUM_MISMATCH",
            RadioError::Remote { .. } => "REMOTE_ERROR",
            RadioError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            RadioError::FragmentFailure { .. } => "FRAGMENT_FAILURE",
            RadioError::Cancelled => "CANCELLED",
            RadioError::DeadlineExceeded => "DEADLINE_EXCEEDED",
            RadioError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

/// Result type alias for radio operations
pub type Result<T> = std::result::Result<T, RadioError>;
