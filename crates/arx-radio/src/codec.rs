//! Frame codec
//!
//! Encodes [`Command`]s into compact frames for the radio and decodes raw
//! replies into [`Response`]s.
//!
//! # Frame Format
//!
//! ```text
//! ┌──────────┬─────────┬──────────┬──────────┬──────────┬───────────┬──────────┬───────────┐
//! │Header (1)│ Cmd (1) │ Seq (1)  │PathLen(1)│ Path (N) │ArgsLen (2)│ Args (M) │ CRC32 (4) │
//! └──────────┴─────────┴──────────┴──────────┴──────────┴───────────┴──────────┴───────────┘
//! ```
//!
//! Header bits: `[7-6 version][5 high-compression][4 ack-requested][3 fragmented][2-0 reserved]`.
//! Multi-byte integers are big-endian. The CRC32 (IEEE) covers every
//! preceding byte.
//!
//! # Argument Encoding
//!
//! Each pair is `key_len (1) + key + tag (1) + value` where the tag is one of:
//! - `S` - status code byte
//! - `T` - text length (1) + text bytes
//! - `I` - big-endian i32

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::codebook::{PathAbbreviator, StatusCode};
use crate::command::{ArgValue, Command, CommandCode, Response};
use crate::config::CompressionLevel;
use crate::error::{EncodingError, RadioError, Result};

/// Current protocol version (header bits 7-6)
pub const PROTOCOL_VERSION: u8 = 0;

/// Header flag: high compression
pub const FLAG_HIGH_COMPRESSION: u8 = 0x20;

/// Header flag: acknowledgement requested
pub const FLAG_ACK_REQUESTED: u8 = 0x10;

/// Header flag: fragmented (also the fragment marker byte)
pub const FLAG_FRAGMENTED: u8 = 0x08;

/// Trailing checksum size
pub const CRC_SIZE: usize = 4;

/// Smallest possible frame: header, cmd, seq, path len, args len, crc
pub const MIN_FRAME_SIZE: usize = 4 + 2 + CRC_SIZE;

/// Smallest reply the decoder accepts
pub const MIN_RESPONSE_SIZE: usize = 4;

/// Argument type tag: status
pub const TAG_STATUS: u8 = b'S';

/// Argument type tag: text
pub const TAG_TEXT: u8 = b'T';

/// Argument type tag: integer
pub const TAG_INTEGER: u8 = b'I';

/// CRC32 (IEEE) of a byte slice
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Decoded header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    /// Protocol version (2 bits)
    pub version: u8,
    /// High compression requested
    pub high_compression: bool,
    /// Receiver should acknowledge
    pub ack_requested: bool,
    /// Frame is split into fragments
    pub fragmented: bool,
}

impl FrameHeader {
    /// Pack into a header byte, reserved bits zero
    pub fn to_byte(&self) -> u8 {
        let mut byte = (self.version & 0x03) << 6;
        if self.high_compression {
            byte |= FLAG_HIGH_COMPRESSION;
        }
        if self.ack_requested {
            byte |= FLAG_ACK_REQUESTED;
        }
        if self.fragmented {
            byte |= FLAG_FRAGMENTED;
        }
        byte
    }

    /// Unpack a header byte, ignoring reserved bits
    pub fn from_byte(byte: u8) -> Self {
        Self {
            version: byte >> 6,
            high_compression: byte & FLAG_HIGH_COMPRESSION != 0,
            ack_requested: byte & FLAG_ACK_REQUESTED != 0,
            fragmented: byte & FLAG_FRAGMENTED != 0,
        }
    }
}

/// A command frame with its compressed sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header flags
    pub header: FrameHeader,
    /// Raw command byte
    pub command: u8,
    /// Sequence number
    pub sequence: u8,
    /// Compressed path bytes
    pub path: Bytes,
    /// Compressed argument bytes
    pub args: Bytes,
}

impl Frame {
    /// Encoded size including checksum
    pub fn encoded_len(&self) -> usize {
        MIN_FRAME_SIZE + self.path.len() + self.args.len()
    }

    /// Serialize with a trailing CRC32
    pub fn encode(&self) -> Result<Bytes> {
        if self.path.len() > u8::MAX as usize {
            return Err(EncodingError::PathTooLong {
                len: self.path.len(),
            }
            .into());
        }
        if self.args.len() > u16::MAX as usize {
            return Err(EncodingError::ArgsTooLong {
                len: self.args.len(),
            }
            .into());
        }

        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.header.to_byte());
        buf.put_u8(self.command);
        buf.put_u8(self.sequence);
        buf.put_u8(self.path.len() as u8);
        buf.put_slice(&self.path);
        buf.put_u16(self.args.len() as u16);
        buf.put_slice(&self.args);

        let crc = checksum(&buf);
        buf.put_u32(crc);

        Ok(buf.freeze())
    }

    /// Parse a frame, validating the checksum before anything else
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_FRAME_SIZE {
            return Err(RadioError::MalformedFrame(format!(
                "frame is {} bytes, minimum is {}",
                data.len(),
                MIN_FRAME_SIZE
            )));
        }

        let (body, trailer) = data.split_at(data.len() - CRC_SIZE);
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let actual = checksum(body);
        if expected != actual {
            return Err(RadioError::ChecksumMismatch { expected, actual });
        }

        let mut buf = body;
        let header = FrameHeader::from_byte(buf.get_u8());
        let command = buf.get_u8();
        let sequence = buf.get_u8();

        let path_len = buf.get_u8() as usize;
        if buf.remaining() < path_len + 2 {
            return Err(RadioError::MalformedFrame(format!(
                "path length {} overruns frame",
                path_len
            )));
        }
        let path = Bytes::copy_from_slice(&buf[..path_len]);
        buf.advance(path_len);

        let args_len = buf.get_u16() as usize;
        if buf.remaining() != args_len {
            return Err(RadioError::MalformedFrame(format!(
                "args length {} does not match remaining {} bytes",
                args_len,
                buf.remaining()
            )));
        }
        let args = Bytes::copy_from_slice(buf);

        Ok(Self {
            header,
            command,
            sequence,
            path,
            args,
        })
    }

    /// Command code, if the byte is a known one
    pub fn command_code(&self) -> Option<CommandCode> {
        CommandCode::from_byte(self.command)
    }
}

/// Compresses commands into frames and decodes replies
#[derive(Debug, Clone, Default)]
pub struct Compressor {
    level: CompressionLevel,
    abbreviator: PathAbbreviator,
}

impl Compressor {
    /// Create a compressor for the given level
    pub fn new(level: CompressionLevel) -> Self {
        Self {
            level,
            abbreviator: PathAbbreviator::new(),
        }
    }

    /// Build the frame for a command
    ///
    /// A building attached to the command takes precedence over
    /// `building_context`.
    pub fn frame(&self, command: &Command, building_context: &str, sequence: u8) -> Result<Frame> {
        let context = command.building().unwrap_or(building_context);
        let path = self.compress_path(command.path(), context)?;
        let args = compress_args(command.args())?;

        Ok(Frame {
            header: FrameHeader {
                version: PROTOCOL_VERSION,
                high_compression: self.level.is_high(),
                ack_requested: true,
                fragmented: false,
            },
            command: command.method().code().into(),
            sequence,
            path,
            args,
        })
    }

    /// Encode a command into wire bytes
    pub fn encode(&self, command: &Command, building_context: &str, sequence: u8) -> Result<Bytes> {
        let frame = self.frame(command, building_context, sequence)?;
        let encoded = frame.encode()?;
        trace!(
            method = %command.method(),
            path = command.path(),
            sequence,
            size = encoded.len(),
            "Encoded frame"
        );
        Ok(encoded)
    }

    /// Compress a path and check it fits the length prefix
    pub fn compress_path(&self, path: &str, building_context: &str) -> Result<Bytes> {
        let compressed = self.abbreviator.compress(path, building_context);
        if compressed.len() > u8::MAX as usize {
            return Err(EncodingError::PathTooLong {
                len: compressed.len(),
            }
            .into());
        }
        Ok(Bytes::from(compressed))
    }

    /// Decode a raw reply
    pub fn decode(&self, data: &[u8]) -> Result<Response> {
        decode_response(data)
    }
}

/// Compress arguments into the tagged wire layout
pub fn compress_args(args: &[(String, ArgValue)]) -> Result<Bytes> {
    let mut buf = BytesMut::new();

    for (key, value) in args {
        if key.len() > u8::MAX as usize {
            return Err(EncodingError::KeyTooLong {
                key: key.chars().take(32).collect(),
                len: key.len(),
            }
            .into());
        }
        buf.put_u8(key.len() as u8);
        buf.put_slice(key.as_bytes());

        match value {
            ArgValue::Status(status) => put_status(&mut buf, *status),
            ArgValue::Text(text) => match StatusCode::from_name(text) {
                Some(status) => put_status(&mut buf, status),
                None => {
                    if text.len() > u8::MAX as usize {
                        return Err(EncodingError::TextTooLong {
                            key: key.clone(),
                            len: text.len(),
                        }
                        .into());
                    }
                    buf.put_u8(TAG_TEXT);
                    buf.put_u8(text.len() as u8);
                    buf.put_slice(text.as_bytes());
                }
            },
            ArgValue::Integer(n) => {
                buf.put_u8(TAG_INTEGER);
                buf.put_i32(*n);
            }
        }
    }

    if buf.len() > u16::MAX as usize {
        return Err(EncodingError::ArgsTooLong { len: buf.len() }.into());
    }

    Ok(buf.freeze())
}

fn put_status(buf: &mut BytesMut, status: StatusCode) {
    buf.put_u8(TAG_STATUS);
    buf.put_u8(status.code());
}

/// Parse a compressed argument block
pub fn decode_args(data: &[u8]) -> Result<Vec<(String, ArgValue)>> {
    let mut buf = data;
    let mut args = Vec::new();

    while buf.has_remaining() {
        let key_len = buf.get_u8() as usize;
        if buf.remaining() < key_len + 1 {
            return Err(RadioError::MalformedFrame(
                "argument key overruns block".to_string(),
            ));
        }
        let key = String::from_utf8_lossy(&buf[..key_len]).into_owned();
        buf.advance(key_len);

        let value = match buf.get_u8() {
            TAG_STATUS => {
                if !buf.has_remaining() {
                    return Err(RadioError::MalformedFrame(format!(
                        "missing status code for '{}'",
                        key
                    )));
                }
                let code = buf.get_u8();
                let status = StatusCode::from_code(code).ok_or_else(|| {
                    RadioError::MalformedFrame(format!("unknown status code 0x{:02x}", code))
                })?;
                ArgValue::Status(status)
            }
            TAG_TEXT => {
                if !buf.has_remaining() {
                    return Err(RadioError::MalformedFrame(format!(
                        "missing text length for '{}'",
                        key
                    )));
                }
                let len = buf.get_u8() as usize;
                if buf.remaining() < len {
                    return Err(RadioError::MalformedFrame(format!(
                        "text for '{}' overruns block",
                        key
                    )));
                }
                let text = String::from_utf8_lossy(&buf[..len]).into_owned();
                buf.advance(len);
                ArgValue::Text(text)
            }
            TAG_INTEGER => {
                if buf.remaining() < 4 {
                    return Err(RadioError::MalformedFrame(format!(
                        "integer for '{}' overruns block",
                        key
                    )));
                }
                ArgValue::Integer(buf.get_i32())
            }
            tag => {
                return Err(RadioError::MalformedFrame(format!(
                    "unknown argument tag 0x{:02x}",
                    tag
                )))
            }
        };

        args.push((key, value));
    }

    Ok(args)
}

/// Decode a raw reply into a response
///
/// An ERROR first byte yields status 500 with the rest as the message;
/// anything else is status 200 with the rest as opaque payload.
pub fn decode_response(data: &[u8]) -> Result<Response> {
    if data.len() < MIN_RESPONSE_SIZE {
        return Err(RadioError::MalformedResponse(format!(
            "response is {} bytes, minimum is {}",
            data.len(),
            MIN_RESPONSE_SIZE
        )));
    }

    let rest = &data[1..];
    if data[0] == u8::from(CommandCode::Error) {
        return Ok(Response::error(String::from_utf8_lossy(rest).into_owned()));
    }

    Ok(Response::ok(Bytes::copy_from_slice(rest)))
}
