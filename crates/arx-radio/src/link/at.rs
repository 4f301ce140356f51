//! AT-command line protocol for LoRaWAN radio modules
//!
//! RAK/RUI3-style modules speak a line-oriented dialect over the serial
//! port. Everything here is pure so it can be tested without hardware;
//! the serial driver only moves bytes.
//!
//! ```text
//! > AT+SEND=2:0101000A...\r\n
//! < OK\r\n
//! < +EVT:TX_DONE\r\n
//! < +EVT:RX_1:-70:8:UNICAST:2:8001...\r\n
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tracing::{trace, warn};

use crate::error::LinkError;

/// Default LoRaWAN application port
pub const DEFAULT_APP_PORT: u8 = 2;

/// Longest line the module is expected to emit (hex payload plus prefix)
pub const MAX_LINE_LEN: usize = 1024;

/// Probe command sent when opening
pub const PROBE: &str = "AT\r\n";

/// A parsed line from the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtLine {
    /// Command accepted
    Ok,
    /// Command rejected (`ERROR` or `AT_*_ERROR`)
    Error(String),
    /// Downlink payload on an application port
    Received {
        /// Application port
        port: u8,
        /// Decoded payload
        payload: Bytes,
    },
    /// Confirmed uplink was not acknowledged by the network
    SendFailed,
    /// Any other asynchronous event (`+EVT:...`)
    Event(String),
    /// Echo or informational output
    Other(String),
}

/// Build the uplink command for a payload
pub fn send_command(port: u8, payload: &[u8]) -> String {
    format!("AT+SEND={}:{}\r\n", port, hex::encode_upper(payload))
}

/// Parse one line with the line terminator already removed
pub fn parse_line(line: &str) -> Result<AtLine, LinkError> {
    let line = line.trim();

    if line == "OK" {
        return Ok(AtLine::Ok);
    }
    if line == "ERROR" || (line.starts_with("AT_") && line.ends_with("_ERROR")) {
        return Ok(AtLine::Error(line.to_string()));
    }

    let Some(event) = line.strip_prefix("+EVT:") else {
        return Ok(AtLine::Other(line.to_string()));
    };

    if event.starts_with("SEND_CONFIRMED_FAILED") {
        return Ok(AtLine::SendFailed);
    }

    if event.starts_with("RX") {
        // +EVT:RX_1:<rssi>:<snr>:<type>:<port>:<hex>
        let mut fields = event.rsplitn(3, ':');
        let data = fields.next().unwrap_or_default();
        let port = fields
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(|| LinkError::Read(format!("Bad port in downlink event: {}", line)))?;
        let payload = hex::decode(data)
            .map_err(|e| LinkError::Read(format!("Bad hex in downlink event: {}", e)))?;

        return Ok(AtLine::Received {
            port,
            payload: Bytes::from(payload),
        });
    }

    Ok(AtLine::Event(event.to_string()))
}

/// Accumulates serial bytes and yields complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the port
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Buffered byte count
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Take the next complete, non-empty line
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() > MAX_LINE_LEN {
                    warn!(discarded = self.buf.len(), "Discarding unterminated line");
                    self.buf.clear();
                }
                return None;
            };

            let raw = self.buf.split_to(pos);
            self.buf.advance(1);

            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                trace!(line = %line, "AT line");
                return Some(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_command() {
        assert_eq!(send_command(2, &[0x01, 0xAB]), "AT+SEND=2:01AB\r\n");
    }

    #[test]
    fn test_parse_final_lines() {
        assert_eq!(parse_line("OK").unwrap(), AtLine::Ok);
        assert_eq!(
            parse_line("AT_BUSY_ERROR").unwrap(),
            AtLine::Error("AT_BUSY_ERROR".to_string())
        );
        assert_eq!(
            parse_line("ERROR").unwrap(),
            AtLine::Error("ERROR".to_string())
        );
        assert_eq!(
            parse_line("+EVT:TX_DONE").unwrap(),
            AtLine::Event("TX_DONE".to_string())
        );
    }

    #[test]
    fn test_parse_downlink() {
        let line = parse_line("+EVT:RX_1:-70:8:UNICAST:2:80014F4B").unwrap();
        assert_eq!(
            line,
            AtLine::Received {
                port: 2,
                payload: Bytes::from_static(&[0x80, 0x01, b'O', b'K']),
            }
        );
    }

    #[test]
    fn test_parse_downlink_bad_hex() {
        assert!(matches!(
            parse_line("+EVT:RX_1:-70:8:UNICAST:2:ZZ"),
            Err(LinkError::Read(_))
        ));
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(
            parse_line("+EVT:SEND_CONFIRMED_FAILED(4)").unwrap(),
            AtLine::SendFailed
        );
        assert_eq!(
            parse_line("+EVT:JOINED").unwrap(),
            AtLine::Event("JOINED".to_string())
        );
        assert_eq!(
            parse_line("AT+SEND=2:00").unwrap(),
            AtLine::Other("AT+SEND=2:00".to_string())
        );
    }

    #[test]
    fn test_line_buffer_splits_lines() {
        let mut lines = LineBuffer::new();
        lines.extend(b"OK\r\n\r\n+EVT:TX_");
        assert_eq!(lines.next_line().as_deref(), Some("OK"));
        assert_eq!(lines.next_line(), None);

        lines.extend(b"DONE\r\n");
        assert_eq!(lines.next_line().as_deref(), Some("+EVT:TX_DONE"));
        assert!(lines.is_empty());
    }

    #[test]
    fn test_line_buffer_discards_runaway_input() {
        let mut lines = LineBuffer::new();
        lines.extend(&vec![b'A'; MAX_LINE_LEN + 1]);
        assert_eq!(lines.next_line(), None);
        assert!(lines.is_empty());
    }
}
