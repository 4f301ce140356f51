//! Serial link for AT-command LoRaWAN modules
//!
//! This module drives RAK/RUI3-style radio modules through tokio-serial.
//! Uplinks are hex-encoded into `AT+SEND` commands and downlinks arrive as
//! `+EVT:RX` events; see [`at`](super::at) for the line protocol.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace, warn};

use crate::config::DEFAULT_ACK_TIMEOUT_MS;
use crate::error::LinkError;
use crate::link::at::{self, AtLine, LineBuffer, DEFAULT_APP_PORT};
use crate::link::{HardwareLink, LinkState};

/// Buffer size for reading from serial port
const READ_BUFFER_SIZE: usize = 256;

/// How long to wait for `OK` after a command
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Serial link to an AT-command radio module
pub struct AtCommandLink {
    /// LoRaWAN application port for uplinks
    app_port: u8,

    /// Receive timeout
    timeout: Duration,

    /// Serial stream (when open)
    stream: Option<SerialStream>,

    /// Current link state
    state: LinkState,

    /// Partial lines read from the port
    lines: LineBuffer,

    /// Link name for logging
    name: String,
}

impl AtCommandLink {
    /// Create an unopened link
    pub fn new() -> Self {
        Self {
            app_port: DEFAULT_APP_PORT,
            timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            stream: None,
            state: LinkState::Closed,
            lines: LineBuffer::new(),
            name: "at-serial".to_string(),
        }
    }

    /// Use a different LoRaWAN application port
    pub fn with_app_port(mut self, port: u8) -> Self {
        self.app_port = port;
        self
    }

    /// Get the current link state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Read the next line, waiting at most `wait`
    async fn read_line(&mut self, wait: Duration) -> Result<String, LinkError> {
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(line);
            }

            let stream = self.stream.as_mut().ok_or(LinkError::NotOpen)?;
            let mut buf = [0u8; READ_BUFFER_SIZE];

            let read = tokio::time::timeout_at(deadline, stream.read(&mut buf))
                .await
                .map_err(|_| LinkError::Timeout {
                    duration_ms: wait.as_millis() as u64,
                })?;

            match read {
                Ok(0) => {
                    self.state = LinkState::Closed;
                    return Err(LinkError::Read("Serial port closed".to_string()));
                }
                Ok(n) => {
                    trace!(bytes = n, "Read from serial port");
                    self.lines.extend(&buf[..n]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    error!(error = %e, "Serial read error");
                    return Err(e.into());
                }
            }
        }
    }

    /// Write a command line and wait for its final `OK`/`ERROR`
    async fn command(&mut self, line: &str) -> Result<(), LinkError> {
        let stream = self.stream.as_mut().ok_or(LinkError::NotOpen)?;
        debug!(command = %line.trim_end(), "Writing AT command");

        stream.write_all(line.as_bytes()).await.map_err(|e| {
            error!(error = %e, "Serial write error");
            LinkError::Write(e.to_string())
        })?;
        stream
            .flush()
            .await
            .map_err(|e| LinkError::Write(format!("Flush failed: {}", e)))?;

        loop {
            let line = self.read_line(COMMAND_TIMEOUT).await?;
            match at::parse_line(&line)? {
                AtLine::Ok => return Ok(()),
                AtLine::Error(code) => return Err(LinkError::Device(code)),
                other => trace!(line = ?other, "Ignoring line while awaiting OK"),
            }
        }
    }
}

impl Default for AtCommandLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HardwareLink for AtCommandLink {
    async fn open(&mut self, device: &str, baud_rate: u32) -> Result<(), LinkError> {
        if self.state == LinkState::Open {
            return Ok(());
        }

        self.state = LinkState::Opening;
        info!(device = %device, baud = baud_rate, "Opening serial radio");

        let stream = tokio_serial::new(device, baud_rate)
            .open_native_async()
            .map_err(|e| {
                self.state = LinkState::Closed;
                LinkError::OpenFailed {
                    device: device.to_string(),
                    reason: e.to_string(),
                }
            })?;

        self.stream = Some(stream);
        self.lines.clear();
        self.name = format!("at-serial:{}", device);

        if let Err(e) = self.command(at::PROBE).await {
            self.stream = None;
            self.state = LinkState::Closed;
            return Err(LinkError::OpenFailed {
                device: device.to_string(),
                reason: format!("Module did not answer AT probe: {}", e),
            });
        }

        self.state = LinkState::Open;
        info!(device = %device, "Serial radio ready");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!(link = %self.name, "Closed serial radio");
        }

        self.state = LinkState::Closed;
        self.lines.clear();
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        if !self.is_open() {
            return Err(LinkError::NotOpen);
        }

        debug!(size = data.len(), port = self.app_port, "Sending uplink");
        self.command(&at::send_command(self.app_port, data)).await
    }

    async fn receive(&mut self) -> Result<Bytes, LinkError> {
        if !self.is_open() {
            return Err(LinkError::NotOpen);
        }

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout {
                    duration_ms: self.timeout.as_millis() as u64,
                });
            }

            let line = self.read_line(remaining).await?;
            match at::parse_line(&line)? {
                AtLine::Received { port, payload } if port == self.app_port => {
                    debug!(size = payload.len(), port, "Received downlink");
                    return Ok(payload);
                }
                AtLine::Received { port, .. } => {
                    warn!(port, expected = self.app_port, "Ignoring downlink on other port");
                }
                AtLine::SendFailed => {
                    return Err(LinkError::Device("SEND_CONFIRMED_FAILED".to_string()));
                }
                AtLine::Error(code) => return Err(LinkError::Device(code)),
                other => trace!(line = ?other, "Ignoring line while awaiting downlink"),
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn is_open(&self) -> bool {
        self.state == LinkState::Open && self.stream.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for AtCommandLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtCommandLink")
            .field("name", &self.name)
            .field("app_port", &self.app_port)
            .field("state", &self.state)
            .field("buffer_len", &self.lines.len())
            .finish()
    }
}
