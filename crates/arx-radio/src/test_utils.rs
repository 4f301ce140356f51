//! Test utilities for exercising the transport without a radio
//!
//! [`MockLink`] is a deterministic in-memory [`HardwareLink`]. Clones share
//! state, so a test can hand one clone to the transport and keep another
//! to script failures and inspect what went over the air.
//!
//! # Example
//!
//! ```rust,ignore
//! use arx_radio::{RadioConfig, RadioTransport, Command};
//! use arx_radio::test_utils::MockLink;
//!
//! #[tokio::test]
//! async fn test_flaky_radio() {
//!     let mock = MockLink::new();
//!     mock.fail_next_sends(2);
//!
//!     let transport = RadioTransport::new(RadioConfig::default()).unwrap();
//!     transport.connect(Box::new(mock.clone())).await.unwrap();
//!
//!     transport.send(&Command::get("/floor-1")).await.unwrap();
//!     assert_eq!(mock.send_attempts(), 3);
//! }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandCode;
use crate::config::DEFAULT_ACK_TIMEOUT_MS;
use crate::error::LinkError;
use crate::fragment::FRAGMENT_MARKER;
use crate::link::HardwareLink;

#[derive(Debug)]
struct MockState {
    open: bool,
    device: Option<String>,
    baud_rate: Option<u32>,
    timeout: Duration,
    open_count: usize,
    close_count: usize,
    fail_open: bool,
    fail_sends: usize,
    fail_receives: usize,
    auto_reply: bool,
    replies: VecDeque<Bytes>,
    receive_delay: Option<Duration>,
    sent: Vec<Bytes>,
    send_attempts: usize,
    last_sequence: Option<u8>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            open: false,
            device: None,
            baud_rate: None,
            timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            open_count: 0,
            close_count: 0,
            fail_open: false,
            fail_sends: 0,
            fail_receives: 0,
            auto_reply: true,
            replies: VecDeque::new(),
            receive_delay: None,
            sent: Vec::new(),
            send_attempts: 0,
            last_sequence: None,
        }
    }
}

/// Mock link for testing without hardware
///
/// By default every successful send is answered with an ACK for the frame's
/// sequence number. Scripted replies take precedence over the auto-reply.
#[derive(Debug, Clone, Default)]
pub struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    /// Create a closed mock link with auto-reply enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` fail
    pub fn fail_open(&self, enabled: bool) {
        self.state.lock().fail_open = enabled;
    }

    /// Make the next `n` sends fail with a write error
    pub fn fail_next_sends(&self, n: usize) {
        self.state.lock().fail_sends = n;
    }

    /// Make the next `n` receives fail with a read error
    pub fn fail_next_receives(&self, n: usize) {
        self.state.lock().fail_receives = n;
    }

    /// Enable or disable the automatic ACK reply
    pub fn set_auto_reply(&self, enabled: bool) {
        self.state.lock().auto_reply = enabled;
    }

    /// Queue a reply for the next receive
    pub fn queue_reply(&self, reply: impl Into<Bytes>) {
        self.state.lock().replies.push_back(reply.into());
    }

    /// Delay every receive by `delay`
    pub fn set_receive_delay(&self, delay: Option<Duration>) {
        self.state.lock().receive_delay = delay;
    }

    /// Payloads that were sent successfully, in order
    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().sent.clone()
    }

    /// Every send call, including failed ones
    pub fn send_attempts(&self) -> usize {
        self.state.lock().send_attempts
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Number of closes
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }

    /// Device and baud rate passed to the last open
    pub fn opened_with(&self) -> Option<(String, u32)> {
        let state = self.state.lock();
        state.device.clone().zip(state.baud_rate)
    }

    /// Receive timeout last applied through `set_timeout`
    pub fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    /// Build an ACK reply for a sequence number
    pub fn ack(sequence: u8, body: &[u8]) -> Bytes {
        let mut reply = vec![u8::from(CommandCode::Ack), sequence];
        reply.extend_from_slice(body);
        Bytes::from(reply)
    }

    /// Build an error reply carrying a message
    pub fn error_reply(sequence: u8, message: &str) -> Bytes {
        let mut reply = vec![u8::from(CommandCode::Error), sequence];
        reply.extend_from_slice(message.as_bytes());
        Bytes::from(reply)
    }
}

/// Sequence byte of a sent payload, if it is a whole frame
fn frame_sequence(data: &[u8]) -> Option<u8> {
    match data.first() {
        Some(&FRAGMENT_MARKER) => None,
        Some(_) => data.get(2).copied(),
        None => None,
    }
}

#[async_trait]
impl HardwareLink for MockLink {
    async fn open(&mut self, device: &str, baud_rate: u32) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(LinkError::OpenFailed {
                device: device.to_string(),
                reason: "Simulated open failure".to_string(),
            });
        }
        state.open = true;
        state.open_count += 1;
        state.device = Some(device.to_string());
        state.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.open = false;
        state.close_count += 1;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let mut state = self.state.lock();
        state.send_attempts += 1;

        if !state.open {
            return Err(LinkError::NotOpen);
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(LinkError::Write("Simulated write error".to_string()));
        }

        if let Some(sequence) = frame_sequence(data) {
            state.last_sequence = Some(sequence);
        }
        state.sent.push(Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn receive(&mut self) -> Result<Bytes, LinkError> {
        let (delay, timeout) = {
            let state = self.state.lock();
            if !state.open {
                return Err(LinkError::NotOpen);
            }
            (state.receive_delay, state.timeout)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut state = self.state.lock();
            if state.fail_receives > 0 {
                state.fail_receives -= 1;
                return Err(LinkError::Read("Simulated read error".to_string()));
            }

            match state.replies.pop_front() {
                Some(reply) => Some(reply),
                None if state.auto_reply => {
                    Some(Self::ack(state.last_sequence.unwrap_or_default(), b"OK"))
                }
                None => None,
            }
        };

        match reply {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep(timeout).await;
                Err(LinkError::Timeout {
                    duration_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.state.lock().timeout = timeout;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn name(&self) -> &str {
        "mock"
    }
}
