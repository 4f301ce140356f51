//! Acknowledged transmission with retry and exponential backoff
//!
//! The [`RetryCoordinator`] owns the send/receive/backoff loop for one blob
//! (a whole frame or a single fragment). The [`AckTracker`] records which
//! sequence numbers are in flight so stuck transmissions can be spotted.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cancel::Cancellation;
use crate::codec::FLAG_ACK_REQUESTED;
use crate::command::CommandCode;
use crate::config::RadioConfig;
use crate::error::{LinkError, RadioError, Result};
use crate::link::HardwareLink;

/// Where transmissions go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// A bound [`HardwareLink`]
    Hardware,
    /// No I/O; every transmission is answered with a canned success
    Simulation,
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkMode::Hardware => write!(f, "hardware"),
            LinkMode::Simulation => write!(f, "simulation"),
        }
    }
}

/// Canned reply used in simulation mode
pub fn simulated_reply(sequence: u8) -> Bytes {
    Bytes::from(vec![u8::from(CommandCode::Ack), sequence, b'O', b'K'])
}

/// Send/receive loop with bounded attempts
#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    mode: LinkMode,
    max_attempts: u32,
    base_delay: Duration,
    ack_timeout: Duration,
}

impl RetryCoordinator {
    /// Create a coordinator
    ///
    /// `max_attempts` counts every transmission including the first.
    pub fn new(mode: LinkMode, max_attempts: u32, base_delay: Duration, ack_timeout: Duration) -> Self {
        Self {
            mode,
            max_attempts: max_attempts.max(1),
            base_delay,
            ack_timeout,
        }
    }

    /// Create a coordinator from transport configuration
    pub fn from_config(mode: LinkMode, config: &RadioConfig) -> Self {
        Self::new(
            mode,
            config.max_retries,
            config.retry_base_delay,
            config.ack_timeout,
        )
    }

    /// Transmission mode
    pub fn mode(&self) -> LinkMode {
        self.mode
    }

    /// Delay before the given 0-indexed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Transmit one blob and wait for the reply
    ///
    /// In hardware mode `link` must be bound or [`RadioError::NotConnected`]
    /// is returned. `sequence` only shapes the simulated reply.
    pub async fn transmit(
        &self,
        link: Option<&mut Box<dyn HardwareLink>>,
        payload: &[u8],
        sequence: u8,
        cancel: &Cancellation,
    ) -> Result<Bytes> {
        match self.mode {
            LinkMode::Simulation => {
                cancel.check()?;
                debug!(size = payload.len(), sequence, "Simulated transmission");
                Ok(simulated_reply(sequence))
            }
            LinkMode::Hardware => {
                let link = link.ok_or(RadioError::NotConnected)?;
                self.transmit_with_retry(link.as_mut(), payload, cancel).await
            }
        }
    }

    async fn transmit_with_retry(
        &self,
        link: &mut dyn HardwareLink,
        payload: &[u8],
        cancel: &Cancellation,
    ) -> Result<Bytes> {
        let mut attempt = 1;
        loop {
            debug!(
                link = %link.name(),
                attempt,
                max_attempts = self.max_attempts,
                size = payload.len(),
                ack = payload.first().is_some_and(|h| h & FLAG_ACK_REQUESTED != 0),
                "Transmitting"
            );

            match self.attempt(link, payload, cancel).await {
                Ok(reply) => return Ok(reply),
                Err(RadioError::Link(err)) if err.is_retriable() && attempt < self.max_attempts => {
                    warn!(
                        link = %link.name(),
                        attempt,
                        error = %err,
                        "Transmission attempt failed"
                    );
                }
                // Out of attempts, or a closed link that resending cannot fix
                Err(RadioError::Link(err)) => {
                    warn!(attempts = attempt, error = %err, "Giving up on transmission");
                    return Err(RadioError::RetriesExhausted {
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => return Err(err),
            }

            let delay = self.backoff(attempt);
            attempt += 1;
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Backing off");
            cancel.sleep(delay).await?;
        }
    }

    async fn attempt(
        &self,
        link: &mut dyn HardwareLink,
        payload: &[u8],
        cancel: &Cancellation,
    ) -> Result<Bytes> {
        cancel.run(link.send(payload)).await??;

        let reply = cancel
            .run(tokio::time::timeout(self.ack_timeout, link.receive()))
            .await?
            .map_err(|_| LinkError::Timeout {
                duration_ms: self.ack_timeout.as_millis() as u64,
            })??;

        Ok(reply)
    }
}

/// In-flight sequence numbers and when they were sent
#[derive(Debug, Default)]
pub struct AckTracker {
    pending: Mutex<HashMap<u8, Instant>>,
}

impl AckTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence as in flight until the guard drops
    ///
    /// The entry is removed on acknowledgement, on give-up and when the
    /// owning future is cancelled.
    pub fn track(&self, sequence: u8) -> PendingAck<'_> {
        self.pending.lock().insert(sequence, Instant::now());
        PendingAck {
            tracker: self,
            sequence,
        }
    }

    /// In-flight sequence numbers, ascending
    pub fn pending(&self) -> Vec<u8> {
        let mut pending: Vec<u8> = self.pending.lock().keys().copied().collect();
        pending.sort_unstable();
        pending
    }

    /// In-flight sequence numbers sent more than `older_than` ago
    pub fn stale(&self, older_than: Duration) -> Vec<u8> {
        let now = Instant::now();
        let mut stale: Vec<u8> = self
            .pending
            .lock()
            .iter()
            .filter(|(_, sent)| now.duration_since(**sent) > older_than)
            .map(|(seq, _)| *seq)
            .collect();
        stale.sort_unstable();
        stale
    }

    fn remove(&self, sequence: u8) {
        self.pending.lock().remove(&sequence);
    }
}

/// Guard returned by [`AckTracker::track`]
#[derive(Debug)]
pub struct PendingAck<'a> {
    tracker: &'a AckTracker,
    sequence: u8,
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        self.tracker.remove(self.sequence);
    }
}
