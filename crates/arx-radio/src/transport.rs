//! Radio transport: the public face of the crate
//!
//! [`RadioTransport`] ties the pieces together. A send runs:
//!
//! 1. Take the link lock (callers queue here; one transmission at a time)
//! 2. Compress the command under the state lock, consuming one sequence
//! 3. Fragment the frame if it exceeds the link's maximum payload
//! 4. Transmit each blob through the [`RetryCoordinator`]
//! 5. Decode the reply to the final blob into a [`Response`]
//!
//! The state lock is synchronous and never held across `.await`; the link
//! lock is async and held for the whole frame, so fragments of one frame
//! never interleave with any other transmission.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::codec::Compressor;
use crate::command::{Command, Response};
use crate::config::RadioConfig;
use crate::error::{RadioError, Result};
use crate::fragment::Fragmenter;
use crate::link::HardwareLink;
use crate::retry::{AckTracker, LinkMode, RetryCoordinator};

/// Mutable state shared by every caller
#[derive(Debug, Default)]
struct TransportState {
    /// Building identifier replaced by the alias in paths ("" if unset)
    building_context: String,
    /// Last sequence number used
    sequence: u8,
}

type LinkSlot = Option<Box<dyn HardwareLink>>;

/// Command transport over a constrained packet-radio link
///
/// Share it between tasks with `Arc`; every method takes `&self`.
pub struct RadioTransport {
    config: RadioConfig,
    state: Mutex<TransportState>,
    link: tokio::sync::Mutex<LinkSlot>,
    bound: AtomicBool,
    compressor: Compressor,
    fragmenter: Fragmenter,
    retry: RetryCoordinator,
    acks: AckTracker,
}

impl RadioTransport {
    /// Create a hardware-mode transport with no link bound yet
    pub fn new(config: RadioConfig) -> Result<Self> {
        Self::with_mode(config, LinkMode::Hardware)
    }

    /// Create a simulation-mode transport that never touches hardware
    pub fn simulated(config: RadioConfig) -> Result<Self> {
        Self::with_mode(config, LinkMode::Simulation)
    }

    fn with_mode(config: RadioConfig, mode: LinkMode) -> Result<Self> {
        config.validate()?;

        info!(
            mode = %mode,
            max_payload = config.max_payload,
            compression = ?config.compression,
            max_retries = config.max_retries,
            "Creating radio transport"
        );

        Ok(Self {
            compressor: Compressor::new(config.compression),
            fragmenter: Fragmenter::new(config.max_payload),
            retry: RetryCoordinator::from_config(mode, &config),
            state: Mutex::new(TransportState::default()),
            link: tokio::sync::Mutex::new(None),
            bound: AtomicBool::new(false),
            acks: AckTracker::new(),
            config,
        })
    }

    /// Open and bind a hardware link
    ///
    /// Any previously bound link is closed first. In simulation mode the
    /// link is ignored.
    pub async fn connect(&self, mut link: Box<dyn HardwareLink>) -> Result<()> {
        if self.mode() == LinkMode::Simulation {
            warn!(link = %link.name(), "Simulation mode transport ignores hardware link");
            return Ok(());
        }

        link.open(&self.config.device, self.config.baud_rate).await?;
        link.set_timeout(self.config.ack_timeout);

        let mut slot = self.link.lock().await;
        if let Some(mut previous) = slot.take() {
            if let Err(e) = previous.close().await {
                warn!(link = %previous.name(), error = %e, "Failed to close previous link");
            }
        }

        info!(
            link = %link.name(),
            device = %self.config.device,
            baud = self.config.baud_rate,
            "Radio link connected"
        );
        *slot = Some(link);
        self.bound.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Set the building whose identifier is replaced by the alias in paths
    pub fn establish_context(&self, building_id: impl Into<String>) {
        let building_id = building_id.into();
        debug!(building = %building_id, "Building context established");
        self.state.lock().building_context = building_id;
    }

    /// Send a command and wait for its reply
    pub async fn send(&self, command: &Command) -> Result<Response> {
        self.send_with(command, &Cancellation::never()).await
    }

    /// Send a command, giving up when `cancel` fires
    pub async fn send_with(&self, command: &Command, cancel: &Cancellation) -> Result<Response> {
        let mut link = cancel.run(self.link.lock()).await?;

        if self.mode() == LinkMode::Hardware && link.is_none() {
            return Err(RadioError::NotConnected);
        }

        let (frame, sequence) = self.compress(command)?;
        let _pending = self.acks.track(sequence);

        let reply = if self.fragmenter.needs_fragmentation(frame.len()) {
            self.transmit_fragments(&mut link, &frame, sequence, cancel)
                .await?
        } else {
            self.retry
                .transmit(link.as_mut(), &frame, sequence, cancel)
                .await?
        };
        drop(link);

        let response = self.compressor.decode(&reply)?;
        debug!(
            method = %command.method(),
            sequence,
            status = response.status,
            size = response.data.len(),
            "Command answered"
        );
        Ok(response)
    }

    /// Ping the far end and return the round-trip latency
    pub async fn ping(&self) -> Result<Duration> {
        self.ping_with(&Cancellation::never()).await
    }

    /// Ping the far end, giving up when `cancel` fires
    pub async fn ping_with(&self, cancel: &Cancellation) -> Result<Duration> {
        let started = Instant::now();
        let response = self.send_with(&Command::ping(), cancel).await?;
        let latency = started.elapsed();

        if !response.is_success() {
            return Err(RadioError::Remote {
                status: response.status,
                message: response.error.unwrap_or_default(),
            });
        }

        info!(latency_ms = latency.as_millis() as u64, "Ping answered");
        Ok(latency)
    }

    /// Close and release the bound link; safe to call repeatedly
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        self.bound.store(false, Ordering::SeqCst);

        if let Some(mut link) = slot.take() {
            link.close().await?;
            info!(link = %link.name(), "Radio link closed");
        }
        Ok(())
    }

    /// Current building context ("" if unset)
    pub fn building_context(&self) -> String {
        self.state.lock().building_context.clone()
    }

    /// Last sequence number used
    pub fn sequence_number(&self) -> u8 {
        self.state.lock().sequence
    }

    /// Check if sends can reach the far end
    pub fn is_connected(&self) -> bool {
        match self.mode() {
            LinkMode::Simulation => true,
            LinkMode::Hardware => self.bound.load(Ordering::SeqCst),
        }
    }

    /// Transmission mode
    pub fn mode(&self) -> LinkMode {
        self.retry.mode()
    }

    /// Sequence numbers awaiting a reply
    pub fn pending_acks(&self) -> Vec<u8> {
        self.acks.pending()
    }

    /// Sequence numbers awaiting a reply for longer than `older_than`
    pub fn stale_acks(&self, older_than: Duration) -> Vec<u8> {
        self.acks.stale(older_than)
    }

    /// Transport configuration
    pub fn config(&self) -> &RadioConfig {
        &self.config
    }

    /// Encode a command, consuming a sequence number only on success
    fn compress(&self, command: &Command) -> Result<(Bytes, u8)> {
        let mut state = self.state.lock();
        let sequence = state.sequence.wrapping_add(1);
        let frame = self
            .compressor
            .encode(command, &state.building_context, sequence)?;
        state.sequence = sequence;
        Ok((frame, sequence))
    }

    async fn transmit_fragments(
        &self,
        link: &mut LinkSlot,
        frame: &[u8],
        sequence: u8,
        cancel: &Cancellation,
    ) -> Result<Bytes> {
        let fragments = self.fragmenter.split(frame)?;
        let count = fragments.len() as u8;

        debug!(
            sequence,
            size = frame.len(),
            fragments = count,
            "Sending fragmented frame"
        );

        let mut reply = Bytes::new();
        for fragment in fragments {
            let index = fragment.index;
            reply = self
                .retry
                .transmit(link.as_mut(), &fragment.encode(), sequence, cancel)
                .await
                .map_err(|err| match err {
                    RadioError::Cancelled | RadioError::DeadlineExceeded => err,
                    source => {
                        warn!(sequence, index, count, error = %source, "Fragment failed");
                        RadioError::FragmentFailure {
                            index,
                            count,
                            source: Box::new(source),
                        }
                    }
                })?;
        }

        Ok(reply)
    }
}

impl std::fmt::Debug for RadioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioTransport")
            .field("mode", &self.mode())
            .field("device", &self.config.device)
            .field("connected", &self.is_connected())
            .field("sequence", &self.sequence_number())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::test_utils::MockLink;

    fn config() -> RadioConfig {
        RadioConfig::builder()
            .device("/dev/mock0")
            .baud_rate(9600)
            .ack_timeout(Duration::from_secs(2))
            .build()
    }

    async fn connected(mock: &MockLink) -> RadioTransport {
        let transport = RadioTransport::new(config()).unwrap();
        transport.connect(Box::new(mock.clone())).await.unwrap();
        transport
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RadioConfig::builder().max_payload(10).build();
        assert!(matches!(
            RadioTransport::new(config),
            Err(RadioError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_opens_with_config() {
        let mock = MockLink::new();
        let transport = connected(&mock).await;

        assert!(transport.is_connected());
        assert_eq!(mock.opened_with(), Some(("/dev/mock0".to_string(), 9600)));
        assert_eq!(mock.timeout(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_link_error() {
        let mock = MockLink::new();
        mock.fail_open(true);
        let transport = RadioTransport::new(config()).unwrap();

        let err = transport.connect(Box::new(mock)).await.unwrap_err();
        assert!(matches!(err, RadioError::Link(LinkError::OpenFailed { .. })));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_link() {
        let first = MockLink::new();
        let second = MockLink::new();
        let transport = connected(&first).await;

        transport.connect(Box::new(second.clone())).await.unwrap();
        assert_eq!(first.close_count(), 1);
        assert!(second.is_open());
    }

    #[tokio::test]
    async fn test_send_decodes_reply() {
        let mock = MockLink::new();
        mock.queue_reply(MockLink::ack(1, b"21.5"));
        let transport = connected(&mock).await;

        let response = transport.send(&Command::get("/floor-1/hvac")).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.data.as_ref(), &[1, b'2', b'1', b'.', b'5']);
        assert_eq!(transport.sequence_number(), 1);
        assert!(transport.pending_acks().is_empty());
    }

    #[tokio::test]
    async fn test_send_error_reply() {
        let mock = MockLink::new();
        mock.queue_reply(MockLink::error_reply(1, "no such point"));
        let transport = connected(&mock).await;

        let response = transport.send(&Command::get("/x")).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.error.as_deref(), Some("\u{1}no such point"));
    }

    #[tokio::test]
    async fn test_short_reply_is_malformed() {
        let mock = MockLink::new();
        mock.queue_reply(Bytes::from_static(&[0x80, 1]));
        let transport = connected(&mock).await;

        let err = transport.send(&Command::get("/x")).await.unwrap_err();
        assert!(matches!(err, RadioError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unbound_transport_not_connected() {
        let transport = RadioTransport::new(config()).unwrap();
        let err = transport.send(&Command::get("/x")).await.unwrap_err();
        assert!(matches!(err, RadioError::NotConnected));
        assert_eq!(transport.sequence_number(), 0);
    }

    #[tokio::test]
    async fn test_failed_encode_keeps_sequence() {
        let mock = MockLink::new();
        let transport = connected(&mock).await;

        let long_path = format!("/{}", "x".repeat(300));
        let err = transport.send(&Command::get(long_path)).await.unwrap_err();
        assert!(matches!(err, RadioError::Encoding(_)));
        assert_eq!(transport.sequence_number(), 0);
        assert_eq!(mock.send_attempts(), 0);
    }

    #[tokio::test]
    async fn test_context_applies_to_paths() {
        let mock = MockLink::new();
        let transport = connected(&mock).await;
        transport.establish_context("HQ");
        transport.establish_context("HQ");
        assert_eq!(transport.building_context(), "HQ");

        transport
            .send(&Command::get("/building/HQ/floor-3"))
            .await
            .unwrap();

        let sent = mock.sent();
        let path_len = sent[0][3] as usize;
        assert_eq!(&sent[0][4..4 + path_len], b"B1/3");
    }

    #[tokio::test]
    async fn test_command_building_is_per_command() {
        let mock = MockLink::new();
        let transport = connected(&mock).await;
        transport.establish_context("HQ");

        transport
            .send(&Command::get("/building/ANNEX/floor-2").with_building("ANNEX"))
            .await
            .unwrap();
        transport
            .send(&Command::get("/building/ANNEX/floor-2"))
            .await
            .unwrap();

        let sent = mock.sent();
        let path = |frame: &Bytes| frame[4..4 + frame[3] as usize].to_vec();
        assert_eq!(path(&sent[0]), b"B1/2".to_vec());
        assert_eq!(path(&sent[1]), b"B1/ANNEX/2".to_vec());
        assert_eq!(transport.building_context(), "HQ");
    }

    #[tokio::test]
    async fn test_sequence_wraps() {
        let transport = RadioTransport::simulated(config()).unwrap();
        for _ in 0..256 {
            transport.send(&Command::get("/x")).await.unwrap();
        }
        assert_eq!(transport.sequence_number(), 0);
        transport.send(&Command::get("/x")).await.unwrap();
        assert_eq!(transport.sequence_number(), 1);
    }

    #[tokio::test]
    async fn test_fragmented_send_uses_final_reply() {
        let mock = MockLink::new();
        let config = RadioConfig::builder().max_payload(30).build();
        let transport = RadioTransport::new(config).unwrap();
        transport.connect(Box::new(mock.clone())).await.unwrap();

        mock.set_auto_reply(false);
        mock.queue_reply(MockLink::ack(1, b"f0"));
        mock.queue_reply(MockLink::ack(1, b"f1"));
        mock.queue_reply(MockLink::ack(1, b"done"));

        // 4 + 31 + 2 + 4 = 41 bytes, 20-byte fragment bodies
        let cmd = Command::get(format!("/{}", "a".repeat(30)));
        let response = transport.send(&cmd).await.unwrap();

        assert_eq!(mock.sent().len(), 3);
        assert!(mock.sent().iter().all(|f| f[0] == 0x08));
        assert_eq!(response.text(), "\u{1}done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragment_failure_reports_index() {
        let mock = MockLink::new();
        let config = RadioConfig::builder()
            .max_payload(30)
            .max_retries(2)
            .ack_timeout(Duration::from_secs(1))
            .build();
        let transport = RadioTransport::new(config).unwrap();
        transport.connect(Box::new(mock.clone())).await.unwrap();

        mock.set_auto_reply(false);
        mock.queue_reply(MockLink::ack(1, b"f0"));

        let cmd = Command::get(format!("/{}", "a".repeat(30)));
        let err = transport.send(&cmd).await.unwrap_err();

        match err {
            RadioError::FragmentFailure {
                index,
                count,
                source,
            } => {
                assert_eq!(index, 1);
                assert_eq!(count, 3);
                assert!(matches!(*source, RadioError::RetriesExhausted { attempts: 2, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(transport.pending_acks().is_empty());
    }

    #[tokio::test]
    async fn test_ping_error_reply_is_remote() {
        let mock = MockLink::new();
        mock.queue_reply(MockLink::error_reply(1, "busy"));
        let transport = connected(&mock).await;

        let err = transport.ping().await.unwrap_err();
        assert!(matches!(err, RadioError::Remote { status: 500, .. }));
        assert_eq!(mock.sent()[0][1], 0x07);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mock = MockLink::new();
        let transport = connected(&mock).await;

        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
        assert_eq!(mock.close_count(), 1);

        let err = transport.send(&Command::get("/x")).await.unwrap_err();
        assert!(matches!(err, RadioError::NotConnected));
    }

    #[tokio::test]
    async fn test_simulation_ignores_link() {
        let mock = MockLink::new();
        let transport = RadioTransport::simulated(config()).unwrap();
        transport.connect(Box::new(mock.clone())).await.unwrap();

        let response = transport.send(&Command::get("/x")).await.unwrap();
        assert_eq!(response.data.as_ref(), &[1, b'O', b'K']);
        assert_eq!(mock.open_count(), 0);
        assert_eq!(transport.mode(), LinkMode::Simulation);
    }
}
