use std::time::Instant;

use framelink_frame::{ReceiveAssembler, Received, ACK, LEGACY};
use framelink_transport::{Transport, TransportError};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SessionError};
use crate::presentation::Presentation;
use crate::scheduler::SendScheduler;

/// Snapshot of link counters and scheduler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub discarded_bytes: u64,
    pub queued: usize,
    pub awaiting_ack: bool,
    pub retry_count: u32,
}

/// Sole owner of the receive buffer, the send queue, the in-flight slot,
/// the transport and the presentation sink.
///
/// The three event sources of a link (received bytes, the dispatch tick,
/// the ack timeout) each map to one method here. Whoever hosts a
/// `LinkCore` must never run two of them concurrently; [`Connection`]
/// serializes them behind a single mutex.
///
/// [`Connection`]: crate::Connection
pub struct LinkCore<T, P> {
    transport: T,
    presentation: P,
    assembler: ReceiveAssembler,
    scheduler: SendScheduler,
    enabled: bool,
}

impl<T: Transport, P: Presentation> LinkCore<T, P> {
    /// Create a disabled link over an already connected transport.
    pub fn new(transport: T, presentation: P, config: SchedulerConfig) -> Self {
        Self {
            transport,
            presentation,
            assembler: ReceiveAssembler::new(),
            scheduler: SendScheduler::new(config),
            enabled: false,
        }
    }

    /// Start accepting traffic. Protocol state starts fresh.
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }
        self.enabled = true;
        self.assembler.clear();
        let peer = self.transport.peer_name();
        info!(%peer, "link enabled");
        self.presentation.on_connected(&peer);
    }

    /// Stop accepting traffic and flush all pending sends.
    ///
    /// Returns the number of frames dropped.
    pub fn disable(&mut self) -> usize {
        if !self.enabled {
            return 0;
        }
        self.enabled = false;
        let dropped = self.scheduler.flush(&mut self.presentation);
        self.assembler.clear();
        info!(dropped, "link disabled");
        self.presentation.on_disconnected();
        dropped
    }

    /// Whether sends are currently accepted.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.transport.is_open()
    }

    /// Queue an application message. Transmission happens on a later tick.
    pub fn send(&mut self, command: u8, payload: &[u8], requires_ack: bool) -> Result<()> {
        if !self.is_enabled() {
            warn!(command, "send rejected, link not open");
            return Err(SessionError::TransportNotOpen);
        }
        self.scheduler.enqueue(command, payload, requires_ack)
    }

    /// Queue an acknowledged message under the legacy command.
    pub fn send_legacy(&mut self, payload: &[u8]) -> Result<()> {
        self.send(LEGACY, payload, true)
    }

    /// Feed a received chunk through reassembly and route the results.
    pub fn on_bytes_received(&mut self, chunk: &[u8]) {
        if !self.enabled {
            debug!(size = chunk.len(), "ignoring bytes on disabled link");
            return;
        }
        for received in self.assembler.push(chunk) {
            match received {
                Received::Message(frame) => {
                    let command = frame.command;
                    self.presentation.on_message(command, frame.payload);
                    if let Err(err) = self.scheduler.enqueue(ACK, &[command], false) {
                        warn!(command, error = %err, "failed to queue ack");
                    }
                }
                Received::Ack(frame) => match frame.acked_command() {
                    Some(command) => {
                        self.scheduler
                            .on_ack_received(command, &mut self.presentation);
                    }
                    None => {
                        warn!("ack frame without payload");
                        self.presentation
                            .on_receive_error(&SessionError::MalformedAck);
                    }
                },
                Received::Rejected(error) => {
                    self.presentation
                        .on_receive_error(&SessionError::Frame(error));
                }
            }
        }
    }

    /// Dispatch heartbeat.
    pub fn tick(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        self.scheduler
            .tick(now, &mut self.transport, &mut self.presentation);
    }

    /// Ack-timeout source: fires the scheduler's timeout once due.
    pub fn poll_ack_timeout(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        self.scheduler
            .poll_ack_timeout(now, &mut self.transport, &mut self.presentation);
    }

    /// The receive side failed; report it and take the link down.
    pub fn on_transport_error(&mut self, error: TransportError) {
        warn!(%error, "receive side failed");
        self.presentation
            .on_receive_error(&SessionError::Transport(error));
        self.disable();
    }

    /// Disable the link and close the transport.
    pub fn close(&mut self) -> Result<()> {
        self.disable();
        self.transport.close()?;
        Ok(())
    }

    pub fn stats(&self) -> LinkStats {
        let asm = self.assembler.stats();
        LinkStats {
            frames_received: asm.frames,
            frames_rejected: asm.rejected,
            discarded_bytes: asm.discarded_bytes,
            queued: self.scheduler.queue_len(),
            awaiting_ack: self.scheduler.is_awaiting_ack(),
            retry_count: self.scheduler.retry_count(),
        }
    }

    pub fn scheduler(&self) -> &SendScheduler {
        &self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::Receiver;

    use bytes::Bytes;
    use framelink_frame::encode_to_bytes;

    use super::*;
    use crate::presentation::{ChannelPresentation, LinkEvent};
    use crate::testing::{drain, send_results, MockTransport};

    fn enabled_link() -> (
        LinkCore<MockTransport, ChannelPresentation>,
        Receiver<LinkEvent>,
    ) {
        let (presentation, rx) = ChannelPresentation::new();
        let mut link = LinkCore::new(
            MockTransport::new(),
            presentation,
            SchedulerConfig::default(),
        );
        link.enable();
        assert_eq!(
            drain(&rx),
            vec![LinkEvent::Connected {
                peer: "mock".to_string()
            }]
        );
        (link, rx)
    }

    fn wire(command: u8, payload: &[u8]) -> Vec<u8> {
        encode_to_bytes(command, payload).unwrap().to_vec()
    }

    #[test]
    fn received_message_is_delivered_then_acked() {
        let (mut link, rx) = enabled_link();

        link.on_bytes_received(&wire(0x02, b"1"));
        assert_eq!(
            drain(&rx),
            vec![LinkEvent::Message {
                command: 0x02,
                payload: Bytes::from_static(b"1")
            }]
        );
        assert_eq!(link.stats().queued, 1);

        link.tick(Instant::now());
        assert_eq!(link.transport().writes, vec![wire(ACK, &[0x02])]);
        assert_eq!(send_results(&drain(&rx)), vec![(ACK, true)]);
    }

    #[test]
    fn received_ack_completes_send() {
        let (mut link, rx) = enabled_link();

        link.send(0x02, &[0x31], true).unwrap();
        link.tick(Instant::now());
        assert!(link.stats().awaiting_ack);

        link.on_bytes_received(&wire(ACK, &[0x02]));
        assert!(!link.stats().awaiting_ack);
        assert_eq!(send_results(&drain(&rx)), vec![(0x02, true)]);
    }

    #[test]
    fn empty_ack_is_reported() {
        let (mut link, rx) = enabled_link();
        link.on_bytes_received(&wire(ACK, &[]));
        assert_eq!(
            drain(&rx),
            vec![LinkEvent::ReceiveError {
                reason: SessionError::MalformedAck.to_string()
            }]
        );
    }

    #[test]
    fn corrupted_frame_is_reported_not_delivered() {
        let (mut link, rx) = enabled_link();
        let mut bytes = wire(0x02, b"abc");
        bytes[5] ^= 0x01;

        link.on_bytes_received(&bytes);
        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            LinkEvent::ReceiveError { reason } if reason.contains("checksum")
        ));
        assert_eq!(link.stats().frames_rejected, 1);
        assert_eq!(link.stats().queued, 0);
    }

    #[test]
    fn noise_then_frame_yields_one_message() {
        let (mut link, rx) = enabled_link();
        let mut bytes = vec![0x11, 0x22, 0x33, 0x44, 0x55];
        bytes.extend(wire(0x07, b"hello"));

        link.on_bytes_received(&bytes[..3]);
        link.on_bytes_received(&bytes[3..9]);
        link.on_bytes_received(&bytes[9..]);

        let messages: Vec<LinkEvent> = drain(&rx)
            .into_iter()
            .filter(|e| matches!(e, LinkEvent::Message { .. }))
            .collect();
        assert_eq!(
            messages,
            vec![LinkEvent::Message {
                command: 0x07,
                payload: Bytes::from_static(b"hello")
            }]
        );
    }

    #[test]
    fn send_on_disabled_link_is_rejected() {
        let (presentation, rx) = ChannelPresentation::new();
        let mut link = LinkCore::new(
            MockTransport::new(),
            presentation,
            SchedulerConfig::default(),
        );

        let err = link.send(0x02, b"x", true).unwrap_err();
        assert!(matches!(err, SessionError::TransportNotOpen));
        assert_eq!(link.stats().queued, 0);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn send_on_closed_transport_is_rejected() {
        let (mut link, _rx) = enabled_link();
        link.transport_mut().open = false;
        assert!(matches!(
            link.send(0x02, b"x", true),
            Err(SessionError::TransportNotOpen)
        ));
    }

    #[test]
    fn legacy_send_uses_command_zero_with_ack() {
        let (mut link, _rx) = enabled_link();
        link.send_legacy(b"old").unwrap();
        link.tick(Instant::now());
        assert_eq!(link.transport().writes, vec![wire(LEGACY, b"old")]);
        assert_eq!(link.scheduler().in_flight_command(), Some(LEGACY));
    }

    #[test]
    fn disable_flushes_and_reports() {
        let (mut link, rx) = enabled_link();
        link.send(0x02, b"a", true).unwrap();
        link.tick(Instant::now());
        link.send(0x03, b"b", true).unwrap();
        link.on_bytes_received(&wire(0x09, b"part")[..3]);

        assert_eq!(link.disable(), 2);
        let events = drain(&rx);
        assert_eq!(send_results(&events), vec![(0x02, false)]);
        assert_eq!(events.last(), Some(&LinkEvent::Disconnected));
        assert_eq!(link.disable(), 0);

        // Ticks and received bytes are ignored until re-enabled.
        link.tick(Instant::now());
        link.on_bytes_received(&wire(0x09, b"late"));
        assert_eq!(link.transport().writes.len(), 1);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn close_disables_and_closes_transport() {
        let (mut link, rx) = enabled_link();
        link.close().unwrap();
        assert!(!link.transport().open);
        assert!(!link.is_enabled());
        assert_eq!(drain(&rx), vec![LinkEvent::Disconnected]);
    }

    #[test]
    fn transport_error_disables_link() {
        let (mut link, rx) = enabled_link();
        link.on_transport_error(TransportError::Io(std::io::Error::other("hangup")));
        let events = drain(&rx);
        assert!(matches!(
            &events[0],
            LinkEvent::ReceiveError { reason } if reason.contains("hangup")
        ));
        assert_eq!(events.last(), Some(&LinkEvent::Disconnected));
        assert!(!link.is_enabled());
    }
}
