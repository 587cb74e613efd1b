//! Send-side scheduling.
//!
//! At most one frame that needs acknowledgment is on the wire at a time.
//! That is what lets an ACK be matched to its frame by command byte alone:
//! there is never a second candidate. Everything else waits in a FIFO
//! queue and goes out on the next heartbeat tick once the in-flight slot
//! is free. Retries of the in-flight frame always precede newer entries.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;
use framelink_frame::{encode_to_bytes, FrameError, MAX_PAYLOAD};
use framelink_transport::{Transport, TransportError};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{Result, SessionError};
use crate::presentation::Presentation;

/// A frame waiting for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub command: u8,
    pub payload: Bytes,
    pub requires_ack: bool,
}

#[derive(Debug)]
struct InFlight {
    frame: OutboundFrame,
    wire: Bytes,
}

/// Owns the outbound queue, the in-flight slot and the ack-wait timer.
///
/// The timer is a deadline rather than a callback: [`poll_ack_timeout`]
/// fires [`on_ack_timeout`] once it has passed. Every time-dependent
/// operation takes `now` from the caller.
///
/// [`poll_ack_timeout`]: SendScheduler::poll_ack_timeout
/// [`on_ack_timeout`]: SendScheduler::on_ack_timeout
#[derive(Debug)]
pub struct SendScheduler {
    queue: VecDeque<OutboundFrame>,
    in_flight: Option<InFlight>,
    retry_count: u32,
    awaiting_ack: bool,
    ack_deadline: Option<Instant>,
    config: SchedulerConfig,
}

impl Default for SendScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl SendScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            retry_count: 0,
            awaiting_ack: false,
            ack_deadline: None,
            config,
        }
    }

    /// Queue a frame for transmission. Never blocks.
    pub fn enqueue(&mut self, command: u8, payload: &[u8], requires_ack: bool) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            }
            .into());
        }
        self.queue.push_back(OutboundFrame {
            command,
            payload: Bytes::copy_from_slice(payload),
            requires_ack,
        });
        debug!(
            command,
            size = payload.len(),
            requires_ack,
            queued = self.queue.len(),
            "frame queued"
        );
        Ok(())
    }

    /// Heartbeat: send the next queued frame if nothing is awaiting an ACK.
    pub fn tick<T, P>(&mut self, now: Instant, transport: &mut T, presentation: &mut P)
    where
        T: Transport + ?Sized,
        P: Presentation + ?Sized,
    {
        if self.awaiting_ack {
            return;
        }
        let Some(frame) = self.queue.pop_front() else {
            return;
        };
        let command = frame.command;

        let wire = match encode_to_bytes(command, &frame.payload) {
            Ok(wire) => wire,
            Err(err) => {
                let err = SessionError::from(err);
                warn!(command, error = %err, "dropping unencodable frame");
                presentation.on_send_error(&err);
                presentation.on_send_result(command, false);
                return;
            }
        };

        match write_frame(transport, &wire, command) {
            Ok(()) => {}
            // A short write of an acknowledged frame counts as lost in
            // transit: the ack timer runs and the retry resends it.
            Err(err @ SessionError::WriteIncomplete { .. }) if frame.requires_ack => {
                warn!(command, error = %err, "short write, awaiting retry");
                presentation.on_send_error(&err);
            }
            Err(err) => {
                warn!(command, error = %err, "send failed");
                presentation.on_send_error(&err);
                presentation.on_send_result(command, false);
                return;
            }
        }

        if frame.requires_ack {
            debug!(command, "frame sent, awaiting ack");
            self.in_flight = Some(InFlight { frame, wire });
            self.awaiting_ack = true;
            self.retry_count = 0;
            self.ack_deadline = Some(now + self.config.ack_timeout);
        } else {
            debug!(command, "frame sent");
            presentation.on_send_result(command, true);
        }
    }

    /// Match an incoming ACK against the in-flight frame.
    ///
    /// Returns whether the ACK was accepted. ACKs for anything other than
    /// the in-flight command are stale duplicates and are ignored.
    pub fn on_ack_received<P>(&mut self, command: u8, presentation: &mut P) -> bool
    where
        P: Presentation + ?Sized,
    {
        let matches = self.awaiting_ack
            && self
                .in_flight
                .as_ref()
                .is_some_and(|f| f.frame.command == command);
        if !matches {
            debug!(command, "ignoring unmatched ack");
            return false;
        }

        debug!(command, retries = self.retry_count, "ack received");
        self.release();
        presentation.on_send_result(command, true);
        true
    }

    /// Fire the ack timeout if its deadline has passed.
    pub fn poll_ack_timeout<T, P>(&mut self, now: Instant, transport: &mut T, presentation: &mut P)
    where
        T: Transport + ?Sized,
        P: Presentation + ?Sized,
    {
        if self.awaiting_ack && self.ack_deadline.is_some_and(|deadline| now >= deadline) {
            self.on_ack_timeout(now, transport, presentation);
        }
    }

    /// Resend the in-flight frame, or abandon it once retries run out.
    pub fn on_ack_timeout<T, P>(&mut self, now: Instant, transport: &mut T, presentation: &mut P)
    where
        T: Transport + ?Sized,
        P: Presentation + ?Sized,
    {
        if !self.awaiting_ack {
            return;
        }
        let Some(in_flight) = self.in_flight.as_ref() else {
            self.release();
            return;
        };
        let command = in_flight.frame.command;
        let wire = in_flight.wire.clone();

        if self.retry_count >= self.config.max_retries {
            let err = SessionError::MaxRetriesExceeded {
                command,
                attempts: self.retry_count + 1,
            };
            warn!(command, error = %err, "abandoning frame");
            self.release();
            presentation.on_send_error(&err);
            presentation.on_send_result(command, false);
            return;
        }

        self.retry_count += 1;
        let timeout = SessionError::AckTimeout {
            command,
            attempt: self.retry_count,
            timeout: self.config.ack_timeout,
        };
        warn!(command, attempt = self.retry_count, "ack timeout, resending");
        presentation.on_send_error(&timeout);

        match write_frame(transport, &wire, command) {
            Ok(()) => {}
            Err(err @ SessionError::WriteIncomplete { .. }) => {
                warn!(command, error = %err, "short write on retry");
                presentation.on_send_error(&err);
            }
            Err(err) => {
                warn!(command, error = %err, "retry failed, abandoning frame");
                self.release();
                presentation.on_send_error(&err);
                presentation.on_send_result(command, false);
                return;
            }
        }
        self.ack_deadline = Some(now + self.config.ack_timeout);
    }

    /// Drop the queue and the in-flight frame without sending anything.
    ///
    /// The in-flight frame is reported as failed; queued frames were never
    /// started and are discarded silently. Returns how many frames were
    /// dropped in total.
    pub fn flush<P>(&mut self, presentation: &mut P) -> usize
    where
        P: Presentation + ?Sized,
    {
        let queued = self.queue.len();
        self.queue.clear();

        let aborted = self.in_flight.as_ref().map(|f| f.frame.command);
        self.release();
        if let Some(command) = aborted {
            let err = SessionError::Aborted { command };
            presentation.on_send_error(&err);
            presentation.on_send_result(command, false);
        }

        let dropped = queued + usize::from(aborted.is_some());
        if dropped > 0 {
            info!(queued, in_flight = aborted.is_some(), "send queue flushed");
        }
        dropped
    }

    /// Frames waiting behind the in-flight slot.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Command of the frame currently awaiting acknowledgment.
    pub fn in_flight_command(&self) -> Option<u8> {
        self.in_flight.as_ref().map(|f| f.frame.command)
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn ack_deadline(&self) -> Option<Instant> {
        self.ack_deadline
    }

    fn release(&mut self) {
        self.in_flight = None;
        self.awaiting_ack = false;
        self.retry_count = 0;
        self.ack_deadline = None;
    }
}

fn write_frame<T>(transport: &mut T, wire: &[u8], command: u8) -> Result<()>
where
    T: Transport + ?Sized,
{
    if !transport.is_open() {
        return Err(SessionError::TransportNotOpen);
    }
    if !transport.is_writable() {
        return Err(TransportError::NotWritable.into());
    }
    let written = transport.write(wire)?;
    if written != wire.len() {
        return Err(SessionError::WriteIncomplete {
            command,
            written,
            expected: wire.len(),
        });
    }
    Ok(())
}
