//! Receive-side reassembly.
//!
//! Bytes arrive in chunks that have nothing to do with frame boundaries: a
//! chunk may carry several frames, a fragment of one, or line noise. The
//! assembler buffers everything and re-runs the same loop on each push:
//!
//! 1. find the next start marker, dropping the whole buffer if there is none
//! 2. drop anything in front of the marker
//! 3. wait until the header, then the full frame, is buffered
//! 4. validate, emit, and remove the frame's bytes whether it was valid or not
//!
//! Routing of what comes out (to the application, to the send scheduler,
//! or to the error log) is left to the caller.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::codec::{decode_frame, Decoded, Frame, HEADER_SIZE, START_MARKER};
use crate::error::FrameError;

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// One outcome of reassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A valid application frame.
    Message(Frame),
    /// A valid acknowledgment frame.
    Ack(Frame),
    /// A complete frame that failed validation and was dropped.
    Rejected(FrameError),
}

/// Counters for what the assembler has seen since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Valid frames emitted, ACKs included.
    pub frames: u64,
    /// Complete frames rejected by validation.
    pub rejected: u64,
    /// Bytes discarded while searching for a start marker.
    pub discarded_bytes: u64,
}

/// Accumulates received bytes and extracts validated frames.
#[derive(Debug)]
pub struct ReceiveAssembler {
    buf: BytesMut,
    stats: AssemblerStats,
}

impl Default for ReceiveAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiveAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            stats: AssemblerStats::default(),
        }
    }

    /// Append a received chunk and extract every frame now complete.
    ///
    /// Partial data stays buffered for the next push.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Received> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while self.buf.len() >= HEADER_SIZE {
            let Some(start) = self.buf.iter().position(|&b| b == START_MARKER) else {
                debug!(dropped = self.buf.len(), "no start marker in buffer");
                self.discard(self.buf.len());
                break;
            };
            if start > 0 {
                debug!(dropped = start, "discarding bytes before start marker");
                self.discard(start);
            }

            match decode_frame(&self.buf) {
                Decoded::NeedMoreData => break,
                Decoded::Frame { frame, consumed } => {
                    self.buf.advance(consumed);
                    self.stats.frames += 1;
                    debug!(command = frame.command, size = frame.payload.len(), "frame received");
                    if frame.is_ack() {
                        out.push(Received::Ack(frame));
                    } else {
                        out.push(Received::Message(frame));
                    }
                }
                Decoded::Invalid { error, consumed } => {
                    self.buf.advance(consumed);
                    self.stats.rejected += 1;
                    warn!(%error, "dropping invalid frame");
                    out.push(Received::Rejected(error));
                }
            }
        }
        out
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    fn discard(&mut self, count: usize) {
        self.buf.advance(count);
        self.stats.discarded_bytes += count as u64;
    }
}
