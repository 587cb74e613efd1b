use bytes::{BufMut, Bytes, BytesMut};

use crate::command::ACK;
use crate::error::{FrameError, Result};

/// Start marker opening every frame.
pub const START_MARKER: u8 = 0xAA;

/// End marker closing every frame.
pub const END_MARKER: u8 = 0x55;

/// Frame header: start marker (1) + command (1) + length (1) + checksum (1).
pub const HEADER_SIZE: usize = 4;

/// Frame footer: end marker (1).
pub const FOOTER_SIZE: usize = 1;

/// Maximum payload length in bytes.
pub const MAX_PAYLOAD: usize = 250;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Application opcode, or [`ACK`].
    pub command: u8,
    /// The message payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + footer).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + FOOTER_SIZE
    }

    /// Whether this is an acknowledgment frame.
    pub fn is_ack(&self) -> bool {
        self.command == ACK
    }

    /// The command an acknowledgment frame refers to.
    ///
    /// `None` for non-ACK frames and for ACKs with an empty payload.
    pub fn acked_command(&self) -> Option<u8> {
        if self.is_ack() {
            self.payload.first().copied()
        } else {
            None
        }
    }
}

/// On-wire size of a frame carrying `length` payload bytes.
pub fn frame_size(length: usize) -> usize {
    HEADER_SIZE + length + FOOTER_SIZE
}

/// Compute the frame checksum over `(command, length, payload)`.
///
/// The bytes are summed into a 16-bit accumulator and the two halves are
/// folded once: `(sum & 0xFF) + (sum >> 8)`, truncated to a byte.
///
/// This is an additive check, not a CRC. Reordering payload bytes never
/// changes it, and replacing a `0x00` byte with `0xFF` (a change of 255)
/// is cancelled by the fold whenever the low half of the sum is non-zero.
/// Changing it breaks compatibility with deployed peers and needs a
/// protocol version bump.
pub fn checksum(command: u8, length: u8, payload: &[u8]) -> u8 {
    let sum = payload
        .iter()
        .fold(u16::from(length) + u16::from(command), |acc, &b| {
            acc.wrapping_add(u16::from(b))
        });
    ((sum & 0xFF) as u8).wrapping_add((sum >> 8) as u8)
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────┬─────────┬────────┬──────────┬────────────────┬────────┐
/// │ Start  │ Command │ Length │ Checksum │ Payload        │ End    │
/// │ 0xAA   │ (1B)    │ (1B)   │ (1B)     │ (Length bytes) │ 0x55   │
/// └────────┴─────────┴────────┴──────────┴────────────────┴────────┘
/// ```
pub fn encode_frame(command: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    let length = payload.len() as u8;
    dst.reserve(frame_size(payload.len()));
    dst.put_u8(START_MARKER);
    dst.put_u8(command);
    dst.put_u8(length);
    dst.put_u8(checksum(command, length, payload));
    dst.put_slice(payload);
    dst.put_u8(END_MARKER);
    Ok(())
}

/// Encode a single frame into its own buffer.
pub fn encode_to_bytes(command: u8, payload: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(frame_size(payload.len()));
    encode_frame(command, payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Result of decoding the frame at the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A valid frame occupying the first `consumed` bytes.
    Frame { frame: Frame, consumed: usize },
    /// The buffer holds only part of a frame.
    NeedMoreData,
    /// A complete but invalid frame occupying the first `consumed` bytes.
    Invalid { error: FrameError, consumed: usize },
}

/// Validate the frame at the front of `src`.
///
/// `src` must already be aligned on a start marker; finding one is the
/// job of [`ReceiveAssembler`](crate::ReceiveAssembler). Nothing is
/// consumed here, the caller drops `consumed` bytes afterwards.
pub fn decode_frame(src: &[u8]) -> Decoded {
    if src.len() < HEADER_SIZE {
        return Decoded::NeedMoreData;
    }
    debug_assert_eq!(src[0], START_MARKER);

    let command = src[1];
    let length = src[2];
    let expected = frame_size(usize::from(length));
    if src.len() < expected {
        return Decoded::NeedMoreData;
    }

    if usize::from(length) > MAX_PAYLOAD {
        return Decoded::Invalid {
            error: FrameError::LengthOutOfRange {
                length,
                max: MAX_PAYLOAD,
            },
            consumed: expected,
        };
    }

    let payload = &src[HEADER_SIZE..HEADER_SIZE + usize::from(length)];
    let computed = checksum(command, length, payload);
    if computed != src[3] {
        return Decoded::Invalid {
            error: FrameError::ChecksumMismatch {
                command,
                expected: computed,
                actual: src[3],
            },
            consumed: expected,
        };
    }

    let end = src[expected - 1];
    if end != END_MARKER {
        return Decoded::Invalid {
            error: FrameError::MissingEndMarker {
                command,
                found: end,
            },
            consumed: expected,
        };
    }

    Decoded::Frame {
        frame: Frame::new(command, Bytes::copy_from_slice(payload)),
        consumed: expected,
    }
}
