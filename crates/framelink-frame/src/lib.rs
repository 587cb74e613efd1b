//! Frame codec and receive-side reassembly for framelink.
//!
//! Every message travels as one frame:
//! - a start marker (`0xAA`) for stream resynchronization
//! - a 1-byte command, a 1-byte payload length and a 1-byte checksum
//! - up to [`MAX_PAYLOAD`] payload bytes
//! - an end marker (`0x55`)
//!
//! [`ReceiveAssembler`] turns an arbitrary, possibly corrupted byte stream
//! back into validated frames.

pub mod assembler;
pub mod codec;
pub mod command;
pub mod error;

pub use assembler::{AssemblerStats, ReceiveAssembler, Received};
pub use codec::{
    checksum, decode_frame, encode_frame, encode_to_bytes, frame_size, Decoded, Frame, END_MARKER,
    FOOTER_SIZE, HEADER_SIZE, MAX_PAYLOAD, START_MARKER,
};
pub use command::{command_name, is_ack, ACK, LEGACY};
pub use error::{FrameError, Result};
