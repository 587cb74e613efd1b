/// Errors that can occur during frame encoding/decoding.
///
/// Everything except [`FrameError::PayloadTooLarge`] describes a frame that
/// arrived complete but failed validation; those are dropped by the
/// receive path and never abort the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the protocol maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The transmitted checksum does not match the recomputed one.
    #[error("checksum mismatch on command {command:#04x} (expected {expected:#04x}, got {actual:#04x})")]
    ChecksumMismatch { command: u8, expected: u8, actual: u8 },

    /// The byte after the payload is not the end marker.
    #[error("missing end marker on command {command:#04x} (found {found:#04x})")]
    MissingEndMarker { command: u8, found: u8 },

    /// The length byte announces more payload than the protocol allows.
    #[error("declared length {length} exceeds maximum {max}")]
    LengthOutOfRange { length: u8, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
