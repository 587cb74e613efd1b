use std::time::Duration;

/// Errors raised by the session layer.
///
/// None of these are fatal to the link; each one concerns a single message
/// and is reported upward for the caller to react to.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] framelink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] framelink_frame::FrameError),

    /// The link is not connected; the send was rejected without queueing.
    #[error("transport not open")]
    TransportNotOpen,

    /// The transport accepted fewer bytes than the frame holds.
    #[error("incomplete write for command {command:#04x} ({written} of {expected} bytes)")]
    WriteIncomplete {
        command: u8,
        written: usize,
        expected: usize,
    },

    /// No acknowledgment arrived in time; the frame will be resent.
    #[error("no acknowledgment for command {command:#04x} within {timeout:?} (attempt {attempt})")]
    AckTimeout {
        command: u8,
        attempt: u32,
        timeout: Duration,
    },

    /// Every retry went unacknowledged; the frame was abandoned.
    #[error("command {command:#04x} not acknowledged after {attempts} attempts")]
    MaxRetriesExceeded { command: u8, attempts: u32 },

    /// The link was disconnected while the frame awaited acknowledgment.
    #[error("send of command {command:#04x} aborted by disconnect")]
    Aborted { command: u8 },

    /// An acknowledgment frame arrived without the acknowledged command byte.
    #[error("acknowledgment frame carries no command byte")]
    MalformedAck,
}

pub type Result<T> = std::result::Result<T, SessionError>;
