//! Reserved command values.
//!
//! Apart from these, command bytes are application-defined and opaque to
//! the link layer.

/// Acknowledgment. The payload is the single command byte being acknowledged.
pub const ACK: u8 = 0x01;

/// Command used by the single-argument legacy send.
pub const LEGACY: u8 = 0x00;

/// Returns a human-readable name for a command value.
pub fn command_name(command: u8) -> &'static str {
    match command {
        ACK => "ACK",
        LEGACY => "LEGACY",
        _ => "APP",
    }
}

/// Returns true if the command marks an acknowledgment frame.
pub fn is_ack(command: u8) -> bool {
    command == ACK
}
