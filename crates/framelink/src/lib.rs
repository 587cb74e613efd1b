//! Framed, acknowledged messaging over unreliable byte streams.
//!
//! framelink moves short command/payload messages over serial links
//! (RFCOMM, USB-serial) and local sockets, resynchronising after noise
//! and resending until the peer acknowledges.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream endpoints (serial devices, Unix sockets)
//! - [`frame`]: wire codec and receive reassembly
//! - [`session`]: acknowledged delivery and the threaded connection (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use framelink_session::*;
}
