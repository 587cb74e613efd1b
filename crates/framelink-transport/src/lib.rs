//! Byte-stream transport abstraction for framelink.
//!
//! The link layer only needs three things from the wire underneath it:
//! whether it is open, a raw `write` that reports how many bytes were
//! accepted, and a source of received chunks. [`Transport`] and
//! [`ByteSource`] capture that contract.
//!
//! Two endpoints are provided on Unix:
//! - serial character devices (`/dev/rfcomm0`, `/dev/ttyUSB0`, ...) in raw mode
//! - Unix domain sockets, used to simulate a remote device locally

pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod device;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use traits::{ByteSource, Inbound, Transport};

#[cfg(unix)]
pub use device::{open_device, DeviceConfig, DeviceSource, DeviceTransport};
#[cfg(unix)]
pub use uds::{SocketSource, SocketTransport, UnixDomainSocket};
