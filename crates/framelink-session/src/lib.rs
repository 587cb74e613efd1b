//! Reliable message delivery over a framelink transport.
//!
//! [`LinkCore`] owns the receive assembler and the [`SendScheduler`]:
//! received frames are delivered and acknowledged, outbound frames go out
//! one at a time and are resent until the peer acknowledges them or the
//! retry budget runs out. [`Connection`] hosts a core on two threads and
//! hands out [`LinkHandle`]s for sending.
//!
//! ```no_run
//! use framelink_session::{ChannelPresentation, Connection, LinkConfig};
//! use framelink_transport::UnixDomainSocket;
//!
//! let (transport, source) = UnixDomainSocket::connect("/tmp/framelink.sock")?;
//! let (presentation, events) = ChannelPresentation::new();
//! let conn = Connection::start(transport, source, presentation, LinkConfig::default())?;
//! conn.handle().send(0x02, b"1", true)?;
//! for event in events.iter().take(1) {
//!     println!("{event:?}");
//! }
//! conn.disconnect()?;
//! # Ok::<(), framelink_session::SessionError>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod presentation;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use config::{
    LinkConfig, SchedulerConfig, DEFAULT_ACK_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_READ_CHUNK,
    DEFAULT_TICK_INTERVAL,
};
pub use connection::{Connection, LinkHandle};
pub use error::{Result, SessionError};
pub use link::{LinkCore, LinkStats};
pub use presentation::{ChannelPresentation, LinkEvent, Presentation};
pub use scheduler::{OutboundFrame, SendScheduler};
