//! Simulated remote device: accepts one client on a Unix socket and echoes
//! every message back under the same command.
//!
//! Run with:
//!   cargo run --example echo-device
//!
//! In another terminal:
//!   cargo run --features cli -- send --unix <printed path> \
//!     --command 0x02 --data hello --wait

use std::fs;

use framelink::session::{ChannelPresentation, Connection, LinkConfig, LinkEvent};
use framelink::transport::UnixDomainSocket;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("framelink-echo-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("device.sock");

    let listener = UnixDomainSocket::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let (transport, source) = listener.accept()?;
    let (presentation, events) = ChannelPresentation::new();
    let conn = Connection::start(transport, source, presentation, LinkConfig::default())?;
    let handle = conn.handle();

    for event in events.iter() {
        match event {
            LinkEvent::Connected { peer } => eprintln!("Client connected: {peer}"),
            LinkEvent::Message { command, payload } => {
                eprintln!("Received {} bytes under command {command:#04x}", payload.len());
                handle.send(command, &payload, true)?;
            }
            LinkEvent::ReceiveError { reason } => eprintln!("Dropped frame: {reason}"),
            LinkEvent::Disconnected => break,
            _ => {}
        }
    }

    conn.disconnect()?;
    drop(listener);
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
