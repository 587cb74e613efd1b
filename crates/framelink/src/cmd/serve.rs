//! Local stand-in for a remote device: every message is echoed back under
//! the command it arrived with.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use framelink_session::{
    ChannelPresentation, Connection, LinkEvent, LinkHandle, Presentation, SessionError,
};
use framelink_transport::{Transport, UnixDomainSocket};
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, ServeArgs};
use crate::exit::{session_error, transport_error, CliResult, SUCCESS};

const POLL: Duration = Duration::from_millis(200);
const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "serving");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let Some((transport, source)) = listener
            .try_accept()
            .map_err(|err| transport_error("accept failed", err))?
        else {
            thread::sleep(ACCEPT_POLL);
            continue;
        };
        let (presentation, events) = ChannelPresentation::new();
        let conn = Connection::start(transport, source, presentation, config.clone())
            .map_err(|err| session_error("link start failed", err))?;

        let echoed = echo_until_closed(&conn.handle(), &events, &running, !args.no_ack);
        info!(echoed, "client finished");
        if let Err(err) = conn.disconnect() {
            warn!(error = %err, "disconnect failed");
        }

        if args.once {
            break;
        }
    }

    Ok(SUCCESS)
}

trait EchoSink {
    fn echo(&self, command: u8, payload: &[u8], requires_ack: bool) -> Result<(), SessionError>;
}

impl<T: Transport, P: Presentation> EchoSink for LinkHandle<T, P> {
    fn echo(&self, command: u8, payload: &[u8], requires_ack: bool) -> Result<(), SessionError> {
        self.send(command, payload, requires_ack)
    }
}

/// Echo messages until the link closes or shutdown is requested.
/// Returns how many messages were queued for echo.
fn echo_until_closed<S: EchoSink>(
    sink: &S,
    events: &Receiver<LinkEvent>,
    running: &AtomicBool,
    requires_ack: bool,
) -> usize {
    let mut echoed = 0usize;
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL) {
            Ok(LinkEvent::Connected { peer }) => info!(%peer, "client connected"),
            Ok(LinkEvent::Message { command, payload }) => {
                info!(command, size = payload.len(), "echoing message");
                match sink.echo(command, &payload, requires_ack) {
                    Ok(()) => echoed += 1,
                    Err(SessionError::TransportNotOpen) => break,
                    Err(err) => warn!(command, error = %err, "echo rejected"),
                }
            }
            Ok(LinkEvent::SendResult {
                command,
                success: false,
            }) => warn!(command, "echo not delivered"),
            Ok(LinkEvent::ReceiveError { reason }) => warn!(%reason, "dropped inbound frame"),
            Ok(LinkEvent::Disconnected) => break,
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    echoed
}
