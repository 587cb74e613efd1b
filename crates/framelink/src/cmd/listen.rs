use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use framelink_session::{ChannelPresentation, Connection, LinkEvent};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, open_endpoint, wait_until_idle, ListenArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let endpoint = open_endpoint(&args.endpoint)?;
    let peer = endpoint.peer.clone();

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (presentation, events) = ChannelPresentation::new();
    let conn = Connection::start(endpoint.transport, endpoint.source, presentation, config.clone())
        .map_err(|err| session_error("link start failed", err))?;
    info!(%peer, "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match events.recv_timeout(POLL) {
            Ok(LinkEvent::Message { command, payload }) => {
                print_message(command, &payload, &peer, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Ok(LinkEvent::ReceiveError { reason }) => warn!(%reason, "dropped inbound frame"),
            Ok(LinkEvent::SendError { reason }) => debug!(%reason, "acknowledgment problem"),
            Ok(LinkEvent::Disconnected) => {
                info!("peer closed the link");
                break;
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    wait_until_idle(&conn.handle(), config.tick_interval, config.tick_interval * 10);
    conn.disconnect()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}
