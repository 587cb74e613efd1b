use std::collections::VecDeque;
use std::fs;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use framelink_frame::{is_ack, FrameError, LEGACY, MAX_PAYLOAD};
use framelink_session::{ChannelPresentation, Connection, LinkEvent};
use tracing::{debug, warn};

use crate::cmd::{open_endpoint, parse_duration, parse_hex, wait_until_idle, SendArgs};
use crate::exit::{
    frame_error, session_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, TRANSPORT_ERROR,
    USAGE,
};
use crate::output::{print_message, print_send_result, OutputFormat};

const SEND_SLACK: Duration = Duration::from_secs(1);

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.link.to_config()?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;
    if payload.len() > MAX_PAYLOAD {
        return Err(frame_error(
            "invalid payload",
            FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            },
        ));
    }

    let (command, requires_ack) = if args.legacy {
        (LEGACY, true)
    } else {
        (args.command, !args.no_ack)
    };
    if is_ack(command) {
        return Err(CliError::new(
            USAGE,
            format!("command {command:#04x} is reserved for acknowledgments"),
        ));
    }

    let endpoint = open_endpoint(&args.endpoint)?;
    let peer = endpoint.peer.clone();
    let (presentation, events) = ChannelPresentation::new();
    let conn = Connection::start(endpoint.transport, endpoint.source, presentation, config.clone())
        .map_err(|err| session_error("link start failed", err))?;
    let handle = conn.handle();

    if args.legacy {
        handle.send_legacy(&payload)
    } else {
        handle.send(command, &payload, requires_ack)
    }
    .map_err(|err| session_error("send failed", err))?;

    // Every attempt, plus slack for heartbeat jitter.
    let budget = config.scheduler.delivery_deadline() + config.tick_interval * 4 + SEND_SLACK;
    let mut replies = VecDeque::new();
    await_send_result(&events, command, budget, &mut replies)?;

    if args.wait {
        let (reply_command, reply) = await_reply(&events, wait_timeout, &mut replies)?;
        print_message(reply_command, &reply, &peer, format);
        // Let the acknowledgment for the reply go out.
        wait_until_idle(&handle, config.tick_interval, config.scheduler.ack_timeout);
    } else {
        print_send_result(command, requires_ack, &peer, format);
    }

    conn.disconnect()
        .map_err(|err| session_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

/// Block until the link reports the outcome of `command`.
///
/// Messages that arrive meanwhile are kept in `replies`.
fn await_send_result(
    events: &Receiver<LinkEvent>,
    command: u8,
    timeout: Duration,
    replies: &mut VecDeque<(u8, Bytes)>,
) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(LinkEvent::SendResult {
                command: done,
                success,
            }) if done == command => {
                if success {
                    debug!(command, "send completed");
                    return Ok(());
                }
                let reason = last_error.unwrap_or_else(|| "no further detail".to_string());
                return Err(CliError::new(
                    FAILURE,
                    format!("send of command {command:#04x} failed: {reason}"),
                ));
            }
            Ok(LinkEvent::SendError { reason }) => {
                warn!(%reason, "send problem");
                last_error = Some(reason);
            }
            Ok(LinkEvent::Message { command, payload }) => replies.push_back((command, payload)),
            Ok(LinkEvent::ReceiveError { reason }) => warn!(%reason, "dropped inbound frame"),
            Ok(LinkEvent::Disconnected) => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    "link closed before the send completed",
                ));
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no send result for command {command:#04x} within {timeout:?}"),
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(TRANSPORT_ERROR, "link went away"));
            }
        }
    }
}

fn await_reply(
    events: &Receiver<LinkEvent>,
    timeout: Duration,
    replies: &mut VecDeque<(u8, Bytes)>,
) -> CliResult<(u8, Bytes)> {
    if let Some(reply) = replies.pop_front() {
        return Ok(reply);
    }
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(LinkEvent::Message { command, payload }) => return Ok((command, payload)),
            Ok(LinkEvent::ReceiveError { reason }) => warn!(%reason, "dropped inbound frame"),
            Ok(LinkEvent::Disconnected) | Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(
                    TRANSPORT_ERROR,
                    "link closed while waiting for a reply",
                ));
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no reply within {timeout:?}"),
                ));
            }
        }
    }
}
