use std::sync::mpsc::{self, Receiver, Sender};

use bytes::Bytes;

use crate::error::SessionError;

/// Receiver of everything the link reports upward.
///
/// Callbacks run while the link's state is locked, so implementations
/// must not call back into the link. Forward to another thread instead,
/// as [`ChannelPresentation`] does.
pub trait Presentation: Send {
    /// A validated application message arrived.
    fn on_message(&mut self, command: u8, payload: Bytes);

    /// Final outcome of one outbound frame.
    fn on_send_result(&mut self, command: u8, success: bool);

    /// A received frame was dropped or the receive side failed.
    fn on_receive_error(&mut self, error: &SessionError);

    /// A send-side condition worth surfacing (short write, timeout, abort).
    fn on_send_error(&mut self, _error: &SessionError) {}

    /// The link started accepting traffic.
    fn on_connected(&mut self, _peer: &str) {}

    /// The link stopped; queued sends were dropped.
    fn on_disconnected(&mut self) {}
}

impl<P: Presentation + ?Sized> Presentation for Box<P> {
    fn on_message(&mut self, command: u8, payload: Bytes) {
        (**self).on_message(command, payload)
    }

    fn on_send_result(&mut self, command: u8, success: bool) {
        (**self).on_send_result(command, success)
    }

    fn on_receive_error(&mut self, error: &SessionError) {
        (**self).on_receive_error(error)
    }

    fn on_send_error(&mut self, error: &SessionError) {
        (**self).on_send_error(error)
    }

    fn on_connected(&mut self, peer: &str) {
        (**self).on_connected(peer)
    }

    fn on_disconnected(&mut self) {
        (**self).on_disconnected()
    }
}

/// A [`Presentation`] callback captured as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected { peer: String },
    Message { command: u8, payload: Bytes },
    SendResult { command: u8, success: bool },
    ReceiveError { reason: String },
    SendError { reason: String },
    Disconnected,
}

/// Forwards every callback as a [`LinkEvent`] over a channel.
#[derive(Debug, Clone)]
pub struct ChannelPresentation {
    tx: Sender<LinkEvent>,
}

impl ChannelPresentation {
    /// Create a presentation and the receiver its events arrive on.
    pub fn new() -> (Self, Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: LinkEvent) {
        // The receiver going away only means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl Presentation for ChannelPresentation {
    fn on_message(&mut self, command: u8, payload: Bytes) {
        self.emit(LinkEvent::Message { command, payload });
    }

    fn on_send_result(&mut self, command: u8, success: bool) {
        self.emit(LinkEvent::SendResult { command, success });
    }

    fn on_receive_error(&mut self, error: &SessionError) {
        self.emit(LinkEvent::ReceiveError {
            reason: error.to_string(),
        });
    }

    fn on_send_error(&mut self, error: &SessionError) {
        self.emit(LinkEvent::SendError {
            reason: error.to_string(),
        });
    }

    fn on_connected(&mut self, peer: &str) {
        self.emit(LinkEvent::Connected {
            peer: peer.to_string(),
        });
    }

    fn on_disconnected(&mut self) {
        self.emit(LinkEvent::Disconnected);
    }
}
