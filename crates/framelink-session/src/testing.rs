//! Shared fixtures for unit tests.

use std::sync::mpsc::Receiver;

use framelink_transport::{Transport, TransportError};

use crate::presentation::LinkEvent;

/// In-memory transport recording every write.
#[derive(Debug)]
pub(crate) struct MockTransport {
    pub writes: Vec<Vec<u8>>,
    pub open: bool,
    pub writable: bool,
    /// Bytes to withhold from every write, simulating a short write.
    pub short_by: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            open: true,
            writable: true,
            short_by: 0,
        }
    }
}

impl Transport for MockTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    fn is_writable(&self) -> bool {
        self.open && self.writable
    }

    fn write(&mut self, bytes: &[u8]) -> framelink_transport::Result<usize> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        let n = bytes.len().saturating_sub(self.short_by);
        self.writes.push(bytes[..n].to_vec());
        Ok(n)
    }

    fn close(&mut self) -> framelink_transport::Result<()> {
        self.open = false;
        Ok(())
    }

    fn peer_name(&self) -> String {
        "mock".to_string()
    }
}

pub(crate) fn drain(rx: &Receiver<LinkEvent>) -> Vec<LinkEvent> {
    rx.try_iter().collect()
}

pub(crate) fn send_results(events: &[LinkEvent]) -> Vec<(u8, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            LinkEvent::SendResult { command, success } => Some((*command, *success)),
            _ => None,
        })
        .collect()
}
