//! Threaded host for a [`LinkCore`].
//!
//! Two threads drive the link: one pulls chunks from the [`ByteSource`]
//! and feeds them to the core, the other is the dispatch heartbeat that
//! polls the ack timeout and ticks the scheduler. Both go through the
//! same mutex, as does every [`LinkHandle`] call, so the receive buffer,
//! the queue and the in-flight slot only ever change under one lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use framelink_transport::{ByteSource, Inbound, Transport};
use tracing::{debug, info, warn};

use crate::config::LinkConfig;
use crate::error::Result;
use crate::link::{LinkCore, LinkStats};
use crate::presentation::Presentation;

type Shared<T, P> = Arc<Mutex<LinkCore<T, P>>>;

fn lock<T, P>(core: &Shared<T, P>) -> MutexGuard<'_, LinkCore<T, P>> {
    // A panic inside a callback must not wedge disconnect.
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running link.
///
/// Dropping a `Connection` disconnects it.
pub struct Connection<T, P>
where
    T: Transport + 'static,
    P: Presentation + 'static,
{
    core: Shared<T, P>,
    running: Arc<AtomicBool>,
    heartbeat: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl<T, P> Connection<T, P>
where
    T: Transport + 'static,
    P: Presentation + 'static,
{
    /// Enable a link over a connected transport and start its threads.
    pub fn start<S>(transport: T, source: S, presentation: P, config: LinkConfig) -> Result<Self>
    where
        S: ByteSource + 'static,
    {
        let mut core = LinkCore::new(transport, presentation, config.scheduler.clone());
        core.enable();

        let mut conn = Self {
            core: Arc::new(Mutex::new(core)),
            running: Arc::new(AtomicBool::new(true)),
            heartbeat: None,
            reader: None,
        };

        match conn.spawn_threads(source, &config) {
            Ok(()) => Ok(conn),
            Err(err) => {
                if let Err(cleanup) = conn.shutdown() {
                    warn!(error = %cleanup, "cleanup after failed start failed");
                }
                Err(err)
            }
        }
    }

    fn spawn_threads<S>(&mut self, mut source: S, config: &LinkConfig) -> Result<()>
    where
        S: ByteSource + 'static,
    {
        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let interval = config.tick_interval;
        self.heartbeat = Some(
            thread::Builder::new()
                .name("framelink-tick".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        thread::sleep(interval);
                        if !running.load(Ordering::SeqCst) {
                            break;
                        }
                        let now = Instant::now();
                        let mut core = lock(&core);
                        core.poll_ack_timeout(now);
                        core.tick(now);
                    }
                    debug!("heartbeat stopped");
                })
                .map_err(framelink_transport::TransportError::Io)?,
        );

        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let mut buf = vec![0u8; config.read_chunk_size.max(1)];
        self.reader = Some(
            thread::Builder::new()
                .name("framelink-rx".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        match source.read_chunk(&mut buf) {
                            Ok(Inbound::Data(n)) => lock(&core).on_bytes_received(&buf[..n]),
                            Ok(Inbound::Idle) => {}
                            Ok(Inbound::Closed) => {
                                info!("peer closed the connection");
                                lock(&core).disable();
                                break;
                            }
                            Err(err) => {
                                lock(&core).on_transport_error(err);
                                break;
                            }
                        }
                    }
                    debug!("receive loop stopped");
                })
                .map_err(framelink_transport::TransportError::Io)?,
        );
        Ok(())
    }

    /// A cloneable handle for sending from other threads.
    pub fn handle(&self) -> LinkHandle<T, P> {
        LinkHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Whether the link still accepts sends.
    pub fn is_enabled(&self) -> bool {
        lock(&self.core).is_enabled()
    }

    /// Stop the heartbeat, flush pending sends, close the transport and
    /// wait for the receive thread to finish.
    pub fn disconnect(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(heartbeat) = self.heartbeat.take() {
            if heartbeat.join().is_err() {
                warn!("heartbeat thread panicked");
            }
        }

        let result = {
            let mut core = lock(&self.core);
            let stats = core.stats();
            info!(
                frames_received = stats.frames_received,
                frames_rejected = stats.frames_rejected,
                "disconnecting"
            );
            core.close()
        };

        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("receive thread panicked");
            }
        }
        result
    }
}

impl<T, P> Drop for Connection<T, P>
where
    T: Transport + 'static,
    P: Presentation + 'static,
{
    fn drop(&mut self) {
        if self.heartbeat.is_some() || self.reader.is_some() {
            if let Err(err) = self.shutdown() {
                warn!(error = %err, "disconnect on drop failed");
            }
        }
    }
}

/// Sending side of a [`Connection`], shareable across threads.
pub struct LinkHandle<T, P> {
    core: Shared<T, P>,
}

impl<T, P> Clone for LinkHandle<T, P> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Transport, P: Presentation> LinkHandle<T, P> {
    /// Queue a message; returns as soon as it is queued.
    pub fn send(&self, command: u8, payload: &[u8], requires_ack: bool) -> Result<()> {
        lock(&self.core).send(command, payload, requires_ack)
    }

    /// Queue an acknowledged message under the legacy command.
    pub fn send_legacy(&self, payload: &[u8]) -> Result<()> {
        lock(&self.core).send_legacy(payload)
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.core).is_enabled()
    }

    pub fn stats(&self) -> LinkStats {
        lock(&self.core).stats()
    }
}

impl<T, P> std::fmt::Debug for LinkHandle<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle").finish_non_exhaustive()
    }
}
