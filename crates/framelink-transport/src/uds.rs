use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{ByteSource, Inbound, Transport};

/// How long a [`SocketSource`] blocks in one read before reporting idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a [`SocketTransport`] write may wait for buffer space. A peer
/// that stops reading turns into short writes instead of a stalled link.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Unix domain socket endpoint.
///
/// Stands in for the serial channel when both ends run on one host: the
/// `serve` side binds a path and plays the remote device, the other side
/// connects. Filesystem sockets are removed again on `Drop`.
pub struct UnixDomainSocket {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    cleanup_on_drop: bool,
}

impl UnixDomainSocket {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// A stale socket left at `path` is removed first; any other kind of
    /// file is left alone and reported as a bind error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        let bind_err = |path: &Path, source: std::io::Error| TransportError::Bind {
            path: path.to_path_buf(),
            source,
        };

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;
            if !metadata.file_type().is_socket() {
                return Err(bind_err(
                    &path,
                    std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| bind_err(&path, e))?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| bind_err(&path, e))?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| bind_err(&path, e))?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| bind_err(&path, e))?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
            cleanup_on_drop: true,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<(SocketTransport, SocketSource)> {
        self.listener
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        self.accepted(stream)
    }

    /// Accept a pending connection without waiting; `None` if no client
    /// is queued.
    pub fn try_accept(&self) -> Result<Option<(SocketTransport, SocketSource)>> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                // Some platforms hand out the listener's non-blocking flag.
                stream.set_nonblocking(false)?;
                self.accepted(stream).map(Some)
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    fn accepted(&self, stream: UnixStream) -> Result<(SocketTransport, SocketSource)> {
        debug!(path = ?self.path, "accepted connection");
        SocketTransport::from_stream(stream, format!("{} (accepted)", self.path.display()))
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<(SocketTransport, SocketSource)> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!(?path, "connected to unix domain socket");
        SocketTransport::from_stream(stream, path.display().to_string())
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixDomainSocket {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

/// Write half of a connected Unix domain socket.
#[derive(Debug)]
pub struct SocketTransport {
    stream: UnixStream,
    peer: String,
    open: bool,
}

impl SocketTransport {
    /// Split a connected stream into its write half and a polling read half.
    pub fn from_stream(
        stream: UnixStream,
        peer: impl Into<String>,
    ) -> Result<(SocketTransport, SocketSource)> {
        stream.set_write_timeout(Some(DEFAULT_WRITE_TIMEOUT))?;
        let reader = stream.try_clone()?;
        reader.set_read_timeout(Some(DEFAULT_POLL_INTERVAL))?;
        Ok((
            SocketTransport {
                stream,
                peer: peer.into(),
                open: true,
            },
            SocketSource { stream: reader },
        ))
    }
}

impl Transport for SocketTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        loop {
            match self.stream.write(bytes) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // Send buffer still full after the write timeout.
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    debug!(peer = %self.peer, "write timed out");
                    return Ok(0);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    fn peer_name(&self) -> String {
        self.peer.clone()
    }
}

/// Read half of a connected Unix domain socket.
#[derive(Debug)]
pub struct SocketSource {
    stream: UnixStream,
}

impl ByteSource for SocketSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Inbound> {
        match self.stream.read(buf) {
            Ok(0) => Ok(Inbound::Closed),
            Ok(n) => Ok(Inbound::Data(n)),
            Err(err) => match err.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
                    Ok(Inbound::Idle)
                }
                ErrorKind::ConnectionReset | ErrorKind::NotConnected => Ok(Inbound::Closed),
                _ => Err(TransportError::Io(err)),
            },
        }
    }
}
