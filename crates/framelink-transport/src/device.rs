use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{ByteSource, Inbound, Transport};

/// Serial device settings.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Upper bound on a single blocking read before the source reports idle.
    /// Terminal devices round this to tenths of a second (`VTIME`).
    pub poll_interval: Duration,
    /// Switch terminal devices to raw mode. Ignored for non-terminals.
    pub raw_mode: bool,
    /// How long a write waits for the device to accept bytes. Past it the
    /// write reports zero bytes written.
    pub write_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            raw_mode: true,
            write_timeout: Duration::from_millis(250),
        }
    }
}

/// Open a serial character device such as a bound RFCOMM channel.
///
/// Connection establishment with the remote device (pairing, `rfcomm bind`)
/// happens outside this crate; by the time the node exists the channel is
/// usable as a byte stream.
pub fn open_device(
    path: impl AsRef<Path>,
    config: &DeviceConfig,
) -> Result<(DeviceTransport, DeviceSource)> {
    let path = path.as_ref().to_path_buf();
    let open_err = |source: std::io::Error| TransportError::Open {
        path: path.clone(),
        source,
    };

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY)
        .open(&path)
        .map_err(open_err)?;

    // SAFETY: the descriptor belongs to `file`, which is alive for the call.
    let is_tty = unsafe { libc::isatty(file.as_raw_fd()) } == 1;
    if is_tty && config.raw_mode {
        configure_raw(&file, config.poll_interval).map_err(open_err)?;
        debug!(?path, "terminal switched to raw mode");
    }

    let reader = file.try_clone().map_err(open_err)?;
    info!(?path, is_tty, "opened serial device");

    Ok((
        DeviceTransport {
            file: Some(file),
            path,
            write_timeout: config.write_timeout,
        },
        DeviceSource {
            file: reader,
            is_tty,
            poll_interval: config.poll_interval,
        },
    ))
}

fn configure_raw(file: &File, poll_interval: Duration) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `termios` is plain data; it is fully initialised by `tcgetattr`
    // before any field is read.
    let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open terminal descriptor and `attrs` is writable.
    if unsafe { libc::tcgetattr(fd, &mut attrs) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `attrs` was populated by `tcgetattr` above.
    unsafe { libc::cfmakeraw(&mut attrs) };
    attrs.c_cflag |= libc::CLOCAL | libc::CREAD;
    attrs.c_cc[libc::VMIN] = 0;
    attrs.c_cc[libc::VTIME] = vtime_for(poll_interval);
    // SAFETY: `fd` is still open and `attrs` is a valid termios value.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &attrs) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Convert a poll interval to `VTIME` deciseconds, clamped to `1..=255`.
fn vtime_for(poll_interval: Duration) -> libc::cc_t {
    let tenths = poll_interval.as_millis().div_ceil(100);
    tenths.clamp(1, 255) as libc::cc_t
}

/// Write half of an open serial device.
#[derive(Debug)]
pub struct DeviceTransport {
    file: Option<File>,
    path: PathBuf,
    write_timeout: Duration,
}

/// Wait until `file` can take more bytes. `Ok(false)` on timeout.
fn wait_writable(file: &File, timeout: Duration) -> std::io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLOUT,
        revents: 0,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    loop {
        // SAFETY: `pollfd` is a single valid entry and the descriptor stays
        // open for the duration of the call.
        let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };
        if ready >= 0 {
            return Ok(ready > 0);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

impl Transport for DeviceTransport {
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(TransportError::NotOpen)?;
        // POLLERR/POLLHUP also end the wait; the write below reports them.
        if !wait_writable(file, self.write_timeout)? {
            debug!(path = ?self.path, "write timed out");
            return Ok(0);
        }
        loop {
            match file.write(bytes) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.file.take().is_some() {
            debug!(path = ?self.path, "closed serial device");
        }
        Ok(())
    }

    fn peer_name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Read half of an open serial device.
#[derive(Debug)]
pub struct DeviceSource {
    file: File,
    is_tty: bool,
    poll_interval: Duration,
}

impl ByteSource for DeviceSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Inbound> {
        match self.file.read(buf) {
            Ok(0) => {
                // A raw terminal returns 0 when VTIME expires; anything else is
                // at end of data and would spin without the pause.
                if !self.is_tty {
                    std::thread::sleep(self.poll_interval);
                }
                Ok(Inbound::Idle)
            }
            Ok(n) => Ok(Inbound::Data(n)),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(Inbound::Idle)
            }
            // Hangup on a terminal surfaces as EIO.
            Err(err) if err.raw_os_error() == Some(libc::EIO) => Ok(Inbound::Closed),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("framelink-dev-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("device");
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn vtime_rounds_up_and_clamps() {
        assert_eq!(vtime_for(Duration::from_millis(0)), 1);
        assert_eq!(vtime_for(Duration::from_millis(100)), 1);
        assert_eq!(vtime_for(Duration::from_millis(150)), 2);
        assert_eq!(vtime_for(Duration::from_secs(60)), 255);
    }

    #[test]
    fn missing_device_reports_open_error() {
        let result = open_device("/nonexistent/framelink/rfcomm0", &DeviceConfig::default());
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn writes_reach_plain_file_and_reads_idle_at_end() {
        let path = temp_file("plain");
        let config = DeviceConfig {
            poll_interval: Duration::from_millis(1),
            ..DeviceConfig::default()
        };
        let (mut transport, mut source) = open_device(&path, &config).unwrap();

        assert!(transport.is_open());
        assert_eq!(transport.write(&[0xAA, 0x02]).unwrap(), 2);

        let mut buf = [0u8; 4];
        // The shared file offset has moved past the written bytes.
        assert_eq!(source.read_chunk(&mut buf).unwrap(), Inbound::Idle);
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xAA, 0x02]);

        transport.close().unwrap();
        assert!(!transport.is_open());
        assert!(matches!(transport.write(b"x"), Err(TransportError::NotOpen)));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn full_fifo_write_times_out_as_short_write() {
        let dir = std::env::temp_dir().join(format!("framelink-dev-fifo-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fifo");
        let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let config = DeviceConfig {
            write_timeout: Duration::from_millis(20),
            ..DeviceConfig::default()
        };
        // Nobody drains the fifo, so its buffer fills up.
        let (mut transport, _source) = open_device(&path, &config).unwrap();
        let frame = [0x5Au8; 256];
        let started = std::time::Instant::now();
        let mut accepted = 0usize;
        loop {
            let n = transport.write(&frame).unwrap();
            if n == 0 {
                break;
            }
            accepted += n;
            assert!(accepted < 64 << 20, "fifo never filled");
        }
        assert!(accepted > 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(transport.is_open());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
