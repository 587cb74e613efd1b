use crate::error::Result;

/// Outcome of a single receive poll on a [`ByteSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// `n` bytes were written into the caller's buffer.
    Data(usize),
    /// Nothing arrived within the source's poll interval.
    Idle,
    /// The remote end went away; no more data will arrive.
    Closed,
}

/// The write side of a point-to-point byte stream.
///
/// `write` performs exactly one write attempt and returns the number of
/// bytes the stream accepted. A count smaller than `bytes.len()` is a
/// partial write; callers must detect and report it rather than assume
/// the whole buffer went out.
pub trait Transport: Send {
    /// Whether the connection is established.
    fn is_open(&self) -> bool;

    /// Whether the connection currently accepts writes.
    fn is_writable(&self) -> bool {
        self.is_open()
    }

    /// Write raw bytes, returning how many were accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;

    /// Close the connection. Closing an already closed transport is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Human-readable identity of the remote end, for diagnostics.
    fn peer_name(&self) -> String;
}

/// The receive side of a point-to-point byte stream.
///
/// Sources poll with a bounded wait so the reading thread can notice a
/// shutdown request between chunks.
pub trait ByteSource: Send {
    /// Read the next chunk of raw bytes into `buf`.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Inbound>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn is_writable(&self) -> bool {
        (**self).is_writable()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        (**self).write(bytes)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn peer_name(&self) -> String {
        (**self).peer_name()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<Inbound> {
        (**self).read_chunk(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        open: bool,
        written: usize,
    }

    impl Transport for Counting {
        fn is_open(&self) -> bool {
            self.open
        }

        fn write(&mut self, bytes: &[u8]) -> Result<usize> {
            self.written += bytes.len();
            Ok(bytes.len())
        }

        fn close(&mut self) -> Result<()> {
            self.open = false;
            Ok(())
        }

        fn peer_name(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn writable_defaults_to_open() {
        let mut transport = Counting {
            open: true,
            written: 0,
        };
        assert!(transport.is_writable());
        transport.close().unwrap();
        assert!(!transport.is_writable());
    }

    #[test]
    fn boxed_transport_forwards() {
        let mut boxed: Box<dyn Transport> = Box::new(Counting {
            open: true,
            written: 0,
        });
        assert_eq!(boxed.write(b"abc").unwrap(), 3);
        assert_eq!(boxed.peer_name(), "counting");
        boxed.close().unwrap();
        assert!(!boxed.is_open());
    }
}
