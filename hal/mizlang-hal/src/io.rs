//! `embedded-io` adapter
//!
//! Turns any blocking `embedded-io` serial type into a bridge port. The
//! read side checks `ReadReady` first so the port never blocks, matching
//! the non-blocking contract of [`InputPort`].

use embedded_io::{Error as _, ErrorKind, Read, ReadReady, Write};

use crate::port::{InputPort, IoError, OutputPort};

/// Port wrapper around an `embedded-io` peripheral
#[derive(Debug)]
pub struct IoPort<T> {
    inner: T,
}

impl<T> IoPort<T> {
    /// Wrap a peripheral
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the wrapped peripheral
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the wrapped peripheral
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the port and return the peripheral
    pub fn into_inner(self) -> T {
        self.inner
    }
}

/// Classify an `embedded-io` error kind
pub fn map_error_kind(kind: ErrorKind) -> IoError {
    match kind {
        ErrorKind::NotConnected
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe => IoError::Disconnected,
        ErrorKind::TimedOut | ErrorKind::Interrupted => IoError::Timeout,
        _ => IoError::HardwareFault,
    }
}

impl<T: Read + ReadReady> InputPort for IoPort<T> {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        if buf.is_empty() || !self.read_ready()? {
            return Ok(0);
        }
        self.inner.read(buf).map_err(|e| map_error_kind(e.kind()))
    }

    fn read_ready(&mut self) -> Result<bool, IoError> {
        self.inner
            .read_ready()
            .map_err(|e| map_error_kind(e.kind()))
    }
}

impl<T: Write> OutputPort for IoPort<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize, IoError> {
        self.inner.write(data).map_err(|e| map_error_kind(e.kind()))
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.inner.flush().map_err(|e| map_error_kind(e.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::ErrorType;

    #[derive(Debug)]
    struct SerialError(ErrorKind);

    impl embedded_io::Error for SerialError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    /// Fake serial peripheral: a pending byte count plus an optional error
    struct FakeSerial {
        pending: usize,
        error: Option<ErrorKind>,
        read_calls: usize,
    }

    impl ErrorType for FakeSerial {
        type Error = SerialError;
    }

    impl Read for FakeSerial {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            self.read_calls += 1;
            if let Some(kind) = self.error {
                return Err(SerialError(kind));
            }
            let n = buf.len().min(self.pending);
            buf[..n].fill(0x5A);
            self.pending -= n;
            Ok(n)
        }
    }

    impl ReadReady for FakeSerial {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            if let Some(kind) = self.error {
                return Err(SerialError(kind));
            }
            Ok(self.pending > 0)
        }
    }

    impl Write for FakeSerial {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            match self.error {
                Some(kind) => Err(SerialError(kind)),
                None => Ok(buf.len().min(4)),
            }
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn serial(pending: usize, error: Option<ErrorKind>) -> IoPort<FakeSerial> {
        IoPort::new(FakeSerial {
            pending,
            error,
            read_calls: 0,
        })
    }

    #[test]
    fn test_read_does_not_block_when_idle() {
        let mut port = serial(0, None);
        let mut buf = [0u8; 8];
        assert_eq!(port.read_available(&mut buf), Ok(0));
        assert_eq!(port.inner().read_calls, 0);
    }

    #[test]
    fn test_read_returns_pending_bytes() {
        let mut port = serial(3, None);
        let mut buf = [0u8; 8];
        assert_eq!(port.read_available(&mut buf), Ok(3));
        assert_eq!(&buf[..3], &[0x5A; 3]);
        assert_eq!(port.read_ready(), Ok(false));
    }

    #[test]
    fn test_write_passes_partial_count_through() {
        let mut port = serial(0, None);
        assert_eq!(port.write(&[0u8; 10]), Ok(4));
    }

    #[test]
    fn test_error_kinds_are_classified() {
        let mut port = serial(1, Some(ErrorKind::BrokenPipe));
        assert_eq!(port.write(&[1]), Err(IoError::Disconnected));

        let mut port = serial(1, Some(ErrorKind::TimedOut));
        assert_eq!(port.read_ready(), Err(IoError::Timeout));

        let mut port = serial(1, Some(ErrorKind::InvalidData));
        let mut buf = [0u8; 1];
        assert_eq!(port.read_available(&mut buf), Err(IoError::HardwareFault));
    }
}
