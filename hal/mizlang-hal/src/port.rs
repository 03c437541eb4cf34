//! Byte stream port abstractions
//!
//! Ports move raw bytes between the bridge and the physical transport.
//! Reads never block; writes either complete, fail, or time out within a
//! bound chosen by the implementation. Ports never retry internally.

use core::fmt;

/// Errors reported by a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoError {
    /// Peer or cable gone
    Disconnected,
    /// Operation did not complete within the port's bound
    Timeout,
    /// Peripheral reported an unrecoverable fault
    HardwareFault,
}

impl IoError {
    /// Returns true if the link cannot be used after this error
    pub fn is_fatal(self) -> bool {
        matches!(self, IoError::Disconnected | IoError::HardwareFault)
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Disconnected => f.write_str("port disconnected"),
            IoError::Timeout => f.write_str("port timed out"),
            IoError::HardwareFault => f.write_str("port hardware fault"),
        }
    }
}

/// Receive side of a byte stream
pub trait InputPort {
    /// Copy already-received bytes into `buf`
    ///
    /// Never blocks. Returns `Ok(0)` when nothing is pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError>;

    /// Check whether at least one byte is pending
    fn read_ready(&mut self) -> Result<bool, IoError>;
}

/// Transmit side of a byte stream
pub trait OutputPort {
    /// Write some prefix of `data`
    ///
    /// Returns the number of bytes accepted, which may be less than
    /// `data.len()` when the transport applies back-pressure.
    fn write(&mut self, data: &[u8]) -> Result<usize, IoError>;

    /// Flush any buffered data
    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }
}

impl<T: InputPort + ?Sized> InputPort for &mut T {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        (**self).read_available(buf)
    }

    fn read_ready(&mut self) -> Result<bool, IoError> {
        (**self).read_ready()
    }
}

impl<T: OutputPort + ?Sized> OutputPort for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<usize, IoError> {
        (**self).write(data)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        (**self).flush()
    }
}

/// Write all of `data` to `port`
///
/// A write that accepts zero bytes counts as a stall. More than
/// `stall_limit` consecutive stalls is reported as [`IoError::Timeout`].
pub fn write_all<P: OutputPort + ?Sized>(
    port: &mut P,
    mut data: &[u8],
    stall_limit: u8,
) -> Result<(), IoError> {
    let mut stalls: u8 = 0;

    while !data.is_empty() {
        match port.write(data)? {
            0 => {
                stalls = stalls.saturating_add(1);
                if stalls > stall_limit {
                    return Err(IoError::Timeout);
                }
            }
            n => {
                data = &data[n.min(data.len())..];
                stalls = 0;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `chunk` bytes per call, or nothing while `stalled`
    struct ChunkedPort {
        chunk: usize,
        stalled: u8,
        accepted: usize,
        calls: usize,
    }

    impl OutputPort for ChunkedPort {
        fn write(&mut self, data: &[u8]) -> Result<usize, IoError> {
            self.calls += 1;
            if self.stalled > 0 {
                self.stalled -= 1;
                return Ok(0);
            }
            let n = data.len().min(self.chunk);
            self.accepted += n;
            Ok(n)
        }
    }

    struct BrokenPort;

    impl OutputPort for BrokenPort {
        fn write(&mut self, _data: &[u8]) -> Result<usize, IoError> {
            Err(IoError::Disconnected)
        }
    }

    #[test]
    fn test_write_all_handles_partial_writes() {
        let mut port = ChunkedPort {
            chunk: 3,
            stalled: 0,
            accepted: 0,
            calls: 0,
        };
        write_all(&mut port, &[0u8; 10], 0).unwrap();
        assert_eq!(port.accepted, 10);
        assert_eq!(port.calls, 4);
    }

    #[test]
    fn test_write_all_tolerates_stalls_within_limit() {
        let mut port = ChunkedPort {
            chunk: 16,
            stalled: 2,
            accepted: 0,
            calls: 0,
        };
        write_all(&mut port, &[1, 2, 3], 2).unwrap();
        assert_eq!(port.accepted, 3);
    }

    #[test]
    fn test_write_all_times_out_after_stall_limit() {
        let mut port = ChunkedPort {
            chunk: 16,
            stalled: 5,
            accepted: 0,
            calls: 0,
        };
        assert_eq!(write_all(&mut port, &[1, 2, 3], 2), Err(IoError::Timeout));
        assert_eq!(port.accepted, 0);
        assert_eq!(port.calls, 3);
    }

    #[test]
    fn test_write_all_propagates_port_error() {
        assert_eq!(
            write_all(&mut BrokenPort, &[1], 4),
            Err(IoError::Disconnected)
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(IoError::Disconnected.is_fatal());
        assert!(IoError::HardwareFault.is_fatal());
        assert!(!IoError::Timeout.is_fatal());
    }
}
