//! In-memory ports
//!
//! Fixed-capacity byte pipes for host-side simulation and tests. No heap:
//! every buffer is a `heapless::Deque` sized by a const generic.
//!
//! - [`MemoryPort`] is a standalone endpoint. The owner of the bridge feeds
//!   bytes into its receive queue and drains what the bridge wrote.
//! - [`MemoryLink`] is a crossed pair of queues. Each [`LinkEnd`] reads what
//!   the other end wrote, so two bridges can talk to each other.

use core::cell::RefCell;

use heapless::Deque;

use crate::port::{InputPort, IoError, OutputPort};

/// Standalone in-memory port with fault injection
#[derive(Debug)]
pub struct MemoryPort<const N: usize> {
    rx: Deque<u8, N>,
    tx: Deque<u8, N>,
    fault: Option<IoError>,
    write_chunk: Option<usize>,
    read_calls: usize,
    write_calls: usize,
}

impl<const N: usize> Default for MemoryPort<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemoryPort<N> {
    /// Create an empty port
    pub const fn new() -> Self {
        Self {
            rx: Deque::new(),
            tx: Deque::new(),
            fault: None,
            write_chunk: None,
            read_calls: 0,
            write_calls: 0,
        }
    }

    /// Queue bytes for the port's reader
    ///
    /// Returns how many bytes fit.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        push_all(&mut self.rx, bytes)
    }

    /// Move written bytes into `buf`, oldest first
    ///
    /// Returns the number of bytes moved.
    pub fn take_written(&mut self, buf: &mut [u8]) -> usize {
        pop_into(&mut self.tx, buf)
    }

    /// Number of written bytes not yet taken
    pub fn written_len(&self) -> usize {
        self.tx.len()
    }

    /// Number of received bytes not yet read
    pub fn pending_len(&self) -> usize {
        self.rx.len()
    }

    /// Make every subsequent read and write fail with `error`
    pub fn inject_fault(&mut self, error: IoError) {
        self.fault = Some(error);
    }

    /// Remove an injected fault
    pub fn clear_fault(&mut self) {
        self.fault = None;
    }

    /// Limit how many bytes a single write accepts (`Some(0)` stalls every write)
    pub fn set_write_chunk(&mut self, chunk: Option<usize>) {
        self.write_chunk = chunk;
    }

    /// Number of read calls (`read_available` and `read_ready`) seen so far
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }

    /// Number of write calls seen so far
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }
}

impl<const N: usize> InputPort for MemoryPort<N> {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        self.read_calls += 1;
        if let Some(e) = self.fault {
            return Err(e);
        }
        Ok(pop_into(&mut self.rx, buf))
    }

    fn read_ready(&mut self) -> Result<bool, IoError> {
        self.read_calls += 1;
        if let Some(e) = self.fault {
            return Err(e);
        }
        Ok(!self.rx.is_empty())
    }
}

impl<const N: usize> OutputPort for MemoryPort<N> {
    fn write(&mut self, data: &[u8]) -> Result<usize, IoError> {
        self.write_calls += 1;
        if let Some(e) = self.fault {
            return Err(e);
        }
        let limit = self.write_chunk.unwrap_or(data.len()).min(data.len());
        Ok(push_all(&mut self.tx, &data[..limit]))
    }
}

/// Crossed pair of in-memory queues
#[derive(Debug)]
pub struct MemoryLink<const N: usize> {
    a_to_b: RefCell<Deque<u8, N>>,
    b_to_a: RefCell<Deque<u8, N>>,
}

impl<const N: usize> Default for MemoryLink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MemoryLink<N> {
    /// Create an empty link
    pub const fn new() -> Self {
        Self {
            a_to_b: RefCell::new(Deque::new()),
            b_to_a: RefCell::new(Deque::new()),
        }
    }

    /// First endpoint
    pub fn a(&self) -> LinkEnd<'_, N> {
        LinkEnd {
            rx: &self.b_to_a,
            tx: &self.a_to_b,
        }
    }

    /// Second endpoint
    pub fn b(&self) -> LinkEnd<'_, N> {
        LinkEnd {
            rx: &self.a_to_b,
            tx: &self.b_to_a,
        }
    }
}

/// One side of a [`MemoryLink`]
///
/// Copyable so the same end can serve as both input and output port.
#[derive(Debug, Clone, Copy)]
pub struct LinkEnd<'a, const N: usize> {
    rx: &'a RefCell<Deque<u8, N>>,
    tx: &'a RefCell<Deque<u8, N>>,
}

impl<const N: usize> LinkEnd<'_, N> {
    /// Inject raw bytes as if the peer had written them
    pub fn inject(&self, bytes: &[u8]) -> usize {
        push_all(&mut *self.rx.borrow_mut(), bytes)
    }
}

impl<const N: usize> InputPort for LinkEnd<'_, N> {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        Ok(pop_into(&mut *self.rx.borrow_mut(), buf))
    }

    fn read_ready(&mut self) -> Result<bool, IoError> {
        Ok(!self.rx.borrow().is_empty())
    }
}

impl<const N: usize> OutputPort for LinkEnd<'_, N> {
    fn write(&mut self, data: &[u8]) -> Result<usize, IoError> {
        Ok(push_all(&mut *self.tx.borrow_mut(), data))
    }
}

fn push_all<const N: usize>(queue: &mut Deque<u8, N>, bytes: &[u8]) -> usize {
    let mut accepted = 0;
    for &byte in bytes {
        if queue.push_back(byte).is_err() {
            break;
        }
        accepted += 1;
    }
    accepted
}

fn pop_into<const N: usize>(queue: &mut Deque<u8, N>, buf: &mut [u8]) -> usize {
    let mut n = 0;
    while n < buf.len() {
        match queue.pop_front() {
            Some(byte) => {
                buf[n] = byte;
                n += 1;
            }
            None => break,
        }
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_then_read() {
        let mut port = MemoryPort::<8>::new();
        assert_eq!(port.feed(&[1, 2, 3]), 3);
        assert_eq!(port.read_ready(), Ok(true));

        let mut buf = [0u8; 2];
        assert_eq!(port.read_available(&mut buf), Ok(2));
        assert_eq!(buf, [1, 2]);
        assert_eq!(port.read_available(&mut buf), Ok(1));
        assert_eq!(buf[0], 3);
        assert_eq!(port.read_available(&mut buf), Ok(0));
    }

    #[test]
    fn test_feed_is_bounded() {
        let mut port = MemoryPort::<4>::new();
        assert_eq!(port.feed(&[0; 6]), 4);
        assert_eq!(port.pending_len(), 4);
    }

    #[test]
    fn test_write_chunk_limits_each_write() {
        let mut port = MemoryPort::<16>::new();
        port.set_write_chunk(Some(2));
        assert_eq!(port.write(&[9, 8, 7]), Ok(2));

        let mut out = [0u8; 4];
        assert_eq!(port.take_written(&mut out), 2);
        assert_eq!(&out[..2], &[9, 8]);
    }

    #[test]
    fn test_injected_fault_fails_both_directions() {
        let mut port = MemoryPort::<8>::new();
        port.inject_fault(IoError::Disconnected);
        let mut buf = [0u8; 1];
        assert_eq!(port.read_available(&mut buf), Err(IoError::Disconnected));
        assert_eq!(port.write(&[1]), Err(IoError::Disconnected));
        assert_eq!(port.read_calls(), 1);
        assert_eq!(port.write_calls(), 1);

        port.clear_fault();
        assert_eq!(port.write(&[1]), Ok(1));
    }

    #[test]
    fn test_link_ends_are_crossed() {
        let link = MemoryLink::<16>::new();
        let mut a = link.a();
        let mut b = link.b();

        assert_eq!(a.write(&[0xAB, 0xCD]), Ok(2));
        assert_eq!(a.read_ready(), Ok(false));
        assert_eq!(b.read_ready(), Ok(true));

        let mut buf = [0u8; 4];
        assert_eq!(b.read_available(&mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0xAB, 0xCD]);

        b.inject(&[0x01]);
        assert_eq!(b.read_available(&mut buf), Ok(1));
        assert_eq!(a.read_ready(), Ok(false));
    }
}
