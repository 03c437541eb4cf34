//! Handshake operations
//!
//! A handshake runs while the link is `Handshaking`, once per attempt, with
//! access to the input port. Its protocol is up to the caller. Any
//! `FnMut(&mut I) -> Result<(), HandshakeError>` closure works, and two
//! ready-made operations are provided.

use mizlang_hal::InputPort;

use crate::error::HandshakeError;

/// Link-establishment operation
pub trait Handshake<I: ?Sized> {
    /// Run one attempt
    ///
    /// Must not block. Return [`HandshakeError::NoResponse`] when the peer
    /// has not answered yet so the bridge can count the attempt.
    fn attempt(&mut self, input: &mut I) -> Result<(), HandshakeError>;
}

impl<I: ?Sized, F> Handshake<I> for F
where
    F: FnMut(&mut I) -> Result<(), HandshakeError>,
{
    fn attempt(&mut self, input: &mut I) -> Result<(), HandshakeError> {
        self(input)
    }
}

/// Handshake that succeeds immediately
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptAll;

impl<I: ?Sized> Handshake<I> for AcceptAll {
    fn attempt(&mut self, _input: &mut I) -> Result<(), HandshakeError> {
        Ok(())
    }
}

/// Handshake that waits for a magic byte sequence from the peer
///
/// Bytes are read one at a time so nothing after the sequence is consumed.
/// Match progress is kept across attempts, so a sequence split over
/// several polls is still recognized. On a mismatch the matcher restarts,
/// re-checking the offending byte against the first magic byte.
#[derive(Debug, Clone)]
pub struct MagicHandshake<const L: usize> {
    magic: [u8; L],
    matched: usize,
}

impl<const L: usize> MagicHandshake<L> {
    /// Wait for `magic`
    pub const fn new(magic: [u8; L]) -> Self {
        Self { magic, matched: 0 }
    }

    /// Number of magic bytes seen so far
    pub fn progress(&self) -> usize {
        self.matched
    }

    fn advance(&mut self, byte: u8) -> bool {
        if self.magic[self.matched] == byte {
            self.matched += 1;
        } else if self.magic[0] == byte {
            self.matched = 1;
        } else {
            self.matched = 0;
        }
        self.matched == L
    }
}

impl<I: InputPort + ?Sized, const L: usize> Handshake<I> for MagicHandshake<L> {
    fn attempt(&mut self, input: &mut I) -> Result<(), HandshakeError> {
        if L == 0 {
            return Ok(());
        }

        let mut byte = [0u8; 1];
        loop {
            if input.read_available(&mut byte)? == 0 {
                return Err(HandshakeError::NoResponse);
            }
            if self.advance(byte[0]) {
                self.matched = 0;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mizlang_hal::{IoError, MemoryPort};

    #[test]
    fn test_accept_all() {
        let mut port = MemoryPort::<4>::new();
        assert_eq!(AcceptAll.attempt(&mut port), Ok(()));
        assert_eq!(port.read_calls(), 0);
    }

    #[test]
    fn test_closure_handshake() {
        let mut port = MemoryPort::<4>::new();
        port.feed(&[0x55]);

        let mut check = |p: &mut MemoryPort<4>| -> Result<(), HandshakeError> {
            let mut buf = [0u8; 1];
            match p.read_available(&mut buf)? {
                1 if buf[0] == 0x55 => Ok(()),
                1 => Err(HandshakeError::BadResponse),
                _ => Err(HandshakeError::NoResponse),
            }
        };

        assert_eq!(check.attempt(&mut port), Ok(()));
        assert_eq!(check.attempt(&mut port), Err(HandshakeError::NoResponse));
    }

    #[test]
    fn test_magic_stops_after_sequence() {
        let mut port = MemoryPort::<16>::new();
        port.feed(&[0x00, 0x4D, 0x5A, 0x01, 0x02]);

        let mut handshake = MagicHandshake::new([0x4D, 0x5A]);
        assert_eq!(handshake.attempt(&mut port), Ok(()));
        assert_eq!(port.pending_len(), 2);
    }

    #[test]
    fn test_magic_split_across_attempts() {
        let mut port = MemoryPort::<16>::new();
        let mut handshake = MagicHandshake::new([0x4D, 0x5A, 0x4C]);

        port.feed(&[0x4D]);
        assert_eq!(handshake.attempt(&mut port), Err(HandshakeError::NoResponse));
        assert_eq!(handshake.progress(), 1);

        port.feed(&[0x5A, 0x4C]);
        assert_eq!(handshake.attempt(&mut port), Ok(()));
        assert_eq!(handshake.progress(), 0);
    }

    #[test]
    fn test_magic_restarts_on_repeated_first_byte() {
        let mut port = MemoryPort::<16>::new();
        port.feed(&[0x4D, 0x4D, 0x5A]);

        let mut handshake = MagicHandshake::new([0x4D, 0x5A]);
        assert_eq!(handshake.attempt(&mut port), Ok(()));
    }

    #[test]
    fn test_magic_reports_port_error() {
        let mut port = MemoryPort::<4>::new();
        port.inject_fault(IoError::HardwareFault);

        let mut handshake = MagicHandshake::new([0x01]);
        assert_eq!(
            handshake.attempt(&mut port),
            Err(HandshakeError::Io(IoError::HardwareFault))
        );
    }
}
