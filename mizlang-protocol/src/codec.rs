//! Incremental frame decoding
//!
//! The decoder pulls bytes one at a time and keeps its cursor across calls,
//! so a frame may arrive split over any number of reads.
//!
//! There is no start byte on the wire, so recovery depends on how a
//! candidate frame was rejected:
//!
//! - Checksum mismatch with an in-bounds LENGTH: exactly the declared extent
//!   is consumed and dropped. Decoding resumes at the next byte, and bytes
//!   inside the rejected frame are never parsed again.
//! - LENGTH above the maximum: the header cannot be trusted, so the decoder
//!   rescans the candidate starting one byte later.
//!
//! After a rejection the decoder is resynchronizing. A candidate whose
//! opcode fails the caller's plausibility check is still decoded, and is
//! returned if its checksum holds. If it fails it is treated as garbage:
//! rescanned one byte later, with no error reported.
//!
//! For a LENGTH field one too small, the frame that follows is recovered
//! as long as the rejected frame's stray checksum byte is not a plausible
//! opcode. For a LENGTH one too large, the rejected frame swallows the first
//! byte of the next frame, which is lost. Sync returns once later traffic
//! completes the stray candidate.

use core::fmt;
use core::mem;

use heapless::Vec;

use crate::checksum::Crc16;
use crate::frame::{CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD, MAX_HEADER_SIZE};
use crate::opcode::{length_width, Opcode};

/// Errors reported while decoding or dispatching a frame
///
/// All of these are recoverable: the decoder is already resynchronizing
/// when one is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeError {
    /// Checksum did not match the received bytes
    ChecksumMismatch,
    /// LENGTH field exceeds the maximum payload
    FrameTooLarge,
    /// Frame was well-formed but nothing handles its opcode
    UnknownOpcode,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::ChecksumMismatch => f.write_str("checksum mismatch"),
            DecodeError::FrameTooLarge => f.write_str("frame length exceeds maximum"),
            DecodeError::UnknownOpcode => f.write_str("unknown opcode"),
        }
    }
}

/// Decoder position within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodeState {
    /// Collecting OPCODE bytes
    WaitingOpcode,
    /// Collecting LENGTH bytes
    WaitingLength,
    /// Reading payload bytes
    WaitingPayload,
    /// Collecting CHECKSUM bytes
    WaitingChecksum,
    /// A frame was returned; the next call starts a new one
    Complete,
}

/// A decoded frame borrowed from the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef<'a, O> {
    /// Instruction identifier
    pub opcode: O,
    /// Payload data
    pub payload: &'a [u8],
}

/// Raw bytes of one candidate frame, split by field
#[derive(Debug, Clone)]
struct RawFrame<const N: usize> {
    head: [u8; MAX_HEADER_SIZE],
    head_len: usize,
    body: Vec<u8, N>,
    tail: [u8; CHECKSUM_SIZE],
    tail_len: usize,
}

impl<const N: usize> RawFrame<N> {
    const fn new() -> Self {
        Self {
            head: [0; MAX_HEADER_SIZE],
            head_len: 0,
            body: Vec::new(),
            tail: [0; CHECKSUM_SIZE],
            tail_len: 0,
        }
    }

    fn len(&self) -> usize {
        self.head_len + self.body.len() + self.tail_len
    }

    /// Byte at position `i` counting across head, body and tail
    fn byte(&self, i: usize) -> u8 {
        if i < self.head_len {
            self.head[i]
        } else if i < self.head_len + self.body.len() {
            self.body[i - self.head_len]
        } else {
            self.tail[i - self.head_len - self.body.len()]
        }
    }

    fn clear(&mut self) {
        self.head_len = 0;
        self.body.clear();
        self.tail_len = 0;
    }
}

/// Outcome of feeding one byte
enum Step {
    /// Need more bytes
    Continue,
    /// Candidate rejected
    Fail(DecodeError),
    /// Candidate is a valid frame
    Complete,
}

/// State machine for decoding incoming frames
///
/// `O` is the opcode type and `N` the maximum payload size. Memory use is
/// fixed: two candidate buffers of `N` payload bytes each, one being parsed
/// and one holding bytes queued for rescanning.
#[derive(Debug, Clone)]
pub struct FrameDecoder<O: Opcode, const N: usize = DEFAULT_MAX_PAYLOAD> {
    state: DecodeState,
    candidate: RawFrame<N>,
    expected_length: usize,
    /// Bytes queued for rescanning, consumed from `replay_pos`
    replay: RawFrame<N>,
    replay_pos: usize,
    /// Position in `replay` where the current candidate started
    origin: Option<usize>,
    /// Set after a rejected frame until the next valid one
    resyncing: bool,
    _opcode: core::marker::PhantomData<O>,
}

impl<O: Opcode, const N: usize> Default for FrameDecoder<O, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Opcode, const N: usize> FrameDecoder<O, N> {
    const LENGTH_WIDTH: usize = length_width(N);
    const HEADER_SIZE: usize = O::WIDTH + Self::LENGTH_WIDTH;

    /// Create a new frame decoder
    pub const fn new() -> Self {
        Self {
            state: DecodeState::WaitingOpcode,
            candidate: RawFrame::new(),
            expected_length: 0,
            replay: RawFrame::new(),
            replay_pos: 0,
            origin: None,
            resyncing: false,
            _opcode: core::marker::PhantomData,
        }
    }

    /// Current decoder state
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Returns true while recovering from a rejected frame
    pub fn is_resyncing(&self) -> bool {
        self.resyncing
    }

    /// Number of bytes held for the frame in progress or queued for rescan
    pub fn buffered(&self) -> usize {
        let in_progress = match self.state {
            DecodeState::Complete => 0,
            _ => self.candidate.len(),
        };
        in_progress + self.replay.len() - self.replay_pos
    }

    /// Drop everything and wait for a fresh opcode
    pub fn reset(&mut self) {
        self.state = DecodeState::WaitingOpcode;
        self.candidate.clear();
        self.expected_length = 0;
        self.replay.clear();
        self.replay_pos = 0;
        self.origin = None;
        self.resyncing = false;
    }

    /// Decode the next frame
    ///
    /// Bytes queued for rescanning are consumed before `input`. `input` is
    /// only advanced as far as needed, so bytes after a complete frame stay
    /// in the iterator for the next call.
    ///
    /// While resynchronizing, a rejected candidate whose opcode fails
    /// `plausible` is rescanned without reporting an error.
    ///
    /// Returns `Ok(Some(frame))` when a complete valid frame is decoded,
    /// `Ok(None)` when `input` ran dry first, or `Err` when a candidate was
    /// rejected. Call again after an error to continue.
    pub fn decode<I, P>(
        &mut self,
        input: &mut I,
        plausible: P,
    ) -> Result<Option<FrameRef<'_, O>>, DecodeError>
    where
        I: Iterator<Item = u8>,
        P: Fn(O) -> bool,
    {
        if self.state == DecodeState::Complete {
            self.candidate.clear();
            self.expected_length = 0;
            self.state = DecodeState::WaitingOpcode;
        }

        loop {
            let starting = self.candidate.len() == 0;

            let byte = if self.replay_pos < self.replay.len() {
                let byte = self.replay.byte(self.replay_pos);
                if starting {
                    self.origin = Some(self.replay_pos);
                }
                self.replay_pos += 1;
                byte
            } else {
                match input.next() {
                    Some(byte) => {
                        if starting {
                            self.origin = None;
                        }
                        byte
                    }
                    None => return Ok(None),
                }
            };

            match self.step(byte) {
                Step::Continue => {}
                Step::Fail(e) => {
                    let opcode = O::read_be(&self.candidate.head[..O::WIDTH]);
                    if self.resyncing && !plausible(opcode) {
                        self.restart();
                        continue;
                    }

                    match e {
                        DecodeError::ChecksumMismatch => self.discard(),
                        _ => self.restart(),
                    }
                    self.resyncing = true;
                    return Err(e);
                }
                Step::Complete => break,
            }
        }

        self.resyncing = false;
        self.origin = None;
        self.state = DecodeState::Complete;

        Ok(Some(FrameRef {
            opcode: O::read_be(&self.candidate.head[..O::WIDTH]),
            payload: &self.candidate.body,
        }))
    }

    /// Feed one byte into the candidate
    fn step(&mut self, byte: u8) -> Step {
        match self.state {
            DecodeState::WaitingOpcode => {
                self.push_head(byte);
                if self.candidate.head_len == O::WIDTH {
                    self.state = DecodeState::WaitingLength;
                }
                Step::Continue
            }
            DecodeState::WaitingLength => {
                self.push_head(byte);
                if self.candidate.head_len < Self::HEADER_SIZE {
                    return Step::Continue;
                }

                let length = self.declared_length();
                if length > N {
                    return Step::Fail(DecodeError::FrameTooLarge);
                }

                self.expected_length = length;
                self.state = if length == 0 {
                    DecodeState::WaitingChecksum
                } else {
                    DecodeState::WaitingPayload
                };
                Step::Continue
            }
            DecodeState::WaitingPayload => {
                // Cannot fail: expected_length <= N
                let _ = self.candidate.body.push(byte);
                if self.candidate.body.len() == self.expected_length {
                    self.state = DecodeState::WaitingChecksum;
                }
                Step::Continue
            }
            DecodeState::WaitingChecksum => {
                let raw = &mut self.candidate;
                raw.tail[raw.tail_len] = byte;
                raw.tail_len += 1;
                if raw.tail_len < CHECKSUM_SIZE {
                    return Step::Continue;
                }

                let mut crc = Crc16::new();
                crc.update(&raw.head[..raw.head_len]);
                crc.update(&raw.body);
                if crc.finish() != u16::from_be_bytes(raw.tail) {
                    return Step::Fail(DecodeError::ChecksumMismatch);
                }
                Step::Complete
            }
            // Reset at the top of decode()
            DecodeState::Complete => Step::Continue,
        }
    }

    fn push_head(&mut self, byte: u8) {
        let raw = &mut self.candidate;
        raw.head[raw.head_len] = byte;
        raw.head_len += 1;
    }

    fn declared_length(&self) -> usize {
        let field = &self.candidate.head[O::WIDTH..Self::HEADER_SIZE];
        match Self::LENGTH_WIDTH {
            1 => field[0] as usize,
            _ => u16::from_be_bytes([field[0], field[1]]) as usize,
        }
    }

    /// Abandon the candidate and rescan from its second byte
    fn restart(&mut self) {
        match self.origin {
            // Candidate lies entirely inside the replay queue: rewind
            Some(origin) if self.replay_pos < self.replay.len() => {
                self.replay_pos = origin + 1;
            }
            // Candidate bytes are only held in the candidate buffer
            _ => {
                mem::swap(&mut self.candidate, &mut self.replay);
                self.replay_pos = 1;
            }
        }

        self.discard();
    }

    /// Drop the candidate; its bytes have all been consumed
    fn discard(&mut self) {
        self.candidate.clear();
        self.expected_length = 0;
        self.origin = None;
        self.state = DecodeState::WaitingOpcode;
    }
}
