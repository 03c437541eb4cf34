//! Frame encoding for the instruction bridge.
//!
//! Frame format:
//! - OPCODE (1–2 bytes): instruction identifier, big-endian
//! - LENGTH (1–2 bytes): payload length, big-endian
//! - PAYLOAD (0..N bytes): instruction arguments
//! - CHECKSUM (2 bytes): CRC-16/CCITT-FALSE of OPCODE, LENGTH and PAYLOAD

use core::fmt;

use heapless::Vec;
use serde::Serialize;

use crate::checksum::Crc16;
use crate::opcode::{length_width, Opcode};

/// Maximum payload size used when none is given
pub const DEFAULT_MAX_PAYLOAD: usize = 64;

/// Largest possible OPCODE + LENGTH header
pub const MAX_HEADER_SIZE: usize = 4;

/// Size of the CHECKSUM field
pub const CHECKSUM_SIZE: usize = 2;

/// Errors that can occur while building or encoding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Payload exceeds the configured maximum
    PayloadTooLarge,
    /// Output buffer too small for the encoded frame
    BufferTooSmall,
    /// Argument serializer rejected the value
    Serialize,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeError::PayloadTooLarge => f.write_str("payload exceeds maximum size"),
            EncodeError::BufferTooSmall => f.write_str("buffer too small for frame"),
            EncodeError::Serialize => f.write_str("argument serialization failed"),
        }
    }
}

/// Bounded writer handed to argument serializers
///
/// Every write is all-or-nothing: a write that would overflow the bound
/// fails with [`EncodeError::PayloadTooLarge`] and leaves the written
/// prefix untouched.
#[derive(Debug)]
pub struct PayloadWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> PayloadWriter<'a> {
    /// Create a writer over `buf`; its length is the payload bound
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Append raw bytes
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        let end = self
            .len
            .checked_add(bytes.len())
            .filter(|&end| end <= self.buf.len())
            .ok_or(EncodeError::PayloadTooLarge)?;
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Append one byte
    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write(&[value])
    }

    /// Append a big-endian `u16`
    pub fn write_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write(&value.to_be_bytes())
    }

    /// Append a big-endian `u32`
    pub fn write_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write(&value.to_be_bytes())
    }

    /// Append a value in postcard format
    pub fn serialize<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), EncodeError> {
        let used = postcard::to_slice(value, &mut self.buf[self.len..])
            .map_err(|e| match e {
                postcard::Error::SerializeBufferFull => EncodeError::PayloadTooLarge,
                _ => EncodeError::Serialize,
            })?
            .len();
        self.len += used;
        Ok(())
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes still available before the bound
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    /// The written payload
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// A frame ready to be encoded
///
/// Constructed on the stack per send; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<O: Opcode, const N: usize = DEFAULT_MAX_PAYLOAD> {
    /// Instruction identifier
    pub opcode: O,
    /// Payload data
    pub payload: Vec<u8, N>,
}

impl<O: Opcode, const N: usize> Frame<O, N> {
    /// Width of the LENGTH field for this payload bound
    pub const LENGTH_WIDTH: usize = length_width(N);

    /// OPCODE + LENGTH
    pub const HEADER_SIZE: usize = O::WIDTH + Self::LENGTH_WIDTH;

    /// Largest encoded frame
    pub const MAX_FRAME_SIZE: usize = Self::HEADER_SIZE + N + CHECKSUM_SIZE;

    const BOUND_FITS_LENGTH: () = assert!(
        N <= u16::MAX as usize,
        "maximum payload must fit a 16-bit length field"
    );

    /// Create a new frame with the given opcode and payload
    pub fn new(opcode: O, payload: &[u8]) -> Result<Self, EncodeError> {
        let () = Self::BOUND_FITS_LENGTH;

        if payload.len() > N {
            return Err(EncodeError::PayloadTooLarge);
        }

        let payload = Vec::from_slice(payload).map_err(|_| EncodeError::PayloadTooLarge)?;
        Ok(Self { opcode, payload })
    }

    /// Create a frame with no payload
    pub fn empty(opcode: O) -> Self {
        let () = Self::BOUND_FITS_LENGTH;

        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Create a frame whose payload is produced by `write`
    ///
    /// Fails without producing a frame if the writer exceeds the bound.
    pub fn build<F>(opcode: O, write: F) -> Result<Self, EncodeError>
    where
        F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
    {
        let mut buf = [0u8; N];
        let mut writer = PayloadWriter::new(&mut buf);
        write(&mut writer)?;
        let len = writer.len();
        Self::new(opcode, &buf[..len])
    }

    /// Encode OPCODE + LENGTH
    ///
    /// Returns the header bytes and how many of them are used.
    pub fn header(&self) -> ([u8; MAX_HEADER_SIZE], usize) {
        let mut header = [0u8; MAX_HEADER_SIZE];
        let len = encode_header::<O>(self.opcode, self.payload.len(), N, &mut header);
        (header, len)
    }

    /// CRC over header and payload
    pub fn checksum(&self) -> u16 {
        let (header, len) = self.header();
        let mut crc = Crc16::new();
        crc.update(&header[..len]);
        crc.update(&self.payload);
        crc.finish()
    }

    /// Size of this frame on the wire
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }

    /// Encode this frame into a byte buffer
    ///
    /// Returns the number of bytes written
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, EncodeError> {
        let frame_len = self.encoded_len();
        if buffer.len() < frame_len {
            return Err(EncodeError::BufferTooSmall);
        }

        let (header, header_len) = self.header();
        let payload_end = header_len + self.payload.len();

        buffer[..header_len].copy_from_slice(&header[..header_len]);
        buffer[header_len..payload_end].copy_from_slice(&self.payload);
        buffer[payload_end..frame_len].copy_from_slice(&self.checksum().to_be_bytes());

        Ok(frame_len)
    }
}

/// Write OPCODE + LENGTH for a payload of `len` bytes under bound `max_payload`
pub(crate) fn encode_header<O: Opcode>(
    opcode: O,
    len: usize,
    max_payload: usize,
    out: &mut [u8; MAX_HEADER_SIZE],
) -> usize {
    opcode.write_be(&mut out[..O::WIDTH]);
    match length_width(max_payload) {
        1 => {
            out[O::WIDTH] = len as u8;
            O::WIDTH + 1
        }
        _ => {
            out[O::WIDTH..O::WIDTH + 2].copy_from_slice(&(len as u16).to_be_bytes());
            O::WIDTH + 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[test]
    fn test_frame_encode_empty_payload() {
        let frame = Frame::<u8, 16>::empty(0x20);
        let mut buffer = [0u8; 10];
        let len = frame.encode(&mut buffer).unwrap();

        assert_eq!(len, 4);
        assert_eq!(buffer[0], 0x20); // opcode
        assert_eq!(buffer[1], 0); // length
        assert_eq!(&buffer[2..4], &[0x1B, 0xE9]); // crc16([0x20, 0x00])
    }

    #[test]
    fn test_frame_encode_with_payload() {
        let frame = Frame::<u8, 16>::new(0x01, &[7, 8, 9]).unwrap();
        let mut buffer = [0u8; 16];
        let len = frame.encode(&mut buffer).unwrap();

        assert_eq!(len, 7);
        assert_eq!(&buffer[..len], &[0x01, 0x03, 7, 8, 9, 0xBD, 0x91]);
    }

    #[test]
    fn test_wide_opcode_and_length() {
        let frame = Frame::<u16, 300>::new(0x1234, &[0xAA]).unwrap();
        let mut buffer = [0u8; 8];
        let len = frame.encode(&mut buffer).unwrap();

        assert_eq!(Frame::<u16, 300>::HEADER_SIZE, 4);
        assert_eq!(len, 7);
        assert_eq!(&buffer[..5], &[0x12, 0x34, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn test_payload_too_large() {
        let large_payload = [0u8; 17];
        let result = Frame::<u8, 16>::new(0x21, &large_payload);
        assert_eq!(result, Err(EncodeError::PayloadTooLarge));
    }

    #[test]
    fn test_buffer_too_small() {
        let frame = Frame::<u8, 16>::new(0x21, &[1, 2, 3]).unwrap();
        let mut buffer = [0u8; 6];
        assert_eq!(frame.encode(&mut buffer), Err(EncodeError::BufferTooSmall));
    }

    #[test]
    fn test_build_rejects_overflowing_writer() {
        let result = Frame::<u8, 4>::build(0x02, |w| {
            w.write_u16(0xBEEF)?;
            w.write(&[1, 2, 3])
        });
        assert_eq!(result, Err(EncodeError::PayloadTooLarge));
    }

    #[test]
    fn test_writer_overflow_keeps_prefix() {
        let mut buf = [0u8; 4];
        let mut writer = PayloadWriter::new(&mut buf);
        writer.write_u16(0x0102).unwrap();
        assert_eq!(writer.write_u32(7), Err(EncodeError::PayloadTooLarge));
        assert_eq!(writer.as_slice(), &[0x01, 0x02]);
        assert_eq!(writer.remaining(), 2);
    }

    #[derive(Serialize)]
    struct Move {
        axis: u8,
        steps: i16,
    }

    #[test]
    fn test_build_with_postcard_arguments() {
        let frame = Frame::<u8, 16>::build(0x10, |w| {
            w.serialize(&Move { axis: 2, steps: -3 })
        })
        .unwrap();
        // u8 as-is, i16 zigzag varint: -3 -> 5
        assert_eq!(frame.payload.as_slice(), &[2, 5]);
    }

    #[test]
    fn test_postcard_overflow_is_payload_too_large() {
        let result = Frame::<u8, 2>::build(0x10, |w| w.serialize(&[1u8, 2, 3, 4]));
        assert_eq!(result, Err(EncodeError::PayloadTooLarge));
    }
}
