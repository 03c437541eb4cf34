//! Opcode widths
//!
//! Opcodes are fixed-width unsigned identifiers. The width is chosen at
//! compile time through the [`Opcode`] type parameter, mirroring the
//! length field whose width follows from the maximum payload size.

use core::fmt::Debug;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
}

/// A fixed-width opcode type
pub trait Opcode: Copy + Eq + Debug + sealed::Sealed {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Write the big-endian encoding into `out[..WIDTH]`
    fn write_be(self, out: &mut [u8]);

    /// Read from the first `WIDTH` bytes of `bytes`
    fn read_be(bytes: &[u8]) -> Self;

    /// Widen for logging and diagnostics
    fn as_u16(self) -> u16;
}

impl Opcode for u8 {
    const WIDTH: usize = 1;

    fn write_be(self, out: &mut [u8]) {
        out[0] = self;
    }

    fn read_be(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn as_u16(self) -> u16 {
        self as u16
    }
}

impl Opcode for u16 {
    const WIDTH: usize = 2;

    fn write_be(self, out: &mut [u8]) {
        out[..2].copy_from_slice(&self.to_be_bytes());
    }

    fn read_be(bytes: &[u8]) -> Self {
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    fn as_u16(self) -> u16 {
        self
    }
}

/// Width in bytes of the LENGTH field for a given maximum payload
pub const fn length_width(max_payload: usize) -> usize {
    if max_payload <= u8::MAX as usize {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_is_big_endian() {
        let mut out = [0u8; 2];
        0x1234u16.write_be(&mut out);
        assert_eq!(out, [0x12, 0x34]);
        assert_eq!(u16::read_be(&out), 0x1234);
    }

    #[test]
    fn test_length_width() {
        assert_eq!(length_width(0), 1);
        assert_eq!(length_width(255), 1);
        assert_eq!(length_width(256), 2);
        assert_eq!(length_width(1024), 2);
    }
}
