//! Frame integrity check
//!
//! CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no input or
//! output reflection, no final XOR. Computed bitwise to keep flash usage
//! small on the smaller parts.

const POLY: u16 = 0x1021;
const INIT: u16 = 0xFFFF;

/// Incremental CRC-16/CCITT-FALSE
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    state: u16,
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl Crc16 {
    /// Start a new checksum
    pub const fn new() -> Self {
        Self { state: INIT }
    }

    /// Feed one byte
    pub fn update_byte(&mut self, byte: u8) {
        self.state ^= (byte as u16) << 8;
        for _ in 0..8 {
            if self.state & 0x8000 != 0 {
                self.state = (self.state << 1) ^ POLY;
            } else {
                self.state <<= 1;
            }
        }
    }

    /// Feed a run of bytes
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update_byte(byte);
        }
    }

    /// Final checksum value
    pub fn finish(self) -> u16 {
        self.state
    }
}

/// One-shot CRC-16/CCITT-FALSE
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(bytes);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Standard check input for CRC catalogues
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn test_empty_input_is_init() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut crc = Crc16::new();
        crc.update(b"1234");
        crc.update(b"56789");
        assert_eq!(crc.finish(), crc16(b"123456789"));
    }
}
