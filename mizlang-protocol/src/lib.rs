//! MizLang Instruction Bridge Protocol
//!
//! This crate defines the wire format used by the instruction bridge to
//! carry typed commands between a microcontroller and a host (or between
//! two devices) over a raw UART-style byte stream.
//!
//! # Protocol Overview
//!
//! Every instruction invocation travels as one frame:
//! ```text
//! ┌────────┬────────┬─────────────┬──────────┐
//! │ OPCODE │ LENGTH │ PAYLOAD     │ CHECKSUM │
//! │ 1–2B   │ 1–2B   │ 0–N B       │ 2B       │
//! └────────┴────────┴─────────────┴──────────┘
//! ```
//!
//! - OPCODE is big-endian, one byte for `u8` opcodes and two for `u16`.
//! - LENGTH is one byte when the maximum payload fits in a byte, two
//!   (big-endian) otherwise.
//! - CHECKSUM is CRC-16/CCITT-FALSE over OPCODE, LENGTH and PAYLOAD,
//!   big-endian.
//!
//! There is no start byte. A frame with a bad checksum is dropped whole,
//! using its declared LENGTH; an oversized LENGTH is rescanned one byte
//! later.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod checksum;
pub mod codec;
pub mod frame;
pub mod opcode;

pub use checksum::{crc16, Crc16};
pub use codec::{DecodeError, DecodeState, FrameDecoder, FrameRef};
pub use frame::{
    EncodeError, Frame, PayloadWriter, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD, MAX_HEADER_SIZE,
};
pub use opcode::{length_width, Opcode};
