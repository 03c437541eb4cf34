//! Outbound instructions
//!
//! [`Instruction`] is a copyable token binding an opcode to a serializer
//! for its arguments. It is returned when an outbound instruction is
//! registered and passed back to `send`. An [`InstructionHandle`] pairs a
//! token with a shared bridge so it can be passed around and used on its
//! own.

use core::fmt;
use core::marker::PhantomData;

use mizlang_protocol::{EncodeError, Opcode, PayloadWriter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Argument serialization strategy
pub type Serializer<A> = fn(&A, &mut PayloadWriter<'_>) -> Result<(), EncodeError>;

/// Registered outbound instruction
pub struct Instruction<A: ?Sized, Op = u8> {
    opcode: Op,
    serializer: Serializer<A>,
    _args: PhantomData<fn(&A)>,
}

impl<A: ?Sized, Op: Copy> Clone for Instruction<A, Op> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized, Op: Copy> Copy for Instruction<A, Op> {}

impl<A: ?Sized, Op: fmt::Debug> fmt::Debug for Instruction<A, Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("opcode", &self.opcode)
            .finish_non_exhaustive()
    }
}

impl<A: ?Sized, Op: Opcode> Instruction<A, Op> {
    pub(crate) fn new(opcode: Op, serializer: Serializer<A>) -> Self {
        Self {
            opcode,
            serializer,
            _args: PhantomData,
        }
    }

    /// Bound opcode
    pub fn opcode(&self) -> Op {
        self.opcode
    }

    /// Serialize `args` into `out`
    pub fn serialize(&self, args: &A, out: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
        (self.serializer)(args, out)
    }
}

/// Send path shared by instruction handles
///
/// Implemented by [`SharedBridge`](crate::SharedBridge). The payload is
/// produced by `write` into a bounded buffer before anything is sent.
pub trait Outbound<Op: Opcode> {
    /// Build and transmit one frame tagged with `opcode`
    fn send_with(
        &self,
        opcode: Op,
        write: &mut dyn FnMut(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
    ) -> Result<(), BridgeError>;
}

/// Instruction bound to the bridge it was registered on
///
/// Holds no mutable state, so any number of handles can coexist.
pub struct InstructionHandle<'b, A: ?Sized, Op = u8> {
    link: &'b dyn Outbound<Op>,
    instruction: Instruction<A, Op>,
}

impl<A: ?Sized, Op: Copy> Clone for InstructionHandle<'_, A, Op> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: ?Sized, Op: Copy> Copy for InstructionHandle<'_, A, Op> {}

impl<'b, A: ?Sized, Op: Opcode> InstructionHandle<'b, A, Op> {
    /// Bind `instruction` to `link`
    pub fn new(link: &'b dyn Outbound<Op>, instruction: Instruction<A, Op>) -> Self {
        Self { link, instruction }
    }

    /// Bound opcode
    pub fn opcode(&self) -> Op {
        self.instruction.opcode()
    }

    /// Underlying token
    pub fn instruction(&self) -> Instruction<A, Op> {
        self.instruction
    }

    /// Serialize `args` and transmit them
    pub fn send(&self, args: &A) -> Result<(), BridgeError> {
        let instruction = self.instruction;
        self.link
            .send_with(instruction.opcode(), &mut |w| instruction.serialize(args, w))
    }
}

/// Copy raw bytes as the payload
pub fn encode_raw(args: &[u8], out: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
    out.write(args)
}

/// Instruction without arguments
pub fn encode_nothing(_args: &(), _out: &mut PayloadWriter<'_>) -> Result<(), EncodeError> {
    Ok(())
}

/// Serialize arguments in postcard format
#[cfg(feature = "serde")]
pub fn encode_postcard<A: Serialize>(
    args: &A,
    out: &mut PayloadWriter<'_>,
) -> Result<(), EncodeError> {
    out.serialize(args)
}

/// Decode postcard arguments in a handler
///
/// Trailing bytes are rejected so a length mismatch is never silently
/// accepted.
#[cfg(feature = "serde")]
pub fn decode_postcard<'de, A: Deserialize<'de>>(payload: &'de [u8]) -> Result<A, BridgeError> {
    let (args, rest) = postcard::take_from_bytes(payload)?;
    if !rest.is_empty() {
        return Err(BridgeError::InvalidPayload);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use heapless::Vec;

    #[cfg(feature = "serde")]
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Move {
        axis: u8,
        steps: i16,
    }

    /// Records every frame it is asked to send
    #[derive(Default)]
    struct Recorder {
        sent: RefCell<Vec<(u8, Vec<u8, 16>), 4>>,
    }

    impl Outbound<u8> for Recorder {
        fn send_with(
            &self,
            opcode: u8,
            write: &mut dyn FnMut(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
        ) -> Result<(), BridgeError> {
            let mut buf = [0u8; 16];
            let mut writer = PayloadWriter::new(&mut buf);
            write(&mut writer)?;
            let payload = Vec::from_slice(writer.as_slice()).map_err(|_| BridgeError::Busy)?;
            self.sent
                .borrow_mut()
                .push((opcode, payload))
                .map_err(|_| BridgeError::Busy)
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_handles_send_with_bound_strategy() {
        let recorder = Recorder::default();
        let moves = InstructionHandle::new(&recorder, Instruction::new(0x10, encode_postcard::<Move>));
        let raw = InstructionHandle::new(&recorder, Instruction::new(0x11, encode_raw));
        let ping = InstructionHandle::new(&recorder, Instruction::new(0x12, encode_nothing));

        moves.send(&Move { axis: 2, steps: -3 }).unwrap();
        raw.send(&[0xAA, 0xBB]).unwrap();
        ping.send(&()).unwrap();

        let sent = recorder.sent.borrow();
        assert_eq!(sent.len(), 3);
        assert_eq!((sent[0].0, sent[0].1.as_slice()), (0x10, &[2u8, 5][..]));
        assert_eq!((sent[1].0, sent[1].1.as_slice()), (0x11, &[0xAAu8, 0xBB][..]));
        assert_eq!((sent[2].0, sent[2].1.as_slice()), (0x12, &[][..]));
    }

    #[test]
    fn test_handle_surfaces_encode_error() {
        let recorder = Recorder::default();
        let raw = InstructionHandle::new(&recorder, Instruction::new(0x11, encode_raw));

        assert_eq!(
            raw.send(&[0u8; 17]),
            Err(BridgeError::EncodeFailed(EncodeError::PayloadTooLarge))
        );
        assert!(recorder.sent.borrow().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_decode_postcard_arguments() {
        let args: Move = decode_postcard(&[2, 5]).unwrap();
        assert_eq!(args, Move { axis: 2, steps: -3 });
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_decode_postcard_rejects_trailing_bytes() {
        assert_eq!(
            decode_postcard::<Move>(&[2, 5, 0]),
            Err(BridgeError::InvalidPayload)
        );
        assert_eq!(decode_postcard::<Move>(&[2]), Err(BridgeError::InvalidPayload));
    }
}
