//! Bridge behind a mutex
//!
//! When polling and sending happen from different contexts (tasks,
//! interrupt handlers, threads on a host), every access goes through one
//! `embassy_sync` blocking mutex so frames never interleave and
//! registration never races dispatch.
//!
//! The mutex guards a `RefCell`. A handler that tries to use the shared
//! bridge while it is being polled gets [`BridgeError::Busy`] instead of a
//! deadlock; handlers reply through their [`Context`](crate::Context).

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use mizlang_hal::{InputPort, OutputPort};
use mizlang_protocol::{EncodeError, Opcode, PayloadWriter};

use crate::bridge::{Bridge, DispatchOutcome};
use crate::error::BridgeError;
use crate::handshake::Handshake;
use crate::instruction::{Instruction, InstructionHandle, Outbound, Serializer};
use crate::state::LinkState;
use crate::table::Handler;

/// Mutex-protected bridge
pub struct SharedBridge<M: RawMutex, B> {
    inner: Mutex<M, RefCell<B>>,
}

impl<M: RawMutex, B> SharedBridge<M, B> {
    /// Wrap a bridge
    pub const fn new(bridge: B) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(bridge)),
        }
    }

    /// Run `f` with exclusive access to the bridge
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> R) -> Result<R, BridgeError> {
        self.inner.lock(|cell| {
            let mut bridge = cell.try_borrow_mut().map_err(|_| BridgeError::Busy)?;
            Ok(f(&mut *bridge))
        })
    }

    /// Unwrap the bridge
    pub fn into_inner(self) -> B {
        self.inner.into_inner().into_inner()
    }
}

impl<M, I, O, H, T, const N: usize, const CAP: usize, Op> SharedBridge<M, Bridge<I, O, H, T, N, CAP, Op>>
where
    M: RawMutex,
    I: InputPort,
    O: OutputPort,
    H: Handshake<I>,
    Op: Opcode,
{
    /// See [`Bridge::poll`]
    pub fn poll(&self) -> Result<DispatchOutcome<Op>, BridgeError> {
        self.with(|bridge| bridge.poll())?
    }

    /// See [`Bridge::start`]
    pub fn start(&self) -> Result<LinkState, BridgeError> {
        self.with(|bridge| bridge.start())?
    }

    /// Current link state
    pub fn state(&self) -> Result<LinkState, BridgeError> {
        self.with(|bridge| bridge.state())
    }

    /// See [`Bridge::register`]
    pub fn register(&self, opcode: Op, handler: Handler<O, T, N, Op>) -> Result<(), BridgeError> {
        self.with(|bridge| bridge.register(opcode, handler).map(|_| ()))?
            .map_err(BridgeError::from)
    }

    /// Register an outbound instruction and bind it to this bridge
    pub fn register_instruction<A: ?Sized>(
        &self,
        opcode: Op,
        serializer: Serializer<A>,
    ) -> Result<InstructionHandle<'_, A, Op>, BridgeError> {
        let instruction = self
            .with(|bridge| bridge.register_instruction(opcode, serializer))?
            .map_err(BridgeError::from)?;
        Ok(InstructionHandle::new(self, instruction))
    }

    /// Bind an already registered instruction to this bridge
    pub fn handle<A: ?Sized>(&self, instruction: Instruction<A, Op>) -> InstructionHandle<'_, A, Op> {
        InstructionHandle::new(self, instruction)
    }
}

impl<M, I, O, H, T, const N: usize, const CAP: usize, Op> Outbound<Op>
    for SharedBridge<M, Bridge<I, O, H, T, N, CAP, Op>>
where
    M: RawMutex,
    I: InputPort,
    O: OutputPort,
    H: Handshake<I>,
    Op: Opcode,
{
    fn send_with(
        &self,
        opcode: Op,
        write: &mut dyn FnMut(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
    ) -> Result<(), BridgeError> {
        self.with(|bridge| bridge.send_with(opcode, |w| write(w)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::error::RegistrationError;
    use crate::handshake::AcceptAll;
    use crate::instruction::encode_raw;
    use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
    use mizlang_hal::MemoryPort;
    use mizlang_protocol::FrameDecoder;
    use std::vec::Vec;

    type Port = MemoryPort<256>;
    type TestBridge = Bridge<Port, Port, AcceptAll, (), 16, 4>;

    fn bridge() -> TestBridge {
        Bridge::new(Port::new(), Port::new(), BridgeConfig::new(AcceptAll), ())
    }

    fn written(bridge: &mut TestBridge) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let len = bridge.output_mut().take_written(&mut buf);
        buf[..len].to_vec()
    }

    #[test]
    fn test_handle_sends_through_shared_bridge() {
        let shared = SharedBridge::<NoopRawMutex, _>::new(bridge());
        assert_eq!(shared.start(), Ok(LinkState::Ready));

        let set = shared.register_instruction(0x10, encode_raw).unwrap();
        let again = shared.handle(set.instruction());
        set.send(&[1, 2]).unwrap();
        again.send(&[3]).unwrap();

        let bytes = shared.with(written).unwrap();
        assert_eq!(&bytes[..4], &[0x10, 0x02, 1, 2]);
        assert_eq!(&bytes[6..9], &[0x10, 0x01, 3]);
        assert_eq!(bytes.len(), 11);
    }

    #[test]
    fn test_registration_errors_surface() {
        let shared = SharedBridge::<NoopRawMutex, _>::new(bridge());
        shared.register_instruction(0x10, encode_raw).unwrap();

        assert_eq!(
            shared.register_instruction(0x10, encode_raw).map(|h| h.opcode()),
            Err(BridgeError::Registration(RegistrationError::DuplicateOpcode))
        );
    }

    #[test]
    fn test_reentrant_access_is_busy() {
        let shared = SharedBridge::<NoopRawMutex, _>::new(bridge());
        assert_eq!(
            shared.with(|_| shared.poll()),
            Ok(Err(BridgeError::Busy))
        );
        assert_eq!(shared.poll(), Ok(DispatchOutcome::Idle));
    }

    #[test]
    fn test_send_before_start_is_not_ready() {
        let shared = SharedBridge::<NoopRawMutex, _>::new(bridge());
        let set = shared.register_instruction(0x10, encode_raw).unwrap();
        assert_eq!(set.send(&[1]), Err(BridgeError::NotReady));
        assert_eq!(shared.state(), Ok(LinkState::Idle));
    }

    #[test]
    fn test_concurrent_frames_decode_cleanly() {
        let shared = SharedBridge::<CriticalSectionRawMutex, _>::new(bridge());
        shared.start().unwrap();
        let a = shared.register_instruction(0x01, encode_raw).unwrap().instruction();
        let b = shared.register_instruction(0x02, encode_raw).unwrap().instruction();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..8u8 {
                    shared.handle(a).send(&[i]).unwrap();
                }
            });
            s.spawn(|| {
                for i in 0..8u8 {
                    shared.handle(b).send(&[i, i]).unwrap();
                }
            });
        });

        let mut bridge = shared.into_inner();
        let bytes = written(&mut bridge);
        let mut decoder = FrameDecoder::<u8, 16>::new();
        let mut input = bytes.iter().copied();
        let mut frames = 0;
        loop {
            match decoder.decode(&mut input, |_| true) {
                Ok(Some(frame)) => {
                    assert_eq!(frame.payload.len(), frame.opcode as usize);
                    frames += 1;
                }
                Ok(None) => break,
                Err(e) => panic!("interleaved frame: {:?}", e),
            }
        }
        assert_eq!(frames, 16);
    }
}
