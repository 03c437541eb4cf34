//! Bridge core
//!
//! Owns the ports, the instruction table and the frame decoder, and drives
//! the link state machine:
//!
//! ```text
//!   Idle ──poll/start──▶ Handshaking ──success──▶ Ready
//!                          │    ▲                   │
//!                          │    └─retry             │ fatal port error
//!                          ▼                        ▼
//!                       Faulted ◀───────────────────┘
//! ```
//!
//! Each `poll` decodes and dispatches at most one frame. Sends are
//! synchronous: a frame is built completely before its first byte is
//! written, and the port's result is returned to the caller.

use mizlang_hal::{write_all, InputPort, IoError, OutputPort};
use mizlang_protocol::{DecodeError, EncodeError, Frame, FrameDecoder, Opcode, PayloadWriter};

use crate::config::{BridgeConfig, LinkConfig};
use crate::error::{BridgeError, HandshakeError, RegistrationError};
use crate::handshake::Handshake;
use crate::instruction::{Instruction, Serializer};
use crate::state::{LinkEvent, LinkState};
use crate::table::{Handler, HandlerEntry, InstructionTable};

/// Bytes pulled from the input port per read
const RX_CHUNK: usize = 32;

/// Result of one successful `poll`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DispatchOutcome<Op = u8> {
    /// No bytes pending
    Idle,
    /// Bytes consumed, frame not complete yet
    NoFrameYet,
    /// Frame handled by the handler for this opcode
    Dispatched(Op),
    /// Frame discarded; the link stays up
    FrameDropped(DecodeError),
    /// Handshake still in progress
    Handshaking,
}

/// Instruction bridge over one pair of ports
///
/// - `N`: maximum payload size
/// - `CAP`: instruction table capacity
/// - `T`: user data handed to handlers through [`Context`]
pub struct Bridge<I, O, H, T, const N: usize, const CAP: usize, Op: Opcode = u8> {
    input: I,
    output: O,
    handshake: H,
    config: LinkConfig,
    table: InstructionTable<O, T, N, CAP, Op>,
    decoder: FrameDecoder<Op, N>,
    rx: [u8; RX_CHUNK],
    rx_pos: usize,
    rx_len: usize,
    state: LinkState,
    failed_attempts: u16,
    data: T,
}

impl<I, O, H, T, const N: usize, const CAP: usize, Op> Bridge<I, O, H, T, N, CAP, Op>
where
    I: InputPort,
    O: OutputPort,
    H: Handshake<I>,
    Op: Opcode,
{
    /// Create an idle bridge
    pub fn new(input: I, output: O, config: BridgeConfig<H>, data: T) -> Self {
        Self {
            input,
            output,
            handshake: config.handshake,
            config: config.link,
            table: InstructionTable::new(),
            decoder: FrameDecoder::new(),
            rx: [0; RX_CHUNK],
            rx_pos: 0,
            rx_len: 0,
            state: LinkState::Idle,
            failed_attempts: 0,
            data,
        }
    }

    /// Current link state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Link parameters
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Registered instructions
    pub fn table(&self) -> &InstructionTable<O, T, N, CAP, Op> {
        &self.table
    }

    /// User data
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Mutable user data
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Input port
    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    /// Output port
    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Tear the bridge down
    pub fn into_parts(self) -> (I, O, T) {
        (self.input, self.output, self.data)
    }

    /// Bind `opcode` to an inbound handler
    pub fn register(
        &mut self,
        opcode: Op,
        handler: Handler<O, T, N, Op>,
    ) -> Result<&HandlerEntry<O, T, N, Op>, RegistrationError> {
        self.table.register(opcode, handler)
    }

    /// Register an outbound instruction
    ///
    /// The opcode takes a table slot so it cannot also be bound inbound.
    pub fn register_instruction<A: ?Sized>(
        &mut self,
        opcode: Op,
        serializer: Serializer<A>,
    ) -> Result<Instruction<A, Op>, RegistrationError> {
        self.table.reserve(opcode)?;
        Ok(Instruction::new(opcode, serializer))
    }

    /// Run one handshake attempt if the link is not up yet
    ///
    /// Returns the state after the attempt.
    pub fn start(&mut self) -> Result<LinkState, BridgeError> {
        match self.state {
            LinkState::Faulted(_) => Err(BridgeError::LinkLost),
            LinkState::Ready => Ok(LinkState::Ready),
            LinkState::Idle | LinkState::Handshaking => self.handshake_step(),
        }
    }

    /// Advance the bridge by one step
    ///
    /// Before the link is up this runs one handshake attempt. Once ready it
    /// reads pending bytes and dispatches at most one frame. Handler errors
    /// are returned as-is and leave the link state alone.
    pub fn poll(&mut self) -> Result<DispatchOutcome<Op>, BridgeError> {
        match self.state {
            LinkState::Faulted(_) => return Err(BridgeError::LinkLost),
            LinkState::Ready => {}
            LinkState::Idle | LinkState::Handshaking => {
                if !self.handshake_step()?.is_ready() {
                    return Ok(DispatchOutcome::Handshaking);
                }
            }
        }

        self.dispatch_step()
    }

    /// Send an outbound instruction
    pub fn send<A: ?Sized>(
        &mut self,
        instruction: &Instruction<A, Op>,
        args: &A,
    ) -> Result<(), BridgeError> {
        self.send_with(instruction.opcode(), |w| instruction.serialize(args, w))
    }

    /// Send a frame with a raw payload
    pub fn send_raw(&mut self, opcode: Op, payload: &[u8]) -> Result<(), BridgeError> {
        self.send_with(opcode, |w| w.write(payload))
    }

    /// Send a frame whose payload is produced by `write`
    pub fn send_with<F>(&mut self, opcode: Op, write: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
    {
        send_frame::<O, Op, N, F>(
            &mut self.output,
            &mut self.state,
            &self.config,
            opcode,
            write,
        )
    }

    fn handshake_step(&mut self) -> Result<LinkState, BridgeError> {
        if self.state == LinkState::Idle {
            self.state = apply(self.state, LinkEvent::Start);
        }

        match self.handshake.attempt(&mut self.input) {
            Ok(()) => self.state = apply(self.state, LinkEvent::HandshakeSucceeded),
            Err(HandshakeError::Io(e)) if e.is_fatal() => {
                return Err(port_failed(&mut self.state, e));
            }
            Err(_e) => {
                self.failed_attempts = self.failed_attempts.saturating_add(1);

                #[cfg(feature = "defmt")]
                defmt::warn!(
                    "Handshake attempt {} failed: {}",
                    self.failed_attempts,
                    _e
                );

                if self.failed_attempts >= self.config.handshake_attempts() {
                    self.state = apply(self.state, LinkEvent::HandshakeExhausted);
                    return Err(BridgeError::HandshakeFailed);
                }
                self.state = apply(self.state, LinkEvent::HandshakeRetry);
            }
        }

        Ok(self.state)
    }

    fn dispatch_step(&mut self) -> Result<DispatchOutcome<Op>, BridgeError> {
        if self.rx_pos == self.rx_len {
            let read = self.input.read_available(&mut self.rx);
            let n = read.map_err(|e| port_failed(&mut self.state, e))?;
            self.rx_pos = 0;
            self.rx_len = n;

            if n == 0 && self.decoder.buffered() == 0 {
                return Ok(DispatchOutcome::Idle);
            }
        }

        let table = &self.table;
        let mut bytes = self.rx[self.rx_pos..self.rx_len].iter().copied();
        let decoded = self.decoder.decode(&mut bytes, |op| table.accepts(op));
        self.rx_pos = self.rx_len - bytes.len();

        let frame = match decoded {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(DispatchOutcome::NoFrameYet),
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped frame: {}", e);
                return Ok(DispatchOutcome::FrameDropped(e));
            }
        };

        let opcode = frame.opcode;
        let Some(handler) = table.handler(opcode) else {
            #[cfg(feature = "defmt")]
            defmt::warn!("Dropped frame: unknown opcode {=u16:#x}", opcode.as_u16());
            return Ok(DispatchOutcome::FrameDropped(DecodeError::UnknownOpcode));
        };

        let mut ctx = Context {
            opcode,
            output: &mut self.output,
            state: &mut self.state,
            config: &self.config,
            data: &mut self.data,
        };

        match handler(frame.payload, &mut ctx) {
            Ok(()) => Ok(DispatchOutcome::Dispatched(opcode)),
            Err(e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("Handler for {=u16:#x} failed: {}", opcode.as_u16(), e);
                Err(e)
            }
        }
    }
}

/// What a handler sees while it runs
///
/// Gives access to the bridge's user data and to the send path. Frames
/// sent from here go through the same checks as [`Bridge::send`], so a
/// fatal port error during a reply still faults the link.
pub struct Context<'a, O, T, const N: usize, Op = u8> {
    opcode: Op,
    output: &'a mut O,
    state: &'a mut LinkState,
    config: &'a LinkConfig,
    data: &'a mut T,
}

impl<O, T, const N: usize, Op: Copy> Context<'_, O, T, N, Op> {
    /// Opcode of the frame being handled
    pub fn opcode(&self) -> Op {
        self.opcode
    }

    /// Link state
    pub fn state(&self) -> LinkState {
        *self.state
    }

    /// User data
    pub fn data(&self) -> &T {
        &*self.data
    }

    /// Mutable user data
    pub fn data_mut(&mut self) -> &mut T {
        &mut *self.data
    }
}

impl<O: OutputPort, T, const N: usize, Op: Opcode> Context<'_, O, T, N, Op> {
    /// Answer with a frame carrying the same opcode
    pub fn reply(&mut self, payload: &[u8]) -> Result<(), BridgeError> {
        self.send_with(self.opcode, |w| w.write(payload))
    }

    /// Answer with a payload produced by `write`
    pub fn reply_with<F>(&mut self, write: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
    {
        self.send_with(self.opcode, write)
    }

    /// Send an outbound instruction
    pub fn send<A: ?Sized>(
        &mut self,
        instruction: &Instruction<A, Op>,
        args: &A,
    ) -> Result<(), BridgeError> {
        self.send_with(instruction.opcode(), |w| instruction.serialize(args, w))
    }

    /// Send a frame whose payload is produced by `write`
    pub fn send_with<F>(&mut self, opcode: Op, write: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
    {
        send_frame::<O, Op, N, F>(self.output, self.state, self.config, opcode, write)
    }
}

/// Build a frame and write it out
///
/// Nothing touches the port unless the link is ready and the frame was
/// built successfully.
fn send_frame<O, Op, const N: usize, F>(
    output: &mut O,
    state: &mut LinkState,
    config: &LinkConfig,
    opcode: Op,
    write: F,
) -> Result<(), BridgeError>
where
    O: OutputPort,
    Op: Opcode,
    F: FnOnce(&mut PayloadWriter<'_>) -> Result<(), EncodeError>,
{
    if let Some(e) = state.send_error() {
        return Err(e);
    }

    let frame = Frame::<Op, N>::build(opcode, write)?;
    let (header, header_len) = frame.header();
    let checksum = frame.checksum().to_be_bytes();
    let stall_limit = config.write_stall_limit;

    write_all(output, &header[..header_len], stall_limit)
        .and_then(|()| write_all(output, &frame.payload, stall_limit))
        .and_then(|()| write_all(output, &checksum, stall_limit))
        .and_then(|()| output.flush())
        .map_err(|e| port_failed(state, e))
}

/// Classify a port error, faulting the link if it is fatal
fn port_failed(state: &mut LinkState, error: IoError) -> BridgeError {
    if !error.is_fatal() {
        #[cfg(feature = "defmt")]
        defmt::warn!("Port error: {}", error);
        return BridgeError::Io(error);
    }

    *state = apply(*state, LinkEvent::PortFailed(error));

    #[cfg(feature = "defmt")]
    defmt::error!("Link lost: {}", error);

    BridgeError::LinkLost
}

fn apply(state: LinkState, event: LinkEvent) -> LinkState {
    let next = state.transition(event);

    if next != state {
        #[cfg(feature = "defmt")]
        defmt::info!("Link {} -> {} on {}", state, next, event);
    } else if event.is_handshake_event() {
        #[cfg(feature = "defmt")]
        defmt::debug!("Link stays {} on {}", state, event);
    }

    next
}
