//! Instruction set served over the UART link
//!
//! | Opcode | Direction | Payload                         |
//! |--------|-----------|---------------------------------|
//! | 0x01   | in        | PING, empty reply               |
//! | 0x02   | in        | ECHO, payload sent back         |
//! | 0x03   | in        | STATS request, replies `Stats`  |
//! | 0x10   | out       | HELLO, firmware version string  |
//! | 0x11   | out       | STATS, postcard `Stats`         |

use defmt::*;
use embassy_rp::uart::{BufferedUartRx, BufferedUartTx};
use serde::Serialize;

use mizlang_core::instruction::{encode_postcard, encode_raw};
use mizlang_core::{Bridge, BridgeError, Context, Instruction, MagicHandshake, RegistrationError};
use mizlang_hal::IoPort;

include!(concat!(env!("OUT_DIR"), "/handshake_magic.rs"));

/// Largest payload the firmware accepts or sends
pub const MAX_PAYLOAD: usize = 64;

/// Instruction table capacity
pub const TABLE_CAPACITY: usize = 8;

pub const PING: u8 = 0x01;
pub const ECHO: u8 = 0x02;
pub const STATS_REQUEST: u8 = 0x03;
pub const HELLO: u8 = 0x10;
pub const STATS: u8 = 0x11;

pub type Rx = IoPort<BufferedUartRx>;
pub type Tx = IoPort<BufferedUartTx>;
pub type UartHandshake = MagicHandshake<{ HANDSHAKE_MAGIC.len() }>;
pub type UartBridge = Bridge<Rx, Tx, UartHandshake, Stats, MAX_PAYLOAD, TABLE_CAPACITY>;
type Ctx<'a> = Context<'a, Tx, Stats, MAX_PAYLOAD>;

/// Link counters, kept across reconnects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, defmt::Format)]
pub struct Stats {
    /// Frames handled successfully
    pub dispatched: u32,
    /// Frames discarded by the decoder
    pub dropped: u32,
    /// Handler failures
    pub handler_errors: u32,
    /// Times the link was rebuilt
    pub reconnects: u32,
}

/// Outbound instructions bound on a bridge
#[derive(Debug, Clone, Copy)]
pub struct OutboundInstructions {
    pub hello: Instruction<[u8]>,
    pub stats: Instruction<Stats>,
}

/// Bind every instruction of the set on `bridge`
pub fn register_all(bridge: &mut UartBridge) -> Result<OutboundInstructions, RegistrationError> {
    bridge.register(PING, ping)?;
    bridge.register(ECHO, echo)?;
    bridge.register(STATS_REQUEST, stats_request)?;

    Ok(OutboundInstructions {
        hello: bridge.register_instruction(HELLO, encode_raw)?,
        stats: bridge.register_instruction(STATS, encode_postcard::<Stats>)?,
    })
}

fn ping(_payload: &[u8], ctx: &mut Ctx<'_>) -> Result<(), BridgeError> {
    trace!("PING received");
    ctx.reply(&[])
}

fn echo(payload: &[u8], ctx: &mut Ctx<'_>) -> Result<(), BridgeError> {
    debug!("ECHO {} bytes", payload.len());
    ctx.reply(payload)
}

fn stats_request(payload: &[u8], ctx: &mut Ctx<'_>) -> Result<(), BridgeError> {
    if !payload.is_empty() {
        return Err(BridgeError::InvalidPayload);
    }
    let stats = *ctx.data();
    ctx.reply_with(|w| w.serialize(&stats))
}
