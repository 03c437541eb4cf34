//! Instruction bridge core
//!
//! This crate contains everything above the byte stream and the frame
//! codec:
//!
//! - Instruction table (fixed-capacity opcode → handler map)
//! - Link state machine (handshake, ready, faulted)
//! - Bridge core (receive-dispatch step and send path)
//! - Instruction handles for typed outbound commands
//! - Shared bridge wrapper for multi-context use
//! - Link configuration
//!
//! Nothing here allocates. All capacities are const generics.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod bridge;
pub mod config;
pub mod error;
pub mod handshake;
pub mod instruction;
pub mod shared;
pub mod state;
pub mod table;

pub use bridge::{Bridge, Context, DispatchOutcome};
pub use config::{BridgeConfig, ConfigError, LinkConfig};
pub use error::{BridgeError, HandshakeError, RegistrationError};
pub use handshake::{AcceptAll, Handshake, MagicHandshake};
pub use instruction::{Instruction, InstructionHandle, Outbound, Serializer};
pub use shared::SharedBridge;
pub use state::{FaultKind, LinkEvent, LinkState};
pub use table::{Handler, HandlerEntry, InstructionTable};

pub use mizlang_hal::{InputPort, IoError, OutputPort};
pub use mizlang_protocol::{DecodeError, EncodeError, Opcode, PayloadWriter};
