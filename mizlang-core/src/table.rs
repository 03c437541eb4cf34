//! Instruction table
//!
//! Fixed-capacity map from opcode to handler. Entries are appended during
//! setup and never removed; lookup is a linear scan.
//!
//! Outbound instructions also take a slot (with no handler) so an opcode
//! can never be bound twice in either direction.

use core::fmt;

use heapless::Vec;
use mizlang_protocol::Opcode;

use crate::bridge::Context;
use crate::error::{BridgeError, RegistrationError};

/// Inbound instruction handler
///
/// Receives a read-only view of the payload and a context giving access to
/// user data and the send path.
pub type Handler<O, T, const N: usize, Op = u8> =
    fn(&[u8], &mut Context<'_, O, T, N, Op>) -> Result<(), BridgeError>;

/// One registered opcode
pub struct HandlerEntry<O, T, const N: usize, Op = u8> {
    opcode: Op,
    handler: Option<Handler<O, T, N, Op>>,
}

impl<O, T, const N: usize, Op: Copy> Clone for HandlerEntry<O, T, N, Op> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, T, const N: usize, Op: Copy> Copy for HandlerEntry<O, T, N, Op> {}

impl<O, T, const N: usize, Op: fmt::Debug> fmt::Debug for HandlerEntry<O, T, N, Op> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("opcode", &self.opcode)
            .field("inbound", &self.handler.is_some())
            .finish()
    }
}

impl<O, T, const N: usize, Op: Opcode> HandlerEntry<O, T, N, Op> {
    /// Bound opcode
    pub fn opcode(&self) -> Op {
        self.opcode
    }

    /// Handler for inbound frames, `None` for outbound-only instructions
    pub fn handler(&self) -> Option<Handler<O, T, N, Op>> {
        self.handler
    }

    /// Check if frames with this opcode are dispatched locally
    pub fn is_inbound(&self) -> bool {
        self.handler.is_some()
    }
}

/// Fixed-capacity instruction table
pub struct InstructionTable<O, T, const N: usize, const CAP: usize, Op = u8> {
    entries: Vec<HandlerEntry<O, T, N, Op>, CAP>,
}

impl<O, T, const N: usize, const CAP: usize, Op: Opcode> Default
    for InstructionTable<O, T, N, CAP, Op>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<O, T, const N: usize, const CAP: usize, Op: fmt::Debug> fmt::Debug
    for InstructionTable<O, T, N, CAP, Op>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl<O, T, const N: usize, const CAP: usize, Op: Opcode> InstructionTable<O, T, N, CAP, Op> {
    /// Create an empty table
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Bind `opcode` to an inbound handler
    pub fn register(
        &mut self,
        opcode: Op,
        handler: Handler<O, T, N, Op>,
    ) -> Result<&HandlerEntry<O, T, N, Op>, RegistrationError> {
        self.insert(HandlerEntry {
            opcode,
            handler: Some(handler),
        })
    }

    /// Reserve `opcode` for an outbound instruction
    pub fn reserve(&mut self, opcode: Op) -> Result<&HandlerEntry<O, T, N, Op>, RegistrationError> {
        self.insert(HandlerEntry {
            opcode,
            handler: None,
        })
    }

    fn insert(
        &mut self,
        entry: HandlerEntry<O, T, N, Op>,
    ) -> Result<&HandlerEntry<O, T, N, Op>, RegistrationError> {
        if self.contains(entry.opcode) {
            return Err(RegistrationError::DuplicateOpcode);
        }

        let index = self.entries.len();
        self.entries
            .push(entry)
            .map_err(|_| RegistrationError::CapacityExceeded)?;
        Ok(&self.entries[index])
    }

    /// Look up the entry for `opcode`
    pub fn get(&self, opcode: Op) -> Option<&HandlerEntry<O, T, N, Op>> {
        self.entries.iter().find(|e| e.opcode == opcode)
    }

    /// Handler for inbound frames with `opcode`
    pub fn handler(&self, opcode: Op) -> Option<Handler<O, T, N, Op>> {
        self.get(opcode).and_then(|e| e.handler)
    }

    /// Check if `opcode` is bound in either direction
    pub fn contains(&self, opcode: Op) -> bool {
        self.get(opcode).is_some()
    }

    /// Check if inbound frames with `opcode` would be dispatched
    pub fn accepts(&self, opcode: Op) -> bool {
        self.handler(opcode).is_some()
    }

    /// Registered entries in registration order
    pub fn iter(&self) -> impl Iterator<Item = &HandlerEntry<O, T, N, Op>> {
        self.entries.iter()
    }

    /// Number of registered opcodes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of opcodes
    pub fn capacity(&self) -> usize {
        CAP
    }

    /// Returns true if no more opcodes fit
    pub fn is_full(&self) -> bool {
        self.entries.is_full()
    }
}
