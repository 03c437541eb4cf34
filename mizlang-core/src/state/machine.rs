//! Link state definition

use mizlang_hal::IoError;

use super::events::LinkEvent;
use crate::error::BridgeError;

/// Link states
///
/// `Faulted` is terminal. Leaving it requires building a new bridge.
#[doc(alias = "HandshakeState")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Constructed, nothing exchanged yet
    Idle,
    /// Awaiting the peer
    Handshaking,
    /// Established; dispatch and send are permitted
    Ready,
    /// Link failed
    Faulted(FaultKind),
}

/// Why a link faulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Handshake retries exhausted
    HandshakeFailed,
    /// Port reported an unrecoverable error
    Port(IoError),
}

impl LinkState {
    /// Check if inbound dispatch and outbound sends are permitted
    pub fn is_ready(&self) -> bool {
        matches!(self, LinkState::Ready)
    }

    /// Check if the link has failed
    pub fn is_faulted(&self) -> bool {
        matches!(self, LinkState::Faulted(_))
    }

    /// Error a send attempted in this state fails with, if any
    pub fn send_error(&self) -> Option<BridgeError> {
        match self {
            LinkState::Ready => None,
            LinkState::Faulted(_) => Some(BridgeError::LinkLost),
            LinkState::Idle | LinkState::Handshaking => Some(BridgeError::NotReady),
        }
    }

    /// Process an event and return the next state
    pub fn transition(self, event: LinkEvent) -> Self {
        use LinkEvent::*;
        use LinkState::*;

        match (self, event) {
            // Faulted never leaves
            (Faulted(_), _) => self,

            (Idle, Start) => Handshaking,

            (Handshaking, HandshakeSucceeded) => Ready,
            (Handshaking, HandshakeRetry) => Handshaking,
            (Handshaking, HandshakeExhausted) => Faulted(FaultKind::HandshakeFailed),

            (_, PortFailed(e)) => Faulted(FaultKind::Port(e)),

            // Default: stay in current state
            _ => self,
        }
    }
}
