//! Error taxonomy for the bridge
//!
//! Port and codec errors live in their own crates; this module adds the
//! setup-time and link-level errors and the conversions between layers.

use core::fmt;

use mizlang_hal::IoError;
use mizlang_protocol::EncodeError;

/// Errors from registering an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError {
    /// Opcode is already bound in this table
    DuplicateOpcode,
    /// Table is full
    CapacityExceeded,
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::DuplicateOpcode => f.write_str("opcode already registered"),
            RegistrationError::CapacityExceeded => f.write_str("instruction table is full"),
        }
    }
}

/// Errors reported by a handshake attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeError {
    /// Peer has not answered yet
    NoResponse,
    /// Peer answered with something unexpected
    BadResponse,
    /// Port failed during the attempt
    Io(IoError),
}

impl From<IoError> for HandshakeError {
    fn from(e: IoError) -> Self {
        HandshakeError::Io(e)
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::NoResponse => f.write_str("no handshake response"),
            HandshakeError::BadResponse => f.write_str("unexpected handshake response"),
            HandshakeError::Io(e) => write!(f, "handshake I/O: {}", e),
        }
    }
}

/// Errors returned by bridge operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BridgeError {
    /// Link is faulted; the bridge must be rebuilt
    LinkLost,
    /// Handshake retries exhausted
    HandshakeFailed,
    /// Frame could not be built; nothing was written
    EncodeFailed(EncodeError),
    /// Link is not ready yet (still idle or handshaking)
    NotReady,
    /// Recoverable port error, link stays up
    Io(IoError),
    /// Handler could not make sense of its payload
    InvalidPayload,
    /// Handler refused the request
    Rejected,
    /// Bridge is already borrowed by the current context
    Busy,
    /// Registration through a shared bridge failed
    Registration(RegistrationError),
}

impl BridgeError {
    /// Returns true if this error means the link is gone for good
    pub fn is_link_fatal(self) -> bool {
        matches!(self, BridgeError::LinkLost | BridgeError::HandshakeFailed)
    }
}

impl From<EncodeError> for BridgeError {
    fn from(e: EncodeError) -> Self {
        BridgeError::EncodeFailed(e)
    }
}

impl From<RegistrationError> for BridgeError {
    fn from(e: RegistrationError) -> Self {
        BridgeError::Registration(e)
    }
}

impl From<postcard::Error> for BridgeError {
    fn from(_: postcard::Error) -> Self {
        BridgeError::InvalidPayload
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::LinkLost => f.write_str("link lost"),
            BridgeError::HandshakeFailed => f.write_str("handshake failed"),
            BridgeError::EncodeFailed(e) => write!(f, "encode failed: {}", e),
            BridgeError::NotReady => f.write_str("link not ready"),
            BridgeError::Io(e) => write!(f, "I/O: {}", e),
            BridgeError::InvalidPayload => f.write_str("invalid payload"),
            BridgeError::Rejected => f.write_str("request rejected"),
            BridgeError::Busy => f.write_str("bridge busy"),
            BridgeError::Registration(e) => write!(f, "registration failed: {}", e),
        }
    }
}
