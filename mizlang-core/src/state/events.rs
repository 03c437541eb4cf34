//! Events that trigger link state transitions

use mizlang_hal::IoError;

/// Events that can trigger link state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    /// First poll or explicit start
    Start,

    // Handshake events
    /// Handshake operation reported success
    HandshakeSucceeded,
    /// Handshake attempt failed, retries remain
    HandshakeRetry,
    /// Handshake attempt failed, no retries left
    HandshakeExhausted,

    // Port events
    /// Port reported an unrecoverable error
    PortFailed(IoError),
}

impl LinkEvent {
    /// Check if this event comes from the handshake operation
    pub fn is_handshake_event(&self) -> bool {
        matches!(
            self,
            LinkEvent::HandshakeSucceeded
                | LinkEvent::HandshakeRetry
                | LinkEvent::HandshakeExhausted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_event_classification() {
        assert!(LinkEvent::HandshakeRetry.is_handshake_event());
        assert!(LinkEvent::HandshakeExhausted.is_handshake_event());
        assert!(!LinkEvent::Start.is_handshake_event());
        assert!(!LinkEvent::PortFailed(IoError::Timeout).is_handshake_event());
    }
}
