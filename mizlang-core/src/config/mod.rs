//! Bridge configuration
//!
//! Link parameters are plain data that can be stored as postcard binary
//! (firmware converts a build-time `link.toml` into this form). The
//! handshake operation is code and is supplied at construction.

pub mod link;

pub use link::*;

use crate::handshake::AcceptAll;

/// Everything a bridge needs besides its ports and table
///
/// Moved into the bridge at construction and never mutated afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeConfig<H = AcceptAll> {
    /// Handshake operation run while the link is `Handshaking`
    pub handshake: H,
    /// Link parameters
    pub link: LinkConfig,
}

impl<H> BridgeConfig<H> {
    /// Create a configuration with default link parameters
    pub fn new(handshake: H) -> Self {
        Self {
            handshake,
            link: LinkConfig::DEFAULT,
        }
    }

    /// Replace the link parameters
    pub fn with_link(mut self, link: LinkConfig) -> Self {
        self.link = link;
        self
    }
}
