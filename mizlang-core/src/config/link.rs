//! Link parameters
//!
//! Serialized with postcard behind a small header for validation.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Magic number identifying stored link parameters
pub const LINK_CONFIG_MAGIC: u32 = 0x4D5A_4C4B; // "MZLK"

/// Current stored format version
pub const LINK_CONFIG_VERSION: u8 = 1;

/// Largest encoded size of [`LinkConfig`] including its header
pub const MAX_LINK_CONFIG_SIZE: usize = 16;

/// Link parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkConfig {
    /// Handshake retries after the first failed attempt (0 = fault at once)
    pub handshake_retries: u8,
    /// Consecutive zero-byte writes tolerated before a send times out
    pub write_stall_limit: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl LinkConfig {
    /// No handshake retries, eight write stalls
    pub const DEFAULT: Self = Self {
        handshake_retries: 0,
        write_stall_limit: 8,
    };

    /// Set the handshake retry count
    pub const fn with_handshake_retries(mut self, retries: u8) -> Self {
        self.handshake_retries = retries;
        self
    }

    /// Set the write stall limit
    pub const fn with_write_stall_limit(mut self, limit: u8) -> Self {
        self.write_stall_limit = limit;
        self
    }

    /// Total handshake attempts before the link faults
    pub const fn handshake_attempts(&self) -> u16 {
        self.handshake_retries as u16 + 1
    }
}

/// Errors loading or storing link parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Bytes are not valid postcard for this type
    Deserialize,
    /// Output buffer too small
    Serialize,
    /// Magic number or version does not match
    InvalidFormat,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Deserialize => f.write_str("config deserialization failed"),
            ConfigError::Serialize => f.write_str("config serialization failed"),
            ConfigError::InvalidFormat => f.write_str("config magic or version mismatch"),
        }
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct StoredLinkConfig {
    magic: u32,
    version: u8,
    link: LinkConfig,
}

#[cfg(feature = "serde")]
impl LinkConfig {
    /// Load parameters stored by [`LinkConfig::to_slice`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let stored: StoredLinkConfig =
            postcard::from_bytes(bytes).map_err(|_| ConfigError::Deserialize)?;

        if stored.magic != LINK_CONFIG_MAGIC || stored.version != LINK_CONFIG_VERSION {
            return Err(ConfigError::InvalidFormat);
        }

        Ok(stored.link)
    }

    /// Store parameters into `buf`, returning the used prefix
    pub fn to_slice<'a>(&self, buf: &'a mut [u8]) -> Result<&'a mut [u8], ConfigError> {
        let stored = StoredLinkConfig {
            magic: LINK_CONFIG_MAGIC,
            version: LINK_CONFIG_VERSION,
            link: *self,
        };
        postcard::to_slice(&stored, buf).map_err(|_| ConfigError::Serialize)
    }
}
