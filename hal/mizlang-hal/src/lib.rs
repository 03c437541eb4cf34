//! MizLang Hardware Abstraction Layer
//!
//! This crate defines the byte stream ports the instruction bridge runs on.
//! A port knows nothing about framing: it moves raw bytes over whatever
//! transport the board provides (UART, USB-CDC, a test buffer).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  mizlang-core (bridge state machine)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  mizlang-hal (this crate - ports)       │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │  embedded-io  │       │  MemoryPort   │
//! │  peripherals  │       │  (host/tests) │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`port::InputPort`] - Non-blocking receive side
//! - [`port::OutputPort`] - Bounded-time transmit side
//!
//! # Adapters
//!
//! - [`io::IoPort`] - Wraps any `embedded-io` reader/writer
//! - [`memory::MemoryPort`] - Fixed-capacity in-memory byte pipe

#![no_std]
#![deny(unsafe_code)]

pub mod io;
pub mod memory;
pub mod port;

// Re-export key traits at crate root for convenience
pub use io::IoPort;
pub use memory::{LinkEnd, MemoryLink, MemoryPort};
pub use port::{write_all, InputPort, IoError, OutputPort};
