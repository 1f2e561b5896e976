//! # SimWire
//!
//! SimWire connects hardware-model simulators to host and network
//! simulators over shared memory, with a focus on zero-copy message
//! exchange and deterministic setup.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use simwire::prelude::*;
//!
//! fn run_device() -> Result<()> {
//!     let mut config = SessionConfig::default();
//!     config.host_socket = Some("/tmp/nic0-pci.sock".into());
//!
//!     let mut session = TransportSession::establish(config)?;
//!     if let Some(host) = session.host() {
//!         if let Some(mut slot) = host.tx.try_produce() {
//!             slot.payload_mut()[0] = 1;
//!             slot.commit(0x01);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Zero-copy queues** with per-slot ownership handoff
//! - **Descriptor-passing rendezvous** so peers never open the region by
//!   name
//! - **Single-peer or dual-peer sessions** from one configuration struct
//! - **Validated queue geometry** before a single byte is written

// Re-export core components
pub use simwire_core::{self, *};

/// The SimWire prelude - everything you need to get started
pub mod prelude {
    // Session types
    pub use simwire_core::channel::{PeerChannel, PeerTransport, SessionConfig, TransportSession};

    // Queue types
    pub use simwire_core::channel::{ConsumerRing, ConsumerSlot, ProducerRing, ProducerSlot};

    // Introduction records
    pub use simwire_core::channel::{DeviceIntro, PeerIntro};

    // Geometry
    pub use simwire_core::memory::{QueueGeometry, RegionLayout, RingDims};

    // Error types
    pub use simwire_core::error::{Result, SimWireError, SimWireResult};

    // Common std types
    pub use std::path::PathBuf;
    pub use std::sync::Arc;

    // Common traits
    pub use serde::{Deserialize, Serialize};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get SimWire version
pub fn version() -> &'static str {
    VERSION
}
