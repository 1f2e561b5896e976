//! # SimWire Core
//!
//! The core transport for device/host/network co-simulation.
//!
//! A device simulator (say, a NIC model) needs to exchange messages with a
//! host simulator on one side and a network simulator on the other, at
//! memory speed. SimWire gives each pair of processes a shared memory
//! region carved into single-producer single-consumer ring queues, plus a
//! Unix-socket rendezvous that hands the region to peers by descriptor.
//! This crate provides the fundamental building blocks:
//!
//! - **Memory**: the shared region and the validated placement of the four
//!   queues inside it
//! - **Channels**: ownership-bit ring queues with zero-copy slot access
//! - **Rendezvous**: connection endpoints, introduction records, and the
//!   session types that drive establishment end to end
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use simwire_core::{Result, SessionConfig, TransportSession};
//!
//! fn main() -> Result<()> {
//!     let mut config = SessionConfig::default();
//!     config.host_socket = Some("/tmp/nic0-pci.sock".into());
//!     config.network_socket = Some("/tmp/nic0-eth.sock".into());
//!
//!     let mut session = TransportSession::establish(config)?;
//!     let host = session.host().unwrap();
//!     while let Some(message) = host.rx.try_consume() {
//!         // React to the message, then hand the slot back.
//!         let _kind = message.kind();
//!         message.release();
//!         host.rx.advance();
//!     }
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod memory;

// Re-export commonly used types for easy access
pub use channel::{
    ConsumerRing, DeviceIntro, PeerChannel, PeerIntro, PeerTransport, ProducerRing, SessionConfig,
    TransportSession,
};
pub use error::{Result, SimWireError, SimWireResult};
pub use memory::{QueueGeometry, RegionLayout, RingDims, ShmRegion};
