//! # Transport channels
//!
//! Everything that moves bytes between the device process and its peers:
//!
//! - **ring**: ownership-bit SPSC queues over the shared region
//! - **intro** / **fdpass**: fixed-size introduction records and the
//!   descriptor-passing framing that carries them
//! - **endpoint**: rendezvous listeners and the establishment state machine
//! - **session**: the device-side session owning layout, region, and one
//!   channel per peer
//! - **peer**: the attach path host and network simulators use

pub mod endpoint;
pub mod fdpass;
pub mod intro;
pub mod peer;
pub mod ring;
pub mod session;

pub use endpoint::{PeerEndpoint, Rendezvous};
pub use intro::{DeviceIntro, PeerIntro};
pub use peer::PeerTransport;
pub use ring::{ConsumerRing, ConsumerSlot, ProducerRing, ProducerSlot};
pub use session::{PeerChannel, SessionConfig, TransportSession};
