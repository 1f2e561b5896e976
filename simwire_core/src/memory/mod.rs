//! # Shared memory for the SimWire transport
//!
//! This module provides the memory substrate the queues live in:
//!
//! - **ShmRegion**: one memory-mapped region per session, created by the
//!   device process and adopted by peers through descriptor passing
//! - **RegionLayout**: validated placement of the four queues inside that
//!   region
//!
//! All cross-process synchronization happens in the queue slots themselves;
//! the region is raw bytes with no header of its own.

pub mod layout;
pub mod platform;
pub mod shm_region;

pub use layout::{QueueGeometry, RegionLayout, RingDims};
pub use platform::*;
pub use shm_region::ShmRegion;
