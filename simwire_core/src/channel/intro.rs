//! Fixed-size introduction records.
//!
//! The first bytes on every rendezvous socket are one of these records,
//! sent whole in a single message and read with a strict length check. A
//! peer speaking a different record size fails the handshake instead of
//! limping along with a partial view of the region.

use bytemuck::{Pod, Zeroable};

use crate::error::{Result, SimWireError};
use crate::memory::layout::QueueGeometry;

/// Wire size of [`DeviceIntro`].
pub const DEVICE_INTRO_LEN: usize = 56;

/// Wire size of [`PeerIntro`].
pub const PEER_INTRO_LEN: usize = 32;

/// Record the device sends to a connecting peer, together with the region
/// descriptor: where that peer's two queues live inside the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DeviceIntro {
    /// Device capability flags, interpreted by the peer's message layer.
    pub flags: u64,
    /// Queue the peer produces into.
    pub to_device: QueueGeometry,
    /// Queue the peer consumes from.
    pub from_device: QueueGeometry,
}

const _: () = assert!(std::mem::size_of::<DeviceIntro>() == DEVICE_INTRO_LEN);

impl DeviceIntro {
    pub fn new(flags: u64, to_device: QueueGeometry, from_device: QueueGeometry) -> Self {
        Self {
            flags,
            to_device,
            from_device,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DEVICE_INTRO_LEN {
            return Err(SimWireError::handshake(format!(
                "device introduction has {} bytes, expected {}",
                bytes.len(),
                DEVICE_INTRO_LEN
            )));
        }
        bytemuck::try_pod_read_unaligned(bytes)
            .map_err(|err| SimWireError::handshake(format!("device introduction: {}", err)))
    }
}

/// Record a peer answers with after adopting the region. The transport
/// carries the flags verbatim; what they mean is between the device model
/// and the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PeerIntro {
    pub flags: u64,
    pub reserved: [u64; 3],
}

const _: () = assert!(std::mem::size_of::<PeerIntro>() == PEER_INTRO_LEN);

impl PeerIntro {
    pub fn new(flags: u64) -> Self {
        Self {
            flags,
            reserved: [0; 3],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PEER_INTRO_LEN {
            return Err(SimWireError::handshake(format!(
                "peer introduction has {} bytes, expected {}",
                bytes.len(),
                PEER_INTRO_LEN
            )));
        }
        bytemuck::try_pod_read_unaligned(bytes)
            .map_err(|err| SimWireError::handshake(format!("peer introduction: {}", err)))
    }
}

impl Default for PeerIntro {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_geometry(offset: u64) -> QueueGeometry {
        QueueGeometry {
            offset,
            slot_size: 4160,
            slot_count: 1024,
        }
    }

    #[test]
    fn test_device_intro_roundtrip() {
        let intro = DeviceIntro::new(0x3, sample_geometry(0), sample_geometry(4160 * 1024));
        let decoded = DeviceIntro::from_bytes(intro.as_bytes()).unwrap();
        assert_eq!(decoded, intro);
    }

    #[test]
    fn test_device_intro_rejects_wrong_length() {
        let intro = DeviceIntro::new(0, sample_geometry(0), sample_geometry(64));
        let bytes = intro.as_bytes();
        assert!(DeviceIntro::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut long = bytes.to_vec();
        long.push(0);
        assert!(DeviceIntro::from_bytes(&long).is_err());
    }

    #[test]
    fn test_peer_intro_roundtrip() {
        let intro = PeerIntro::new(0x51);
        let decoded = PeerIntro::from_bytes(intro.as_bytes()).unwrap();
        assert_eq!(decoded.flags, 0x51);
        assert_eq!(decoded.reserved, [0; 3]);
    }

    #[test]
    fn test_peer_intro_rejects_wrong_length() {
        assert!(PeerIntro::from_bytes(&[0u8; PEER_INTRO_LEN - 1]).is_err());
        assert!(PeerIntro::from_bytes(&[0u8; PEER_INTRO_LEN + 1]).is_err());
    }
}
