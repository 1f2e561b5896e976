//! Queue placement inside the shared region.
//!
//! The device process computes one [`RegionLayout`] per session, before any
//! byte of the region is written. Offsets are cumulative in a fixed order
//! (host-to-device, device-to-host, network-to-device, device-to-network),
//! so the queues can never overlap. Peers never assume that order; every
//! offset they use arrives in the introduction record.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimWireError};

/// Default region size, sized for the four default queues with headroom.
pub const DEFAULT_REGION_SIZE: u64 = 32 * 1024 * 1024;

/// Default slot size on the host-facing queues.
pub const DEFAULT_HOST_SLOT_SIZE: u64 = 4096 + 64;

/// Default slot size on the network-facing queues.
pub const DEFAULT_NET_SLOT_SIZE: u64 = 2048 + 64;

/// Default number of slots per queue.
pub const DEFAULT_SLOT_COUNT: u64 = 1024;

/// Slot size and slot count for one queue direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingDims {
    pub slot_size: u64,
    pub slot_count: u64,
}

impl RingDims {
    pub const fn new(slot_size: u64, slot_count: u64) -> Self {
        Self {
            slot_size,
            slot_count,
        }
    }

    /// Dimensions deployed host peers expect.
    pub const fn host() -> Self {
        Self::new(DEFAULT_HOST_SLOT_SIZE, DEFAULT_SLOT_COUNT)
    }

    /// Dimensions deployed network peers expect.
    pub const fn network() -> Self {
        Self::new(DEFAULT_NET_SLOT_SIZE, DEFAULT_SLOT_COUNT)
    }
}

/// Placement of one queue inside the region.
///
/// This struct travels verbatim inside [`DeviceIntro`], so it is `repr(C)`
/// with fixed-width fields.
///
/// [`DeviceIntro`]: crate::channel::intro::DeviceIntro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct QueueGeometry {
    pub offset: u64,
    pub slot_size: u64,
    pub slot_count: u64,
}

impl QueueGeometry {
    fn from_dims(offset: u64, dims: RingDims) -> Self {
        Self {
            offset,
            slot_size: dims.slot_size,
            slot_count: dims.slot_count,
        }
    }

    /// Offset one past the last byte of this queue.
    pub fn end_offset(&self) -> Result<u64> {
        let span = self
            .slot_size
            .checked_mul(self.slot_count)
            .ok_or_else(|| SimWireError::geometry("queue span overflows u64"))?;
        self.offset
            .checked_add(span)
            .ok_or_else(|| SimWireError::geometry("queue end overflows u64"))
    }

    /// Reject geometry that cannot describe a usable queue inside a region
    /// of `region_size` bytes. Also applied to geometry received over the
    /// wire before a peer touches the mapping.
    pub fn validate(&self, region_size: u64) -> Result<()> {
        if self.slot_size == 0 {
            return Err(SimWireError::geometry("slot size must be nonzero"));
        }
        if self.slot_count == 0 {
            return Err(SimWireError::geometry("slot count must be nonzero"));
        }
        let end = self.end_offset()?;
        if end > region_size {
            return Err(SimWireError::geometry(format!(
                "queue [{}..{}) exceeds region of {} bytes",
                self.offset, end, region_size
            )));
        }
        Ok(())
    }
}

/// Where each of the four queues lives inside the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    pub host_to_device: QueueGeometry,
    pub device_to_host: QueueGeometry,
    pub net_to_device: QueueGeometry,
    pub device_to_net: QueueGeometry,
}

impl RegionLayout {
    /// Compute and validate the cumulative layout for a region of
    /// `region_size` bytes, with both directions of a peer pair sharing
    /// one set of dimensions.
    pub fn compute(region_size: u64, host: RingDims, net: RingDims) -> Result<Self> {
        Self::compute_each(region_size, [host, host, net, net])
    }

    /// Like [`compute`], but with independent dimensions per queue, in
    /// layout order. Every failure mode (zero dims, arithmetic overflow,
    /// region too small) surfaces here, before any write.
    ///
    /// [`compute`]: RegionLayout::compute
    pub fn compute_each(region_size: u64, dims: [RingDims; 4]) -> Result<Self> {
        let [h2d, d2h, n2d, d2n] = dims;
        let host_to_device = QueueGeometry::from_dims(0, h2d);
        let device_to_host = QueueGeometry::from_dims(host_to_device.end_offset()?, d2h);
        let net_to_device = QueueGeometry::from_dims(device_to_host.end_offset()?, n2d);
        let device_to_net = QueueGeometry::from_dims(net_to_device.end_offset()?, d2n);

        let layout = Self {
            host_to_device,
            device_to_host,
            net_to_device,
            device_to_net,
        };
        for (name, geometry) in layout.queues() {
            geometry
                .validate(region_size)
                .map_err(|err| SimWireError::geometry(format!("{}: {}", name, err)))?;
        }
        Ok(layout)
    }

    /// The four queues with their conventional names, in layout order.
    pub fn queues(&self) -> [(&'static str, QueueGeometry); 4] {
        [
            ("host-to-device", self.host_to_device),
            ("device-to-host", self.device_to_host),
            ("network-to-device", self.net_to_device),
            ("device-to-network", self.device_to_net),
        ]
    }

    /// Bytes of the region the queues occupy.
    pub fn end(&self) -> Result<u64> {
        self.device_to_net.end_offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_fits_default_region() {
        let layout =
            RegionLayout::compute(DEFAULT_REGION_SIZE, RingDims::host(), RingDims::network())
                .unwrap();
        assert_eq!(layout.host_to_device.offset, 0);
        assert_eq!(
            layout.device_to_host.offset,
            DEFAULT_HOST_SLOT_SIZE * DEFAULT_SLOT_COUNT
        );
        assert_eq!(
            layout.net_to_device.offset,
            2 * DEFAULT_HOST_SLOT_SIZE * DEFAULT_SLOT_COUNT
        );
        assert_eq!(
            layout.device_to_net.offset,
            (2 * DEFAULT_HOST_SLOT_SIZE + DEFAULT_NET_SLOT_SIZE) * DEFAULT_SLOT_COUNT
        );
        assert!(layout.end().unwrap() <= DEFAULT_REGION_SIZE);
    }

    #[test]
    fn test_layout_offsets_strictly_increase() {
        let layout =
            RegionLayout::compute(1 << 20, RingDims::new(128, 16), RingDims::new(64, 32)).unwrap();
        let queues = layout.queues();
        for pair in queues.windows(2) {
            assert!(pair[0].1.offset < pair[1].1.offset);
            assert_eq!(pair[0].1.end_offset().unwrap(), pair[1].1.offset);
        }
    }

    #[test]
    fn test_layout_with_independent_queue_dims() {
        let dims = [
            RingDims::new(128, 4),
            RingDims::new(256, 2),
            RingDims::new(64, 8),
            RingDims::new(512, 1),
        ];
        let layout = RegionLayout::compute_each(1 << 20, dims).unwrap();
        assert_eq!(layout.host_to_device.offset, 0);
        assert_eq!(layout.device_to_host.offset, 128 * 4);
        assert_eq!(layout.net_to_device.offset, 128 * 4 + 256 * 2);
        assert_eq!(layout.device_to_net.offset, 128 * 4 + 256 * 2 + 64 * 8);
        for (queue, wanted) in layout.queues().iter().zip(dims) {
            assert_eq!(queue.1.slot_size, wanted.slot_size);
            assert_eq!(queue.1.slot_count, wanted.slot_count);
        }
        assert_eq!(layout.end().unwrap(), 128 * 4 + 256 * 2 + 64 * 8 + 512);
    }

    #[test]
    fn test_layout_rejects_region_too_small() {
        let err = RegionLayout::compute(1 << 20, RingDims::host(), RingDims::network())
            .expect_err("four default queues cannot fit in 1 MiB");
        assert!(matches!(err, SimWireError::Geometry(_)));
    }

    #[test]
    fn test_layout_rejects_zero_dims() {
        assert!(RegionLayout::compute(1 << 20, RingDims::new(0, 16), RingDims::new(64, 32)).is_err());
        assert!(RegionLayout::compute(1 << 20, RingDims::new(128, 0), RingDims::new(64, 32)).is_err());
    }

    #[test]
    fn test_geometry_rejects_overflow() {
        let geometry = QueueGeometry {
            offset: 0,
            slot_size: u64::MAX,
            slot_count: 2,
        };
        assert!(geometry.end_offset().is_err());
        assert!(geometry.validate(u64::MAX).is_err());
    }

    #[test]
    fn test_geometry_validates_region_bound() {
        let geometry = QueueGeometry {
            offset: 4096,
            slot_size: 64,
            slot_count: 8,
        };
        assert!(geometry.validate(4096 + 64 * 8).is_ok());
        assert!(geometry.validate(4096 + 64 * 8 - 1).is_err());
    }
}
