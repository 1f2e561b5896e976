//! Shared helpers for the SimWire benchmark suite.

use std::sync::Arc;

use simwire::{ConsumerRing, ProducerRing, QueueGeometry, ShmRegion};
use tempfile::TempDir;

/// A producer/consumer pair over one freshly created queue. The backing
/// region lives in a temporary directory owned by the pair.
pub struct BenchRings {
    pub tx: ProducerRing,
    pub rx: ConsumerRing,
    _dir: TempDir,
}

/// Create a single queue of `slot_count` slots of `slot_size` bytes and
/// open both ends of it.
pub fn queue_pair(slot_size: u64, slot_count: u64) -> BenchRings {
    let dir = tempfile::tempdir().expect("create bench tempdir");
    let geometry = QueueGeometry {
        offset: 0,
        slot_size,
        slot_count,
    };
    let bytes = geometry.end_offset().expect("bench geometry overflow") as usize;
    let region = Arc::new(
        ShmRegion::create(&dir.path().join("region"), bytes).expect("create bench region"),
    );
    BenchRings {
        tx: ProducerRing::new(region.clone(), geometry).expect("open producer end"),
        rx: ConsumerRing::new(region, geometry).expect("open consumer end"),
        _dir: dir,
    }
}

/// Deterministic payload bytes.
pub fn fill_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i & 0xff) as u8).collect()
}
