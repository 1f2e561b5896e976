//! Ownership-bit ring queues.
//!
//! A queue is a fixed array of fixed-size slots inside the shared region.
//! There are no shared head or tail counters: each slot carries a control
//! byte, and flipping the ownership bit in that byte is the only
//! cross-process synchronization. Producer and consumer each keep a private
//! cursor that moves forward one slot at a time, modulo the slot count, so
//! a slot is always revisited in the same order it was first used.
//!
//! The produce side allocates a slot, fills the payload in place, then
//! commits; the commit is a release store of the control byte, which both
//! publishes the payload and hands the slot to the consumer. The consume
//! side reads in place, releases the slot back (keeping the discriminant
//! bits), and advances separately, so a message can be re-inspected across
//! several polls before the cursor moves.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{Result, SimWireError};
use crate::memory::layout::QueueGeometry;
use crate::memory::ShmRegion;

/// Reserved bytes at the start of every slot. Byte 0 is the control byte;
/// the rest keeps payloads 8-byte aligned.
pub const SLOT_HEADER_LEN: usize = 8;

/// Ownership bit of the control byte. Clear (the zeroed initial state)
/// means the slot belongs to the producer; set means a message is ready
/// for the consumer.
pub const OWNERSHIP_BIT: u8 = 0x80;

/// Low bits of the control byte carry the message-kind discriminant.
pub const KIND_MASK: u8 = 0x7f;

/// State shared by both ring halves: resolved slot addresses plus the
/// private cursor of this side.
struct RawRing {
    #[allow(dead_code)]
    region: Arc<ShmRegion>,
    base: NonNull<u8>,
    slot_size: usize,
    slot_count: usize,
    cursor: usize,
}

impl RawRing {
    fn new(region: Arc<ShmRegion>, geometry: QueueGeometry) -> Result<Self> {
        geometry.validate(region.len() as u64)?;

        let offset = usize::try_from(geometry.offset)
            .map_err(|_| SimWireError::geometry("queue offset exceeds the address space"))?;
        let slot_size = usize::try_from(geometry.slot_size)
            .map_err(|_| SimWireError::geometry("slot size exceeds the address space"))?;
        let slot_count = usize::try_from(geometry.slot_count)
            .map_err(|_| SimWireError::geometry("slot count exceeds the address space"))?;
        if slot_size <= SLOT_HEADER_LEN {
            return Err(SimWireError::geometry(format!(
                "slot size {} leaves no payload room ({} header bytes)",
                slot_size, SLOT_HEADER_LEN
            )));
        }

        // validate() bounds-checked the queue against the mapped length, so
        // base + offset stays inside the mapping and is never null.
        let base = unsafe { NonNull::new_unchecked(region.base().as_ptr().add(offset)) };
        Ok(Self {
            region,
            base,
            slot_size,
            slot_count,
            cursor: 0,
        })
    }

    /// Control byte of `slot`, viewed atomically. Both processes go through
    /// this view; nothing else touches byte 0 of a slot.
    #[inline]
    fn ctrl(&self, slot: usize) -> &AtomicU8 {
        debug_assert!(slot < self.slot_count);
        unsafe { &*(self.base.as_ptr().add(slot * self.slot_size) as *const AtomicU8) }
    }

    #[inline]
    fn payload_ptr(&self, slot: usize) -> *mut u8 {
        unsafe { self.base.as_ptr().add(slot * self.slot_size + SLOT_HEADER_LEN) }
    }

    #[inline]
    fn payload_len(&self) -> usize {
        self.slot_size - SLOT_HEADER_LEN
    }

    #[inline]
    fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.slot_count;
    }
}

/// Sending half of a queue. Exactly one process holds this half for any
/// given queue.
pub struct ProducerRing {
    ring: RawRing,
}

impl ProducerRing {
    pub fn new(region: Arc<ShmRegion>, geometry: QueueGeometry) -> Result<Self> {
        Ok(Self {
            ring: RawRing::new(region, geometry)?,
        })
    }

    /// Borrow the slot under the cursor for writing.
    ///
    /// Returns `None` while the consumer still owns that slot, meaning the
    /// queue is full and the caller must retry later. The cursor does not
    /// move until the returned slot is committed, so an abandoned slot
    /// costs nothing.
    #[inline]
    pub fn try_produce(&mut self) -> Option<ProducerSlot<'_>> {
        let ctrl = self.ring.ctrl(self.ring.cursor).load(Ordering::Acquire);
        if ctrl & OWNERSHIP_BIT != 0 {
            return None;
        }
        Some(ProducerSlot {
            ring: &mut self.ring,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.ring.slot_count
    }

    /// Usable payload bytes per slot.
    pub fn payload_len(&self) -> usize {
        self.ring.payload_len()
    }
}

/// In-place write handle for one producer slot. Dropping it without
/// [`commit`](ProducerSlot::commit) leaves the queue untouched.
pub struct ProducerSlot<'a> {
    ring: &'a mut RawRing,
}

impl ProducerSlot<'_> {
    pub fn payload_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(
                self.ring.payload_ptr(self.ring.cursor),
                self.ring.payload_len(),
            )
        }
    }

    /// Publish the slot with the given message kind and move to the next
    /// slot. The release store on the control byte is what makes the
    /// payload visible to the consumer; the slot must not be touched again
    /// until the consumer hands it back.
    ///
    /// Panics if `kind` does not fit the discriminant bits, or if the
    /// slot's ownership bit changed since allocation (a protocol breach by
    /// the other process).
    pub fn commit(self, kind: u8) {
        assert!(
            kind & !KIND_MASK == 0,
            "message kind {:#04x} exceeds the discriminant range",
            kind
        );
        let slot = self.ring.cursor;
        let ctrl = self.ring.ctrl(slot);
        let prev = ctrl.load(Ordering::Relaxed);
        assert!(
            prev & OWNERSHIP_BIT == 0,
            "slot {} flipped to consumer-owned during produce",
            slot
        );
        ctrl.store(kind | OWNERSHIP_BIT, Ordering::Release);
        self.ring.advance();
    }
}

/// Receiving half of a queue.
pub struct ConsumerRing {
    ring: RawRing,
}

impl ConsumerRing {
    pub fn new(region: Arc<ShmRegion>, geometry: QueueGeometry) -> Result<Self> {
        Ok(Self {
            ring: RawRing::new(region, geometry)?,
        })
    }

    /// Borrow the message under the cursor, if one is ready.
    ///
    /// Returns `None` while the slot is producer-owned, meaning the queue
    /// is empty from this side. The same message is returned on every call
    /// until it is released and the cursor advanced, so a caller can poll,
    /// look, and come back without losing its place.
    #[inline]
    pub fn try_consume(&mut self) -> Option<ConsumerSlot<'_>> {
        let ctrl = self.ring.ctrl(self.ring.cursor).load(Ordering::Acquire);
        if ctrl & OWNERSHIP_BIT == 0 {
            return None;
        }
        Some(ConsumerSlot {
            ring: &mut self.ring,
        })
    }

    /// Move to the next slot. Call once per message, after the slot has
    /// been handed back with [`ConsumerSlot::release`]; a slot that is
    /// advanced past without release will surface again as a stale message
    /// a full lap later.
    #[inline]
    pub fn advance(&mut self) {
        self.ring.advance();
    }

    pub fn slot_count(&self) -> usize {
        self.ring.slot_count
    }

    /// Usable payload bytes per slot.
    pub fn payload_len(&self) -> usize {
        self.ring.payload_len()
    }
}

/// Borrowed view of one ready message.
pub struct ConsumerSlot<'a> {
    ring: &'a mut RawRing,
}

impl ConsumerSlot<'_> {
    /// Message-kind discriminant bits of this message.
    pub fn kind(&self) -> u8 {
        self.ring.ctrl(self.ring.cursor).load(Ordering::Relaxed) & KIND_MASK
    }

    pub fn payload(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.ring.payload_ptr(self.ring.cursor),
                self.ring.payload_len(),
            )
        }
    }

    /// Hand the slot back to the producer, keeping the discriminant bits.
    /// Does not advance the cursor.
    ///
    /// Panics if the slot is no longer consumer-owned (a protocol breach
    /// by the other process).
    pub fn release(self) {
        let slot = self.ring.cursor;
        let ctrl = self.ring.ctrl(slot);
        let prev = ctrl.load(Ordering::Relaxed);
        assert!(
            prev & OWNERSHIP_BIT != 0,
            "slot {} no longer consumer-owned at release",
            slot
        );
        ctrl.store(prev & KIND_MASK, Ordering::Release);
    }
}

// A ring half is single-owner on its side of the protocol; moving it to
// another thread is fine, sharing it is not. Payload visibility across
// threads and processes is carried by the control-byte release/acquire
// pair.
unsafe impl Send for ProducerRing {}
unsafe impl Send for ConsumerRing {}
