//! One named allocator block: a contiguous sub-range of the slot table
//! with its own cursor and recycle queue.
//!
//! Accounting invariant, checked by the tests:
//! `occupied + available == capacity`, and the recycle queue is always a
//! subset of the available slots.

use std::collections::VecDeque;

use quarry_core::{SlotRef, StoreError, StoreResult};
use serde::Serialize;

/// A contiguous, non-overlapping sub-range `[start, end]` of the slot
/// table. Slots are assigned to blocks once, at table construction, and
/// never reassigned.
#[derive(Debug)]
pub struct Block {
    name: String,
    start: u32,
    end: u32,
    /// Next never-allocated slot; `end + 1` once the block is exhausted.
    cursor: u32,
    /// Freed references, reused FIFO before the cursor advances.
    recycled: VecDeque<SlotRef>,
    /// Slots currently holding a record.
    occupied: usize,
}

/// Occupancy counters for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockStats {
    pub name: String,
    pub capacity: usize,
    pub occupied: usize,
    pub available: usize,
    pub recycled: usize,
}

impl Block {
    /// Create a block covering `[start, end]` inclusive.
    pub fn new(name: impl Into<String>, start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "block range must be non-empty");
        Self {
            name: name.into(),
            start,
            end,
            cursor: start,
            recycled: VecDeque::new(),
            occupied: 0,
        }
    }

    /// Block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First slot reference of this block.
    pub fn start(&self) -> SlotRef {
        SlotRef(self.start)
    }

    /// Last slot reference of this block.
    pub fn end(&self) -> SlotRef {
        SlotRef(self.end)
    }

    /// Whether the given reference falls inside this block's range.
    pub fn contains(&self, slot: SlotRef) -> bool {
        (self.start..=self.end).contains(&slot.0)
    }

    /// Hand out a free slot reference.
    ///
    /// Recycled references are reused first, in FIFO order; only when the
    /// recycle queue is empty does the cursor advance. Fails with
    /// `BlockFull` once the cursor has passed `end` and nothing has been
    /// recycled.
    pub fn allocate(&mut self) -> StoreResult<SlotRef> {
        if let Some(slot) = self.recycled.pop_front() {
            self.occupied += 1;
            return Ok(slot);
        }
        if self.cursor > self.end {
            return Err(StoreError::BlockFull {
                block: self.name.clone(),
            });
        }
        let slot = SlotRef(self.cursor);
        self.cursor += 1;
        self.occupied += 1;
        Ok(slot)
    }

    /// Return a freed reference to the recycle queue.
    ///
    /// Accepts any reference this block handed out, whether or not a
    /// record was ever written into the slot. A reference outside the
    /// block's range, one the cursor never reached, or one already
    /// sitting in the recycle queue is refused. Returns whether the
    /// reference was recycled.
    pub fn recycle(&mut self, slot: SlotRef) -> bool {
        if !self.contains(slot) || slot.0 >= self.cursor || self.recycled.contains(&slot) {
            return false;
        }
        self.occupied -= 1;
        self.recycled.push_back(slot);
        true
    }

    /// Total number of slots in this block.
    pub fn capacity(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// Slots currently holding a record.
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Slots that an `allocate` could hand out, now or later.
    pub fn available(&self) -> usize {
        self.capacity() - self.occupied
    }

    /// Previously-freed slots waiting in the recycle queue.
    pub fn recycled_len(&self) -> usize {
        self.recycled.len()
    }

    /// Snapshot of this block's occupancy counters.
    pub fn stats(&self) -> BlockStats {
        BlockStats {
            name: self.name.clone(),
            capacity: self.capacity(),
            occupied: self.occupied(),
            available: self.available(),
            recycled: self.recycled_len(),
        }
    }
}
