//! The fixed-capacity slot table.
//!
//! Slots hold their payload as `Arc<Record>` behind a per-slot RwLock, so
//! replacing a payload is a pointer swap: readers either see the old record
//! or the new one, never a torn write. Block metadata sits behind per-block
//! mutexes; allocation in one block never contends with another.

use parking_lot::{Mutex, RwLock};
use quarry_core::{BlockSpec, Record, SlotRef, StoreError, StoreResult};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::block::{Block, BlockStats};

/// Fixed-size array of addressable slots partitioned into named blocks.
pub struct SlotTable {
    slots: Vec<RwLock<Option<Arc<Record>>>>,
    blocks: Vec<Mutex<Block>>,
    /// Block name → index into `blocks`.
    by_name: FxHashMap<String, usize>,
    /// `(start, end, block index)` per block, ordered, for owner lookup on free.
    ranges: Vec<(u32, u32, usize)>,
    capacity: u32,
}

/// Occupancy counters for the whole table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStats {
    pub capacity: usize,
    pub occupied: usize,
    pub available: usize,
    pub blocks: Vec<BlockStats>,
}

impl SlotTable {
    /// Build a table from an ordered block layout. Slots are reserved to
    /// blocks left-to-right; capacity is the sum of the block sizes.
    ///
    /// # Panics
    ///
    /// Panics if the layout is empty, a block has size zero, or two blocks
    /// share a name. The layout is construction-time configuration, so a
    /// bad layout is a programming error.
    pub fn new(layout: &[BlockSpec]) -> Self {
        assert!(!layout.is_empty(), "slot table needs at least one block");

        let mut blocks = Vec::with_capacity(layout.len());
        let mut by_name = FxHashMap::default();
        let mut ranges = Vec::with_capacity(layout.len());
        let mut next = 0u32;

        for spec in layout {
            assert!(spec.size > 0, "block '{}' has size zero", spec.name);
            let start = next;
            let end = start + spec.size - 1;
            let idx = blocks.len();
            let prev = by_name.insert(spec.name.clone(), idx);
            assert!(prev.is_none(), "duplicate block name '{}'", spec.name);
            blocks.push(Mutex::new(Block::new(&spec.name, start, end)));
            ranges.push((start, end, idx));
            next = end + 1;
        }

        let capacity = next;
        let slots = (0..capacity).map(|_| RwLock::new(None)).collect();
        tracing::debug!(
            target: "quarry::table",
            capacity,
            blocks = layout.len(),
            "slot table initialized"
        );

        Self {
            slots,
            blocks,
            by_name,
            ranges,
            capacity,
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Allocate a free slot reference from the named block.
    pub fn allocate(&self, block: &str) -> StoreResult<SlotRef> {
        let idx = self
            .by_name
            .get(block)
            .copied()
            .ok_or_else(|| StoreError::UnknownBlock {
                block: block.to_string(),
            })?;
        self.blocks[idx].lock().allocate()
    }

    /// Store a record in the given slot, replacing any previous payload.
    pub fn write(&self, slot: SlotRef, record: Record) {
        let cell = self.slot_cell(slot);
        *cell.write() = Some(Arc::new(record));
    }

    /// Read the record currently held in the slot, if any.
    pub fn read(&self, slot: SlotRef) -> Option<Arc<Record>> {
        self.slot_cell(slot).read().clone()
    }

    /// Clear the slot and return its reference to the owning block's
    /// recycle queue. An allocated-but-unwritten slot is recycled all the
    /// same, so a write path that fails after allocation cannot leak
    /// capacity; the evicted record is returned when the slot held one.
    /// Freeing a slot that is already free is a no-op.
    pub fn free(&self, slot: SlotRef) -> Option<Arc<Record>> {
        let evicted = self.slot_cell(slot).write().take();
        let idx = self.owner_of(slot);
        self.blocks[idx].lock().recycle(slot);
        evicted
    }

    /// Slots currently holding a record, across all blocks.
    pub fn occupied(&self) -> usize {
        self.blocks.iter().map(|b| b.lock().occupied()).sum()
    }

    /// Slots an allocation could still hand out, across all blocks.
    pub fn available(&self) -> usize {
        self.blocks.iter().map(|b| b.lock().available()).sum()
    }

    /// Occupancy snapshot for the table and each block.
    pub fn stats(&self) -> TableStats {
        let blocks: Vec<BlockStats> = self.blocks.iter().map(|b| b.lock().stats()).collect();
        TableStats {
            capacity: self.capacity(),
            occupied: blocks.iter().map(|b| b.occupied).sum(),
            available: blocks.iter().map(|b| b.available).sum(),
            blocks,
        }
    }

    /// Occupancy snapshot for one named block.
    pub fn block_stats(&self, block: &str) -> StoreResult<BlockStats> {
        let idx = self
            .by_name
            .get(block)
            .copied()
            .ok_or_else(|| StoreError::UnknownBlock {
                block: block.to_string(),
            })?;
        Ok(self.blocks[idx].lock().stats())
    }

    fn slot_cell(&self, slot: SlotRef) -> &RwLock<Option<Arc<Record>>> {
        match self.slots.get(slot.index()) {
            Some(cell) => cell,
            None => panic!(
                "slot reference {} out of range (table capacity {})",
                slot, self.capacity
            ),
        }
    }

    /// Index of the block owning the given slot.
    fn owner_of(&self, slot: SlotRef) -> usize {
        // Blocks are few and ordered; a linear scan is fine.
        for &(start, end, idx) in &self.ranges {
            if (start..=end).contains(&slot.0) {
                return idx;
            }
        }
        panic!(
            "slot reference {} out of range (table capacity {})",
            slot, self.capacity
        );
    }
}

impl std::fmt::Debug for SlotTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotTable")
            .field("capacity", &self.capacity)
            .field("occupied", &self.occupied())
            .field("blocks", &self.blocks.len())
            .finish()
    }
}
