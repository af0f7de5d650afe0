//! The record index: id ↔ slot and sequence ↔ slot lookups.
//!
//! The index is owned by the embedding layer and consumed by this core
//! through the narrow `RecordIndex` trait. `MemoryIndex` is the stock
//! implementation used by the recovery manager and the tests.

use dashmap::DashMap;
use quarry_core::SlotRef;

/// Narrow interface over the externally-maintained record index.
pub trait RecordIndex: Send + Sync {
    /// Slot currently holding the record with this id.
    fn slot_for_id(&self, id: &str) -> Option<SlotRef>;

    /// Slot that the decision with this sequence number touched.
    fn slot_for_sequence(&self, sequence: u64) -> Option<SlotRef>;

    /// Bind a record id to its slot.
    fn bind(&self, id: &str, slot: SlotRef);

    /// Bind a decision sequence to the slot it touched.
    fn bind_sequence(&self, sequence: u64, slot: SlotRef);

    /// Drop the id binding for a deleted record.
    fn unbind(&self, id: &str);

    /// Every live `(id, slot)` pair.
    fn live(&self) -> Vec<(String, SlotRef)>;

    /// Drop every binding.
    fn clear(&self);
}

/// Sharded in-memory index.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    by_id: DashMap<String, SlotRef>,
    by_sequence: DashMap<u64, SlotRef>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live id bindings.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl RecordIndex for MemoryIndex {
    fn slot_for_id(&self, id: &str) -> Option<SlotRef> {
        self.by_id.get(id).map(|entry| *entry.value())
    }

    fn slot_for_sequence(&self, sequence: u64) -> Option<SlotRef> {
        self.by_sequence.get(&sequence).map(|entry| *entry.value())
    }

    fn bind(&self, id: &str, slot: SlotRef) {
        self.by_id.insert(id.to_string(), slot);
    }

    fn bind_sequence(&self, sequence: u64, slot: SlotRef) {
        self.by_sequence.insert(sequence, slot);
    }

    fn unbind(&self, id: &str) {
        self.by_id.remove(id);
    }

    fn live(&self) -> Vec<(String, SlotRef)> {
        self.by_id
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    fn clear(&self) {
        self.by_id.clear();
        self.by_sequence.clear();
    }
}
