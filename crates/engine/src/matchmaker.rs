//! The relationship matchmaker.
//!
//! Records may declare relationships to other records by id. The
//! matchmaker resolves those declarations into concrete link/reference
//! edges in the graph. A declaration naming an id that is not present yet
//! is parked in a waiting table and resolved when that id is inserted
//! (deferred linking). Every insert checks the waiting table, whether or
//! not the new record declares relationships of its own.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use quarry_core::{Record, SlotRef};
use quarry_storage::RelationGraph;
use rustc_hash::FxHashMap;

use crate::index::RecordIndex;

/// Resolves declared record relationships into graph edges.
#[derive(Debug, Default)]
pub struct Matchmaker {
    /// Waiting table: unresolved target id → slots that declared it.
    waiting: Mutex<FxHashMap<String, Vec<SlotRef>>>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a newly-inserted record.
    ///
    /// Declared ids that are present get linked now, slot → target; absent
    /// ones are parked. Then any slot waiting on this record's id is
    /// linked, waiter → slot.
    pub fn on_insert(
        &self,
        slot: SlotRef,
        record: &Record,
        index: &dyn RecordIndex,
        graph: &RelationGraph,
    ) {
        for target_id in record.related_ids() {
            self.resolve_or_wait(slot, target_id, index, graph);
        }

        let waiters = self.waiting.lock().remove(&record.id);
        if let Some(waiters) = waiters {
            tracing::debug!(
                target: "quarry::matchmaker",
                id = %record.id,
                waiters = waiters.len(),
                "resolving deferred relationships"
            );
            for waiter in waiters {
                graph.link(waiter, slot);
            }
        }
    }

    /// Re-resolve after an update: unlink relationships the new record no
    /// longer declares, resolve newly-declared ones. Dropping the
    /// `related` list entirely turns the record back into a plain one.
    pub fn on_update(
        &self,
        slot: SlotRef,
        old: &Record,
        new: &Record,
        index: &dyn RecordIndex,
        graph: &RelationGraph,
    ) {
        let old_ids: BTreeSet<&str> = old.related_ids().iter().map(String::as_str).collect();
        let new_ids: BTreeSet<&str> = new.related_ids().iter().map(String::as_str).collect();

        for removed in old_ids.difference(&new_ids) {
            match index.slot_for_id(removed) {
                Some(target) => graph.delink(slot, target),
                None => self.forget(slot, removed),
            }
        }
        for added in new_ids.difference(&old_ids) {
            self.resolve_or_wait(slot, added, index, graph);
        }
    }

    /// Tear down a deleted record: every edge touching the slot goes, in
    /// both directions, and its parked declarations are dropped.
    pub fn on_delete(&self, slot: SlotRef, graph: &RelationGraph) {
        graph.detach(slot);
        self.waiting.lock().retain(|_, slots| {
            slots.retain(|s| *s != slot);
            !slots.is_empty()
        });
    }

    /// Number of unresolved relationship declarations.
    pub fn pending(&self) -> usize {
        self.waiting.lock().values().map(Vec::len).sum()
    }

    /// Drop every parked declaration.
    pub fn reset(&self) {
        self.waiting.lock().clear();
    }

    fn resolve_or_wait(
        &self,
        slot: SlotRef,
        target_id: &str,
        index: &dyn RecordIndex,
        graph: &RelationGraph,
    ) {
        match index.slot_for_id(target_id) {
            Some(target) => graph.link(slot, target),
            None => {
                let mut waiting = self.waiting.lock();
                let slots = waiting.entry(target_id.to_string()).or_default();
                if !slots.contains(&slot) {
                    slots.push(slot);
                }
            }
        }
    }

    /// Remove one parked declaration from the waiting table.
    fn forget(&self, slot: SlotRef, target_id: &str) {
        let mut waiting = self.waiting.lock();
        if let Some(slots) = waiting.get_mut(target_id) {
            slots.retain(|s| *s != slot);
            if slots.is_empty() {
                waiting.remove(target_id);
            }
        }
    }
}
