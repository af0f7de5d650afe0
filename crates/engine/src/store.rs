//! `StoreCore`: the single-writer apply path.
//!
//! Exactly one thread applies decisions to the slot table at a time, which
//! is what makes replay deterministic and rules out write-write races on
//! slot contents. Reads bypass the writer lock entirely: slot payloads are
//! swapped atomically and the graph uses per-edge locking, so readers see
//! whole records but may see a graph that is mid-update between edges.

use std::sync::Arc;

use parking_lot::Mutex;
use quarry_core::{Decision, MutationKind, Record, SlotRef, StoreConfig, StoreError, StoreResult};
use quarry_storage::{expand, Expansion, RelationGraph, SlotTable, TableStats};

use crate::index::RecordIndex;
use crate::matchmaker::Matchmaker;

/// The storage engine's mutation and read surface.
///
/// Live mutations obtain a `Decision` from the sequencer first and then
/// call `apply`; replay feeds persisted decisions straight into `apply`.
pub struct StoreCore {
    table: SlotTable,
    graph: RelationGraph,
    matchmaker: Matchmaker,
    index: Arc<dyn RecordIndex>,
    default_block: String,
    write_lock: Mutex<()>,
}

impl StoreCore {
    pub fn new(cfg: &StoreConfig, index: Arc<dyn RecordIndex>) -> Self {
        let table = SlotTable::new(&cfg.blocks);
        let graph = RelationGraph::new(cfg.capacity());
        Self {
            table,
            graph,
            matchmaker: Matchmaker::new(),
            index,
            default_block: cfg.default_block.clone(),
            write_lock: Mutex::new(()),
        }
    }

    /// Apply one decision to the slot table, graph, and index.
    ///
    /// A `Read` kind is invalid here; it is skipped with a warning rather
    /// than failing, since a read decision in the log is a replay artifact
    /// and not worth aborting recovery over.
    pub fn apply(&self, decision: &Decision) -> StoreResult<()> {
        let _writer = self.write_lock.lock();
        match decision.kind {
            MutationKind::Create => self.apply_create(decision),
            MutationKind::Update => self.apply_update(decision),
            MutationKind::Delete => self.apply_delete(decision),
            MutationKind::Read => {
                tracing::warn!(
                    target: "quarry::store",
                    sequence = decision.sequence,
                    "read decision skipped"
                );
                Ok(())
            }
        }
    }

    fn apply_create(&self, decision: &Decision) -> StoreResult<()> {
        if let Some(slot) = self.index.slot_for_id(&decision.record_id) {
            // Create over a live id behaves as an in-place update.
            return self.write_existing(slot, decision);
        }
        let block = decision
            .record
            .block
            .as_deref()
            .unwrap_or(&self.default_block);
        let slot = self.table.allocate(block)?;
        self.table.write(slot, decision.record.clone());
        self.index.bind(&decision.record_id, slot);
        self.index.bind_sequence(decision.sequence, slot);
        self.matchmaker
            .on_insert(slot, &decision.record, self.index.as_ref(), &self.graph);
        Ok(())
    }

    fn apply_update(&self, decision: &Decision) -> StoreResult<()> {
        match self.index.slot_for_id(&decision.record_id) {
            Some(slot) => self.write_existing(slot, decision),
            None => {
                // Best-effort upsert keeps replay going when an update
                // arrives for an id that never materialized.
                tracing::warn!(
                    target: "quarry::store",
                    id = %decision.record_id,
                    sequence = decision.sequence,
                    "update for unknown id applied as create"
                );
                self.apply_create(decision)
            }
        }
    }

    fn write_existing(&self, slot: SlotRef, decision: &Decision) -> StoreResult<()> {
        let old = self.table.read(slot);
        self.table.write(slot, decision.record.clone());
        self.index.bind_sequence(decision.sequence, slot);
        match old {
            Some(old) => self.matchmaker.on_update(
                slot,
                &old,
                &decision.record,
                self.index.as_ref(),
                &self.graph,
            ),
            None => self.matchmaker.on_insert(
                slot,
                &decision.record,
                self.index.as_ref(),
                &self.graph,
            ),
        }
        Ok(())
    }

    fn apply_delete(&self, decision: &Decision) -> StoreResult<()> {
        let slot = self
            .index
            .slot_for_id(&decision.record_id)
            .ok_or_else(|| StoreError::RecordNotFound {
                id: decision.record_id.clone(),
            })?;
        self.drop_slot(&decision.record_id, slot);
        Ok(())
    }

    /// Delete a live record directly, outside any decision. Used by
    /// `clear`, which wipes the log afterwards instead of logging deletes.
    pub fn evict(&self, id: &str) -> StoreResult<()> {
        let _writer = self.write_lock.lock();
        let slot = self
            .index
            .slot_for_id(id)
            .ok_or_else(|| StoreError::RecordNotFound { id: id.to_string() })?;
        self.drop_slot(id, slot);
        Ok(())
    }

    fn drop_slot(&self, id: &str, slot: SlotRef) {
        self.matchmaker.on_delete(slot, &self.graph);
        self.table.free(slot);
        self.index.unbind(id);
    }

    /// Record currently stored under this id.
    pub fn read(&self, id: &str) -> Option<Arc<Record>> {
        let slot = self.index.slot_for_id(id)?;
        self.table.read(slot)
    }

    /// Record currently held in this slot.
    pub fn read_slot(&self, slot: SlotRef) -> Option<Arc<Record>> {
        self.table.read(slot)
    }

    /// Expand the graph outward from the record with this id.
    ///
    /// The view is recomputed on every call; a caller that needs a stable
    /// snapshot against concurrent edge changes should re-expand after
    /// pinning the record it cares about.
    pub fn expand_record(&self, id: &str, max_depth: usize) -> Option<Expansion> {
        let slot = self.index.slot_for_id(id)?;
        Some(expand(&self.table, &self.graph, slot, max_depth))
    }

    /// Every live `(id, slot)` pair, via the index.
    pub fn live(&self) -> Vec<(String, SlotRef)> {
        self.index.live()
    }

    /// Occupancy snapshot of the table and its blocks.
    pub fn stats(&self) -> TableStats {
        self.table.stats()
    }

    pub fn table(&self) -> &SlotTable {
        &self.table
    }

    pub fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    pub fn index(&self) -> &Arc<dyn RecordIndex> {
        &self.index
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }
}

impl std::fmt::Debug for StoreCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCore")
            .field("table", &self.table)
            .field("default_block", &self.default_block)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use chrono::Utc;
    use quarry_core::{BlockSpec, LogConfig};
    use std::path::PathBuf;

    fn config() -> StoreConfig {
        StoreConfig {
            blocks: vec![BlockSpec::new("data", 8), BlockSpec::new("system", 2)],
            default_block: "data".to_string(),
            log: LogConfig::at(PathBuf::from("unused.db")),
        }
    }

    fn core() -> StoreCore {
        StoreCore::new(&config(), Arc::new(MemoryIndex::new()))
    }

    fn decision(sequence: u64, kind: MutationKind, record: Record) -> Decision {
        Decision {
            sequence,
            kind,
            record_id: record.id.clone(),
            decided_at: Utc::now(),
            record,
        }
    }

    fn rec(id: &str) -> Record {
        Record::new(id, serde_json::json!({ "id": id }))
    }

    #[test]
    fn create_read_delete_cycle() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("a")))
            .unwrap();
        assert_eq!(core.read("a").unwrap().id, "a");
        assert_eq!(core.stats().occupied, 1);

        core.apply(&decision(2, MutationKind::Delete, rec("a")))
            .unwrap();
        assert!(core.read("a").is_none());
        assert_eq!(core.stats().occupied, 0);
    }

    #[test]
    fn update_swaps_payload_in_place() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("a")))
            .unwrap();
        let slot = core.index().slot_for_id("a").unwrap();

        let updated = Record::new("a", serde_json::json!({ "v": 2 }));
        core.apply(&decision(2, MutationKind::Update, updated))
            .unwrap();

        assert_eq!(core.index().slot_for_id("a"), Some(slot));
        assert_eq!(core.read("a").unwrap().payload["v"], 2);
        assert_eq!(core.stats().occupied, 1);
    }

    #[test]
    fn create_links_declared_relationships() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("b")))
            .unwrap();
        let parent = Record::with_related(
            "a",
            serde_json::json!({}),
            vec!["b".to_string()],
        );
        core.apply(&decision(2, MutationKind::Create, parent))
            .unwrap();

        let a = core.index().slot_for_id("a").unwrap();
        let b = core.index().slot_for_id("b").unwrap();
        assert!(core.graph().is_linked(a, b));
    }

    #[test]
    fn delete_of_unknown_id_is_record_not_found() {
        let core = core();
        let err = core
            .apply(&decision(1, MutationKind::Delete, rec("ghost")))
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[test]
    fn update_of_unknown_id_upserts() {
        let core = core();
        core.apply(&decision(1, MutationKind::Update, rec("a")))
            .unwrap();
        assert!(core.read("a").is_some());
    }

    #[test]
    fn read_decisions_are_skipped() {
        let core = core();
        core.apply(&decision(1, MutationKind::Read, rec("a")))
            .unwrap();
        assert!(core.read("a").is_none());
        assert_eq!(core.stats().occupied, 0);
    }

    #[test]
    fn records_route_to_named_blocks() {
        let core = core();
        core.apply(&decision(
            1,
            MutationKind::Create,
            rec("sys").in_block("system"),
        ))
        .unwrap();

        let stats = core.stats();
        let system = stats.blocks.iter().find(|b| b.name == "system").unwrap();
        assert_eq!(system.occupied, 1);
        let data = stats.blocks.iter().find(|b| b.name == "data").unwrap();
        assert_eq!(data.occupied, 0);
    }

    #[test]
    fn block_full_surfaces_capacity_exhausted() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("s1").in_block("system")))
            .unwrap();
        core.apply(&decision(2, MutationKind::Create, rec("s2").in_block("system")))
            .unwrap();
        let err = core
            .apply(&decision(3, MutationKind::Create, rec("s3").in_block("system")))
            .unwrap_err();
        assert!(matches!(err, StoreError::BlockFull { .. }));
    }

    #[test]
    fn delete_clears_edges_both_ways() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("b")))
            .unwrap();
        core.apply(&decision(
            2,
            MutationKind::Create,
            Record::with_related("a", serde_json::json!({}), vec!["b".to_string()]),
        ))
        .unwrap();

        let b = core.index().slot_for_id("b").unwrap();
        core.apply(&decision(3, MutationKind::Delete, rec("a")))
            .unwrap();
        assert!(core.graph().references(b).is_empty());
    }

    #[test]
    fn expand_record_walks_the_graph() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("b")))
            .unwrap();
        core.apply(&decision(
            2,
            MutationKind::Create,
            Record::with_related("a", serde_json::json!({}), vec!["b".to_string()]),
        ))
        .unwrap();

        let view = core.expand_record("a", 1).unwrap();
        assert_eq!(view.len(), 2);
        let b = core.index().slot_for_id("b").unwrap();
        assert_eq!(view.root_node().links, vec![b]);
    }

    #[test]
    fn evict_frees_without_a_decision() {
        let core = core();
        core.apply(&decision(1, MutationKind::Create, rec("a")))
            .unwrap();
        core.evict("a").unwrap();
        assert!(core.read("a").is_none());
        assert_eq!(core.stats().occupied, 0);
        assert!(matches!(
            core.evict("a"),
            Err(StoreError::RecordNotFound { .. })
        ));
    }
}
