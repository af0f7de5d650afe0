//! Bidirectional relationship graph over the slot table.
//!
//! Every edge has two sides: the source's outgoing "link" set and the
//! target's incoming "reference" set. Both sides are updated inside a
//! single call while holding both endpoint locks, so the two collections
//! can never drift apart. Locks are always taken outgoing-side first, and
//! the incoming lock is released before any other lock is acquired, which
//! rules out lock-order cycles.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use quarry_core::SlotRef;

/// Per-slot adjacency: outgoing links and incoming references.
///
/// Edges are sets, so `link` is idempotent and `delink` of a missing edge
/// is a no-op. Readers may observe a graph that is mid-update between two
/// edges; a single edge is always consistent on both sides.
pub struct RelationGraph {
    outgoing: Vec<Mutex<BTreeSet<SlotRef>>>,
    incoming: Vec<Mutex<BTreeSet<SlotRef>>>,
    capacity: u32,
}

impl RelationGraph {
    /// Create an edgeless graph over a table of the given capacity.
    pub fn new(capacity: u32) -> Self {
        Self {
            outgoing: (0..capacity).map(|_| Mutex::new(BTreeSet::new())).collect(),
            incoming: (0..capacity).map(|_| Mutex::new(BTreeSet::new())).collect(),
            capacity,
        }
    }

    /// Add the edge `a → b`: `b` joins `a`'s outgoing set and `a` joins
    /// `b`'s incoming set. Idempotent; a self-edge is a no-op.
    pub fn link(&self, a: SlotRef, b: SlotRef) {
        self.check(a);
        self.check(b);
        if a == b {
            return;
        }
        let mut out = self.outgoing[a.index()].lock();
        let mut inc = self.incoming[b.index()].lock();
        out.insert(b);
        inc.insert(a);
    }

    /// Remove the edge `a → b` from both sides. No-op if absent.
    pub fn delink(&self, a: SlotRef, b: SlotRef) {
        self.check(a);
        self.check(b);
        if a == b {
            return;
        }
        let mut out = self.outgoing[a.index()].lock();
        let mut inc = self.incoming[b.index()].lock();
        out.remove(&b);
        inc.remove(&a);
    }

    /// Remove every outgoing edge of `a`, including the matching incoming
    /// entry on each target.
    pub fn delink_all(&self, a: SlotRef) {
        self.check(a);
        // Snapshot under the outgoing lock, then remove edge by edge so the
        // per-edge lock order (outgoing, then incoming) is preserved.
        let targets: Vec<SlotRef> = self.outgoing[a.index()].lock().iter().copied().collect();
        for b in targets {
            self.delink(a, b);
        }
    }

    /// Remove every incoming edge of `a`: the incoming-side analogue of
    /// `delink_all`.
    pub fn dereference_all(&self, a: SlotRef) {
        self.check(a);
        let sources: Vec<SlotRef> = self.incoming[a.index()].lock().iter().copied().collect();
        for src in sources {
            self.delink(src, a);
        }
    }

    /// Remove every edge touching `a`, in both directions.
    pub fn detach(&self, a: SlotRef) {
        self.delink_all(a);
        self.dereference_all(a);
    }

    /// Outgoing link targets of `a`, ascending.
    pub fn links(&self, a: SlotRef) -> Vec<SlotRef> {
        self.check(a);
        self.outgoing[a.index()].lock().iter().copied().collect()
    }

    /// Incoming reference sources of `a`, ascending.
    pub fn references(&self, a: SlotRef) -> Vec<SlotRef> {
        self.check(a);
        self.incoming[a.index()].lock().iter().copied().collect()
    }

    /// Whether the edge `a → b` exists.
    pub fn is_linked(&self, a: SlotRef, b: SlotRef) -> bool {
        self.check(a);
        self.check(b);
        self.outgoing[a.index()].lock().contains(&b)
    }

    /// Number of edges touching `a` (outgoing plus incoming).
    pub fn degree(&self, a: SlotRef) -> usize {
        self.check(a);
        self.outgoing[a.index()].lock().len() + self.incoming[a.index()].lock().len()
    }

    fn check(&self, slot: SlotRef) {
        if slot.0 >= self.capacity {
            panic!(
                "slot reference {} out of range (graph capacity {})",
                slot, self.capacity
            );
        }
    }
}

impl std::fmt::Debug for RelationGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationGraph")
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_updates_both_sides() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(1));
        assert_eq!(graph.links(SlotRef(0)), vec![SlotRef(1)]);
        assert_eq!(graph.references(SlotRef(1)), vec![SlotRef(0)]);
    }

    #[test]
    fn link_is_idempotent() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(1));
        graph.link(SlotRef(0), SlotRef(1));
        assert_eq!(graph.links(SlotRef(0)).len(), 1);
        assert_eq!(graph.references(SlotRef(1)).len(), 1);
    }

    #[test]
    fn delink_removes_both_sides() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(1));
        graph.delink(SlotRef(0), SlotRef(1));
        assert!(graph.links(SlotRef(0)).is_empty());
        assert!(graph.references(SlotRef(1)).is_empty());
    }

    #[test]
    fn delink_of_missing_edge_is_noop() {
        let graph = RelationGraph::new(8);
        graph.delink(SlotRef(0), SlotRef(1));
        assert!(graph.links(SlotRef(0)).is_empty());
    }

    #[test]
    fn mutual_edges_are_distinct() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(1));
        graph.link(SlotRef(1), SlotRef(0));
        assert_eq!(graph.links(SlotRef(0)), vec![SlotRef(1)]);
        assert_eq!(graph.links(SlotRef(1)), vec![SlotRef(0)]);
        assert_eq!(graph.references(SlotRef(0)), vec![SlotRef(1)]);
        assert_eq!(graph.references(SlotRef(1)), vec![SlotRef(0)]);

        graph.delink(SlotRef(0), SlotRef(1));
        // The reverse edge survives on its own.
        assert_eq!(graph.links(SlotRef(1)), vec![SlotRef(0)]);
    }

    #[test]
    fn delink_all_clears_outgoing_and_remote_incoming() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(1));
        graph.link(SlotRef(0), SlotRef(2));
        graph.link(SlotRef(3), SlotRef(0));

        graph.delink_all(SlotRef(0));
        assert!(graph.links(SlotRef(0)).is_empty());
        assert!(graph.references(SlotRef(1)).is_empty());
        assert!(graph.references(SlotRef(2)).is_empty());
        // Incoming edge from 3 is untouched.
        assert_eq!(graph.references(SlotRef(0)), vec![SlotRef(3)]);
    }

    #[test]
    fn dereference_all_clears_incoming_and_remote_outgoing() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(1), SlotRef(0));
        graph.link(SlotRef(2), SlotRef(0));
        graph.link(SlotRef(0), SlotRef(3));

        graph.dereference_all(SlotRef(0));
        assert!(graph.references(SlotRef(0)).is_empty());
        assert!(graph.links(SlotRef(1)).is_empty());
        assert!(graph.links(SlotRef(2)).is_empty());
        // Outgoing edge to 3 is untouched.
        assert_eq!(graph.links(SlotRef(0)), vec![SlotRef(3)]);
    }

    #[test]
    fn detach_clears_both_directions() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(1));
        graph.link(SlotRef(2), SlotRef(0));
        graph.detach(SlotRef(0));
        assert_eq!(graph.degree(SlotRef(0)), 0);
        assert!(graph.references(SlotRef(1)).is_empty());
        assert!(graph.links(SlotRef(2)).is_empty());
    }

    #[test]
    fn self_link_is_a_noop() {
        let graph = RelationGraph::new(8);
        graph.link(SlotRef(0), SlotRef(0));
        assert!(graph.links(SlotRef(0)).is_empty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_link_panics() {
        let graph = RelationGraph::new(2);
        graph.link(SlotRef(0), SlotRef(5));
    }

    #[test]
    fn concurrent_linking_never_leaves_one_sided_edges() {
        use std::sync::Arc;
        use std::thread;

        let graph = Arc::new(RelationGraph::new(64));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let graph = Arc::clone(&graph);
                thread::spawn(move || {
                    for i in 0..200u32 {
                        let a = SlotRef((t * 13 + i) % 64);
                        let b = SlotRef((t * 7 + i * 3) % 64);
                        graph.link(a, b);
                        if i % 3 == 0 {
                            graph.delink(a, b);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Every surviving edge must be present on both sides.
        for a in 0..64u32 {
            for b in graph.links(SlotRef(a)) {
                assert!(graph.references(b).contains(&SlotRef(a)));
            }
            for src in graph.references(SlotRef(a)) {
                assert!(graph.links(src).contains(&SlotRef(a)));
            }
        }
    }
}
