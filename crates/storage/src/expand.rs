//! Graph expansion: bounded traversal outward from a slot.
//!
//! `expand` walks both directions (links and references) breadth-first,
//! bounded by `max_depth` and a visited set, and returns a flat view of
//! everything it reached. The view is computed fresh on every call, so a
//! consumer never sees edges that were already stale when it asked.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use quarry_core::{Record, SlotRef};

use crate::graph::RelationGraph;
use crate::table::SlotTable;

/// One slot reached during expansion.
#[derive(Debug, Clone)]
pub struct ExpandedNode {
    pub slot: SlotRef,
    /// Payload at the time of expansion; `None` for a freed slot that is
    /// still referenced by a live edge.
    pub record: Option<Arc<Record>>,
    /// Outgoing link targets of this slot.
    pub links: Vec<SlotRef>,
    /// Incoming reference sources of this slot.
    pub references: Vec<SlotRef>,
    /// Hops from the expansion root.
    pub depth: usize,
}

/// The result of expanding a slot: every node reached within the depth
/// bound, in breadth-first discovery order (root first).
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    pub root: SlotRef,
    pub nodes: Vec<ExpandedNode>,
}

impl Expansion {
    /// The node for the given slot, if it was reached.
    pub fn get(&self, slot: SlotRef) -> Option<&ExpandedNode> {
        self.nodes.iter().find(|n| n.slot == slot)
    }

    /// The root node's view.
    pub fn root_node(&self) -> &ExpandedNode {
        &self.nodes[0]
    }

    /// Number of distinct slots reached, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Expand outward from `start`, following links and references up to
/// `max_depth` hops. Each slot is visited once.
pub fn expand(
    table: &SlotTable,
    graph: &RelationGraph,
    start: SlotRef,
    max_depth: usize,
) -> Expansion {
    let mut nodes = Vec::new();
    let mut seen: HashSet<SlotRef> = HashSet::new();
    let mut queue: VecDeque<(SlotRef, usize)> = VecDeque::new();

    queue.push_back((start, 0));
    seen.insert(start);

    while let Some((slot, depth)) = queue.pop_front() {
        let links = graph.links(slot);
        let references = graph.references(slot);

        if depth < max_depth {
            for neighbor in links.iter().chain(references.iter()).copied() {
                if seen.insert(neighbor) {
                    queue.push_back((neighbor, depth + 1));
                }
            }
        }

        nodes.push(ExpandedNode {
            slot,
            record: table.read(slot),
            links,
            references,
            depth,
        });
    }

    Expansion { root: start, nodes }
}
