//! Slot table, block allocator, and relationship graph.
//!
//! The slot table is a fixed-capacity array of slots partitioned into named
//! contiguous blocks. Each block hands out slot references and recycles
//! freed ones. The relationship graph layers bidirectional link/reference
//! edges on top of the table; `expand` walks the graph outward from a slot
//! in both directions, bounded by depth and a visited set.

pub mod block;
pub mod expand;
pub mod graph;
pub mod table;

pub use block::{Block, BlockStats};
pub use expand::{expand, ExpandedNode, Expansion};
pub use graph::RelationGraph;
pub use table::{SlotTable, TableStats};
