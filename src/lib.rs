//! Quarry: an embedded, in-process graph-shaped data store.
//!
//! A fixed-capacity slot table holds arbitrary records, a relationship
//! graph tracks bidirectional links between them, and every mutation is
//! sequenced into a durable decision log that can rebuild the in-memory
//! state on restart.
//!
//! This crate re-exports the public surface of the internal crates with a
//! clean single import path.

// ============================================================================
// Core value types
// ============================================================================

pub use quarry_core::{Decision, MutationKind, Record, SlotRef};
pub use quarry_core::{StoreError, StoreResult};
pub use quarry_core::{BlockSpec, LogConfig, StoreConfig};

// ============================================================================
// Storage: slot table, allocator, relationship graph
// ============================================================================

pub use quarry_storage::{expand, ExpandedNode, Expansion};
pub use quarry_storage::{Block, BlockStats, RelationGraph, SlotTable, TableStats};

// ============================================================================
// Durability: sequencer and decision log
// ============================================================================

pub use quarry_durability::{DecisionLog, Sequencer};

// ============================================================================
// Engine: apply path, matchmaker, recovery, index
// ============================================================================

pub use quarry_engine::{Matchmaker, MemoryIndex, RecordIndex, RecoveryManager, ReplayReport, StoreCore};
