//! Durability layer: the sequenced, replayable decision log.
//!
//! `Sequencer` assigns a strictly increasing sequence number to every
//! accepted mutation and hands the resulting `Decision` to the
//! `DecisionLog`, which buffers it and persists it in batched background
//! flushes to a SQLite file. `read_range` returns persisted decisions in
//! ascending sequence order regardless of physical write order.

pub mod log;
pub mod sequencer;

pub use log::DecisionLog;
pub use sequencer::Sequencer;
