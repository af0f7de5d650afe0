//! Engine layer: the apply path shared by live mutations and replay.
//!
//! `StoreCore` ties the slot table, relationship graph, matchmaker, and
//! record index together behind a single-writer lock. Live mutations get a
//! decision from the sequencer first and then run through `apply`; the
//! `RecoveryManager` drives the same `apply` path from the persisted log
//! on startup, without re-logging.

pub mod index;
pub mod matchmaker;
pub mod recovery;
pub mod store;

pub use index::{MemoryIndex, RecordIndex};
pub use matchmaker::Matchmaker;
pub use recovery::{RecoveryManager, ReplayReport};
pub use store::StoreCore;
