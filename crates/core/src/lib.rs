//! Core types for the Quarry embedded store.
//!
//! This crate defines the value types shared by every layer:
//! - `SlotRef`: the stable address of a slot in the table
//! - `Record`: the stored payload plus its declared relationships
//! - `Decision`: a sequenced, immutable record of one accepted mutation
//! - `StoreError` / `StoreResult`: the error surface of the whole store
//! - configuration structs for the table and the decision log

pub mod config;
pub mod error;
pub mod types;

pub use config::{BlockSpec, LogConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use types::{Decision, MutationKind, Record, SlotRef};
