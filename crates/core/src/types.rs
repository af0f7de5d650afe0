//! Value types shared across the store.
//!
//! Slot references and decisions are plain structural values. There is no
//! interning or process-wide registry: two `SlotRef`s are equal when their
//! indices are equal, and a `Decision` is an ordinary immutable struct.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable address of one slot in the slot table.
///
/// A reference is valid for the lifetime of the process. References are
/// recycled after `free`, so holding a `SlotRef` across a free/allocate
/// cycle may observe a different record in the same slot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SlotRef(pub u32);

impl SlotRef {
    /// Index of this reference into the slot table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for SlotRef {
    fn from(raw: u32) -> Self {
        SlotRef(raw)
    }
}

/// The kind of request a decision was made for.
///
/// `Read` exists so request plumbing can pass every kind through one enum,
/// but the sequencer rejects it: reads never get a sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Read,
}

impl MutationKind {
    /// Short enum string persisted in the `REQUEST_TYPE` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "CREATE",
            MutationKind::Update => "UPDATE",
            MutationKind::Delete => "DELETE",
            MutationKind::Read => "READ",
        }
    }

    /// Parse the persisted enum string back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATE" => Some(MutationKind::Create),
            "UPDATE" => Some(MutationKind::Update),
            "DELETE" => Some(MutationKind::Delete),
            "READ" => Some(MutationKind::Read),
            _ => None,
        }
    }

    /// Whether this kind mutates state and therefore needs a decision.
    #[inline]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, MutationKind::Read)
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record: logical id, arbitrary payload, and optional declared
/// relationships to other records by id.
///
/// `block` routes the record to a named allocator block; when absent the
/// store's default block is used. Declared relationships are resolved into
/// graph edges by the matchmaker, deferred if the target id is not present
/// yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Logical record id, unique across the store.
    pub id: String,
    /// Arbitrary payload.
    pub payload: serde_json::Value,
    /// Ids of records this record declares a relationship to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<String>>,
    /// Allocator block this record lives in (default block when `None`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
}

impl Record {
    /// Create a record with no declared relationships.
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
            related: None,
            block: None,
        }
    }

    /// Create a record declaring relationships to the given record ids.
    pub fn with_related(
        id: impl Into<String>,
        payload: serde_json::Value,
        related: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            payload,
            related: Some(related),
            block: None,
        }
    }

    /// Route this record to a named allocator block.
    pub fn in_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    /// Declared relationship ids, empty when none were declared.
    pub fn related_ids(&self) -> &[String] {
        self.related.as_deref().unwrap_or(&[])
    }
}

/// An immutable record of one accepted mutation.
///
/// Decisions are the unit of ordering, durability, and replay. A sequence
/// number, once assigned, is never reused unless the whole log is wiped and
/// the sequencer reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Strictly increasing sequence number, the total order of mutations.
    pub sequence: u64,
    /// What kind of mutation was accepted.
    pub kind: MutationKind,
    /// Logical id of the record the mutation targets.
    pub record_id: String,
    /// When the decision was made.
    pub decided_at: DateTime<Utc>,
    /// The record payload carried by the mutation.
    pub record: Record,
}
