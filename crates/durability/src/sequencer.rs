//! The decision sequencer: the single authority for mutation order.
//!
//! One atomic counter, seeded from the log's last persisted sequence on
//! construction. Mutations are expected to flow through a single writer
//! (see the engine's apply path); the atomic makes the counter safe even
//! if that discipline is violated, but strict external ordering is only
//! guaranteed under the single-writer model.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use quarry_core::{Decision, MutationKind, Record, StoreError, StoreResult};

use crate::log::DecisionLog;

/// Assigns a strictly increasing sequence number to every accepted
/// mutation and hands the decision to the durable log.
pub struct Sequencer {
    counter: AtomicU64,
    log: Arc<DecisionLog>,
}

impl Sequencer {
    /// Build a sequencer over an open log, seeding the counter from the
    /// log's last known sequence.
    pub fn new(log: Arc<DecisionLog>) -> StoreResult<Self> {
        let last = log.last_sequence()?;
        tracing::debug!(target: "quarry::sequencer", last, "sequencer seeded");
        Ok(Self {
            counter: AtomicU64::new(last),
            log,
        })
    }

    /// Accept a mutation: assign the next sequence number, stamp the time,
    /// and buffer the decision in the log. The caller must apply the
    /// mutation to the slot table only after this returns `Ok`.
    ///
    /// Read-only kinds are rejected: reads never need a decision. A
    /// sequence number consumed by a failed append is burned, never
    /// reissued.
    pub fn decide(&self, kind: MutationKind, record: Record) -> StoreResult<Decision> {
        if !kind.is_mutation() {
            return Err(StoreError::NoDecisionNeeded {
                kind: kind.to_string(),
            });
        }
        let sequence = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        let decision = Decision {
            sequence,
            kind,
            record_id: record.id.clone(),
            decided_at: Utc::now(),
            record,
        };
        self.log.append(decision.clone())?;
        Ok(decision)
    }

    /// Highest sequence number assigned so far, without side effects.
    pub fn latest(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Force the counter to a specific value. Only used during full-wipe
    /// recovery.
    pub fn reset_to(&self, sequence: u64) {
        self.counter.store(sequence, Ordering::Release);
    }

    /// Wipe the entire log and reset the counter to the log's (now zero)
    /// last sequence. The next decision after this gets sequence 1.
    pub fn wipe_all(&self) -> StoreResult<()> {
        self.log.wipe_all()?;
        self.reset_to(self.log.last_sequence()?);
        Ok(())
    }

    /// The log this sequencer feeds.
    pub fn log(&self) -> &Arc<DecisionLog> {
        &self.log
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("latest", &self.latest())
            .finish()
    }
}
