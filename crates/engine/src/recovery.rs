//! Replay and recovery.
//!
//! On startup, `initialize` reads the persisted decision log in ascending
//! windows and re-applies every decision through the same `StoreCore`
//! apply path a live mutation takes, without re-logging. Recovery is
//! best-effort: a decision that fails to re-apply is logged and skipped,
//! because a partially recovered store beats an empty one.

use std::sync::Arc;

use quarry_core::StoreResult;
use quarry_durability::Sequencer;

use crate::store::StoreCore;

/// Outcome counters for one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Decisions successfully re-applied.
    pub applied: usize,
    /// Read decisions found in the log and skipped defensively.
    pub skipped: usize,
    /// Decisions that failed to re-apply.
    pub failed: usize,
}

/// Rebuilds in-memory state from the log, and clears it back down.
pub struct RecoveryManager {
    core: Arc<StoreCore>,
    sequencer: Arc<Sequencer>,
}

impl RecoveryManager {
    pub fn new(core: Arc<StoreCore>, sequencer: Arc<Sequencer>) -> Self {
        Self { core, sequencer }
    }

    /// Replay the whole log into the (empty) slot table.
    ///
    /// Windows of `read_batch` sequences are fetched in ascending order;
    /// when the latest sequence is within one window of zero, a single
    /// read covers everything. An applied-sequence watermark skips
    /// decisions already seen at window boundaries.
    pub fn initialize(&self) -> StoreResult<ReplayReport> {
        let log = self.sequencer.log();
        let latest = self.sequencer.latest();
        let mut report = ReplayReport::default();
        if latest == 0 {
            tracing::debug!(target: "quarry::recovery", "log empty, nothing to replay");
            return Ok(report);
        }

        let window = log.config().read_batch.max(1);
        let mut applied_through = 0u64;
        let mut lo = 0u64;
        loop {
            let hi = lo.saturating_add(window).min(latest);
            let decisions = log.read_range(lo, hi)?;
            tracing::debug!(
                target: "quarry::recovery",
                lo,
                hi,
                count = decisions.len(),
                "replaying window"
            );
            for decision in decisions {
                if decision.sequence <= applied_through {
                    continue;
                }
                applied_through = decision.sequence;
                if !decision.kind.is_mutation() {
                    report.skipped += 1;
                    tracing::warn!(
                        target: "quarry::recovery",
                        sequence = decision.sequence,
                        "read decision in log, skipping"
                    );
                    continue;
                }
                match self.core.apply(&decision) {
                    Ok(()) => report.applied += 1,
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(
                            target: "quarry::recovery",
                            sequence = decision.sequence,
                            error = %e,
                            "replay item failed, continuing"
                        );
                    }
                }
            }
            if hi >= latest {
                break;
            }
            lo = hi;
        }

        tracing::info!(
            target: "quarry::recovery",
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "replay complete"
        );
        Ok(report)
    }

    /// Empty the store: delete every live record through the normal
    /// delete path (continuing past per-record failures), then wipe the
    /// log and reset the sequencer. The next decision gets sequence 1.
    pub fn clear(&self) -> StoreResult<()> {
        for (id, _slot) in self.core.live() {
            if let Err(e) = self.core.evict(&id) {
                tracing::warn!(
                    target: "quarry::recovery",
                    id = %id,
                    error = %e,
                    "clear failed for record, continuing"
                );
            }
        }
        self.core.matchmaker().reset();
        self.core.index().clear();
        self.sequencer.wipe_all()?;
        tracing::info!(target: "quarry::recovery", "store cleared");
        Ok(())
    }
}

impl std::fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryManager").finish()
    }
}
