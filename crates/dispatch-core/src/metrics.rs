//! Global atomic counters for dispatch observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. after a batch or at CLI exit).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    decisions: AtomicU64,
    unassigned: AtomicU64,
    commit_conflicts: AtomicU64,
    batches: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            decisions: AtomicU64::new(0),
            unassigned: AtomicU64::new(0),
            commit_conflicts: AtomicU64::new(0),
            batches: AtomicU64::new(0),
        }
    }

    /// Count one committed auto-assignment.
    pub fn inc_decisions(&self) {
        self.decisions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decisions", "counter incremented");
    }

    /// Count one auto-assignment that found no eligible courier.
    pub fn inc_unassigned(&self) {
        self.unassigned.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "unassigned", "counter incremented");
    }

    /// Count one capacity-guarded commit refused by the store.
    pub fn inc_commit_conflicts(&self) {
        self.commit_conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "commit_conflicts", "counter incremented");
    }

    /// Count one bulk assignment call.
    pub fn inc_batches(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "batches", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            decisions = self.decisions(),
            unassigned = self.unassigned(),
            commit_conflicts = self.commit_conflicts(),
            batches = self.batches(),
        );
    }

    pub fn decisions(&self) -> u64 {
        self.decisions.load(Ordering::Relaxed)
    }

    pub fn unassigned(&self) -> u64 {
        self.unassigned.load(Ordering::Relaxed)
    }

    pub fn commit_conflicts(&self) -> u64 {
        self.commit_conflicts.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.decisions.store(0, Ordering::Relaxed);
        self.unassigned.store(0, Ordering::Relaxed);
        self.commit_conflicts.store(0, Ordering::Relaxed);
        self.batches.store(0, Ordering::Relaxed);
    }
}
