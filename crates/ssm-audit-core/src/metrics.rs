//! Atomic counters for one audit run.
//!
//! Counters use relaxed ordering; they are diagnostic only and are shared
//! read-write by the per-entity worker threads.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-run counters.
pub struct AuditMetrics {
    /// Raw records handed to the run.
    pub observations: AtomicU64,
    /// Alignments taken from the record as supplied.
    pub alignments_supplied: AtomicU64,
    /// Alignments produced by a mapper.
    pub alignments_mapped: AtomicU64,
    /// Recoverable per-record errors.
    pub recoverable_errors: AtomicU64,
    /// Observations dropped under the `skip` fallback (or unkeyable).
    pub observations_skipped: AtomicU64,
    /// Fused `(entity, date)` groups.
    pub fused_groups: AtomicU64,
    /// Groups with more than one sibling.
    pub multi_sibling_groups: AtomicU64,
    pub promotions: AtomicU64,
    pub demotions: AtomicU64,
    pub alerts: AtomicU64,
    /// Portfolio rows produced.
    pub portfolio_days: AtomicU64,
}

impl AuditMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observations: AtomicU64::new(0),
            alignments_supplied: AtomicU64::new(0),
            alignments_mapped: AtomicU64::new(0),
            recoverable_errors: AtomicU64::new(0),
            observations_skipped: AtomicU64::new(0),
            fused_groups: AtomicU64::new(0),
            multi_sibling_groups: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            demotions: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            portfolio_days: AtomicU64::new(0),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            observations: Self::get(&self.observations),
            alignments_supplied: Self::get(&self.alignments_supplied),
            alignments_mapped: Self::get(&self.alignments_mapped),
            recoverable_errors: Self::get(&self.recoverable_errors),
            observations_skipped: Self::get(&self.observations_skipped),
            fused_groups: Self::get(&self.fused_groups),
            multi_sibling_groups: Self::get(&self.multi_sibling_groups),
            promotions: Self::get(&self.promotions),
            demotions: Self::get(&self.demotions),
            alerts: Self::get(&self.alerts),
            portfolio_days: Self::get(&self.portfolio_days),
        }
    }
}

impl Default for AuditMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`AuditMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub observations: u64,
    pub alignments_supplied: u64,
    pub alignments_mapped: u64,
    pub recoverable_errors: u64,
    pub observations_skipped: u64,
    pub fused_groups: u64,
    pub multi_sibling_groups: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub alerts: u64,
    pub portfolio_days: u64,
}
