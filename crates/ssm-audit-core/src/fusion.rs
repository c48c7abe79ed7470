//! Rapidity-space fusion of alignment observations.
//!
//! Alignments live in (-1, 1); their rapidities `u = atanh(a)` live on the
//! whole real line, where a weighted mean is well behaved:
//!
//! ```text
//! a_fused = tanh( Σ w_i · atanh(a_i) / max(Σ w_i, eps_w) )
//! ```
//!
//! Each input is clamped with `eps_a` first so `atanh` stays finite. The
//! result is order-independent, returns a single input unchanged, and is
//! idempotent under duplication.

use chrono::NaiveDate;

use crate::band::clamp;
use crate::error::FusionError;

/// One alignment with its fusion weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedAlignment {
    pub alignment: f64,
    pub weight: f64,
}

impl WeightedAlignment {
    #[must_use]
    pub const fn new(alignment: f64, weight: f64) -> Self {
        Self { alignment, weight }
    }

    #[must_use]
    pub const fn unit(alignment: f64) -> Self {
        Self {
            alignment,
            weight: 1.0,
        }
    }
}

/// Running sums in rapidity space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RapidityAccumulator {
    numerator: f64,
    weight_sum: f64,
    count: usize,
}

impl RapidityAccumulator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            numerator: 0.0,
            weight_sum: 0.0,
            count: 0,
        }
    }

    pub fn push(&mut self, item: WeightedAlignment, eps_a: f64) {
        self.numerator += item.weight * clamp(item.alignment, eps_a).atanh();
        self.weight_sum += item.weight;
        self.count += 1;
    }

    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Fused alignment, clamped with `eps_a`.
    ///
    /// A weight sum at or below `eps_w` (all-zero or cancelling negative
    /// weights) can push the rapidity to infinity; the clamp keeps the result
    /// strictly inside (-1, 1).
    pub fn finish(&self, eps_a: f64, eps_w: f64) -> Result<f64, FusionError> {
        if self.count == 0 {
            return Err(FusionError::EmptyGroup);
        }
        Ok(clamp((self.numerator / self.weight_sum.max(eps_w)).tanh(), eps_a))
    }
}

/// Fuse a non-empty sibling set.
pub fn fuse(items: &[WeightedAlignment], eps_a: f64, eps_w: f64) -> Result<f64, FusionError> {
    let mut acc = RapidityAccumulator::new();
    for &item in items {
        acc.push(item, eps_a);
    }
    acc.finish(eps_a, eps_w)
}

/// Portfolio ("SDI") fusion: every alignment weighs `1/n`.
pub fn fuse_uniform(alignments: &[f64], eps_a: f64, eps_w: f64) -> Result<f64, FusionError> {
    if alignments.is_empty() {
        return Err(FusionError::EmptyGroup);
    }
    let w = 1.0 / alignments.len() as f64;
    let items: Vec<WeightedAlignment> = alignments
        .iter()
        .map(|&a| WeightedAlignment::new(a, w))
        .collect();
    fuse(&items, eps_a, eps_w)
}

/// One portfolio point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioPoint {
    pub time: NaiveDate,
    pub alignment: f64,
    pub members: usize,
}

/// Fuse per-day alignment buckets. Empty buckets are skipped.
pub fn fuse_portfolio<I>(buckets: I, eps_a: f64, eps_w: f64) -> Vec<PortfolioPoint>
where
    I: IntoIterator<Item = (NaiveDate, Vec<f64>)>,
{
    buckets
        .into_iter()
        .filter_map(|(time, alignments)| {
            let members = alignments.len();
            fuse_uniform(&alignments, eps_a, eps_w)
                .ok()
                .map(|alignment| PortfolioPoint {
                    time,
                    alignment,
                    members,
                })
        })
        .collect()
}
