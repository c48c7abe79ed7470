//! Directional hysteresis over confirmed bands.
//!
//! The confirmed band moves to the raw band only when the move itself is
//! large enough in the direction of the move:
//!
//! ```text
//! raw > confirmed  and  Δ >= promote   ->  promote to raw
//! raw < confirmed  and  Δ <= demote    ->  demote to raw
//! otherwise                            ->  keep confirmed (or raw on first record)
//! ```
//!
//! with `Δ = a_now - a_prev` and `Δ = 0` when there is no previous record.
//! The machine has no terminal state; it runs for the whole series.

use crate::band::{Band, BandCuts};

/// Kind of step taken by [`advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First record of a series; confirmed band initialized to the raw band.
    Initialized,
    Promoted,
    Demoted,
    /// Confirmed band unchanged (raw band equal, or move below threshold).
    Held,
}

/// Per-entity carry between consecutive records.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HysteresisState {
    pub band: Option<Band>,
    pub alignment: Option<f64>,
}

impl HysteresisState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            band: None,
            alignment: None,
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub state: HysteresisState,
    pub raw: Band,
    pub confirmed: Band,
    pub transition: Transition,
}

/// Advance the machine by one clamped alignment, using `cuts` for the raw band.
#[must_use]
pub fn step(
    state: HysteresisState,
    a_now: f64,
    cuts: &BandCuts,
    promote: f64,
    demote: f64,
) -> Step {
    let raw = cuts.classify(a_now);
    let delta = state.alignment.map_or(0.0, |prev| a_now - prev);

    let (confirmed, transition) = match state.band {
        None => (raw, Transition::Initialized),
        Some(prev) if raw > prev && delta >= promote => (raw, Transition::Promoted),
        Some(prev) if raw < prev && delta <= demote => (raw, Transition::Demoted),
        Some(prev) => (prev, Transition::Held),
    };

    Step {
        state: HysteresisState {
            band: Some(confirmed),
            alignment: Some(a_now),
        },
        raw,
        confirmed,
        transition,
    }
}

/// One step over the default cut points; returns the new state and the
/// confirmed band.
#[must_use]
pub fn advance(
    state: HysteresisState,
    a_now: f64,
    promote: f64,
    demote: f64,
) -> (HysteresisState, Band) {
    let s = step(state, a_now, &BandCuts::DEFAULT, promote, demote);
    (s.state, s.confirmed)
}

/// Fold a whole time-ordered series of alignments.
#[must_use]
pub fn confirm_series(alignments: &[f64], cuts: &BandCuts, promote: f64, demote: f64) -> Vec<Step> {
    let mut state = HysteresisState::new();
    alignments
        .iter()
        .map(|&a| {
            let s = step(state, a, cuts, promote, demote);
            state = s.state;
            s
        })
        .collect()
}
