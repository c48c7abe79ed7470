//! Confidence bands over the alignment interval.
//!
//! Five totally ordered bands partition (-1, +1):
//!
//! ```text
//!   A--  <  A-  <  A0  <  A+  <  A++
//!      0.10   0.25   0.50   0.75
//! ```
//!
//! Cut points are inclusive to the higher band. The rank (1..=5) is what the
//! hysteresis machine and the alert rules compare.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Band {
    #[serde(rename = "A--")]
    StrongMisaligned = 1,
    #[serde(rename = "A-")]
    Misaligned = 2,
    #[serde(rename = "A0")]
    Neutral = 3,
    #[serde(rename = "A+")]
    Aligned = 4,
    #[serde(rename = "A++")]
    StrongAligned = 5,
}

impl Band {
    pub const ALL: [Self; 5] = [
        Self::StrongMisaligned,
        Self::Misaligned,
        Self::Neutral,
        Self::Aligned,
        Self::StrongAligned,
    ];

    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::StrongMisaligned => "A--",
            Self::Misaligned => "A-",
            Self::Neutral => "A0",
            Self::Aligned => "A+",
            Self::StrongAligned => "A++",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lower cut points of `A-`, `A0`, `A+` and `A++`, in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandCuts {
    pub misaligned: f64,
    pub neutral: f64,
    pub aligned: f64,
    pub strong_aligned: f64,
}

impl BandCuts {
    pub const DEFAULT: Self = Self {
        misaligned: 0.10,
        neutral: 0.25,
        aligned: 0.50,
        strong_aligned: 0.75,
    };

    #[must_use]
    pub const fn as_array(&self) -> [f64; 4] {
        [
            self.misaligned,
            self.neutral,
            self.aligned,
            self.strong_aligned,
        ]
    }

    /// Strictly ascending and inside (-1, 1).
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let cuts = self.as_array();
        cuts.iter().all(|c| c.is_finite() && *c > -1.0 && *c < 1.0)
            && cuts.windows(2).all(|w| w[0] < w[1])
    }

    /// Classify an (already clamped) alignment, evaluated high to low.
    #[must_use]
    pub fn classify(&self, a: f64) -> Band {
        if a >= self.strong_aligned {
            Band::StrongAligned
        } else if a >= self.aligned {
            Band::Aligned
        } else if a >= self.neutral {
            Band::Neutral
        } else if a >= self.misaligned {
            Band::Misaligned
        } else {
            Band::StrongMisaligned
        }
    }
}

impl Default for BandCuts {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Bound `x` into `[-1 + eps, 1 - eps]`.
///
/// NaN maps to the lower bound so that a poisoned input can never classify
/// above `A--`.
#[must_use]
pub fn clamp(x: f64, eps: f64) -> f64 {
    let lo = -1.0 + eps;
    let hi = 1.0 - eps;
    if x.is_nan() {
        return lo;
    }
    lo.max(hi.min(x))
}

/// Classify with the default cut points.
#[must_use]
pub fn classify(a: f64) -> Band {
    BandCuts::DEFAULT.classify(a)
}
