//! Numeric policy: every knob that shapes an alignment, a band or an alert.
//!
//! A [`Policy`] is immutable for a run. [`Policy::validate`] must pass before
//! any record is touched; the knobs are then hashed into the run fingerprint
//! (see [`crate::fingerprint`]).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::alerts::DEFAULT_SLOPE_THRESHOLD;
use crate::band::{self, Band, BandCuts};
use crate::error::PolicyError;
use crate::hysteresis::{self, HysteresisState, Step};

pub const DEFAULT_EPS_A: f64 = 1e-6;
pub const DEFAULT_EPS_W: f64 = 1e-12;
pub const DEFAULT_GAMMA: f64 = 1.0;
pub const DEFAULT_PROMOTE: f64 = 0.05;
pub const DEFAULT_DEMOTE: f64 = -0.05;

/// Digest used for the policy fingerprint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlg {
    /// SHA-256, byte-compatible with existing `knobs_hash` columns.
    #[default]
    Sha256,
    Blake3,
}

impl HashAlg {
    /// Parse from string (case-insensitive). Unknown names fall back to SHA-256.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "blake3" | "blake3-256" | "blake3_256" | "b3" => Self::Blake3,
            _ => Self::Sha256,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run-wide numeric configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Clamp margin: alignments live in `[-1 + eps_a, 1 - eps_a]`.
    pub eps_a: f64,
    /// Floor of the fusion weight sum.
    pub eps_w: f64,
    /// Carried into the fingerprint only.
    pub gamma: f64,
    pub cuts: BandCuts,
    pub promote: f64,
    pub demote: f64,
    /// `slope_7d` alert threshold. Not fingerprinted.
    pub slope_7d: f64,
    pub hash_alg: HashAlg,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            eps_a: DEFAULT_EPS_A,
            eps_w: DEFAULT_EPS_W,
            gamma: DEFAULT_GAMMA,
            cuts: BandCuts::DEFAULT,
            promote: DEFAULT_PROMOTE,
            demote: DEFAULT_DEMOTE,
            slope_7d: DEFAULT_SLOPE_THRESHOLD,
            hash_alg: HashAlg::Sha256,
        }
    }
}

impl Policy {
    #[must_use]
    pub fn with_eps_a(mut self, eps_a: f64) -> Self {
        self.eps_a = eps_a;
        self
    }

    #[must_use]
    pub fn with_eps_w(mut self, eps_w: f64) -> Self {
        self.eps_w = eps_w;
        self
    }

    #[must_use]
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    #[must_use]
    pub fn with_cuts(mut self, cuts: BandCuts) -> Self {
        self.cuts = cuts;
        self
    }

    #[must_use]
    pub fn with_hysteresis(mut self, promote: f64, demote: f64) -> Self {
        self.promote = promote;
        self.demote = demote;
        self
    }

    #[must_use]
    pub fn with_slope_7d(mut self, slope: f64) -> Self {
        self.slope_7d = slope;
        self
    }

    #[must_use]
    pub fn with_hash_alg(mut self, alg: HashAlg) -> Self {
        self.hash_alg = alg;
        self
    }

    /// Reject configurations under which bands or fingerprints are meaningless.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let named = [
            ("eps_a", self.eps_a),
            ("eps_w", self.eps_w),
            ("gamma", self.gamma),
            ("promote", self.promote),
            ("demote", self.demote),
            ("slope_7d", self.slope_7d),
            ("band_a_minus", self.cuts.misaligned),
            ("band_a0", self.cuts.neutral),
            ("band_a_plus", self.cuts.aligned),
            ("band_a_plus_plus", self.cuts.strong_aligned),
        ];
        if let Some(&(name, value)) = named.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PolicyError::NonFinite { name, value });
        }
        if !(self.eps_a > 0.0 && self.eps_a < 1.0) {
            return Err(PolicyError::EpsilonOutOfRange(self.eps_a));
        }
        if self.eps_w <= 0.0 {
            return Err(PolicyError::NonPositiveWeightFloor(self.eps_w));
        }
        if !self.cuts.is_consistent() {
            return Err(PolicyError::BandCutsInconsistent(self.cuts.as_array()));
        }
        if self.promote < 0.0 {
            return Err(PolicyError::NegativePromote(self.promote));
        }
        if self.demote > 0.0 {
            return Err(PolicyError::PositiveDemote(self.demote));
        }
        Ok(())
    }

    #[must_use]
    pub fn clamp(&self, x: f64) -> f64 {
        band::clamp(x, self.eps_a)
    }

    /// Raw band under the configured cut points.
    #[must_use]
    pub fn classify(&self, a: f64) -> Band {
        self.cuts.classify(a)
    }

    /// One hysteresis step under this policy.
    #[must_use]
    pub fn step(&self, state: HysteresisState, a_now: f64) -> Step {
        hysteresis::step(state, a_now, &self.cuts, self.promote, self.demote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let p = Policy::default();
        assert_eq!(p.validate(), Ok(()));
        assert_eq!(p.eps_a, 1e-6);
        assert_eq!(p.eps_w, 1e-12);
        assert_eq!(p.promote, 0.05);
        assert_eq!(p.demote, -0.05);
        assert_eq!(p.slope_7d, -0.02);
        assert_eq!(p.hash_alg, HashAlg::Sha256);
    }

    #[test]
    fn rejects_non_finite_knobs() {
        let p = Policy::default().with_gamma(f64::NAN);
        assert!(matches!(
            p.validate(),
            Err(PolicyError::NonFinite { name: "gamma", .. })
        ));
        let p = Policy::default().with_hysteresis(f64::INFINITY, -0.05);
        assert!(matches!(
            p.validate(),
            Err(PolicyError::NonFinite {
                name: "promote",
                ..
            })
        ));
    }

    #[test]
    fn rejects_epsilon_outside_unit_interval() {
        for eps in [0.0, -1e-6, 1.0, 2.0] {
            assert_eq!(
                Policy::default().with_eps_a(eps).validate(),
                Err(PolicyError::EpsilonOutOfRange(eps))
            );
        }
        assert_eq!(
            Policy::default().with_eps_w(0.0).validate(),
            Err(PolicyError::NonPositiveWeightFloor(0.0))
        );
    }

    #[test]
    fn rejects_inverted_hysteresis() {
        assert_eq!(
            Policy::default().with_hysteresis(-0.01, -0.05).validate(),
            Err(PolicyError::NegativePromote(-0.01))
        );
        assert_eq!(
            Policy::default().with_hysteresis(0.05, 0.01).validate(),
            Err(PolicyError::PositiveDemote(0.01))
        );
        assert_eq!(Policy::default().with_hysteresis(0.0, 0.0).validate(), Ok(()));
    }

    #[test]
    fn rejects_unordered_cuts() {
        let cuts = BandCuts {
            aligned: 0.2,
            ..BandCuts::DEFAULT
        };
        assert_eq!(
            Policy::default().with_cuts(cuts).validate(),
            Err(PolicyError::BandCutsInconsistent([0.10, 0.25, 0.2, 0.75]))
        );
    }

    #[test]
    fn hash_alg_parses_loosely() {
        assert_eq!(HashAlg::from_str_loose("BLAKE3"), HashAlg::Blake3);
        assert_eq!(HashAlg::from_str_loose(" b3 "), HashAlg::Blake3);
        assert_eq!(HashAlg::from_str_loose("sha256"), HashAlg::Sha256);
        assert_eq!(HashAlg::from_str_loose("md5"), HashAlg::Sha256);
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let p: Policy = serde_json::from_str(r#"{"promote":0.1,"hash_alg":"blake3"}"#).unwrap();
        assert_eq!(p.promote, 0.1);
        assert_eq!(p.demote, -0.05);
        assert_eq!(p.hash_alg, HashAlg::Blake3);
        assert_eq!(p.cuts, BandCuts::DEFAULT);
    }

    #[test]
    fn custom_cuts_drive_classification() {
        let cuts = BandCuts {
            misaligned: 0.0,
            neutral: 0.2,
            aligned: 0.4,
            strong_aligned: 0.6,
        };
        let p = Policy::default().with_cuts(cuts);
        assert_eq!(p.classify(0.45), Band::Aligned);
        assert_eq!(p.classify(0.65), Band::StrongAligned);
        assert_eq!(p.clamp(3.0), 1.0 - 1e-6);
    }
}
