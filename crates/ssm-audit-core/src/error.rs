//! Error kinds for the audit core.
//!
//! Recoverable errors ([`MappingError`], [`RecordError`]) are reported per
//! record and never abort a run. Fatal errors ([`PolicyError`],
//! [`FusionError`], wrapped by [`AuditError`]) abort the whole computation
//! before any output exists.

use thiserror::Error;

use crate::mapper::MapperKind;

/// A selected mapper could not produce an alignment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("mapper '{mapper}': required field '{field}' is missing")]
    MissingField {
        mapper: MapperKind,
        field: &'static str,
    },
    #[error("mapper '{mapper}': field '{field}' is not numeric: '{raw}'")]
    NotNumeric {
        mapper: MapperKind,
        field: &'static str,
        raw: String,
    },
    #[error("mapper '{mapper}': non-positive {field} ({value})")]
    NonPositive {
        mapper: MapperKind,
        field: &'static str,
        value: f64,
    },
}

impl MappingError {
    #[must_use]
    pub const fn mapper(&self) -> MapperKind {
        match self {
            Self::MissingField { mapper, .. }
            | Self::NotNumeric { mapper, .. }
            | Self::NonPositive { mapper, .. } => *mapper,
        }
    }

    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingField { field, .. }
            | Self::NotNumeric { field, .. }
            | Self::NonPositive { field, .. } => field,
        }
    }
}

/// Neither a usable mapper selector nor a supplied alignment was present.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no mapper selected (selector: {}) and no alignment supplied", .selector.as_deref().unwrap_or("<none>"))]
pub struct NoMapperError {
    pub selector: Option<String>,
}

/// Recoverable, per-record failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    NoMapper(#[from] NoMapperError),
    #[error("supplied alignment is not numeric: '{raw}'")]
    InvalidAlignment { raw: String },
    #[error("record has no entity")]
    MissingEntity,
    #[error("record has no time")]
    MissingTime,
    #[error("unparseable time '{raw}'")]
    InvalidTime { raw: String },
}

/// The numeric policy is unusable; every band and fingerprint would be
/// meaningless.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("knob '{name}' is not finite ({value})")]
    NonFinite { name: &'static str, value: f64 },
    #[error("eps_a must lie in (0, 1), got {0}")]
    EpsilonOutOfRange(f64),
    #[error("eps_w must be positive, got {0}")]
    NonPositiveWeightFloor(f64),
    #[error("band cut points must be strictly ascending inside (-1, 1): {0:?}")]
    BandCutsInconsistent([f64; 4]),
    #[error("promote threshold must be >= 0, got {0}")]
    NegativePromote(f64),
    #[error("demote threshold must be <= 0, got {0}")]
    PositiveDemote(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FusionError {
    #[error("fusion invoked with an empty sibling group")]
    EmptyGroup,
}

/// Fatal run-level error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuditError {
    #[error("invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
    #[error("empty fusion group for key '{key}'")]
    EmptyFusionGroup { key: String },
}
