//! Raw-signal mappers: coverage ratio, dual-source agreement, forecast
//! residual.
//!
//! Each mapper turns domain inputs into a raw alignment:
//!
//! ```text
//! coverage  : a = 2q - 1
//! agreement : a = tanh(1 - |m1 - m2| / b)          b > 0
//! residual  : a = tanh(k * (1 - |actual - forecast| / s))   s > 0, k = 1 by default
//! ```
//!
//! A supplied numeric alignment always wins; mappers are consulted only when
//! the alignment slot is absent or marked not-available.

use std::fmt;

use crate::band::clamp;
use crate::error::{MappingError, NoMapperError, RecordError};
use crate::observation::{FieldValue, Observation, SuppliedAlignment};

/// Mapper selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapperKind {
    Coverage,
    Agreement,
    Residual,
}

impl MapperKind {
    pub const ALL: [Self; 3] = [Self::Coverage, Self::Agreement, Self::Residual];

    /// Parse a selector (trimmed, case-insensitive).
    #[must_use]
    pub fn from_selector(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coverage" => Some(Self::Coverage),
            "agreement" => Some(Self::Agreement),
            "residual" => Some(Self::Residual),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Coverage => "coverage",
            Self::Agreement => "agreement",
            Self::Residual => "residual",
        }
    }

    /// Fields that must be present and numeric.
    #[must_use]
    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Coverage => &["q"],
            Self::Agreement => &["m1", "m2", "b"],
            Self::Residual => &["actual", "forecast", "s"],
        }
    }
}

impl fmt::Display for MapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fully parsed mapper inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapperInput {
    Coverage {
        q: f64,
    },
    Agreement {
        m1: f64,
        m2: f64,
        b: f64,
    },
    Residual {
        actual: f64,
        forecast: f64,
        s: f64,
        k: f64,
    },
}

impl MapperInput {
    /// Extract the inputs of `kind` from an observation.
    ///
    /// Reads exactly [`MapperKind::required_fields`], in order; `k` is the
    /// only optional input.
    pub fn extract(kind: MapperKind, obs: &Observation) -> Result<Self, MappingError> {
        let mut values = [0.0_f64; 3];
        for (slot, field) in values.iter_mut().zip(kind.required_fields().iter().copied()) {
            *slot = required_number(kind, obs, field)?;
        }
        Ok(match kind {
            MapperKind::Coverage => Self::Coverage { q: values[0] },
            MapperKind::Agreement => Self::Agreement {
                m1: values[0],
                m2: values[1],
                b: values[2],
            },
            MapperKind::Residual => Self::Residual {
                actual: values[0],
                forecast: values[1],
                s: values[2],
                k: obs
                    .field("k")
                    .and_then(FieldValue::as_f64)
                    .filter(|k| k.is_finite())
                    .unwrap_or(1.0),
            },
        })
    }

    /// Raw (unclamped) alignment.
    pub fn raw_alignment(&self) -> Result<f64, MappingError> {
        match *self {
            Self::Coverage { q } => Ok(2.0 * q - 1.0),
            Self::Agreement { m1, m2, b } => {
                if b <= 0.0 {
                    return Err(MappingError::NonPositive {
                        mapper: MapperKind::Agreement,
                        field: "b",
                        value: b,
                    });
                }
                Ok((1.0 - (m1 - m2).abs() / b).tanh())
            }
            Self::Residual {
                actual,
                forecast,
                s,
                k,
            } => {
                if s <= 0.0 {
                    return Err(MappingError::NonPositive {
                        mapper: MapperKind::Residual,
                        field: "s",
                        value: s,
                    });
                }
                Ok((k * (1.0 - (actual - forecast).abs() / s)).tanh())
            }
        }
    }
}

fn required_number(
    mapper: MapperKind,
    obs: &Observation,
    field: &'static str,
) -> Result<f64, MappingError> {
    let value = obs
        .field(field)
        .filter(|v| !v.is_blank())
        .ok_or(MappingError::MissingField { mapper, field })?;
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MappingError::NotNumeric {
            mapper,
            field,
            raw: value.as_text(),
        })
}

/// Run the selected mapper of `obs` and clamp the result with `eps`.
pub fn apply_mapper(obs: &Observation, eps: f64) -> Result<(MapperKind, f64), RecordError> {
    let selector = obs.selector();
    let kind = selector
        .as_deref()
        .and_then(MapperKind::from_selector)
        .ok_or(NoMapperError { selector })?;
    let input = MapperInput::extract(kind, obs)?;
    Ok((kind, clamp(input.raw_alignment()?, eps)))
}

/// Resolve the alignment of one observation.
///
/// A supplied numeric value bypasses mapping. Otherwise the mapper is
/// consulted; the result is clamped into `[-1 + eps, 1 - eps]`.
pub fn map_alignment(obs: &Observation, eps: f64) -> Result<f64, RecordError> {
    resolve_alignment(obs, eps, true).map(|r| r.alignment)
}

/// How an alignment was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentSource {
    Supplied,
    Mapped(MapperKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAlignment {
    pub alignment: f64,
    pub source: AlignmentSource,
}

/// Like [`map_alignment`] but reports the source and lets the caller
/// disable mapping altogether.
pub fn resolve_alignment(
    obs: &Observation,
    eps: f64,
    mapping_enabled: bool,
) -> Result<ResolvedAlignment, RecordError> {
    match obs.supplied_alignment() {
        SuppliedAlignment::Value(a) => Ok(ResolvedAlignment {
            alignment: clamp(a, eps),
            source: AlignmentSource::Supplied,
        }),
        SuppliedAlignment::Invalid(raw) => Err(RecordError::InvalidAlignment { raw }),
        SuppliedAlignment::Absent | SuppliedAlignment::NotAvailable => {
            if !mapping_enabled {
                return Err(NoMapperError { selector: None }.into());
            }
            let (kind, alignment) = apply_mapper(obs, eps)?;
            Ok(ResolvedAlignment {
                alignment,
                source: AlignmentSource::Mapped(kind),
            })
        }
    }
}

/// Magnitude of an observation: `m` when present, else `actual` for the
/// residual mapper.
#[must_use]
pub fn magnitude_of(obs: &Observation) -> Option<f64> {
    obs.magnitude().or_else(|| {
        let residual = obs.selector().as_deref().and_then(MapperKind::from_selector)
            == Some(MapperKind::Residual);
        if residual {
            obs.field("actual").and_then(FieldValue::as_f64)
        } else {
            None
        }
    })
}
