//! Alignment auditing core for SSM-Audit.
//!
//! Noisy operational signals are mapped onto a bounded alignment in
//! (-1, +1), classified into five confidence bands, smoothed over time with
//! directional hysteresis and combined in rapidity (`atanh`) space.
//!
//! # Architecture
//!
//! - **Observations** (`observation`): source-agnostic raw records keyed by entity and date
//! - **Mappers** (`mapper`): coverage, agreement and residual signals to raw alignment
//! - **Bands** (`band`): clamp and five-way classification
//! - **Hysteresis** (`hysteresis`): explicit promote/demote fold over a series
//! - **Fusion** (`fusion`): weighted rapidity mean, pairwise and portfolio
//! - **Alerts** (`alerts`): `degrade_2of3` and `slope_7d` trend rules
//! - **Policy** (`policy`) and **fingerprint** (`fingerprint`): knobs and their canonical hash
//! - **Pipeline** (`pipeline`): one full run from raw records to fused rows
//! - **Metrics** (`metrics`): relaxed atomic counters per run

#![deny(unsafe_code)]

pub mod alerts;
pub mod band;
pub mod error;
pub mod fingerprint;
pub mod fusion;
pub mod hysteresis;
pub mod mapper;
pub mod metrics;
pub mod observation;
pub mod pipeline;
pub mod policy;
pub mod record;

pub use alerts::{AlertEvent, AlertRule, compute_alerts};
pub use band::{Band, BandCuts, clamp, classify};
pub use error::{AuditError, FusionError, MappingError, NoMapperError, PolicyError, RecordError};
pub use fingerprint::{canonical_policy_json, fingerprint};
pub use fusion::{WeightedAlignment, fuse};
pub use hysteresis::{HysteresisState, Transition, advance};
pub use mapper::{MapperKind, map_alignment};
pub use metrics::{AuditMetrics, MetricsSnapshot};
pub use observation::{FieldValue, Observation, RawRecord, raw_record};
pub use pipeline::{
    AuditRun, DiagnosticAction, Fallback, MappingMode, PORTFOLIO_ENTITY, PortfolioSpec,
    RecordDiagnostic, RunOptions, RunOutput,
};
pub use policy::{HashAlg, Policy};
pub use record::{EntitySeries, FusedRecord};
