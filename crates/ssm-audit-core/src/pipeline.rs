//! End-to-end audit run.
//!
//! ```text
//! raw records ─► observations ─► alignment (supplied | mapped | fallback)
//!             ─► (entity, date) multi-map ─► rapidity fusion
//!             ─► per-entity hysteresis fold ─► alerts
//!             ─► [join] ─► optional portfolio roll-up
//! ```
//!
//! Policy validation and fingerprinting happen before any record is read;
//! a fatal error leaves no partial output. Per-record problems become
//! [`RecordDiagnostic`]s and never abort the run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::alerts::{AlertEvent, compute_alerts};
use crate::error::{AuditError, RecordError};
use crate::fingerprint::fingerprint;
use crate::fusion::{WeightedAlignment, fuse, fuse_portfolio};
use crate::hysteresis::{HysteresisState, Transition};
use crate::mapper::{AlignmentSource, magnitude_of, resolve_alignment};
use crate::metrics::{AuditMetrics, MetricsSnapshot};
use crate::observation::{Observation, RawRecord, keys};
use crate::policy::Policy;
use crate::record::{EntitySeries, FusedRecord};

/// Entity name reserved for portfolio rows.
pub const PORTFOLIO_ENTITY: &str = "SDI";

/// When the mapper layer is consulted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingMode {
    /// Enabled iff at least one record carries a `mapper` field.
    #[default]
    Auto,
    On,
    Off,
}

impl MappingMode {
    /// Parse from string (case-insensitive). Unknown values mean `auto`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "true" | "yes" | "always" => Self::On,
            "off" | "false" | "no" | "never" => Self::Off,
            _ => Self::Auto,
        }
    }

    #[must_use]
    pub fn enabled_for(self, records: &[RawRecord]) -> bool {
        match self {
            Self::On => true,
            Self::Off => false,
            Self::Auto => records.iter().any(|r| r.contains_key(keys::MAPPER)),
        }
    }
}

/// What happens to an observation whose alignment cannot be resolved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// Substitute alignment 0.0 and keep the observation.
    #[default]
    Neutral,
    /// Drop the observation.
    Skip,
}

impl Fallback {
    /// Parse from string (case-insensitive). Unknown values mean `neutral`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "drop" => Self::Skip,
            _ => Self::Neutral,
        }
    }
}

/// Portfolio roll-up settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortfolioSpec {
    /// Entities to include; empty means all.
    pub entities: BTreeSet<String>,
}

impl PortfolioSpec {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a comma-separated filter such as `"Revenue", 'AR' , Refunds`.
    #[must_use]
    pub fn from_filter(filter: &str) -> Self {
        Self {
            entities: filter
                .split(',')
                .map(normalize_entity)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn includes(&self, entity: &str) -> bool {
        let entity = normalize_entity(entity);
        entity != PORTFOLIO_ENTITY && (self.entities.is_empty() || self.entities.contains(entity))
    }
}

fn normalize_entity(name: &str) -> &str {
    name.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

/// Caller-supplied run settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub run_id: String,
    pub mapping: MappingMode,
    pub fallback: Fallback,
    pub portfolio: Option<PortfolioSpec>,
    /// Worker threads for the per-entity pass; 0 and 1 both mean sequential.
    pub workers: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run_id: String::new(),
            mapping: MappingMode::Auto,
            fallback: Fallback::Neutral,
            portfolio: None,
            workers: 1,
        }
    }
}

impl RunOptions {
    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: MappingMode) -> Self {
        self.mapping = mapping;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    #[must_use]
    pub fn with_portfolio(mut self, portfolio: PortfolioSpec) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticAction {
    /// Observation kept with alignment 0.0.
    Neutral,
    /// Observation dropped.
    Skipped,
}

impl fmt::Display for DiagnosticAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neutral => "neutral",
            Self::Skipped => "skipped",
        })
    }
}

/// A recoverable per-record error and what was done about it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDiagnostic {
    /// Position of the record in the input.
    pub index: usize,
    pub entity: Option<String>,
    pub time: Option<NaiveDate>,
    pub error: RecordError,
    pub action: DiagnosticAction,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    pub fingerprint: String,
    /// Fused records, sorted by entity then date.
    pub records: Vec<FusedRecord>,
    /// Portfolio rows by date (empty unless requested).
    pub portfolio: Vec<FusedRecord>,
    pub alerts: Vec<AlertEvent>,
    pub diagnostics: Vec<RecordDiagnostic>,
    pub metrics: MetricsSnapshot,
}

impl RunOutput {
    /// Last record of every entity.
    #[must_use]
    pub fn latest_by_entity(&self) -> BTreeMap<&str, &FusedRecord> {
        let mut latest = BTreeMap::new();
        for r in &self.records {
            latest.insert(r.entity.as_str(), r);
        }
        latest
    }

    #[must_use]
    pub fn latest_portfolio(&self) -> Option<&FusedRecord> {
        self.portfolio.last()
    }

    /// Entity rows followed by portfolio rows.
    pub fn rows(&self) -> impl Iterator<Item = &FusedRecord> {
        self.records.iter().chain(self.portfolio.iter())
    }
}

/// One observation ready for fusion.
#[derive(Debug, Clone)]
struct Sibling {
    sort_key: String,
    alignment: f64,
    weight: f64,
    magnitude: Option<f64>,
}

/// Fused value of one `(entity, date)` group, before hysteresis.
#[derive(Debug, Clone, Copy)]
struct FusedPoint {
    time: NaiveDate,
    magnitude: f64,
    alignment: f64,
}

type GroupKey = (String, NaiveDate);

/// A configured audit run.
#[derive(Debug, Clone)]
pub struct AuditRun {
    policy: Policy,
    options: RunOptions,
}

impl AuditRun {
    #[must_use]
    pub fn new(policy: Policy, options: RunOptions) -> Self {
        Self { policy, options }
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run the full pipeline over `records`.
    pub fn run(&self, records: Vec<RawRecord>) -> Result<RunOutput, AuditError> {
        self.policy.validate()?;
        let fingerprint = fingerprint(&self.policy);
        let metrics = AuditMetrics::new();
        let mut diagnostics = Vec::new();

        let groups = self.collect_groups(records, &metrics, &mut diagnostics);
        let entities = self.fuse_groups(groups, &metrics)?;

        let purge_reserved = self.options.portfolio.is_some();
        let entities: Vec<(String, Vec<FusedPoint>)> = entities
            .into_iter()
            .filter(|(entity, _)| !(purge_reserved && entity == PORTFOLIO_ENTITY))
            .collect();

        let passes = self.confirm_all(entities, &fingerprint, &metrics);

        let mut records = Vec::new();
        let mut alerts = Vec::new();
        for (series, entity_alerts) in passes {
            records.extend(series.records);
            alerts.extend(entity_alerts);
        }

        let portfolio = match &self.options.portfolio {
            Some(spec) => self.portfolio_rows(spec, &records, &metrics),
            None => Vec::new(),
        };

        Ok(RunOutput {
            fingerprint,
            records,
            portfolio,
            alerts,
            diagnostics,
            metrics: metrics.snapshot(),
        })
    }

    fn collect_groups(
        &self,
        records: Vec<RawRecord>,
        metrics: &AuditMetrics,
        diagnostics: &mut Vec<RecordDiagnostic>,
    ) -> BTreeMap<GroupKey, Vec<Sibling>> {
        let mapping_enabled = self.options.mapping.enabled_for(&records);
        let mut groups: BTreeMap<GroupKey, Vec<Sibling>> = BTreeMap::new();

        for (index, record) in records.into_iter().enumerate() {
            AuditMetrics::inc(&metrics.observations);
            let obs = match Observation::from_record(record) {
                Ok(obs) => obs,
                Err(error) => {
                    AuditMetrics::inc(&metrics.recoverable_errors);
                    AuditMetrics::inc(&metrics.observations_skipped);
                    diagnostics.push(RecordDiagnostic {
                        index,
                        entity: None,
                        time: None,
                        error,
                        action: DiagnosticAction::Skipped,
                    });
                    continue;
                }
            };

            let alignment = match resolve_alignment(&obs, self.policy.eps_a, mapping_enabled) {
                Ok(resolved) => {
                    match resolved.source {
                        AlignmentSource::Supplied => {
                            AuditMetrics::inc(&metrics.alignments_supplied);
                        }
                        AlignmentSource::Mapped(_) => {
                            AuditMetrics::inc(&metrics.alignments_mapped);
                        }
                    }
                    resolved.alignment
                }
                Err(error) => {
                    AuditMetrics::inc(&metrics.recoverable_errors);
                    let action = match self.options.fallback {
                        Fallback::Neutral => DiagnosticAction::Neutral,
                        Fallback::Skip => DiagnosticAction::Skipped,
                    };
                    diagnostics.push(RecordDiagnostic {
                        index,
                        entity: Some(obs.entity.clone()),
                        time: Some(obs.time),
                        error,
                        action,
                    });
                    if action == DiagnosticAction::Skipped {
                        AuditMetrics::inc(&metrics.observations_skipped);
                        continue;
                    }
                    0.0
                }
            };

            groups
                .entry((obs.entity.clone(), obs.time))
                .or_default()
                .push(Sibling {
                    sort_key: obs.canonical_key(),
                    alignment,
                    weight: obs.weight(),
                    magnitude: magnitude_of(&obs),
                });
        }
        groups
    }

    /// Fuse every group; output is keyed by entity with dates ascending.
    fn fuse_groups(
        &self,
        groups: BTreeMap<GroupKey, Vec<Sibling>>,
        metrics: &AuditMetrics,
    ) -> Result<BTreeMap<String, Vec<FusedPoint>>, AuditError> {
        let mut by_entity: BTreeMap<String, Vec<FusedPoint>> = BTreeMap::new();
        for ((entity, time), mut siblings) in groups {
            siblings.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));
            let items: Vec<WeightedAlignment> = siblings
                .iter()
                .map(|s| WeightedAlignment::new(s.alignment, s.weight))
                .collect();
            let fused = fuse(&items, self.policy.eps_a, self.policy.eps_w).map_err(|_| {
                AuditError::EmptyFusionGroup {
                    key: format!("{entity}@{time}"),
                }
            })?;

            AuditMetrics::inc(&metrics.fused_groups);
            if siblings.len() > 1 {
                AuditMetrics::inc(&metrics.multi_sibling_groups);
            }

            let magnitude = siblings.iter().find_map(|s| s.magnitude).unwrap_or(0.0);
            by_entity.entry(entity).or_default().push(FusedPoint {
                time,
                magnitude,
                alignment: self.policy.clamp(fused),
            });
        }
        Ok(by_entity)
    }

    /// Hysteresis and alerts for every entity, fanned out across workers.
    fn confirm_all(
        &self,
        entities: Vec<(String, Vec<FusedPoint>)>,
        fingerprint: &str,
        metrics: &AuditMetrics,
    ) -> Vec<(EntitySeries, Vec<AlertEvent>)> {
        let workers = self.options.workers.max(1).min(entities.len().max(1));
        if workers == 1 {
            return entities
                .into_iter()
                .map(|(entity, points)| self.confirm_entity(entity, &points, fingerprint, metrics))
                .collect();
        }

        let chunk = entities.len().div_ceil(workers);
        std::thread::scope(|scope| {
            let handles: Vec<_> = entities
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|(entity, points)| {
                                self.confirm_entity(entity.clone(), points, fingerprint, metrics)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(out) => out,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn confirm_entity(
        &self,
        entity: String,
        points: &[FusedPoint],
        fingerprint: &str,
        metrics: &AuditMetrics,
    ) -> (EntitySeries, Vec<AlertEvent>) {
        let mut series = EntitySeries::new(entity.clone());
        let mut state = HysteresisState::new();
        for point in points {
            let step = self.policy.step(state, point.alignment);
            state = step.state;
            match step.transition {
                Transition::Promoted => AuditMetrics::inc(&metrics.promotions),
                Transition::Demoted => AuditMetrics::inc(&metrics.demotions),
                Transition::Initialized | Transition::Held => {}
            }
            series.push(FusedRecord {
                time: point.time,
                entity: entity.clone(),
                magnitude: point.magnitude,
                alignment: point.alignment,
                band_raw: step.raw,
                band_confirmed: step.confirmed,
                fingerprint: fingerprint.to_string(),
                run_id: self.options.run_id.clone(),
            });
        }
        let alerts = compute_alerts(series.as_slice(), self.policy.slope_7d);
        AuditMetrics::add(&metrics.alerts, alerts.len() as u64);
        (series, alerts)
    }

    fn portfolio_rows(
        &self,
        spec: &PortfolioSpec,
        records: &[FusedRecord],
        metrics: &AuditMetrics,
    ) -> Vec<FusedRecord> {
        let mut per_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for r in records.iter().filter(|r| spec.includes(&r.entity)) {
            per_day.entry(r.time).or_default().push(r.alignment);
        }
        let rows: Vec<FusedRecord> =
            fuse_portfolio(per_day, self.policy.eps_a, self.policy.eps_w)
                .into_iter()
                .map(|point| {
                    let alignment = self.policy.clamp(point.alignment);
                    let band = self.policy.classify(alignment);
                    FusedRecord {
                        time: point.time,
                        entity: PORTFOLIO_ENTITY.to_string(),
                        magnitude: 0.0,
                        alignment,
                        band_raw: band,
                        band_confirmed: band,
                        fingerprint: String::new(),
                        run_id: self.options.run_id.clone(),
                    }
                })
                .collect();
        AuditMetrics::add(&metrics.portfolio_days, rows.len() as u64);
        rows
    }
}
