//! Trend alerts over a completed entity series.
//!
//! Two rules, both read-only:
//! - `degrade_2of3`: in every window of three consecutive confirmed-band
//!   ranks, at least two of the three pairwise comparisons are strict drops.
//! - `slope_7d`: the average daily alignment change over the last eight
//!   records is at or below a threshold.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::{FusedRecord, round4};

/// Default `slope_7d` threshold (per day).
pub const DEFAULT_SLOPE_THRESHOLD: f64 = -0.02;

const SLOPE_SPAN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertRule {
    #[serde(rename = "degrade_2of3")]
    Degrade2of3,
    #[serde(rename = "slope_7d")]
    Slope7d,
}

impl AlertRule {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Degrade2of3 => "degrade_2of3",
            Self::Slope7d => "slope_7d",
        }
    }
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A fired alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub time: NaiveDate,
    pub entity: String,
    pub rule: AlertRule,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Count strict drops in a rank window `(r0, r1, r2)`.
#[must_use]
pub fn window_drops(r0: u8, r1: u8, r2: u8) -> u8 {
    u8::from(r1 < r0) + u8::from(r2 < r1) + u8::from(r2 < r0)
}

/// `(a_last - a_{-8}) / 7` when the series holds at least eight records.
#[must_use]
pub fn slope_7d(series: &[FusedRecord]) -> Option<f64> {
    if series.len() < SLOPE_SPAN + 1 {
        return None;
    }
    let first = &series[series.len() - SLOPE_SPAN - 1];
    let last = &series[series.len() - 1];
    Some((last.alignment - first.alignment) / SLOPE_SPAN as f64)
}

/// Evaluate both rules on one entity's time-sorted series.
#[must_use]
pub fn compute_alerts(series: &[FusedRecord], slope_threshold: f64) -> Vec<AlertEvent> {
    let mut alerts: Vec<AlertEvent> = series
        .windows(3)
        .filter(|w| {
            window_drops(
                w[0].band_confirmed.rank(),
                w[1].band_confirmed.rank(),
                w[2].band_confirmed.rank(),
            ) >= 2
        })
        .map(|w| AlertEvent {
            time: w[2].time,
            entity: w[2].entity.clone(),
            rule: AlertRule::Degrade2of3,
            value: None,
        })
        .collect();

    if let (Some(slope), Some(last)) = (slope_7d(series), series.last()) {
        if slope <= slope_threshold {
            alerts.push(AlertEvent {
                time: last.time,
                entity: last.entity.clone(),
                rule: AlertRule::Slope7d,
                value: Some(round4(slope)),
            });
        }
    }
    alerts
}
