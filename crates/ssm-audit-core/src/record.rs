//! Fused output rows and per-entity series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::band::Band;

/// One fused `(entity, date)` result after hysteresis.
///
/// Serialized with the short column names of the audit output
/// (`m`, `a`, `band`, `band_hyst`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedRecord {
    pub time: NaiveDate,
    pub entity: String,
    #[serde(rename = "m")]
    pub magnitude: f64,
    #[serde(rename = "a")]
    pub alignment: f64,
    #[serde(rename = "band")]
    pub band_raw: Band,
    #[serde(rename = "band_hyst")]
    pub band_confirmed: Band,
    pub fingerprint: String,
    pub run_id: String,
}

impl FusedRecord {
    /// Alignment rounded to four decimals for display.
    #[must_use]
    pub fn alignment_display(&self) -> String {
        format!("{:.4}", self.alignment)
    }
}

/// Time-ordered records of a single entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySeries {
    pub entity: String,
    pub records: Vec<FusedRecord>,
}

impl EntitySeries {
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            records: Vec::new(),
        }
    }

    /// Append a record; callers feed records in ascending date order.
    pub fn push(&mut self, record: FusedRecord) {
        debug_assert!(
            self.records.last().is_none_or(|prev| prev.time < record.time),
            "series must be strictly date-ordered"
        );
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&FusedRecord> {
        self.records.last()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[FusedRecord] {
        &self.records
    }
}

/// Round to four decimals.
#[must_use]
pub fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(day: u32, a: f64) -> FusedRecord {
        FusedRecord {
            time: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            entity: "Revenue".into(),
            magnitude: 1.0e6,
            alignment: a,
            band_raw: Band::Aligned,
            band_confirmed: Band::Neutral,
            fingerprint: "ab".into(),
            run_id: "r1".into(),
        }
    }

    #[test]
    fn serializes_with_short_columns() {
        let json = serde_json::to_value(rec(3, 0.5)).unwrap();
        assert_eq!(json["time"], "2025-01-03");
        assert_eq!(json["a"], 0.5);
        assert_eq!(json["band"], "A+");
        assert_eq!(json["band_hyst"], "A0");
        assert_eq!(json["m"], 1.0e6);
    }

    #[test]
    fn display_alignment_has_four_decimals() {
        assert_eq!(rec(1, 0.664_036_77).alignment_display(), "0.6640");
        assert_eq!(round4(-0.033_36), -0.0334);
    }

    #[test]
    fn series_keeps_insertion_order() {
        let mut s = EntitySeries::new("Revenue");
        assert!(s.is_empty());
        s.push(rec(1, 0.1));
        s.push(rec(2, 0.2));
        assert_eq!(s.len(), 2);
        assert_eq!(s.last().map(|r| r.alignment), Some(0.2));
    }
}
