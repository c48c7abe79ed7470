//! Raw records and parsed observations.
//!
//! The core is source-agnostic: a raw record is a flat mapping of trimmed
//! field names to strings or numbers. [`Observation::from_record`] pulls out
//! the keying fields (entity, date) and keeps the rest for alignment
//! resolution.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// Field names understood by the core.
pub mod keys {
    pub const ENTITY: &str = "entity";
    pub const ENTITY_ALIAS: &str = "kpi";
    pub const TIME: &str = "time";
    pub const ALIGNMENT: &str = "a";
    pub const ALIGNMENT_ALIAS: &str = "alignment";
    pub const MAGNITUDE: &str = "m";
    pub const MAGNITUDE_ALIAS: &str = "magnitude";
    pub const MAPPER: &str = "mapper";
    pub const WEIGHT: &str = "weight";
}

/// A single field value as handed over by the I/O layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view: numbers as-is, text parsed after trimming.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// True for an empty string or an explicit `na` marker.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(_) => false,
            Self::Text(s) => {
                let t = s.trim();
                t.is_empty() || t.eq_ignore_ascii_case("na")
            }
        }
    }

    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(v) => v.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

pub type RawRecord = BTreeMap<String, FieldValue>;

/// Build a raw record from `(key, value)` pairs, trimming keys.
pub fn raw_record<K, V, I>(pairs: I) -> RawRecord
where
    K: AsRef<str>,
    V: Into<FieldValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.as_ref().trim().to_string(), v.into()))
        .collect()
}

/// State of the alignment slot of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppliedAlignment {
    Absent,
    NotAvailable,
    Value(f64),
    Invalid(String),
}

/// One keyed input event.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub entity: String,
    pub time: NaiveDate,
    pub fields: RawRecord,
}

impl Observation {
    #[must_use]
    pub fn new(entity: impl Into<String>, time: NaiveDate, fields: RawRecord) -> Self {
        Self {
            entity: entity.into(),
            time,
            fields,
        }
    }

    /// Extract entity and date from a raw record.
    pub fn from_record(record: RawRecord) -> Result<Self, RecordError> {
        let entity = first_present(&record, &[keys::ENTITY, keys::ENTITY_ALIAS])
            .map(FieldValue::as_text)
            .filter(|s| !s.is_empty())
            .ok_or(RecordError::MissingEntity)?;
        let raw_time = record
            .get(keys::TIME)
            .map(FieldValue::as_text)
            .filter(|s| !s.is_empty())
            .ok_or(RecordError::MissingTime)?;
        let time = parse_date(&raw_time).ok_or(RecordError::InvalidTime { raw: raw_time })?;
        Ok(Self {
            entity,
            time,
            fields: record,
        })
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn supplied_alignment(&self) -> SuppliedAlignment {
        match first_present(&self.fields, &[keys::ALIGNMENT, keys::ALIGNMENT_ALIAS]) {
            None => SuppliedAlignment::Absent,
            Some(v) if v.is_blank() => SuppliedAlignment::NotAvailable,
            Some(v) => match v.as_f64().filter(|a| a.is_finite()) {
                Some(a) => SuppliedAlignment::Value(a),
                None => SuppliedAlignment::Invalid(v.as_text()),
            },
        }
    }

    /// Trimmed, lower-cased mapper selector, if any.
    #[must_use]
    pub fn selector(&self) -> Option<String> {
        self.fields
            .get(keys::MAPPER)
            .map(|v| v.as_text().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn magnitude(&self) -> Option<f64> {
        first_present(&self.fields, &[keys::MAGNITUDE, keys::MAGNITUDE_ALIAS])
            .and_then(FieldValue::as_f64)
    }

    /// Fusion weight; absent, non-numeric or non-finite weights count as 1.0.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.fields
            .get(keys::WEIGHT)
            .and_then(FieldValue::as_f64)
            .filter(|w| w.is_finite())
            .unwrap_or(1.0)
    }

    /// Canonical JSON of the field map, used only as a sort key.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(&self.fields).unwrap_or_default()
    }
}

fn first_present<'a>(record: &'a RawRecord, names: &[&str]) -> Option<&'a FieldValue> {
    names.iter().find_map(|n| record.get(*n))
}

/// Parse `YYYY-MM-DD` or an ISO date-time (with or without offset) to a date.
#[must_use]
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    // Offsets are dropped, keeping the wall-clock date of the source.
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local().date());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_plain_and_timestamped_dates() {
        assert_eq!(parse_date("2025-03-01"), Some(date(2025, 3, 1)));
        assert_eq!(parse_date(" 2025-03-01T12:30:00 "), Some(date(2025, 3, 1)));
        assert_eq!(parse_date("2025-03-01T23:30:00Z"), Some(date(2025, 3, 1)));
        assert_eq!(parse_date("2025-03-01T23:30:00-05:00"), Some(date(2025, 3, 1)));
        assert_eq!(parse_date("03/01/2025"), None);
    }

    #[test]
    fn from_record_accepts_kpi_alias() {
        let rec = raw_record([("kpi", "Revenue"), ("time", "2025-01-02")]);
        let obs = Observation::from_record(rec).unwrap();
        assert_eq!(obs.entity, "Revenue");
        assert_eq!(obs.time, date(2025, 1, 2));
    }

    #[test]
    fn from_record_requires_entity_and_time() {
        let no_entity = raw_record([("time", "2025-01-02")]);
        assert_eq!(
            Observation::from_record(no_entity),
            Err(RecordError::MissingEntity)
        );
        let no_time = raw_record([("entity", "x")]);
        assert_eq!(Observation::from_record(no_time), Err(RecordError::MissingTime));
        let bad_time = raw_record([("entity", "x"), ("time", "yesterday")]);
        assert_eq!(
            Observation::from_record(bad_time),
            Err(RecordError::InvalidTime {
                raw: "yesterday".to_string()
            })
        );
    }

    #[test]
    fn supplied_alignment_states() {
        let mk = |v: FieldValue| {
            let mut rec = raw_record([("entity", "e"), ("time", "2025-01-01")]);
            rec.insert("a".to_string(), v);
            Observation::from_record(rec).unwrap().supplied_alignment()
        };
        assert_eq!(mk(0.4.into()), SuppliedAlignment::Value(0.4));
        assert_eq!(mk(" 0.25 ".into()), SuppliedAlignment::Value(0.25));
        assert_eq!(mk("NA".into()), SuppliedAlignment::NotAvailable);
        assert_eq!(mk("".into()), SuppliedAlignment::NotAvailable);
        assert_eq!(mk("high".into()), SuppliedAlignment::Invalid("high".into()));

        let bare = Observation::from_record(raw_record([("entity", "e"), ("time", "2025-01-01")]))
            .unwrap();
        assert_eq!(bare.supplied_alignment(), SuppliedAlignment::Absent);
    }

    #[test]
    fn weight_defaults_to_one() {
        let mk = |w: Option<FieldValue>| {
            let mut rec = raw_record([("entity", "e"), ("time", "2025-01-01")]);
            if let Some(w) = w {
                rec.insert("weight".to_string(), w);
            }
            Observation::from_record(rec).unwrap().weight()
        };
        assert_eq!(mk(None), 1.0);
        assert_eq!(mk(Some("heavy".into())), 1.0);
        assert_eq!(mk(Some(f64::NAN.into())), 1.0);
        assert_eq!(mk(Some("2".into())), 2.0);
        assert_eq!(mk(Some(0.0.into())), 0.0);
    }

    #[test]
    fn selector_is_trimmed_and_lowercased() {
        let rec = raw_record([("entity", "e"), ("time", "2025-01-01"), ("mapper", " Coverage ")]);
        let obs = Observation::from_record(rec).unwrap();
        assert_eq!(obs.selector().as_deref(), Some("coverage"));
    }

    #[test]
    fn untagged_field_values_deserialize() {
        let rec: RawRecord = serde_json::from_str(r#"{"a":0.5,"entity":"x"}"#).unwrap();
        assert_eq!(rec["a"], FieldValue::Number(0.5));
        assert_eq!(rec["entity"], FieldValue::Text("x".into()));
    }
}
