//! Record loading and JSONL persistence.
//!
//! Input is either a JSON array of flat objects or JSONL (one object per
//! line). Values may be strings, numbers, booleans or null; nested values are
//! rejected. Keys are trimmed.

use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use ssm_audit_core::observation::keys;
use ssm_audit_core::{FieldValue, RawRecord};

use crate::error::HarnessError;

/// Load raw records from a JSON array or JSONL file.
pub fn load_records(path: &Path) -> Result<Vec<RawRecord>, HarnessError> {
    let content = std::fs::read_to_string(path)?;
    parse_records(&content, path)
}

/// Parse records from text; `origin` is used in error messages only.
pub fn parse_records(content: &str, origin: &Path) -> Result<Vec<RawRecord>, HarnessError> {
    if content.trim_start().starts_with('[') {
        let values: Vec<serde_json::Value> = serde_json::from_str(content)?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, v)| to_record(v, origin, i + 1))
            .collect();
    }

    let mut out = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| HarnessError::RecordShape {
                path: origin.to_path_buf(),
                line: i + 1,
                message: format!("invalid JSON: {e}"),
            })?;
        out.push(to_record(value, origin, i + 1)?);
    }
    Ok(out)
}

fn to_record(value: serde_json::Value, origin: &Path, line: usize) -> Result<RawRecord, HarnessError> {
    let shape = |message: String| HarnessError::RecordShape {
        path: origin.to_path_buf(),
        line,
        message,
    };
    let serde_json::Value::Object(map) = value else {
        return Err(shape("expected a JSON object".to_string()));
    };
    let mut record = RawRecord::new();
    for (key, v) in map {
        let field = match v {
            serde_json::Value::String(s) => FieldValue::Text(s),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(x) => FieldValue::Number(x),
                None => FieldValue::Text(n.to_string()),
            },
            serde_json::Value::Bool(b) => FieldValue::Text(b.to_string()),
            serde_json::Value::Null => FieldValue::Text(String::new()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return Err(shape(format!("field '{key}' must be a scalar")));
            }
        };
        record.insert(key.trim().to_string(), field);
    }
    Ok(record)
}

/// Give every record without a usable `time` the date `today`.
///
/// Returns how many records were filled.
pub fn fill_missing_time(records: &mut [RawRecord], today: NaiveDate) -> usize {
    let stamp = today.format("%Y-%m-%d").to_string();
    let mut filled = 0;
    for record in records.iter_mut() {
        let blank = record
            .get(keys::TIME)
            .is_none_or(|v| v.as_text().is_empty());
        if blank {
            record.insert(keys::TIME.to_string(), FieldValue::Text(stamp.clone()));
            filled += 1;
        }
    }
    filled
}

#[must_use]
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Parse a `YYYY-MM-DD` command-line date.
pub fn parse_cli_date(raw: &str) -> Result<NaiveDate, HarnessError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HarnessError::InvalidDate(raw.to_string()))
}

/// Write rows as JSONL; returns the row count.
pub fn write_jsonl<'a, T, I>(path: &Path, rows: I) -> Result<usize, HarnessError>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let file = std::fs::File::create(path)?;
    let mut w = BufWriter::new(file);
    let mut n = 0;
    for row in rows {
        serde_json::to_writer(&mut w, row)?;
        w.write_all(b"\n")?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// Read a JSONL file of typed rows.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, HarnessError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(HarnessError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> &'static Path {
        Path::new("inline.jsonl")
    }

    #[test]
    fn parses_jsonl_with_mixed_scalars() {
        let text = r#"
{"kpi": "AR", "time": "2025-01-01", " q ": 0.9, "mapper": "coverage", "flag": true, "a": null}

{"kpi": "AR", "time": "2025-01-02", "q": "0.91"}
"#;
        let records = parse_records(text, origin()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["q"], FieldValue::Number(0.9));
        assert_eq!(records[0]["flag"], FieldValue::Text("true".into()));
        assert_eq!(records[0]["a"], FieldValue::Text(String::new()));
        assert_eq!(records[1]["q"], FieldValue::Text("0.91".into()));
    }

    #[test]
    fn parses_json_array() {
        let text = r#"[{"entity":"x","time":"2025-01-01","a":0.2},{"entity":"y","a":0.1}]"#;
        let records = parse_records(text, origin()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["entity"], FieldValue::Text("y".into()));
    }

    #[test]
    fn rejects_nested_values_with_line_number() {
        let text = "{\"entity\":\"x\"}\n{\"entity\":{\"nested\":1}}\n";
        match parse_records(text, origin()) {
            Err(HarnessError::RecordShape { line, message, .. }) => {
                assert_eq!(line, 2);
                assert!(message.contains("entity"));
            }
            other => panic!("expected shape error, got {other:?}"),
        }
        assert!(matches!(
            parse_records("[1, 2]", origin()),
            Err(HarnessError::RecordShape { line: 1, .. })
        ));
    }

    #[test]
    fn fills_only_blank_times() {
        let mut records = parse_records(
            r#"[{"entity":"x"},{"entity":"y","time":""},{"entity":"z","time":"2024-12-31"}]"#,
            origin(),
        )
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(fill_missing_time(&mut records, today), 2);
        assert_eq!(records[0]["time"], FieldValue::Text("2025-06-01".into()));
        assert_eq!(records[2]["time"], FieldValue::Text("2024-12-31".into()));
    }

    #[test]
    fn cli_dates_are_strict() {
        assert_eq!(
            parse_cli_date("2025-02-03").unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 3).unwrap()
        );
        assert!(matches!(
            parse_cli_date("Feb 3"),
            Err(HarnessError::InvalidDate(_))
        ));
    }
}
