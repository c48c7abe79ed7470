//! Built-in three-entity sample.
//!
//! - `Revenue_actual`: forecast residual on a ramp with one mid-curve miss.
//! - `AR_collected_issued`: coverage that eases, then recovers.
//! - `Refunds_agreement`: two refund-rate sources that drift apart, then re-align.
//!
//! Records carry mapper inputs rather than alignments, so a demo run goes
//! through the mapper layer.

use chrono::{Days, NaiveDate};
use ssm_audit_core::{FieldValue, RawRecord};

pub const REVENUE: &str = "Revenue_actual";
pub const RECEIVABLES: &str = "AR_collected_issued";
pub const REFUNDS: &str = "Refunds_agreement";

pub const DEFAULT_DAYS: u32 = 10;

const RESIDUAL_SCALE: f64 = 50_000.0;
const RESIDUAL_SHARPNESS: f64 = 1.2;
const REFUND_TOLERANCE: f64 = 0.005;
const COVERAGE_START: f64 = 0.88;
const RECEIVABLES_MAGNITUDE: f64 = 0.96;

fn record(entity: &str, time: &str, mapper: &str, fields: &[(&str, f64)]) -> RawRecord {
    let mut r = RawRecord::new();
    r.insert("kpi".into(), FieldValue::Text(entity.into()));
    r.insert("time".into(), FieldValue::Text(time.into()));
    r.insert("mapper".into(), FieldValue::Text(mapper.into()));
    for &(k, v) in fields {
        r.insert(k.into(), FieldValue::Number(v));
    }
    r
}

/// Demo records for `days` consecutive days from `start`.
#[must_use]
pub fn demo_records(start: NaiveDate, days: u32) -> Vec<RawRecord> {
    let mut out = Vec::new();
    for i in 0..days {
        let Some(day) = start.checked_add_days(Days::new(u64::from(i))) else {
            break;
        };
        let t = day.format("%Y-%m-%d").to_string();
        let x = f64::from(i);

        let forecast = 1_000_000.0 + 30_000.0 * x;
        let miss = match i {
            6 => 20_000.0,
            0..=2 => -10_000.0,
            _ => 5_000.0,
        };
        let actual = forecast + miss;
        out.push(record(
            REVENUE,
            &t,
            "residual",
            &[
                ("actual", actual),
                ("forecast", forecast),
                ("s", RESIDUAL_SCALE),
                ("k", RESIDUAL_SHARPNESS),
                ("m", actual),
            ],
        ));

        let q = if i < 3 {
            COVERAGE_START + 0.01 * x
        } else {
            COVERAGE_START + 0.03 - 0.008 * (x - 3.0)
        };
        out.push(record(
            RECEIVABLES,
            &t,
            "coverage",
            &[("q", q.clamp(0.0, 1.0)), ("m", RECEIVABLES_MAGNITUDE)],
        ));

        let platform = 0.021 + 0.0002 * x;
        let bank = 0.020 + if i < 5 { 0.0004 * x } else { 0.00005 * x };
        out.push(record(
            REFUNDS,
            &t,
            "agreement",
            &[
                ("m1", platform),
                ("m2", bank),
                ("b", REFUND_TOLERANCE),
                ("m", platform),
            ],
        ));
    }
    out
}
