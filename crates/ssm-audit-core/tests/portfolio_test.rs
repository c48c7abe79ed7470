//! Integration test: portfolio roll-up and worker fan-out.
//!
//! Validates that:
//! 1. Portfolio rows fuse every entity of a day with uniform weights.
//! 2. The entity filter restricts contributors; reserved rows never contribute.
//! 3. Parallel and sequential runs produce identical output.
//!
//! Run: cargo test -p ssm-audit-core --test portfolio_test

use ssm_audit_core::{
    AuditRun, Band, FieldValue, PORTFOLIO_ENTITY, Policy, PortfolioSpec, RawRecord, RunOptions,
    raw_record,
};

fn with_alignment(entity: &str, time: &str, a: f64) -> RawRecord {
    let mut r = raw_record([("entity", entity), ("time", time)]);
    r.insert("a".into(), FieldValue::Number(a));
    r
}

fn fixture() -> Vec<RawRecord> {
    vec![
        with_alignment("Revenue", "2025-01-01", 0.7),
        with_alignment("AR", "2025-01-01", 0.4),
        with_alignment("Refunds", "2025-01-01", -0.1),
        with_alignment("Revenue", "2025-01-02", 0.72),
        with_alignment("AR", "2025-01-02", 0.35),
        with_alignment(PORTFOLIO_ENTITY, "2025-01-01", 0.99),
    ]
}

fn rapidity_mean(values: &[f64]) -> f64 {
    (values.iter().map(|a| a.atanh()).sum::<f64>() / values.len() as f64).tanh()
}

#[test]
fn portfolio_over_all_entities() {
    let out = AuditRun::new(
        Policy::default(),
        RunOptions::default().with_portfolio(PortfolioSpec::all()),
    )
    .run(fixture())
    .unwrap();

    assert_eq!(out.portfolio.len(), 2);
    let day1 = &out.portfolio[0];
    assert_eq!(day1.entity, PORTFOLIO_ENTITY);
    assert!((day1.alignment - rapidity_mean(&[0.7, 0.4, -0.1])).abs() < 1e-12);
    assert_eq!(day1.band_raw, day1.band_confirmed);
    assert_eq!(day1.band_raw, ssm_audit_core::classify(day1.alignment));
    assert!((out.portfolio[1].alignment - rapidity_mean(&[0.72, 0.35])).abs() < 1e-12);
    assert_eq!(out.metrics.portfolio_days, 2);
}

#[test]
fn portfolio_filter_limits_contributors() {
    let out = AuditRun::new(
        Policy::default(),
        RunOptions::default().with_portfolio(PortfolioSpec::from_filter("'Revenue', \"AR\"")),
    )
    .run(fixture())
    .unwrap();
    assert!((out.portfolio[0].alignment - rapidity_mean(&[0.7, 0.4])).abs() < 1e-12);
    assert_eq!(out.portfolio[0].band_confirmed, Band::Aligned);
}

#[test]
fn filter_naming_only_unknown_entities_yields_nothing() {
    let out = AuditRun::new(
        Policy::default(),
        RunOptions::default().with_portfolio(PortfolioSpec::from_filter("Inventory")),
    )
    .run(fixture())
    .unwrap();
    assert!(out.portfolio.is_empty());
    assert_eq!(out.records.len(), 5);
}

#[test]
fn reserved_rows_pass_through_without_portfolio() {
    let out = AuditRun::new(Policy::default(), RunOptions::default())
        .run(fixture())
        .unwrap();
    assert!(out.portfolio.is_empty());
    assert!(out.records.iter().any(|r| r.entity == PORTFOLIO_ENTITY));
}

#[test]
fn parallel_matches_sequential() {
    let mut records = Vec::new();
    for e in 0..24 {
        for d in 1..=20 {
            let a = (f64::from(e) * 0.37 + f64::from(d) * 0.11).sin() * 0.95;
            records.push(with_alignment(&format!("K{e:02}"), &format!("2025-04-{d:02}"), a));
        }
    }
    let options = RunOptions::default()
        .with_run_id("fanout")
        .with_portfolio(PortfolioSpec::all());
    let sequential = AuditRun::new(Policy::default(), options.clone().with_workers(1))
        .run(records.clone())
        .unwrap();
    let parallel = AuditRun::new(Policy::default(), options.with_workers(6))
        .run(records)
        .unwrap();
    assert_eq!(sequential, parallel);
    assert_eq!(sequential.records.len(), 24 * 20);
    assert_eq!(sequential.portfolio.len(), 20);
}
