//! Run execution: core pipeline plus run log and JSONL persistence.

use std::path::PathBuf;
use std::time::Instant;

use ssm_audit_core::{
    AuditRun, DiagnosticAction, PORTFOLIO_ENTITY, Policy, RawRecord, RecordDiagnostic,
    RunOptions, RunOutput,
};

use crate::error::HarnessError;
use crate::records::write_jsonl;
use crate::structured_log::{LogEmitter, LogLevel, Outcome};

/// Where a run's artifacts go.
#[derive(Debug, Clone, Default)]
pub struct OutputPaths {
    /// Entity rows followed by portfolio rows.
    pub output: PathBuf,
    pub alerts: Option<PathBuf>,
    /// Portfolio rows only.
    pub portfolio: Option<PathBuf>,
}

/// Row counts written by [`write_outputs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub alerts: usize,
    pub portfolio: usize,
}

/// Executes an [`AuditRun`] and narrates it into a [`LogEmitter`].
pub struct AuditRunner {
    run: AuditRun,
}

impl AuditRunner {
    #[must_use]
    pub fn new(policy: Policy, options: RunOptions) -> Self {
        Self {
            run: AuditRun::new(policy, options),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run.options().run_id
    }

    /// Run the pipeline, logging `run_start`, diagnostics, alerts and
    /// `run_complete`.
    pub fn execute(
        &self,
        records: Vec<RawRecord>,
        log: &mut LogEmitter,
    ) -> Result<RunOutput, HarnessError> {
        let fingerprint = ssm_audit_core::fingerprint(self.run.policy());
        let started = Instant::now();

        let entry = log
            .entry(LogLevel::Info, "run_start")
            .with_fingerprint(&fingerprint)
            .with_details(serde_json::json!({
                "records": records.len(),
                "policy": serde_json::to_value(self.run.policy())?,
                "workers": self.run.options().workers,
            }));
        log.emit_entry(entry)?;

        let output = match self.run.run(records) {
            Ok(output) => output,
            Err(err) => {
                let entry = log
                    .entry(LogLevel::Error, "run_complete")
                    .with_fingerprint(&fingerprint)
                    .with_outcome(Outcome::Fail)
                    .with_duration_ms(elapsed_ms(started))
                    .with_details(serde_json::json!({ "error": err.to_string() }));
                log.emit_entry(entry)?;
                log.flush()?;
                return Err(err.into());
            }
        };

        for diagnostic in &output.diagnostics {
            log_diagnostic(log, diagnostic)?;
        }

        for alert in &output.alerts {
            let mut entry = log
                .entry(LogLevel::Warn, "alert")
                .with_entity(&alert.entity, Some(alert.time))
                .with_rule(alert.rule.tag());
            if let Some(value) = alert.value {
                entry = entry.with_details(serde_json::json!({ "value": value }));
            }
            log.emit_entry(entry)?;
        }

        let entry = log
            .entry(LogLevel::Info, "run_complete")
            .with_fingerprint(&output.fingerprint)
            .with_outcome(Outcome::Pass)
            .with_duration_ms(elapsed_ms(started))
            .with_details(serde_json::json!({
                "records": output.records.len(),
                "portfolio": output.portfolio.len(),
                "alerts": output.alerts.len(),
                "metrics": serde_json::to_value(&output.metrics)?,
            }));
        log.emit_entry(entry)?;
        log.flush()?;

        Ok(output)
    }
}

fn log_diagnostic(log: &mut LogEmitter, diagnostic: &RecordDiagnostic) -> Result<(), HarnessError> {
    let outcome = match diagnostic.action {
        DiagnosticAction::Neutral => Outcome::Neutral,
        DiagnosticAction::Skipped => Outcome::Skipped,
    };
    let mut entry = log
        .entry(LogLevel::Warn, "record_diagnostic")
        .with_outcome(outcome)
        .with_details(serde_json::json!({
            "index": diagnostic.index,
            "error": diagnostic.error.to_string(),
        }));
    if let Some(entity) = &diagnostic.entity {
        entry = entry.with_entity(entity, diagnostic.time);
    }
    log.emit_entry(entry)?;
    Ok(())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Persist a run's rows, alerts and portfolio series.
pub fn write_outputs(output: &RunOutput, paths: &OutputPaths) -> Result<WriteSummary, HarnessError> {
    let mut summary = WriteSummary {
        rows: write_jsonl(&paths.output, output.rows())?,
        ..WriteSummary::default()
    };
    if let Some(path) = &paths.alerts {
        summary.alerts = write_jsonl(path, &output.alerts)?;
    }
    if let Some(path) = &paths.portfolio {
        summary.portfolio = write_jsonl(path, &output.portfolio)?;
    }
    Ok(summary)
}

/// Console summary: latest record per entity, the portfolio, the fingerprint.
#[must_use]
pub fn summary_lines(output: &RunOutput) -> Vec<String> {
    let mut lines: Vec<String> = output
        .latest_by_entity()
        .into_iter()
        .map(|(entity, r)| {
            format!(
                "{entity}: m={}, a={}, band={}, band_hyst={}",
                r.magnitude,
                r.alignment_display(),
                r.band_raw.label(),
                r.band_confirmed.label(),
            )
        })
        .collect();
    if let Some(sdi) = output.latest_portfolio() {
        lines.push(format!(
            "{PORTFOLIO_ENTITY}: a={}, band={}, band_hyst={}",
            sdi.alignment_display(),
            sdi.band_raw.label(),
            sdi.band_confirmed.label(),
        ));
    }
    lines.push(format!("knobs_hash: {}", output.fingerprint));
    lines
}
