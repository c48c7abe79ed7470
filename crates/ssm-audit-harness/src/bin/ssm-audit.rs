//! CLI entrypoint for the SSM-Audit calculator.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use ssm_audit_core::policy::{
    DEFAULT_DEMOTE, DEFAULT_EPS_A, DEFAULT_EPS_W, DEFAULT_GAMMA, DEFAULT_PROMOTE,
};
use ssm_audit_core::{
    BandCuts, Fallback, HashAlg, MappingMode, Policy, PortfolioSpec, RawRecord, RunOptions,
    alerts::DEFAULT_SLOPE_THRESHOLD, canonical_policy_json, fingerprint,
};
use ssm_audit_harness::records::{fill_missing_time, load_records, parse_cli_date, today_utc};
use ssm_audit_harness::structured_log::validate_log_file;
use ssm_audit_harness::{
    AuditRunner, LogEmitter, LogLevel, OutputPaths, demo, summary_lines, write_outputs,
};

/// Alignment auditing over operational signals.
#[derive(Debug, Parser)]
#[command(name = "ssm-audit")]
#[command(about = "Bounded alignment, bands, hysteresis and fusion for KPI series")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Audit records from a JSON or JSONL file.
    Run {
        /// Input records (JSON array or JSONL).
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Audit the built-in three-entity sample.
    Demo {
        /// Number of days to generate.
        #[arg(long, default_value_t = demo::DEFAULT_DAYS)]
        days: u32,
        /// First day (YYYY-MM-DD); today (UTC) when omitted.
        #[arg(long)]
        start: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the canonical policy document and its fingerprint.
    Fingerprint {
        #[command(flatten)]
        knobs: Knobs,
    },
    /// Validate a structured JSONL run log.
    ValidateLog {
        /// Structured JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
}

/// Policy knobs shared by every subcommand that hashes or runs a policy.
#[derive(Debug, Args)]
struct Knobs {
    /// Clamp margin for alignments.
    #[arg(long, default_value_t = DEFAULT_EPS_A)]
    eps_a: f64,
    /// Floor for fusion weight sums.
    #[arg(long, default_value_t = DEFAULT_EPS_W)]
    eps_w: f64,
    /// Fusion exponent (recorded in the fingerprint).
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    gamma: f64,
    /// Minimum alignment rise that promotes the confirmed band.
    #[arg(long, default_value_t = DEFAULT_PROMOTE, allow_hyphen_values = true)]
    promote: f64,
    /// Maximum alignment change (negative) that demotes the confirmed band.
    #[arg(long, default_value_t = DEFAULT_DEMOTE, allow_hyphen_values = true)]
    demote: f64,
    /// Weekly slope below which `slope_7d` fires.
    #[arg(long = "slope-7d", default_value_t = DEFAULT_SLOPE_THRESHOLD, allow_hyphen_values = true)]
    slope_7d: f64,
    /// Band cut points `A-,A0,A+,A++` (e.g. "0.1,0.25,0.5,0.75").
    #[arg(long, allow_hyphen_values = true)]
    cuts: Option<String>,
    /// Fingerprint hash: `sha256` (default) or `blake3`.
    #[arg(long, default_value = "sha256")]
    hash: String,
}

impl Knobs {
    fn policy(&self) -> Result<Policy, Box<dyn std::error::Error>> {
        let mut policy = Policy::default()
            .with_eps_a(self.eps_a)
            .with_eps_w(self.eps_w)
            .with_gamma(self.gamma)
            .with_hysteresis(self.promote, self.demote)
            .with_slope_7d(self.slope_7d)
            .with_hash_alg(HashAlg::from_str_loose(&self.hash));
        if let Some(raw) = &self.cuts {
            policy = policy.with_cuts(parse_cuts(raw)?);
        }
        policy.validate()?;
        Ok(policy)
    }
}

fn parse_cuts(raw: &str) -> Result<BandCuts, Box<dyn std::error::Error>> {
    let values = raw
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| format!("invalid --cuts '{raw}': {e}"))?;
    let &[misaligned, neutral, aligned, strong_aligned] = values.as_slice() else {
        return Err(format!("--cuts needs four values, got {}", values.len()).into());
    };
    Ok(BandCuts {
        misaligned,
        neutral,
        aligned,
        strong_aligned,
    })
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Output JSONL path (entity rows, then portfolio rows).
    #[arg(long)]
    output: PathBuf,
    /// Alert events JSONL path.
    #[arg(long)]
    alerts: Option<PathBuf>,
    /// Structured JSONL run log path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Run identifier stamped on rows and trace ids.
    #[arg(long, default_value = "demo")]
    run_id: String,
    /// Mapper layer: `auto`, `on` or `off`.
    #[arg(long, default_value = "auto")]
    compute_a: String,
    /// Unresolvable alignments: `neutral` (a = 0) or `skip`.
    #[arg(long, default_value = "neutral")]
    fallback: String,
    /// Emit the `SDI` portfolio series.
    #[arg(long)]
    sdi: bool,
    /// Comma-separated entities to include in the portfolio (implies --sdi).
    #[arg(long)]
    sdi_entities: Option<String>,
    /// Portfolio-only JSONL path (implies --sdi).
    #[arg(long)]
    sdi_output: Option<PathBuf>,
    /// Worker threads for per-entity passes.
    #[arg(long, default_value_t = 1)]
    workers: usize,
    #[command(flatten)]
    knobs: Knobs,
}

impl RunArgs {
    fn options(&self) -> RunOptions {
        let mut options = RunOptions::default()
            .with_run_id(&self.run_id)
            .with_mapping(MappingMode::from_str_loose(&self.compute_a))
            .with_fallback(Fallback::from_str_loose(&self.fallback))
            .with_workers(self.workers);
        if let Some(filter) = &self.sdi_entities {
            options = options.with_portfolio(PortfolioSpec::from_filter(filter));
        } else if self.sdi || self.sdi_output.is_some() {
            options = options.with_portfolio(PortfolioSpec::all());
        }
        options
    }

    fn paths(&self) -> OutputPaths {
        OutputPaths {
            output: self.output.clone(),
            alerts: self.alerts.clone(),
            portfolio: self.sdi_output.clone(),
        }
    }

    fn emitter(&self) -> std::io::Result<LogEmitter> {
        match &self.log {
            Some(path) => LogEmitter::to_file(path, &self.run_id),
            None => Ok(LogEmitter::to_writer(Box::new(std::io::sink()), &self.run_id)),
        }
    }
}

fn execute(
    args: &RunArgs,
    mut records: Vec<RawRecord>,
    log: &mut LogEmitter,
) -> Result<(), Box<dyn std::error::Error>> {
    let filled = fill_missing_time(&mut records, today_utc());
    if filled > 0 {
        let entry = log
            .entry(LogLevel::Info, "time_filled")
            .with_details(serde_json::json!({ "records": filled }));
        log.emit_entry(entry)?;
    }

    let runner = AuditRunner::new(args.knobs.policy()?, args.options());
    let output = runner.execute(records, log)?;
    let written = write_outputs(&output, &args.paths())?;

    for line in summary_lines(&output) {
        eprintln!("{line}");
    }
    eprintln!(
        "Wrote {} rows to {} ({} alerts, {} diagnostics)",
        written.rows,
        args.output.display(),
        output.alerts.len(),
        output.diagnostics.len(),
    );
    Ok(())
}

fn print_log_report(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (lines, errors) = validate_log_file(path)?;
    if errors.is_empty() {
        eprintln!("{}: {lines} lines, valid", path.display());
        return Ok(());
    }
    for err in &errors {
        eprintln!("{err}");
    }
    Err(format!(
        "{}: {} validation errors in {lines} lines",
        path.display(),
        errors.len()
    )
    .into())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run { input, run } => {
            let records = load_records(&input)?;
            eprintln!("Loaded {} records from {}", records.len(), input.display());
            let mut log = run.emitter()?;
            execute(&run, records, &mut log)?;
        }
        Command::Demo { days, start, run } => {
            let start = match start.as_deref() {
                Some(raw) => parse_cli_date(raw)?,
                None => today_utc(),
            };
            let records = demo::demo_records(start, days);
            let mut log = run.emitter()?;
            execute(&run, records, &mut log)?;
        }
        Command::Fingerprint { knobs } => {
            let policy = knobs.policy()?;
            println!("{}", canonical_policy_json(&policy));
            println!("{}", fingerprint(&policy));
        }
        Command::ValidateLog { log } => {
            print_log_report(&log)?;
        }
    }

    Ok(())
}
