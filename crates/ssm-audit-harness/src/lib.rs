//! Harness around the SSM-Audit core.
//!
//! This crate provides:
//! - Record loading: JSON arrays and JSONL into raw records
//! - Demo generator: the built-in three-entity sample
//! - Run execution: core pipeline, structured JSONL run log, JSONL outputs
//! - Log validation: schema checks for run logs

#![forbid(unsafe_code)]

pub mod demo;
pub mod error;
pub mod records;
pub mod runner;
pub mod structured_log;

pub use error::HarnessError;
pub use records::{load_records, read_jsonl, write_jsonl};
pub use runner::{AuditRunner, OutputPaths, WriteSummary, summary_lines, write_outputs};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
