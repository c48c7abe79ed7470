//! Harness error type.

use std::path::PathBuf;

use ssm_audit_core::AuditError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{path}: line {line}: {message}")]
    RecordShape {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error(transparent)]
    Audit(#[from] AuditError),
}
