//! Failure taxonomy.
//!
//! [`RebuildError`] is reserved for conditions that end a run without a
//! report. Per-artifact problems ([`DigestError`], [`AnalyzerError`]) are
//! folded into the report as data and never abort the run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("source unavailable: {0:#}")]
    SourceUnavailable(anyhow::Error),

    #[error("build failed: {reason}")]
    BuildHardFailure {
        reason: String,
        exit_code: Option<i32>,
    },

    #[error("cannot write report: {0:#}")]
    ReportWrite(anyhow::Error),

    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl RebuildError {
    /// Process exit code for this failure. 0 is reserved for "report written".
    pub fn exit_code(&self) -> i32 {
        match self {
            RebuildError::Internal(_) => 1,
            RebuildError::Config(_) => 2,
            RebuildError::SourceUnavailable(_) => 3,
            RebuildError::BuildHardFailure { .. } => 4,
            RebuildError::ReportWrite(_) => 5,
        }
    }

    pub fn hard_failure(reason: impl Into<String>) -> Self {
        RebuildError::BuildHardFailure {
            reason: reason.into(),
            exit_code: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("cannot read {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("cannot obtain official artifact {name}: {message}")]
    Unobtainable { name: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyzerError {
    #[error("analyzer failed: {0}")]
    Failed(String),

    #[error("analyzer timed out after {0}s")]
    Timeout(u64),

    #[error("analyzer interrupted")]
    Interrupted,
}
