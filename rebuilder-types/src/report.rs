use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::compare::{Classification, ClassificationCounts, ComparisonResult};
use crate::job::Target;

pub const REPORT_FILE_NAME: &str = "report.json";
pub const SUMMARY_FILE_NAME: &str = "summary.md";
pub const INDEX_FILE_NAME: &str = "index.json";

/// In-memory verification report. Serialized through [`crate::wire::ReportV1`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub tool: ToolInfo,
    pub run: RunInfo,
    pub version: String,
    pub target: Target,
    pub build: BuildSummary,
    pub status: OverallStatus,
    pub counts: ClassificationCounts,

    /// Sorted by logical name.
    pub artifacts: Vec<ComparisonResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunInfo {
    pub fn new(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            id: Uuid::new_v4(),
            started_at,
            ended_at,
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    PartialFailure,
    /// No build was attempted; an existing tree was reconciled.
    Skipped,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::PartialFailure => "partial_failure",
            BuildStatus::Skipped => "skipped",
        }
    }
}

/// Build Driver outcome as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub status: BuildStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<Utf8PathBuf>,

    /// Commit the tree was reset to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Artifacts were already present before this run's build started.
    #[serde(default)]
    pub prior_artifacts: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BuildSummary {
    pub fn skipped() -> Self {
        Self {
            status: BuildStatus::Skipped,
            exit_code: None,
            duration_ms: 0,
            log: None,
            revision: None,
            prior_artifacts: true,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    Degraded,
}

impl OverallStatus {
    /// `Success` only when there is at least one entry and every entry matched.
    pub fn derive(results: &[ComparisonResult]) -> Self {
        if !results.is_empty()
            && results
                .iter()
                .all(|r| r.classification == Classification::Matched)
        {
            OverallStatus::Success
        } else {
            OverallStatus::Degraded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Success => "success",
            OverallStatus::Degraded => "degraded",
        }
    }
}
