use serde::{Deserialize, Serialize};

use crate::compare::{ClassificationCounts, ComparisonResult};
use crate::report::{BuildStatus, OverallStatus, VerificationReport};
use crate::schema;
use crate::wire::{ToolInfoV1, WireError};

/// Schema-exact wire representation of openwrt-rebuilder.report.v1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportV1 {
    pub schema: String,
    pub tool: ToolInfoV1,
    pub run: RunInfoV1,
    pub version: String,
    pub target: String,
    pub build: BuildV1,
    pub status: OverallStatus,
    pub counts: ClassificationCounts,

    #[serde(default)]
    pub artifacts: Vec<ComparisonResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfoV1 {
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildV1 {
    pub status: BuildStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    pub duration_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(default)]
    pub prior_artifacts: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TryFrom<&VerificationReport> for ReportV1 {
    type Error = WireError;

    fn try_from(report: &VerificationReport) -> Result<Self, Self::Error> {
        let version = report
            .tool
            .version
            .clone()
            .ok_or(WireError::MissingToolVersion { context: "report" })?;

        Ok(Self {
            schema: schema::REBUILDER_REPORT_V1.to_string(),
            tool: ToolInfoV1 {
                name: report.tool.name.clone(),
                version,
                maintainer: report.tool.maintainer.clone(),
                contact: report.tool.contact.clone(),
            },
            run: RunInfoV1 {
                id: report.run.id.to_string(),
                started_at: report.run.started_at.to_rfc3339(),
                ended_at: report.run.ended_at.to_rfc3339(),
                duration_ms: report.run.duration_ms,
            },
            version: report.version.clone(),
            target: report.target.to_string(),
            build: BuildV1 {
                status: report.build.status,
                exit_code: report.build.exit_code,
                duration_ms: report.build.duration_ms,
                log: report.build.log.as_ref().map(|p| p.to_string()),
                revision: report.build.revision.clone(),
                prior_artifacts: report.build.prior_artifacts,
                reason: report.build.reason.clone(),
            },
            status: report.status,
            counts: report.counts,
            artifacts: report.artifacts.clone(),
        })
    }
}
