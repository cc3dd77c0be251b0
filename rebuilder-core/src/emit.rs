//! Report Emitter.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use rebuilder_render::render_summary_md;
use rebuilder_types::compare::{ClassificationCounts, ComparisonResult};
use rebuilder_types::job::BuildJob;
use rebuilder_types::report::{
    BuildSummary, OverallStatus, REPORT_FILE_NAME, RunInfo, SUMMARY_FILE_NAME, ToolInfo,
    VerificationReport,
};
use rebuilder_types::wire::ReportV1;
use tracing::info;

use crate::error::RebuildError;
use crate::ports::WritePort;

/// Build the report for a finished reconciliation. `artifacts` must already
/// be in report order.
pub fn assemble(
    job: &BuildJob,
    tool: ToolInfo,
    started_at: DateTime<Utc>,
    build: BuildSummary,
    artifacts: Vec<ComparisonResult>,
) -> VerificationReport {
    VerificationReport {
        tool,
        run: RunInfo::new(started_at, Utc::now()),
        version: job.version.clone(),
        target: job.target.clone(),
        build,
        status: OverallStatus::derive(&artifacts),
        counts: ClassificationCounts::tally(&artifacts),
        artifacts,
    }
}

/// Write `report.json` and `summary.md` into `results_dir`.
///
/// Returns the report path. Every failure here is `ReportWrite`: the run's
/// work is lost without the report.
pub fn emit(
    report: &VerificationReport,
    results_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> Result<Utf8PathBuf, RebuildError> {
    write_report(report, results_dir, writer).map_err(RebuildError::ReportWrite)
}

fn write_report(
    report: &VerificationReport,
    results_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> anyhow::Result<Utf8PathBuf> {
    writer.create_dir_all(results_dir)?;

    let wire = ReportV1::try_from(report).context("convert report to wire format")?;
    let json = serde_json::to_string_pretty(&wire).context("serialize report")?;

    // report.json goes last: its presence marks a completed run.
    let summary = render_summary_md(report);
    writer.write_file(&results_dir.join(SUMMARY_FILE_NAME), summary.as_bytes())?;

    let path = results_dir.join(REPORT_FILE_NAME);
    writer.write_file(&path, json.as_bytes())?;

    info!(
        report = %path,
        status = report.status.as_str(),
        matched = report.counts.matched,
        mismatched = report.counts.mismatched,
        local_only = report.counts.local_only,
        official_only = report.counts.official_only,
        "report written"
    );
    Ok(path)
}
