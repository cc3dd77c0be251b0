//! The verify pipeline: provision, build, enumerate, reconcile, emit.
//!
//! All I/O goes through the port traits so the whole run can be exercised
//! with in-memory doubles.

use anyhow::Context;
use camino::Utf8PathBuf;
use chrono::Utc;
use rebuilder_artifacts::enumerate_dir;
use rebuilder_types::artifact::ArtifactOrigin;
use rebuilder_types::job::BuildJob;
use rebuilder_types::report::{BuildSummary, ToolInfo, VerificationReport};
use tracing::{debug, info};

use crate::build::drive_build;
use crate::buildinfo::OfficialBuildInfo;
use crate::cancel::CancelToken;
use crate::emit::{assemble, emit};
use crate::error::RebuildError;
use crate::ports::{DiffAnalyzer, OriginPort, SourceControl, Toolchain, WritePort};
use crate::provision::{CacheLock, provision};
use crate::reconcile::reconcile;
use crate::settings::VerifyOptions;

/// The collaborators a run talks to.
#[derive(Clone, Copy)]
pub struct Ports<'a> {
    pub git: &'a dyn SourceControl,
    pub origin: &'a dyn OriginPort,
    pub toolchain: &'a dyn Toolchain,
    /// Only consulted when the job enables deep diff.
    pub analyzer: Option<&'a dyn DiffAnalyzer>,
    pub writer: &'a dyn WritePort,
}

/// Outcome of `run_verify`.
#[derive(Debug)]
pub struct VerifyOutcome {
    pub report: VerificationReport,
    pub report_path: Utf8PathBuf,
}

/// Run one job end to end.
///
/// `Ok` means a report was written, whatever its status. Every `Err` means
/// no report was written by this run.
pub fn run_verify(
    job: &BuildJob,
    options: &VerifyOptions,
    ports: &Ports<'_>,
    tool: ToolInfo,
    cancel: &CancelToken,
) -> Result<VerifyOutcome, RebuildError> {
    let started_at = Utc::now();
    info!(version = %job.version, target = %job.target, skip_build = options.skip_build, "verify run starting");

    let build = if options.skip_build {
        info!(dir = %job.target_bin_dir(), "skipping build; reconciling existing tree");
        BuildSummary {
            revision: ports.git.head(&job.build_dir).ok().flatten(),
            ..BuildSummary::skipped()
        }
    } else {
        provision_and_build(job, ports, cancel)?
    };

    if cancel.is_cancelled() {
        return Err(RebuildError::hard_failure("interrupted before reconciliation"));
    }

    let local = enumerate_dir(
        &job.target_bin_dir(),
        ArtifactOrigin::Local,
        &options.rules,
        &job.target,
    )
    .context("enumerate local artifacts")?;
    if options.skip_build && local.is_empty() {
        return Err(RebuildError::hard_failure(format!(
            "build skipped and no artifacts found under {}",
            job.target_bin_dir()
        )));
    }

    let official = ports
        .origin
        .listing(job, &options.rules)
        .map_err(|e| RebuildError::SourceUnavailable(e.context("official artifact listing")))?;
    debug!(
        local = local.artifacts.len(),
        local_ignored = local.ignored.len(),
        official = official.artifacts.len(),
        official_ignored = official.ignored.len(),
        "enumerated artifact sets"
    );

    let analyzer = if job.deep_diff { ports.analyzer } else { None };
    let artifacts = reconcile(job, &local, &official, ports.origin, analyzer, cancel)?;
    if cancel.is_cancelled() {
        return Err(RebuildError::hard_failure("interrupted during reconciliation"));
    }

    let report = assemble(job, tool, started_at, build, artifacts);
    let report_path = emit(&report, &job.results_dir, ports.writer)?;

    Ok(VerifyOutcome {
        report,
        report_path,
    })
}

/// Provisioning and build share one lock on the build directory.
fn provision_and_build(
    job: &BuildJob,
    ports: &Ports<'_>,
    cancel: &CancelToken,
) -> Result<BuildSummary, RebuildError> {
    let info = OfficialBuildInfo::fetch(ports.origin, job)?;

    let _lock = CacheLock::acquire(&job.lock_path())
        .with_context(|| format!("lock build directory {}", job.build_dir))?;

    let provisioned = provision(job, ports.git, &info)?;
    if cancel.is_cancelled() {
        return Err(RebuildError::hard_failure("interrupted before build"));
    }

    let mut build = drive_build(job, &info, ports.toolchain, cancel)?;
    build.revision = provisioned.revision;
    Ok(build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FsWritePort, MirrorOrigin};
    use crate::ports::ToolchainExit;
    use crate::testing::{
        FailingWritePort, InterruptingAnalyzer, MemWritePort, SelectiveFailWritePort,
        StubAnalyzer, StubGit, StubToolchain, job, official_mirror, utf8, write,
    };
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;
    use rebuilder_artifacts::RuleSet;
    use rebuilder_types::compare::{Classification, DeepDiff};
    use rebuilder_types::report::{BuildStatus, OverallStatus};

    fn tool() -> ToolInfo {
        ToolInfo {
            name: "openwrt-rebuilder".into(),
            version: Some("0.3.1".into()),
            maintainer: None,
            contact: None,
        }
    }

    fn options() -> VerifyOptions {
        VerifyOptions {
            skip_build: false,
            rules: RuleSet::v1(),
        }
    }

    /// Entries other than the buildinfo files the mirror always carries.
    fn entries(report: &VerificationReport) -> Vec<(String, Classification)> {
        report
            .artifacts
            .iter()
            .filter(|r| !r.name.ends_with(".buildinfo"))
            .map(|r| (r.name.clone(), r.classification))
            .collect()
    }

    struct World {
        _temp: tempfile::TempDir,
        root: Utf8PathBuf,
        job: BuildJob,
        origin: MirrorOrigin,
        git: StubGit,
    }

    fn world(official: &[(&str, &[u8])]) -> World {
        let temp = tempfile::tempdir().unwrap();
        let root = utf8(&temp);
        let job = job(&root);
        official_mirror(&root.join("mirror"), &job, official);
        World {
            origin: MirrorOrigin::new(root.join("mirror")),
            git: StubGit::default(),
            job,
            root,
            _temp: temp,
        }
    }

    fn ports<'a>(
        w: &'a World,
        toolchain: &'a dyn Toolchain,
        analyzer: Option<&'a dyn DiffAnalyzer>,
        writer: &'a dyn WritePort,
    ) -> Ports<'a> {
        Ports {
            git: &w.git,
            origin: &w.origin,
            toolchain,
            analyzer,
            writer,
        }
    }

    #[test]
    fn local_and_official_sets_are_classified_by_union() {
        let w = world(&[("a.bin", b"H1"), ("c.bin", b"H3")]);
        let toolchain = StubToolchain::producing(
            &[("a.bin", b"H1"), ("b.bin", b"H2")],
            ToolchainExit::Exited(Some(0)),
        );
        let writer = MemWritePort::default();

        let outcome = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &writer),
            tool(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(
            entries(&outcome.report),
            vec![
                ("a.bin".to_string(), Classification::Matched),
                ("b.bin".to_string(), Classification::LocalOnly),
                ("c.bin".to_string(), Classification::OfficialOnly),
            ]
        );
        assert_eq!(outcome.report.status, OverallStatus::Degraded);
        assert_eq!(outcome.report.build.status, BuildStatus::Success);
        assert_eq!(outcome.report.build.revision.as_deref(), Some("abc1234567"));
        assert!(writer.get(&outcome.report_path).is_some());
    }

    #[test]
    fn mismatch_with_deep_diff_enabled_carries_reference() {
        let mut w = world(&[("a.bin", b"H9")]);
        w.job.deep_diff = true;
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));
        let analyzer = StubAnalyzer::default();
        let writer = MemWritePort::default();

        let outcome = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, Some(&analyzer), &writer),
            tool(),
            &CancelToken::new(),
        )
        .unwrap();

        let a = outcome
            .report
            .artifacts
            .iter()
            .find(|r| r.name == "a.bin")
            .unwrap();
        assert_eq!(a.classification, Classification::Mismatched);
        assert_eq!(
            a.diffoscope,
            Some(DeepDiff::Available {
                path: Utf8PathBuf::from("diffoscope/a.bin.html")
            })
        );
    }

    #[test]
    fn mismatch_with_deep_diff_disabled_has_no_reference() {
        let w = world(&[("a.bin", b"H9")]);
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));
        let analyzer = StubAnalyzer::default();
        let writer = MemWritePort::default();

        let outcome = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, Some(&analyzer), &writer),
            tool(),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(outcome.report.artifacts.iter().all(|r| r.diffoscope.is_none()));
        assert!(analyzer.calls.lock().unwrap().is_empty());
        assert_eq!(outcome.report.counts.mismatched, 1);
    }

    #[test]
    fn unreachable_mirror_exits_without_report() {
        let mut w = world(&[("a.bin", b"H1")]);
        w.git.fail_clone = true;
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap_err();

        assert!(matches!(err, RebuildError::SourceUnavailable(_)));
        assert_ne!(err.exit_code(), 0);
        assert!(!w.job.report_path().exists());
        assert!(!w.job.target_bin_dir().exists());
    }

    #[test]
    fn missing_official_buildinfo_is_source_unavailable() {
        let w = world(&[]);
        fs_err::remove_file(w.root.join("mirror").join(w.job.target_dir()).join("version.buildinfo"))
            .unwrap();
        let toolchain = StubToolchain::producing(&[], ToolchainExit::Exited(Some(0)));

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap_err();

        assert!(matches!(err, RebuildError::SourceUnavailable(_)));
        assert!(w.git.calls().is_empty());
    }

    #[test]
    fn partial_build_still_reports_what_was_produced() {
        let w = world(&[("a.bin", b"H1"), ("b.bin", b"H2"), ("c.bin", b"H3")]);
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(2)));

        let outcome = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.report.build.status, BuildStatus::PartialFailure);
        assert_eq!(outcome.report.build.exit_code, Some(2));
        assert_eq!(
            entries(&outcome.report),
            vec![
                ("a.bin".to_string(), Classification::Matched),
                ("b.bin".to_string(), Classification::OfficialOnly),
                ("c.bin".to_string(), Classification::OfficialOnly),
            ]
        );
        let written = std::fs::read_to_string(w.job.report_path()).unwrap();
        assert!(written.contains("partial_failure"));
    }

    #[test]
    fn hard_build_failure_leaves_no_report() {
        let w = world(&[("a.bin", b"H1")]);
        let toolchain = StubToolchain::producing(&[], ToolchainExit::Exited(Some(2)));

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 4);
        assert!(!w.job.report_path().exists());
    }

    #[test]
    fn interrupt_before_build_is_hard_failure() {
        let w = world(&[("a.bin", b"H1")]);
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, RebuildError::BuildHardFailure { .. }));
        assert!(!w.job.target_bin_dir().exists());
    }

    #[test]
    fn interrupt_during_reconciliation_is_hard_failure() {
        let mut w = world(&[("a.bin", b"H9")]);
        w.job.deep_diff = true;
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));
        let cancel = CancelToken::new();
        let analyzer = InterruptingAnalyzer {
            cancel: cancel.clone(),
        };

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, Some(&analyzer), &FsWritePort),
            tool(),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, RebuildError::BuildHardFailure { .. }));
        assert_eq!(err.exit_code(), 4);
        assert!(!w.job.report_path().exists());
    }

    #[test]
    fn summary_write_failure_leaves_no_report() {
        let w = world(&[("a.bin", b"H1")]);
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));
        let writer = SelectiveFailWritePort::failing_on("summary.md");

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &writer),
            tool(),
            &CancelToken::new(),
        )
        .unwrap_err();

        assert_eq!(err.exit_code(), 5);
        assert!(writer.inner.get(&w.job.report_path()).is_none());
    }

    #[test]
    fn skip_build_reconciles_existing_tree() {
        let w = world(&[("a.bin", b"H1")]);
        write(&w.job.target_bin_dir().join("a.bin"), b"H1");
        let toolchain = StubToolchain::producing(&[], ToolchainExit::Exited(Some(2)));
        let opts = VerifyOptions {
            skip_build: true,
            ..options()
        };

        let outcome = run_verify(
            &w.job,
            &opts,
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(outcome.report.build.status, BuildStatus::Skipped);
        assert!(w.git.calls().is_empty());
        assert_eq!(
            entries(&outcome.report),
            vec![("a.bin".to_string(), Classification::Matched)]
        );
    }

    #[test]
    fn skip_build_with_empty_tree_is_hard_failure() {
        let w = world(&[("a.bin", b"H1")]);
        let toolchain = StubToolchain::producing(&[], ToolchainExit::Exited(Some(0)));
        let opts = VerifyOptions {
            skip_build: true,
            ..options()
        };

        let err = run_verify(
            &w.job,
            &opts,
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn report_write_failure_is_fatal() {
        let w = world(&[("a.bin", b"H1")]);
        let toolchain =
            StubToolchain::producing(&[("a.bin", b"H1")], ToolchainExit::Exited(Some(0)));

        let err = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FailingWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, RebuildError::ReportWrite(_)));
    }

    #[test]
    fn rerun_on_unchanged_tree_is_idempotent() {
        let w = world(&[("a.bin", b"H1"), ("b.bin", b"H2")]);
        let toolchain = StubToolchain::producing(
            &[("a.bin", b"H1"), ("b.bin", b"other")],
            ToolchainExit::Exited(Some(0)),
        );
        let run = || {
            run_verify(
                &w.job,
                &options(),
                &ports(&w, &toolchain, None, &FsWritePort),
                tool(),
                &CancelToken::new(),
            )
            .unwrap()
        };

        let first = run();
        let second = run();
        assert_eq!(first.report.artifacts, second.report.artifacts);
        assert_eq!(first.report.counts, second.report.counts);
        assert_ne!(first.report.run.id, second.report.run.id);
    }

    #[test]
    fn identical_bytes_under_different_dirs_match() {
        let w = world(&[("packages/base-files.ipk", b"same")]);
        let toolchain = StubToolchain::producing(
            &[("packages/base-files.ipk", b"same")],
            ToolchainExit::Exited(Some(0)),
        );

        let outcome = run_verify(
            &w.job,
            &options(),
            &ports(&w, &toolchain, None, &FsWritePort),
            tool(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(
            entries(&outcome.report),
            vec![("packages/base-files.ipk".to_string(), Classification::Matched)]
        );
        assert!(Utf8Path::new(&w.job.results_dir).join("summary.md").is_file());
    }
}
