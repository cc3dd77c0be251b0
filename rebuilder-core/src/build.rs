//! Build Driver: configure the tree, run the toolchain, classify the result.

use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use glob::{Pattern, glob};
use rebuilder_types::job::BuildJob;
use rebuilder_types::report::{BuildStatus, BuildSummary};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::buildinfo::OfficialBuildInfo;
use crate::cancel::CancelToken;
use crate::error::RebuildError;
use crate::ports::{BuildRequest, Toolchain, ToolchainExit};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildVerdict {
    Success,
    /// Continue with what exists; the reason goes into report metadata.
    PartialFailure { reason: String },
    /// Abort the run without a report.
    HardFailure { reason: String },
}

/// Classify a toolchain run by how it ended and how many artifacts are on
/// disk afterwards (produced now or left by an earlier run).
pub fn classify(exit: ToolchainExit, artifacts_present: usize) -> BuildVerdict {
    match exit {
        ToolchainExit::Exited(Some(0)) => BuildVerdict::Success,
        ToolchainExit::TimedOut => BuildVerdict::HardFailure {
            reason: "build timed out".to_string(),
        },
        ToolchainExit::Interrupted => BuildVerdict::HardFailure {
            reason: "build interrupted".to_string(),
        },
        ToolchainExit::Exited(code) => {
            let how = match code {
                Some(c) => format!("toolchain exited with status {c}"),
                None => "toolchain killed by a signal".to_string(),
            };
            if artifacts_present == 0 {
                BuildVerdict::HardFailure {
                    reason: format!("{how} and no artifacts are available"),
                }
            } else {
                BuildVerdict::PartialFailure {
                    reason: format!("{how}; continuing with {artifacts_present} artifacts"),
                }
            }
        }
    }
}

/// Write the official configuration into the tree and run the toolchain.
///
/// Returns the build summary for the report, or `BuildHardFailure` when
/// there is nothing to reconcile.
pub fn drive_build(
    job: &BuildJob,
    info: &OfficialBuildInfo,
    toolchain: &dyn Toolchain,
    cancel: &CancelToken,
) -> Result<BuildSummary, RebuildError> {
    configure_tree(job, info)?;

    let bin = job.target_bin_dir();
    let prior = count_files(&bin)?;
    if prior > 0 {
        info!(count = prior, dir = %bin, "artifacts from an earlier build are present");
    }

    let request = BuildRequest {
        log: job.build_log_path(),
        timeout: job.build_timeout(),
        cancel: cancel.clone(),
    };
    info!(target = %job.target, jobs = job.jobs, log = %request.log, "starting build");
    let started = Instant::now();
    let (exit, error) = match toolchain.build(job, &request) {
        Ok(exit) => (exit, None),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "toolchain could not be run");
            (ToolchainExit::Exited(None), Some(format!("{e:#}")))
        }
    };
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let present = count_files(&bin)?;
    let exit_code = match exit {
        ToolchainExit::Exited(code) => code,
        _ => None,
    };

    let (status, reason) = match classify(exit, present) {
        BuildVerdict::Success => (BuildStatus::Success, None),
        BuildVerdict::PartialFailure { reason } => {
            warn!(reason = %reason, "build partially failed");
            (BuildStatus::PartialFailure, Some(reason))
        }
        BuildVerdict::HardFailure { reason } => {
            let reason = match error {
                Some(e) => format!("{reason}: {e}"),
                None => reason,
            };
            return Err(RebuildError::BuildHardFailure { reason, exit_code });
        }
    };
    info!(status = status.as_str(), duration_ms, artifacts = present, "build finished");

    Ok(BuildSummary {
        status,
        exit_code,
        duration_ms,
        log: Some(rebuilder_artifacts::relative_to(&request.log, &job.results_dir)),
        revision: None,
        prior_artifacts: prior > 0,
        reason,
    })
}

/// `feeds.conf`, `.config` and the download cache link.
fn configure_tree(job: &BuildJob, info: &OfficialBuildInfo) -> Result<(), RebuildError> {
    let feeds = job.build_dir.join("feeds.conf");
    fs::write(&feeds, &info.feeds).context("write feeds.conf")?;

    let config = job.build_dir.join(".config");
    fs::write(&config, info.render_config(&job.config_overrides)).context("write .config")?;
    debug!(overrides = job.config_overrides.len(), "wrote build configuration");

    link_download_cache(job)?;
    Ok(())
}

/// Point `<build_dir>/dl` at a download cache living elsewhere. An existing
/// `dl` entry is left alone.
fn link_download_cache(job: &BuildJob) -> anyhow::Result<()> {
    let link = job.build_dir.join("dl");
    if job.dl_dir == link || link.symlink_metadata().is_ok() {
        return Ok(());
    }
    fs::create_dir_all(&job.dl_dir)?;
    symlink_dir(&job.dl_dir, &link)
        .with_context(|| format!("link download cache {} -> {link}", job.dl_dir))?;
    info!(dl = %job.dl_dir, "linked shared download cache");
    Ok(())
}

#[cfg(unix)]
fn symlink_dir(original: &Utf8Path, link: &Utf8Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink_dir(original: &Utf8Path, link: &Utf8Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

fn count_files(dir: &Utf8Path) -> anyhow::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let pattern = format!("{}/**/*", Pattern::escape(dir.as_str()));
    Ok(glob(&pattern)
        .with_context(|| format!("glob {pattern}"))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .count())
}
