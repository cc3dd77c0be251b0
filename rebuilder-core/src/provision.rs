//! Source Provisioner: bring the build directory to the pinned revision.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use fs2::FileExt;
use glob::{Pattern, glob};
use rebuilder_types::job::BuildJob;
use tracing::{debug, info, warn};

use crate::buildinfo::OfficialBuildInfo;
use crate::error::RebuildError;
use crate::ports::SourceControl;

/// Exclusive lock on `<build_dir>.lock`, held across provisioning and the
/// build. Released on drop, including on early returns and unwinds.
#[derive(Debug)]
pub struct CacheLock {
    file: fs::File,
    path: Utf8PathBuf,
}

impl CacheLock {
    /// Blocks until no other run holds the lock for this build directory.
    pub fn acquire(path: &Utf8Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;

        if FileExt::try_lock_exclusive(file.file()).is_err() {
            info!(lock = %path, "build directory is in use by another run; waiting");
            FileExt::lock_exclusive(file.file()).with_context(|| format!("lock {path}"))?;
        }
        debug!(lock = %path, "acquired build directory lock");

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file.file()) {
            warn!(lock = %self.path, error = %e, "failed to release build directory lock");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    /// HEAD after provisioning and patching.
    pub revision: Option<String>,
    pub patches_applied: usize,
    pub fresh_clone: bool,
}

/// Clone or update the checkout, pin it to the official commit and apply
/// local patches. Any source-control failure is `SourceUnavailable`.
pub fn provision(
    job: &BuildJob,
    git: &dyn SourceControl,
    info: &OfficialBuildInfo,
) -> Result<ProvisionOutcome, RebuildError> {
    let dir = job.build_dir.as_path();
    let branch = job.revision.branch.as_str();

    let fresh_clone = is_missing_or_empty(dir).map_err(RebuildError::SourceUnavailable)?;
    if fresh_clone {
        info!(url = %job.source_git, branch, dir = %dir, "cloning build system");
        git.clone_repo(&job.source_git, branch, dir)
            .with_context(|| format!("clone {}", job.source_git))
            .map_err(RebuildError::SourceUnavailable)?;
    } else if git.is_checkout(dir) {
        info!(dir = %dir, branch, "updating existing checkout");
        git.fetch(dir).context("fetch").map_err(RebuildError::SourceUnavailable)?;
        git.reset_hard(dir, &format!("origin/{branch}"))
            .map_err(RebuildError::SourceUnavailable)?;
    } else {
        return Err(RebuildError::SourceUnavailable(anyhow::anyhow!(
            "{dir} exists, is not empty and is not a checkout"
        )));
    }

    git.checkout(dir, branch, None).map_err(RebuildError::SourceUnavailable)?;
    git.reset_hard(dir, &info.commit)
        .with_context(|| format!("pin official commit {}", info.commit))
        .map_err(RebuildError::SourceUnavailable)?;

    if let Some(tag) = &job.revision.tag {
        let local_branch = format!("v{}", job.version);
        git.checkout(dir, tag, Some(&local_branch))
            .with_context(|| format!("check out release tag {tag}"))
            .map_err(RebuildError::SourceUnavailable)?;
    }

    let patches_applied = match &job.patches_dir {
        Some(patches) => apply_patches(git, dir, patches)?,
        None => 0,
    };

    let revision = git.head(dir).map_err(RebuildError::SourceUnavailable)?;
    info!(revision = ?revision, patches_applied, "source provisioned");

    Ok(ProvisionOutcome {
        revision,
        patches_applied,
        fresh_clone,
    })
}

fn is_missing_or_empty(dir: &Utf8Path) -> anyhow::Result<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    Ok(fs::read_dir(dir)?.next().is_none())
}

/// Apply `*.patch` in lexical order. A patch that does not apply is logged
/// and skipped.
fn apply_patches(
    git: &dyn SourceControl,
    dir: &Utf8Path,
    patches: &Utf8Path,
) -> Result<usize, RebuildError> {
    if !patches.is_dir() {
        debug!(dir = %patches, "no patches directory");
        return Ok(0);
    }

    let pattern = format!("{}/*.patch", Pattern::escape(patches.as_str()));
    let mut files: Vec<Utf8PathBuf> = glob(&pattern)
        .with_context(|| format!("glob {pattern}"))?
        .filter_map(Result::ok)
        .filter_map(|p| Utf8PathBuf::from_path_buf(p).ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut applied = 0;
    for patch in &files {
        match git.apply_patch(dir, patch) {
            Ok(()) => {
                info!(patch = %patch, "applied patch");
                applied += 1;
            }
            Err(e) => warn!(patch = %patch, error = %format!("{e:#}"), "patch does not apply; skipping"),
        }
    }
    Ok(applied)
}
