//! Port traits abstracting every external collaborator away from the pipeline.

use camino::{Utf8Path, Utf8PathBuf};
use rebuilder_artifacts::{Enumeration, RuleSet};
use rebuilder_types::artifact::ArtifactRef;
use rebuilder_types::job::BuildJob;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::AnalyzerError;

/// Source-control operations on a working tree.
pub trait SourceControl {
    fn is_checkout(&self, dir: &Utf8Path) -> bool;
    fn clone_repo(&self, url: &str, branch: &str, dir: &Utf8Path) -> anyhow::Result<()>;
    /// Fetch every remote ref.
    fn fetch(&self, dir: &Utf8Path) -> anyhow::Result<()>;
    fn reset_hard(&self, dir: &Utf8Path, rev: &str) -> anyhow::Result<()>;
    /// Check out `rev`, optionally (re)creating `new_branch` at it.
    fn checkout(&self, dir: &Utf8Path, rev: &str, new_branch: Option<&str>) -> anyhow::Result<()>;
    fn apply_patch(&self, dir: &Utf8Path, patch: &Utf8Path) -> anyhow::Result<()>;
    fn head(&self, dir: &Utf8Path) -> anyhow::Result<Option<String>>;
}

/// The official artifact server (or a local mirror of it).
pub trait OriginPort: Send + Sync {
    /// Text file from the official target directory, e.g. `version.buildinfo`.
    fn fetch_text(&self, job: &BuildJob, name: &str) -> anyhow::Result<String>;

    /// The official artifact set for the job's (version, target).
    fn listing(&self, job: &BuildJob, rules: &RuleSet) -> anyhow::Result<Enumeration>;

    /// Local path holding the official artifact's bytes, downloading into
    /// the origin cache when needed.
    fn materialize(&self, job: &BuildJob, artifact: &ArtifactRef) -> anyhow::Result<Utf8PathBuf>;
}

/// How the toolchain run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainExit {
    /// Exit status; `None` when killed by a signal.
    Exited(Option<i32>),
    TimedOut,
    Interrupted,
}

/// Everything a toolchain invocation may use besides the job itself.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub log: Utf8PathBuf,
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

/// The native build, treated as opaque: a configured tree in, artifacts in
/// `bin/` out.
pub trait Toolchain {
    fn build(&self, job: &BuildJob, request: &BuildRequest) -> anyhow::Result<ToolchainExit>;
}

/// Forensic comparison of two files, writing a diff document to `out`.
pub trait DiffAnalyzer: Send + Sync {
    fn analyze(
        &self,
        local: &Utf8Path,
        official: &Utf8Path,
        out: &Utf8Path,
        timeout: Duration,
    ) -> Result<(), AnalyzerError>;
}

/// File-system write operations.
pub trait WritePort {
    /// Replace `path` with `contents` such that readers never observe a
    /// partially written file.
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()>;
    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()>;
}
