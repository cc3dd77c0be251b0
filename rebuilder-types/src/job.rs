use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Version string used for the rolling development branch.
pub const SNAPSHOT: &str = "SNAPSHOT";

/// A (board family, subtarget) pair, e.g. `ath79/generic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    board: String,
    subtarget: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetParseError {
    #[error("target is empty (expected 'board/subtarget')")]
    Empty,

    #[error("invalid target '{input}': expected exactly two segments 'board/subtarget', got {segments}")]
    SegmentCount { input: String, segments: usize },

    #[error("invalid target '{input}': segment '{segment}' contains unsupported characters")]
    InvalidSegment { input: String, segment: String },
}

impl Target {
    /// Parse `board/subtarget`. The CI spelling `board-subtarget` is accepted
    /// when the input contains no `/`.
    pub fn parse(input: &str) -> Result<Self, TargetParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(TargetParseError::Empty);
        }

        let normalized = if trimmed.contains('/') {
            trimmed.to_string()
        } else {
            trimmed.replace('-', "/")
        };

        let segments: Vec<&str> = normalized.split('/').collect();
        if segments.len() != 2 || segments.iter().any(|s| s.is_empty()) {
            return Err(TargetParseError::SegmentCount {
                input: input.to_string(),
                segments: segments.iter().filter(|s| !s.is_empty()).count(),
            });
        }

        for segment in &segments {
            // A leading dot would let `.` and `..` escape the per-target directories.
            let valid = !segment.starts_with('.')
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
            if !valid {
                return Err(TargetParseError::InvalidSegment {
                    input: input.to_string(),
                    segment: segment.to_string(),
                });
            }
        }

        Ok(Self {
            board: segments[0].to_string(),
            subtarget: segments[1].to_string(),
        })
    }

    pub fn board(&self) -> &str {
        &self.board
    }

    pub fn subtarget(&self) -> &str {
        &self.subtarget
    }

    /// Filesystem-flat spelling (`board-subtarget`).
    pub fn slug(&self) -> String {
        format!("{}-{}", self.board, self.subtarget)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board, self.subtarget)
    }
}

impl TryFrom<String> for Target {
    type Error = TargetParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Target::parse(&value)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

/// Where in the source history the job builds from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRevision {
    /// Branch tracked by the checkout, e.g. `openwrt-23.05` or `master`.
    pub branch: String,

    /// Release tag (`v23.05.2`); absent for snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// Fully resolved description of one rebuild run.
///
/// Produced once by the resolver and only ever borrowed afterwards. The job
/// owns every path it names; two jobs for different (version, target) pairs
/// never share a results directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    pub version: String,
    pub target: Target,
    pub revision: SourceRevision,

    /// Git URL of the build system sources.
    pub source_git: String,

    /// Base URL of the official download server.
    pub origin_url: String,

    pub build_dir: Utf8PathBuf,
    pub dl_dir: Utf8PathBuf,
    pub results_dir: Utf8PathBuf,

    /// Cache of official artifacts, keyed by (version, target).
    pub origin_cache_dir: Utf8PathBuf,

    /// Parallelism handed to the toolchain.
    pub jobs: usize,

    /// Run the deep-diff analyzer on mismatched artifacts.
    pub deep_diff: bool,

    /// Upper bound on concurrent digest/analyzer workers.
    pub diff_workers: usize,

    pub diffoscope_timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_timeout_secs: Option<u64>,

    /// Lines appended to the official `.config`.
    #[serde(default)]
    pub config_overrides: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches_dir: Option<Utf8PathBuf>,
}

impl BuildJob {
    pub fn is_snapshot(&self) -> bool {
        self.version == SNAPSHOT
    }

    /// Release directory on the origin server (`snapshots` or `releases/<version>`).
    pub fn release_dir(&self) -> String {
        if self.is_snapshot() {
            "snapshots".to_string()
        } else {
            format!("releases/{}", self.version)
        }
    }

    /// Target directory relative to the origin root.
    pub fn target_dir(&self) -> String {
        format!("{}/targets/{}", self.release_dir(), self.target)
    }

    /// Absolute URL of the official target directory, without trailing slash.
    pub fn target_url(&self) -> String {
        format!("{}/{}", self.origin_url.trim_end_matches('/'), self.target_dir())
    }

    pub fn bin_dir(&self) -> Utf8PathBuf {
        self.build_dir.join("bin")
    }

    /// Directory the toolchain drops target artifacts into.
    pub fn target_bin_dir(&self) -> Utf8PathBuf {
        self.bin_dir()
            .join("targets")
            .join(self.target.board())
            .join(self.target.subtarget())
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.results_dir.join("logs")
    }

    pub fn build_log_path(&self) -> Utf8PathBuf {
        self.log_dir().join("build.log")
    }

    pub fn report_path(&self) -> Utf8PathBuf {
        self.results_dir.join(crate::report::REPORT_FILE_NAME)
    }

    pub fn diff_dir(&self) -> Utf8PathBuf {
        self.results_dir.join("diffoscope")
    }

    /// Lock file guarding the shared build directory.
    pub fn lock_path(&self) -> Utf8PathBuf {
        let name = self.build_dir.file_name().unwrap_or("build");
        match self.build_dir.parent() {
            Some(parent) => parent.join(format!("{name}.lock")),
            None => Utf8PathBuf::from(format!("{name}.lock")),
        }
    }

    pub fn diffoscope_timeout(&self) -> Duration {
        Duration::from_secs(self.diffoscope_timeout_secs)
    }

    pub fn build_timeout(&self) -> Option<Duration> {
        self.build_timeout_secs.map(Duration::from_secs)
    }
}
