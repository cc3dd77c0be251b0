//! The official build's own description of itself, published next to its
//! artifacts: `version.buildinfo`, `feeds.buildinfo` and `config.buildinfo`.

use rebuilder_types::job::BuildJob;
use tracing::{debug, info};

use crate::error::RebuildError;
use crate::ports::OriginPort;

pub const VERSION_BUILDINFO: &str = "version.buildinfo";
pub const FEEDS_BUILDINFO: &str = "feeds.buildinfo";
pub const CONFIG_BUILDINFO: &str = "config.buildinfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficialBuildInfo {
    /// e.g. `r12345-abc1234567`.
    pub version_line: String,
    /// Commit pinned by the official build.
    pub commit: String,
    /// Contents for `feeds.conf`.
    pub feeds: String,
    /// Official `.config`, before overrides.
    pub config: String,
}

impl OfficialBuildInfo {
    /// Fetch and parse all three buildinfo files. Any failure means we do not
    /// know what the official build built, so it is `SourceUnavailable`.
    pub fn fetch(origin: &dyn OriginPort, job: &BuildJob) -> Result<Self, RebuildError> {
        let get = |name: &str| {
            origin
                .fetch_text(job, name)
                .map_err(|e| RebuildError::SourceUnavailable(e.context(format!("fetch {name}"))))
        };

        let version_line = get(VERSION_BUILDINFO)?.trim().to_string();
        let commit = parse_commit(&version_line).ok_or_else(|| {
            RebuildError::SourceUnavailable(anyhow::anyhow!(
                "cannot find a commit in {VERSION_BUILDINFO} '{version_line}'"
            ))
        })?;
        info!(version = %version_line, commit = %commit, "official build info");

        let feeds = get(FEEDS_BUILDINFO)?;
        let config = get(CONFIG_BUILDINFO)?;
        debug!(feeds_lines = feeds.lines().count(), config_lines = config.lines().count(), "fetched buildinfo");

        Ok(Self {
            version_line,
            commit,
            feeds,
            config,
        })
    }

    /// Official config with `overrides` appended, one per line.
    pub fn render_config(&self, overrides: &[String]) -> String {
        let mut out = self.config.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        for line in overrides {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// The commit is the second `-`-separated field: `r12345-abc1234567`.
pub fn parse_commit(version_line: &str) -> Option<String> {
    let commit = version_line.trim().split('-').nth(1)?;
    if commit.len() < 7 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(commit.to_ascii_lowercase())
}
