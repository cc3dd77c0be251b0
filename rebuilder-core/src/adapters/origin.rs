use anyhow::{Context, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use rebuilder_artifacts::{Enumeration, RuleSet, enumerate_dir, enumerate_listing, parse_sha256sums};
use rebuilder_hash::sha256_file;
use rebuilder_types::artifact::{ArtifactOrigin, ArtifactRef};
use rebuilder_types::job::BuildJob;
use reqwest::blocking::{Client, Response};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::ports::OriginPort;

const CHECKSUMS: &str = "sha256sums";

/// The official download server over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpOrigin {
    client: Client,
}

impl HttpOrigin {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .user_agent(concat!("openwrt-rebuilder/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> anyhow::Result<Response> {
        debug!(url = %url, "GET");
        self.client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))
    }
}

impl OriginPort for HttpOrigin {
    fn fetch_text(&self, job: &BuildJob, name: &str) -> anyhow::Result<String> {
        let url = format!("{}/{}", job.target_url(), name);
        self.get(&url)?
            .text()
            .with_context(|| format!("read body of {url}"))
    }

    fn listing(&self, job: &BuildJob, rules: &RuleSet) -> anyhow::Result<Enumeration> {
        let text = self.fetch_text(job, CHECKSUMS)?;
        let listing = parse_sha256sums(&text);
        for skipped in &listing.skipped {
            warn!(line = skipped.line, reason = %skipped.reason, "skipping sha256sums line");
        }
        Ok(enumerate_listing(
            &listing.entries,
            &job.target_url(),
            rules,
            &job.target,
        ))
    }

    fn materialize(&self, job: &BuildJob, artifact: &ArtifactRef) -> anyhow::Result<Utf8PathBuf> {
        if let Some(path) = &artifact.path {
            return Ok(path.clone());
        }
        let url = artifact
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("no download location for {}", artifact.logical_name))?;

        let dest = job
            .origin_cache_dir
            .join(artifact.raw_name.trim_start_matches("./"));
        if cached_copy_is_valid(&dest, artifact.declared_sha256.as_deref()) {
            debug!(path = %dest, "origin cache hit");
            return Ok(dest);
        }

        let parent = dest
            .parent()
            .ok_or_else(|| anyhow!("cache path {dest} has no parent"))?;
        fs::create_dir_all(parent)?;

        info!(url = %url, "downloading official artifact");
        let mut response = self.get(url)?;
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("create temp file in {parent}"))?;
        response
            .copy_to(&mut tmp)
            .with_context(|| format!("download {url}"))?;
        tmp.flush()?;

        if let Some(declared) = artifact.declared_sha256.as_deref() {
            let tmp_path = Utf8Path::from_path(tmp.path())
                .ok_or_else(|| anyhow!("non-UTF-8 temp path"))?;
            let got = sha256_file(tmp_path)?;
            if got.sha256 != declared {
                bail!(
                    "downloaded {url} has sha256 {} but the listing declares {declared}",
                    got.sha256
                );
            }
        }

        tmp.persist(&dest)
            .with_context(|| format!("store {dest}"))?;
        Ok(dest)
    }
}

/// A cached official file is reused only when it still matches the listing.
fn cached_copy_is_valid(path: &Utf8Path, declared: Option<&str>) -> bool {
    if !path.is_file() {
        return false;
    }
    match declared {
        Some(declared) => sha256_file(path).is_ok_and(|d| d.sha256 == declared),
        None => true,
    }
}

/// A local mirror laid out like the download server
/// (`<root>/snapshots/targets/<board>/<subtarget>/...`).
#[derive(Debug, Clone)]
pub struct MirrorOrigin {
    root: Utf8PathBuf,
}

impl MirrorOrigin {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn target_root(&self, job: &BuildJob) -> Utf8PathBuf {
        self.root.join(job.target_dir())
    }
}

impl OriginPort for MirrorOrigin {
    fn fetch_text(&self, job: &BuildJob, name: &str) -> anyhow::Result<String> {
        Ok(fs::read_to_string(self.target_root(job).join(name))?)
    }

    fn listing(&self, job: &BuildJob, rules: &RuleSet) -> anyhow::Result<Enumeration> {
        let root = self.target_root(job);
        if !root.is_dir() {
            bail!("mirror has no target directory {root}");
        }
        enumerate_dir(&root, ArtifactOrigin::Official, rules, &job.target)
    }

    fn materialize(&self, _job: &BuildJob, artifact: &ArtifactRef) -> anyhow::Result<Utf8PathBuf> {
        artifact
            .path
            .clone()
            .ok_or_else(|| anyhow!("mirror artifact {} has no path", artifact.logical_name))
    }
}
