//! Configuration file loading for openwrt-rebuilder.
//!
//! Discovers and loads `rebuilder.toml` from the working directory (or an
//! explicit `--config`). Values given on the command line or through the
//! environment take precedence over the file.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use rebuilder_core::adapters::DIFFOSCOPE_IMAGE;
use rebuilder_core::settings::DEFAULT_DIFFOSCOPE_TIMEOUT_SECS;
use serde::Deserialize;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "rebuilder.toml";

pub const DEFAULT_CONTAINER_RUNTIME: &str = "podman";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RebuilderConfig {
    /// Identity recorded in every report.
    pub tool: ToolConfig,
    pub build: BuildConfig,
    pub diffoscope: DiffoscopeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub maintainer: Option<String>,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Wall-clock limit for the whole toolchain sequence.
    pub timeout_secs: Option<u64>,
    pub patches_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffoscopeConfig {
    /// `podman`, `docker` or `native`.
    pub runtime: Option<String>,
    pub image: Option<String>,
    pub timeout_secs: Option<u64>,
    /// Concurrent digest/analyzer workers.
    pub workers: Option<usize>,
}

pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.is_file() {
        debug!(config = %path, "found config file");
        Some(path)
    } else {
        debug!(config = %path, "no config file");
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<RebuilderConfig> {
    let contents = fs::read_to_string(path)?;
    parse_config(&contents).with_context(|| format!("parse config file {path}"))
}

pub fn parse_config(contents: &str) -> anyhow::Result<RebuilderConfig> {
    let config: RebuilderConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// An explicit path must exist; a discovered one is optional.
pub fn load_or_default(
    explicit: Option<&Utf8Path>,
    cwd: &Utf8Path,
) -> anyhow::Result<RebuilderConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => match discover_config(cwd) {
            Some(path) => load_config(&path),
            None => Ok(RebuilderConfig::default()),
        },
    }
}

/// Values the command line may set that the file may also set.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub maintainer: Option<String>,
    pub contact: Option<String>,
    pub build_timeout_secs: Option<u64>,
    pub patches_dir: Option<String>,
    pub diffoscope_runtime: Option<String>,
    pub diffoscope_image: Option<String>,
    pub diffoscope_timeout_secs: Option<u64>,
    pub diff_workers: Option<usize>,
}

/// File and command line folded together, defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedConfig {
    pub maintainer: Option<String>,
    pub contact: Option<String>,
    pub build_timeout_secs: Option<u64>,
    pub patches_dir: Option<String>,
    pub diffoscope_runtime: String,
    pub diffoscope_image: String,
    pub diffoscope_timeout_secs: u64,
    pub diff_workers: Option<usize>,
}

pub struct ConfigMerger {
    config: RebuilderConfig,
}

impl ConfigMerger {
    pub fn new(config: RebuilderConfig) -> Self {
        Self { config }
    }

    pub fn merge(self, cli: CliOverrides) -> MergedConfig {
        let RebuilderConfig {
            tool,
            build,
            diffoscope,
        } = self.config;

        MergedConfig {
            maintainer: cli.maintainer.or(tool.maintainer),
            contact: cli.contact.or(tool.contact),
            build_timeout_secs: cli.build_timeout_secs.or(build.timeout_secs),
            patches_dir: cli.patches_dir.or(build.patches_dir),
            diffoscope_runtime: cli
                .diffoscope_runtime
                .or(diffoscope.runtime)
                .unwrap_or_else(|| DEFAULT_CONTAINER_RUNTIME.to_string()),
            diffoscope_image: cli
                .diffoscope_image
                .or(diffoscope.image)
                .unwrap_or_else(|| DIFFOSCOPE_IMAGE.to_string()),
            diffoscope_timeout_secs: cli
                .diffoscope_timeout_secs
                .or(diffoscope.timeout_secs)
                .unwrap_or(DEFAULT_DIFFOSCOPE_TIMEOUT_SECS),
            diff_workers: cli.diff_workers.or(diffoscope.workers),
        }
    }
}
