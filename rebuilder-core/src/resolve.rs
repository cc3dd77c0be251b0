//! Target Resolver: settings in, immutable `BuildJob` out. No I/O beyond
//! reading the current directory to absolutize `base_dir`.

use camino::{Utf8Path, Utf8PathBuf};
use rebuilder_types::job::{BuildJob, SNAPSHOT, SourceRevision, Target};
use std::thread::available_parallelism;
use tracing::debug;

use crate::error::RebuildError;
use crate::settings::RebuildSettings;

/// Appended to the official `.config`: skip artifacts the official builders
/// produce but a verifier has no use for, build the BPF toolchain from host
/// and enable ccache.
pub const CONFIG_OVERRIDES: &[&str] = &[
    "CONFIG_COLLECT_KERNEL_DEBUG=n",
    "CONFIG_IB=n",
    "CONFIG_SDK=n",
    "CONFIG_BPF_TOOLCHAIN_HOST=y",
    "CONFIG_MAKE_TOOLCHAIN=n",
    "CONFIG_CCACHE=y",
];

pub fn resolve(settings: &RebuildSettings) -> Result<BuildJob, RebuildError> {
    let target =
        Target::parse(&settings.target).map_err(|e| RebuildError::Config(e.to_string()))?;
    let version = settings.version.trim().to_string();
    validate_version(&version)?;
    let revision = revision_for(&version)?;

    let origin_url = settings.origin_url.trim_end_matches('/').to_string();
    if !(origin_url.starts_with("http://") || origin_url.starts_with("https://")) {
        return Err(RebuildError::Config(format!(
            "origin url must be http(s): '{}'",
            settings.origin_url
        )));
    }

    let cpus = available_parallelism().map(|n| n.get()).unwrap_or(1);
    let jobs = positive("parallelism", settings.jobs, cpus + 1)?;
    let diff_workers = positive("diff workers", settings.diff_workers, cpus)?;

    let base = absolute(&settings.base_dir)?;
    let place = |template: &str| -> Utf8PathBuf {
        let p = Utf8PathBuf::from(interpolate(template, &version, &target));
        if p.is_absolute() { p } else { base.join(p) }
    };

    let build_dir = place(
        settings
            .rebuild_dir
            .as_deref()
            .unwrap_or("build/${VERSION}/${TARGET}"),
    );
    let dl_dir = match settings.dl_path.as_deref() {
        Some(t) => place(t),
        None => build_dir.join("dl"),
    };
    let results_dir = place(
        settings
            .results_dir
            .as_deref()
            .unwrap_or("results/${VERSION}/${TARGET}"),
    );
    let origin_cache_dir = place(
        settings
            .origin_cache_dir
            .as_deref()
            .unwrap_or("cache/origin/${VERSION}/${TARGET}"),
    );
    let patches_dir = settings.patches_dir.as_deref().map(place);

    let source_git = settings
        .source_git
        .clone()
        .unwrap_or_else(|| format!("{}openwrt.git", settings.source_mirror));

    let job = BuildJob {
        version,
        target,
        revision,
        source_git,
        origin_url,
        build_dir,
        dl_dir,
        results_dir,
        origin_cache_dir,
        jobs,
        deep_diff: settings.deep_diff,
        diff_workers,
        diffoscope_timeout_secs: settings.diffoscope_timeout_secs,
        build_timeout_secs: settings.build_timeout_secs,
        config_overrides: CONFIG_OVERRIDES.iter().map(|s| s.to_string()).collect(),
        patches_dir,
    };
    debug!(target = %job.target, version = %job.version, build_dir = %job.build_dir, "resolved job");
    Ok(job)
}

fn validate_version(version: &str) -> Result<(), RebuildError> {
    if version.is_empty() {
        return Err(RebuildError::Config("version is empty".into()));
    }
    if version.contains('/') || version.chars().any(char::is_whitespace) {
        return Err(RebuildError::Config(format!(
            "invalid version '{version}': must not contain '/' or whitespace"
        )));
    }
    Ok(())
}

/// Branch (and tag, for releases) a version is built from.
///
/// `SNAPSHOT` tracks `master`; `23.05-SNAPSHOT` tracks `openwrt-23.05`;
/// `23.05.2` builds tag `v23.05.2` on `openwrt-23.05`.
pub fn revision_for(version: &str) -> Result<SourceRevision, RebuildError> {
    if version == SNAPSHOT {
        return Ok(SourceRevision {
            branch: "master".to_string(),
            tag: None,
        });
    }

    let (series, tag) = match version.strip_suffix("-SNAPSHOT") {
        Some(series) => (series, None),
        None => (version, Some(format!("v{version}"))),
    };

    let mut parts = series.split('.');
    let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
        return Err(RebuildError::Config(format!(
            "cannot derive a release branch from version '{version}'"
        )));
    };
    if major.is_empty() || minor.is_empty() {
        return Err(RebuildError::Config(format!(
            "cannot derive a release branch from version '{version}'"
        )));
    }
    // Drop any `-rcN` style suffix hanging off the minor component.
    let minor = minor.split('-').next().unwrap_or(minor);

    Ok(SourceRevision {
        branch: format!("openwrt-{major}.{minor}"),
        tag,
    })
}

pub fn interpolate(template: &str, version: &str, target: &Target) -> String {
    template
        .replace("${VERSION}", version)
        .replace("${TARGET}", &target.to_string())
        .replace("${BOARD}", target.board())
        .replace("${SUBTARGET}", target.subtarget())
}

fn positive(what: &str, value: Option<usize>, default: usize) -> Result<usize, RebuildError> {
    match value {
        Some(0) => Err(RebuildError::Config(format!("{what} must be at least 1"))),
        Some(n) => Ok(n),
        None => Ok(default),
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, RebuildError> {
    let abs = std::path::absolute(path)
        .map_err(|e| RebuildError::Config(format!("cannot absolutize '{path}': {e}")))?;
    Utf8PathBuf::from_path_buf(abs)
        .map_err(|p| RebuildError::Config(format!("non-UTF-8 base directory {}", p.display())))
}
