//! Clap-free settings for the rebuild pipeline.

use camino::Utf8PathBuf;
use rebuilder_artifacts::RuleSet;

pub const DEFAULT_TARGET: &str = "x86/64";
pub const DEFAULT_VERSION: &str = "SNAPSHOT";
pub const DEFAULT_SOURCE_MIRROR: &str = "https://github.com/openwrt/";
pub const DEFAULT_ORIGIN_URL: &str = "https://downloads.openwrt.org";
pub const DEFAULT_DIFFOSCOPE_TIMEOUT_SECS: u64 = 180;

/// Raw, unvalidated inputs. Turned into a `BuildJob` by [`crate::resolve`].
///
/// Path overrides may contain `${VERSION}`, `${TARGET}`, `${BOARD}` and
/// `${SUBTARGET}`; relative paths are taken relative to `base_dir`.
#[derive(Debug, Clone)]
pub struct RebuildSettings {
    pub target: String,
    pub version: String,

    /// Mirror prefix; the source repository defaults to `<mirror>openwrt.git`.
    pub source_mirror: String,
    pub source_git: Option<String>,
    pub origin_url: String,

    pub base_dir: Utf8PathBuf,
    pub rebuild_dir: Option<String>,
    pub dl_path: Option<String>,
    pub results_dir: Option<String>,
    pub origin_cache_dir: Option<String>,
    pub patches_dir: Option<String>,

    pub deep_diff: bool,
    pub jobs: Option<usize>,
    pub diff_workers: Option<usize>,
    pub build_timeout_secs: Option<u64>,
    pub diffoscope_timeout_secs: u64,
}

impl Default for RebuildSettings {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            version: DEFAULT_VERSION.to_string(),
            source_mirror: DEFAULT_SOURCE_MIRROR.to_string(),
            source_git: None,
            origin_url: DEFAULT_ORIGIN_URL.to_string(),
            base_dir: Utf8PathBuf::from("."),
            rebuild_dir: None,
            dl_path: None,
            results_dir: None,
            origin_cache_dir: None,
            patches_dir: None,
            deep_diff: false,
            jobs: None,
            diff_workers: None,
            build_timeout_secs: None,
            diffoscope_timeout_secs: DEFAULT_DIFFOSCOPE_TIMEOUT_SECS,
        }
    }
}

/// Per-invocation switches that are not part of the job identity.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Reconcile whatever is already in the build tree.
    pub skip_build: bool,
    pub rules: RuleSet,
}
