use camino::Utf8Path;
use rebuilder_types::job::BuildJob;
use std::process::Command;
use tracing::{info, warn};

use crate::ports::{BuildRequest, Toolchain, ToolchainExit};
use crate::process::{ProcessOutcome, run_supervised};

/// One toolchain invocation: program plus arguments, run in the build tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub program: String,
    pub args: Vec<String>,
}

impl Step {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// The sequence the official builders run, minus signing.
pub fn make_steps(job: &BuildJob, log_dir: &Utf8Path) -> Vec<Step> {
    let make = |jobs: usize, targets: &[&str]| {
        let mut args = vec![
            "IGNORE_ERRORS=n m".to_string(),
            "BUILD_LOG=1".to_string(),
            format!("BUILD_LOG_DIR={log_dir}"),
            format!("-j{jobs}"),
        ];
        args.extend(targets.iter().map(|s| s.to_string()));
        Step {
            program: "make".to_string(),
            args,
        }
    };
    let j = job.jobs;

    vec![
        Step::new("./scripts/feeds", &["update"]),
        Step::new("./scripts/feeds", &["install", "-a"]),
        make(j, &["defconfig"]),
        make(j, &["download"]),
        make(j, &["tools/tar/compile"]),
        make(j, &["tools/install"]),
        make(j, &["toolchain/install"]),
        make(j, &["target/compile"]),
        make(j, &["package/compile"]),
        make(j, &["package/install"]),
        make(j, &["package/index", "CONFIG_SIGNED_PACKAGES="]),
        make(j, &["target/install"]),
        make(j, &["buildinfo", "V=s"]),
        make(1, &["json_overview_image_info", "V=s"]),
        make(j, &["checksum", "V=s"]),
    ]
}

/// ccache settings handed to every step; the environment wins when set.
fn ccache_env() -> Vec<(&'static str, String)> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    [
        ("CCACHE_DIR", format!("{home}/.ccache")),
        ("CCACHE_MAXSIZE", "10G".to_string()),
        ("CCACHE_COMPRESS", "1".to_string()),
        ("CCACHE_COMPRESSLEVEL", "6".to_string()),
    ]
    .into_iter()
    .map(|(k, default)| (k, std::env::var(k).unwrap_or(default)))
    .collect()
}

/// The OpenWrt build system driven through `scripts/feeds` and `make`.
#[derive(Debug, Clone, Default)]
pub struct MakeToolchain;

impl Toolchain for MakeToolchain {
    fn build(&self, job: &BuildJob, request: &BuildRequest) -> anyhow::Result<ToolchainExit> {
        let env = ccache_env();
        let deadline = request.timeout.map(|t| std::time::Instant::now() + t);

        for step in make_steps(job, &job.log_dir()) {
            let remaining = match deadline {
                Some(d) => match d.checked_duration_since(std::time::Instant::now()) {
                    Some(left) => Some(left),
                    None => return Ok(ToolchainExit::TimedOut),
                },
                None => None,
            };

            info!(program = %step.program, args = ?step.args, "build step");
            let mut cmd = Command::new(&step.program);
            cmd.args(&step.args)
                .current_dir(&job.build_dir)
                .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
                .env("CONFIG_CCACHE", "y");

            match run_supervised(&mut cmd, &request.log, remaining, &request.cancel)? {
                ProcessOutcome::Exited(Some(0)) => continue,
                ProcessOutcome::Exited(code) => {
                    warn!(program = %step.program, args = ?step.args, ?code, "build step failed");
                    return Ok(ToolchainExit::Exited(code));
                }
                ProcessOutcome::TimedOut => return Ok(ToolchainExit::TimedOut),
                ProcessOutcome::Interrupted => return Ok(ToolchainExit::Interrupted),
            }
        }
        Ok(ToolchainExit::Exited(Some(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rebuilder_types::job::{SourceRevision, Target};

    fn job() -> BuildJob {
        BuildJob {
            version: "SNAPSHOT".into(),
            target: Target::parse("x86/64").unwrap(),
            revision: SourceRevision {
                branch: "master".into(),
                tag: None,
            },
            source_git: "https://github.com/openwrt/openwrt.git".into(),
            origin_url: "https://downloads.openwrt.org".into(),
            build_dir: Utf8PathBuf::from("/b"),
            dl_dir: Utf8PathBuf::from("/b/dl"),
            results_dir: Utf8PathBuf::from("/r"),
            origin_cache_dir: Utf8PathBuf::from("/c"),
            jobs: 9,
            deep_diff: false,
            diff_workers: 1,
            diffoscope_timeout_secs: 180,
            build_timeout_secs: None,
            config_overrides: vec![],
            patches_dir: None,
        }
    }

    #[test]
    fn steps_start_with_feeds_and_end_with_checksum() {
        let steps = make_steps(&job(), Utf8Path::new("/r/logs"));
        assert_eq!(steps[0], Step::new("./scripts/feeds", &["update"]));
        assert_eq!(steps[1], Step::new("./scripts/feeds", &["install", "-a"]));

        let last = steps.last().unwrap();
        assert_eq!(last.program, "make");
        assert_eq!(
            last.args,
            vec!["IGNORE_ERRORS=n m", "BUILD_LOG=1", "BUILD_LOG_DIR=/r/logs", "-j9", "checksum", "V=s"]
        );
    }

    #[test]
    fn image_info_runs_single_threaded_and_index_is_unsigned() {
        let steps = make_steps(&job(), Utf8Path::new("/r/logs"));
        let info = steps
            .iter()
            .find(|s| s.args.iter().any(|a| a == "json_overview_image_info"))
            .unwrap();
        assert!(info.args.contains(&"-j1".to_string()));

        let index = steps
            .iter()
            .find(|s| s.args.iter().any(|a| a == "package/index"))
            .unwrap();
        assert!(index.args.contains(&"CONFIG_SIGNED_PACKAGES=".to_string()));
    }
}
