mod config;

use anyhow::Context;
use camino::Utf8PathBuf;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use config::{CliOverrides, ConfigMerger};
use rebuilder_artifacts::RuleSet;
use rebuilder_core::adapters::{
    Diffoscope, FsWritePort, HttpOrigin, MakeToolchain, MirrorOrigin, ShellGit,
};
use rebuilder_core::combine::combine;
use rebuilder_core::ports::OriginPort;
use rebuilder_core::settings::{
    DEFAULT_ORIGIN_URL, DEFAULT_SOURCE_MIRROR, DEFAULT_TARGET, DEFAULT_VERSION,
};
use rebuilder_core::{
    CancelToken, Ports, RebuildError, RebuildSettings, ToolInfo, VerifyOptions, resolve,
    run_verify,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const TOOL_NAME: &str = "openwrt-rebuilder";

/// Per-request limit for the official download server.
const HTTP_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Parser)]
#[command(
    name = "openwrt-rebuilder",
    version,
    about = "Rebuild OpenWrt firmware from source and verify it against the official artifacts."
)]
struct Cli {
    /// More log output (-v debug, -vv trace). Without it, RUST_LOG applies.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Provision, build, reconcile and write the verification report.
    Run(Box<RunArgs>),
    /// Merge every report.json under a results tree into index.json.
    Combine(CombineArgs),
    /// List the artifact name normalization rules.
    Rules(RulesArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Target as board/subtarget (board-subtarget is accepted too).
    #[arg(long, env = "TARGET", default_value = DEFAULT_TARGET)]
    target: String,

    /// OpenWrt version: SNAPSHOT, X.Y-SNAPSHOT or X.Y.Z.
    #[arg(long = "openwrt-version", env = "VERSION", default_value = DEFAULT_VERSION)]
    openwrt_version: String,

    /// Prefix the source repository is cloned from.
    #[arg(long, env = "SOURCE_MIRROR", default_value = DEFAULT_SOURCE_MIRROR)]
    source_mirror: String,

    /// Source repository URL (default: <SOURCE_MIRROR>openwrt.git).
    #[arg(long, env = "OPENWRT_GIT")]
    openwrt_git: Option<String>,

    /// Official download server.
    #[arg(long, env = "ORIGIN_URL", default_value = DEFAULT_ORIGIN_URL)]
    origin_url: String,

    /// Build directory (default: ./build/${VERSION}/${TARGET}).
    #[arg(long, env = "REBUILD_DIR")]
    rebuild_dir: Option<String>,

    /// Download cache (default: <REBUILD_DIR>/dl).
    #[arg(long, env = "DL_PATH")]
    dl_path: Option<String>,

    /// Results directory (default: ./results/${VERSION}/${TARGET}).
    #[arg(long, env = "RESULTS_DIR")]
    results_dir: Option<String>,

    /// Cache of downloaded official artifacts.
    #[arg(long, env = "ORIGIN_CACHE_DIR")]
    origin_cache_dir: Option<String>,

    /// Directory of *.patch files applied to the checkout.
    #[arg(long, env = "PATCHES_DIR")]
    patches_dir: Option<String>,

    /// Run diffoscope on mismatched artifacts.
    #[arg(
        long,
        env = "USE_DIFFOSCOPE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    diffoscope: bool,

    /// Never run diffoscope, even when USE_DIFFOSCOPE is set.
    #[arg(long)]
    no_diffoscope: bool,

    /// Parallelism handed to make.
    #[arg(short = 'j', long = "jobs", env = "j")]
    jobs: Option<usize>,

    /// Concurrent digest/diffoscope workers.
    #[arg(long)]
    diff_workers: Option<usize>,

    /// Build wall-clock limit in seconds.
    #[arg(long, env = "BUILD_TIMEOUT")]
    build_timeout: Option<u64>,

    /// Per-artifact diffoscope limit in seconds.
    #[arg(long, env = "DIFFOSCOPE_TIMEOUT")]
    diffoscope_timeout: Option<u64>,

    /// Container runtime for diffoscope (podman, docker) or `native`.
    #[arg(long)]
    diffoscope_runtime: Option<String>,

    #[arg(long)]
    diffoscope_image: Option<String>,

    /// Recorded in the report.
    #[arg(long)]
    maintainer: Option<String>,

    /// Recorded in the report.
    #[arg(long)]
    contact: Option<String>,

    /// Config file (default: ./rebuilder.toml when present).
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Read official artifacts from a local mirror of the download server.
    #[arg(long)]
    official_dir: Option<Utf8PathBuf>,

    /// Reconcile the existing build tree without provisioning or building.
    #[arg(long)]
    skip_build: bool,

    /// Resolve the job, print it as JSON and exit.
    #[arg(long)]
    validate_only: bool,
}

#[derive(Debug, Parser)]
struct CombineArgs {
    /// Results tree to search for report.json files.
    results: Utf8PathBuf,

    /// Where index.json and index.md go (default: the results tree).
    #[arg(long)]
    out: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct RulesArgs {
    /// Output format (text, json).
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.cmd {
        Command::Run(args) => cmd_run(*args),
        Command::Combine(args) => cmd_combine(args),
        Command::Rules(args) => cmd_rules(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(args: RunArgs) -> Result<(), RebuildError> {
    let cwd = current_dir()?;
    let file_config = config::load_or_default(args.config.as_deref(), &cwd)
        .map_err(|e| RebuildError::Config(format!("{e:#}")))?;
    let merged = ConfigMerger::new(file_config).merge(CliOverrides {
        maintainer: args.maintainer,
        contact: args.contact,
        build_timeout_secs: args.build_timeout,
        patches_dir: args.patches_dir,
        diffoscope_runtime: args.diffoscope_runtime,
        diffoscope_image: args.diffoscope_image,
        diffoscope_timeout_secs: args.diffoscope_timeout,
        diff_workers: args.diff_workers,
    });

    let settings = RebuildSettings {
        target: args.target,
        version: args.openwrt_version,
        source_mirror: args.source_mirror,
        source_git: args.openwrt_git,
        origin_url: args.origin_url,
        base_dir: cwd,
        rebuild_dir: args.rebuild_dir,
        dl_path: args.dl_path,
        results_dir: args.results_dir,
        origin_cache_dir: args.origin_cache_dir,
        patches_dir: merged.patches_dir.clone(),
        deep_diff: args.diffoscope && !args.no_diffoscope,
        jobs: args.jobs,
        diff_workers: merged.diff_workers,
        build_timeout_secs: merged.build_timeout_secs,
        diffoscope_timeout_secs: merged.diffoscope_timeout_secs,
    };
    let job = resolve(&settings)?;

    if args.validate_only {
        let json = serde_json::to_string_pretty(&job).context("serialize job")?;
        println!("{json}");
        return Ok(());
    }

    let cancel = CancelToken::new();
    cancel.install_signal_handlers()?;

    let origin: Box<dyn OriginPort> = match args.official_dir {
        Some(dir) => {
            info!(mirror = %dir, "using local mirror for official artifacts");
            Box::new(MirrorOrigin::new(dir))
        }
        None => Box::new(HttpOrigin::new(HTTP_TIMEOUT)?),
    };
    let analyzer = Diffoscope::new(
        merged.diffoscope_runtime.as_str(),
        merged.diffoscope_image.as_str(),
        cancel.clone(),
    );
    let git = ShellGit::default();
    let ports = Ports {
        git: &git,
        origin: origin.as_ref(),
        toolchain: &MakeToolchain,
        analyzer: Some(&analyzer),
        writer: &FsWritePort,
    };
    let options = VerifyOptions {
        skip_build: args.skip_build,
        rules: RuleSet::v1(),
    };
    let tool = ToolInfo {
        name: TOOL_NAME.to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        maintainer: merged.maintainer,
        contact: merged.contact,
    };

    let outcome = run_verify(&job, &options, &ports, tool, &cancel)?;
    info!(
        status = outcome.report.status.as_str(),
        total = outcome.report.counts.total(),
        "run complete"
    );
    println!("{}", outcome.report_path);
    Ok(())
}

fn cmd_combine(args: CombineArgs) -> Result<(), RebuildError> {
    let out = args.out.unwrap_or_else(|| args.results.clone());
    let outcome = combine(&args.results, &out, &FsWritePort)?;
    println!("{}", outcome.index_path);
    Ok(())
}

fn cmd_rules(args: RulesArgs) -> Result<(), RebuildError> {
    let rules = RuleSet::v1();
    match args.format {
        OutputFormat::Text => {
            println!("Rule set {}:\n", rules.version());
            println!("  {:<20} {:<14} DESCRIPTION", "ID", "SCOPE");
            println!("  {:<20} {:<14} -----------", "--", "-----");
            for rule in rules.rules() {
                println!(
                    "  {:<20} {:<14} {}",
                    rule.id,
                    rule.scope.to_string(),
                    rule.description
                );
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&rules).context("serialize rules")?;
            println!("{json}");
        }
    }
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf, RebuildError> {
    let cwd = std::env::current_dir().context("read current directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| RebuildError::Config(format!("current directory is not UTF-8: {}", p.display())))
}
