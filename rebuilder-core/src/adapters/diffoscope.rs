use camino::{Utf8Path, Utf8PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::AnalyzerError;
use crate::ports::DiffAnalyzer;
use crate::process::{ProcessOutcome, run_supervised};

pub const DIFFOSCOPE_IMAGE: &str = "registry.salsa.debian.org/reproducible-builds/diffoscope";

/// diffoscope, either in a container (`podman`, `docker`) or as a host
/// binary (runtime `native`).
#[derive(Debug, Clone)]
pub struct Diffoscope {
    runtime: String,
    image: String,
    cancel: CancelToken,
}

impl Diffoscope {
    pub fn new(runtime: impl Into<String>, image: impl Into<String>, cancel: CancelToken) -> Self {
        Self {
            runtime: runtime.into(),
            image: image.into(),
            cancel,
        }
    }

    pub fn command(&self, local: &Utf8Path, official: &Utf8Path, out: &Utf8Path) -> Command {
        let diff_args = [official.as_str(), local.as_str(), "--html", out.as_str()];

        if self.runtime == "native" {
            let mut cmd = Command::new("diffoscope");
            cmd.args(diff_args);
            return cmd;
        }

        let out_dir = out.parent().unwrap_or(Utf8Path::new("."));
        let mut cmd = Command::new(&self.runtime);
        cmd.args(["run", "--rm"])
            .arg("-v")
            .arg(format!("{official}:{official}:ro"))
            .arg("-v")
            .arg(format!("{local}:{local}:ro"))
            .arg("-v")
            .arg(format!("{out_dir}:{out_dir}:rw"))
            .arg(&self.image)
            .args(diff_args);
        cmd
    }
}

impl DiffAnalyzer for Diffoscope {
    fn analyze(
        &self,
        local: &Utf8Path,
        official: &Utf8Path,
        out: &Utf8Path,
        timeout: Duration,
    ) -> Result<(), AnalyzerError> {
        if let Some(parent) = out.parent() {
            fs_err::create_dir_all(parent).map_err(|e| AnalyzerError::Failed(e.to_string()))?;
        }
        // A report left by an earlier run must not pass for this run's output.
        match fs_err::remove_file(out) {
            Ok(()) => debug!(out = %out, "removed stale diff output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AnalyzerError::Failed(e.to_string())),
        }
        let log = Utf8PathBuf::from(format!("{out}.log"));
        let mut cmd = self.command(local, official, out);
        debug!(out = %out, "running diffoscope");

        let outcome = run_supervised(&mut cmd, &log, Some(timeout), &self.cancel)
            .map_err(|e| AnalyzerError::Failed(format!("{e:#}")))?;

        match outcome {
            // 1 means "differences found", which is the expected case here.
            ProcessOutcome::Exited(Some(0 | 1)) if out.is_file() => Ok(()),
            ProcessOutcome::Exited(Some(0 | 1)) => Err(AnalyzerError::Failed(format!(
                "no output written to {out}"
            ))),
            ProcessOutcome::Exited(code) => Err(AnalyzerError::Failed(format!(
                "exited with {code:?}; see {log}"
            ))),
            ProcessOutcome::TimedOut => Err(AnalyzerError::Timeout(timeout.as_secs())),
            ProcessOutcome::Interrupted => Err(AnalyzerError::Interrupted),
        }
    }
}
