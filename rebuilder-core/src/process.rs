//! Child-process supervision: output to a log file, bounded wall clock,
//! cancellation.

use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;

const POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exit status; `None` when the child was killed by a signal.
    Exited(Option<i32>),
    TimedOut,
    Interrupted,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        matches!(self, ProcessOutcome::Exited(Some(0)))
    }
}

/// Run `cmd` to completion, appending stdout and stderr to `log`.
///
/// The child is killed when `timeout` elapses or `cancel` trips.
pub fn run_supervised(
    cmd: &mut Command,
    log: &Utf8Path,
    timeout: Option<Duration>,
    cancel: &CancelToken,
) -> anyhow::Result<ProcessOutcome> {
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent)?;
    }
    let (out, _) = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)?
        .into_parts();
    let err = out.try_clone().with_context(|| format!("clone log handle {log}"))?;

    debug!(command = ?cmd, log = %log, "spawning");
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err))
        .spawn()
        .with_context(|| format!("spawn {:?}", cmd.get_program()))?;

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        if let Some(status) = child.wait_timeout(POLL).context("wait for child")? {
            return Ok(ProcessOutcome::Exited(status.code()));
        }

        let outcome = if cancel.is_cancelled() {
            ProcessOutcome::Interrupted
        } else if deadline.is_some_and(|d| Instant::now() >= d) {
            ProcessOutcome::TimedOut
        } else {
            continue;
        };

        warn!(command = ?cmd.get_program(), ?outcome, "terminating child");
        if let Err(e) = child.kill() {
            warn!(error = %e, "kill failed; child may have exited already");
        }
        let _ = child.wait();
        return Ok(outcome);
    }
}
