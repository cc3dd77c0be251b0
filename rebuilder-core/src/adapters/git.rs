use anyhow::{Context, bail};
use camino::Utf8Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::ports::SourceControl;

/// Source control via the `git` command line.
#[derive(Debug, Clone)]
pub struct ShellGit {
    program: String,
}

impl Default for ShellGit {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl ShellGit {
    fn git(&self, dir: Option<&Utf8Path>, args: &[&str]) -> anyhow::Result<String> {
        let mut cmd = Command::new(&self.program);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        debug!(?args, dir = ?dir, "git");

        let out = cmd
            .output()
            .with_context(|| format!("run git {}", args.join(" ")))?;
        if !out.status.success() {
            bail!(
                "git {} failed ({}): {}",
                args.join(" "),
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

impl SourceControl for ShellGit {
    fn is_checkout(&self, dir: &Utf8Path) -> bool {
        dir.join(".git").exists()
            && self
                .git(Some(dir), &["rev-parse", "--is-inside-work-tree"])
                .is_ok_and(|s| s == "true")
    }

    fn clone_repo(&self, url: &str, branch: &str, dir: &Utf8Path) -> anyhow::Result<()> {
        if let Some(parent) = dir.parent() {
            fs_err::create_dir_all(parent)?;
        }
        self.git(None, &["clone", "--branch", branch, url, dir.as_str()])?;
        Ok(())
    }

    fn fetch(&self, dir: &Utf8Path) -> anyhow::Result<()> {
        // Only meaningful for shallow clones; a full clone rejects it.
        if let Err(e) = self.git(Some(dir), &["fetch", "--unshallow"]) {
            debug!(error = %e, "unshallow skipped");
        }
        self.git(Some(dir), &["fetch", "--all", "--tags", "--force"])?;
        Ok(())
    }

    fn reset_hard(&self, dir: &Utf8Path, rev: &str) -> anyhow::Result<()> {
        self.git(Some(dir), &["reset", "--hard", rev])?;
        Ok(())
    }

    fn checkout(&self, dir: &Utf8Path, rev: &str, new_branch: Option<&str>) -> anyhow::Result<()> {
        match new_branch {
            Some(branch) => self.git(Some(dir), &["checkout", "-f", "-B", branch, rev])?,
            None => self.git(Some(dir), &["checkout", "-f", rev])?,
        };
        Ok(())
    }

    fn apply_patch(&self, dir: &Utf8Path, patch: &Utf8Path) -> anyhow::Result<()> {
        self.git(Some(dir), &["apply", patch.as_str()])?;
        Ok(())
    }

    fn head(&self, dir: &Utf8Path) -> anyhow::Result<Option<String>> {
        match self.git(Some(dir), &["rev-parse", "HEAD"]) {
            Ok(sha) => Ok(Some(sha)),
            Err(e) => {
                warn!(error = %e, "cannot read HEAD");
                Ok(None)
            }
        }
    }
}
