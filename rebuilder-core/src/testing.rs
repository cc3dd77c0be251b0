//! In-memory port doubles shared by the pipeline-stage tests.

use anyhow::bail;
use camino::{Utf8Path, Utf8PathBuf};
use rebuilder_types::job::{BuildJob, SourceRevision, Target};
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::AnalyzerError;
use crate::ports::{BuildRequest, DiffAnalyzer, SourceControl, Toolchain, ToolchainExit, WritePort};

pub fn utf8(temp: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 temp dir")
}

pub fn job(root: &Utf8Path) -> BuildJob {
    BuildJob {
        version: "SNAPSHOT".into(),
        target: Target::parse("x86/64").expect("target"),
        revision: SourceRevision {
            branch: "master".into(),
            tag: None,
        },
        source_git: "https://example.invalid/openwrt.git".into(),
        origin_url: "https://downloads.example.invalid".into(),
        build_dir: root.join("build"),
        dl_dir: root.join("build/dl"),
        results_dir: root.join("results"),
        origin_cache_dir: root.join("cache"),
        jobs: 2,
        deep_diff: false,
        diff_workers: 2,
        diffoscope_timeout_secs: 5,
        build_timeout_secs: None,
        config_overrides: vec!["CONFIG_IB=n".into()],
        patches_dir: None,
    }
}

pub fn write(path: &Utf8Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent).expect("mkdir");
    }
    fs_err::write(path, contents).expect("write");
}

/// Lays out an official mirror for `job` under `root`, including the three
/// buildinfo files.
pub fn official_mirror(root: &Utf8Path, job: &BuildJob, files: &[(&str, &[u8])]) {
    let dir = root.join(job.target_dir());
    write(&dir.join("version.buildinfo"), b"r12345-abc1234567\n");
    write(&dir.join("feeds.buildinfo"), b"src-git packages https://example.invalid/packages.git^0123456\n");
    write(&dir.join("config.buildinfo"), b"CONFIG_TARGET_x86=y\n");
    for (name, body) in files {
        write(&dir.join(name), body);
    }
}

#[derive(Default)]
pub struct StubGit {
    pub calls: Mutex<Vec<String>>,
    pub fail_clone: bool,
    pub failing_patches: BTreeSet<String>,
}

impl StubGit {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock").push(call);
    }
}

impl SourceControl for StubGit {
    fn is_checkout(&self, dir: &Utf8Path) -> bool {
        dir.join(".git").is_dir()
    }

    fn clone_repo(&self, url: &str, branch: &str, dir: &Utf8Path) -> anyhow::Result<()> {
        self.record(format!("clone {url} {branch}"));
        if self.fail_clone {
            bail!("could not resolve host");
        }
        fs_err::create_dir_all(dir.join(".git"))?;
        Ok(())
    }

    fn fetch(&self, _dir: &Utf8Path) -> anyhow::Result<()> {
        self.record("fetch".into());
        Ok(())
    }

    fn reset_hard(&self, _dir: &Utf8Path, rev: &str) -> anyhow::Result<()> {
        self.record(format!("reset {rev}"));
        Ok(())
    }

    fn checkout(&self, _dir: &Utf8Path, rev: &str, new_branch: Option<&str>) -> anyhow::Result<()> {
        match new_branch {
            Some(b) => self.record(format!("checkout {rev} -B {b}")),
            None => self.record(format!("checkout {rev}")),
        }
        Ok(())
    }

    fn apply_patch(&self, _dir: &Utf8Path, patch: &Utf8Path) -> anyhow::Result<()> {
        let name = patch.file_name().unwrap_or_default().to_string();
        self.record(format!("apply {name}"));
        if self.failing_patches.contains(&name) {
            bail!("patch does not apply");
        }
        Ok(())
    }

    fn head(&self, _dir: &Utf8Path) -> anyhow::Result<Option<String>> {
        Ok(Some("abc1234567".into()))
    }
}

/// Materializes a fixed artifact set into the target bin dir, then exits as
/// configured.
pub struct StubToolchain {
    pub files: Vec<(String, Vec<u8>)>,
    pub exit: ToolchainExit,
}

impl StubToolchain {
    pub fn producing(files: &[(&str, &[u8])], exit: ToolchainExit) -> Self {
        Self {
            files: files
                .iter()
                .map(|(n, b)| (n.to_string(), b.to_vec()))
                .collect(),
            exit,
        }
    }
}

impl Toolchain for StubToolchain {
    fn build(&self, job: &BuildJob, request: &BuildRequest) -> anyhow::Result<ToolchainExit> {
        write(&request.log, b"stub build\n");
        let dir = job.target_bin_dir();
        for (name, body) in &self.files {
            write(&dir.join(name), body);
        }
        Ok(self.exit)
    }
}

/// Writes a small HTML document, or fails for names listed in `fail`.
#[derive(Default)]
pub struct StubAnalyzer {
    pub fail: BTreeSet<String>,
    pub calls: Mutex<Vec<String>>,
}

impl DiffAnalyzer for StubAnalyzer {
    fn analyze(
        &self,
        local: &Utf8Path,
        _official: &Utf8Path,
        out: &Utf8Path,
        timeout: Duration,
    ) -> Result<(), AnalyzerError> {
        let name = local.file_name().unwrap_or_default().to_string();
        self.calls.lock().expect("lock").push(name.clone());
        if self.fail.contains(&name) {
            return Err(AnalyzerError::Timeout(timeout.as_secs()));
        }
        write(out, b"<html>diff</html>");
        Ok(())
    }
}

/// Trips the token on its first call, as a signal arriving mid-diff would.
pub struct InterruptingAnalyzer {
    pub cancel: CancelToken,
}

impl DiffAnalyzer for InterruptingAnalyzer {
    fn analyze(
        &self,
        _local: &Utf8Path,
        _official: &Utf8Path,
        _out: &Utf8Path,
        _timeout: Duration,
    ) -> Result<(), AnalyzerError> {
        self.cancel.cancel();
        Err(AnalyzerError::Interrupted)
    }
}

#[derive(Default)]
pub struct MemWritePort {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemWritePort {
    pub fn get(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        self.files.lock().expect("lock").get(path.as_str()).cloned()
    }
}

impl WritePort for MemWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        self.files
            .lock()
            .expect("lock")
            .insert(path.as_str().replace('\\', "/"), contents.to_vec());
        Ok(())
    }

    fn create_dir_all(&self, _path: &Utf8Path) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails writes whose file name matches; everything else lands in `inner`.
#[derive(Default)]
pub struct SelectiveFailWritePort {
    pub fail_name: String,
    pub inner: MemWritePort,
}

impl SelectiveFailWritePort {
    pub fn failing_on(name: &str) -> Self {
        Self {
            fail_name: name.to_string(),
            inner: MemWritePort::default(),
        }
    }
}

impl WritePort for SelectiveFailWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        if path.file_name() == Some(self.fail_name.as_str()) {
            bail!("no space left on device writing {path}");
        }
        self.inner.write_file(path, contents)
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        self.inner.create_dir_all(path)
    }
}

pub struct FailingWritePort;

impl WritePort for FailingWritePort {
    fn write_file(&self, path: &Utf8Path, _contents: &[u8]) -> anyhow::Result<()> {
        bail!("no space left on device writing {path}")
    }

    fn create_dir_all(&self, _path: &Utf8Path) -> anyhow::Result<()> {
        Ok(())
    }
}
