use anyhow::Context;
use camino::Utf8Path;
use fs_err as fs;
use std::io::Write;
use tempfile::NamedTempFile;

use crate::ports::WritePort;

/// Filesystem writes via temp file + rename in the destination directory.
#[derive(Debug, Clone, Default)]
pub struct FsWritePort;

impl WritePort for FsWritePort {
    fn write_file(&self, path: &Utf8Path, contents: &[u8]) -> anyhow::Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_str().is_empty() => p,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("create temp file in {parent}"))?;
        tmp.write_all(contents)
            .with_context(|| format!("write temp file for {path}"))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("sync temp file for {path}"))?;
        tmp.persist(path)
            .with_context(|| format!("rename temp file onto {path}"))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Utf8Path) -> anyhow::Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }
}
