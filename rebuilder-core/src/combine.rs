//! Fold per-run reports under a results tree into one index.

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use fs_err as fs;
use glob::{Pattern, glob};
use rebuilder_artifacts::relative_to;
use rebuilder_render::render_index_md;
use rebuilder_types::report::{INDEX_FILE_NAME, REPORT_FILE_NAME};
use rebuilder_types::schema;
use rebuilder_types::wire::{IndexFailureV1, IndexV1, ReportV1};
use tracing::{debug, info, warn};

use crate::error::RebuildError;
use crate::ports::WritePort;

pub const INDEX_MD_FILE_NAME: &str = "index.md";

#[derive(Debug)]
pub struct CombineOutcome {
    pub index: IndexV1,
    pub index_path: Utf8PathBuf,
    /// Reports read successfully in this pass.
    pub reports: usize,
}

/// Collect every `report.json` below `results_root` and merge their
/// summaries into `<out_dir>/index.json`, keeping entries of an existing
/// index that this pass did not see.
pub fn combine(
    results_root: &Utf8Path,
    out_dir: &Utf8Path,
    writer: &dyn WritePort,
) -> Result<CombineOutcome, RebuildError> {
    if !results_root.is_dir() {
        return Err(RebuildError::Config(format!(
            "results directory {results_root} does not exist"
        )));
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let mut fresh = IndexV1::new(now);
    let mut reports = 0;

    for path in find_reports(results_root)? {
        let rel = relative_to(&path, results_root).to_string();
        match read_report(&path) {
            Ok(report) => {
                let entry = IndexV1::entry_for(&report, rel);
                let newer = fresh
                    .versions
                    .get(&report.version)
                    .and_then(|t| t.get(&report.target))
                    .is_none_or(|existing| existing.generated_at <= entry.generated_at);
                if newer {
                    fresh.upsert(&report.version, &report.target, entry);
                }
                reports += 1;
            }
            Err(e) => {
                warn!(report = %path, error = %format!("{e:#}"), "skipping unreadable report");
                fresh.failures.push(IndexFailureV1 {
                    path: rel,
                    reason: format!("{e:#}"),
                });
            }
        }
    }

    let index_path = out_dir.join(INDEX_FILE_NAME);
    let mut index = match load_existing(&index_path) {
        Some(existing) => existing,
        None => IndexV1::new(fresh.generated_at.clone()),
    };
    index.merge(fresh);

    write_index(&index, out_dir, writer).map_err(RebuildError::ReportWrite)?;
    info!(
        index = %index_path,
        reports,
        entries = index.entry_count(),
        failures = index.failures.len(),
        "index written"
    );

    Ok(CombineOutcome {
        index,
        index_path,
        reports,
    })
}

fn find_reports(root: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let pattern = format!("{}/**/{REPORT_FILE_NAME}", Pattern::escape(root.as_str()));
    let mut found: Vec<Utf8PathBuf> = glob(&pattern)
        .with_context(|| format!("glob {pattern}"))?
        .filter_map(Result::ok)
        .filter_map(|p| Utf8PathBuf::from_path_buf(p).ok())
        .filter(|p| p.is_file())
        .collect();
    found.sort();
    debug!(count = found.len(), root = %root, "found reports");
    Ok(found)
}

fn read_report(path: &Utf8Path) -> anyhow::Result<ReportV1> {
    let text = fs::read_to_string(path)?;
    let report: ReportV1 = serde_json::from_str(&text).context("parse report")?;
    if report.schema != schema::REBUILDER_REPORT_V1 {
        anyhow::bail!("unexpected schema '{}'", report.schema);
    }
    Ok(report)
}

/// An index that cannot be read is replaced rather than merged.
fn load_existing(path: &Utf8Path) -> Option<IndexV1> {
    if !path.is_file() {
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|text| serde_json::from_str::<IndexV1>(&text).map_err(anyhow::Error::from));
    match parsed {
        Ok(index) if index.schema == schema::REBUILDER_INDEX_V1 => Some(index),
        Ok(index) => {
            warn!(index = %path, schema = %index.schema, "existing index has another schema; replacing");
            None
        }
        Err(e) => {
            warn!(index = %path, error = %format!("{e:#}"), "existing index unreadable; replacing");
            None
        }
    }
}

fn write_index(index: &IndexV1, out_dir: &Utf8Path, writer: &dyn WritePort) -> anyhow::Result<()> {
    writer.create_dir_all(out_dir)?;
    let json = serde_json::to_string_pretty(index).context("serialize index")?;
    writer.write_file(&out_dir.join(INDEX_FILE_NAME), json.as_bytes())?;
    writer.write_file(
        &out_dir.join(INDEX_MD_FILE_NAME),
        render_index_md(index).as_bytes(),
    )?;
    Ok(())
}
