//! Reconciler: pair local and official artifacts by logical name and compare
//! them by content.

use anyhow::Context;
use camino::Utf8PathBuf;
use rayon::prelude::*;
use rebuilder_artifacts::Enumeration;
use rebuilder_hash::sha256_file;
use rebuilder_types::artifact::{ArtifactAnomaly, ArtifactRef};
use rebuilder_types::compare::{Classification, ComparisonResult, DeepDiff};
use rebuilder_types::job::BuildJob;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{DigestError, RebuildError};
use crate::ports::{DiffAnalyzer, OriginPort};

enum Pair<'a> {
    Both(&'a ArtifactRef, &'a ArtifactRef),
    LocalOnly(&'a ArtifactRef),
    OfficialOnly(&'a ArtifactRef),
}

/// Compare every logical name in the union of both sides.
///
/// Pairs are processed on a bounded pool of `job.diff_workers` threads; the
/// result is sorted by name regardless of completion order. Per-artifact
/// failures become entries, never errors. Once `cancel` trips, remaining
/// pairs are skipped and the whole reconciliation is a hard failure.
pub fn reconcile(
    job: &BuildJob,
    local: &Enumeration,
    official: &Enumeration,
    origin: &dyn OriginPort,
    analyzer: Option<&dyn DiffAnalyzer>,
    cancel: &CancelToken,
) -> Result<Vec<ComparisonResult>, RebuildError> {
    let pairs = pair(local, official);
    info!(
        pairs = pairs.len(),
        local = local.artifacts.len(),
        official = official.artifacts.len(),
        workers = job.diff_workers,
        deep_diff = analyzer.is_some(),
        "reconciling"
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(job.diff_workers.max(1))
        .thread_name(|i| format!("reconcile-{i}"))
        .build()
        .context("build reconcile worker pool")?;

    let compared: Option<Vec<ComparisonResult>> = pool.install(|| {
        pairs
            .par_iter()
            .map(|p| (!cancel.is_cancelled()).then(|| compare(job, p, origin, analyzer)))
            .collect()
    });
    let mut results = match compared {
        Some(results) if !cancel.is_cancelled() => results,
        _ => {
            warn!("reconciliation interrupted");
            return Err(RebuildError::hard_failure("interrupted during reconciliation"));
        }
    };

    results.extend(local.anomalies.iter().map(|a| anomaly(a, Classification::LocalOnly)));
    results.extend(
        official
            .anomalies
            .iter()
            .map(|a| anomaly(a, Classification::OfficialOnly)),
    );

    results.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.classification.cmp(&b.classification))
    });
    Ok(results)
}

fn pair<'a>(local: &'a Enumeration, official: &'a Enumeration) -> Vec<Pair<'a>> {
    let mut by_name: BTreeMap<&str, (Option<&ArtifactRef>, Option<&ArtifactRef>)> =
        BTreeMap::new();
    for a in &local.artifacts {
        by_name.entry(a.logical_name.as_str()).or_default().0 = Some(a);
    }
    for a in &official.artifacts {
        by_name.entry(a.logical_name.as_str()).or_default().1 = Some(a);
    }

    by_name
        .into_values()
        .filter_map(|sides| match sides {
            (Some(l), Some(o)) => Some(Pair::Both(l, o)),
            (Some(l), None) => Some(Pair::LocalOnly(l)),
            (None, Some(o)) => Some(Pair::OfficialOnly(o)),
            (None, None) => None,
        })
        .collect()
}

fn compare(
    job: &BuildJob,
    pair: &Pair<'_>,
    origin: &dyn OriginPort,
    analyzer: Option<&dyn DiffAnalyzer>,
) -> ComparisonResult {
    match pair {
        Pair::LocalOnly(l) => {
            let r = ComparisonResult::new(&l.logical_name, Classification::LocalOnly);
            match local_digest(l) {
                Ok(sha) => ComparisonResult {
                    local_sha256: Some(sha),
                    ..r
                },
                Err(e) => {
                    warn!(name = %l.logical_name, error = %e, "cannot digest local artifact");
                    r.with_reason(e.to_string())
                }
            }
        }
        Pair::OfficialOnly(o) => {
            let mut r = ComparisonResult::new(&o.logical_name, Classification::OfficialOnly);
            r.official_sha256 = o.declared_sha256.clone();
            r
        }
        Pair::Both(l, o) => compare_both(job, l, o, origin, analyzer),
    }
}

fn compare_both(
    job: &BuildJob,
    local: &ArtifactRef,
    official: &ArtifactRef,
    origin: &dyn OriginPort,
    analyzer: Option<&dyn DiffAnalyzer>,
) -> ComparisonResult {
    let name = &local.logical_name;
    let local_sha = local_digest(local);
    let official_sha = official_digest(job, official, origin);

    let mut result = ComparisonResult::new(name, Classification::Mismatched);
    result.local_sha256 = local_sha.as_ref().ok().cloned();
    result.official_sha256 = official_sha.as_ref().ok().cloned();

    if let Err(e) = local_sha.as_ref().and(official_sha.as_ref()) {
        warn!(name = %name, error = %e, "cannot digest artifact");
        return result.with_reason(e.to_string());
    }

    if result.local_sha256 == result.official_sha256 {
        result.classification = Classification::Matched;
        return result;
    }

    debug!(name = %name, "content differs");
    if let Some(analyzer) = analyzer {
        result.diffoscope = Some(deep_diff(job, local, official, origin, analyzer));
    }
    result
}

fn local_digest(artifact: &ArtifactRef) -> Result<String, DigestError> {
    let path = artifact.path.as_ref().ok_or_else(|| DigestError::Unreadable {
        path: artifact.raw_name.clone(),
        message: "no local path".to_string(),
    })?;
    sha256_file(path)
        .map(|d| d.sha256)
        .map_err(|e| DigestError::Unreadable {
            path: path.to_string(),
            message: e.to_string(),
        })
}

/// The declared digest when the listing carries one, else the streamed
/// digest of the materialized file.
fn official_digest(
    job: &BuildJob,
    artifact: &ArtifactRef,
    origin: &dyn OriginPort,
) -> Result<String, DigestError> {
    if let Some(declared) = &artifact.declared_sha256 {
        return Ok(declared.clone());
    }
    let unobtainable = |message: String| DigestError::Unobtainable {
        name: artifact.logical_name.clone(),
        message,
    };
    let path = origin
        .materialize(job, artifact)
        .map_err(|e| unobtainable(format!("{e:#}")))?;
    sha256_file(&path)
        .map(|d| d.sha256)
        .map_err(|e| unobtainable(e.to_string()))
}

fn deep_diff(
    job: &BuildJob,
    local: &ArtifactRef,
    official: &ArtifactRef,
    origin: &dyn OriginPort,
    analyzer: &dyn DiffAnalyzer,
) -> DeepDiff {
    let name = &local.logical_name;
    let rel = Utf8PathBuf::from("diffoscope").join(format!("{name}.html"));

    let Some(local_path) = &local.path else {
        return DeepDiff::Unavailable {
            reason: "no local path".to_string(),
        };
    };
    let official_path = match origin.materialize(job, official) {
        Ok(p) => p,
        Err(e) => {
            warn!(name = %name, error = %format!("{e:#}"), "cannot fetch official artifact for deep diff");
            return DeepDiff::Unavailable {
                reason: format!("official artifact unavailable: {e:#}"),
            };
        }
    };

    let out = job.results_dir.join(&rel);
    match analyzer.analyze(local_path, &official_path, &out, job.diffoscope_timeout()) {
        Ok(()) => {
            debug!(name = %name, out = %out, "deep diff written");
            DeepDiff::Available { path: rel }
        }
        Err(e) => {
            warn!(name = %name, error = %e, "deep diff unavailable");
            DeepDiff::Unavailable {
                reason: e.to_string(),
            }
        }
    }
}

fn anomaly(a: &ArtifactAnomaly, classification: Classification) -> ComparisonResult {
    ComparisonResult::new(&a.raw_name, classification).with_reason(&a.reason)
}
