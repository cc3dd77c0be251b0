use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use glob::{Pattern, glob};
use rebuilder_types::artifact::{ArtifactAnomaly, ArtifactOrigin, ArtifactRef};
use rebuilder_types::job::Target;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::normalize::{NameNormalizationError, Normalized, RuleSet};
use crate::sha256sums::ChecksumEntry;

/// One side of the comparison, ready for pairing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Sorted by logical name, unique.
    pub artifacts: Vec<ArtifactRef>,
    /// Sorted by raw name.
    pub anomalies: Vec<ArtifactAnomaly>,
    /// Raw names excluded by an ignore rule.
    pub ignored: Vec<String>,
}

impl Enumeration {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.anomalies.is_empty()
    }
}

struct Candidate {
    raw_name: String,
    normalized: Result<Normalized, NameNormalizationError>,
    artifact: ArtifactRef,
}

/// Enumerate every regular file below `root`.
///
/// A missing `root` yields an empty enumeration: the caller decides whether
/// "nothing was built" is fatal.
pub fn enumerate_dir(
    root: &Utf8Path,
    origin: ArtifactOrigin,
    rules: &RuleSet,
    target: &Target,
) -> anyhow::Result<Enumeration> {
    if !root.is_dir() {
        debug!(root = %root, %origin, "artifact root missing; nothing to enumerate");
        return Ok(Enumeration::default());
    }

    let pattern = format!("{}/**/*", Pattern::escape(root.as_str()));
    debug!(pattern = %pattern, %origin, "scanning artifact tree");

    let mut candidates = Vec::new();
    let mut anomalies = Vec::new();

    for entry in glob(&pattern).with_context(|| format!("glob {pattern}"))? {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "unreadable entry while scanning artifacts");
                anomalies.push(ArtifactAnomaly {
                    raw_name: e.path().to_string_lossy().to_string(),
                    origin,
                    reason: format!("unreadable: {}", e.error()),
                });
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }

        let rel = path.strip_prefix(root.as_std_path()).unwrap_or(&path);
        let Some(raw_name) = rel.to_str().map(str::to_string) else {
            let lossy = rel.to_string_lossy().to_string();
            anomalies.push(ArtifactAnomaly {
                reason: NameNormalizationError::NotUtf8(lossy.clone()).to_string(),
                raw_name: lossy,
                origin,
            });
            continue;
        };

        let abs = root.join(&raw_name);
        let size = fs::metadata(&abs).map(|m| m.len()).ok();

        candidates.push(Candidate {
            normalized: rules.normalize(&raw_name, target),
            artifact: ArtifactRef {
                logical_name: String::new(),
                raw_name: raw_name.clone(),
                origin,
                path: Some(abs),
                url: None,
                size,
                declared_sha256: None,
            },
            raw_name,
        });
    }

    Ok(collect(candidates, anomalies, origin))
}

/// Enumerate an official checksum listing. Each artifact carries its declared
/// digest and a download URL under `base_url`.
pub fn enumerate_listing(
    entries: &[ChecksumEntry],
    base_url: &str,
    rules: &RuleSet,
    target: &Target,
) -> Enumeration {
    let origin = ArtifactOrigin::Official;
    let base = base_url.trim_end_matches('/');

    let candidates = entries
        .iter()
        .map(|entry| {
            let url_path = entry.path.trim_start_matches("./");
            Candidate {
                raw_name: entry.path.clone(),
                normalized: rules.normalize(&entry.path, target),
                artifact: ArtifactRef {
                    logical_name: String::new(),
                    raw_name: entry.path.clone(),
                    origin,
                    path: None,
                    url: Some(format!("{base}/{url_path}")),
                    size: None,
                    declared_sha256: Some(entry.sha256.clone()),
                },
            }
        })
        .collect();

    collect(candidates, Vec::new(), origin)
}

/// Resolve normalization outcomes and duplicate logical names.
///
/// Candidates are visited in raw-name order so the lexically-first raw path
/// wins a duplicate, independent of filesystem enumeration order.
fn collect(
    mut candidates: Vec<Candidate>,
    mut anomalies: Vec<ArtifactAnomaly>,
    origin: ArtifactOrigin,
) -> Enumeration {
    candidates.sort_by(|a, b| a.raw_name.cmp(&b.raw_name));

    let mut by_name: BTreeMap<String, ArtifactRef> = BTreeMap::new();
    let mut ignored = Vec::new();

    for candidate in candidates {
        match candidate.normalized {
            Ok(Normalized::Name(logical)) => {
                if let Some(kept) = by_name.get(&logical) {
                    debug!(name = %logical, kept = %kept.raw_name, dropped = %candidate.raw_name, "duplicate logical name");
                    anomalies.push(ArtifactAnomaly {
                        reason: format!(
                            "duplicate logical name '{logical}' (kept '{}')",
                            kept.raw_name
                        ),
                        raw_name: candidate.raw_name,
                        origin,
                    });
                    continue;
                }
                let mut artifact = candidate.artifact;
                artifact.logical_name = logical.clone();
                by_name.insert(logical, artifact);
            }
            Ok(Normalized::Ignored { rule }) => {
                debug!(name = %candidate.raw_name, rule = %rule, "ignored by normalization rule");
                ignored.push(candidate.raw_name);
            }
            Err(e) => {
                warn!(name = %candidate.raw_name, error = %e, %origin, "cannot normalize artifact name");
                anomalies.push(ArtifactAnomaly {
                    raw_name: candidate.raw_name,
                    origin,
                    reason: e.to_string(),
                });
            }
        }
    }

    anomalies.sort_by(|a, b| a.raw_name.cmp(&b.raw_name));

    Enumeration {
        artifacts: by_name.into_values().collect(),
        anomalies,
        ignored,
    }
}

/// Relative location of `path` below `root`, for report fields.
pub fn relative_to(path: &Utf8Path, root: &Utf8Path) -> Utf8PathBuf {
    path.strip_prefix(root)
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}
