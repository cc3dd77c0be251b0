use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::compare::ClassificationCounts;
use crate::report::{BuildStatus, OverallStatus};
use crate::schema;
use crate::wire::ReportV1;

/// Schema-exact wire representation of openwrt-rebuilder.index.v1.
///
/// `versions` maps version -> target -> latest run summary. `BTreeMap` keeps
/// the serialized order stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexV1 {
    pub schema: String,
    pub generated_at: String,

    #[serde(default)]
    pub versions: BTreeMap<String, BTreeMap<String, IndexEntryV1>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<IndexFailureV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntryV1 {
    pub status: OverallStatus,
    pub build_status: BuildStatus,
    pub counts: ClassificationCounts,

    /// Report location relative to the combined results root.
    pub report: String,

    /// `run.ended_at` of the summarized report.
    pub generated_at: String,
}

/// A report that could not be read while combining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFailureV1 {
    pub path: String,
    pub reason: String,
}

impl IndexV1 {
    pub fn new(generated_at: impl Into<String>) -> Self {
        Self {
            schema: schema::REBUILDER_INDEX_V1.to_string(),
            generated_at: generated_at.into(),
            versions: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn entry_for(report: &ReportV1, report_path: impl Into<String>) -> IndexEntryV1 {
        IndexEntryV1 {
            status: report.status,
            build_status: report.build.status,
            counts: report.counts,
            report: report_path.into(),
            generated_at: report.run.ended_at.clone(),
        }
    }

    /// Insert or replace the entry for (version, target).
    pub fn upsert(&mut self, version: &str, target: &str, entry: IndexEntryV1) {
        self.versions
            .entry(version.to_string())
            .or_default()
            .insert(target.to_string(), entry);
    }

    /// Merge `newer` into `self`; entries in `newer` win. Failures are taken
    /// from `newer` only, since older failures may since have been rebuilt.
    pub fn merge(&mut self, newer: IndexV1) {
        for (version, targets) in newer.versions {
            let slot = self.versions.entry(version).or_default();
            for (target, entry) in targets {
                slot.insert(target, entry);
            }
        }
        self.failures = newer.failures;
        self.generated_at = newer.generated_at;
    }

    pub fn entry_count(&self) -> usize {
        self.versions.values().map(BTreeMap::len).sum()
    }
}
