use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Matched,
    Mismatched,
    LocalOnly,
    OfficialOnly,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Matched => "matched",
            Classification::Mismatched => "mismatched",
            Classification::LocalOnly => "local_only",
            Classification::OfficialOnly => "official_only",
        }
    }
}

/// Outcome of running the external analyzer on a mismatched pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeepDiff {
    /// Diff document written to `path` (relative to the results directory).
    Available { path: Utf8PathBuf },
    /// Analyzer failed or timed out.
    Unavailable { reason: String },
}

impl DeepDiff {
    pub fn is_available(&self) -> bool {
        matches!(self, DeepDiff::Available { .. })
    }
}

/// Per-artifact reconciliation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub name: String,
    pub category: ArtifactCategory,
    pub classification: Classification,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub official_sha256: Option<String>,

    /// Why the entry is not a plain content comparison (digest failure,
    /// normalization anomaly, duplicate name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffoscope: Option<DeepDiff>,
}

impl ComparisonResult {
    pub fn new(name: impl Into<String>, classification: Classification) -> Self {
        let name = name.into();
        Self {
            category: ArtifactCategory::from_logical_name(&name),
            name,
            classification,
            local_sha256: None,
            official_sha256: None,
            reason: None,
            diffoscope: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Per-classification tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationCounts {
    pub matched: u64,
    pub mismatched: u64,
    pub local_only: u64,
    pub official_only: u64,
}

impl ClassificationCounts {
    pub fn tally<'a>(results: impl IntoIterator<Item = &'a ComparisonResult>) -> Self {
        let mut counts = Self::default();
        for r in results {
            match r.classification {
                Classification::Matched => counts.matched += 1,
                Classification::Mismatched => counts.mismatched += 1,
                Classification::LocalOnly => counts.local_only += 1,
                Classification::OfficialOnly => counts.official_only += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u64 {
        self.matched + self.mismatched + self.local_only + self.official_only
    }
}
