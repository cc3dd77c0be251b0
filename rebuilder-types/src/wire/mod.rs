use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod index_v1;
pub mod report_v1;

pub use index_v1::{IndexEntryV1, IndexFailureV1, IndexV1};
pub use report_v1::{BuildV1, ReportV1, RunInfoV1};

/// Tool information for wire-level schemas (schema-exact).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfoV1 {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

/// Errors emitted while converting internal models to wire models.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("missing tool version for {context}")]
    MissingToolVersion { context: &'static str },
}

#[cfg(test)]
mod tests {
    use super::{ToolInfoV1, WireError};

    #[test]
    fn tool_info_serializes_without_contact_when_none() {
        let tool = ToolInfoV1 {
            name: "openwrt-rebuilder".to_string(),
            version: "0.3.0".to_string(),
            maintainer: Some("Build Team".to_string()),
            contact: None,
        };

        let json = serde_json::to_string(&tool).expect("serialize");
        assert!(json.contains("\"maintainer\""));
        assert!(!json.contains("contact"));
    }

    #[test]
    fn wire_error_display_includes_context() {
        let err = WireError::MissingToolVersion { context: "report" };
        assert_eq!(err.to_string(), "missing tool version for report");
    }
}
