//! Shared DTOs (schemas-as-code) for the openwrt-rebuilder workspace.
//!
//! # Design constraints
//! - `report.json` and `index.json` are consumed by external tooling.
//! - Be conservative with breaking changes to anything under [`wire`].
//! - Prefer adding optional fields over changing semantics.

pub mod artifact;
pub mod compare;
pub mod job;
pub mod report;
pub mod wire;

/// Schema identifiers.
pub mod schema {
    pub const REBUILDER_REPORT_V1: &str = "openwrt-rebuilder.report.v1";
    pub const REBUILDER_INDEX_V1: &str = "openwrt-rebuilder.index.v1";
}
