use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use rebuilder_render::{render_index_md, render_summary_md};
use rebuilder_types::compare::{
    Classification, ClassificationCounts, ComparisonResult, DeepDiff,
};
use rebuilder_types::job::Target;
use rebuilder_types::report::{
    BuildStatus, BuildSummary, OverallStatus, RunInfo, ToolInfo, VerificationReport,
};
use rebuilder_types::wire::{IndexV1, ReportV1};

fn report(artifacts: Vec<ComparisonResult>, build: BuildSummary) -> VerificationReport {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    VerificationReport {
        tool: ToolInfo {
            name: "openwrt-rebuilder".into(),
            version: Some("0.3.0".into()),
            maintainer: Some("Release Team".into()),
            contact: None,
        },
        run: RunInfo::new(start, start + chrono::Duration::minutes(3)),
        version: "SNAPSHOT".into(),
        target: Target::parse("x86/64").unwrap(),
        build,
        status: OverallStatus::derive(&artifacts),
        counts: ClassificationCounts::tally(&artifacts),
        artifacts,
    }
}

#[test]
fn all_matched_summary_says_so() {
    let md = render_summary_md(&report(
        vec![ComparisonResult::new("a.bin", Classification::Matched)],
        BuildSummary::skipped(),
    ));
    assert!(md.starts_with("# Rebuild SNAPSHOT x86/64: success\n"));
    assert!(md.contains("- Maintainer: Release Team\n"));
    assert!(!md.contains("Contact"));
    assert!(md.contains("- Status: `skipped`"));
    assert!(md.contains("| 1 | 0 | 0 | 0 |"));
    assert!(md.contains("_All artifacts reproduced bit-for-bit._"));
}

#[test]
fn problems_are_grouped_by_classification() {
    let mut mismatched = ComparisonResult::new("a.bin", Classification::Mismatched);
    mismatched.local_sha256 = Some("1".repeat(64));
    mismatched.official_sha256 = Some("9".repeat(64));
    mismatched.diffoscope = Some(DeepDiff::Available {
        path: "diffoscope/a.bin.html".into(),
    });
    let mut timed_out = ComparisonResult::new("b.img", Classification::Mismatched);
    timed_out.diffoscope = Some(DeepDiff::Unavailable {
        reason: "timed out after 180s".into(),
    });
    let artifacts = vec![
        mismatched,
        timed_out,
        ComparisonResult::new("c.bin", Classification::OfficialOnly),
        ComparisonResult::new("d.bin", Classification::LocalOnly)
            .with_reason("artifact path '../d.bin' contains a '.' or '..' component"),
    ];
    let build = BuildSummary {
        status: BuildStatus::PartialFailure,
        exit_code: Some(2),
        duration_ms: 3_600_000,
        log: Some("logs/build.log".into()),
        revision: Some("abc1234".into()),
        prior_artifacts: false,
        reason: None,
    };

    let md = render_summary_md(&report(artifacts, build));
    assert!(md.starts_with("# Rebuild SNAPSHOT x86/64: degraded\n"));
    assert!(md.contains("- Exit code: 2\n"));
    assert!(md.contains("- Duration: 1h00m00s\n"));
    assert!(md.contains("### Mismatched (2)\n"));
    assert!(md.contains(
        "- `a.bin` (image) local `111111111111` official `999999999999` [diff](diffoscope/a.bin.html)\n"
    ));
    assert!(md.contains("- `b.img` (image) (deep diff unavailable: timed out after 180s)\n"));
    assert!(md.contains("### Official only (1)\n"));
    assert!(md.contains("### Local only (1)\n"));
    assert!(md.contains("contains a '.' or '..' component"));
}

#[test]
fn index_lists_targets_per_version() {
    let r = report(
        vec![ComparisonResult::new("a.bin", Classification::Matched)],
        BuildSummary::skipped(),
    );
    let wire = ReportV1::try_from(&r).unwrap();
    let mut index = IndexV1::new("2024-03-02T00:00:00+00:00");
    index.upsert(
        "SNAPSHOT",
        "x86/64",
        IndexV1::entry_for(&wire, "SNAPSHOT/x86/64/report.json"),
    );

    let md = render_index_md(&index);
    assert_eq!(
        md.lines().nth(8),
        Some("| [x86/64](SNAPSHOT/x86/64/report.json) | success | skipped | 1 | 0 | 0 | 0 |")
    );
}
