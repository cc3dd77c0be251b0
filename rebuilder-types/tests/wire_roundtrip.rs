use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use rebuilder_types::compare::{
    Classification, ClassificationCounts, ComparisonResult, DeepDiff,
};
use rebuilder_types::job::Target;
use rebuilder_types::report::{
    BuildStatus, BuildSummary, OverallStatus, RunInfo, ToolInfo, VerificationReport,
};
use rebuilder_types::schema;
use rebuilder_types::wire::{IndexV1, ReportV1, WireError};

fn report(tool_version: Option<&str>) -> VerificationReport {
    let started = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let ended = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();

    let mut mismatched = ComparisonResult::new("a.bin", Classification::Mismatched);
    mismatched.local_sha256 = Some("11".repeat(32));
    mismatched.official_sha256 = Some("99".repeat(32));
    mismatched.diffoscope = Some(DeepDiff::Available {
        path: "diffoscope/a.bin.html".into(),
    });
    let artifacts = vec![
        mismatched,
        ComparisonResult::new("b.bin", Classification::LocalOnly),
    ];

    VerificationReport {
        tool: ToolInfo {
            name: "openwrt-rebuilder".into(),
            version: tool_version.map(str::to_string),
            maintainer: Some("Release Team".into()),
            contact: Some("releases@example.org".into()),
        },
        run: RunInfo::new(started, ended),
        version: "23.05.2".into(),
        target: Target::parse("ath79/generic").unwrap(),
        build: BuildSummary {
            status: BuildStatus::PartialFailure,
            exit_code: Some(2),
            duration_ms: 9_000_000,
            log: Some("logs/build.log".into()),
            revision: Some("f7e9f4a1d3".into()),
            prior_artifacts: false,
            reason: Some("toolchain exited with status 2".into()),
        },
        status: OverallStatus::derive(&artifacts),
        counts: ClassificationCounts::tally(&artifacts),
        artifacts,
    }
}

#[test]
fn report_wire_requires_tool_version() {
    let err = ReportV1::try_from(&report(None)).expect_err("missing version should error");
    assert_eq!(err, WireError::MissingToolVersion { context: "report" });
}

#[test]
fn report_wire_carries_schema_and_flattened_fields() {
    let wire = ReportV1::try_from(&report(Some("0.3.0"))).expect("wire conversion");
    assert_eq!(wire.schema, schema::REBUILDER_REPORT_V1);
    assert_eq!(wire.tool.version, "0.3.0");
    assert_eq!(wire.target, "ath79/generic");
    assert_eq!(wire.run.started_at, "2024-03-01T12:00:00+00:00");
    assert_eq!(wire.run.duration_ms, 9_000_000);
    assert_eq!(wire.status, OverallStatus::Degraded);
    assert_eq!(wire.build.log.as_deref(), Some("logs/build.log"));
}

#[test]
fn report_json_shape_is_stable() {
    let wire = ReportV1::try_from(&report(Some("0.3.0"))).unwrap();
    let value = serde_json::to_value(&wire).unwrap();

    assert_eq!(value["status"], "degraded");
    assert_eq!(value["build"]["status"], "partial_failure");
    assert_eq!(
        value["counts"],
        serde_json::json!({"matched": 0, "mismatched": 1, "local_only": 1, "official_only": 0})
    );
    assert_eq!(value["artifacts"][0]["classification"], "mismatched");
    assert_eq!(value["artifacts"][0]["category"], "image");
    assert_eq!(value["artifacts"][0]["diffoscope"]["status"], "available");
    assert!(value["artifacts"][1].get("diffoscope").is_none());

    let text = serde_json::to_string_pretty(&wire).unwrap();
    let back: ReportV1 = serde_json::from_str(&text).unwrap();
    assert_eq!(back, wire);
}

#[test]
fn index_merge_prefers_newer_entries() {
    let wire = ReportV1::try_from(&report(Some("0.3.0"))).unwrap();

    let mut existing = IndexV1::new("2024-03-01T00:00:00+00:00");
    existing.upsert(
        "23.05.2",
        "ath79/generic",
        IndexV1::entry_for(&wire, "old/report.json"),
    );
    existing.upsert(
        "23.05.2",
        "x86/64",
        IndexV1::entry_for(&wire, "23.05.2/x86/64/report.json"),
    );

    let mut newer = IndexV1::new("2024-03-02T00:00:00+00:00");
    newer.upsert(
        "23.05.2",
        "ath79/generic",
        IndexV1::entry_for(&wire, "23.05.2/ath79/generic/report.json"),
    );
    newer.upsert(
        "SNAPSHOT",
        "ath79/generic",
        IndexV1::entry_for(&wire, "SNAPSHOT/ath79/generic/report.json"),
    );

    existing.merge(newer);
    assert_eq!(existing.entry_count(), 3);
    assert_eq!(existing.generated_at, "2024-03-02T00:00:00+00:00");
    assert_eq!(
        existing.versions["23.05.2"]["ath79/generic"].report,
        "23.05.2/ath79/generic/report.json"
    );
    assert_eq!(existing.schema, schema::REBUILDER_INDEX_V1);
}
