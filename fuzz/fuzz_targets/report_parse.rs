#![no_main]

//! Fuzz target for report.json and index.json parsing.

use libfuzzer_sys::fuzz_target;
use rebuilder_types::wire::{IndexV1, ReportV1};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(report) = serde_json::from_str::<ReportV1>(s) {
        let json = serde_json::to_string(&report).expect("serialize report");
        let again: ReportV1 = serde_json::from_str(&json).expect("reparse report");
        assert_eq!(report, again);
    }

    if let Ok(mut index) = serde_json::from_str::<IndexV1>(s) {
        let count = index.entry_count();
        index.merge(IndexV1::new("1970-01-01T00:00:00Z"));
        assert_eq!(index.entry_count(), count);
        let _ = serde_json::to_string_pretty(&index);
    }
});
