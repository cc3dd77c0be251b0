#![no_main]

//! Fuzz target for `sha256sums` listing parsing.

use libfuzzer_sys::fuzz_target;
use rebuilder_artifacts::parse_sha256sums;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let listing = parse_sha256sums(&text);

    // Every non-blank, non-comment line is either an entry or a skipped line.
    let lines = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty() && !l.starts_with('#'))
        .count();
    assert_eq!(listing.entries.len() + listing.skipped.len(), lines);

    for entry in &listing.entries {
        assert_eq!(entry.sha256.len(), 64);
        assert!(entry.sha256.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }
});
