//! Parser for `sha256sums` listings as published next to official artifacts.
//!
//! Lines look like `<64 hex> *path` (binary mode) or `<64 hex>  path` (text
//! mode). Parsing is tolerant: malformed lines are collected, not fatal.

use rebuilder_hash::is_sha256_hex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Lowercase hex digest.
    pub sha256: String,
    /// Path as listed, without the mode marker.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumListing {
    pub entries: Vec<ChecksumEntry>,
    pub skipped: Vec<SkippedLine>,
}

pub fn parse_sha256sums(text: &str) -> ChecksumListing {
    let mut listing = ChecksumListing::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Ok(entry) => listing.entries.push(entry),
            Err(reason) => listing.skipped.push(SkippedLine {
                line: idx + 1,
                reason,
            }),
        }
    }

    listing
}

fn parse_line(line: &str) -> Result<ChecksumEntry, String> {
    let Some((digest, rest)) = line.split_once(' ') else {
        return Err("missing separator after digest".to_string());
    };
    if !is_sha256_hex(digest) {
        return Err(format!("'{digest}' is not a sha256 digest"));
    }

    // One space then '*' (binary) or ' ' (text) marker.
    let path = match rest.chars().next() {
        Some('*') | Some(' ') => &rest[1..],
        _ => rest,
    };
    if path.is_empty() {
        return Err("missing path".to_string());
    }

    Ok(ChecksumEntry {
        sha256: digest.to_ascii_lowercase(),
        path: path.to_string(),
    })
}
