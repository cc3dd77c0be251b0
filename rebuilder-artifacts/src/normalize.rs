//! Versioned filename normalization.
//!
//! Every artifact path is turned into a logical name by applying an ordered
//! list of rules. Rules are data: each has a stable id, a scope and an action,
//! so the active set can be listed, tested and bumped as a unit.

use rebuilder_types::job::Target;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const RULESET_V1: &str = "normalize.v1";

/// Which targets a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "board")]
pub enum RuleScope {
    AllTargets,
    /// Only targets whose board family equals the given name.
    Family(String),
}

impl RuleScope {
    pub fn applies_to(&self, target: &Target) -> bool {
        match self {
            RuleScope::AllTargets => true,
            RuleScope::Family(board) => target.board() == board,
        }
    }
}

impl fmt::Display for RuleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleScope::AllTargets => f.write_str("all"),
            RuleScope::Family(board) => write!(f, "family:{board}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    /// Drop a leading binary-mode `*` and leading `.` segments.
    StripDotPrefix,
    /// Drop directory segments that look like a date (`20240301`, `2024-03-01`,
    /// optionally followed by `-HHMM[SS]`).
    DropDateStampDir,
    /// Drop directory segments that look like a build id (`r23497-6637af95aa`).
    DropBuildIdDir,
    /// `kmods/<kernel release>/x` becomes `kmods/x`.
    CollapseKmodsRelease,
    /// Exclude signatures and signed indexes from pairing altogether.
    IgnoreDetachedSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizationRule {
    pub id: String,
    pub scope: RuleScope,
    pub action: RuleAction,
    pub description: String,
}

impl NormalizationRule {
    pub fn new(
        id: impl Into<String>,
        scope: RuleScope,
        action: RuleAction,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            scope,
            action,
            description: description.into(),
        }
    }
}

/// Result of normalizing one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Name(String),
    /// Excluded from pairing by the named rule.
    Ignored { rule: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameNormalizationError {
    #[error("empty artifact name")]
    Empty,

    #[error("absolute artifact path '{0}'")]
    Absolute(String),

    #[error("artifact path '{0}' contains a '.' or '..' component")]
    RelativeComponent(String),

    #[error("artifact name '{0}' contains control characters")]
    ControlCharacter(String),

    #[error("artifact name '{0}' is not valid UTF-8")]
    NotUtf8(String),

    #[error("artifact name '{0}' normalizes to nothing")]
    NothingLeft(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    version: String,
    rules: Vec<NormalizationRule>,
}

impl RuleSet {
    pub fn new(version: impl Into<String>, rules: Vec<NormalizationRule>) -> Self {
        Self {
            version: version.into(),
            rules,
        }
    }

    /// The shipped rule set.
    pub fn v1() -> Self {
        use RuleAction::*;
        use RuleScope::AllTargets;

        Self::new(
            RULESET_V1,
            vec![
                NormalizationRule::new(
                    "strip-dot-prefix",
                    AllTargets,
                    StripDotPrefix,
                    "drop leading '*' and './' from listed names",
                ),
                NormalizationRule::new(
                    "date-stamp-dir",
                    AllTargets,
                    DropDateStampDir,
                    "drop YYYYMMDD / YYYY-MM-DD[-HHMM[SS]] directory segments",
                ),
                NormalizationRule::new(
                    "build-id-dir",
                    AllTargets,
                    DropBuildIdDir,
                    "drop r<revision>-<hash> directory segments",
                ),
                NormalizationRule::new(
                    "kmods-vermagic",
                    AllTargets,
                    CollapseKmodsRelease,
                    "kmods/<kernel-release>/<file> -> kmods/<file>",
                ),
                NormalizationRule::new(
                    "detached-signature",
                    AllTargets,
                    IgnoreDetachedSignature,
                    "ignore *.sig, *.asc, sha256sums and packages.adb",
                ),
            ],
        )
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn rules(&self) -> &[NormalizationRule] {
        &self.rules
    }

    /// Map a raw relative path to its logical name for `target`.
    pub fn normalize(&self, raw: &str, target: &Target) -> Result<Normalized, NameNormalizationError> {
        if raw.trim().is_empty() {
            return Err(NameNormalizationError::Empty);
        }
        if raw.chars().any(char::is_control) {
            return Err(NameNormalizationError::ControlCharacter(raw.escape_debug().to_string()));
        }
        if raw.starts_with('/') {
            return Err(NameNormalizationError::Absolute(raw.to_string()));
        }

        let mut segments: Vec<String> = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        for rule in self.rules.iter().filter(|r| r.scope.applies_to(target)) {
            if apply(rule.action, &mut segments) {
                return Ok(Normalized::Ignored {
                    rule: rule.id.clone(),
                });
            }
        }

        if segments.is_empty() {
            return Err(NameNormalizationError::NothingLeft(raw.to_string()));
        }
        if segments.iter().any(|s| s == "." || s == "..") {
            return Err(NameNormalizationError::RelativeComponent(raw.to_string()));
        }

        Ok(Normalized::Name(segments.join("/")))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::v1()
    }
}

/// Apply one action in place. Returns true when the name should be ignored.
fn apply(action: RuleAction, segments: &mut Vec<String>) -> bool {
    match action {
        RuleAction::StripDotPrefix => {
            while let Some(first) = segments.first_mut() {
                let trimmed = first.trim_start_matches('*').to_string();
                if trimmed.is_empty() || trimmed == "." {
                    segments.remove(0);
                    continue;
                }
                *first = trimmed;
                break;
            }
            false
        }
        RuleAction::DropDateStampDir => {
            drop_dirs(segments, is_date_stamp);
            false
        }
        RuleAction::DropBuildIdDir => {
            drop_dirs(segments, is_build_id);
            false
        }
        RuleAction::CollapseKmodsRelease => {
            if segments.len() >= 3 && segments[0] == "kmods" {
                segments.remove(1);
            }
            false
        }
        RuleAction::IgnoreDetachedSignature => segments.last().is_some_and(|file| {
            file.ends_with(".sig")
                || file.ends_with(".asc")
                || file == "sha256sums"
                || file == "packages.adb"
        }),
    }
}

/// Remove matching segments, never the final (file) segment.
fn drop_dirs(segments: &mut Vec<String>, matches: fn(&str) -> bool) {
    if segments.len() < 2 {
        return;
    }
    let file = segments.pop();
    segments.retain(|s| !matches(s));
    segments.extend(file);
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn plausible_date(year: &str, month: &str, day: &str) -> bool {
    let (Ok(y), Ok(m), Ok(d)) = (year.parse::<u32>(), month.parse::<u32>(), day.parse::<u32>())
    else {
        return false;
    };
    (1970..=2199).contains(&y) && (1..=12).contains(&m) && (1..=31).contains(&d)
}

pub(crate) fn is_date_stamp(segment: &str) -> bool {
    if !segment.is_ascii() {
        return false;
    }
    let (date, time) = match segment.find(['-', '_', 'T']) {
        // `YYYY-MM-DD` uses dashes inside the date itself.
        Some(4) => {
            if segment.len() < 10 {
                return false;
            }
            let (date, rest) = segment.split_at(10);
            (date, rest)
        }
        Some(i) => segment.split_at(i),
        None => (segment, ""),
    };

    let date_ok = match date.len() {
        8 if all_digits(date) => plausible_date(&date[0..4], &date[4..6], &date[6..8]),
        10 => {
            let parts: Vec<&str> = date.split('-').collect();
            parts.len() == 3
                && parts[0].len() == 4
                && parts[1].len() == 2
                && parts[2].len() == 2
                && parts.iter().all(|p| all_digits(p))
                && plausible_date(parts[0], parts[1], parts[2])
        }
        _ => false,
    };
    if !date_ok {
        return false;
    }

    if time.is_empty() {
        return true;
    }
    let mut chars = time.chars();
    let sep = chars.next();
    let clock = chars.as_str();
    matches!(sep, Some('-' | '_' | 'T')) && (clock.len() == 4 || clock.len() == 6) && all_digits(clock)
}

pub(crate) fn is_build_id(segment: &str) -> bool {
    let Some(rest) = segment.strip_prefix('r') else {
        return false;
    };
    let Some((rev, hash)) = rest.split_once('-') else {
        return false;
    };
    all_digits(rev) && hash.len() >= 7 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}
