//! Rendering helpers (markdown) for human-readable artifacts.

use rebuilder_types::compare::{Classification, ComparisonResult, DeepDiff};
use rebuilder_types::report::VerificationReport;
use rebuilder_types::wire::IndexV1;

pub fn render_summary_md(report: &VerificationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Rebuild {} {}: {}\n\n",
        report.version,
        report.target,
        report.status.as_str()
    ));

    let tool_version = report.tool.version.as_deref().unwrap_or("unknown");
    out.push_str(&format!("- Tool: {} {}\n", report.tool.name, tool_version));
    if let Some(m) = &report.tool.maintainer {
        out.push_str(&format!("- Maintainer: {}\n", m));
    }
    if let Some(c) = &report.tool.contact {
        out.push_str(&format!("- Contact: {}\n", c));
    }
    out.push_str(&format!("- Run: `{}`\n", report.run.id));
    out.push_str(&format!(
        "- Started: {}\n- Ended: {}\n\n",
        report.run.started_at.to_rfc3339(),
        report.run.ended_at.to_rfc3339()
    ));

    out.push_str("## Build\n\n");
    out.push_str(&format!("- Status: `{}`\n", report.build.status.as_str()));
    if let Some(code) = report.build.exit_code {
        out.push_str(&format!("- Exit code: {}\n", code));
    }
    out.push_str(&format!(
        "- Duration: {}\n",
        format_duration_ms(report.build.duration_ms)
    ));
    if let Some(rev) = &report.build.revision {
        out.push_str(&format!("- Revision: `{}`\n", rev));
    }
    if let Some(log) = &report.build.log {
        out.push_str(&format!("- Log: `{}`\n", log));
    }
    if report.build.prior_artifacts {
        out.push_str("- Artifacts present before build: yes\n");
    }
    if let Some(reason) = &report.build.reason {
        out.push_str(&format!("- Reason: {}\n", reason));
    }
    out.push('\n');

    let c = &report.counts;
    out.push_str("## Artifacts\n\n");
    out.push_str(&format!(
        "| matched | mismatched | local only | official only |\n|---|---|---|---|\n| {} | {} | {} | {} |\n\n",
        c.matched, c.mismatched, c.local_only, c.official_only
    ));

    let mut any = false;
    for (heading, class) in [
        ("Mismatched", Classification::Mismatched),
        ("Official only", Classification::OfficialOnly),
        ("Local only", Classification::LocalOnly),
    ] {
        let entries: Vec<&ComparisonResult> = report
            .artifacts
            .iter()
            .filter(|a| a.classification == class)
            .collect();
        if entries.is_empty() {
            continue;
        }
        any = true;
        out.push_str(&format!("### {} ({})\n\n", heading, entries.len()));
        for a in entries {
            out.push_str(&render_entry(a));
        }
        out.push('\n');
    }

    if !any {
        if report.artifacts.is_empty() {
            out.push_str("_No artifacts were compared._\n");
        } else {
            out.push_str("_All artifacts reproduced bit-for-bit._\n");
        }
    }

    out
}

fn render_entry(a: &ComparisonResult) -> String {
    let mut line = format!("- `{}` ({})", a.name, a.category.as_str());
    if let (Some(l), Some(o)) = (&a.local_sha256, &a.official_sha256) {
        line.push_str(&format!(" local `{}` official `{}`", short(l), short(o)));
    }
    match &a.diffoscope {
        Some(DeepDiff::Available { path }) => line.push_str(&format!(" [diff]({})", path)),
        Some(DeepDiff::Unavailable { reason }) => {
            line.push_str(&format!(" (deep diff unavailable: {})", reason))
        }
        None => {}
    }
    if let Some(reason) = &a.reason {
        line.push_str(&format!(": {}", reason));
    }
    line.push('\n');
    line
}

pub fn render_index_md(index: &IndexV1) -> String {
    let mut out = String::new();
    out.push_str("# Rebuild results\n\n");
    out.push_str(&format!("Generated {}\n\n", index.generated_at));

    if index.versions.is_empty() {
        out.push_str("_No reports found._\n");
    }

    for (version, targets) in &index.versions {
        out.push_str(&format!("## {}\n\n", version));
        out.push_str("| target | status | build | matched | mismatched | local only | official only |\n");
        out.push_str("|---|---|---|---|---|---|---|\n");
        for (target, e) in targets {
            out.push_str(&format!(
                "| [{}]({}) | {} | {} | {} | {} | {} | {} |\n",
                target,
                e.report,
                e.status.as_str(),
                e.build_status.as_str(),
                e.counts.matched,
                e.counts.mismatched,
                e.counts.local_only,
                e.counts.official_only
            ));
        }
        out.push('\n');
    }

    if !index.failures.is_empty() {
        out.push_str("## Unreadable reports\n\n");
        for f in &index.failures {
            out.push_str(&format!("- `{}`: {}\n", f.path, f.reason));
        }
    }

    out
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}.{:03}s", s, ms % 1000)
    }
}
