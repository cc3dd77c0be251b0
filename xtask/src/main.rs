use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fs_err as fs;
use jsonschema::Draft;
use rebuilder_types::schema;
use std::process::Command as ProcessCommand;

const REPORT_SCHEMA: &str = include_str!("../../schemas/openwrt-rebuilder.report.v1.schema.json");
const INDEX_SCHEMA: &str = include_str!("../../schemas/openwrt-rebuilder.index.v1.schema.json");

#[derive(Debug, Parser)]
#[command(name = "xtask", about = "Workspace helper tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print schema identifiers used by openwrt-rebuilder.
    PrintSchemas,
    /// Validate report.json / index.json files against the checked-in schemas.
    Validate {
        /// Files to check; the schema is picked from each file's `schema` field.
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Run the CLI end-to-end tests, which validate their output against the schemas.
    Conformance,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::PrintSchemas => {
            println!("{}", schema::REBUILDER_REPORT_V1);
            println!("{}", schema::REBUILDER_INDEX_V1);
        }
        Command::Validate { files } => {
            let mut failed = 0;
            for file in &files {
                let problems = validate_file(file)?;
                if problems.is_empty() {
                    println!("ok    {file}");
                } else {
                    failed += 1;
                    println!("FAIL  {file}");
                    for p in problems {
                        println!("      {p}");
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} file(s) failed validation", files.len());
            }
        }
        Command::Conformance => {
            let status = ProcessCommand::new("cargo")
                .args(["test", "-p", "openwrt-rebuilder", "--test", "cli"])
                .status()
                .context("run CLI conformance tests")?;
            if !status.success() {
                bail!("conformance failed");
            }
        }
    }
    Ok(())
}

fn schema_for(id: &str) -> Option<&'static str> {
    match id {
        schema::REBUILDER_REPORT_V1 => Some(REPORT_SCHEMA),
        schema::REBUILDER_INDEX_V1 => Some(INDEX_SCHEMA),
        _ => None,
    }
}

/// Schema violations found in `path`; empty when the document is valid.
fn validate_file(path: &str) -> anyhow::Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    let doc: serde_json::Value =
        serde_json::from_str(&contents).with_context(|| format!("parse {path}"))?;
    validate_doc(&doc)
}

fn validate_doc(doc: &serde_json::Value) -> anyhow::Result<Vec<String>> {
    let Some(id) = doc.get("schema").and_then(|v| v.as_str()) else {
        return Ok(vec!["missing string field 'schema'".to_string()]);
    };
    let Some(raw) = schema_for(id) else {
        return Ok(vec![format!("unknown schema '{id}'")]);
    };

    let schema_json: serde_json::Value = serde_json::from_str(raw).context("parse schema")?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema_json)
        .context("build schema validator")?;
    Ok(validator.iter_errors(doc).map(|e| e.to_string()).collect())
}
