use crate::OutputFormat;
use crate::util::read_bytes;
use anyhow::Result;
use clap::Args;
use platynui_xquery::{DeclScanner, ScanError};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct SniffArgs {
    #[arg(value_name = "FILE", help = "Module source file, or - for standard input.")]
    pub input: PathBuf,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text, help = "Output format.")]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
struct SniffSummary {
    declared: bool,
    version: Option<String>,
    encoding: Option<String>,
}

pub fn run(args: &SniffArgs) -> Result<String> {
    let bytes = read_bytes(&args.input)?;
    render(&String::from_utf8_lossy(&bytes), args.format)
}

fn sniff(source: &str) -> SniffSummary {
    let mut scanner = DeclScanner::new(source);
    let declared = matches!(scanner.scan(), Err(ScanError::DeclarationFound));
    SniffSummary {
        declared,
        version: scanner.version().map(str::to_string),
        encoding: scanner.encoding().map(str::to_string),
    }
}

fn render(source: &str, format: OutputFormat) -> Result<String> {
    let summary = sniff(source);
    Ok(match format {
        OutputFormat::Text => summary.encoding.unwrap_or_else(|| "none".to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(&summary)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::declared("xquery version '1.0' encoding 'ISO-8859-1'; 1", "ISO-8859-1")]
    #[case::version_only("xquery version '3.1'; 1", "none")]
    #[case::no_declaration("1", "none")]
    fn prints_encoding(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(render(source, OutputFormat::Text).expect("sniff"), expected);
    }

    #[rstest]
    fn summary_reports_version() {
        let summary = sniff("xquery version '3.0'; ()");
        assert_eq!(summary, SniffSummary { declared: true, version: Some("3.0".into()), encoding: None });
        assert!(!sniff("()").declared);
    }
}
