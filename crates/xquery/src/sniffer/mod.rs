//! Encoding sniffer: reads only the leading `xquery version ... encoding ...;`
//! declaration of a module so the caller can pick a decoder before the full
//! recognizer runs.

use pest::Parser as _;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use std::convert::Infallible;
use tracing::{debug, trace};

#[derive(pest_derive::Parser)]
#[grammar = "sniffer/declaration.pest"]
struct DeclarationGrammar;

/// Outcomes of [`DeclScanner::scan`]. Scanning never completes normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    /// The version declaration was recognized; scanning stopped right after it.
    #[error("version declaration found")]
    DeclarationFound,
    /// The module does not start with a version declaration.
    #[error("no version declaration at line {line}, column {column}")]
    Malformed { line: usize, column: usize },
}

/// Scanner for the version declaration at the start of a module.
pub struct DeclScanner<'a> {
    source: &'a str,
    encoding: Option<String>,
    version: Option<String>,
}

impl<'a> DeclScanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source: source.strip_prefix('\u{FEFF}').unwrap_or(source), encoding: None, version: None }
    }

    /// Scan the leading declaration, skipping comments and pragmas before it.
    /// Fails with [`ScanError::DeclarationFound`] once one was read and with
    /// [`ScanError::Malformed`] otherwise.
    pub fn scan(&mut self) -> Result<Infallible, ScanError> {
        let mut pairs = DeclarationGrammar::parse(Rule::declaration, self.source).map_err(|err| {
            let (line, column) = match err.line_col {
                LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
            };
            trace!(line, column, "no version declaration");
            ScanError::Malformed { line, column }
        })?;
        if let Some(decl) = pairs.next() {
            for pair in decl.into_inner().flatten() {
                match pair.as_rule() {
                    Rule::version => self.version = literal_value(pair),
                    Rule::encoding => self.encoding = literal_value(pair),
                    _ => {}
                }
            }
        }
        debug!(version = ?self.version, encoding = ?self.encoding, "version declaration sniffed");
        Err(ScanError::DeclarationFound)
    }

    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

fn literal_value(pair: Pair<'_, Rule>) -> Option<String> {
    let content = pair.into_inner().flatten().find(|p| matches!(p.as_rule(), Rule::quot_content | Rule::apos_content))?;
    let text = content.as_str();
    Some(match content.as_rule() {
        Rule::quot_content => text.replace("\"\"", "\""),
        _ => text.replace("''", "'"),
    })
}

/// Encoding named by the module's version declaration, if any.
pub fn sniff_encoding(source: &str) -> Option<String> {
    let mut scanner = DeclScanner::new(source);
    match scanner.scan() {
        Err(ScanError::DeclarationFound) => scanner.encoding,
        Err(ScanError::Malformed { .. }) => None,
    }
}

/// Same as [`sniff_encoding`] for raw bytes. The declaration is ASCII, so
/// any ASCII-compatible encoding can be sniffed before decoding.
pub fn sniff_encoding_bytes(bytes: &[u8]) -> Option<String> {
    sniff_encoding(&String::from_utf8_lossy(bytes))
}
