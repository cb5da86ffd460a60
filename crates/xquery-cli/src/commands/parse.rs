use crate::util::read_source;
use crate::{InputArgs, OutputFormat};
use anyhow::{Result, bail};
use clap::Args;
use platynui_xquery::{ParseOptions, parse_module_with_options};
use tracing::debug;

#[derive(Args, Debug, Clone)]
pub struct ParseArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

pub fn run(args: &ParseArgs) -> Result<String> {
    let source = read_source(&args.input.input)?;
    render(&source, &args.input)
}

pub(crate) fn options(input: &InputArgs) -> ParseOptions {
    match input.max_depth {
        Some(max_depth) => ParseOptions { max_depth },
        None => ParseOptions::default(),
    }
}

pub(crate) fn render(source: &str, input: &InputArgs) -> Result<String> {
    let outcome = parse_module_with_options(source, options(input));
    if outcome.found_errors() {
        bail!(
            "{} syntax error(s) in {}:\n{}",
            outcome.errors().len(),
            input.input.display(),
            outcome.error_message()
        );
    }
    let cst = outcome.cst();
    debug!(nodes = cst.len(), "syntax tree built");
    Ok(match input.format {
        OutputFormat::Text => cst.root().map(|root| cst.to_sexpr(root)).unwrap_or_default(),
        OutputFormat::Json => serde_json::to_string_pretty(cst)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn input(format: OutputFormat) -> InputArgs {
        InputArgs { input: PathBuf::from("query.xq"), format, max_depth: None }
    }

    #[rstest]
    fn text_output_is_the_sexpr() {
        let out = render("1 + 2", &input(OutputFormat::Text)).expect("parses");
        assert!(out.contains("(+ integer:1 integer:2)"), "{out}");
    }

    #[rstest]
    fn json_output_lists_nodes() {
        let out = render("$x", &input(OutputFormat::Json)).expect("parses");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert!(value["nodes"].as_array().is_some_and(|nodes| !nodes.is_empty()));
    }

    #[rstest]
    fn reports_every_broken_declaration() {
        let err = render("declare variable $a := ; declare variable $b := ; 1", &input(OutputFormat::Text))
            .expect_err("syntax errors");
        let message = err.to_string();
        assert!(message.contains("query.xq"));
        assert!(message.lines().filter(|l| l.starts_with("err:XPST0003")).count() >= 2, "{message}");
    }
}
