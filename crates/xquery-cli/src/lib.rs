//! `xqc`: command-line front end for the XQuery recognizer and compiler.

mod commands;
mod util;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xqc", version, about = "Parse, compile and inspect XQuery modules")]
pub struct Cli {
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        global = true,
        help = "Tracing filter (e.g. debug, platynui_xquery=trace). Overrides RUST_LOG."
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Recognize a module and print its syntax tree or all syntax errors.
    Parse(commands::parse::ParseArgs),
    /// Compile a module and print its expression graph or the first static error.
    Compile(commands::compile::CompileArgs),
    /// Print the encoding named by the module's version declaration.
    Sniff(commands::sniff::SniffArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Arguments shared by `parse` and `compile`.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    #[arg(value_name = "FILE", help = "Module source file, or - for standard input.")]
    pub input: PathBuf,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text, help = "Output format.")]
    pub format: OutputFormat,

    #[arg(long = "max-depth", value_name = "N", help = "Maximum expression nesting depth.")]
    pub max_depth: Option<usize>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    let output = execute(&cli)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

pub fn execute(cli: &Cli) -> Result<String> {
    match &cli.command {
        Command::Parse(args) => commands::parse::run(args),
        Command::Compile(args) => commands::compile::run(args),
        Command::Sniff(args) => commands::sniff::run(args),
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}
