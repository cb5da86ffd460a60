use crate::util::{parse_module_arg, read_source};
use crate::{InputArgs, OutputFormat};
use anyhow::{Context, Result};
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use platynui_xquery::expr::{CompiledModule, ModuleKind};
use platynui_xquery::{CompileOptions, InMemoryModuleResolver, StaticContext, compile_module_with_options};
use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(long = "strict-functions", help = "Report calls to unknown functions in every namespace.")]
    pub strict_functions: bool,

    #[arg(long = "base-uri", value_name = "URI", help = "Static base URI for resolving relative URIs.")]
    pub base_uri: Option<String>,

    #[arg(
        long = "module",
        value_name = "NAMESPACE=FILE",
        value_parser = parse_module_arg,
        action = clap::ArgAction::Append,
        help = "Library module available to `import module` (repeatable)."
    )]
    pub modules: Vec<(String, String)>,
}

pub fn run(args: &CompileArgs) -> Result<String> {
    let source = read_source(&args.input.input)?;
    let mut resolver = InMemoryModuleResolver::new().with_options(options(args));
    for (namespace, path) in &args.modules {
        let library = read_source(Path::new(path))?;
        debug!(%namespace, %path, "library module registered");
        resolver = resolver.register(namespace.as_str(), None, library);
    }
    let mut builder = StaticContext::builder().with_module_resolver(Arc::new(resolver));
    if let Some(base_uri) = &args.base_uri {
        builder = builder.with_base_uri(base_uri);
    }
    let mut ctx = builder.build();
    render(&source, &mut ctx, args)
}

fn options(args: &CompileArgs) -> CompileOptions {
    let mut options = CompileOptions::default().with_strict_functions(args.strict_functions);
    if let Some(max_depth) = args.input.max_depth {
        options = options.with_max_depth(max_depth);
    }
    options
}

fn render(source: &str, ctx: &mut StaticContext, args: &CompileArgs) -> Result<String> {
    let module = compile_module_with_options(source, ctx, &options(args))
        .with_context(|| format!("failed to compile {}", args.input.input.display()))?;
    Ok(match args.input.format {
        OutputFormat::Text => render_text(&module),
        OutputFormat::Json => serde_json::to_string_pretty(&module)?,
    })
}

fn heading(text: &str) -> String {
    text.if_supports_color(Stream::Stdout, |t| t.bold().to_string()).to_string()
}

fn render_text(module: &CompiledModule) -> String {
    let mut out = String::new();
    match &module.kind {
        ModuleKind::Main => {
            let _ = writeln!(out, "{}", heading("main module"));
        }
        ModuleKind::Library { prefix, namespace } => {
            let _ = writeln!(out, "{} {prefix} = {namespace}", heading("library module"));
        }
    }
    for def in &module.variables {
        let value = def.value.map(|id| format!(" := e{}", id.index())).unwrap_or_default();
        let _ = writeln!(out, "variable ${}{value}", def.variable.name);
    }
    for def in &module.functions {
        let body = def.body.map_or_else(|| " external".to_string(), |id| format!(" = e{}", id.index()));
        let _ = writeln!(out, "function {}#{}{body}", def.signature.name, def.signature.arity());
    }
    if let Some(body) = module.body {
        let _ = writeln!(out, "body e{}", body.index());
    }
    let _ = writeln!(out, "{}", heading("expressions"));
    for (id, expr) in module.graph.iter() {
        let pos = module.graph.position(id);
        let label = format!("e{}", id.index());
        let label = label.if_supports_color(Stream::Stdout, |t| t.dimmed().to_string());
        let _ = writeln!(out, "{label:>6} {}:{} {expr:?}", pos.line, pos.column);
    }
    out.trim_end().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    fn args(format: OutputFormat) -> CompileArgs {
        CompileArgs {
            input: InputArgs { input: PathBuf::from("q.xq"), format, max_depth: None },
            strict_functions: false,
            base_uri: None,
            modules: Vec::new(),
        }
    }

    #[rstest]
    fn text_lists_functions_and_body() {
        owo_colors::set_override(false);
        let source = "declare function local:f($x) { $x }; local:f(1)";
        let out = render(source, &mut StaticContext::new(), &args(OutputFormat::Text)).expect("compiles");
        assert!(out.starts_with("main module"), "{out}");
        assert!(out.contains("#1 = e"), "{out}");
        assert!(out.contains("FunctionCall"), "{out}");
    }

    #[rstest]
    fn json_is_the_serialized_module() {
        let out = render("1 to 3", &mut StaticContext::new(), &args(OutputFormat::Json)).expect("compiles");
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert!(value["body"].is_number());
        assert_eq!(value["kind"], "Main");
    }

    #[rstest]
    fn static_errors_name_the_input() {
        let err = render("$undeclared", &mut StaticContext::new(), &args(OutputFormat::Text)).expect_err("XPST0008");
        let message = format!("{err:#}");
        assert!(message.contains("q.xq"));
        assert!(message.contains("err:XPST0008"));
    }

    #[rstest]
    fn imports_library_files_given_on_the_command_line() {
        let dir = tempfile::tempdir().expect("temp dir");
        let library = dir.path().join("math.xq");
        std::fs::write(&library, "module namespace m = 'urn:math'; declare function m:twice($x) { $x * 2 };")
            .expect("write library");
        let query = dir.path().join("main.xq");
        std::fs::write(&query, "import module namespace m = 'urn:math'; m:twice(21)").expect("write query");

        let mut compile = args(OutputFormat::Text);
        compile.input.input = query;
        compile.modules.push(("urn:math".to_string(), library.display().to_string()));
        let out = run(&compile).expect("compiles with the library");
        assert!(out.contains("FunctionCall"), "{out}");

        compile.modules.clear();
        let err = run(&compile).expect_err("library missing");
        assert!(format!("{err:#}").contains("err:XQST0059"));
    }

    #[rstest]
    fn strict_functions_flag_is_honoured() {
        let mut strict = args(OutputFormat::Text);
        strict.strict_functions = true;
        assert!(render("fn:nope()", &mut StaticContext::new(), &strict).is_err());
        assert!(render("fn:nope()", &mut StaticContext::new(), &args(OutputFormat::Text)).is_ok());
    }
}
