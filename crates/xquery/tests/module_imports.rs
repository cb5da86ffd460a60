use platynui_xquery::expr::Argument;
use platynui_xquery::{
    ErrorCode, ExpandedName, Expr, InMemoryModuleResolver, ModuleExports, ModuleResolver, StaticContext, compile,
    compile_module,
};
use rstest::{fixture, rstest};
use std::sync::Arc;

const MATH_LIB: &str = "module namespace m = 'urn:math';
    declare variable $m:base := 10;
    declare function m:inc($x) { $x + 1 };
    declare %private function m:secret() { m:inc($m:base) };";

#[fixture]
fn resolver() -> InMemoryModuleResolver {
    InMemoryModuleResolver::new()
        .register("urn:math", None, MATH_LIB)
        .register("urn:other", Some("file:///lib/other.xq"), "module namespace o = 'urn:other'; declare function o:f() { 1 };")
        .register(
            "urn:chain",
            None,
            "module namespace c = 'urn:chain';
             import module namespace m = 'urn:math';
             declare function c:twice($x) { m:inc(m:inc($x)) };",
        )
}

fn context(resolver: InMemoryModuleResolver) -> StaticContext {
    StaticContext::builder().with_module_resolver(Arc::new(resolver)).build()
}

#[rstest]
fn imported_functions_and_variables_are_visible(resolver: InMemoryModuleResolver) {
    let mut ctx = context(resolver);
    let module = compile_module("import module namespace m = 'urn:math'; m:inc($m:base)", &mut ctx).expect("compiles");
    let Some(Expr::FunctionCall { name, arguments }) = module.body_expr() else {
        panic!("expected a call");
    };
    assert_eq!(name, &ExpandedName::new(Some("urn:math".to_string()), "inc"));
    let [Argument::Expr(arg)] = arguments.as_slice() else { panic!("one argument") };
    assert!(matches!(module.graph.get(*arg), Expr::VariableRef(v) if v.local == "base"));
    assert!(ctx.is_imported_module("urn:math"));
}

#[rstest]
fn private_functions_are_not_exported(resolver: InMemoryModuleResolver) {
    let exports = resolver.load_module("urn:math", None).expect("loads");
    assert_eq!(exports.namespace, "urn:math");
    let names: Vec<&str> = exports.functions.iter().map(|f| f.name.local.as_str()).collect();
    assert_eq!(names, ["inc"]);
    assert_eq!(exports.variables.len(), 1);

    let mut ctx = context(resolver);
    let err = compile_module("import module namespace m = 'urn:math'; m:secret()", &mut ctx).expect_err("private");
    assert_eq!(err.code_enum(), ErrorCode::XPST0017);
}

#[rstest]
fn exports_from_a_compiled_library() {
    let module = compile(MATH_LIB).expect("library compiles");
    assert!(module.is_library());
    let exports = ModuleExports::from_module(&module);
    assert_eq!(exports.functions.len(), 1);
    assert_eq!(module.functions.len(), 2);
}

#[rstest]
fn nested_imports_resolve_through_the_same_registry(resolver: InMemoryModuleResolver) {
    let mut ctx = context(resolver);
    compile_module("import module namespace c = 'urn:chain'; c:twice(1)", &mut ctx).expect("compiles");
    // the transitive import is not visible to the importer
    assert!(!ctx.is_imported_module("urn:math"));
}

#[rstest]
fn location_hints_resolve_against_the_base_uri(resolver: InMemoryModuleResolver) {
    let mut ctx = context(resolver);
    ctx.base_uri = Some("file:///lib/".to_string());
    compile_module("import module namespace o = 'urn:other' at 'other.xq'; o:f()", &mut ctx).expect("compiles");
}

#[rstest]
#[case::duplicate(
    "import module namespace m = 'urn:math'; import module namespace n = 'urn:math'; 1",
    ErrorCode::XQST0047
)]
#[case::missing("import module namespace x = 'urn:missing'; 1", ErrorCode::XQST0059)]
#[case::namespace_mismatch(
    "import module namespace x = 'urn:math' at 'file:///lib/other.xq'; 1",
    ErrorCode::XQST0059
)]
#[case::empty_namespace("import module ''; 1", ErrorCode::XQST0088)]
#[case::prefix_clash("declare namespace m = 'urn:a'; import module namespace m = 'urn:math'; 1", ErrorCode::XQST0033)]
fn import_errors(resolver: InMemoryModuleResolver, #[case] source: &str, #[case] code: ErrorCode) {
    let mut ctx = context(resolver);
    let err = compile_module(source, &mut ctx).expect_err("import fails");
    assert_eq!(err.code_enum(), code, "{err}");
}

#[rstest]
fn main_module_cannot_be_imported() {
    let resolver = InMemoryModuleResolver::new().register("urn:main", None, "1 + 1");
    let err = resolver.load_module("urn:main", None).expect_err("not a library");
    assert_eq!(err.code_enum(), ErrorCode::XQST0059);
    assert!(err.message.contains("main module"));
}

#[rstest]
fn import_failures_keep_the_cause(resolver: InMemoryModuleResolver) {
    let mut ctx = context(resolver);
    let err = compile_module("import module namespace x = 'urn:missing'; 1", &mut ctx).expect_err("missing");
    assert!(err.message.contains("urn:missing"));
    assert!(std::error::Error::source(&err).is_some());
}

#[rstest]
fn later_location_hint_is_tried_when_an_earlier_one_fails(resolver: InMemoryModuleResolver) {
    let mut ctx = context(resolver);
    let source = "import module namespace o = 'urn:other' at 'file:///lib/gone.xq', 'file:///lib/other.xq'; o:f()";
    compile_module(source, &mut ctx).expect("second hint loads");
    assert!(ctx.is_imported_module("urn:other"));
}

#[rstest]
fn last_failing_hint_is_the_reported_cause(resolver: InMemoryModuleResolver) {
    let mut ctx = context(resolver);
    let source = "import module namespace o = 'urn:other' at 'file:///lib/a.xq', 'file:///lib/b.xq'; 1";
    let err = compile_module(source, &mut ctx).expect_err("no hint loads");
    assert_eq!(err.code_enum(), ErrorCode::XQST0059);
    let cause = std::error::Error::source(&err).expect("cause").to_string();
    assert!(cause.contains("file:///lib/b.xq"), "{cause}");
    assert!(!cause.contains("file:///lib/a.xq"), "{cause}");
    assert!(!ctx.is_imported_module("urn:other"));
}
