use platynui_xquery::expr::{ArithmeticOp, Expr};
use platynui_xquery::{
    CompileOptions, ErrorCode, ParseOptions, StaticContext, compile, compile_module_with_options, parse_module,
};
use rstest::rstest;

/// Run `f` on a thread with the default test stack size of a debug build.
fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(f)
        .expect("spawn")
        .join()
        .expect("thread finished")
}

fn parens(depth: usize, inner: &str) -> String {
    format!("{}{inner}{}", "(".repeat(depth), ")".repeat(depth))
}

fn calls(depth: usize) -> String {
    format!("{}1{}", "count(".repeat(depth), ")".repeat(depth))
}

#[rstest]
fn default_limit_fits_a_small_stack() {
    let limit = ParseOptions::default().max_depth;
    on_small_stack(move || {
        // the query body itself is one level
        assert!(parse_module(&parens(limit - 1, "1")).into_result().is_ok());
        assert!(compile(&calls(limit - 1)).is_ok());

        let err = parse_module(&parens(limit + 10, "1")).into_result().expect_err("too deep");
        assert_eq!(err.code_enum(), ErrorCode::XPST0003);
        assert!(err.message.contains("nested too deeply"));
    });
}

#[rstest]
fn deeply_parenthesized_item_types_are_rejected() {
    on_small_stack(|| {
        let source = format!("1 instance of {}", parens(10_000, "xs:integer"));
        let err = parse_module(&source).into_result().expect_err("too deep");
        assert!(err.message.contains("nested too deeply"), "{err}");
        assert!(compile(&format!("1 instance of {}", parens(5, "xs:integer"))).is_ok());
    });
}

#[rstest]
#[case::additive(" + 1")]
#[case::logical(" or 1")]
#[case::simple_map(" ! 1")]
#[case::union(" | 1")]
fn flat_operator_chains_compile(#[case] operator: &str) {
    let source = format!("1{}", operator.repeat(5_000));
    on_small_stack(move || {
        let module = compile(&source).unwrap_or_else(|e| panic!("{e}"));
        assert!(module.body_expr().is_some());
    });
}

#[rstest]
fn flat_chains_do_not_count_as_nesting() {
    let source = format!("1{}", " + 1".repeat(300));
    let options = CompileOptions { max_depth: 8, ..CompileOptions::default() };
    let module = compile_module_with_options(&source, &mut StaticContext::default(), &options).expect("flat chain");
    let Some(Expr::Arithmetic { op: ArithmeticOp::Add, left, .. }) = module.body_expr() else {
        panic!("expected addition at the root");
    };
    assert!(matches!(module.graph.get(*left), Expr::Arithmetic { op: ArithmeticOp::Add, .. }));
}

#[rstest]
fn sign_chains_compile() {
    let source = format!("{}1", "- ".repeat(5_000));
    on_small_stack(move || {
        let module = compile(&source).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(module.body_expr(), Some(Expr::Unary { negate: true, .. })));
    });
}

#[rstest]
fn long_paths_compile_into_one_path() {
    let source = format!("a{}", "/a".repeat(50_000));
    on_small_stack(move || {
        let module = compile(&source).unwrap_or_else(|e| panic!("{e}"));
        let Some(Expr::Path { rooted: false, steps }) = module.body_expr() else {
            panic!("expected a path");
        };
        assert_eq!(steps.len(), 50_001);
    });
}

#[rstest]
#[case::calls(calls(20))]
#[case::function_types(format!("1 instance of {}xs:integer", "function() as ".repeat(20)))]
fn compile_depth_error_is_distinct(#[case] source: String) {
    let options = CompileOptions { max_depth: 8, ..CompileOptions::default() };
    let err = compile_module_with_options(&source, &mut StaticContext::default(), &options).expect_err("too deep");
    assert_eq!(err.code_enum(), ErrorCode::XPST0003);
    assert!(err.message.starts_with("compile depth limit reached"), "{err}");
}
