use platynui_xquery::{ErrorCode, NodeKind, ParseOptions, parse_expression, parse_module, parse_module_with_options};
use rstest::rstest;

fn sexpr(source: &str) -> String {
    let (cst, root) = parse_expression(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    cst.to_sexpr(root)
}

#[rstest]
#[case("a or b and c", "(or a (and b c))")]
#[case("1 + 2 * 3", "(+ integer:1 (* integer:2 integer:3))")]
#[case("a/b//c", "(// (/ a b) c)")]
#[case("$x to 3", "(to $:x integer:3)")]
#[case("-1", "(neg integer:1)")]
#[case("a = b", "(= a b)")]
#[case("a eq b", "(eq a b)")]
#[case("a || b", "(|| a b)")]
#[case("a ! b", "(! a b)")]
#[case("a union b except c", "(union a (except b c))")]
#[case("a/@b", "(/ a (step:@ name-test:b))")]
fn expression_shapes(#[case] source: &str, #[case] expected: &str) {
    assert_eq!(sexpr(source), expected);
}

#[rstest]
#[case("for $x in 1 return $x", NodeKind::Flwor)]
#[case("some $x in 1 satisfies $x", NodeKind::SomeExpr)]
#[case("if (1) then 2 else 3", NodeKind::If)]
#[case("<a/>", NodeKind::DirElement)]
#[case("element a { 1 }", NodeKind::CompElement)]
#[case("f#1", NodeKind::NamedFunctionRef)]
#[case("function($x) { $x }", NodeKind::InlineFunction)]
#[case("try { 1 } catch * { 2 }", NodeKind::Try)]
#[case("switch (1) case 1 return 2 default return 3", NodeKind::Switch)]
#[case("1 instance of xs:integer", NodeKind::InstanceOf)]
#[case("1 => f()", NodeKind::ArrowCall)]
fn root_kinds(#[case] source: &str, #[case] kind: NodeKind) {
    let (cst, root) = parse_expression(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    assert_eq!(cst.kind(root), kind, "{}", cst.to_sexpr(root));
}

#[rstest]
#[case("for")]
#[case("element")]
#[case("for/x")]
#[case("if")]
fn keywords_are_names_when_no_construct_follows(#[case] source: &str) {
    assert!(parse_expression(source).is_ok(), "{source}");
}

#[rstest]
#[case("let $x := 1 return")]
#[case("if (1) then 2")]
#[case("<a>")]
#[case("1 +")]
#[case("1 eq 2 eq 3")]
fn incomplete_expressions_are_rejected(#[case] source: &str) {
    let err = parse_expression(source).expect_err(source);
    assert_eq!(err.code_enum(), ErrorCode::XPST0003, "{source}: {err}");
}

#[rstest]
fn mismatched_end_tag_names_both_tags() {
    let outcome = parse_module("<a><b></a>");
    assert!(outcome.found_errors());
    let err = &outcome.errors()[0];
    assert_eq!(err.code_enum(), ErrorCode::XQST0118);
    assert!(err.message.contains("closing tag a"), "{}", err.message);
    assert!(err.message.contains("expected b"), "{}", err.message);
}

#[rstest]
fn prolog_errors_are_collected_per_declaration() {
    let outcome = parse_module("declare variable $a := ; declare variable $b := ; 1");
    assert!(outcome.errors().len() >= 2, "{}", outcome.error_message());
    assert_eq!(outcome.error_message().lines().count(), outcome.errors().len());
}

#[rstest]
fn broken_declarations_leave_no_nodes_behind() {
    let broken = parse_module("declare variable $a := f(1, <x>{ 2 + ; declare variable $b := 2; $b");
    assert_eq!(broken.errors().len(), 1, "{}", broken.error_message());
    let clean = parse_module("declare variable $b := 2; $b");
    let (broken, clean) = (broken.cst(), clean.cst());
    assert_eq!(broken.len(), clean.len());
    let (Some(broken_root), Some(clean_root)) = (broken.root(), clean.root()) else { panic!("roots") };
    assert_eq!(broken.to_sexpr(broken_root), clean.to_sexpr(clean_root));
}

#[rstest]
fn nesting_limit_is_a_syntax_error() {
    let source = format!("{}1{}", "(".repeat(50), ")".repeat(50));
    let outcome = parse_module_with_options(&source, ParseOptions { max_depth: 10 });
    let err = outcome.into_result().expect_err("too deep");
    assert_eq!(err.code_enum(), ErrorCode::XPST0003);
    assert!(err.message.contains("nested too deeply"));
}

#[rstest]
fn library_module_shape() {
    let outcome = parse_module("module namespace m = 'urn:m'; declare function m:f() { 1 };");
    let cst = outcome.into_result().expect("parses");
    let root = cst.root().expect("root");
    assert_eq!(cst.kind(root), NodeKind::LibraryModule);
    assert!(cst.find_child(root, NodeKind::ModuleDecl).is_some());
}

#[rstest]
fn failed_speculation_leaves_no_nodes() {
    // `for` followed by something other than `$` is a name test, not a FLWOR
    let (cst, root) = parse_expression("for/x").expect("parses");
    assert_eq!(cst.to_sexpr(root), "(/ for x)");
    assert!(!cst.to_sexpr(root).contains("FLWOR"));
}
