use platynui_xquery::{CompileOptions, ErrorCode, StaticContext, compile, compile_module_with_options};
use rstest::rstest;

#[rstest]
#[case::boundary_space("declare boundary-space strip; declare boundary-space preserve; 1", ErrorCode::XQST0068)]
#[case::collation(
    "declare default collation 'http://www.w3.org/2005/xpath-functions/collation/codepoint';
     declare default collation 'http://www.w3.org/2005/xpath-functions/collation/codepoint'; 1",
    ErrorCode::XQST0038
)]
#[case::base_uri("declare base-uri 'urn:a'; declare base-uri 'urn:b'; 1", ErrorCode::XQST0032)]
#[case::construction("declare construction strip; declare construction preserve; 1", ErrorCode::XQST0067)]
#[case::ordering("declare ordering ordered; declare ordering unordered; 1", ErrorCode::XQST0065)]
#[case::empty_order("declare default order empty least; declare default order empty greatest; 1", ErrorCode::XQST0069)]
#[case::copy_namespaces(
    "declare copy-namespaces preserve, inherit; declare copy-namespaces no-preserve, no-inherit; 1",
    ErrorCode::XQST0055
)]
#[case::element_namespace(
    "declare default element namespace 'urn:a'; declare default element namespace 'urn:b'; 1",
    ErrorCode::XQST0066
)]
#[case::context_item("declare context item := 1; declare context item := 2; .", ErrorCode::XQST0099)]
fn settings_may_appear_once(#[case] source: &str, #[case] code: ErrorCode) {
    let err = compile(source).expect_err("duplicate setting");
    assert_eq!(err.code_enum(), code, "{err}");
}

#[rstest]
fn duplicate_prefix_points_at_the_second_declaration() {
    let err = compile("declare namespace p = 'urn:a';\ndeclare namespace p = 'urn:b';\n1").expect_err("duplicate");
    assert_eq!(err.code_enum(), ErrorCode::XQST0033);
    let position = err.position.expect("position");
    assert_eq!(position.line, 2);
    assert!(err.to_string().starts_with("err:XQST0033 [at line 2, column 1]"), "{err}");
}

#[rstest]
#[case::reserved_namespace("declare function fn:f() { 1 }; 1", ErrorCode::XQST0045)]
#[case::no_namespace("declare default function namespace ''; declare function f() { 1 }; 1", ErrorCode::XQST0060)]
#[case::duplicate_param("declare function local:f($a, $a) { $a }; 1", ErrorCode::XQST0039)]
#[case::two_visibilities("declare %public %private function local:f() { 1 }; 1", ErrorCode::XQST0106)]
#[case::reserved_annotation("declare %fn:x function local:f() { 1 }; 1", ErrorCode::XQST0045)]
#[case::duplicate_function(
    "declare function local:f() { 1 }; declare function local:f() { 2 }; 1",
    ErrorCode::XQST0034
)]
#[case::duplicate_variable("declare variable $x := 1; declare variable $x := 2; $x", ErrorCode::XQST0049)]
#[case::self_reference("declare variable $x := $x; 1", ErrorCode::XPST0008)]
#[case::setter_after_body_decl("declare variable $x := 1; declare namespace p = 'urn:p'; 1", ErrorCode::XPST0003)]
fn declaration_errors(#[case] source: &str, #[case] code: ErrorCode) {
    let err = compile(source).expect_err("static error");
    assert_eq!(err.code_enum(), code, "{err}");
}

#[rstest]
#[case::version("xquery version '4.0'; 1", ErrorCode::XQST0031)]
#[case::encoding("xquery version '3.1' encoding '8bit'; 1", ErrorCode::XQST0087)]
#[case::library_foreign_function(
    "module namespace m = 'urn:m'; declare function local:f() { 1 };",
    ErrorCode::XQST0048
)]
#[case::library_foreign_variable("module namespace m = 'urn:m'; declare variable $v := 1;", ErrorCode::XQST0048)]
#[case::library_empty_namespace("module namespace m = ''; declare function m:f() { 1 };", ErrorCode::XQST0088)]
#[case::schema_import("import schema 'urn:s'; 1", ErrorCode::XQST0009)]
#[case::module_without_resolver("import module 'urn:m'; 1", ErrorCode::XQST0059)]
fn module_header_errors(#[case] source: &str, #[case] code: ErrorCode) {
    let err = compile(source).expect_err("static error");
    assert_eq!(err.code_enum(), code, "{err}");
}

#[rstest]
#[case::undeclared_variable("$nope", ErrorCode::XPST0008)]
#[case::unbound_prefix("p:f()", ErrorCode::XPST0081)]
#[case::unknown_local_function("local:missing()", ErrorCode::XPST0017)]
#[case::syntax("1 +", ErrorCode::XPST0003)]
fn body_errors(#[case] source: &str, #[case] code: ErrorCode) {
    let err = compile(source).expect_err("static error");
    assert_eq!(err.code_enum(), code, "{err}");
}

#[rstest]
fn accepted_prolog_updates_the_context() {
    let mut ctx = StaticContext::new();
    let source = "xquery version '3.1' encoding 'ISO-8859-1';
        declare boundary-space preserve;
        declare namespace p = 'urn:p';
        declare option p:opt 'on';
        1";
    let module = compile_module_with_options(source, &mut ctx, &CompileOptions::default()).expect("compiles");
    assert_eq!(module.version.as_deref(), Some("3.1"));
    assert_eq!(module.encoding.as_deref(), Some("ISO-8859-1"));
    assert_eq!(ctx.resolve_prefix("p"), Some("urn:p"));
    assert_eq!(module.options.len(), 1);
    assert_eq!(module.options[0].1, "on");
}

#[rstest]
fn strict_functions_reject_unknown_names() {
    let mut ctx = StaticContext::new();
    let options = CompileOptions::default().with_strict_functions(true);
    let err = compile_module_with_options("fn:no-such-function(1)", &mut ctx, &options).expect_err("strict");
    assert_eq!(err.code_enum(), ErrorCode::XPST0017);
    assert!(compile("fn:no-such-function(1)").is_ok());
}
