mod common;

use common::{Item, eval, ints};
use platynui_xquery::expr::{BindingKind, Expr};
use platynui_xquery::{ErrorCode, compile};
use rstest::rstest;

#[rstest]
#[case("for $x in (1, 2) let $y := $x * 2 where $y > 2 return $y", &[4])]
#[case("for $x in 1 to 3, $y in (10, 20) return $x + $y", &[11, 21, 12, 22, 13, 23])]
#[case("for $x at $i in (5, 6, 7) return $i * 10 + $x", &[15, 26, 37])]
#[case("let $a := 1, $b := $a + 1 return ($a, $b)", &[1, 2])]
#[case("for $x in 1 to 5 where $x mod 2 = 1 where $x > 1 return $x", &[3, 5])]
#[case("for $x in 1 to 2 return for $y in 1 to $x return $y", &[1, 1, 2])]
#[case("declare function local:double($n) { $n * 2 }; for $x in (1, 2) return local:double($x)", &[2, 4])]
#[case("let $s := (1, 2, 3) return sum($s) - count($s)", &[3])]
#[case("for $x in 1 to 5 where $x > 2 count $c return $c", &[1, 2, 3])]
#[case("for $x in 1 to 5 count $c where $c mod 2 = 0 return $x", &[2, 4])]
#[case("for $x in (1, 2, 3) where $x > 1 let $y := $x * 10 return $y", &[20, 30])]
fn flwor_results(#[case] source: &str, #[case] expected: &[i64]) {
    assert_eq!(eval(source), ints(expected), "{source}");
}

#[rstest]
#[case("some $x in (1, 2, 3) satisfies $x > 2", true)]
#[case("every $x in (1, 2, 3) satisfies $x > 2", false)]
#[case("some $x in (1, 2), $y in (2, 3) satisfies $x = $y", true)]
fn quantified_results(#[case] source: &str, #[case] expected: bool) {
    assert_eq!(eval(source), vec![Item::Bool(expected)]);
}

#[rstest]
fn where_filters_the_clause_written_before_it() {
    let module = compile("for $x in (1, 2) where $x > 1 let $y := $x where $y > 1 return $y").expect("compiles");
    let Expr::Binding(outer) = module.graph.get(module.body.expect("body")) else {
        panic!("expected binding");
    };
    assert_eq!(outer.kind, BindingKind::For);
    assert!(outer.where_clause.is_some());
    let Expr::Binding(inner) = module.graph.get(outer.body) else {
        panic!("expected nested binding");
    };
    assert_eq!(inner.kind, BindingKind::Let);
    assert!(inner.where_clause.is_some());
}

#[rstest]
fn where_before_count_stays_on_the_binding() {
    let module = compile("for $x in 1 to 3 where $x > 1 count $c return $c").expect("compiles");
    let Expr::Binding(outer) = module.graph.get(module.body.expect("body")) else { panic!("for") };
    assert!(outer.where_clause.is_some());
    let Expr::Binding(count) = module.graph.get(outer.body) else { panic!("count") };
    assert_eq!(count.kind, BindingKind::Count);
    assert!(count.where_clause.is_none());
}

#[rstest]
fn clauses_after_group_by_run_per_group() {
    let source = "for $x in (1, 2, 3) let $k := $x mod 2 group by $k where $k = 1 let $n := $k * 10 return $n";
    let module = compile(source).expect("compiles");
    let Expr::Binding(outer) = module.graph.get(module.body.expect("body")) else { panic!("for") };
    let group = outer.group_by.as_ref().expect("group by");
    assert!(group.where_clause.is_some());
    let Expr::Binding(per_group) = module.graph.get(group.return_expr) else { panic!("let after group by") };
    assert_eq!(per_group.kind, BindingKind::Let);
    assert_eq!(per_group.variable.local, "n");
    let Expr::Binding(key) = module.graph.get(outer.body) else { panic!("let before group by") };
    assert!(key.where_clause.is_none());
    assert_eq!(key.body, group.return_expr);
}

#[rstest]
fn second_group_by_is_rejected() {
    let err = compile("for $x in 1 group by $x group by $x return $x").expect_err("two group by");
    assert_eq!(err.code_enum(), ErrorCode::XPST0003);
}

#[rstest]
fn order_and_group_attach_to_outermost_binding() {
    let source = "for $x in (3, 1, 2) let $k := $x mod 2 group by $k order by $k descending empty greatest return $k";
    let module = compile(source).expect("compiles");
    let Expr::Binding(outer) = module.graph.get(module.body.expect("body")) else {
        panic!("expected binding");
    };
    let order = outer.order_by.as_ref().expect("order by");
    assert!(order.specs[0].descending);
    assert_eq!(order.specs[0].empty_greatest, Some(true));
    let group = outer.group_by.as_ref().expect("group by");
    assert_eq!(group.keys[0].variable.local, "k");
    let Expr::Binding(inner) = module.graph.get(outer.body) else { panic!("let") };
    assert!(inner.order_by.is_none());
    assert_eq!(group.return_expr, inner.body);
}

#[rstest]
fn count_clause_binds_a_variable() {
    let module = compile("for $x in (1, 2) count $c return $c").expect("compiles");
    let Expr::Binding(outer) = module.graph.get(module.body.expect("body")) else { panic!("for") };
    let Expr::Binding(count) = module.graph.get(outer.body) else { panic!("count") };
    assert_eq!(count.kind, BindingKind::Count);
    assert!(count.input.is_none());
}

#[rstest]
#[case("for $x in 1 return $y", ErrorCode::XPST0008)]
#[case("(for $x in 1 return $x, $x)", ErrorCode::XPST0008)]
#[case("for $x at $x in (1, 2) return $x", ErrorCode::XQST0089)]
#[case("for $x in 1 group by $nope return $x", ErrorCode::XQST0094)]
#[case("for $x in 1 order by $x collation 'urn:unknown' return $x", ErrorCode::XQST0076)]
fn flwor_static_errors(#[case] source: &str, #[case] code: ErrorCode) {
    let err = compile(source).expect_err("static error");
    assert_eq!(err.code_enum(), code, "{source}: {err}");
}
