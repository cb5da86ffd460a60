use super::{CResult, Compiler};
use crate::consts::{LOCAL_NS, XS_NS};
use crate::cst::{NodeId, NodeKind};
use crate::error::ErrorCode;
use crate::expr::{Argument, Expr, ExprId, InlineFunction, is_abstract_cast_target, is_known_atomic_type};
use crate::qname::ExpandedName;
use tracing::trace;

impl<'a> Compiler<'a> {
    pub(super) fn lower_function_call(&mut self, id: NodeId) -> CResult<ExprId> {
        let name = self.function_name(id)?;
        let arguments = self.lower_arguments(self.children(id))?;
        self.check_function(&name, arguments.len(), id)?;
        Ok(self.call(Expr::FunctionCall { name, arguments }, id))
    }

    /// `left => f(args)` calls `f(left, args)`; a variable or parenthesized
    /// callee becomes a dynamic call with the same argument order.
    pub(super) fn lower_arrow(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let [left, callee, args @ ..] = children else {
            return Err(self.malformed(id));
        };
        let left = self.lower_expr(*left)?;
        if self.kind(*callee) == NodeKind::FunctionName {
            let name = self.function_name(*callee)?;
            let mut arguments = vec![Argument::Expr(left)];
            arguments.extend(self.lower_arguments(args)?);
            self.check_function(&name, arguments.len(), *callee)?;
            return Ok(self.call(Expr::FunctionCall { name, arguments }, id));
        }
        let callee = self.lower_expr(*callee)?;
        let mut arguments = vec![Argument::Expr(left)];
        arguments.extend(self.lower_arguments(args)?);
        Ok(self.call(Expr::DynamicCall { callee, arguments }, id))
    }

    pub(super) fn lower_dynamic_call(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let (&callee, args) = children.split_first().ok_or_else(|| self.malformed(id))?;
        let callee = self.lower_expr(callee)?;
        let arguments = self.lower_arguments(args)?;
        Ok(self.call(Expr::DynamicCall { callee, arguments }, id))
    }

    /// `name#arity`
    pub(super) fn lower_named_function_ref(&mut self, id: NodeId) -> CResult<ExprId> {
        let name = self.function_name(id)?;
        let literal = self.text(self.child(id, 0)?)?;
        let arity: usize = literal
            .parse()
            .map_err(|_| self.err(ErrorCode::XPST0017, format!("arity {literal} of {name} is out of range"), id))?;
        self.check_function(&name, arity, id)?;
        Ok(self.add(Expr::NamedFunctionRef { name, arity }, id))
    }

    /// Inline functions see the enclosing local variables as well as their
    /// own parameters.
    pub(super) fn lower_inline_function(&mut self, id: NodeId) -> CResult<ExprId> {
        let mut annotations = Vec::new();
        let mut params = None;
        let mut return_type = None;
        let mut body = None;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Annotation => annotations.push(child),
                NodeKind::ParamList => params = Some(self.lower_params(child)?),
                NodeKind::ReturnType => return_type = Some(self.lower_seq_type(self.child(child, 0)?)?),
                NodeKind::FunctionBody => body = Some(child),
                _ => return Err(self.malformed(child)),
            }
        }
        let annotations = self.lower_annotations(&annotations)?;
        let params = params.unwrap_or_default();
        let body = body.ok_or_else(|| self.malformed(id))?;

        let mark = self.scope_mark();
        for param in &params {
            self.bind(param.name.clone());
        }
        let lowered = self.lower_enclosed_opt(body);
        self.restore(mark);
        let function = InlineFunction { annotations, params, return_type, body: lowered? };
        Ok(self.add(Expr::InlineFunction(Box::new(function)), id))
    }

    fn function_name(&self, id: NodeId) -> CResult<ExpandedName> {
        self.located(self.ctx.resolve_function_name(self.text(id)?), id)
    }

    fn lower_arguments(&mut self, ids: &[NodeId]) -> CResult<Vec<Argument>> {
        ids.iter()
            .map(|&arg| match self.kind(arg) {
                NodeKind::ArgumentPlaceholder => Ok(Argument::Placeholder),
                _ => self.lower_expr(arg).map(Argument::Expr),
            })
            .collect()
    }

    /// Add a call; calls with `?` placeholders are wrapped as partial
    /// applications.
    fn call(&mut self, call: Expr, id: NodeId) -> ExprId {
        let partial = match &call {
            Expr::FunctionCall { arguments, .. } | Expr::DynamicCall { arguments, .. } => {
                arguments.iter().any(|a| matches!(a, Argument::Placeholder))
            }
            _ => false,
        };
        let call = self.add(call, id);
        if partial { self.add(Expr::PartialApplication { call }, id) } else { call }
    }

    /// Calls must match a declared signature in namespaces this module can
    /// see completely: `local:`, the module's own namespace and imported
    /// modules. `xs:` names are constructor functions of one argument.
    /// Other namespaces are checked only with `strict_functions`.
    fn check_function(&self, name: &ExpandedName, arity: usize, id: NodeId) -> CResult<()> {
        if self.ctx.resolve_function(name, arity).is_some() {
            return Ok(());
        }
        let ns = name.ns_uri.as_deref().unwrap_or_default();
        if ns == XS_NS {
            if arity == 1 && is_known_atomic_type(name) && !is_abstract_cast_target(name) {
                return Ok(());
            }
            return Err(self.err(ErrorCode::XPST0017, format!("no constructor function {name}#{arity}"), id));
        }
        let closed = ns == LOCAL_NS || self.ctx.is_imported_module(ns) || self.module_namespace() == Some(ns);
        if closed || self.options.strict_functions {
            return Err(self.err(ErrorCode::XPST0017, format!("unknown function {name}#{arity}"), id));
        }
        trace!(%name, arity, "unchecked function call");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::{CompileOptions, compile, compile_module_with_options};
    use crate::context::StaticContext;
    use crate::error::ErrorCode;
    use crate::expr::{Argument, Expr};
    use rstest::rstest;

    #[rstest]
    #[case("local:missing(1)")]
    #[case("xs:integer(1, 2)")]
    #[case("xs:NOTATION('a')")]
    #[case("declare function local:f($a) { $a }; local:f#2")]
    fn unknown_functions(#[case] source: &str) {
        let err = compile(source).expect_err("unknown function");
        assert_eq!(err.code_enum(), ErrorCode::XPST0017, "{source}");
    }

    #[test]
    fn functions_may_call_later_declarations() {
        let source = "declare function local:a() { local:b() }; declare function local:b() { 1 }; local:a()";
        assert!(compile(source).is_ok());
    }

    #[test]
    fn strict_mode_checks_every_namespace() {
        let mut ctx = StaticContext::default();
        assert!(compile_module_with_options("fn:count(())", &mut ctx, &CompileOptions::default()).is_ok());
        let strict = CompileOptions::default().with_strict_functions(true);
        let mut ctx = StaticContext::default();
        let err = compile_module_with_options("fn:count(())", &mut ctx, &strict).expect_err("strict");
        assert_eq!(err.code_enum(), ErrorCode::XPST0017);
    }

    #[test]
    fn arrow_passes_left_operand_first() {
        let module = compile("declare function local:f($a, $b) { $a }; 1 => local:f(2)").expect("compiles");
        let Expr::FunctionCall { arguments, .. } = module.graph.get(module.body.expect("body")) else {
            panic!("expected call");
        };
        let Argument::Expr(first) = arguments[0] else { panic!("argument") };
        assert!(matches!(module.graph.get(first), Expr::Literal { text, .. } if text.as_str() == "1"));
    }

    #[test]
    fn placeholders_make_partial_applications() {
        let module = compile("concat('a', ?)").expect("compiles");
        let Expr::PartialApplication { call } = module.graph.get(module.body.expect("body")) else {
            panic!("expected partial application");
        };
        let Expr::FunctionCall { arguments, .. } = module.graph.get(*call) else { panic!("call") };
        assert_eq!(arguments[1], Argument::Placeholder);
    }

    #[test]
    fn inline_function_sees_outer_variables() {
        assert!(compile("let $x := 1 return function($y) { $x + $y }").is_ok());
        let err = compile("(function($y) { $y }, $y)").expect_err("parameter out of scope");
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }
}
