use super::{CResult, Compiler};
use crate::consts::ERR_NS;
use crate::cst::{NodeId, NodeKind};
use crate::expr::{CatchClause, ErrorSelector, Expr, ExprId, InsertPosition, SwitchCase, TypeswitchCase, UpdateOp};
use crate::qname::ExpandedName;

/// Variables every catch clause binds in the `err` namespace.
const IMPLICIT_CATCH_VARIABLES: &[&str] = &["code", "description", "value", "module", "line-number", "column-number"];

impl<'a> Compiler<'a> {
    pub(super) fn lower_switch(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let (&operand, rest) = children.split_first().ok_or_else(|| self.malformed(id))?;
        let operand = self.lower_expr(operand)?;
        let mut cases = Vec::new();
        let mut default = None;
        for &child in rest {
            match self.kind(child) {
                NodeKind::SwitchCase => {
                    let parts = self.children(child);
                    let (&ret, operands) = parts.split_last().ok_or_else(|| self.malformed(child))?;
                    let operands = self.lower_all(operands)?;
                    let result = self.lower_expr(self.child(ret, 0)?)?;
                    cases.push(SwitchCase { operands, result });
                }
                NodeKind::Default => default = Some(self.lower_expr(self.child(child, 0)?)?),
                _ => return Err(self.malformed(child)),
            }
        }
        let default = default.ok_or_else(|| self.malformed(id))?;
        Ok(self.add(Expr::Switch { operand, cases, default }, id))
    }

    /// Each case variable is in scope only in its own return expression.
    pub(super) fn lower_typeswitch(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let (&operand, rest) = children.split_first().ok_or_else(|| self.malformed(id))?;
        let operand = self.lower_expr(operand)?;
        let mut cases = Vec::new();
        let mut default = None;
        let mut default_var = None;
        for &child in rest {
            let variable = match self.cst.text(child) {
                Some(lexical) => Some(self.variable_name(lexical, child)?),
                None => None,
            };
            match self.kind(child) {
                NodeKind::TypeswitchCase => {
                    let parts = self.children(child);
                    let (&ret, types) = parts.split_last().ok_or_else(|| self.malformed(child))?;
                    let types = types.iter().map(|&t| self.lower_seq_type(t)).collect::<CResult<Vec<_>>>()?;
                    let result = self.lower_scoped(variable.clone(), self.child(ret, 0)?)?;
                    cases.push(TypeswitchCase { variable, types, result });
                }
                NodeKind::Default => {
                    default = Some(self.lower_scoped(variable.clone(), self.child(child, 0)?)?);
                    default_var = variable;
                }
                _ => return Err(self.malformed(child)),
            }
        }
        let default = default.ok_or_else(|| self.malformed(id))?;
        Ok(self.add(Expr::Typeswitch { operand, cases, default_var, default }, id))
    }

    fn lower_scoped(&mut self, variable: Option<ExpandedName>, body: NodeId) -> CResult<ExprId> {
        let mark = self.scope_mark();
        if let Some(variable) = variable {
            self.bind(variable);
        }
        let result = self.lower_expr(body);
        self.restore(mark);
        result
    }

    /// `try { Expr? } catch NameTest (| NameTest)* { Expr? }`
    pub(super) fn lower_try(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let (&body, clauses) = children.split_first().ok_or_else(|| self.malformed(id))?;
        let body = self.lower_enclosed_opt(body)?;
        let mut catches = Vec::new();
        for &clause in clauses {
            catches.push(self.lower_catch(clause)?);
        }
        Ok(self.add(Expr::TryCatch { body, catches }, id))
    }

    fn lower_catch(&mut self, id: NodeId) -> CResult<CatchClause> {
        if self.kind(id) != NodeKind::Catch {
            return Err(self.malformed(id));
        }
        let mut clause =
            CatchClause { errors: Vec::new(), code_var: None, description_var: None, value_var: None, body: None };
        let mut explicit = Vec::new();
        let mut body = None;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::CatchErrorList => {
                    for &test in self.children(child) {
                        let selector = self.lower_error_selector(test)?;
                        clause.errors.push(selector);
                    }
                }
                NodeKind::VarName => explicit.push(self.variable_name(self.text(child)?, child)?),
                NodeKind::EnclosedExpr => body = Some(child),
                _ => return Err(self.malformed(child)),
            }
        }
        let mut explicit = explicit.into_iter();
        clause.code_var = explicit.next();
        clause.description_var = explicit.next();
        clause.value_var = explicit.next();

        let mark = self.scope_mark();
        for local in IMPLICIT_CATCH_VARIABLES {
            self.bind(ExpandedName::in_ns(ERR_NS, *local));
        }
        for var in [&clause.code_var, &clause.description_var, &clause.value_var].into_iter().flatten() {
            self.bind(var.clone());
        }
        let result = match body {
            Some(body) => self.lower_enclosed_opt(body),
            None => Err(self.malformed(id)),
        };
        self.restore(mark);
        clause.body = result?;
        Ok(clause)
    }

    fn lower_error_selector(&self, id: NodeId) -> CResult<ErrorSelector> {
        match self.kind(id) {
            NodeKind::Wildcard => Ok(ErrorSelector::Any),
            NodeKind::PrefixWildcard => Ok(ErrorSelector::Namespace(self.wildcard_namespace(id)?)),
            NodeKind::LocalWildcard => Ok(ErrorSelector::Local(self.text(id)?.to_string())),
            NodeKind::NameTest => {
                let name = self.located(self.ctx.resolve_element_name(self.text(id)?), id)?;
                Ok(ErrorSelector::Name(name))
            }
            _ => Err(self.malformed(id)),
        }
    }

    /// Update primitives. The insert position comes from the node text:
    /// `into` (or nothing) appends, `preceding` and `following` insert as
    /// siblings.
    pub(super) fn lower_update(&mut self, id: NodeId) -> CResult<ExprId> {
        let target_or_source = self.lower_expr(self.child(id, 0)?)?;
        let op = match self.kind(id) {
            NodeKind::UpdateReplace => UpdateOp::Replace { target: target_or_source, with: self.second(id)? },
            NodeKind::UpdateValue => UpdateOp::Value { target: target_or_source, with: self.second(id)? },
            NodeKind::UpdateInsert => {
                let position = match self.cst.text(id) {
                    Some("preceding") => InsertPosition::Before,
                    Some("following") => InsertPosition::After,
                    _ => InsertPosition::Append,
                };
                UpdateOp::Insert { source: target_or_source, target: self.second(id)?, position }
            }
            NodeKind::UpdateDelete => UpdateOp::Delete { target: target_or_source },
            NodeKind::UpdateRename => UpdateOp::Rename { target: target_or_source, name: self.second(id)? },
            _ => return Err(self.malformed(id)),
        };
        Ok(self.add(Expr::Update(op), id))
    }

    fn second(&mut self, id: NodeId) -> CResult<ExprId> {
        self.lower_expr(self.child(id, 1)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::compile;
    use crate::error::ErrorCode;
    use crate::expr::{ErrorSelector, Expr, InsertPosition, UpdateOp};

    #[test]
    fn catch_binds_error_variables() {
        let module = compile("try { 1 } catch err:FOER0000 | * { $err:code, $err:description }").expect("compiles");
        let Expr::TryCatch { catches, .. } = module.graph.get(module.body.expect("body")) else {
            panic!("expected try");
        };
        assert_eq!(catches[0].errors.len(), 2);
        assert!(matches!(&catches[0].errors[0], ErrorSelector::Name(n) if n.local == "FOER0000"));
        assert_eq!(catches[0].errors[1], ErrorSelector::Any);
    }

    #[test]
    fn catch_variables_do_not_leak() {
        let err = compile("(try { 1 } catch * { 2 }, $err:code)").expect_err("out of scope");
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }

    #[test]
    fn typeswitch_case_variable_scope() {
        let ok = compile("typeswitch (1) case $i as xs:integer return $i default $d return $d");
        assert!(ok.is_ok(), "{ok:?}");
        let err = compile("typeswitch (1) case $i as xs:integer return 1 default return $i").expect_err("unbound");
        assert_eq!(err.code_enum(), ErrorCode::XPST0008);
    }

    #[test]
    fn insert_positions() {
        for (source, expected) in [
            ("update insert <a/> into <b/>", InsertPosition::Append),
            ("update insert <a/> preceding <b/>", InsertPosition::Before),
            ("update insert <a/> following <b/>", InsertPosition::After),
        ] {
            let module = compile(source).expect("compiles");
            let Expr::Update(UpdateOp::Insert { position, .. }) = module.graph.get(module.body.expect("body")) else {
                panic!("expected insert for {source}");
            };
            assert_eq!(*position, expected, "{source}");
        }
    }
}
