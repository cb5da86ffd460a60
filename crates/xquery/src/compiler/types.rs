use super::{CResult, Compiler};
use crate::consts::XS_NS;
use crate::cst::{NodeId, NodeKind};
use crate::error::ErrorCode;
use crate::expr::{
    Expr, ExprId, ItemType, NameOrWildcard, NodeTest, Occurrence, SequenceType, SingleType, is_abstract_cast_target,
    is_known_atomic_type,
};
use crate::qname::{ExpandedName, is_ncname};

impl<'a> Compiler<'a> {
    /// `instance of`, `treat as`, `castable as` and `cast as`.
    pub(super) fn lower_type_expr(&mut self, id: NodeId) -> CResult<ExprId> {
        let operand = self.lower_expr(self.child(id, 0)?)?;
        let target = self.child(id, 1)?;
        let expr = match self.kind(id) {
            NodeKind::InstanceOf => Expr::InstanceOf { operand, ty: self.lower_seq_type(target)? },
            NodeKind::TreatAs => Expr::Treat { operand, ty: self.lower_seq_type(target)? },
            NodeKind::CastAs => Expr::Cast { operand, ty: self.lower_single_type(target)? },
            NodeKind::CastableAs => Expr::Castable { operand, ty: self.lower_single_type(target)? },
            _ => return Err(self.malformed(id)),
        };
        Ok(self.add(expr, id))
    }

    pub(super) fn lower_seq_type(&mut self, id: NodeId) -> CResult<SequenceType> {
        match self.kind(id) {
            NodeKind::EmptySequenceType => Ok(SequenceType::EmptySequence),
            NodeKind::SequenceType => {
                let item = self.lower_item_type(self.child(id, 0)?)?;
                let occ = Occurrence::from_indicator(self.cst.child(id, 1).and_then(|o| self.cst.text(o)));
                Ok(SequenceType::Typed { item, occ })
            }
            _ => Err(self.malformed(id)),
        }
    }

    pub(super) fn lower_item_type(&mut self, id: NodeId) -> CResult<ItemType> {
        self.deeper(id, |c| c.lower_item_type_at(id))
    }

    fn lower_item_type_at(&mut self, id: NodeId) -> CResult<ItemType> {
        match self.kind(id) {
            NodeKind::AnyItemTest => Ok(ItemType::AnyItem),
            NodeKind::AtomicType => {
                let name = self.located(self.ctx.resolve_type_name(self.text(id)?), id)?;
                if !is_known_atomic_type(&name) {
                    return Err(self.err(ErrorCode::XPST0051, format!("{name} is not a known atomic type"), id));
                }
                Ok(ItemType::Atomic(name))
            }
            NodeKind::AnyFunctionTest => {
                self.lower_annotations(self.children(id))?;
                Ok(ItemType::AnyFunction)
            }
            NodeKind::FunctionTest => {
                let mut params = Vec::new();
                let mut annotations = Vec::new();
                let mut returns = None;
                for &child in self.children(id) {
                    match self.kind(child) {
                        NodeKind::Annotation => annotations.push(child),
                        NodeKind::ReturnType => returns = Some(self.lower_seq_type(self.child(child, 0)?)?),
                        _ => params.push(self.lower_seq_type(child)?),
                    }
                }
                self.lower_annotations(&annotations)?;
                let returns = returns.ok_or_else(|| self.malformed(id))?;
                Ok(ItemType::Function { params, returns: Box::new(returns) })
            }
            _ => Ok(ItemType::Kind(self.lower_kind_test(id)?)),
        }
    }

    /// Kind tests shared by sequence types and path steps.
    pub(super) fn lower_kind_test(&mut self, id: NodeId) -> CResult<NodeTest> {
        match self.kind(id) {
            NodeKind::AnyKindTest => Ok(NodeTest::AnyKind),
            NodeKind::TextTest => Ok(NodeTest::KindText),
            NodeKind::CommentTest => Ok(NodeTest::KindComment),
            NodeKind::NamespaceNodeTest => Ok(NodeTest::KindNamespaceNode),
            NodeKind::PiTest => {
                let Some(target) = self.cst.text(id) else {
                    return Ok(NodeTest::KindProcessingInstruction(None));
                };
                let target = target.trim();
                if !is_ncname(target) {
                    return Err(self.err(
                        ErrorCode::XPST0003,
                        format!("processing-instruction target {target:?} is not an NCName"),
                        id,
                    ));
                }
                Ok(NodeTest::KindProcessingInstruction(Some(target.to_string())))
            }
            NodeKind::ElementTest | NodeKind::AttributeTest => {
                let element = self.kind(id) == NodeKind::ElementTest;
                let mut name = None;
                let mut ty = None;
                let mut nillable = false;
                for &child in self.children(id) {
                    match self.kind(child) {
                        NodeKind::Wildcard => name = Some(NameOrWildcard::Any),
                        NodeKind::NameTest => {
                            let lexical = self.text(child)?;
                            let resolved = if element {
                                self.ctx.resolve_element_name(lexical)
                            } else {
                                self.ctx.resolve_attribute_name(lexical)
                            };
                            name = Some(NameOrWildcard::Name(self.located(resolved, child)?));
                        }
                        NodeKind::TypeName => ty = Some(self.schema_type_name(child)?),
                        NodeKind::Nillable => nillable = true,
                        _ => return Err(self.malformed(child)),
                    }
                }
                if element {
                    Ok(NodeTest::KindElement { name, ty, nillable })
                } else {
                    Ok(NodeTest::KindAttribute { name, ty })
                }
            }
            NodeKind::DocumentTest => match self.cst.child(id, 0) {
                Some(inner) => Ok(NodeTest::KindDocument(Some(Box::new(self.lower_kind_test(inner)?)))),
                None => Ok(NodeTest::KindDocument(None)),
            },
            NodeKind::SchemaElementTest | NodeKind::SchemaAttributeTest => {
                let lexical = self.text(id)?;
                Err(self.err(
                    ErrorCode::XPST0008,
                    format!("{lexical} is not declared in the in-scope schema definitions"),
                    id,
                ))
            }
            _ => Err(self.malformed(id)),
        }
    }

    /// Type annotation of an element or attribute test. Without imported
    /// schemas only the built-in `xs:` types are in scope.
    fn schema_type_name(&self, id: NodeId) -> CResult<ExpandedName> {
        let name = self.located(self.ctx.resolve_type_name(self.text(id)?), id)?;
        if name.ns_uri.as_deref() != Some(XS_NS) {
            return Err(self.err(ErrorCode::XPST0008, format!("type {name} is not defined"), id));
        }
        Ok(name)
    }

    fn lower_single_type(&mut self, id: NodeId) -> CResult<SingleType> {
        if self.kind(id) != NodeKind::SingleType {
            return Err(self.malformed(id));
        }
        let atomic = self.located(self.ctx.resolve_type_name(self.text(id)?), id)?;
        if is_abstract_cast_target(&atomic) {
            return Err(self.err(ErrorCode::XPST0080, format!("cannot cast to abstract type {atomic}"), id));
        }
        if !is_known_atomic_type(&atomic) {
            return Err(self.err(ErrorCode::XPST0051, format!("{atomic} is not a known atomic type"), id));
        }
        Ok(SingleType { atomic, optional: self.cst.child(id, 0).is_some() })
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::compile;
    use crate::error::ErrorCode;
    use crate::expr::{Expr, ItemType, NodeTest, Occurrence, SequenceType};
    use rstest::rstest;

    #[rstest]
    #[case("1 cast as xs:NOTATION", ErrorCode::XPST0080)]
    #[case("1 cast as xs:anyAtomicType", ErrorCode::XPST0080)]
    #[case("1 cast as xs:nothing", ErrorCode::XPST0051)]
    #[case("1 instance of xs:nothing", ErrorCode::XPST0051)]
    #[case("1 instance of schema-element(a)", ErrorCode::XPST0008)]
    #[case("1 instance of element(a, my:type)", ErrorCode::XPST0081)]
    fn rejects_bad_types(#[case] source: &str, #[case] code: ErrorCode) {
        let err = compile(source).expect_err("type error");
        assert_eq!(err.code_enum(), code, "{source}: {err}");
    }

    #[test]
    fn instance_of_keeps_occurrence() {
        let module = compile("() instance of element(a)*").expect("compiles");
        let Expr::InstanceOf { ty, .. } = module.graph.get(module.body.expect("body")) else {
            panic!("expected instance of");
        };
        let SequenceType::Typed { item: ItemType::Kind(NodeTest::KindElement { name, .. }), occ } = ty else {
            panic!("expected element test, got {ty:?}");
        };
        assert!(name.is_some());
        assert_eq!(*occ, Occurrence::ZeroOrMore);
    }

    #[test]
    fn optional_cast_target() {
        let module = compile("'1' cast as xs:integer?").expect("compiles");
        let Expr::Cast { ty, .. } = module.graph.get(module.body.expect("body")) else {
            panic!("expected cast");
        };
        assert!(ty.optional);
        assert_eq!(ty.atomic.local, "integer");
    }
}
