use super::{CResult, Compiler};
use crate::cst::{NodeId, NodeKind};
use crate::error::ErrorCode;
use crate::expr::{Axis, Expr, ExprId, LocationStep, NodeTest};

/// How the axis of a step was written.
#[derive(Clone, Copy, PartialEq, Eq)]
enum AxisSpelling {
    /// No axis: `child::` unless the test selects attributes.
    Implicit,
    /// `@`
    At,
    Explicit(Axis),
}

impl<'a> Compiler<'a> {
    /// Paths are flattened into one [`Expr::Path`] with their steps in
    /// evaluation order. A bare step compiles to the step itself.
    pub(super) fn lower_path(&mut self, id: NodeId) -> CResult<ExprId> {
        match self.kind(id) {
            NodeKind::AbsoluteSlash => {
                let Some(relative) = self.cst.child(id, 0) else {
                    return Ok(self.add(Expr::Root, id));
                };
                let mut steps = Vec::new();
                self.flatten_path(relative, false, &mut steps)?;
                Ok(self.add(Expr::Path { rooted: true, steps }, id))
            }
            NodeKind::AbsoluteDoubleSlash => {
                let mut steps = Vec::new();
                self.flatten_path(self.child(id, 0)?, true, &mut steps)?;
                Ok(self.add(Expr::Path { rooted: true, steps }, id))
            }
            NodeKind::Slash | NodeKind::DoubleSlash => {
                let mut steps = Vec::new();
                self.flatten_path(id, false, &mut steps)?;
                Ok(self.add(Expr::Path { rooted: false, steps }, id))
            }
            NodeKind::AxisStep | NodeKind::ParentStep => {
                let mut steps = Vec::new();
                self.lower_step(id, false, &mut steps)?;
                steps.pop().ok_or_else(|| self.malformed(id))
            }
            _ => Err(self.malformed(id)),
        }
    }

    /// Steps of a `/` and `//` chain in evaluation order. `after_descendant`
    /// is set when the chain itself follows `//`.
    fn flatten_path(&mut self, id: NodeId, after_descendant: bool, out: &mut Vec<ExprId>) -> CResult<()> {
        let mut pending = vec![(id, after_descendant)];
        while let Some((node, after_descendant)) = pending.pop() {
            match self.kind(node) {
                NodeKind::Slash | NodeKind::DoubleSlash => {
                    let descendant = self.kind(node) == NodeKind::DoubleSlash;
                    pending.push((self.child(node, 1)?, descendant));
                    pending.push((self.child(node, 0)?, after_descendant));
                }
                NodeKind::AxisStep | NodeKind::ParentStep => self.lower_step(node, after_descendant, out)?,
                _ => {
                    if after_descendant {
                        out.push(self.descendant_or_self(node));
                    }
                    out.push(self.lower_expr(node)?);
                }
            }
        }
        Ok(())
    }

    fn descendant_or_self(&mut self, id: NodeId) -> ExprId {
        let step =
            LocationStep { axis: Axis::DescendantOrSelf, test: NodeTest::AnyKind, predicates: Vec::new(), abbreviated: true };
        self.add(Expr::Step(step), id)
    }

    /// Compile one step. After `//` an implicit-axis step folds into the
    /// descendant axes; an explicit axis keeps a separate
    /// `descendant-or-self::node()` step in front of it.
    fn lower_step(&mut self, id: NodeId, after_descendant: bool, out: &mut Vec<ExprId>) -> CResult<()> {
        if self.kind(id) == NodeKind::ParentStep {
            if after_descendant {
                out.push(self.descendant_or_self(id));
            }
            let predicates = self.lower_all(self.children(id))?;
            let step = LocationStep { axis: Axis::Parent, test: NodeTest::AnyKind, predicates, abbreviated: true };
            out.push(self.add(Expr::Step(step), id));
            return Ok(());
        }

        let spelling = match self.cst.text(id) {
            None => AxisSpelling::Implicit,
            Some("@") => AxisSpelling::At,
            Some(name) => match Axis::from_name(name) {
                Some(axis) => AxisSpelling::Explicit(axis),
                None => return Err(self.err(ErrorCode::XPST0003, format!("unknown axis {name}"), id)),
            },
        };
        let test_node = self.child(id, 0)?;
        let attribute_test = matches!(self.kind(test_node), NodeKind::AttributeTest | NodeKind::SchemaAttributeTest);

        let (axis, abbreviated) = match (spelling, after_descendant) {
            (AxisSpelling::At, true) => (Axis::DescendantAttribute, true),
            (AxisSpelling::Implicit, true) if attribute_test => (Axis::DescendantAttribute, true),
            (AxisSpelling::Implicit, true) => (Axis::DescendantOrSelf, true),
            (AxisSpelling::At, false) => (Axis::Attribute, true),
            (AxisSpelling::Implicit, false) if attribute_test => (Axis::Attribute, true),
            (AxisSpelling::Implicit, false) => (Axis::Child, true),
            (AxisSpelling::Explicit(axis), descendant) => {
                if descendant {
                    out.push(self.descendant_or_self(id));
                }
                (axis, false)
            }
        };

        let names_attributes = axis.is_attribute() || axis == Axis::Namespace;
        let test = self.lower_node_test(test_node, names_attributes)?;
        let children = self.children(id);
        let predicates = self.lower_all(&children[1..])?;
        out.push(self.add(Expr::Step(LocationStep { axis, test, predicates, abbreviated }), id));
        Ok(())
    }

    /// Name tests resolve like attribute names on the attribute and
    /// namespace axes and like element names elsewhere.
    fn lower_node_test(&mut self, id: NodeId, names_attributes: bool) -> CResult<NodeTest> {
        match self.kind(id) {
            NodeKind::Wildcard => Ok(NodeTest::WildcardAny),
            NodeKind::LocalWildcard => Ok(NodeTest::LocalWildcard(self.text(id)?.to_string())),
            NodeKind::PrefixWildcard => Ok(NodeTest::NsWildcard(self.wildcard_namespace(id)?)),
            NodeKind::NameTest => {
                let lexical = self.text(id)?;
                let name = if names_attributes {
                    self.ctx.resolve_attribute_name(lexical)
                } else {
                    self.ctx.resolve_element_name(lexical)
                };
                Ok(NodeTest::Name(self.located(name, id)?))
            }
            _ => self.lower_kind_test(id),
        }
    }

    /// Namespace of a `prefix:*` or `Q{uri}*` wildcard.
    pub(super) fn wildcard_namespace(&self, id: NodeId) -> CResult<String> {
        let text = self.text(id)?;
        if let Some(braced) = text.strip_prefix("Q{") {
            return Ok(braced.strip_suffix('}').unwrap_or(braced).to_string());
        }
        match self.ctx.resolve_prefix(text) {
            Some(uri) => Ok(uri.to_string()),
            None => Err(self.err(ErrorCode::XPST0081, format!("namespace prefix {text} is not declared"), id)),
        }
    }

    /// `PrimaryExpr Predicate+`
    pub(super) fn lower_filter(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let (&base, predicates) = children.split_first().ok_or_else(|| self.malformed(id))?;
        let base = self.lower_expr(base)?;
        let predicates = self.lower_all(predicates)?;
        Ok(self.add(Expr::Filter { base, predicates }, id))
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::compile;
    use crate::expr::{Axis, CompiledModule, Expr, ExprId, LocationStep, NodeTest};

    fn steps(module: &CompiledModule, id: ExprId) -> Vec<&LocationStep> {
        let Expr::Path { steps, .. } = module.graph.get(id) else {
            panic!("expected path, got {:?}", module.graph.get(id));
        };
        steps
            .iter()
            .filter_map(|s| match module.graph.get(*s) {
                Expr::Step(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn lone_slash_is_root() {
        let module = compile("/").expect("compiles");
        assert_eq!(module.graph.get(module.body.expect("body")), &Expr::Root);
    }

    #[test]
    fn double_slash_folds_implicit_axes() {
        let module = compile("//a//@b").expect("compiles");
        let body = module.body.expect("body");
        let Expr::Path { rooted, .. } = module.graph.get(body) else { panic!("path") };
        assert!(rooted);
        let axes: Vec<Axis> = steps(&module, body).iter().map(|s| s.axis).collect();
        assert_eq!(axes, [Axis::DescendantOrSelf, Axis::DescendantAttribute]);
    }

    #[test]
    fn double_slash_keeps_explicit_axis() {
        let module = compile("a//child::b").expect("compiles");
        let body = module.body.expect("body");
        let found = steps(&module, body);
        let axes: Vec<Axis> = found.iter().map(|s| s.axis).collect();
        assert_eq!(axes, [Axis::Child, Axis::DescendantOrSelf, Axis::Child]);
        assert_eq!(found[1].test, NodeTest::AnyKind);
        assert!(!found[2].abbreviated);
    }

    #[test]
    fn attribute_test_without_axis_selects_attributes() {
        let module = compile("a/attribute(b)").expect("compiles");
        let body = module.body.expect("body");
        assert_eq!(steps(&module, body)[1].axis, Axis::Attribute);
    }

    #[test]
    fn wildcards_resolve_namespaces() {
        let module = compile("declare namespace p = 'urn:p'; p:*/*:x/Q{urn:q}*").expect("compiles");
        let body = module.body.expect("body");
        let tests: Vec<&NodeTest> = steps(&module, body).iter().map(|s| &s.test).collect();
        let expected = [
            NodeTest::NsWildcard("urn:p".into()),
            NodeTest::LocalWildcard("x".into()),
            NodeTest::NsWildcard("urn:q".into()),
        ];
        assert_eq!(tests, expected.iter().collect::<Vec<_>>());
    }

    #[test]
    fn parent_step_with_predicate() {
        let module = compile("../a[1]").expect("compiles");
        let body = module.body.expect("body");
        let found = steps(&module, body);
        assert_eq!(found[0].axis, Axis::Parent);
        assert_eq!(found[1].predicates.len(), 1);
    }
}
