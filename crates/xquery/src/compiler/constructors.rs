use super::{CResult, Compiler};
use crate::consts::{XML_URI, XMLNS_URI};
use crate::context::BoundarySpace;
use crate::cst::{NodeId, NodeKind};
use crate::error::ErrorCode;
use crate::expr::{AttributeConstructor, ConstructorName, ElementConstructor, Expr, ExprId, NamespaceBinding};
use crate::qname::{ExpandedName, is_ncname};

/// `Some(prefix)` for `xmlns:prefix`, `Some("")` for `xmlns`.
fn namespace_attribute_prefix(name: &str) -> Option<&str> {
    if name == "xmlns" {
        return Some("");
    }
    name.strip_prefix("xmlns:")
}

impl<'a> Compiler<'a> {
    /// Direct element constructors open a namespace scope for their
    /// `xmlns` attributes; the element and attribute names resolve inside
    /// it.
    pub(super) fn lower_direct_element(&mut self, id: NodeId) -> CResult<ExprId> {
        self.ctx.push_in_scope_namespaces();
        let result = self.lower_direct_element_scoped(id);
        self.ctx.pop_in_scope_namespaces();
        result
    }

    fn lower_direct_element_scoped(&mut self, id: NodeId) -> CResult<ExprId> {
        let children = self.children(id);
        let mut namespaces = Vec::new();
        for &attr in children {
            if self.kind(attr) != NodeKind::DirAttribute {
                continue;
            }
            if let Some(prefix) = namespace_attribute_prefix(self.text(attr)?) {
                let binding = self.lower_namespace_attribute(attr, prefix, &namespaces)?;
                namespaces.push(binding);
            }
        }

        let name = self.located(self.ctx.resolve_element_name(self.text(id)?), id)?;

        let mut attribute_names: Vec<ExpandedName> = Vec::new();
        let mut attributes = Vec::new();
        let mut content = Vec::new();
        for &child in children {
            match self.kind(child) {
                NodeKind::DirAttribute => {
                    let lexical = self.text(child)?;
                    if namespace_attribute_prefix(lexical).is_some() {
                        continue;
                    }
                    let attr_name = self.located(self.ctx.resolve_attribute_name(lexical), child)?;
                    if attribute_names.contains(&attr_name) {
                        return Err(self.err(ErrorCode::XQST0040, format!("duplicate attribute {lexical}"), child));
                    }
                    attribute_names.push(attr_name.clone());
                    let value = self.lower_attribute_value(child)?;
                    let constructor = AttributeConstructor { name: ConstructorName::Static(attr_name), value };
                    attributes.push(self.add(Expr::AttributeConstructor(Box::new(constructor)), child));
                }
                NodeKind::Text | NodeKind::CData => content.push(self.direct_text(child)?),
                NodeKind::BoundaryWhitespace => {
                    if self.ctx.boundary_space == BoundarySpace::Preserve {
                        content.push(self.direct_text(child)?);
                    }
                }
                NodeKind::EnclosedExpr => content.push(self.lower_enclosed(child)?),
                _ => content.push(self.lower_expr(child)?),
            }
        }

        let element = ElementConstructor { name: ConstructorName::Static(name), namespaces, attributes, content, direct: true };
        Ok(self.add(Expr::ElementConstructor(Box::new(element)), id))
    }

    /// `xmlns="uri"` or `xmlns:p="uri"`: the value must be literal text.
    fn lower_namespace_attribute(
        &mut self,
        id: NodeId,
        prefix: &str,
        seen: &[NamespaceBinding],
    ) -> CResult<NamespaceBinding> {
        let mut uri = String::new();
        for &part in self.children(id) {
            if self.kind(part) != NodeKind::AttributeText {
                return Err(self.err(
                    ErrorCode::XQST0022,
                    "namespace declaration attributes must have a literal value",
                    part,
                ));
            }
            uri.push_str(self.text(part)?);
        }
        let prefix = (!prefix.is_empty()).then(|| prefix.to_string());
        if seen.iter().any(|b| b.prefix == prefix) {
            let shown = prefix.as_deref().map_or_else(|| "xmlns".to_string(), |p| format!("xmlns:{p}"));
            return Err(self.err(ErrorCode::XQST0071, format!("duplicate namespace declaration {shown}"), id));
        }
        match prefix.as_deref() {
            Some("xmlns") => {
                return Err(self.err(ErrorCode::XQST0070, "the xmlns prefix cannot be declared", id));
            }
            Some("xml") if uri != XML_URI => {
                return Err(self.err(ErrorCode::XQST0070, "the xml prefix cannot be rebound", id));
            }
            Some(p) if p != "xml" && (uri == XML_URI || uri == XMLNS_URI) => {
                return Err(self.err(ErrorCode::XQST0070, format!("{uri} cannot be bound to prefix {p}"), id));
            }
            Some(p) if uri.is_empty() => {
                return Err(self.err(ErrorCode::XQST0085, format!("prefix {p} bound to an empty namespace URI"), id));
            }
            None if uri == XML_URI || uri == XMLNS_URI => {
                return Err(self.err(ErrorCode::XQST0070, format!("{uri} cannot be the default namespace"), id));
            }
            _ => {}
        }
        self.ctx.declare_in_scope_namespace(prefix.as_deref(), &uri);
        Ok(NamespaceBinding { prefix, uri })
    }

    fn lower_attribute_value(&mut self, id: NodeId) -> CResult<Vec<ExprId>> {
        let mut value = Vec::new();
        for &part in self.children(id) {
            match self.kind(part) {
                NodeKind::AttributeText => value.push(self.direct_text(part)?),
                NodeKind::EnclosedExpr => value.push(self.lower_enclosed(part)?),
                _ => return Err(self.malformed(part)),
            }
        }
        Ok(value)
    }

    fn direct_text(&mut self, id: NodeId) -> CResult<ExprId> {
        let text = self.cst.node(id).text.clone().ok_or_else(|| self.malformed(id))?;
        Ok(self.add(Expr::DirectText(text), id))
    }

    /// `<!-- -->` and `<?target content?>` inside or outside element content.
    pub(super) fn lower_direct_leaf(&mut self, id: NodeId) -> CResult<ExprId> {
        match self.kind(id) {
            NodeKind::DirComment => {
                let content = Some(self.direct_text(id)?);
                Ok(self.add(Expr::CommentConstructor { content }, id))
            }
            NodeKind::DirPi => {
                let target = self.text(id)?;
                if target.eq_ignore_ascii_case("xml") {
                    return Err(self.err(
                        ErrorCode::XPST0003,
                        format!("{target} is reserved and cannot be a processing-instruction target"),
                        id,
                    ));
                }
                let target = ConstructorName::Static(ExpandedName::new(None, target));
                let content = match self.cst.child(id, 0) {
                    Some(text) => Some(self.direct_text(text)?),
                    None => None,
                };
                Ok(self.add(Expr::PiConstructor { target, content }, id))
            }
            _ => Err(self.malformed(id)),
        }
    }

    /// Computed constructors. Static names are checked here; a PI body is
    /// rejected for `?>` (`XQDY0026`) only when it is a plain string
    /// literal. Any other content is left for the evaluator to check.
    pub(super) fn lower_computed(&mut self, id: NodeId) -> CResult<ExprId> {
        let kind = self.kind(id);
        let children = self.children(id);
        let (&body, named) = children.split_last().ok_or_else(|| self.malformed(id))?;
        let name_node = named.first().copied();

        let expr = match kind {
            NodeKind::CompElement => {
                let name = self.constructor_name(name_node, id, |c, lexical| c.ctx.resolve_element_name(lexical))?;
                let content = self.lower_enclosed_opt(body)?.into_iter().collect();
                let element = ElementConstructor { name, namespaces: Vec::new(), attributes: Vec::new(), content, direct: false };
                Expr::ElementConstructor(Box::new(element))
            }
            NodeKind::CompAttribute => {
                let name = self.constructor_name(name_node, id, |c, lexical| c.ctx.resolve_attribute_name(lexical))?;
                if let ConstructorName::Static(resolved) = &name {
                    let is_xmlns = (resolved.ns_uri.is_none() && resolved.local == "xmlns")
                        || resolved.ns_uri.as_deref() == Some(XMLNS_URI);
                    if is_xmlns {
                        return Err(self.err(
                            ErrorCode::XQDY0044,
                            format!("{resolved} cannot be the name of a constructed attribute"),
                            id,
                        ));
                    }
                }
                let value = self.lower_enclosed_opt(body)?.into_iter().collect();
                Expr::AttributeConstructor(Box::new(AttributeConstructor { name, value }))
            }
            NodeKind::CompPi => {
                let target = self.constructor_name(name_node, id, |_, lexical| Ok(ExpandedName::new(None, lexical)))?;
                if let ConstructorName::Static(resolved) = &target {
                    let name_node = name_node.ok_or_else(|| self.malformed(id))?;
                    if !is_ncname(&resolved.local) {
                        return Err(self.err(
                            ErrorCode::XPST0003,
                            format!("processing-instruction target {} is not an NCName", resolved.local),
                            name_node,
                        ));
                    }
                    if resolved.local.eq_ignore_ascii_case("xml") {
                        return Err(self.err(
                            ErrorCode::XQDY0064,
                            format!("{} cannot be a processing-instruction target", resolved.local),
                            name_node,
                        ));
                    }
                }
                if let Some(literal) = self.cst.child(body, 0)
                    && self.kind(literal) == NodeKind::StringLiteral
                    && self.text(literal)?.contains("?>")
                {
                    return Err(self.err(
                        ErrorCode::XQDY0026,
                        "processing-instruction content cannot contain '?>'",
                        literal,
                    ));
                }
                let content = self.lower_enclosed_opt(body)?;
                Expr::PiConstructor { target, content }
            }
            NodeKind::CompNamespace => {
                let prefix = self.constructor_name(name_node, id, |_, lexical| Ok(ExpandedName::new(None, lexical)))?;
                if let ConstructorName::Static(resolved) = &prefix
                    && !is_ncname(&resolved.local)
                {
                    return Err(self.err(
                        ErrorCode::XPST0003,
                        format!("namespace prefix {} is not an NCName", resolved.local),
                        id,
                    ));
                }
                let uri = self.lower_enclosed_opt(body)?;
                Expr::NamespaceConstructor { prefix, uri }
            }
            NodeKind::CompText => Expr::TextConstructor { content: self.lower_enclosed_opt(body)? },
            NodeKind::CompComment => Expr::CommentConstructor { content: self.lower_enclosed_opt(body)? },
            NodeKind::CompDocument => Expr::DocumentConstructor { content: self.lower_enclosed_opt(body)? },
            _ => return Err(self.malformed(id)),
        };
        Ok(self.add(expr, id))
    }

    /// A literal constructor name resolved with `resolve`, or a computed
    /// name expression.
    fn constructor_name(
        &mut self,
        name_node: Option<NodeId>,
        owner: NodeId,
        resolve: impl FnOnce(&Self, &str) -> CResult<ExpandedName>,
    ) -> CResult<ConstructorName> {
        let name_node = name_node.ok_or_else(|| self.malformed(owner))?;
        match self.kind(name_node) {
            NodeKind::ConstructorName => {
                let lexical = self.text(name_node)?;
                let resolved = resolve(self, lexical);
                Ok(ConstructorName::Static(self.located(resolved, name_node)?))
            }
            NodeKind::NameExpr => Ok(ConstructorName::Computed(self.lower_expr(self.child(name_node, 0)?)?)),
            _ => Err(self.malformed(name_node)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::compiler::compile;
    use crate::context::{BoundarySpace, StaticContext};
    use crate::error::ErrorCode;
    use crate::expr::{ConstructorName, Expr};
    use rstest::rstest;

    #[rstest]
    #[case("<a b='1' b='2'/>", ErrorCode::XQST0040)]
    #[case("<a xmlns:p='u1' xmlns:p='u2'/>", ErrorCode::XQST0071)]
    #[case("<a xmlns:p='{1}'/>", ErrorCode::XQST0022)]
    #[case("<a xmlns:xml='urn:other'/>", ErrorCode::XQST0070)]
    #[case("<a xmlns:p=''/>", ErrorCode::XQST0085)]
    #[case("<p:a/>", ErrorCode::XPST0081)]
    #[case("attribute xmlns { 1 }", ErrorCode::XQDY0044)]
    #[case("processing-instruction xml { 1 }", ErrorCode::XQDY0064)]
    #[case("processing-instruction pi { '?>' }", ErrorCode::XQDY0026)]
    fn constructor_errors(#[case] source: &str, #[case] code: ErrorCode) {
        let err = compile(source).expect_err("constructor error");
        assert_eq!(err.code_enum(), code, "{source}: {err}");
    }

    #[test]
    fn direct_namespace_scope_covers_element_and_attributes() {
        let module = compile("<p:a xmlns:p='urn:p' p:b='1'/>").expect("compiles");
        let Expr::ElementConstructor(element) = module.graph.get(module.body.expect("body")) else {
            panic!("expected element");
        };
        let ConstructorName::Static(name) = &element.name else { panic!("static name") };
        assert_eq!(name.ns_uri.as_deref(), Some("urn:p"));
        assert_eq!(element.namespaces.len(), 1);
        assert_eq!(element.attributes.len(), 1);
        assert!(compile("(<p:a xmlns:p='urn:p'/>, <p:b/>)").is_err());
    }

    #[test]
    fn boundary_whitespace_follows_declaration() {
        let stripped = compile("<a> <b/> </a>").expect("compiles");
        let Expr::ElementConstructor(element) = stripped.graph.get(stripped.body.expect("body")) else {
            panic!("element");
        };
        assert_eq!(element.content.len(), 1);

        let mut ctx = StaticContext::default();
        let preserved =
            crate::compiler::compile_module("declare boundary-space preserve; <a> <b/> </a>", &mut ctx).expect("compiles");
        assert_eq!(ctx.boundary_space, BoundarySpace::Preserve);
        let Expr::ElementConstructor(element) = preserved.graph.get(preserved.body.expect("body")) else {
            panic!("element");
        };
        assert_eq!(element.content.len(), 3);
    }

    #[test]
    fn pi_content_is_only_checked_when_literal() {
        assert!(compile("processing-instruction pi { concat('?', '>') }").is_ok());
        assert!(compile("processing-instruction pi { '?' || '>' }").is_ok());
    }

    #[test]
    fn computed_names_may_be_expressions() {
        let module = compile("element { 'a' } { 1 }").expect("compiles");
        let Expr::ElementConstructor(element) = module.graph.get(module.body.expect("body")) else {
            panic!("element");
        };
        assert!(matches!(element.name, ConstructorName::Computed(_)));
        assert!(!element.direct);
    }
}
