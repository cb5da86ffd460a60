use super::{CResult, Compiler};
use crate::consts::{OPTIONS_NS, RESERVED_NAMESPACES, SUPPORTED_VERSIONS, XQUERY_NS};
use crate::context::{BoundarySpace, ConstructionMode, CopyNamespaces, EmptyOrder, OrderingMode};
use crate::cst::{NodeId, NodeKind};
use crate::error::{Error, ErrorCode};
use crate::expr::{
    Annotation, CompiledModule, ContextItemDef, Expr, ExprId, FunctionDef, FunctionSignature, GlobalVariable, ModuleKind,
    Param, VariableDef,
};
use crate::qname::{ExpandedName, QName};
use compact_str::CompactString;
use tracing::{debug, trace, warn};

/// `[A-Za-z] ([A-Za-z0-9._] | '-')*`
fn is_valid_encoding_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn is_utf8(name: &str) -> bool {
    name.eq_ignore_ascii_case("utf-8") || name.eq_ignore_ascii_case("utf8")
}

/// A function declaration whose body is compiled after the prolog.
struct PendingBody {
    function: usize,
    body: NodeId,
}

impl<'a> Compiler<'a> {
    pub(super) fn lower_module(mut self, root: NodeId) -> CResult<CompiledModule> {
        let library = match self.kind(root) {
            NodeKind::MainModule => false,
            NodeKind::LibraryModule => true,
            _ => return Err(self.malformed(root)),
        };
        let mut pending = Vec::new();
        let mut query_body = None;
        for &child in self.children(root) {
            match self.kind(child) {
                NodeKind::VersionDecl => self.lower_version_decl(child)?,
                NodeKind::ModuleDecl => self.lower_module_decl(child)?,
                NodeKind::Prolog => pending = self.lower_prolog(child)?,
                NodeKind::QueryBody if !library => query_body = Some(child),
                _ => return Err(self.malformed(child)),
            }
        }

        for PendingBody { function, body } in pending {
            let compiled = self.lower_function_body(function, body)?;
            if let Some(def) = self.functions.get_mut(function) {
                def.body = Some(compiled);
            }
        }

        let body = match query_body {
            Some(node) => Some(self.lower_expr(node)?),
            None => None,
        };
        Ok(self.finish(body))
    }

    fn lower_version_decl(&mut self, id: NodeId) -> CResult<()> {
        for &child in self.children(id) {
            let text = self.text(child)?;
            match self.kind(child) {
                NodeKind::Version => {
                    if !SUPPORTED_VERSIONS.contains(&text) {
                        return Err(self.err(ErrorCode::XQST0031, format!("unsupported version {text}"), child));
                    }
                    self.version = Some(text.to_string());
                }
                NodeKind::Encoding => {
                    if !is_valid_encoding_name(text) {
                        return Err(self.err(ErrorCode::XQST0087, format!("invalid encoding name {text:?}"), child));
                    }
                    if !is_utf8(text) {
                        warn!(encoding = text, "non-UTF-8 encoding declared; source is treated as UTF-8");
                    }
                    self.encoding = Some(text.to_string());
                }
                _ => return Err(self.malformed(child)),
            }
        }
        Ok(())
    }

    fn lower_module_decl(&mut self, id: NodeId) -> CResult<()> {
        let prefix = self.text(id)?;
        let uri_node = self.child(id, 0)?;
        let uri = self.text(uri_node)?;
        if uri.is_empty() {
            return Err(self.err(ErrorCode::XQST0088, "library module with an empty target namespace", uri_node));
        }
        let declared = self.ctx.declare_namespace(prefix, uri);
        self.located(declared, id)?;
        debug!(prefix, namespace = uri, "library module");
        self.kind = ModuleKind::Library { prefix: prefix.to_string(), namespace: uri.to_string() };
        Ok(())
    }

    pub(super) fn module_namespace(&self) -> Option<&str> {
        match &self.kind {
            ModuleKind::Library { namespace, .. } => Some(namespace),
            ModuleKind::Main => None,
        }
    }

    /// Record a one-shot setting, failing with `code` on its second occurrence.
    fn once(&self, seen: bool, code: ErrorCode, what: &str, id: NodeId) -> CResult<()> {
        if seen {
            return Err(self.err(code, format!("more than one {what} declaration"), id));
        }
        Ok(())
    }

    /// Settings, namespace declarations and imports must precede variable,
    /// function, context item and option declarations.
    fn check_setter_order(&self, id: NodeId) -> CResult<()> {
        if self.flags.body_declarations {
            return Err(self.err(
                ErrorCode::XPST0003,
                format!(
                    "{} must precede variable, function, context item and option declarations",
                    self.kind(id).tag()
                ),
                id,
            ));
        }
        Ok(())
    }

    fn lower_prolog(&mut self, id: NodeId) -> CResult<Vec<PendingBody>> {
        let mut pending = Vec::new();
        for &decl in self.children(id) {
            trace!(decl = self.kind(decl).tag(), line = self.pos(decl).line, "prolog declaration");
            match self.kind(decl) {
                NodeKind::VarDecl | NodeKind::FunctionDecl | NodeKind::ContextItemDecl | NodeKind::OptionDecl => {
                    self.flags.body_declarations = true;
                }
                _ => self.check_setter_order(decl)?,
            }
            match self.kind(decl) {
                NodeKind::NamespaceDecl => {
                    let prefix = self.text(decl)?;
                    let uri = self.text(self.child(decl, 0)?)?;
                    let declared = self.ctx.declare_namespace(prefix, uri);
                    self.located(declared, decl)?;
                }
                NodeKind::DefaultElementNamespace => {
                    self.once(self.flags.default_element_namespace, ErrorCode::XQST0066, "default element namespace", decl)?;
                    self.flags.default_element_namespace = true;
                    let uri = self.text(self.child(decl, 0)?)?;
                    self.ctx.default_element_namespace = (!uri.is_empty()).then(|| uri.to_string());
                }
                NodeKind::DefaultFunctionNamespace => {
                    self.once(self.flags.default_function_namespace, ErrorCode::XQST0066, "default function namespace", decl)?;
                    self.flags.default_function_namespace = true;
                    let uri = self.text(self.child(decl, 0)?)?;
                    self.ctx.default_function_namespace = (!uri.is_empty()).then(|| uri.to_string());
                }
                NodeKind::DefaultCollation => {
                    self.once(self.flags.default_collation, ErrorCode::XQST0038, "default collation", decl)?;
                    self.flags.default_collation = true;
                    let uri = self.text(self.child(decl, 0)?)?;
                    let set = self.ctx.set_default_collation(uri);
                    self.located(set, decl)?;
                }
                NodeKind::BaseUriDecl => {
                    self.once(self.flags.base_uri, ErrorCode::XQST0032, "base-uri", decl)?;
                    self.flags.base_uri = true;
                    let uri = self.text(self.child(decl, 0)?)?;
                    self.ctx.base_uri = Some(self.ctx.resolve_uri(uri));
                }
                NodeKind::BoundarySpaceDecl => {
                    self.once(self.flags.boundary_space, ErrorCode::XQST0068, "boundary-space", decl)?;
                    self.flags.boundary_space = true;
                    self.ctx.boundary_space = match self.text(decl)? {
                        "preserve" => BoundarySpace::Preserve,
                        _ => BoundarySpace::Strip,
                    };
                }
                NodeKind::ConstructionDecl => {
                    self.once(self.flags.construction, ErrorCode::XQST0067, "construction", decl)?;
                    self.flags.construction = true;
                    self.ctx.construction = match self.text(decl)? {
                        "strip" => ConstructionMode::Strip,
                        _ => ConstructionMode::Preserve,
                    };
                }
                NodeKind::OrderingModeDecl => {
                    self.once(self.flags.ordering, ErrorCode::XQST0065, "ordering mode", decl)?;
                    self.flags.ordering = true;
                    self.ctx.ordering = match self.text(decl)? {
                        "unordered" => OrderingMode::Unordered,
                        _ => OrderingMode::Ordered,
                    };
                }
                NodeKind::EmptyOrderDecl => {
                    self.once(self.flags.empty_order, ErrorCode::XQST0069, "empty order", decl)?;
                    self.flags.empty_order = true;
                    self.ctx.empty_order = match self.text(decl)? {
                        "greatest" => EmptyOrder::Greatest,
                        _ => EmptyOrder::Least,
                    };
                }
                NodeKind::CopyNamespacesDecl => {
                    self.once(self.flags.copy_namespaces, ErrorCode::XQST0055, "copy-namespaces", decl)?;
                    self.flags.copy_namespaces = true;
                    let (preserve, inherit) = self.text(decl)?.split_once(',').ok_or_else(|| self.malformed(decl))?;
                    self.ctx.copy_namespaces =
                        CopyNamespaces { preserve: preserve == "preserve", inherit: inherit == "inherit" };
                }
                NodeKind::SchemaImport => self.lower_schema_import(decl)?,
                NodeKind::ModuleImport => self.lower_module_import(decl)?,
                NodeKind::OptionDecl => {
                    let lexical = self.text(decl)?;
                    let name = self.option_name(lexical, decl)?;
                    let value = self.text(self.child(decl, 0)?)?;
                    self.ctx.add_option(name, value);
                }
                NodeKind::ContextItemDecl => self.lower_context_item_decl(decl)?,
                NodeKind::VarDecl => self.lower_var_decl(decl)?,
                NodeKind::FunctionDecl => {
                    if let Some(body) = self.lower_function_decl(decl)? {
                        pending.push(PendingBody { function: self.functions.len() - 1, body });
                    }
                }
                _ => return Err(self.malformed(decl)),
            }
        }
        Ok(pending)
    }

    /// Unprefixed option names live in the XQuery options namespace.
    fn option_name(&self, lexical: &str, id: NodeId) -> CResult<ExpandedName> {
        let name = self.located(self.ctx.resolve_attribute_name(lexical), id)?;
        if name.ns_uri.is_none() {
            return Ok(ExpandedName::in_ns(OPTIONS_NS, name.local));
        }
        Ok(name)
    }

    fn at_hints(&self, id: NodeId) -> CResult<Vec<String>> {
        self.children(id)
            .iter()
            .filter(|&&c| self.kind(c) == NodeKind::AtHint)
            .map(|&c| self.text(c).map(str::to_string))
            .collect()
    }

    fn lower_schema_import(&mut self, id: NodeId) -> CResult<()> {
        let uri_node = self.cst.find_child(id, NodeKind::StringLiteral).ok_or_else(|| self.malformed(id))?;
        let uri = self.text(uri_node)?;
        let hints = self.at_hints(id)?;
        if self.cst.find_child(id, NodeKind::DefaultElementNamespace).is_some() {
            self.once(self.flags.default_element_namespace, ErrorCode::XQST0066, "default element namespace", id)?;
            self.flags.default_element_namespace = true;
            self.ctx.default_element_namespace = (!uri.is_empty()).then(|| uri.to_string());
        }
        debug!(namespace = uri, ?hints, "schema import");
        let imported = self.ctx.import_schema(uri, self.cst.text(id), &hints);
        self.located(imported, id)
    }

    fn lower_module_import(&mut self, id: NodeId) -> CResult<()> {
        let uri_node = self.child(id, 0)?;
        let uri = self.text(uri_node)?;
        let hints = self.at_hints(id)?;
        debug!(namespace = uri, ?hints, "module import");
        let imported = self.ctx.import_module(uri, self.cst.text(id), &hints);
        self.located(imported, id)
    }

    fn lower_context_item_decl(&mut self, id: NodeId) -> CResult<()> {
        self.once(self.flags.context_item, ErrorCode::XQST0099, "context item", id)?;
        self.flags.context_item = true;
        let mut def = ContextItemDef { item_type: None, value: None, external: false };
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::External => {
                    def.external = true;
                    def.value = match self.cst.child(child, 0) {
                        Some(default) => Some(self.lower_expr(default)?),
                        None => None,
                    };
                }
                kind if def.item_type.is_none() && def.value.is_none() && is_item_type_node(kind) => {
                    def.item_type = Some(self.lower_item_type(child)?);
                }
                _ => def.value = Some(self.lower_expr(child)?),
            }
        }
        self.ctx.context_item_type = def.item_type.clone();
        self.context_item = Some(def);
        Ok(())
    }

    fn lower_var_decl(&mut self, id: NodeId) -> CResult<()> {
        let name = self.variable_name(self.text(id)?, id)?;
        let mut annotations = Vec::new();
        let mut sequence_type = None;
        let mut value = None;
        let mut external = false;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Annotation => annotations.push(child),
                NodeKind::SequenceType | NodeKind::EmptySequenceType => {
                    sequence_type = Some(self.lower_seq_type(child)?);
                }
                NodeKind::External => {
                    external = true;
                    value = match self.cst.child(child, 0) {
                        Some(default) => Some(self.lower_expr(default)?),
                        None => None,
                    };
                }
                // The initializer cannot see the variable it initializes.
                _ => value = Some(self.lower_expr(child)?),
            }
        }
        let annotations = self.lower_annotations(&annotations)?;
        if let Some(ns) = self.module_namespace()
            && name.ns_uri.as_deref() != Some(ns)
        {
            return Err(self.err(
                ErrorCode::XQST0048,
                format!("variable ${name} is not in the library module namespace {ns}"),
                id,
            ));
        }
        let variable = GlobalVariable { name, annotations, sequence_type, external };
        let declared = self.ctx.declare_variable(variable.clone());
        self.located(declared, id)?;
        self.variables.push(VariableDef { variable, value });
        Ok(())
    }

    /// Register the signature. Returns the body node to compile in the
    /// second phase, if the function is not external.
    fn lower_function_decl(&mut self, id: NodeId) -> CResult<Option<NodeId>> {
        let lexical = self.text(id)?;
        let name = self.located(self.ctx.resolve_function_name(lexical), id)?;
        let Some(ns) = name.ns_uri.as_deref() else {
            return Err(self.err(ErrorCode::XQST0060, format!("function {lexical} has no namespace"), id));
        };
        if RESERVED_NAMESPACES.contains(&ns) {
            return Err(self.err(ErrorCode::XQST0045, format!("function {lexical} is in the reserved namespace {ns}"), id));
        }
        if let Some(module_ns) = self.module_namespace()
            && ns != module_ns
        {
            return Err(self.err(
                ErrorCode::XQST0048,
                format!("function {lexical} is not in the library module namespace {module_ns}"),
                id,
            ));
        }

        let mut annotations = Vec::new();
        let mut params = Vec::new();
        let mut return_type = None;
        let mut body = None;
        let mut external = false;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::Annotation => annotations.push(child),
                NodeKind::ParamList => params = self.lower_params(child)?,
                NodeKind::ReturnType => return_type = Some(self.lower_seq_type(self.child(child, 0)?)?),
                NodeKind::External => external = true,
                NodeKind::FunctionBody => body = Some(child),
                _ => return Err(self.malformed(child)),
            }
        }
        let annotations = self.lower_annotations(&annotations)?;
        let signature = FunctionSignature { name, annotations, params, return_type, external };
        let declared = self.ctx.declare_function(signature.clone());
        self.located(declared, id)?;
        debug!(name = %signature.name, arity = signature.arity(), external, "function declared");
        self.functions.push(FunctionDef { signature, body: None });
        Ok(body)
    }

    /// `($a as T, $b)`; a name may appear only once.
    pub(super) fn lower_params(&mut self, id: NodeId) -> CResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        for &child in self.children(id) {
            let name = self.variable_name(self.text(child)?, child)?;
            if params.iter().any(|p| p.name == name) {
                return Err(self.err(ErrorCode::XQST0039, format!("duplicate parameter ${name}"), child));
            }
            let sequence_type = match self.cst.child(child, 0) {
                Some(ty) => Some(self.lower_seq_type(ty)?),
                None => None,
            };
            params.push(Param { name, sequence_type });
        }
        Ok(params)
    }

    /// Annotation names default to the XQuery namespace. Only `%public` and
    /// `%private` may use a reserved namespace, and at most one of them.
    pub(super) fn lower_annotations(&mut self, ids: &[NodeId]) -> CResult<Vec<Annotation>> {
        let mut out: Vec<Annotation> = Vec::new();
        for &id in ids {
            let lexical = self.text(id)?;
            let parsed = QName::parse(lexical).ok_or_else(|| self.malformed(id))?;
            let name = if parsed.prefix.is_none() && !parsed.is_braced() {
                ExpandedName::in_ns(XQUERY_NS, parsed.local)
            } else {
                self.located(self.ctx.resolve_attribute_name(lexical), id)?
            };
            let ns = name.ns_uri.as_deref().unwrap_or_default();
            let visibility = ns == XQUERY_NS && matches!(name.local.as_str(), "public" | "private");
            if RESERVED_NAMESPACES.contains(&ns) && !visibility {
                return Err(self.err(ErrorCode::XQST0045, format!("annotation %{lexical} is in a reserved namespace"), id));
            }
            if visibility
                && out.iter().any(|a| {
                    a.name.ns_uri.as_deref() == Some(XQUERY_NS) && matches!(a.name.local.as_str(), "public" | "private")
                })
            {
                return Err(self.err(ErrorCode::XQST0106, "more than one %public or %private annotation", id));
            }
            let values = self
                .children(id)
                .iter()
                .map(|&v| self.cst.node(v).text.clone().ok_or_else(|| self.malformed(v)))
                .collect::<CResult<Vec<CompactString>>>()?;
            out.push(Annotation { name, values });
        }
        Ok(out)
    }

    /// Second phase: compile a declared function's body with its
    /// parameters in scope.
    fn lower_function_body(&mut self, function: usize, body: NodeId) -> CResult<ExprId> {
        let Some(def) = self.functions.get(function) else {
            return Err(Error::syntax("unknown function body", self.pos(body)));
        };
        let params: Vec<ExpandedName> = def.signature.params.iter().map(|p| p.name.clone()).collect();
        let mark = self.scope_mark();
        for name in params {
            self.bind(name);
        }
        let result = match self.cst.child(body, 0) {
            Some(inner) => self.lower_expr(inner),
            None => Ok(self.add(Expr::EmptySequence, body)),
        };
        self.restore(mark);
        result
    }
}

fn is_item_type_node(kind: NodeKind) -> bool {
    matches!(
        kind,
        NodeKind::AnyKindTest
            | NodeKind::TextTest
            | NodeKind::CommentTest
            | NodeKind::PiTest
            | NodeKind::ElementTest
            | NodeKind::AttributeTest
            | NodeKind::DocumentTest
            | NodeKind::SchemaElementTest
            | NodeKind::SchemaAttributeTest
            | NodeKind::NamespaceNodeTest
            | NodeKind::AtomicType
            | NodeKind::AnyItemTest
            | NodeKind::AnyFunctionTest
            | NodeKind::FunctionTest
    )
}
