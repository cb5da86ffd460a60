//! Static context: namespace bindings, prolog settings and the registries of
//! declared variables, functions, options and imported modules.
//!
//! A context is owned by exactly one compilation. Registries are write-once:
//! declaring the same key twice is a static error. The in-scope namespace
//! stack is the only part that shrinks again, via
//! [`StaticContext::pop_in_scope_namespaces`].

mod modules;

pub use modules::{InMemoryModuleResolver, ModuleExports, ModuleResolver};

use crate::consts::{CODEPOINT_COLLATION, ERR_NS, FNS, LOCAL_NS, XML_URI, XMLNS_URI, XS_NS, XSI_NS};
use crate::error::{Error, ErrorCode};
use crate::expr::{FunctionSignature, GlobalVariable, ItemType};
use crate::qname::{ExpandedName, NameKind, QName};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundarySpace {
    Preserve,
    #[default]
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstructionMode {
    #[default]
    Preserve,
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    #[default]
    Ordered,
    Unordered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyOrder {
    Greatest,
    #[default]
    Least,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyNamespaces {
    pub preserve: bool,
    pub inherit: bool,
}

impl Default for CopyNamespaces {
    fn default() -> Self {
        Self { preserve: true, inherit: true }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    pub by_prefix: HashMap<String, String>,
}

/// Bindings introduced by one direct element constructor. A `None` prefix
/// sets the default element namespace; an empty URI undeclares it.
#[derive(Debug, Clone, Default)]
struct InScopeFrame {
    bindings: Vec<(Option<String>, String)>,
}

#[derive(Clone)]
pub struct StaticContext {
    pub base_uri: Option<String>,
    pub default_element_namespace: Option<String>,
    pub default_function_namespace: Option<String>,
    pub default_collation: String,
    pub boundary_space: BoundarySpace,
    pub construction: ConstructionMode,
    pub ordering: OrderingMode,
    pub empty_order: EmptyOrder,
    pub copy_namespaces: CopyNamespaces,
    pub context_item_type: Option<ItemType>,
    pub namespaces: NamespaceBindings,
    known_collations: HashSet<String>,
    declared_prefixes: HashSet<String>,
    in_scope: Vec<InScopeFrame>,
    variables: HashMap<ExpandedName, GlobalVariable>,
    functions: HashMap<(ExpandedName, usize), FunctionSignature>,
    options: Vec<(ExpandedName, String)>,
    imported_modules: HashSet<String>,
    resolver: Option<Arc<dyn ModuleResolver>>,
}

impl std::fmt::Debug for StaticContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticContext")
            .field("base_uri", &self.base_uri)
            .field("default_element_namespace", &self.default_element_namespace)
            .field("default_function_namespace", &self.default_function_namespace)
            .field("default_collation", &self.default_collation)
            .field("namespaces", &self.namespaces)
            .field("variables", &self.variables.len())
            .field("functions", &self.functions.len())
            .field("imported_modules", &self.imported_modules)
            .finish_non_exhaustive()
    }
}

impl Default for StaticContext {
    fn default() -> Self {
        let mut ns = NamespaceBindings::default();
        for (prefix, uri) in [("xml", XML_URI), ("xs", XS_NS), ("xsi", XSI_NS), ("fn", FNS), ("local", LOCAL_NS), ("err", ERR_NS)]
        {
            ns.by_prefix.insert(prefix.to_string(), uri.to_string());
        }
        Self {
            base_uri: None,
            default_element_namespace: None,
            default_function_namespace: Some(FNS.to_string()),
            default_collation: CODEPOINT_COLLATION.to_string(),
            boundary_space: BoundarySpace::default(),
            construction: ConstructionMode::default(),
            ordering: OrderingMode::default(),
            empty_order: EmptyOrder::default(),
            copy_namespaces: CopyNamespaces::default(),
            context_item_type: None,
            namespaces: ns,
            known_collations: HashSet::from([CODEPOINT_COLLATION.to_string()]),
            declared_prefixes: HashSet::new(),
            in_scope: Vec::new(),
            variables: HashMap::new(),
            functions: HashMap::new(),
            options: Vec::new(),
            imported_modules: HashSet::new(),
            resolver: None,
        }
    }
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> StaticContextBuilder {
        StaticContextBuilder::new()
    }

    /// A fresh context sharing this one's configuration (resolver, base URI,
    /// collations) but none of its declarations.
    pub fn fork(&self) -> StaticContext {
        StaticContext {
            base_uri: self.base_uri.clone(),
            known_collations: self.known_collations.clone(),
            resolver: self.resolver.clone(),
            ..StaticContext::default()
        }
    }

    // namespaces

    /// Prolog `declare namespace` (and the prefix of imports and module
    /// declarations).
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), Error> {
        if prefix == "xml" || prefix == "xmlns" {
            return Err(Error::from_code(ErrorCode::XQST0070, format!("the prefix {prefix} cannot be redeclared")));
        }
        if uri == XML_URI || uri == XMLNS_URI {
            return Err(Error::from_code(ErrorCode::XQST0070, format!("the namespace {uri} cannot be bound to {prefix}")));
        }
        if uri.is_empty() {
            return Err(Error::from_code(ErrorCode::XQST0085, format!("empty namespace URI for prefix {prefix}")));
        }
        if !self.declared_prefixes.insert(prefix.to_string()) {
            return Err(Error::from_code(ErrorCode::XQST0033, format!("namespace prefix {prefix} is declared more than once")));
        }
        trace!(prefix, uri, "namespace declared");
        self.namespaces.by_prefix.insert(prefix.to_string(), uri.to_string());
        Ok(())
    }

    pub fn push_in_scope_namespaces(&mut self) {
        self.in_scope.push(InScopeFrame::default());
    }

    pub fn pop_in_scope_namespaces(&mut self) {
        self.in_scope.pop();
    }

    /// Bind a prefix (or with `None`, the default element namespace) in the
    /// innermost constructor scope.
    pub fn declare_in_scope_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        if self.in_scope.is_empty() {
            self.push_in_scope_namespaces();
        }
        if let Some(frame) = self.in_scope.last_mut() {
            frame.bindings.push((prefix.map(str::to_string), uri.to_string()));
        }
    }

    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        for frame in self.in_scope.iter().rev() {
            for (p, uri) in frame.bindings.iter().rev() {
                if p.as_deref() == Some(prefix) {
                    return if uri.is_empty() { None } else { Some(uri) };
                }
            }
        }
        self.namespaces.by_prefix.get(prefix).map(String::as_str)
    }

    /// Default element namespace, honouring `xmlns="..."` in open constructors.
    pub fn element_namespace(&self) -> Option<&str> {
        for frame in self.in_scope.iter().rev() {
            for (p, uri) in frame.bindings.iter().rev() {
                if p.is_none() {
                    return if uri.is_empty() { None } else { Some(uri) };
                }
            }
        }
        self.default_element_namespace.as_deref()
    }

    fn resolve_qname(&self, lexical: &str, default_ns: Option<&str>) -> Result<ExpandedName, Error> {
        let qname = QName::parse(lexical)
            .ok_or_else(|| Error::from_code(ErrorCode::XPST0003, format!("invalid name {lexical}")))?;
        if qname.is_braced() {
            let uri = qname.ns_uri.filter(|u| !u.is_empty());
            return Ok(ExpandedName::new(uri, qname.local));
        }
        match &qname.prefix {
            Some(prefix) => match self.resolve_prefix(prefix) {
                Some(uri) => Ok(ExpandedName::in_ns(uri, qname.local)),
                None => Err(Error::from_code(ErrorCode::XPST0081, format!("namespace prefix {prefix} is not declared"))),
            },
            None => Ok(ExpandedName::new(default_ns.map(str::to_string), qname.local)),
        }
    }

    pub fn resolve_name(&self, lexical: &str, kind: NameKind) -> Result<ExpandedName, Error> {
        match kind {
            NameKind::Element => self.resolve_element_name(lexical),
            NameKind::Attribute => self.resolve_attribute_name(lexical),
        }
    }

    pub fn resolve_element_name(&self, lexical: &str) -> Result<ExpandedName, Error> {
        self.resolve_qname(lexical, self.element_namespace())
    }

    pub fn resolve_attribute_name(&self, lexical: &str) -> Result<ExpandedName, Error> {
        self.resolve_qname(lexical, None)
    }

    pub fn resolve_function_name(&self, lexical: &str) -> Result<ExpandedName, Error> {
        self.resolve_qname(lexical, self.default_function_namespace.as_deref())
    }

    pub fn resolve_variable_name(&self, lexical: &str) -> Result<ExpandedName, Error> {
        self.resolve_qname(lexical, None)
    }

    pub fn resolve_type_name(&self, lexical: &str) -> Result<ExpandedName, Error> {
        self.resolve_qname(lexical, self.default_element_namespace.as_deref())
    }

    /// Resolve a URI reference against the base URI. Relative references
    /// without a usable base URI are returned unchanged.
    pub fn resolve_uri(&self, reference: &str) -> String {
        if Url::parse(reference).is_ok() {
            return reference.to_string();
        }
        self.base_uri
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .and_then(|base| base.join(reference).ok())
            .map(String::from)
            .unwrap_or_else(|| reference.to_string())
    }

    // collations

    pub fn is_known_collation(&self, uri: &str) -> bool {
        self.known_collations.contains(uri)
    }

    pub fn set_default_collation(&mut self, uri: &str) -> Result<(), Error> {
        let resolved = self.resolve_uri(uri);
        if !self.is_known_collation(&resolved) {
            return Err(Error::from_code(ErrorCode::XQST0038, format!("unknown collation {resolved}")));
        }
        self.default_collation = resolved;
        Ok(())
    }

    // variables

    pub fn declare_variable(&mut self, variable: GlobalVariable) -> Result<(), Error> {
        if self.variables.contains_key(&variable.name) {
            return Err(Error::from_code(
                ErrorCode::XQST0049,
                format!("variable ${} is declared more than once", variable.name),
            ));
        }
        trace!(name = %variable.name, "variable declared");
        self.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    pub fn resolve_variable(&self, name: &ExpandedName) -> Option<&GlobalVariable> {
        self.variables.get(name)
    }

    // functions

    pub fn declare_function(&mut self, signature: FunctionSignature) -> Result<(), Error> {
        let key = (signature.name.clone(), signature.arity());
        if self.functions.contains_key(&key) {
            return Err(Error::from_code(
                ErrorCode::XQST0034,
                format!("function {}#{} is declared more than once", key.0, key.1),
            ));
        }
        trace!(name = %key.0, arity = key.1, "function declared");
        self.functions.insert(key, signature);
        Ok(())
    }

    pub fn resolve_function(&self, name: &ExpandedName, arity: usize) -> Option<&FunctionSignature> {
        self.functions.get(&(name.clone(), arity))
    }

    // options

    pub fn add_option(&mut self, name: ExpandedName, value: impl Into<String>) {
        self.options.push((name, value.into()));
    }

    pub fn options(&self) -> &[(ExpandedName, String)] {
        &self.options
    }

    // modules

    pub fn is_imported_module(&self, namespace: &str) -> bool {
        self.imported_modules.contains(namespace)
    }

    pub fn module_resolver(&self) -> Option<&Arc<dyn ModuleResolver>> {
        self.resolver.as_ref()
    }

    /// `import module`: bind the prefix, then try each location hint in order
    /// until the resolver loads the module. Exported functions and variables
    /// become visible in this context.
    pub fn import_module(&mut self, namespace: &str, prefix: Option<&str>, hints: &[String]) -> Result<(), Error> {
        if namespace.is_empty() {
            return Err(Error::from_code(ErrorCode::XQST0088, "module import with an empty target namespace"));
        }
        if self.imported_modules.contains(namespace) {
            return Err(Error::from_code(ErrorCode::XQST0047, format!("module {namespace} is imported more than once")));
        }
        if let Some(prefix) = prefix {
            self.declare_namespace(prefix, namespace)?;
        }
        let resolver = self.resolver.clone().ok_or_else(|| {
            Error::from_code(ErrorCode::XQST0059, format!("no module resolver available to load {namespace}"))
        })?;
        let exports = if hints.is_empty() {
            resolver.load_module(namespace, None).map_err(|err| import_failure(namespace, prefix, err))?
        } else {
            let mut loaded = None;
            for (i, hint) in hints.iter().enumerate() {
                let location = self.resolve_uri(hint);
                match resolver.load_module(namespace, Some(&location)) {
                    Ok(exports) => {
                        loaded = Some(exports);
                        break;
                    }
                    Err(err) if i + 1 == hints.len() => return Err(import_failure(namespace, prefix, err)),
                    Err(err) => debug!(%location, error = %err, "location hint failed, trying next"),
                }
            }
            match loaded {
                Some(exports) => exports,
                None => return Err(Error::from_code(ErrorCode::XQST0059, format!("cannot load module {namespace}"))),
            }
        };
        for function in exports.functions {
            self.declare_function(function)?;
        }
        for variable in exports.variables {
            self.declare_variable(variable)?;
        }
        self.imported_modules.insert(namespace.to_string());
        debug!(namespace, ?prefix, "module imported");
        Ok(())
    }

    /// `import schema`: binds the prefix and hands loading to the resolver.
    /// Without a resolver, schema import is unsupported.
    pub fn import_schema(&mut self, namespace: &str, prefix: Option<&str>, hints: &[String]) -> Result<(), Error> {
        if let Some(prefix) = prefix {
            self.declare_namespace(prefix, namespace)?;
        }
        let Some(resolver) = self.resolver.clone() else {
            return Err(Error::from_code(ErrorCode::XQST0009, format!("schema import of {namespace} is not supported")));
        };
        let location = hints.first().map(|h| self.resolve_uri(h));
        resolver.load_schema(namespace, location.as_deref())
    }
}

fn import_failure(namespace: &str, prefix: Option<&str>, err: Error) -> Error {
    let message = match prefix {
        Some(prefix) => format!("cannot import module {namespace} (prefix {prefix}): {}", err.message),
        None => format!("cannot import module {namespace}: {}", err.message),
    };
    Error::from_code(ErrorCode::XQST0059, message).with_source(Some(Arc::new(err) as Arc<dyn std::error::Error + Send + Sync>))
}

/// Builder for [`StaticContext`]: explicit namespace registrations and
/// default settings on top of the predeclared bindings.
pub struct StaticContextBuilder {
    ctx: StaticContext,
}

impl Default for StaticContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticContextBuilder {
    pub fn new() -> Self {
        Self { ctx: StaticContext::default() }
    }

    pub fn with_base_uri(mut self, uri: impl Into<String>) -> Self {
        self.ctx.base_uri = Some(uri.into());
        self
    }

    pub fn with_default_element_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_element_namespace = Some(uri.into());
        self
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    /// Make `uri` the default collation, registering it as known.
    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        self.ctx.known_collations.insert(uri.clone());
        self.ctx.default_collation = uri;
        self
    }

    pub fn with_collation(mut self, uri: impl Into<String>) -> Self {
        self.ctx.known_collations.insert(uri.into());
        self
    }

    /// Register a namespace prefix → URI mapping. Attempts to override the
    /// reserved `xml` prefix are ignored.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" || p == "xmlns" {
            return self;
        }
        self.ctx.namespaces.by_prefix.insert(p, uri.into());
        self
    }

    /// An external variable visible to the query.
    pub fn with_variable(mut self, name: ExpandedName) -> Self {
        let variable = GlobalVariable { name: name.clone(), annotations: Vec::new(), sequence_type: None, external: true };
        self.ctx.variables.insert(name, variable);
        self
    }

    /// A function known to the query (e.g. a built-in of the evaluator).
    pub fn with_function(mut self, signature: FunctionSignature) -> Self {
        self.ctx.functions.insert((signature.name.clone(), signature.arity()), signature);
        self
    }

    pub fn with_module_resolver(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.ctx.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> StaticContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn predeclared_prefixes_resolve() {
        let ctx = StaticContext::default();
        assert_eq!(ctx.resolve_prefix("xs"), Some(XS_NS));
        assert_eq!(ctx.resolve_prefix("local"), Some(LOCAL_NS));
        assert_eq!(ctx.resolve_prefix("nope"), None);
    }

    #[rstest]
    #[case::duplicate("p", "urn:b", ErrorCode::XQST0033)]
    #[case::xml_prefix("xml", "urn:b", ErrorCode::XQST0070)]
    #[case::xmlns_uri("q", XMLNS_URI, ErrorCode::XQST0070)]
    #[case::empty_uri("q", "", ErrorCode::XQST0085)]
    fn rejects_bad_namespace_declarations(#[case] prefix: &str, #[case] uri: &str, #[case] code: ErrorCode) {
        let mut ctx = StaticContext::default();
        ctx.declare_namespace("p", "urn:a").expect("first declaration");
        let err = ctx.declare_namespace(prefix, uri).expect_err("must fail");
        assert_eq!(err.code_enum(), code);
    }

    #[test]
    fn in_scope_bindings_shadow_prolog_bindings() {
        let mut ctx = StaticContext::builder().with_namespace("p", "urn:outer").build();
        ctx.push_in_scope_namespaces();
        ctx.declare_in_scope_namespace(Some("p"), "urn:inner");
        ctx.declare_in_scope_namespace(None, "urn:default");
        assert_eq!(ctx.resolve_prefix("p"), Some("urn:inner"));
        assert_eq!(ctx.resolve_element_name("e").expect("name").ns_uri.as_deref(), Some("urn:default"));
        assert_eq!(ctx.resolve_attribute_name("a").expect("name").ns_uri, None);
        ctx.pop_in_scope_namespaces();
        assert_eq!(ctx.resolve_prefix("p"), Some("urn:outer"));
        assert_eq!(ctx.resolve_element_name("e").expect("name").ns_uri, None);
    }

    #[test]
    fn unknown_prefix_is_xpst0081() {
        let ctx = StaticContext::default();
        let err = ctx.resolve_element_name("zz:e").expect_err("unbound");
        assert_eq!(err.code_enum(), ErrorCode::XPST0081);
    }

    #[test]
    fn function_names_use_default_function_namespace() {
        let ctx = StaticContext::default();
        assert_eq!(ctx.resolve_function_name("count").expect("name"), ExpandedName::in_ns(FNS, "count"));
        assert_eq!(ctx.resolve_variable_name("x").expect("name"), ExpandedName::new(None, "x"));
    }

    #[test]
    fn duplicate_variables_and_functions_are_rejected() {
        let mut ctx = StaticContext::default();
        let var = GlobalVariable {
            name: ExpandedName::new(None, "v"),
            annotations: Vec::new(),
            sequence_type: None,
            external: false,
        };
        ctx.declare_variable(var.clone()).expect("first");
        assert_eq!(ctx.declare_variable(var).expect_err("dup").code_enum(), ErrorCode::XQST0049);

        let sig = FunctionSignature {
            name: ExpandedName::in_ns(LOCAL_NS, "f"),
            annotations: Vec::new(),
            params: Vec::new(),
            return_type: None,
            external: false,
        };
        ctx.declare_function(sig.clone()).expect("first");
        assert_eq!(ctx.declare_function(sig).expect_err("dup").code_enum(), ErrorCode::XQST0034);
    }

    #[rstest]
    #[case::relative(Some("file:///queries/main.xq"), "lib/m.xq", "file:///queries/lib/m.xq")]
    #[case::absolute(Some("file:///queries/"), "http://example.com/m.xq", "http://example.com/m.xq")]
    #[case::no_base(None, "m.xq", "m.xq")]
    fn resolves_uris_against_base(#[case] base: Option<&str>, #[case] reference: &str, #[case] expected: &str) {
        let mut ctx = StaticContext::default();
        ctx.base_uri = base.map(str::to_string);
        assert_eq!(ctx.resolve_uri(reference), expected);
    }

    #[test]
    fn unknown_default_collation_is_rejected() {
        let mut ctx = StaticContext::default();
        assert_eq!(ctx.set_default_collation("urn:no-such").expect_err("unknown").code_enum(), ErrorCode::XQST0038);
        ctx.set_default_collation(CODEPOINT_COLLATION).expect("codepoint collation");
    }

    #[test]
    fn import_without_resolver_fails() {
        let mut ctx = StaticContext::default();
        let err = ctx.import_module("urn:m", Some("m"), &[]).expect_err("no resolver");
        assert_eq!(err.code_enum(), ErrorCode::XQST0059);
    }

    #[test]
    fn schema_import_is_unsupported() {
        let mut ctx = StaticContext::default();
        let err = ctx.import_schema("urn:s", None, &[]).expect_err("unsupported");
        assert_eq!(err.code_enum(), ErrorCode::XQST0009);
    }
}
