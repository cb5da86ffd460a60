use super::StaticContext;
use crate::compiler::{CompileOptions, compile_module_with_options};
use crate::error::{Error, ErrorCode};
use crate::expr::{CompiledModule, FunctionSignature, GlobalVariable};
use std::sync::Arc;
use tracing::debug;

/// Public declarations of a loaded library module.
#[derive(Debug, Clone, Default)]
pub struct ModuleExports {
    pub namespace: String,
    pub functions: Vec<FunctionSignature>,
    pub variables: Vec<GlobalVariable>,
}

impl ModuleExports {
    /// Public functions and variables of a compiled library module.
    pub fn from_module(module: &CompiledModule) -> Self {
        Self {
            namespace: module.namespace().unwrap_or_default().to_string(),
            functions: module.functions.iter().map(|f| f.signature.clone()).filter(|s| s.is_public()).collect(),
            variables: module.variables.iter().map(|v| v.variable.clone()).filter(|v| v.is_public()).collect(),
        }
    }
}

/// Loads modules and schemas named by `import` declarations.
pub trait ModuleResolver: Send + Sync {
    /// Load the library module for `namespace`, optionally from a location
    /// hint already resolved against the base URI.
    fn load_module(&self, namespace: &str, location: Option<&str>) -> Result<ModuleExports, Error>;

    fn load_schema(&self, namespace: &str, _location: Option<&str>) -> Result<(), Error> {
        Err(Error::from_code(ErrorCode::XQST0009, format!("schema import of {namespace} is not supported")))
    }
}

#[derive(Debug, Clone)]
struct RegisteredModule {
    namespace: String,
    location: Option<String>,
    source: Arc<str>,
}

/// Resolver over library-module sources held in memory. Modules are
/// compiled with this crate on every load; imports inside them are
/// resolved through the same registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryModuleResolver {
    modules: Arc<Vec<RegisteredModule>>,
    options: CompileOptions,
    depth: usize,
}

const MAX_IMPORT_DEPTH: usize = 32;

impl InMemoryModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Register a module source for `namespace`, optionally reachable only
    /// through the given location.
    pub fn register(mut self, namespace: impl Into<String>, location: Option<&str>, source: impl Into<Arc<str>>) -> Self {
        Arc::make_mut(&mut self.modules).push(RegisteredModule {
            namespace: namespace.into(),
            location: location.map(str::to_string),
            source: source.into(),
        });
        self
    }

    fn find(&self, namespace: &str, location: Option<&str>) -> Option<&RegisteredModule> {
        match location {
            Some(location) => self.modules.iter().find(|m| m.location.as_deref() == Some(location)),
            None => self.modules.iter().find(|m| m.namespace == namespace),
        }
    }
}

impl ModuleResolver for InMemoryModuleResolver {
    fn load_module(&self, namespace: &str, location: Option<&str>) -> Result<ModuleExports, Error> {
        if self.depth >= MAX_IMPORT_DEPTH {
            return Err(Error::from_code(ErrorCode::XQST0059, format!("module imports nested too deeply at {namespace}")));
        }
        let Some(module) = self.find(namespace, location) else {
            let what = location.unwrap_or(namespace);
            return Err(Error::from_code(ErrorCode::XQST0059, format!("no module registered for {what}")));
        };
        let nested = Self { modules: Arc::clone(&self.modules), options: self.options.clone(), depth: self.depth + 1 };
        let mut ctx = StaticContext::builder().with_module_resolver(Arc::new(nested)).build();
        if let Some(location) = &module.location {
            ctx.base_uri = Some(location.clone());
        }
        let compiled = compile_module_with_options(&module.source, &mut ctx, &self.options)?;
        match compiled.namespace() {
            Some(ns) if ns == namespace => {}
            Some(ns) => {
                return Err(Error::from_code(
                    ErrorCode::XQST0059,
                    format!("module at {} declares namespace {ns}, expected {namespace}", location.unwrap_or(namespace)),
                ));
            }
            None => {
                return Err(Error::from_code(
                    ErrorCode::XQST0059,
                    format!("{} is a main module, not a library module", location.unwrap_or(namespace)),
                ));
            }
        }
        debug!(namespace, ?location, functions = compiled.functions.len(), "library module loaded");
        Ok(ModuleExports::from_module(&compiled))
    }
}
