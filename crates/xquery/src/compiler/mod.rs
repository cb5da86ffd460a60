//! Tree compiler: walks a [`Cst`] once, resolves names against the
//! [`StaticContext`] and emits an [`ExprGraph`].
//!
//! Compilation runs in two phases. The prolog is processed in document
//! order first (settings, namespaces, imports, variables, function
//! signatures), then function bodies and the query body are compiled, so a
//! function may call any function declared in the same module.

mod constructors;
mod control;
mod flwor;
mod functions;
mod path;
mod prolog;
mod types;

use crate::context::StaticContext;
use crate::cst::{Cst, NodeId, NodeKind};
use crate::error::{Error, ErrorCode};
use crate::expr::{
    ArithmeticOp, CompiledModule, ComparisonKind, ComparisonOp, ContextItemDef, Expr, ExprGraph, ExprId, FunctionDef,
    LiteralKind, LogicalOp, ModuleKind, NodeComparisonOp, Pragma, SetOp, Validation, ValidationMode, VariableDef,
};
use crate::lexer::chars::is_xml_whitespace;
use crate::lexer::Position;
use crate::parser::{ParseOptions, parse_module_with_options};
use crate::qname::ExpandedName;
use tracing::debug;

pub(crate) type CResult<T> = Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Maximum expression nesting the compiler walks before giving up.
    pub max_depth: usize,
    /// Report calls to unknown functions in every namespace, not only in
    /// `local:` and the namespaces of declared or imported modules.
    pub strict_functions: bool,
    pub parse: ParseOptions,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { max_depth: 256, strict_functions: false, parse: ParseOptions::default() }
    }
}

impl CompileOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self.parse.max_depth = max_depth;
        self
    }

    pub fn with_strict_functions(mut self, strict: bool) -> Self {
        self.strict_functions = strict;
        self
    }

    pub fn with_parse_options(mut self, parse: ParseOptions) -> Self {
        self.parse = parse;
        self
    }
}

/// Compile a module with a default static context and options.
pub fn compile(source: &str) -> CResult<CompiledModule> {
    let mut ctx = StaticContext::default();
    compile_module(source, &mut ctx)
}

pub fn compile_module(source: &str, ctx: &mut StaticContext) -> CResult<CompiledModule> {
    compile_module_with_options(source, ctx, &CompileOptions::default())
}

/// Recognize and compile `source`. The first syntax error aborts before
/// the compiler runs; otherwise the first static error is returned.
pub fn compile_module_with_options(
    source: &str,
    ctx: &mut StaticContext,
    options: &CompileOptions,
) -> CResult<CompiledModule> {
    let cst = parse_module_with_options(source, options.parse.clone()).into_result()?;
    compile_cst(&cst, ctx, options)
}

/// Compile an already recognized module tree.
pub fn compile_cst(cst: &Cst, ctx: &mut StaticContext, options: &CompileOptions) -> CResult<CompiledModule> {
    let Some(root) = cst.root() else {
        return Err(Error::syntax("empty module", Position::default()));
    };
    let module = Compiler::new(cst, ctx, options).lower_module(root)?;
    debug!(
        exprs = module.graph.len(),
        functions = module.functions.len(),
        variables = module.variables.len(),
        library = module.is_library(),
        "module compiled"
    );
    Ok(module)
}

/// One-shot prolog settings already seen.
#[derive(Debug, Default)]
struct PrologFlags {
    boundary_space: bool,
    default_collation: bool,
    base_uri: bool,
    construction: bool,
    ordering: bool,
    empty_order: bool,
    copy_namespaces: bool,
    default_element_namespace: bool,
    default_function_namespace: bool,
    context_item: bool,
    /// A variable, function, context item or option declaration was seen.
    body_declarations: bool,
}

pub(crate) struct Compiler<'a> {
    cst: &'a Cst,
    ctx: &'a mut StaticContext,
    options: &'a CompileOptions,
    graph: ExprGraph,
    /// In-scope local variables, innermost last.
    locals: Vec<ExpandedName>,
    depth: usize,
    flags: PrologFlags,
    kind: ModuleKind,
    version: Option<String>,
    encoding: Option<String>,
    functions: Vec<FunctionDef>,
    variables: Vec<VariableDef>,
    context_item: Option<ContextItemDef>,
}

impl<'a> Compiler<'a> {
    fn new(cst: &'a Cst, ctx: &'a mut StaticContext, options: &'a CompileOptions) -> Self {
        Self {
            cst,
            ctx,
            options,
            graph: ExprGraph::new(),
            locals: Vec::new(),
            depth: 0,
            flags: PrologFlags::default(),
            kind: ModuleKind::Main,
            version: None,
            encoding: None,
            functions: Vec::new(),
            variables: Vec::new(),
            context_item: None,
        }
    }

    fn finish(self, body: Option<ExprId>) -> CompiledModule {
        CompiledModule {
            graph: self.graph,
            kind: self.kind,
            body,
            functions: self.functions,
            variables: self.variables,
            context_item: self.context_item,
            options: self.ctx.options().to_vec(),
            version: self.version,
            encoding: self.encoding,
        }
    }

    // tree access

    fn pos(&self, id: NodeId) -> Position {
        self.cst.position(id)
    }

    fn kind(&self, id: NodeId) -> NodeKind {
        self.cst.kind(id)
    }

    fn children(&self, id: NodeId) -> &'a [NodeId] {
        self.cst.children(id)
    }

    fn child(&self, id: NodeId, index: usize) -> CResult<NodeId> {
        self.cst.child(id, index).ok_or_else(|| self.malformed(id))
    }

    fn text(&self, id: NodeId) -> CResult<&'a str> {
        self.cst.text(id).ok_or_else(|| self.malformed(id))
    }

    fn malformed(&self, id: NodeId) -> Error {
        Error::syntax(format!("unexpected {} node", self.kind(id).tag()), self.pos(id))
    }

    fn err(&self, code: ErrorCode, message: impl Into<String>, id: NodeId) -> Error {
        Error::from_code(code, message).at(self.pos(id))
    }

    /// Attach the node position to a context error.
    fn located<T>(&self, result: CResult<T>, id: NodeId) -> CResult<T> {
        result.map_err(|e| e.or_at(self.pos(id)))
    }

    fn add(&mut self, expr: Expr, id: NodeId) -> ExprId {
        let position = self.pos(id);
        self.graph.add(expr, position)
    }

    // local variable scopes

    fn scope_mark(&self) -> usize {
        self.locals.len()
    }

    fn bind(&mut self, name: ExpandedName) {
        self.locals.push(name);
    }

    fn restore(&mut self, mark: usize) {
        self.locals.truncate(mark);
    }

    fn variable_name(&self, lexical: &str, id: NodeId) -> CResult<ExpandedName> {
        self.located(self.ctx.resolve_variable_name(lexical), id)
    }

    fn lower_var_ref(&mut self, id: NodeId) -> CResult<ExprId> {
        let name = self.variable_name(self.text(id)?, id)?;
        if !self.locals.contains(&name) && self.ctx.resolve_variable(&name).is_none() {
            return Err(self.err(ErrorCode::XPST0008, format!("variable ${name} is not declared"), id));
        }
        Ok(self.add(Expr::VariableRef(name), id))
    }

    // expressions

    pub(crate) fn lower_expr(&mut self, id: NodeId) -> CResult<ExprId> {
        self.deeper(id, |c| c.lower_node(id))
    }

    /// Depth-guarded recursion into a nested subtree.
    pub(crate) fn deeper<T>(&mut self, id: NodeId, f: impl FnOnce(&mut Self) -> CResult<T>) -> CResult<T> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            self.depth -= 1;
            return Err(Error::syntax("compile depth limit reached: expression nested too deeply", self.pos(id)));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn lower_node(&mut self, id: NodeId) -> CResult<ExprId> {
        use NodeKind as K;
        match self.kind(id) {
            K::Sequence => {
                let items = self.lower_all(self.children(id))?;
                Ok(self.add(Expr::Sequence(items), id))
            }
            K::EmptySequence => Ok(self.add(Expr::EmptySequence, id)),
            K::QueryBody | K::Predicate => self.lower_expr(self.child(id, 0)?),
            K::IntegerLiteral => self.literal(id, LiteralKind::Integer),
            K::DecimalLiteral => self.literal(id, LiteralKind::Decimal),
            K::DoubleLiteral => self.literal(id, LiteralKind::Double),
            K::StringLiteral => self.literal(id, LiteralKind::String),
            K::VarRef => self.lower_var_ref(id),
            K::ContextItem => Ok(self.add(Expr::ContextItem, id)),

            K::Flwor => self.lower_flwor(id),
            K::SomeExpr | K::EveryExpr => self.lower_quantified(id),
            K::If => {
                let condition = self.lower_expr(self.child(id, 0)?)?;
                let then_branch = self.lower_expr(self.child(id, 1)?)?;
                let else_branch = self.lower_expr(self.child(id, 2)?)?;
                Ok(self.add(Expr::Conditional { condition, then_branch, else_branch }, id))
            }
            K::Switch => self.lower_switch(id),
            K::Typeswitch => self.lower_typeswitch(id),
            K::Try => self.lower_try(id),
            K::UpdateReplace | K::UpdateValue | K::UpdateInsert | K::UpdateDelete | K::UpdateRename => {
                self.lower_update(id)
            }

            K::Or
            | K::And
            | K::GeneralEq
            | K::GeneralNe
            | K::GeneralLt
            | K::GeneralLe
            | K::GeneralGt
            | K::GeneralGe
            | K::ValueEq
            | K::ValueNe
            | K::ValueLt
            | K::ValueLe
            | K::ValueGt
            | K::ValueGe
            | K::Is
            | K::Precedes
            | K::Follows
            | K::Concat
            | K::Range
            | K::Plus
            | K::Minus
            | K::Multiply
            | K::Div
            | K::IDiv
            | K::Mod
            | K::Union
            | K::Intersect
            | K::Except
            | K::SimpleMap => self.lower_binary_chain(id),
            K::UnaryMinus | K::UnaryPlus => self.lower_unary_chain(id),

            K::InstanceOf | K::TreatAs | K::CastableAs | K::CastAs => self.lower_type_expr(id),

            K::FunctionCall => self.lower_function_call(id),
            K::ArrowCall => self.lower_arrow(id),
            K::DynamicCall => self.lower_dynamic_call(id),
            K::NamedFunctionRef => self.lower_named_function_ref(id),
            K::InlineFunction => self.lower_inline_function(id),

            K::AbsoluteSlash | K::AbsoluteDoubleSlash | K::Slash | K::DoubleSlash | K::AxisStep | K::ParentStep => {
                self.lower_path(id)
            }
            K::Filter => self.lower_filter(id),

            K::Ordered | K::Unordered => {
                let expr = self.lower_enclosed(self.child(id, 0)?)?;
                let ordered = self.kind(id) == K::Ordered;
                Ok(self.add(Expr::Ordered { ordered, expr }, id))
            }
            K::EnclosedExpr => self.lower_enclosed(id),
            K::Validate => self.lower_validate(id),
            K::Extension => self.lower_extension(id),

            K::DirElement => self.lower_direct_element(id),
            K::DirComment | K::DirPi => self.lower_direct_leaf(id),
            K::CompElement
            | K::CompAttribute
            | K::CompText
            | K::CompComment
            | K::CompPi
            | K::CompDocument
            | K::CompNamespace => self.lower_computed(id),

            K::MainModule
            | K::LibraryModule
            | K::VersionDecl
            | K::Version
            | K::Encoding
            | K::ModuleDecl
            | K::Prolog
            | K::NamespaceDecl
            | K::DefaultElementNamespace
            | K::DefaultFunctionNamespace
            | K::DefaultCollation
            | K::BaseUriDecl
            | K::BoundarySpaceDecl
            | K::ConstructionDecl
            | K::OrderingModeDecl
            | K::EmptyOrderDecl
            | K::CopyNamespacesDecl
            | K::SchemaImport
            | K::ModuleImport
            | K::AtHint
            | K::OptionDecl
            | K::ContextItemDecl
            | K::VarDecl
            | K::FunctionDecl
            | K::Annotation
            | K::ParamList
            | K::Param
            | K::ReturnType
            | K::FunctionBody
            | K::External
            | K::ForClause
            | K::LetClause
            | K::VariableBinding
            | K::AllowingEmpty
            | K::PositionalVar
            | K::WhereClause
            | K::GroupByClause
            | K::GroupingSpec
            | K::OrderByClause
            | K::OrderSpec
            | K::Ascending
            | K::Descending
            | K::EmptyGreatest
            | K::EmptyLeast
            | K::Collation
            | K::CountClause
            | K::ReturnClause
            | K::Satisfies
            | K::SwitchCase
            | K::TypeswitchCase
            | K::Default
            | K::Catch
            | K::CatchErrorList
            | K::VarName
            | K::FunctionName
            | K::Pragma
            | K::NameTest
            | K::PrefixWildcard
            | K::LocalWildcard
            | K::Wildcard
            | K::AnyKindTest
            | K::TextTest
            | K::CommentTest
            | K::PiTest
            | K::ElementTest
            | K::AttributeTest
            | K::DocumentTest
            | K::SchemaElementTest
            | K::SchemaAttributeTest
            | K::NamespaceNodeTest
            | K::TypeName
            | K::Nillable
            | K::ArgumentPlaceholder
            | K::DirAttribute
            | K::AttributeText
            | K::Text
            | K::BoundaryWhitespace
            | K::CData
            | K::ConstructorName
            | K::NameExpr
            | K::SequenceType
            | K::EmptySequenceType
            | K::Occurrence
            | K::AtomicType
            | K::AnyItemTest
            | K::AnyFunctionTest
            | K::FunctionTest
            | K::SingleType => Err(self.malformed(id)),
        }
    }

    fn lower_all(&mut self, ids: &[NodeId]) -> CResult<Vec<ExprId>> {
        ids.iter().map(|&id| self.lower_expr(id)).collect()
    }

    fn literal(&mut self, id: NodeId, kind: LiteralKind) -> CResult<ExprId> {
        let text = self.cst.node(id).text.clone().ok_or_else(|| self.malformed(id))?;
        Ok(self.add(Expr::Literal { kind, text }, id))
    }

    /// Left-nested operator chains (`1 + 2 + 3`) are walked down their left
    /// spine in a loop; only the operands count as nesting.
    fn lower_binary_chain(&mut self, id: NodeId) -> CResult<ExprId> {
        let mut spine = vec![id];
        let mut leftmost = self.child(id, 0)?;
        while binary_constructor(self.kind(leftmost)).is_some() {
            spine.push(leftmost);
            leftmost = self.child(leftmost, 0)?;
        }
        let mut left = self.lower_expr(leftmost)?;
        for &node in spine.iter().rev() {
            let right = self.lower_expr(self.child(node, 1)?)?;
            let make = binary_constructor(self.kind(node)).ok_or_else(|| self.malformed(node))?;
            left = self.add(make(left, right), node);
        }
        Ok(left)
    }

    /// `- - + x`: signs are applied innermost first.
    fn lower_unary_chain(&mut self, id: NodeId) -> CResult<ExprId> {
        let mut signs = vec![id];
        let mut operand = self.child(id, 0)?;
        while matches!(self.kind(operand), NodeKind::UnaryMinus | NodeKind::UnaryPlus) {
            signs.push(operand);
            operand = self.child(operand, 0)?;
        }
        let mut operand = self.lower_expr(operand)?;
        for &sign in signs.iter().rev() {
            let negate = self.kind(sign) == NodeKind::UnaryMinus;
            operand = self.add(Expr::Unary { negate, operand }, sign);
        }
        Ok(operand)
    }

    /// `{ Expr? }`: the inner expression, or the empty sequence.
    fn lower_enclosed(&mut self, id: NodeId) -> CResult<ExprId> {
        match self.lower_enclosed_opt(id)? {
            Some(expr) => Ok(expr),
            None => Ok(self.add(Expr::EmptySequence, id)),
        }
    }

    fn lower_enclosed_opt(&mut self, id: NodeId) -> CResult<Option<ExprId>> {
        if self.kind(id) != NodeKind::EnclosedExpr && self.kind(id) != NodeKind::FunctionBody {
            return Err(self.malformed(id));
        }
        match self.cst.child(id, 0) {
            Some(inner) => Ok(Some(self.lower_expr(inner)?)),
            None => Ok(None),
        }
    }

    fn lower_validate(&mut self, id: NodeId) -> CResult<ExprId> {
        let validation = match self.cst.text(id) {
            None => None,
            Some("lax") => Some(Validation::Mode(ValidationMode::Lax)),
            Some("strict") => Some(Validation::Mode(ValidationMode::Strict)),
            Some(text) => {
                let name = text.strip_prefix("type ").ok_or_else(|| self.malformed(id))?;
                Some(Validation::Type(self.located(self.ctx.resolve_type_name(name), id)?))
            }
        };
        let expr = self.lower_expr(self.child(id, 0)?)?;
        Ok(self.add(Expr::Validate { validation, expr }, id))
    }

    /// `(# name content #)+ { Expr? }`. Pragma names must carry a namespace.
    fn lower_extension(&mut self, id: NodeId) -> CResult<ExprId> {
        let mut pragmas = Vec::new();
        let mut body = None;
        for &child in self.children(id) {
            if self.kind(child) != NodeKind::Pragma {
                body = Some(self.lower_expr(child)?);
                continue;
            }
            let raw = self.text(child)?;
            let name_end = raw.find(is_xml_whitespace).unwrap_or(raw.len());
            let (lexical, content) = raw.split_at(name_end);
            let name = self.located(self.ctx.resolve_element_name(lexical), child)?;
            let qualified = lexical.contains(':') || lexical.starts_with("Q{");
            if !qualified || name.ns_uri.is_none() {
                return Err(self.err(ErrorCode::XPST0081, format!("pragma name {lexical} has no namespace"), child));
            }
            let content = content.trim_matches(is_xml_whitespace).to_string();
            pragmas.push(Pragma { name, content });
        }
        Ok(self.add(Expr::Extension { pragmas, body }, id))
    }
}

type BinaryConstructor = fn(ExprId, ExprId) -> Expr;

/// Constructor for a binary operator node, or `None` if `kind` is not one.
fn binary_constructor(kind: NodeKind) -> Option<BinaryConstructor> {
    use ComparisonKind as CK;
    use ComparisonOp as CO;
    use NodeKind as K;
    let make: BinaryConstructor = match kind {
        K::Or => |left, right| Expr::Logical { op: LogicalOp::Or, left, right },
        K::And => |left, right| Expr::Logical { op: LogicalOp::And, left, right },
        K::GeneralEq => |left, right| Expr::Comparison { kind: CK::General, op: CO::Eq, left, right },
        K::GeneralNe => |left, right| Expr::Comparison { kind: CK::General, op: CO::Ne, left, right },
        K::GeneralLt => |left, right| Expr::Comparison { kind: CK::General, op: CO::Lt, left, right },
        K::GeneralLe => |left, right| Expr::Comparison { kind: CK::General, op: CO::Le, left, right },
        K::GeneralGt => |left, right| Expr::Comparison { kind: CK::General, op: CO::Gt, left, right },
        K::GeneralGe => |left, right| Expr::Comparison { kind: CK::General, op: CO::Ge, left, right },
        K::ValueEq => |left, right| Expr::Comparison { kind: CK::Value, op: CO::Eq, left, right },
        K::ValueNe => |left, right| Expr::Comparison { kind: CK::Value, op: CO::Ne, left, right },
        K::ValueLt => |left, right| Expr::Comparison { kind: CK::Value, op: CO::Lt, left, right },
        K::ValueLe => |left, right| Expr::Comparison { kind: CK::Value, op: CO::Le, left, right },
        K::ValueGt => |left, right| Expr::Comparison { kind: CK::Value, op: CO::Gt, left, right },
        K::ValueGe => |left, right| Expr::Comparison { kind: CK::Value, op: CO::Ge, left, right },
        K::Is => |left, right| Expr::NodeComparison { op: NodeComparisonOp::Is, left, right },
        K::Precedes => |left, right| Expr::NodeComparison { op: NodeComparisonOp::Precedes, left, right },
        K::Follows => |left, right| Expr::NodeComparison { op: NodeComparisonOp::Follows, left, right },
        K::Concat => |left, right| Expr::Concat { left, right },
        K::Range => |left, right| Expr::Range { from: left, to: right },
        K::Plus => |left, right| Expr::Arithmetic { op: ArithmeticOp::Add, left, right },
        K::Minus => |left, right| Expr::Arithmetic { op: ArithmeticOp::Sub, left, right },
        K::Multiply => |left, right| Expr::Arithmetic { op: ArithmeticOp::Mul, left, right },
        K::Div => |left, right| Expr::Arithmetic { op: ArithmeticOp::Div, left, right },
        K::IDiv => |left, right| Expr::Arithmetic { op: ArithmeticOp::IDiv, left, right },
        K::Mod => |left, right| Expr::Arithmetic { op: ArithmeticOp::Mod, left, right },
        K::Union => |left, right| Expr::SetOperation { op: SetOp::Union, left, right },
        K::Intersect => |left, right| Expr::SetOperation { op: SetOp::Intersect, left, right },
        K::Except => |left, right| Expr::SetOperation { op: SetOp::Except, left, right },
        K::SimpleMap => |left, right| Expr::SimpleMap { left, right },
        _ => return None,
    };
    Some(make)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(source: &str) -> (CompiledModule, ExprId) {
        let module = compile(source).expect("compiles");
        let body = module.body.expect("main module");
        (module, body)
    }

    #[test]
    fn literal_keeps_source_spelling() {
        let (module, body) = body("1.50e0");
        assert_eq!(module.graph.get(body), &Expr::Literal { kind: LiteralKind::Double, text: "1.50e0".into() });
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let (module, body) = body("1 or 2 and 3");
        let Expr::Logical { op: LogicalOp::Or, right, .. } = module.graph.get(body) else {
            panic!("expected or at the root");
        };
        assert!(matches!(module.graph.get(*right), Expr::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn nesting_limit_is_reported() {
        let source = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        let mut ctx = StaticContext::default();
        let options = CompileOptions::default().with_max_depth(16);
        let err = compile_module_with_options(&source, &mut ctx, &options).expect_err("too deep");
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn extension_requires_prefixed_pragma() {
        let err = compile("(# plain #) { 1 }").expect_err("unprefixed pragma");
        assert_eq!(err.code_enum(), ErrorCode::XPST0081);
        let (module, body) = body("declare namespace ext = 'urn:ext'; (# ext:opt on #) { 1 }");
        let Expr::Extension { pragmas, body } = module.graph.get(body) else { panic!("extension") };
        assert_eq!(pragmas[0].content, "on");
        assert!(body.is_some());
    }
}
