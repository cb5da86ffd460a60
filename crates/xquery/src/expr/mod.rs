//! Compiled expression graph.
//!
//! Every expression node lives in an [`ExprGraph`] arena and is addressed by
//! [`ExprId`]. Children are referenced by id, so subtrees can be inspected or
//! rewritten in place (path fix-ups, FLWOR folding) without reallocation.

mod types;

pub use types::{
    Axis, ItemType, NameOrWildcard, NodeTest, Occurrence, SequenceType, SingleType, TypeCode, is_abstract_cast_target,
    is_known_atomic_type,
};

use crate::consts::XQUERY_NS;
use crate::lexer::Position;
use crate::qname::ExpandedName;
use compact_str::CompactString;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExprNode {
    pub expr: Expr,
    pub position: Position,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExprGraph {
    nodes: Vec<ExprNode>,
}

impl ExprGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, expr: Expr, position: Position) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(ExprNode { expr, position });
        id
    }

    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()].expr
    }

    pub fn get_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.nodes[id.index()].expr
    }

    pub fn position(&self, id: ExprId) -> Position {
        self.nodes[id.index()].position
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ExprId, &Expr)> {
        self.nodes.iter().enumerate().map(|(i, n)| (ExprId(i as u32), &n.expr))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiteralKind {
    Integer,
    Decimal,
    Double,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonKind {
    General,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeComparisonOp {
    Is,
    Precedes,
    Follows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QuantifierKind {
    Some,
    Every,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationStep {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<ExprId>,
    /// Produced by the `//` abbreviation rather than written out.
    pub abbreviated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BindingKind {
    For,
    Let,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSpec {
    pub key: ExprId,
    pub descending: bool,
    /// `empty greatest`; `None` uses the prolog default.
    pub empty_greatest: Option<bool>,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub stable: bool,
    pub specs: Vec<OrderSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupingKey {
    pub variable: ExpandedName,
    pub key: ExprId,
    pub collation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupBy {
    pub keys: Vec<GroupingKey>,
    /// `where` written directly after `group by`; filters whole groups.
    pub where_clause: Option<ExprId>,
    /// Evaluated once per group: the clauses written after `group by`
    /// folded around the FLWOR's return expression.
    pub return_expr: ExprId,
}

/// One `for`, `let` or `count` binding of a folded FLWOR expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingExpr {
    pub kind: BindingKind,
    pub variable: ExpandedName,
    pub sequence_type: Option<SequenceType>,
    pub positional: Option<ExpandedName>,
    pub allowing_empty: bool,
    /// Bound sequence; absent for `count`.
    pub input: Option<ExprId>,
    /// Filter over the tuples this binding produces, from the `where`
    /// clauses written right after it.
    pub where_clause: Option<ExprId>,
    /// Next binding or the return expression.
    pub body: ExprId,
    /// Only set on the outermost binding.
    pub order_by: Option<OrderBy>,
    /// Only set on the outermost binding.
    pub group_by: Option<GroupBy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantifiedExpr {
    pub kind: QuantifierKind,
    pub variable: ExpandedName,
    pub sequence_type: Option<SequenceType>,
    pub input: ExprId,
    /// Next quantifier binding or the `satisfies` test.
    pub satisfies: ExprId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorSelector {
    Any,
    Name(ExpandedName),
    Namespace(String),
    Local(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatchClause {
    pub errors: Vec<ErrorSelector>,
    pub code_var: Option<ExpandedName>,
    pub description_var: Option<ExpandedName>,
    pub value_var: Option<ExpandedName>,
    pub body: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchCase {
    pub operands: Vec<ExprId>,
    pub result: ExprId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeswitchCase {
    pub variable: Option<ExpandedName>,
    pub types: Vec<SequenceType>,
    pub result: ExprId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Argument {
    Expr(ExprId),
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: ExpandedName,
    pub sequence_type: Option<SequenceType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub name: ExpandedName,
    pub values: Vec<CompactString>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineFunction {
    pub annotations: Vec<Annotation>,
    pub params: Vec<Param>,
    pub return_type: Option<SequenceType>,
    pub body: Option<ExprId>,
}

/// Name of a constructed node: fixed at compile time or computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstructorName {
    Static(ExpandedName),
    Computed(ExprId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamespaceBinding {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementConstructor {
    pub name: ConstructorName,
    /// Namespace declaration attributes of a direct constructor.
    pub namespaces: Vec<NamespaceBinding>,
    pub attributes: Vec<ExprId>,
    pub content: Vec<ExprId>,
    pub direct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeConstructor {
    pub name: ConstructorName,
    /// Literal text and enclosed-expression parts, in order.
    pub value: Vec<ExprId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InsertPosition {
    Before,
    After,
    /// `into`, or no position keyword.
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum UpdateOp {
    Replace { target: ExprId, with: ExprId },
    Value { target: ExprId, with: ExprId },
    Insert { source: ExprId, target: ExprId, position: InsertPosition },
    Delete { target: ExprId },
    Rename { target: ExprId, name: ExprId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationMode {
    Lax,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Validation {
    Mode(ValidationMode),
    Type(ExpandedName),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pragma {
    pub name: ExpandedName,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Literal with its exact source spelling (string literals unescaped).
    Literal { kind: LiteralKind, text: CompactString },
    EmptySequence,
    Sequence(Vec<ExprId>),
    VariableRef(ExpandedName),
    ContextItem,
    /// `/` on its own: the root of the context node's tree.
    Root,
    /// Steps evaluated left to right; `rooted` paths start at the root.
    Path { rooted: bool, steps: Vec<ExprId> },
    Step(LocationStep),
    Filter { base: ExprId, predicates: Vec<ExprId> },
    Arithmetic { op: ArithmeticOp, left: ExprId, right: ExprId },
    Logical { op: LogicalOp, left: ExprId, right: ExprId },
    Comparison { kind: ComparisonKind, op: ComparisonOp, left: ExprId, right: ExprId },
    NodeComparison { op: NodeComparisonOp, left: ExprId, right: ExprId },
    Range { from: ExprId, to: ExprId },
    Concat { left: ExprId, right: ExprId },
    SetOperation { op: SetOp, left: ExprId, right: ExprId },
    Unary { negate: bool, operand: ExprId },
    SimpleMap { left: ExprId, right: ExprId },
    Conditional { condition: ExprId, then_branch: ExprId, else_branch: ExprId },
    Binding(Box<BindingExpr>),
    Quantified(Box<QuantifiedExpr>),
    TryCatch { body: Option<ExprId>, catches: Vec<CatchClause> },
    Switch { operand: ExprId, cases: Vec<SwitchCase>, default: ExprId },
    Typeswitch { operand: ExprId, cases: Vec<TypeswitchCase>, default_var: Option<ExpandedName>, default: ExprId },
    InstanceOf { operand: ExprId, ty: SequenceType },
    Treat { operand: ExprId, ty: SequenceType },
    Cast { operand: ExprId, ty: SingleType },
    Castable { operand: ExprId, ty: SingleType },
    FunctionCall { name: ExpandedName, arguments: Vec<Argument> },
    /// A function call with `?` placeholders, yielding a function item.
    PartialApplication { call: ExprId },
    DynamicCall { callee: ExprId, arguments: Vec<Argument> },
    NamedFunctionRef { name: ExpandedName, arity: usize },
    InlineFunction(Box<InlineFunction>),
    ElementConstructor(Box<ElementConstructor>),
    AttributeConstructor(Box<AttributeConstructor>),
    TextConstructor { content: Option<ExprId> },
    CommentConstructor { content: Option<ExprId> },
    PiConstructor { target: ConstructorName, content: Option<ExprId> },
    DocumentConstructor { content: Option<ExprId> },
    NamespaceConstructor { prefix: ConstructorName, uri: Option<ExprId> },
    /// Literal character data inside a constructor.
    DirectText(CompactString),
    Update(UpdateOp),
    Ordered { ordered: bool, expr: ExprId },
    Validate { validation: Option<Validation>, expr: ExprId },
    Extension { pragmas: Vec<Pragma>, body: Option<ExprId> },
}

/// Signature of a declared function, as registered in the static context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSignature {
    pub name: ExpandedName,
    pub annotations: Vec<Annotation>,
    pub params: Vec<Param>,
    pub return_type: Option<SequenceType>,
    pub external: bool,
}

impl FunctionSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Not annotated `%private`.
    pub fn is_public(&self) -> bool {
        is_public(&self.annotations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalVariable {
    pub name: ExpandedName,
    pub annotations: Vec<Annotation>,
    pub sequence_type: Option<SequenceType>,
    pub external: bool,
}

impl GlobalVariable {
    pub fn is_public(&self) -> bool {
        is_public(&self.annotations)
    }
}

fn is_public(annotations: &[Annotation]) -> bool {
    !annotations.iter().any(|a| a.name.ns_uri.as_deref() == Some(XQUERY_NS) && a.name.local == "private")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub signature: FunctionSignature,
    /// Absent for external functions.
    pub body: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableDef {
    pub variable: GlobalVariable,
    /// Initializer, or the default value of an external variable.
    pub value: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextItemDef {
    pub item_type: Option<ItemType>,
    pub value: Option<ExprId>,
    pub external: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ModuleKind {
    Main,
    Library { prefix: String, namespace: String },
}

/// Output of the tree compiler for one module.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledModule {
    pub graph: ExprGraph,
    pub kind: ModuleKind,
    /// Query body; `None` for library modules.
    pub body: Option<ExprId>,
    pub functions: Vec<FunctionDef>,
    pub variables: Vec<VariableDef>,
    pub context_item: Option<ContextItemDef>,
    pub options: Vec<(ExpandedName, String)>,
    pub version: Option<String>,
    pub encoding: Option<String>,
}

impl CompiledModule {
    pub fn is_library(&self) -> bool {
        matches!(self.kind, ModuleKind::Library { .. })
    }

    pub fn namespace(&self) -> Option<&str> {
        match &self.kind {
            ModuleKind::Library { namespace, .. } => Some(namespace),
            ModuleKind::Main => None,
        }
    }

    pub fn body_expr(&self) -> Option<&Expr> {
        self.body.map(|id| self.graph.get(id))
    }

    pub fn function(&self, name: &ExpandedName, arity: usize) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| &f.signature.name == name && f.signature.arity() == arity)
    }
}
