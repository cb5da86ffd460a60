//! Concrete syntax tree produced by the recognizer.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. Each node
//! carries a closed [`NodeKind`] tag, optional text payload (names, literal
//! values, operators that need their spelling) and the position of the first
//! token it was built from.

use crate::lexer::Position;
use compact_str::CompactString;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

macro_rules! node_kinds {
    ($($kind:ident => $tag:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum NodeKind {
            $($kind,)*
        }

        impl NodeKind {
            /// Short tag used in s-expression dumps.
            pub fn tag(self) -> &'static str {
                match self {
                    $(NodeKind::$kind => $tag,)*
                }
            }
        }
    };
}

node_kinds! {
    // modules and prolog
    MainModule => "main-module",
    LibraryModule => "library-module",
    VersionDecl => "version-decl",
    Version => "version",
    Encoding => "encoding",
    ModuleDecl => "module-decl",
    Prolog => "prolog",
    QueryBody => "query-body",
    NamespaceDecl => "namespace-decl",
    DefaultElementNamespace => "default-element-namespace",
    DefaultFunctionNamespace => "default-function-namespace",
    DefaultCollation => "default-collation",
    BaseUriDecl => "base-uri-decl",
    BoundarySpaceDecl => "boundary-space-decl",
    ConstructionDecl => "construction-decl",
    OrderingModeDecl => "ordering-mode-decl",
    EmptyOrderDecl => "empty-order-decl",
    CopyNamespacesDecl => "copy-namespaces-decl",
    SchemaImport => "schema-import",
    ModuleImport => "module-import",
    AtHint => "at",
    OptionDecl => "option-decl",
    ContextItemDecl => "context-item-decl",
    VarDecl => "var-decl",
    FunctionDecl => "function-decl",
    Annotation => "annotation",
    ParamList => "params",
    Param => "param",
    ReturnType => "return-type",
    FunctionBody => "body",
    External => "external",
    // expressions
    Sequence => "sequence",
    EmptySequence => "empty",
    Flwor => "FLWOR",
    ForClause => "for",
    LetClause => "let",
    VariableBinding => "binding",
    AllowingEmpty => "allowing-empty",
    PositionalVar => "at",
    WhereClause => "where",
    GroupByClause => "group-by",
    GroupingSpec => "grouping",
    OrderByClause => "order-by",
    OrderSpec => "order-spec",
    Ascending => "ascending",
    Descending => "descending",
    EmptyGreatest => "empty-greatest",
    EmptyLeast => "empty-least",
    Collation => "collation",
    CountClause => "count",
    ReturnClause => "return",
    SomeExpr => "some",
    EveryExpr => "every",
    Satisfies => "satisfies",
    If => "if",
    Switch => "switch",
    SwitchCase => "case",
    Typeswitch => "typeswitch",
    TypeswitchCase => "case",
    Default => "default",
    Try => "try",
    Catch => "catch",
    CatchErrorList => "errors",
    VarName => "var",
    UpdateReplace => "update-replace",
    UpdateValue => "update-value",
    UpdateInsert => "update-insert",
    UpdateDelete => "update-delete",
    UpdateRename => "update-rename",
    Or => "or",
    And => "and",
    GeneralEq => "=",
    GeneralNe => "!=",
    GeneralLt => "<",
    GeneralLe => "<=",
    GeneralGt => ">",
    GeneralGe => ">=",
    ValueEq => "eq",
    ValueNe => "ne",
    ValueLt => "lt",
    ValueLe => "le",
    ValueGt => "gt",
    ValueGe => "ge",
    Is => "is",
    Precedes => "<<",
    Follows => ">>",
    Concat => "||",
    Range => "to",
    Plus => "+",
    Minus => "-",
    Multiply => "*",
    Div => "div",
    IDiv => "idiv",
    Mod => "mod",
    Union => "union",
    Intersect => "intersect",
    Except => "except",
    InstanceOf => "instance-of",
    TreatAs => "treat-as",
    CastableAs => "castable-as",
    CastAs => "cast-as",
    ArrowCall => "=>",
    FunctionName => "function-name",
    UnaryMinus => "neg",
    UnaryPlus => "pos",
    Validate => "validate",
    Extension => "extension",
    Pragma => "pragma",
    SimpleMap => "!",
    // paths
    AbsoluteSlash => "absolute-slash",
    AbsoluteDoubleSlash => "absolute-double-slash",
    Slash => "/",
    DoubleSlash => "//",
    AxisStep => "step",
    ParentStep => "parent-step",
    Predicate => "predicate",
    Filter => "filter",
    DynamicCall => "dynamic-call",
    NameTest => "name-test",
    PrefixWildcard => "prefix-wildcard",
    LocalWildcard => "local-wildcard",
    Wildcard => "wildcard",
    AnyKindTest => "node()",
    TextTest => "text()",
    CommentTest => "comment()",
    PiTest => "processing-instruction()",
    ElementTest => "element()",
    AttributeTest => "attribute()",
    DocumentTest => "document-node()",
    SchemaElementTest => "schema-element()",
    SchemaAttributeTest => "schema-attribute()",
    NamespaceNodeTest => "namespace-node()",
    TypeName => "type-name",
    Nillable => "nillable",
    // primaries
    IntegerLiteral => "integer",
    DecimalLiteral => "decimal",
    DoubleLiteral => "double",
    StringLiteral => "string",
    VarRef => "$",
    ContextItem => ".",
    FunctionCall => "call",
    ArgumentPlaceholder => "?",
    NamedFunctionRef => "function-ref",
    InlineFunction => "inline-function",
    Ordered => "ordered",
    Unordered => "unordered",
    EnclosedExpr => "enclosed",
    // constructors
    DirElement => "element",
    DirAttribute => "attribute",
    AttributeText => "attribute-text",
    Text => "text",
    BoundaryWhitespace => "boundary-whitespace",
    CData => "cdata",
    DirComment => "comment",
    DirPi => "processing-instruction",
    CompElement => "comp-element",
    CompAttribute => "comp-attribute",
    CompText => "comp-text",
    CompComment => "comp-comment",
    CompPi => "comp-processing-instruction",
    CompDocument => "comp-document",
    CompNamespace => "comp-namespace",
    ConstructorName => "name",
    NameExpr => "name-expr",
    // types
    SequenceType => "sequence-type",
    EmptySequenceType => "empty-sequence()",
    Occurrence => "occurrence",
    AtomicType => "atomic-type",
    AnyItemTest => "item()",
    AnyFunctionTest => "function(*)",
    FunctionTest => "function-test",
    SingleType => "single-type",
}

#[derive(Debug, Clone, Serialize)]
pub struct CstNode {
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<CompactString>,
    pub children: SmallVec<[NodeId; 4]>,
    #[serde(skip)]
    pub parent: Option<NodeId>,
    pub position: Position,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Cst {
    nodes: Vec<CstNode>,
    root: Option<NodeId>,
}

impl Cst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, text: Option<CompactString>, position: Position) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CstNode { kind, text, children: SmallVec::new(), parent: None, position });
        id
    }

    /// Attach `child` as the last child of `parent`. A node has at most one parent.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self.nodes[child.index()].parent.is_none(), "node already attached");
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    pub fn node(&self, id: NodeId) -> &CstNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.nodes[id.index()].kind
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.nodes[id.index()].text.as_deref()
    }

    pub fn position(&self, id: NodeId) -> Position {
        self.nodes[id.index()].position
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    /// First child with the given kind.
    pub fn find_child(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.children(id).iter().copied().find(|&c| self.kind(c) == kind)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node allocated at or after `len`, unlinking any of them
    /// that had been attached to an older node.
    pub(crate) fn truncate(&mut self, len: usize) {
        for i in len..self.nodes.len() {
            if let Some(parent) = self.nodes[i].parent
                && parent.index() < len
            {
                self.nodes[parent.index()].children.retain(|c| c.index() < len);
            }
        }
        self.nodes.truncate(len);
    }

    /// Lisp-style dump, e.g. `(or a (and b c))`. Leaf steps print as their
    /// name, other leaves print as `tag` or `tag:text`.
    pub fn to_sexpr(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_sexpr(id, &mut out);
        out
    }

    fn write_sexpr(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        if let Some(name) = self.bare_name(id) {
            out.push_str(name);
            return;
        }
        let label = match &node.text {
            Some(text) => format!("{}:{}", node.kind.tag(), text),
            None => node.kind.tag().to_string(),
        };
        if node.children.is_empty() {
            out.push_str(&label);
            return;
        }
        let _ = write!(out, "({}", label);
        for &child in &node.children {
            out.push(' ');
            self.write_sexpr(child, out);
        }
        out.push(')');
    }

    /// A child-axis step with a plain name test and no predicates.
    fn bare_name(&self, id: NodeId) -> Option<&str> {
        let node = self.node(id);
        if node.kind != NodeKind::AxisStep || node.text.is_some() || node.children.len() != 1 {
            return None;
        }
        let test = node.children[0];
        match self.kind(test) {
            NodeKind::NameTest => self.text(test),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_unlinks_speculative_children() {
        let mut cst = Cst::new();
        let pos = Position::default();
        let root = cst.alloc(NodeKind::Sequence, None, pos);
        let keep = cst.alloc(NodeKind::ContextItem, None, pos);
        cst.append(root, keep);
        let mark = cst.len();
        let extra = cst.alloc(NodeKind::ContextItem, None, pos);
        cst.append(root, extra);
        cst.truncate(mark);
        assert_eq!(cst.len(), 2);
        assert_eq!(cst.children(root), &[keep]);
    }

    #[test]
    fn sexpr_renders_text_payloads() {
        let mut cst = Cst::new();
        let pos = Position::default();
        let plus = cst.alloc(NodeKind::Plus, None, pos);
        let one = cst.alloc(NodeKind::IntegerLiteral, Some("1".into()), pos);
        let var = cst.alloc(NodeKind::VarRef, Some("x".into()), pos);
        cst.append(plus, one);
        cst.append(plus, var);
        assert_eq!(cst.to_sexpr(plus), "(+ integer:1 $:x)");
    }
}
