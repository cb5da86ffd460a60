use compact_str::CompactString;
use serde::Serialize;

/// 1-based line and column of a token or node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Byte range into the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start: start as u32, end: end as u32 }
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

macro_rules! token_kinds {
    (
        symbols { $($sym:ident => $sym_text:literal,)* }
        keywords { $($kw:ident => $kw_text:literal,)* }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum TokenKind {
            $($sym,)*
            $($kw,)*
        }

        impl TokenKind {
            /// Keyword kind for an NCName, if it is one.
            pub fn keyword(text: &str) -> Option<TokenKind> {
                match text {
                    $($kw_text => Some(TokenKind::$kw),)*
                    _ => None,
                }
            }

            pub fn is_keyword(self) -> bool {
                matches!(self, $(TokenKind::$kw)|*)
            }

            /// Text used for this kind in diagnostics.
            pub fn describe(self) -> &'static str {
                match self {
                    $(TokenKind::$sym => $sym_text,)*
                    $(TokenKind::$kw => $kw_text,)*
                }
            }
        }
    };
}

token_kinds! {
    symbols {
        Eof => "end of input",
        Invalid => "invalid token",
        IntegerLiteral => "integer literal",
        DecimalLiteral => "decimal literal",
        DoubleLiteral => "double literal",
        StringLiteral => "string literal",
        NCName => "name",
        QName => "qualified name",
        PrefixWildcard => "prefix:*",
        LocalWildcard => "*:name",
        Pragma => "pragma",
        XmlComment => "XML comment",
        XmlPi => "processing instruction",
        CData => "CDATA section",
        ElementText => "element content",
        AttrText => "attribute content",
        Dollar => "$",
        LParen => "(",
        RParen => ")",
        LBracket => "[",
        RBracket => "]",
        LBrace => "{",
        RBrace => "}",
        Comma => ",",
        Semicolon => ";",
        At => "@",
        Percent => "%",
        Hash => "#",
        Question => "?",
        Dot => ".",
        DotDot => "..",
        Colon => ":",
        ColonColon => "::",
        Assign => ":=",
        Eq => "=",
        Ne => "!=",
        Lt => "<",
        Le => "<=",
        Gt => ">",
        Ge => ">=",
        LtLt => "<<",
        GtGt => ">>",
        Arrow => "=>",
        Bang => "!",
        Slash => "/",
        DoubleSlash => "//",
        Pipe => "|",
        Concat => "||",
        Plus => "+",
        Minus => "-",
        Star => "*",
        EmptyTagClose => "/>",
        EndTagOpen => "</",
        Quot => "\"",
        Apos => "'",
    }
    keywords {
        KwAllowing => "allowing",
        KwAncestor => "ancestor",
        KwAncestorOrSelf => "ancestor-or-self",
        KwAnd => "and",
        KwAs => "as",
        KwAscending => "ascending",
        KwAt => "at",
        KwAttribute => "attribute",
        KwBaseUri => "base-uri",
        KwBoundarySpace => "boundary-space",
        KwBy => "by",
        KwCase => "case",
        KwCast => "cast",
        KwCastable => "castable",
        KwCatch => "catch",
        KwChild => "child",
        KwCollation => "collation",
        KwComment => "comment",
        KwConstruction => "construction",
        KwContext => "context",
        KwCopyNamespaces => "copy-namespaces",
        KwCount => "count",
        KwDeclare => "declare",
        KwDefault => "default",
        KwDelete => "delete",
        KwDescendant => "descendant",
        KwDescendantOrSelf => "descendant-or-self",
        KwDescending => "descending",
        KwDiv => "div",
        KwDocument => "document",
        KwDocumentNode => "document-node",
        KwElement => "element",
        KwElse => "else",
        KwEmpty => "empty",
        KwEmptySequence => "empty-sequence",
        KwEncoding => "encoding",
        KwEq => "eq",
        KwEvery => "every",
        KwExcept => "except",
        KwExternal => "external",
        KwFollowing => "following",
        KwFollowingSibling => "following-sibling",
        KwFor => "for",
        KwFunction => "function",
        KwGe => "ge",
        KwGreatest => "greatest",
        KwGroup => "group",
        KwGt => "gt",
        KwIdiv => "idiv",
        KwIf => "if",
        KwImport => "import",
        KwIn => "in",
        KwInherit => "inherit",
        KwInsert => "insert",
        KwInstance => "instance",
        KwIntersect => "intersect",
        KwInto => "into",
        KwIs => "is",
        KwItem => "item",
        KwLax => "lax",
        KwLe => "le",
        KwLeast => "least",
        KwLet => "let",
        KwLt => "lt",
        KwMod => "mod",
        KwModule => "module",
        KwNamespace => "namespace",
        KwNamespaceNode => "namespace-node",
        KwNe => "ne",
        KwNoInherit => "no-inherit",
        KwNoPreserve => "no-preserve",
        KwNode => "node",
        KwOf => "of",
        KwOption => "option",
        KwOr => "or",
        KwOrder => "order",
        KwOrdered => "ordered",
        KwOrdering => "ordering",
        KwParent => "parent",
        KwPreceding => "preceding",
        KwPrecedingSibling => "preceding-sibling",
        KwPreserve => "preserve",
        KwProcessingInstruction => "processing-instruction",
        KwRename => "rename",
        KwReplace => "replace",
        KwReturn => "return",
        KwSatisfies => "satisfies",
        KwSchema => "schema",
        KwSchemaAttribute => "schema-attribute",
        KwSchemaElement => "schema-element",
        KwSelf => "self",
        KwSome => "some",
        KwStable => "stable",
        KwStrict => "strict",
        KwStrip => "strip",
        KwSwitch => "switch",
        KwText => "text",
        KwThen => "then",
        KwTo => "to",
        KwTreat => "treat",
        KwTry => "try",
        KwType => "type",
        KwTypeswitch => "typeswitch",
        KwUnion => "union",
        KwUnordered => "unordered",
        KwUpdate => "update",
        KwValidate => "validate",
        KwValue => "value",
        KwVariable => "variable",
        KwVersion => "version",
        KwWhere => "where",
        KwWith => "with",
        KwXquery => "xquery",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Token payload: the name, the unescaped literal value, the markup content
    /// or, for [`TokenKind::Invalid`], the lexer's message.
    pub text: CompactString,
    pub span: Span,
    pub position: Position,
    pub preceded_by_whitespace: bool,
}

impl Token {
    /// NCName, QName or any keyword used as a name.
    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::NCName | TokenKind::QName) || self.kind.is_keyword()
    }

    /// Unprefixed name, keywords included.
    pub fn is_ncname(&self) -> bool {
        self.kind == TokenKind::NCName || self.kind.is_keyword()
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Short rendering for "found ..." parts of diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Invalid => self.text.to_string(),
            TokenKind::StringLiteral => format!("\"{}\"", self.text),
            _ if self.text.is_empty() => format!("'{}'", self.kind.describe()),
            _ => format!("'{}'", self.text),
        }
    }
}
