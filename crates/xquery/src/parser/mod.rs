//! Recursive-descent recognizer producing a [`Cst`].
//!
//! Ambiguous decision points (FLWOR starts, kind tests versus plain names,
//! computed constructors, direct-constructor attributes, closing tags) are
//! resolved by [`Parser::guess`], which runs a production speculatively and
//! rewinds the token stream, the tree arena and the open-tag stacks
//! afterwards.

mod constructor;
mod expr;
mod path;
mod prolog;
pub mod stream;
mod types;

use crate::cst::{Cst, NodeId, NodeKind};
use crate::error::{Error, ErrorCode};
use crate::lexer::{LexMode, Lexer, Position, Token, TokenKind, TokenSource};
use compact_str::CompactString;
use itertools::Itertools;
use stream::TokenStream;
use tracing::{debug, trace};

pub(crate) type PResult<T> = Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Maximum expression nesting before the recognizer gives up.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_depth: 48 }
    }
}

/// Result of recognizing a whole module: the tree built so far plus every
/// diagnostic collected along the way.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub cst: Cst,
    pub errors: Vec<Error>,
}

impl ParseOutcome {
    pub fn found_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// All diagnostics, one per line.
    pub fn error_message(&self) -> String {
        self.errors.iter().map(|e| e.to_string()).join("\n")
    }

    pub fn cst(&self) -> &Cst {
        &self.cst
    }

    /// The tree, or the first diagnostic.
    pub fn into_result(self) -> Result<Cst, Error> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.cst),
        }
    }
}

pub fn parse_module(source: &str) -> ParseOutcome {
    parse_module_with_options(source, ParseOptions::default())
}

pub fn parse_module_with_options(source: &str, options: ParseOptions) -> ParseOutcome {
    Parser::new(Lexer::new(source), options).parse()
}

/// Parse a single expression (no prolog). Used by tooling and tests.
pub fn parse_expression(source: &str) -> Result<(Cst, NodeId), Error> {
    let mut parser = Parser::new(Lexer::new(source), ParseOptions::default());
    let root = parser.expr()?;
    let tok = parser.peek();
    if !tok.is(TokenKind::Eof) {
        return Err(parser.unexpected(&tok, "end of input"));
    }
    parser.cst.set_root(root);
    Ok((parser.cst, root))
}

pub struct Parser<S> {
    stream: TokenStream<S>,
    cst: Cst,
    options: ParseOptions,
    guessing: u32,
    depth: usize,
    /// Names of direct element constructors currently open.
    open_tags: Vec<CompactString>,
    /// Outer open-tag stacks saved while parsing an enclosed expression.
    tag_scopes: Vec<Vec<CompactString>>,
}

impl<S: TokenSource> Parser<S> {
    pub fn new(source: S, options: ParseOptions) -> Self {
        Self {
            stream: TokenStream::new(source),
            cst: Cst::new(),
            options,
            guessing: 0,
            depth: 0,
            open_tags: Vec::new(),
            tag_scopes: Vec::new(),
        }
    }

    /// Recognize a main or library module, collecting diagnostics.
    pub fn parse(mut self) -> ParseOutcome {
        let mut errors = Vec::new();
        if let Some(root) = self.module(&mut errors) {
            self.cst.set_root(root);
        }
        debug!(nodes = self.cst.len(), errors = errors.len(), "module recognized");
        ParseOutcome { cst: self.cst, errors }
    }

    /// True while at least one speculative production is running.
    pub fn is_guessing(&self) -> bool {
        self.guessing > 0
    }

    /// Run `production` speculatively. Returns whether it succeeded; in both
    /// cases the token position, tree arena and tag stacks are restored.
    pub(crate) fn guess<T>(&mut self, production: impl FnOnce(&mut Self) -> PResult<T>) -> bool {
        let mark = self.stream.mark();
        let nodes = self.cst.len();
        let open_tags = self.open_tags.clone();
        let scopes = self.tag_scopes.len();
        let depth = self.depth;
        self.guessing += 1;
        let ok = production(self).is_ok();
        self.guessing -= 1;
        self.stream.rewind(mark);
        self.cst.truncate(nodes);
        self.open_tags = open_tags;
        self.tag_scopes.truncate(scopes);
        self.depth = depth;
        trace!(ok, level = self.guessing, "speculative lookahead");
        ok
    }

    /// Depth-guarded recursion into a nested production.
    pub(crate) fn nested<T>(&mut self, position: Position, f: impl FnOnce(&mut Self) -> PResult<T>) -> PResult<T> {
        self.depth += 1;
        if self.depth > self.options.max_depth {
            self.depth -= 1;
            return Err(Error::syntax("expression nested too deeply", position));
        }
        let result = f(self);
        self.depth -= 1;
        result
    }

    // token helpers

    pub(crate) fn peek(&mut self) -> Token {
        self.stream.peek(LexMode::Standard)
    }

    pub(crate) fn peek_kind(&mut self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_nth(&mut self, n: usize) -> Token {
        self.stream.peek_nth(n, LexMode::Standard)
    }

    pub(crate) fn peek_in(&mut self, mode: LexMode) -> Token {
        self.stream.peek(mode)
    }

    pub(crate) fn consume(&mut self) -> Token {
        self.stream.consume(LexMode::Standard)
    }

    pub(crate) fn consume_in(&mut self, mode: LexMode) -> Token {
        self.stream.consume(mode)
    }

    pub(crate) fn at(&mut self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    /// Current token is `kind` and the one after it is `next`.
    pub(crate) fn at_pair(&mut self, kind: TokenKind, next: TokenKind) -> bool {
        self.at(kind) && self.peek_nth(1).is(next)
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) { Some(self.consume()) } else { None }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        self.expect_in(kind, LexMode::Standard)
    }

    pub(crate) fn expect_in(&mut self, kind: TokenKind, mode: LexMode) -> PResult<Token> {
        let tok = self.stream.peek(mode);
        if tok.kind != kind {
            return Err(self.unexpected(&tok, &format!("'{}'", kind.describe())));
        }
        Ok(self.stream.consume(mode))
    }

    /// Any name token, keywords included.
    pub(crate) fn eqname(&mut self) -> PResult<Token> {
        let tok = self.peek();
        if !tok.is_name() {
            return Err(self.unexpected(&tok, "a name"));
        }
        Ok(self.consume())
    }

    /// An unprefixed name, keywords included.
    pub(crate) fn ncname(&mut self) -> PResult<Token> {
        let tok = self.peek();
        if !tok.is_ncname() {
            return Err(self.unexpected(&tok, "an unprefixed name"));
        }
        Ok(self.consume())
    }

    /// `$name`, returning the variable name token.
    pub(crate) fn var_name(&mut self) -> PResult<Token> {
        self.expect(TokenKind::Dollar)?;
        self.eqname()
    }

    pub(crate) fn string_literal(&mut self) -> PResult<NodeId> {
        let tok = self.expect(TokenKind::StringLiteral)?;
        Ok(self.leaf(NodeKind::StringLiteral, Some(tok.text), tok.position))
    }

    pub(crate) fn unexpected(&self, tok: &Token, expected: &str) -> Error {
        if tok.is(TokenKind::Invalid) {
            return Error::syntax(tok.text.to_string(), tok.position);
        }
        Error::syntax(format!("unexpected {}, expected {}", tok.describe(), expected), tok.position)
    }

    pub(crate) fn error_at(&self, code: ErrorCode, message: impl Into<String>, position: Position) -> Error {
        Error::from_code(code, message).at(position)
    }

    // tree helpers

    pub(crate) fn leaf(&mut self, kind: NodeKind, text: Option<CompactString>, position: Position) -> NodeId {
        self.cst.alloc(kind, text, position)
    }

    pub(crate) fn node(
        &mut self,
        kind: NodeKind,
        text: Option<CompactString>,
        position: Position,
        children: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        let id = self.cst.alloc(kind, text, position);
        for child in children {
            self.cst.append(id, child);
        }
        id
    }

    pub(crate) fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.cst.append(parent, child);
    }

    pub(crate) fn cst_len(&self) -> usize {
        self.cst.len()
    }
}
