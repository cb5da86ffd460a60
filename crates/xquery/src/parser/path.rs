use super::{PResult, Parser};
use crate::cst::{NodeId, NodeKind};
use crate::lexer::{LexMode, Token, TokenKind as T, TokenSource};
use compact_str::CompactString;

fn is_axis(kind: T) -> bool {
    matches!(
        kind,
        T::KwChild
            | T::KwDescendant
            | T::KwAttribute
            | T::KwSelf
            | T::KwDescendantOrSelf
            | T::KwFollowingSibling
            | T::KwFollowing
            | T::KwNamespace
            | T::KwParent
            | T::KwAncestor
            | T::KwPrecedingSibling
            | T::KwPreceding
            | T::KwAncestorOrSelf
    )
}

pub(super) fn is_kind_test_keyword(kind: T) -> bool {
    matches!(
        kind,
        T::KwElement
            | T::KwAttribute
            | T::KwSchemaElement
            | T::KwSchemaAttribute
            | T::KwComment
            | T::KwText
            | T::KwNode
            | T::KwDocumentNode
            | T::KwProcessingInstruction
            | T::KwNamespaceNode
    )
}

/// Names that can never be called as functions because they open other
/// syntax when followed by `(`.
fn is_reserved_function_name(kind: T) -> bool {
    is_kind_test_keyword(kind)
        || matches!(
            kind,
            T::KwIf | T::KwSwitch | T::KwTypeswitch | T::KwItem | T::KwEmptySequence | T::KwFunction
        )
}

impl<S: TokenSource> Parser<S> {
    pub(crate) fn path_expr(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        match tok.kind {
            T::Slash => {
                self.consume();
                let mut children = Vec::new();
                if self.starts_step() {
                    children.push(self.relative_path()?);
                }
                Ok(self.node(NodeKind::AbsoluteSlash, None, tok.position, children))
            }
            T::DoubleSlash => {
                self.consume();
                let rel = self.relative_path()?;
                Ok(self.node(NodeKind::AbsoluteDoubleSlash, None, tok.position, [rel]))
            }
            _ => self.relative_path(),
        }
    }

    /// Whether the current token can begin a step after a leading `/`.
    fn starts_step(&mut self) -> bool {
        let tok = self.peek();
        tok.is_name()
            || matches!(
                tok.kind,
                T::Star
                    | T::PrefixWildcard
                    | T::LocalWildcard
                    | T::At
                    | T::Dot
                    | T::DotDot
                    | T::Dollar
                    | T::LParen
                    | T::IntegerLiteral
                    | T::DecimalLiteral
                    | T::DoubleLiteral
                    | T::StringLiteral
                    | T::XmlComment
                    | T::XmlPi
                    | T::Percent
            )
            || (tok.is(T::Lt) && self.at_direct_constructor())
    }

    /// `StepExpr (("/" | "//") StepExpr)*`, nested to the left.
    fn relative_path(&mut self) -> PResult<NodeId> {
        let mut left = self.step_expr()?;
        loop {
            let kind = match self.peek_kind() {
                T::Slash => NodeKind::Slash,
                T::DoubleSlash => NodeKind::DoubleSlash,
                _ => return Ok(left),
            };
            self.consume();
            let right = self.step_expr()?;
            let start = self.position_of(left);
            left = self.node(kind, None, start, [left, right]);
        }
    }

    fn step_expr(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        match tok.kind {
            T::At => {
                self.consume();
                let test = self.node_test()?;
                self.axis_step(Some("@".into()), tok, test)
            }
            T::DotDot => {
                self.consume();
                let preds = self.predicates()?;
                Ok(self.node(NodeKind::ParentStep, None, tok.position, preds))
            }
            kind if is_axis(kind) && self.peek_nth(1).is(T::ColonColon) => {
                self.consume();
                self.consume();
                let test = self.node_test()?;
                self.axis_step(Some(tok.text.clone()), tok, test)
            }
            T::Star | T::PrefixWildcard | T::LocalWildcard => {
                let test = self.name_test()?;
                self.axis_step(None, tok, test)
            }
            _ if tok.is_name() => {
                if self.name_starts_primary(&tok) {
                    return self.postfix_expr();
                }
                let test = self.node_test()?;
                self.axis_step(None, tok, test)
            }
            _ => self.postfix_expr(),
        }
    }

    fn axis_step(&mut self, axis: Option<CompactString>, start: Token, test: NodeId) -> PResult<NodeId> {
        let mut children = vec![test];
        children.extend(self.predicates()?);
        Ok(self.node(NodeKind::AxisStep, axis, start.position, children))
    }

    /// Decide whether a name token begins a primary expression rather than a
    /// name test.
    fn name_starts_primary(&mut self, tok: &Token) -> bool {
        let next = self.peek_nth(1);
        match next.kind {
            T::LParen if is_kind_test_keyword(tok.kind) => !self.guess(|p| p.kind_test()),
            T::LParen => true,
            T::Hash => true,
            T::LBrace if matches!(tok.kind, T::KwOrdered | T::KwUnordered) => true,
            _ => self.at_computed_constructor(),
        }
    }

    fn predicates(&mut self) -> PResult<Vec<NodeId>> {
        let mut preds = Vec::new();
        while let Some(tok) = self.eat(T::LBracket) {
            let expr = self.expr()?;
            self.expect(T::RBracket)?;
            preds.push(self.node(NodeKind::Predicate, None, tok.position, [expr]));
        }
        Ok(preds)
    }

    /// `PrimaryExpr (Predicate | ArgumentList)*`
    fn postfix_expr(&mut self) -> PResult<NodeId> {
        let mut base = self.primary()?;
        loop {
            match self.peek_kind() {
                T::LBracket => {
                    let start = self.position_of(base);
                    let mut children = vec![base];
                    children.extend(self.predicates()?);
                    base = self.node(NodeKind::Filter, None, start, children);
                }
                T::LParen => {
                    let start = self.position_of(base);
                    let mut children = vec![base];
                    children.extend(self.argument_list()?);
                    base = self.node(NodeKind::DynamicCall, None, start, children);
                }
                _ => return Ok(base),
            }
        }
    }

    fn primary(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        let literal = match tok.kind {
            T::IntegerLiteral => Some(NodeKind::IntegerLiteral),
            T::DecimalLiteral => Some(NodeKind::DecimalLiteral),
            T::DoubleLiteral => Some(NodeKind::DoubleLiteral),
            T::StringLiteral => Some(NodeKind::StringLiteral),
            _ => None,
        };
        if let Some(kind) = literal {
            self.consume();
            return Ok(self.leaf(kind, Some(tok.text), tok.position));
        }
        match tok.kind {
            T::Dollar => {
                let name = self.var_name()?;
                Ok(self.leaf(NodeKind::VarRef, Some(name.text), tok.position))
            }
            T::LParen => {
                self.consume();
                if self.eat(T::RParen).is_some() {
                    return Ok(self.leaf(NodeKind::EmptySequence, None, tok.position));
                }
                let inner = self.expr()?;
                self.expect(T::RParen)?;
                Ok(inner)
            }
            T::Dot => {
                self.consume();
                Ok(self.leaf(NodeKind::ContextItem, None, tok.position))
            }
            T::Lt => self.direct_element(LexMode::Standard),
            T::XmlComment => {
                self.consume();
                Ok(self.leaf(NodeKind::DirComment, Some(tok.text), tok.position))
            }
            T::XmlPi => {
                self.consume();
                self.direct_pi(&tok)
            }
            T::Percent => self.inline_function(),
            T::KwFunction if self.peek_nth(1).is(T::LParen) => self.inline_function(),
            T::KwOrdered | T::KwUnordered if self.peek_nth(1).is(T::LBrace) => {
                self.consume();
                let kind = if tok.is(T::KwOrdered) { NodeKind::Ordered } else { NodeKind::Unordered };
                let body = self.enclosed_expr()?;
                Ok(self.node(kind, None, tok.position, [body]))
            }
            _ if tok.is_name() && self.at_computed_constructor() => self.computed_constructor(),
            _ if tok.is_name() && self.peek_nth(1).is(T::Hash) => {
                self.consume();
                self.consume();
                let arity = self.expect(T::IntegerLiteral)?;
                let arity = self.leaf(NodeKind::IntegerLiteral, Some(arity.text), arity.position);
                Ok(self.node(NodeKind::NamedFunctionRef, Some(tok.text), tok.position, [arity]))
            }
            _ if tok.is_name() && self.peek_nth(1).is(T::LParen) => {
                if is_reserved_function_name(tok.kind) {
                    return Err(self.unexpected(&tok, "a function name"));
                }
                self.consume();
                let args = self.argument_list()?;
                Ok(self.node(NodeKind::FunctionCall, Some(tok.text), tok.position, args))
            }
            _ => Err(self.unexpected(&tok, "an expression")),
        }
    }

    /// `Annotation* function ParamList (as SequenceType)? FunctionBody`
    fn inline_function(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        let mut children = self.annotations()?;
        self.expect(T::KwFunction)?;
        children.push(self.param_list()?);
        if let Some(tok) = self.eat(T::KwAs) {
            let ty = self.sequence_type()?;
            children.push(self.node(NodeKind::ReturnType, None, tok.position, [ty]));
        }
        children.push(self.function_body()?);
        Ok(self.node(NodeKind::InlineFunction, None, start, children))
    }

    /// `*`, `prefix:*`, `*:local` or a name.
    pub(crate) fn name_test(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        let kind = match tok.kind {
            T::Star => NodeKind::Wildcard,
            T::PrefixWildcard => NodeKind::PrefixWildcard,
            T::LocalWildcard => NodeKind::LocalWildcard,
            _ if tok.is_name() => NodeKind::NameTest,
            _ => return Err(self.unexpected(&tok, "a name test")),
        };
        self.consume();
        let text = (kind != NodeKind::Wildcard).then(|| tok.text.clone());
        Ok(self.leaf(kind, text, tok.position))
    }

    fn node_test(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        if is_kind_test_keyword(tok.kind) && self.peek_nth(1).is(T::LParen) {
            return self.kind_test();
        }
        self.name_test()
    }

    pub(crate) fn kind_test(&mut self) -> PResult<NodeId> {
        let tok = self.consume();
        self.expect(T::LParen)?;
        let pos = tok.position;
        let node = match tok.kind {
            T::KwNode => self.leaf(NodeKind::AnyKindTest, None, pos),
            T::KwText => self.leaf(NodeKind::TextTest, None, pos),
            T::KwComment => self.leaf(NodeKind::CommentTest, None, pos),
            T::KwNamespaceNode => self.leaf(NodeKind::NamespaceNodeTest, None, pos),
            T::KwProcessingInstruction => {
                let arg = self.peek();
                let target = if arg.is(T::StringLiteral) || arg.is_ncname() {
                    self.consume();
                    Some(arg.text.clone())
                } else {
                    None
                };
                self.leaf(NodeKind::PiTest, target, pos)
            }
            T::KwElement | T::KwAttribute => {
                let kind = if tok.is(T::KwElement) { NodeKind::ElementTest } else { NodeKind::AttributeTest };
                let mut children = Vec::new();
                if !self.at(T::RParen) {
                    let name = self.peek();
                    if name.is(T::Star) {
                        self.consume();
                        children.push(self.leaf(NodeKind::Wildcard, None, name.position));
                    } else {
                        let name = self.eqname()?;
                        children.push(self.leaf(NodeKind::NameTest, Some(name.text), name.position));
                    }
                    if self.eat(T::Comma).is_some() {
                        let ty = self.eqname()?;
                        children.push(self.leaf(NodeKind::TypeName, Some(ty.text), ty.position));
                        if kind == NodeKind::ElementTest
                            && let Some(q) = self.eat(T::Question)
                        {
                            children.push(self.leaf(NodeKind::Nillable, None, q.position));
                        }
                    }
                }
                self.node(kind, None, pos, children)
            }
            T::KwSchemaElement | T::KwSchemaAttribute => {
                let name = self.eqname()?;
                let kind = if tok.is(T::KwSchemaElement) {
                    NodeKind::SchemaElementTest
                } else {
                    NodeKind::SchemaAttributeTest
                };
                self.leaf(kind, Some(name.text), pos)
            }
            T::KwDocumentNode => {
                let mut children = Vec::new();
                if matches!(self.peek_kind(), T::KwElement | T::KwSchemaElement) {
                    children.push(self.kind_test()?);
                }
                self.node(NodeKind::DocumentTest, None, pos, children)
            }
            _ => return Err(self.unexpected(&tok, "a kind test")),
        };
        self.expect(T::RParen)?;
        Ok(node)
    }
}
