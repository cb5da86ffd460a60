use super::path::is_kind_test_keyword;
use super::{PResult, Parser};
use crate::cst::{NodeId, NodeKind};
use crate::lexer::{TokenKind as T, TokenSource};

impl<S: TokenSource> Parser<S> {
    /// `empty-sequence() | ItemType OccurrenceIndicator?`
    pub(crate) fn sequence_type(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        if self.at_pair(T::KwEmptySequence, T::LParen) {
            self.consume();
            self.consume();
            self.expect(T::RParen)?;
            return Ok(self.leaf(NodeKind::EmptySequenceType, None, tok.position));
        }
        let item = self.item_type()?;
        let mut children = vec![item];
        let occ = self.peek();
        if matches!(occ.kind, T::Question | T::Star | T::Plus) {
            self.consume();
            children.push(self.leaf(NodeKind::Occurrence, Some(occ.text), occ.position));
        }
        Ok(self.node(NodeKind::SequenceType, None, tok.position, children))
    }

    pub(crate) fn item_type(&mut self) -> PResult<NodeId> {
        let position = self.peek().position;
        self.nested(position, Self::item_type_body)
    }

    fn item_type_body(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        if is_kind_test_keyword(tok.kind) && self.peek_nth(1).is(T::LParen) {
            return self.kind_test();
        }
        match tok.kind {
            T::KwItem if self.peek_nth(1).is(T::LParen) => {
                self.consume();
                self.consume();
                self.expect(T::RParen)?;
                Ok(self.leaf(NodeKind::AnyItemTest, None, tok.position))
            }
            T::KwFunction | T::Percent => self.function_test(),
            T::LParen => {
                self.consume();
                let inner = self.item_type()?;
                self.expect(T::RParen)?;
                Ok(inner)
            }
            _ if tok.is_name() => {
                self.consume();
                Ok(self.leaf(NodeKind::AtomicType, Some(tok.text), tok.position))
            }
            _ => Err(self.unexpected(&tok, "an item type")),
        }
    }

    /// `Annotation* function(*)` or `Annotation* function(SequenceType ** ",") as SequenceType`
    fn function_test(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        let annotations = self.annotations()?;
        self.expect(T::KwFunction)?;
        self.expect(T::LParen)?;
        if self.eat(T::Star).is_some() {
            self.expect(T::RParen)?;
            return Ok(self.node(NodeKind::AnyFunctionTest, None, start, annotations));
        }
        let mut children = annotations;
        if !self.at(T::RParen) {
            loop {
                children.push(self.sequence_type()?);
                if self.eat(T::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(T::RParen)?;
        let ret = self.expect(T::KwAs)?;
        let ty = self.sequence_type()?;
        children.push(self.node(NodeKind::ReturnType, None, ret.position, [ty]));
        Ok(self.node(NodeKind::FunctionTest, None, start, children))
    }

    /// `EQName "?"?` as used by cast and castable.
    pub(crate) fn single_type(&mut self) -> PResult<NodeId> {
        let name = self.eqname()?;
        let mut children = Vec::new();
        if let Some(q) = self.eat(T::Question) {
            children.push(self.leaf(NodeKind::Occurrence, Some(q.text), q.position));
        }
        Ok(self.node(NodeKind::SingleType, Some(name.text), name.position, children))
    }
}
