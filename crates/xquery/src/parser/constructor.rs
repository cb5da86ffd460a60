use super::{PResult, Parser};
use crate::cst::{NodeId, NodeKind};
use crate::error::{Error, ErrorCode};
use crate::lexer::chars::is_xml_whitespace;
use crate::lexer::{LexMode, Token, TokenKind as T, TokenSource};
use crate::qname::is_ncname;

fn is_tag_name(tok: &Token) -> bool {
    matches!(tok.kind, T::NCName | T::QName)
}

impl<S: TokenSource> Parser<S> {
    /// `<` immediately followed by a tag name.
    pub(crate) fn at_direct_constructor(&mut self) -> bool {
        self.guess(|p| {
            p.expect(T::Lt)?;
            let name = p.peek_in(LexMode::StartTag);
            if is_tag_name(&name) && !name.preceded_by_whitespace {
                Ok(())
            } else {
                Err(p.unexpected(&name, "a tag name"))
            }
        })
    }

    /// `<name attrs* (/> | > content* </name>)`. `mode` is the lexing mode
    /// the opening `<` was seen in.
    pub(crate) fn direct_element(&mut self, mode: LexMode) -> PResult<NodeId> {
        let lt = self.expect_in(T::Lt, mode)?;
        let name = self.peek_in(LexMode::StartTag);
        if !is_tag_name(&name) || name.preceded_by_whitespace {
            return Err(self.unexpected(&name, "a tag name directly after '<'"));
        }
        self.consume_in(LexMode::StartTag);
        let element = self.leaf(NodeKind::DirElement, Some(name.text.clone()), lt.position);
        self.nested(lt.position, |p| {
            while p.guess(|g| g.attribute_start()) {
                let attr = p.direct_attribute()?;
                p.attach(element, attr);
            }
            let tok = p.peek_in(LexMode::StartTag);
            match tok.kind {
                T::EmptyTagClose => {
                    p.consume_in(LexMode::StartTag);
                    Ok(element)
                }
                T::Gt => {
                    p.consume_in(LexMode::StartTag);
                    p.open_tags.push(name.text.clone());
                    p.element_content(element)?;
                    Ok(element)
                }
                _ => Err(p.unexpected(&tok, "an attribute, '>' or '/>'")),
            }
        })
    }

    fn attribute_start(&mut self) -> PResult<()> {
        let name = self.consume_in(LexMode::StartTag);
        if !is_tag_name(&name) {
            return Err(self.unexpected(&name, "an attribute name"));
        }
        self.expect_in(T::Eq, LexMode::StartTag)?;
        Ok(())
    }

    /// `name = "value"` inside a start tag.
    fn direct_attribute(&mut self) -> PResult<NodeId> {
        let name = self.peek_in(LexMode::StartTag);
        if !is_tag_name(&name) {
            return Err(self.unexpected(&name, "an attribute name"));
        }
        if !name.preceded_by_whitespace {
            return Err(self.unexpected(&name, "whitespace before the attribute name"));
        }
        self.consume_in(LexMode::StartTag);
        self.expect_in(T::Eq, LexMode::StartTag)?;
        let quote = self.peek_in(LexMode::StartTag);
        let (mode, close) = match quote.kind {
            T::Quot => (LexMode::AttrQuot, T::Quot),
            T::Apos => (LexMode::AttrApos, T::Apos),
            _ => return Err(self.unexpected(&quote, "a quoted attribute value")),
        };
        self.consume_in(LexMode::StartTag);
        let attr = self.leaf(NodeKind::DirAttribute, Some(name.text), name.position);
        loop {
            let tok = self.peek_in(mode);
            match tok.kind {
                k if k == close => {
                    self.consume_in(mode);
                    return Ok(attr);
                }
                T::AttrText => {
                    self.consume_in(mode);
                    let text = self.leaf(NodeKind::AttributeText, Some(tok.text), tok.position);
                    self.attach(attr, text);
                }
                T::LBrace => {
                    let enclosed = self.content_enclosed_expr(mode)?;
                    self.attach(attr, enclosed);
                }
                T::Eof => return Err(self.unexpected(&tok, "the end of the attribute value")),
                _ => return Err(self.unexpected(&tok, "attribute content")),
            }
        }
    }

    /// `{ Expr? }` inside markup. Open tags of the enclosing constructors are
    /// set aside so the nested expression starts with an empty tag stack.
    fn content_enclosed_expr(&mut self, mode: LexMode) -> PResult<NodeId> {
        let open = self.expect_in(T::LBrace, mode)?;
        let outer = std::mem::take(&mut self.open_tags);
        self.tag_scopes.push(outer);
        let result = self.enclosed_body();
        self.open_tags = self.tag_scopes.pop().unwrap_or_default();
        let inner = result?;
        Ok(self.node(NodeKind::EnclosedExpr, None, open.position, inner))
    }

    fn enclosed_body(&mut self) -> PResult<Vec<NodeId>> {
        let mut inner = Vec::new();
        if !self.at(T::RBrace) {
            inner.push(self.expr()?);
        }
        self.expect(T::RBrace)?;
        Ok(inner)
    }

    fn element_content(&mut self, element: NodeId) -> PResult<()> {
        loop {
            let tok = self.peek_in(LexMode::ElementContent);
            let child = match tok.kind {
                T::EndTagOpen => return self.end_tag(),
                T::Lt => self.direct_element(LexMode::ElementContent)?,
                T::ElementText => {
                    self.consume_in(LexMode::ElementContent);
                    let boundary = tok.text.chars().all(is_xml_whitespace)
                        && self.stream.source().slice(tok.span).chars().all(is_xml_whitespace);
                    let kind = if boundary { NodeKind::BoundaryWhitespace } else { NodeKind::Text };
                    self.leaf(kind, Some(tok.text), tok.position)
                }
                T::CData => {
                    self.consume_in(LexMode::ElementContent);
                    self.leaf(NodeKind::CData, Some(tok.text), tok.position)
                }
                T::XmlComment => {
                    self.consume_in(LexMode::ElementContent);
                    self.leaf(NodeKind::DirComment, Some(tok.text), tok.position)
                }
                T::XmlPi => {
                    self.consume_in(LexMode::ElementContent);
                    self.direct_pi(&tok)?
                }
                T::LBrace => self.content_enclosed_expr(LexMode::ElementContent)?,
                T::Eof => {
                    let open = self.open_tags.last().cloned().unwrap_or_default();
                    return Err(self.unexpected(&tok, &format!("closing tag </{open}>")));
                }
                _ => return Err(self.unexpected(&tok, "element content")),
            };
            self.attach(element, child);
        }
    }

    /// `</name S? >`, checked against the innermost open tag.
    fn end_tag(&mut self) -> PResult<()> {
        let open = self.expect_in(T::EndTagOpen, LexMode::ElementContent)?;
        let name = self.peek_in(LexMode::StartTag);
        if !is_tag_name(&name) || name.preceded_by_whitespace {
            return Err(self.unexpected(&name, "a tag name after '</'"));
        }
        self.consume_in(LexMode::StartTag);
        let expected = self.open_tags.pop().unwrap_or_default();
        if name.text != expected {
            return Err(self.error_at(
                ErrorCode::XQST0118,
                format!("found closing tag {}, expected {}", name.text, expected),
                open.position,
            ));
        }
        self.expect_in(T::Gt, LexMode::StartTag)?;
        Ok(())
    }

    /// Split `<?target content?>` into a processing-instruction node.
    pub(crate) fn direct_pi(&mut self, tok: &Token) -> PResult<NodeId> {
        let raw = tok.text.as_str();
        let target_end = raw.find(is_xml_whitespace).unwrap_or(raw.len());
        let target = &raw[..target_end];
        if !is_ncname(target) {
            return Err(Error::syntax("invalid processing-instruction target", tok.position));
        }
        let content = raw[target_end..].trim_start_matches(is_xml_whitespace);
        let mut children = Vec::new();
        if !content.is_empty() {
            children.push(self.leaf(NodeKind::Text, Some(content.into()), tok.position));
        }
        Ok(self.node(NodeKind::DirPi, Some(target.into()), tok.position, children))
    }

    /// Computed constructor keyword followed by `{` or by a literal name and `{`.
    pub(crate) fn at_computed_constructor(&mut self) -> bool {
        let tok = self.peek();
        match tok.kind {
            T::KwText | T::KwComment | T::KwDocument => self.peek_nth(1).is(T::LBrace),
            T::KwElement | T::KwAttribute | T::KwProcessingInstruction | T::KwNamespace => self.guess(|p| {
                p.consume();
                if p.eat(T::LBrace).is_some() {
                    return Ok(());
                }
                p.eqname()?;
                p.expect(T::LBrace)?;
                Ok(())
            }),
            _ => false,
        }
    }

    pub(crate) fn computed_constructor(&mut self) -> PResult<NodeId> {
        let tok = self.consume();
        let start = tok.position;
        let kind = match tok.kind {
            T::KwText => NodeKind::CompText,
            T::KwComment => NodeKind::CompComment,
            T::KwDocument => NodeKind::CompDocument,
            T::KwElement => NodeKind::CompElement,
            T::KwAttribute => NodeKind::CompAttribute,
            T::KwProcessingInstruction => NodeKind::CompPi,
            T::KwNamespace => NodeKind::CompNamespace,
            _ => return Err(self.unexpected(&tok, "a computed constructor")),
        };
        let mut children = Vec::new();
        if matches!(kind, NodeKind::CompElement | NodeKind::CompAttribute | NodeKind::CompPi | NodeKind::CompNamespace) {
            let name_tok = self.peek();
            if name_tok.is(T::LBrace) {
                self.consume();
                let name = self.expr()?;
                self.expect(T::RBrace)?;
                children.push(self.node(NodeKind::NameExpr, None, name_tok.position, [name]));
            } else {
                let name = self.eqname()?;
                children.push(self.leaf(NodeKind::ConstructorName, Some(name.text), name.position));
            }
        }
        children.push(self.enclosed_expr()?);
        Ok(self.node(kind, None, start, children))
    }
}
