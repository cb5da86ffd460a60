use super::{PResult, Parser};
use crate::cst::{NodeId, NodeKind};
use crate::error::Error;
use crate::lexer::{Position, TokenKind as T, TokenSource};
use tracing::debug;

impl<S: TokenSource> Parser<S> {
    pub(super) fn module(&mut self, errors: &mut Vec<Error>) -> Option<NodeId> {
        let start = self.peek().position;
        let mut children = Vec::new();

        if self.at(T::KwXquery) && matches!(self.peek_nth(1).kind, T::KwVersion | T::KwEncoding) {
            let mark = self.cst_len();
            match self.version_decl() {
                Ok(decl) => children.push(decl),
                Err(err) => {
                    errors.push(err);
                    self.skip_past_semicolon(mark);
                }
            }
        }

        let library = self.guess(|p| {
            p.expect(T::KwModule)?;
            p.expect(T::KwNamespace)
        });
        if library {
            match self.module_decl() {
                Ok(decl) => children.push(decl),
                Err(err) => {
                    errors.push(err);
                    return None;
                }
            }
        }

        let prolog = self.prolog(errors);
        children.push(prolog);

        if library {
            let tok = self.peek();
            if !tok.is(T::Eof) {
                errors.push(self.unexpected(&tok, "a prolog declaration or end of input"));
            }
            return Some(self.node(NodeKind::LibraryModule, None, start, children));
        }

        let body_pos = self.peek().position;
        match self.expr() {
            Ok(body) => {
                let body = self.node(NodeKind::QueryBody, None, body_pos, [body]);
                children.push(body);
                let tok = self.peek();
                if !tok.is(T::Eof) {
                    errors.push(self.unexpected(&tok, "end of input"));
                }
            }
            Err(err) => errors.push(err),
        }
        Some(self.node(NodeKind::MainModule, None, start, children))
    }

    /// Error recovery inside the prolog: drop the nodes of the broken
    /// declaration (everything allocated since `mark`) and the tokens up to
    /// and including the next `;`.
    fn skip_past_semicolon(&mut self, mark: usize) {
        self.cst.truncate(mark);
        self.open_tags.clear();
        self.tag_scopes.clear();
        loop {
            match self.peek_kind() {
                T::Eof => return,
                T::Semicolon => {
                    self.consume();
                    return;
                }
                _ => {
                    self.consume();
                }
            }
        }
    }

    fn version_decl(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwXquery)?.position;
        let mut children = Vec::new();
        if self.eat(T::KwVersion).is_some() {
            let tok = self.expect(T::StringLiteral)?;
            children.push(self.leaf(NodeKind::Version, Some(tok.text), tok.position));
        }
        if children.is_empty() || self.at(T::KwEncoding) {
            self.expect(T::KwEncoding)?;
            let tok = self.expect(T::StringLiteral)?;
            children.push(self.leaf(NodeKind::Encoding, Some(tok.text), tok.position));
        }
        self.expect(T::Semicolon)?;
        Ok(self.node(NodeKind::VersionDecl, None, start, children))
    }

    fn module_decl(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwModule)?.position;
        self.expect(T::KwNamespace)?;
        let prefix = self.ncname()?;
        self.expect(T::Eq)?;
        let uri = self.string_literal()?;
        self.expect(T::Semicolon)?;
        Ok(self.node(NodeKind::ModuleDecl, Some(prefix.text), start, [uri]))
    }

    fn at_prolog_decl(&mut self) -> bool {
        match self.peek_kind() {
            T::KwDeclare => matches!(
                self.peek_nth(1).kind,
                T::KwNamespace
                    | T::KwDefault
                    | T::KwBoundarySpace
                    | T::KwBaseUri
                    | T::KwConstruction
                    | T::KwOrdering
                    | T::KwCopyNamespaces
                    | T::KwOption
                    | T::KwVariable
                    | T::KwFunction
                    | T::KwContext
                    | T::Percent
            ),
            T::KwImport => matches!(self.peek_nth(1).kind, T::KwModule | T::KwSchema),
            _ => false,
        }
    }

    fn prolog(&mut self, errors: &mut Vec<Error>) -> NodeId {
        let start = self.peek().position;
        let prolog = self.leaf(NodeKind::Prolog, None, start);
        while self.at_prolog_decl() {
            let mark = self.cst_len();
            let result = self.prolog_decl().and_then(|decl| {
                self.expect(T::Semicolon)?;
                Ok(decl)
            });
            match result {
                Ok(decl) => self.attach(prolog, decl),
                Err(err) => {
                    debug!(error = %err, "recovering after prolog declaration");
                    errors.push(err);
                    self.skip_past_semicolon(mark);
                }
            }
        }
        prolog
    }

    fn prolog_decl(&mut self) -> PResult<NodeId> {
        if self.at(T::KwImport) {
            return match self.peek_nth(1).kind {
                T::KwSchema => self.schema_import(),
                _ => self.module_import(),
            };
        }
        let start = self.expect(T::KwDeclare)?.position;
        let tok = self.peek();
        match tok.kind {
            T::KwNamespace => {
                self.consume();
                let prefix = self.ncname()?;
                self.expect(T::Eq)?;
                let uri = self.string_literal()?;
                Ok(self.node(NodeKind::NamespaceDecl, Some(prefix.text), start, [uri]))
            }
            T::KwDefault => self.default_decl(start),
            T::KwBoundarySpace => {
                self.consume();
                let mode = self.one_of(&[T::KwPreserve, T::KwStrip])?;
                Ok(self.leaf(NodeKind::BoundarySpaceDecl, Some(mode.into()), start))
            }
            T::KwBaseUri => {
                self.consume();
                let uri = self.string_literal()?;
                Ok(self.node(NodeKind::BaseUriDecl, None, start, [uri]))
            }
            T::KwConstruction => {
                self.consume();
                let mode = self.one_of(&[T::KwPreserve, T::KwStrip])?;
                Ok(self.leaf(NodeKind::ConstructionDecl, Some(mode.into()), start))
            }
            T::KwOrdering => {
                self.consume();
                let mode = self.one_of(&[T::KwOrdered, T::KwUnordered])?;
                Ok(self.leaf(NodeKind::OrderingModeDecl, Some(mode.into()), start))
            }
            T::KwCopyNamespaces => {
                self.consume();
                let preserve = self.one_of(&[T::KwPreserve, T::KwNoPreserve])?;
                self.expect(T::Comma)?;
                let inherit = self.one_of(&[T::KwInherit, T::KwNoInherit])?;
                let text = format!("{preserve},{inherit}");
                Ok(self.leaf(NodeKind::CopyNamespacesDecl, Some(text.into()), start))
            }
            T::KwOption => {
                self.consume();
                let name = self.eqname()?;
                let value = self.string_literal()?;
                Ok(self.node(NodeKind::OptionDecl, Some(name.text), start, [value]))
            }
            T::KwContext => self.context_item_decl(start),
            T::KwVariable | T::KwFunction | T::Percent => {
                let annotations = self.annotations()?;
                if self.at(T::KwVariable) {
                    self.var_decl(start, annotations)
                } else {
                    self.function_decl(start, annotations)
                }
            }
            _ => Err(self.unexpected(&tok, "a prolog declaration")),
        }
    }

    /// Consume one of the given keywords and return its spelling.
    fn one_of(&mut self, kinds: &[T]) -> PResult<&'static str> {
        let tok = self.peek();
        match kinds.iter().find(|&&k| tok.is(k)) {
            Some(kind) => {
                self.consume();
                Ok(kind.describe())
            }
            None => {
                let expected = kinds.iter().map(|k| format!("'{}'", k.describe())).collect::<Vec<_>>().join(" or ");
                Err(self.unexpected(&tok, &expected))
            }
        }
    }

    fn default_decl(&mut self, start: Position) -> PResult<NodeId> {
        self.expect(T::KwDefault)?;
        let tok = self.peek();
        match tok.kind {
            T::KwElement | T::KwFunction => {
                self.consume();
                self.expect(T::KwNamespace)?;
                let uri = self.string_literal()?;
                let kind = if tok.is(T::KwElement) {
                    NodeKind::DefaultElementNamespace
                } else {
                    NodeKind::DefaultFunctionNamespace
                };
                Ok(self.node(kind, None, start, [uri]))
            }
            T::KwCollation => {
                self.consume();
                let uri = self.string_literal()?;
                Ok(self.node(NodeKind::DefaultCollation, None, start, [uri]))
            }
            T::KwOrder => {
                self.consume();
                self.expect(T::KwEmpty)?;
                let which = self.one_of(&[T::KwGreatest, T::KwLeast])?;
                Ok(self.leaf(NodeKind::EmptyOrderDecl, Some(which.into()), start))
            }
            _ => Err(self.unexpected(&tok, "'element', 'function', 'collation' or 'order'")),
        }
    }

    fn at_hints(&mut self) -> PResult<Vec<NodeId>> {
        let mut hints = Vec::new();
        if self.eat(T::KwAt).is_some() {
            loop {
                let tok = self.expect(T::StringLiteral)?;
                hints.push(self.leaf(NodeKind::AtHint, Some(tok.text), tok.position));
                if self.eat(T::Comma).is_none() {
                    break;
                }
            }
        }
        Ok(hints)
    }

    fn schema_import(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwImport)?.position;
        self.expect(T::KwSchema)?;
        let mut prefix = None;
        let mut children = Vec::new();
        if self.eat(T::KwNamespace).is_some() {
            prefix = Some(self.ncname()?.text);
            self.expect(T::Eq)?;
        } else if self.at(T::KwDefault) {
            let pos = self.consume().position;
            self.expect(T::KwElement)?;
            self.expect(T::KwNamespace)?;
            children.push(self.leaf(NodeKind::DefaultElementNamespace, None, pos));
        }
        children.push(self.string_literal()?);
        children.extend(self.at_hints()?);
        Ok(self.node(NodeKind::SchemaImport, prefix, start, children))
    }

    fn module_import(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwImport)?.position;
        self.expect(T::KwModule)?;
        let mut prefix = None;
        if self.eat(T::KwNamespace).is_some() {
            prefix = Some(self.ncname()?.text);
            self.expect(T::Eq)?;
        }
        let mut children = vec![self.string_literal()?];
        children.extend(self.at_hints()?);
        Ok(self.node(NodeKind::ModuleImport, prefix, start, children))
    }

    fn context_item_decl(&mut self, start: Position) -> PResult<NodeId> {
        self.expect(T::KwContext)?;
        self.expect(T::KwItem)?;
        let mut children = Vec::new();
        if self.eat(T::KwAs).is_some() {
            children.push(self.item_type()?);
        }
        children.push(self.initializer()?);
        Ok(self.node(NodeKind::ContextItemDecl, None, start, children))
    }

    /// `:= ExprSingle` or `external (:= ExprSingle)?`.
    fn initializer(&mut self) -> PResult<NodeId> {
        if self.eat(T::Assign).is_some() {
            return self.expr_single();
        }
        let tok = self.peek();
        if !tok.is(T::KwExternal) {
            return Err(self.unexpected(&tok, "':=' or 'external'"));
        }
        self.consume();
        let mut default = Vec::new();
        if self.eat(T::Assign).is_some() {
            default.push(self.expr_single()?);
        }
        Ok(self.node(NodeKind::External, None, tok.position, default))
    }

    pub(super) fn annotations(&mut self) -> PResult<Vec<NodeId>> {
        let mut out = Vec::new();
        while self.at(T::Percent) {
            let start = self.consume().position;
            let name = self.eqname()?;
            let mut literals = Vec::new();
            if self.eat(T::LParen).is_some() {
                loop {
                    let tok = self.peek();
                    let kind = match tok.kind {
                        T::StringLiteral => NodeKind::StringLiteral,
                        T::IntegerLiteral => NodeKind::IntegerLiteral,
                        T::DecimalLiteral => NodeKind::DecimalLiteral,
                        T::DoubleLiteral => NodeKind::DoubleLiteral,
                        _ => return Err(self.unexpected(&tok, "a literal")),
                    };
                    self.consume();
                    literals.push(self.leaf(kind, Some(tok.text), tok.position));
                    if self.eat(T::Comma).is_none() {
                        break;
                    }
                }
                self.expect(T::RParen)?;
            }
            out.push(self.node(NodeKind::Annotation, Some(name.text), start, literals));
        }
        Ok(out)
    }

    fn var_decl(&mut self, start: Position, annotations: Vec<NodeId>) -> PResult<NodeId> {
        self.expect(T::KwVariable)?;
        let name = self.var_name()?;
        let mut children = annotations;
        if self.eat(T::KwAs).is_some() {
            children.push(self.sequence_type()?);
        }
        children.push(self.initializer()?);
        Ok(self.node(NodeKind::VarDecl, Some(name.text), start, children))
    }

    fn function_decl(&mut self, start: Position, annotations: Vec<NodeId>) -> PResult<NodeId> {
        self.expect(T::KwFunction)?;
        let name = self.eqname()?;
        let mut children = annotations;
        children.push(self.param_list()?);
        if let Some(tok) = self.eat(T::KwAs) {
            let ty = self.sequence_type()?;
            children.push(self.node(NodeKind::ReturnType, None, tok.position, [ty]));
        }
        if let Some(tok) = self.eat(T::KwExternal) {
            children.push(self.leaf(NodeKind::External, None, tok.position));
        } else {
            children.push(self.function_body()?);
        }
        Ok(self.node(NodeKind::FunctionDecl, Some(name.text), start, children))
    }

    /// `( ($name (as SequenceType)?) ** , )`
    pub(super) fn param_list(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::LParen)?.position;
        let mut params = Vec::new();
        if !self.at(T::RParen) {
            loop {
                let pos = self.peek().position;
                let name = self.var_name()?;
                let mut ty = Vec::new();
                if self.eat(T::KwAs).is_some() {
                    ty.push(self.sequence_type()?);
                }
                params.push(self.node(NodeKind::Param, Some(name.text), pos, ty));
                if self.eat(T::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(T::RParen)?;
        Ok(self.node(NodeKind::ParamList, None, start, params))
    }

    /// `{ Expr? }`
    pub(super) fn function_body(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::LBrace)?.position;
        let mut body = Vec::new();
        if !self.at(T::RBrace) {
            body.push(self.expr()?);
        }
        self.expect(T::RBrace)?;
        Ok(self.node(NodeKind::FunctionBody, None, start, body))
    }
}
