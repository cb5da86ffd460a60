use super::{PResult, Parser};
use crate::cst::{NodeId, NodeKind};
use crate::error::ErrorCode;
use crate::lexer::{Position, TokenKind as T, TokenSource};
use compact_str::{CompactString, format_compact};

/// Binary operator levels, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Or,
    And,
    Comparison,
    Concat,
    Range,
    Additive,
    Multiplicative,
    Union,
    IntersectExcept,
}

impl Level {
    const ALL: [Level; 9] = [
        Level::Or,
        Level::And,
        Level::Comparison,
        Level::Concat,
        Level::Range,
        Level::Additive,
        Level::Multiplicative,
        Level::Union,
        Level::IntersectExcept,
    ];

    /// Level and node kind of a binary operator token.
    fn of(kind: T) -> Option<(Level, NodeKind)> {
        Level::ALL.into_iter().find_map(|level| level.operator(kind).map(|node| (level, node)))
    }

    fn next(self) -> Option<Level> {
        Some(match self {
            Level::Or => Level::And,
            Level::And => Level::Comparison,
            Level::Comparison => Level::Concat,
            Level::Concat => Level::Range,
            Level::Range => Level::Additive,
            Level::Additive => Level::Multiplicative,
            Level::Multiplicative => Level::Union,
            Level::Union => Level::IntersectExcept,
            Level::IntersectExcept => return None,
        })
    }

    fn operator(self, kind: T) -> Option<NodeKind> {
        Some(match (self, kind) {
            (Level::Or, T::KwOr) => NodeKind::Or,
            (Level::And, T::KwAnd) => NodeKind::And,
            (Level::Comparison, T::Eq) => NodeKind::GeneralEq,
            (Level::Comparison, T::Ne) => NodeKind::GeneralNe,
            (Level::Comparison, T::Lt) => NodeKind::GeneralLt,
            (Level::Comparison, T::Le) => NodeKind::GeneralLe,
            (Level::Comparison, T::Gt) => NodeKind::GeneralGt,
            (Level::Comparison, T::Ge) => NodeKind::GeneralGe,
            (Level::Comparison, T::KwEq) => NodeKind::ValueEq,
            (Level::Comparison, T::KwNe) => NodeKind::ValueNe,
            (Level::Comparison, T::KwLt) => NodeKind::ValueLt,
            (Level::Comparison, T::KwLe) => NodeKind::ValueLe,
            (Level::Comparison, T::KwGt) => NodeKind::ValueGt,
            (Level::Comparison, T::KwGe) => NodeKind::ValueGe,
            (Level::Comparison, T::KwIs) => NodeKind::Is,
            (Level::Comparison, T::LtLt) => NodeKind::Precedes,
            (Level::Comparison, T::GtGt) => NodeKind::Follows,
            (Level::Concat, T::Concat) => NodeKind::Concat,
            (Level::Range, T::KwTo) => NodeKind::Range,
            (Level::Additive, T::Plus) => NodeKind::Plus,
            (Level::Additive, T::Minus) => NodeKind::Minus,
            (Level::Multiplicative, T::Star) => NodeKind::Multiply,
            (Level::Multiplicative, T::KwDiv) => NodeKind::Div,
            (Level::Multiplicative, T::KwIdiv) => NodeKind::IDiv,
            (Level::Multiplicative, T::KwMod) => NodeKind::Mod,
            (Level::Union, T::KwUnion | T::Pipe) => NodeKind::Union,
            (Level::IntersectExcept, T::KwIntersect) => NodeKind::Intersect,
            (Level::IntersectExcept, T::KwExcept) => NodeKind::Except,
            _ => return None,
        })
    }

    /// Comparisons and ranges take at most one operator.
    fn chains(self) -> bool {
        !matches!(self, Level::Comparison | Level::Range)
    }
}

impl<S: TokenSource> Parser<S> {
    /// `ExprSingle ("," ExprSingle)*`
    pub(crate) fn expr(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        let first = self.expr_single()?;
        if !self.at(T::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(T::Comma).is_some() {
            items.push(self.expr_single()?);
        }
        Ok(self.node(NodeKind::Sequence, None, start, items))
    }

    pub(crate) fn expr_single(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        self.nested(start, |p| {
            let tok = p.peek();
            match tok.kind {
                T::KwFor | T::KwLet if p.guess(|g| g.binding_start()) => p.flwor(),
                T::KwSome | T::KwEvery if p.guess(|g| g.binding_start()) => p.quantified(),
                T::KwSwitch if p.peek_nth(1).is(T::LParen) => p.switch_expr(),
                T::KwTypeswitch if p.peek_nth(1).is(T::LParen) => p.typeswitch_expr(),
                T::KwIf if p.guess(|g| g.if_start()) => p.if_expr(),
                T::KwTry if p.peek_nth(1).is(T::LBrace) => p.try_catch(),
                T::KwUpdate
                    if matches!(
                        p.peek_nth(1).kind,
                        T::KwReplace | T::KwValue | T::KwInsert | T::KwDelete | T::KwRename
                    ) =>
                {
                    p.update_expr()
                }
                _ => p.binary_level(Level::Or),
            }
        })
    }

    /// `(for|let|some|every) $`
    fn binding_start(&mut self) -> PResult<()> {
        self.consume();
        self.expect(T::Dollar)?;
        Ok(())
    }

    /// `if (`
    fn if_start(&mut self) -> PResult<()> {
        self.expect(T::KwIf)?;
        self.expect(T::LParen)?;
        Ok(())
    }

    /// Operators at `min` or tighter, by precedence climbing: a chain at one
    /// level is built in a loop and only tighter operands recurse.
    fn binary_level(&mut self, min: Level) -> PResult<NodeId> {
        let mut left = self.instance_of()?;
        let mut last: Option<Level> = None;
        loop {
            let tok = self.peek();
            let Some((level, kind)) = Level::of(tok.kind) else {
                return Ok(left);
            };
            let stop = level < min
                || last.is_some_and(|last| level > last || (level == last && !level.chains()));
            if stop {
                return Ok(left);
            }
            self.consume();
            let right = match level.next() {
                Some(next) => self.binary_level(next)?,
                None => self.instance_of()?,
            };
            let start = self.cst.position(left);
            left = self.node(kind, None, start, [left, right]);
            last = Some(level);
        }
    }

    fn instance_of(&mut self) -> PResult<NodeId> {
        let operand = self.treat()?;
        if self.at_pair(T::KwInstance, T::KwOf) {
            self.consume();
            self.consume();
            let ty = self.sequence_type()?;
            let start = self.cst.position(operand);
            return Ok(self.node(NodeKind::InstanceOf, None, start, [operand, ty]));
        }
        Ok(operand)
    }

    fn treat(&mut self) -> PResult<NodeId> {
        let operand = self.castable()?;
        if self.at_pair(T::KwTreat, T::KwAs) {
            self.consume();
            self.consume();
            let ty = self.sequence_type()?;
            let start = self.cst.position(operand);
            return Ok(self.node(NodeKind::TreatAs, None, start, [operand, ty]));
        }
        Ok(operand)
    }

    fn castable(&mut self) -> PResult<NodeId> {
        let operand = self.cast()?;
        if self.at_pair(T::KwCastable, T::KwAs) {
            self.consume();
            self.consume();
            let ty = self.single_type()?;
            let start = self.cst.position(operand);
            return Ok(self.node(NodeKind::CastableAs, None, start, [operand, ty]));
        }
        Ok(operand)
    }

    fn cast(&mut self) -> PResult<NodeId> {
        let operand = self.arrow()?;
        if self.at_pair(T::KwCast, T::KwAs) {
            self.consume();
            self.consume();
            let ty = self.single_type()?;
            let start = self.cst.position(operand);
            return Ok(self.node(NodeKind::CastAs, None, start, [operand, ty]));
        }
        Ok(operand)
    }

    /// `UnaryExpr ("=>" ArrowFunctionSpecifier ArgumentList)*`
    fn arrow(&mut self) -> PResult<NodeId> {
        let mut left = self.unary()?;
        while self.eat(T::Arrow).is_some() {
            let tok = self.peek();
            let callee = match tok.kind {
                T::Dollar => {
                    let name = self.var_name()?;
                    self.leaf(NodeKind::VarRef, Some(name.text), tok.position)
                }
                T::LParen => {
                    self.consume();
                    let inner = self.expr()?;
                    self.expect(T::RParen)?;
                    inner
                }
                _ if tok.is_name() => {
                    self.consume();
                    self.leaf(NodeKind::FunctionName, Some(tok.text), tok.position)
                }
                _ => return Err(self.unexpected(&tok, "a function name, variable or parenthesized expression")),
            };
            let mut children = vec![left, callee];
            children.extend(self.argument_list()?);
            let start = self.cst.position(left);
            left = self.node(NodeKind::ArrowCall, None, start, children);
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<NodeId> {
        let mut signs = Vec::new();
        loop {
            let tok = self.peek();
            match tok.kind {
                T::Minus => signs.push((NodeKind::UnaryMinus, tok.position)),
                T::Plus => signs.push((NodeKind::UnaryPlus, tok.position)),
                _ => break,
            }
            self.consume();
        }
        let mut operand = self.value_expr()?;
        for (kind, pos) in signs.into_iter().rev() {
            operand = self.node(kind, None, pos, [operand]);
        }
        Ok(operand)
    }

    fn value_expr(&mut self) -> PResult<NodeId> {
        let tok = self.peek();
        match tok.kind {
            T::KwValidate if matches!(self.peek_nth(1).kind, T::LBrace | T::KwLax | T::KwStrict | T::KwType) => {
                self.validate_expr()
            }
            T::Pragma => self.extension_expr(),
            _ => self.simple_map(),
        }
    }

    fn validate_expr(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwValidate)?.position;
        let mode: Option<CompactString> = match self.peek_kind() {
            T::KwLax | T::KwStrict => Some(self.consume().text),
            T::KwType => {
                self.consume();
                let name = self.eqname()?;
                Some(format_compact!("type {}", name.text))
            }
            _ => None,
        };
        self.expect(T::LBrace)?;
        let body = self.expr()?;
        self.expect(T::RBrace)?;
        Ok(self.node(NodeKind::Validate, mode, start, [body]))
    }

    /// One or more pragmas followed by `{ Expr? }`.
    fn extension_expr(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        let mut children = Vec::new();
        while self.at(T::Pragma) {
            let tok = self.consume();
            children.push(self.leaf(NodeKind::Pragma, Some(tok.text), tok.position));
        }
        self.expect(T::LBrace)?;
        if !self.at(T::RBrace) {
            children.push(self.expr()?);
        }
        self.expect(T::RBrace)?;
        Ok(self.node(NodeKind::Extension, None, start, children))
    }

    /// `PathExpr ("!" PathExpr)*`
    fn simple_map(&mut self) -> PResult<NodeId> {
        let mut left = self.path_expr()?;
        while self.eat(T::Bang).is_some() {
            let right = self.path_expr()?;
            let start = self.cst.position(left);
            left = self.node(NodeKind::SimpleMap, None, start, [left, right]);
        }
        Ok(left)
    }

    // FLWOR

    fn flwor(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        let mut clauses = Vec::new();
        loop {
            let tok = self.peek();
            let clause = match tok.kind {
                T::KwFor if self.peek_nth(1).is(T::Dollar) => self.for_clause()?,
                T::KwLet if self.peek_nth(1).is(T::Dollar) => self.let_clause()?,
                T::KwWhere if !clauses.is_empty() => {
                    self.consume();
                    let cond = self.expr_single()?;
                    self.node(NodeKind::WhereClause, None, tok.position, [cond])
                }
                T::KwGroup if !clauses.is_empty() && self.peek_nth(1).is(T::KwBy) => self.group_by()?,
                T::KwOrder | T::KwStable if !clauses.is_empty() => self.order_by()?,
                T::KwCount if !clauses.is_empty() && self.peek_nth(1).is(T::Dollar) => {
                    self.consume();
                    let name = self.var_name()?;
                    self.leaf(NodeKind::CountClause, Some(name.text), tok.position)
                }
                T::KwReturn if !clauses.is_empty() => {
                    self.consume();
                    let body = self.expr_single()?;
                    clauses.push(self.node(NodeKind::ReturnClause, None, tok.position, [body]));
                    return Ok(self.node(NodeKind::Flwor, None, start, clauses));
                }
                _ => return Err(self.unexpected(&tok, "a FLWOR clause or 'return'")),
            };
            clauses.push(clause);
        }
    }

    fn for_clause(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwFor)?.position;
        let mut bindings = Vec::new();
        loop {
            bindings.push(self.binding(true)?);
            if self.eat(T::Comma).is_none() {
                break;
            }
        }
        Ok(self.node(NodeKind::ForClause, None, start, bindings))
    }

    fn let_clause(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwLet)?.position;
        let mut bindings = Vec::new();
        loop {
            let pos = self.peek().position;
            let name = self.var_name()?;
            let mut children = Vec::new();
            if self.eat(T::KwAs).is_some() {
                children.push(self.sequence_type()?);
            }
            self.expect(T::Assign)?;
            children.push(self.expr_single()?);
            bindings.push(self.node(NodeKind::VariableBinding, Some(name.text), pos, children));
            if self.eat(T::Comma).is_none() {
                break;
            }
        }
        Ok(self.node(NodeKind::LetClause, None, start, bindings))
    }

    /// `$v (as T)? (allowing empty)? (at $p)? in ExprSingle` for `for`
    /// clauses; without allowing/at for quantifiers.
    fn binding(&mut self, for_clause: bool) -> PResult<NodeId> {
        let pos = self.peek().position;
        let name = self.var_name()?;
        let mut children = Vec::new();
        if self.eat(T::KwAs).is_some() {
            children.push(self.sequence_type()?);
        }
        if for_clause {
            if let Some(tok) = self.eat(T::KwAllowing) {
                self.expect(T::KwEmpty)?;
                children.push(self.leaf(NodeKind::AllowingEmpty, None, tok.position));
            }
            if let Some(tok) = self.eat(T::KwAt) {
                let positional = self.var_name()?;
                children.push(self.leaf(NodeKind::PositionalVar, Some(positional.text), tok.position));
            }
        }
        self.expect(T::KwIn)?;
        children.push(self.expr_single()?);
        Ok(self.node(NodeKind::VariableBinding, Some(name.text), pos, children))
    }

    fn group_by(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwGroup)?.position;
        self.expect(T::KwBy)?;
        let mut specs = Vec::new();
        loop {
            let pos = self.peek().position;
            let name = self.var_name()?;
            let mut children = Vec::new();
            if self.at(T::KwAs) || self.at(T::Assign) {
                if self.eat(T::KwAs).is_some() {
                    children.push(self.sequence_type()?);
                }
                self.expect(T::Assign)?;
                children.push(self.expr_single()?);
            }
            if let Some(tok) = self.eat(T::KwCollation) {
                let uri = self.expect(T::StringLiteral)?;
                children.push(self.leaf(NodeKind::Collation, Some(uri.text), tok.position));
            }
            specs.push(self.node(NodeKind::GroupingSpec, Some(name.text), pos, children));
            if self.eat(T::Comma).is_none() {
                break;
            }
        }
        Ok(self.node(NodeKind::GroupByClause, None, start, specs))
    }

    fn order_by(&mut self) -> PResult<NodeId> {
        let start = self.peek().position;
        let stable = self.eat(T::KwStable).is_some();
        self.expect(T::KwOrder)?;
        self.expect(T::KwBy)?;
        let mut specs = Vec::new();
        loop {
            let pos = self.peek().position;
            let mut children = vec![self.expr_single()?];
            let tok = self.peek();
            match tok.kind {
                T::KwAscending => {
                    self.consume();
                    children.push(self.leaf(NodeKind::Ascending, None, tok.position));
                }
                T::KwDescending => {
                    self.consume();
                    children.push(self.leaf(NodeKind::Descending, None, tok.position));
                }
                _ => {}
            }
            if let Some(tok) = self.eat(T::KwEmpty) {
                let kind = match self.peek_kind() {
                    T::KwGreatest => NodeKind::EmptyGreatest,
                    T::KwLeast => NodeKind::EmptyLeast,
                    _ => {
                        let next = self.peek();
                        return Err(self.unexpected(&next, "'greatest' or 'least'"));
                    }
                };
                self.consume();
                children.push(self.leaf(kind, None, tok.position));
            }
            if let Some(tok) = self.eat(T::KwCollation) {
                let uri = self.expect(T::StringLiteral)?;
                children.push(self.leaf(NodeKind::Collation, Some(uri.text), tok.position));
            }
            specs.push(self.node(NodeKind::OrderSpec, None, pos, children));
            if self.eat(T::Comma).is_none() {
                break;
            }
        }
        let text = stable.then(|| "stable".into());
        Ok(self.node(NodeKind::OrderByClause, text, start, specs))
    }

    fn quantified(&mut self) -> PResult<NodeId> {
        let tok = self.consume();
        let kind = if tok.is(T::KwSome) { NodeKind::SomeExpr } else { NodeKind::EveryExpr };
        let mut children = Vec::new();
        loop {
            children.push(self.binding(false)?);
            if self.eat(T::Comma).is_none() {
                break;
            }
        }
        let sat = self.expect(T::KwSatisfies)?;
        let test = self.expr_single()?;
        children.push(self.node(NodeKind::Satisfies, None, sat.position, [test]));
        Ok(self.node(kind, None, tok.position, children))
    }

    fn if_expr(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwIf)?.position;
        self.expect(T::LParen)?;
        let cond = self.expr()?;
        self.expect(T::RParen)?;
        self.expect(T::KwThen)?;
        let then_branch = self.expr_single()?;
        self.expect(T::KwElse)?;
        let else_branch = self.expr_single()?;
        Ok(self.node(NodeKind::If, None, start, [cond, then_branch, else_branch]))
    }

    fn parenthesized_operand(&mut self) -> PResult<NodeId> {
        self.expect(T::LParen)?;
        let operand = self.expr()?;
        self.expect(T::RParen)?;
        Ok(operand)
    }

    fn switch_expr(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwSwitch)?.position;
        let mut children = vec![self.parenthesized_operand()?];
        while self.at(T::KwCase) {
            let pos = self.consume().position;
            let mut case = vec![self.expr_single()?];
            while self.eat(T::KwCase).is_some() {
                case.push(self.expr_single()?);
            }
            let ret = self.expect(T::KwReturn)?;
            let body = self.expr_single()?;
            case.push(self.node(NodeKind::ReturnClause, None, ret.position, [body]));
            children.push(self.node(NodeKind::SwitchCase, None, pos, case));
        }
        if children.len() == 1 {
            let tok = self.peek();
            return Err(self.unexpected(&tok, "'case'"));
        }
        let default = self.expect(T::KwDefault)?;
        self.expect(T::KwReturn)?;
        let body = self.expr_single()?;
        children.push(self.node(NodeKind::Default, None, default.position, [body]));
        Ok(self.node(NodeKind::Switch, None, start, children))
    }

    fn typeswitch_expr(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwTypeswitch)?.position;
        let mut children = vec![self.parenthesized_operand()?];
        while self.at(T::KwCase) {
            let pos = self.consume().position;
            let mut var = None;
            if self.at(T::Dollar) {
                var = Some(self.var_name()?.text);
                self.expect(T::KwAs)?;
            }
            let mut case = vec![self.sequence_type()?];
            while self.eat(T::Pipe).is_some() {
                case.push(self.sequence_type()?);
            }
            let ret = self.expect(T::KwReturn)?;
            let body = self.expr_single()?;
            case.push(self.node(NodeKind::ReturnClause, None, ret.position, [body]));
            children.push(self.node(NodeKind::TypeswitchCase, var, pos, case));
        }
        if children.len() == 1 {
            let tok = self.peek();
            return Err(self.unexpected(&tok, "'case'"));
        }
        let default = self.expect(T::KwDefault)?;
        let mut var = None;
        if self.at(T::Dollar) {
            var = Some(self.var_name()?.text);
        }
        self.expect(T::KwReturn)?;
        let body = self.expr_single()?;
        children.push(self.node(NodeKind::Default, var, default.position, [body]));
        Ok(self.node(NodeKind::Typeswitch, None, start, children))
    }

    /// `{ Expr? }` wrapped as an enclosed-expression node.
    pub(crate) fn enclosed_expr(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::LBrace)?.position;
        let mut inner = Vec::new();
        if !self.at(T::RBrace) {
            inner.push(self.expr()?);
        }
        self.expect(T::RBrace)?;
        Ok(self.node(NodeKind::EnclosedExpr, None, start, inner))
    }

    fn try_catch(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwTry)?.position;
        let mut children = vec![self.enclosed_expr()?];
        while self.at(T::KwCatch) {
            children.push(self.catch_clause()?);
        }
        if children.len() == 1 {
            let tok = self.peek();
            return Err(self.unexpected(&tok, "'catch'"));
        }
        Ok(self.node(NodeKind::Try, None, start, children))
    }

    /// `catch NameTest ("|" NameTest)* ("(" $code ("," $desc ("," $value)?)? ")")? { Expr? }`
    fn catch_clause(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwCatch)?.position;
        let list_pos = self.peek().position;
        let mut tests = vec![self.name_test()?];
        while self.eat(T::Pipe).is_some() {
            tests.push(self.name_test()?);
        }
        let mut children = vec![self.node(NodeKind::CatchErrorList, None, list_pos, tests)];
        if self.eat(T::LParen).is_some() {
            loop {
                let pos = self.peek().position;
                let name = self.var_name()?;
                children.push(self.leaf(NodeKind::VarName, Some(name.text), pos));
                if children.len() > 4 {
                    return Err(self.error_at(
                        ErrorCode::XPST0003,
                        "a catch clause binds at most three variables",
                        pos,
                    ));
                }
                if self.eat(T::Comma).is_none() {
                    break;
                }
            }
            self.expect(T::RParen)?;
        }
        children.push(self.enclosed_expr()?);
        Ok(self.node(NodeKind::Catch, None, start, children))
    }

    fn update_expr(&mut self) -> PResult<NodeId> {
        let start = self.expect(T::KwUpdate)?.position;
        let tok = self.consume();
        match tok.kind {
            T::KwReplace | T::KwValue => {
                let target = self.expr_single()?;
                self.expect(T::KwWith)?;
                let source = self.expr_single()?;
                let kind = if tok.is(T::KwReplace) { NodeKind::UpdateReplace } else { NodeKind::UpdateValue };
                Ok(self.node(kind, None, start, [target, source]))
            }
            T::KwInsert => {
                let source = self.expr_single()?;
                let mode = match self.peek_kind() {
                    T::KwInto => Some("into"),
                    T::KwPreceding => Some("preceding"),
                    T::KwFollowing => Some("following"),
                    _ => None,
                };
                if mode.is_some() {
                    self.consume();
                }
                let target = self.expr_single()?;
                Ok(self.node(NodeKind::UpdateInsert, mode.map(Into::into), start, [source, target]))
            }
            T::KwDelete => {
                let target = self.expr_single()?;
                Ok(self.node(NodeKind::UpdateDelete, None, start, [target]))
            }
            T::KwRename => {
                let target = self.expr_single()?;
                self.expect(T::KwAs)?;
                let name = self.expr_single()?;
                Ok(self.node(NodeKind::UpdateRename, None, start, [target, name]))
            }
            _ => Err(self.unexpected(&tok, "'replace', 'value', 'insert', 'delete' or 'rename'")),
        }
    }

    /// `( (ExprSingle | "?") ** "," )` returned as argument nodes.
    pub(crate) fn argument_list(&mut self) -> PResult<Vec<NodeId>> {
        self.expect(T::LParen)?;
        let mut args = Vec::new();
        if !self.at(T::RParen) {
            loop {
                let tok = self.peek();
                let is_placeholder =
                    tok.is(T::Question) && matches!(self.peek_nth(1).kind, T::Comma | T::RParen);
                if is_placeholder {
                    self.consume();
                    args.push(self.leaf(NodeKind::ArgumentPlaceholder, None, tok.position));
                } else {
                    args.push(self.expr_single()?);
                }
                if self.eat(T::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(T::RParen)?;
        Ok(args)
    }

    pub(crate) fn position_of(&self, id: NodeId) -> Position {
        self.cst.position(id)
    }
}
