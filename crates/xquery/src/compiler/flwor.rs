use super::{CResult, Compiler};
use crate::cst::{NodeId, NodeKind};
use crate::error::ErrorCode;
use crate::expr::{
    BindingExpr, BindingKind, Expr, ExprId, GroupBy, GroupingKey, LogicalOp, OrderBy, OrderSpec, QuantifiedExpr,
    QuantifierKind, SequenceType,
};
use crate::qname::ExpandedName;

/// A compiled `for`/`let`/`count` binding waiting to be folded.
struct Clause {
    node: NodeId,
    kind: BindingKind,
    variable: ExpandedName,
    sequence_type: Option<SequenceType>,
    positional: Option<ExpandedName>,
    allowing_empty: bool,
    input: Option<ExprId>,
    /// Conjunction of the `where` clauses written right after this one.
    where_clause: Option<ExprId>,
}

/// Clauses seen so far, split at `group by`.
#[derive(Default)]
struct Clauses {
    before_group: Vec<Clause>,
    after_group: Vec<Clause>,
    grouped: bool,
    /// `where` directly after `group by`, filtering groups.
    group_where: Option<ExprId>,
}

impl Clauses {
    fn push(&mut self, clause: Clause) {
        if self.grouped {
            self.after_group.push(clause);
        } else {
            self.before_group.push(clause);
        }
    }

    /// Slot of the clause a `where` written now filters.
    fn where_slot(&mut self) -> Option<&mut Option<ExprId>> {
        if self.grouped {
            Some(match self.after_group.last_mut() {
                Some(clause) => &mut clause.where_clause,
                None => &mut self.group_where,
            })
        } else {
            self.before_group.last_mut().map(|clause| &mut clause.where_clause)
        }
    }
}

impl<'a> Compiler<'a> {
    /// Compile the clauses left to right, binding each variable after its
    /// input, then fold the bindings right to left around the return
    /// expression. A `where` filters the clause written just before it;
    /// `order by` and `group by` land on the outermost binding. Clauses
    /// after `group by` fold into the per-group return expression.
    pub(super) fn lower_flwor(&mut self, id: NodeId) -> CResult<ExprId> {
        let mark = self.scope_mark();
        let result = self.lower_flwor_clauses(id);
        self.restore(mark);
        result
    }

    fn lower_flwor_clauses(&mut self, id: NodeId) -> CResult<ExprId> {
        let mut clauses = Clauses::default();
        let mut order_by = None;
        let mut group_keys: Option<Vec<GroupingKey>> = None;
        let mut return_expr = None;

        for &clause in self.children(id) {
            match self.kind(clause) {
                NodeKind::ForClause => {
                    for &binding in self.children(clause) {
                        let compiled = self.lower_for_binding(binding)?;
                        clauses.push(compiled);
                    }
                }
                NodeKind::LetClause => {
                    for &binding in self.children(clause) {
                        let compiled = self.lower_let_binding(binding)?;
                        clauses.push(compiled);
                    }
                }
                NodeKind::CountClause => {
                    let variable = self.variable_name(self.text(clause)?, clause)?;
                    self.bind(variable.clone());
                    clauses.push(Clause {
                        node: clause,
                        kind: BindingKind::Count,
                        variable,
                        sequence_type: None,
                        positional: None,
                        allowing_empty: false,
                        input: None,
                        where_clause: None,
                    });
                }
                NodeKind::WhereClause => {
                    let condition = self.lower_expr(self.child(clause, 0)?)?;
                    let previous = clauses.where_slot().ok_or_else(|| self.malformed(clause))?.take();
                    let combined = match previous {
                        Some(left) => self.add(Expr::Logical { op: LogicalOp::And, left, right: condition }, clause),
                        None => condition,
                    };
                    if let Some(slot) = clauses.where_slot() {
                        *slot = Some(combined);
                    }
                }
                NodeKind::GroupByClause => {
                    if clauses.grouped {
                        return Err(self.err(
                            ErrorCode::XPST0003,
                            "only one group by clause is supported per FLWOR expression",
                            clause,
                        ));
                    }
                    group_keys = Some(self.lower_group_by(clause)?);
                    clauses.grouped = true;
                }
                NodeKind::OrderByClause => order_by = Some(self.lower_order_by(clause)?),
                NodeKind::ReturnClause => return_expr = Some(self.lower_expr(self.child(clause, 0)?)?),
                _ => return Err(self.malformed(clause)),
            }
        }

        let Some(return_expr) = return_expr else {
            return Err(self.malformed(id));
        };
        let Clauses { before_group, after_group, group_where, .. } = clauses;
        let per_group = self.fold_bindings(after_group, return_expr, None, None);
        let group_by =
            group_keys.map(|keys| GroupBy { keys, where_clause: group_where, return_expr: per_group });
        Ok(self.fold_bindings(before_group, per_group, order_by, group_by))
    }

    fn fold_bindings(
        &mut self,
        clauses: Vec<Clause>,
        mut body: ExprId,
        mut order_by: Option<OrderBy>,
        mut group_by: Option<GroupBy>,
    ) -> ExprId {
        for (i, clause) in clauses.into_iter().enumerate().rev() {
            let outermost = i == 0;
            let binding = BindingExpr {
                kind: clause.kind,
                variable: clause.variable,
                sequence_type: clause.sequence_type,
                positional: clause.positional,
                allowing_empty: clause.allowing_empty,
                input: clause.input,
                where_clause: clause.where_clause,
                body,
                order_by: if outermost { order_by.take() } else { None },
                group_by: if outermost { group_by.take() } else { None },
            };
            body = self.add(Expr::Binding(Box::new(binding)), clause.node);
        }
        body
    }

    /// `$v (as T)? (allowing empty)? (at $p)? in Expr`
    fn lower_for_binding(&mut self, id: NodeId) -> CResult<Clause> {
        let variable = self.variable_name(self.text(id)?, id)?;
        let mut sequence_type = None;
        let mut positional = None;
        let mut allowing_empty = false;
        let mut input = None;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::SequenceType | NodeKind::EmptySequenceType => {
                    sequence_type = Some(self.lower_seq_type(child)?);
                }
                NodeKind::AllowingEmpty => allowing_empty = true,
                NodeKind::PositionalVar => {
                    let name = self.variable_name(self.text(child)?, child)?;
                    if name == variable {
                        return Err(self.err(
                            ErrorCode::XQST0089,
                            format!("positional variable ${name} has the same name as its range variable"),
                            child,
                        ));
                    }
                    positional = Some(name);
                }
                _ => input = Some(self.lower_expr(child)?),
            }
        }
        let input = input.ok_or_else(|| self.malformed(id))?;
        self.bind(variable.clone());
        if let Some(pos) = &positional {
            self.bind(pos.clone());
        }
        Ok(Clause {
            node: id,
            kind: BindingKind::For,
            variable,
            sequence_type,
            positional,
            allowing_empty,
            input: Some(input),
            where_clause: None,
        })
    }

    /// `$v (as T)? := Expr`
    fn lower_let_binding(&mut self, id: NodeId) -> CResult<Clause> {
        let variable = self.variable_name(self.text(id)?, id)?;
        let mut sequence_type = None;
        let mut input = None;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::SequenceType | NodeKind::EmptySequenceType => {
                    sequence_type = Some(self.lower_seq_type(child)?);
                }
                _ => input = Some(self.lower_expr(child)?),
            }
        }
        let input = input.ok_or_else(|| self.malformed(id))?;
        self.bind(variable.clone());
        Ok(Clause {
            node: id,
            kind: BindingKind::Let,
            variable,
            sequence_type,
            positional: None,
            allowing_empty: false,
            input: Some(input),
            where_clause: None,
        })
    }

    /// `group by $k (:= Expr)? (collation "uri")?, ...`. A spec without an
    /// expression groups on an existing variable of the same name.
    fn lower_group_by(&mut self, id: NodeId) -> CResult<Vec<GroupingKey>> {
        let mut keys = Vec::new();
        for &spec in self.children(id) {
            let variable = self.variable_name(self.text(spec)?, spec)?;
            let mut key = None;
            let mut collation = None;
            for &child in self.children(spec) {
                match self.kind(child) {
                    NodeKind::Collation => collation = Some(self.collation(child)?),
                    NodeKind::SequenceType | NodeKind::EmptySequenceType => {
                        self.lower_seq_type(child)?;
                    }
                    _ => key = Some(self.lower_expr(child)?),
                }
            }
            let key = match key {
                Some(key) => key,
                None => {
                    if !self.locals.contains(&variable) {
                        return Err(self.err(
                            ErrorCode::XQST0094,
                            format!("grouping variable ${variable} is not bound by a preceding clause"),
                            spec,
                        ));
                    }
                    self.add(Expr::VariableRef(variable.clone()), spec)
                }
            };
            self.bind(variable.clone());
            keys.push(GroupingKey { variable, key, collation });
        }
        Ok(keys)
    }

    fn lower_order_by(&mut self, id: NodeId) -> CResult<OrderBy> {
        let stable = self.cst.text(id) == Some("stable");
        let mut specs = Vec::new();
        for &spec in self.children(id) {
            let key = self.lower_expr(self.child(spec, 0)?)?;
            let mut order = OrderSpec { key, descending: false, empty_greatest: None, collation: None };
            for &modifier in &self.children(spec)[1..] {
                match self.kind(modifier) {
                    NodeKind::Ascending => order.descending = false,
                    NodeKind::Descending => order.descending = true,
                    NodeKind::EmptyGreatest => order.empty_greatest = Some(true),
                    NodeKind::EmptyLeast => order.empty_greatest = Some(false),
                    NodeKind::Collation => order.collation = Some(self.collation(modifier)?),
                    _ => return Err(self.malformed(modifier)),
                }
            }
            specs.push(order);
        }
        Ok(OrderBy { stable, specs })
    }

    /// Collation URI of an `order by` or `group by` spec, resolved against
    /// the base URI and checked against the known collations.
    fn collation(&self, id: NodeId) -> CResult<String> {
        let uri = self.ctx.resolve_uri(self.text(id)?);
        if !self.ctx.is_known_collation(&uri) {
            return Err(self.err(ErrorCode::XQST0076, format!("unknown collation {uri}"), id));
        }
        Ok(uri)
    }

    /// `some`/`every` bindings folded right to left around `satisfies`.
    pub(super) fn lower_quantified(&mut self, id: NodeId) -> CResult<ExprId> {
        let kind = match self.kind(id) {
            NodeKind::SomeExpr => QuantifierKind::Some,
            _ => QuantifierKind::Every,
        };
        let mark = self.scope_mark();
        let result = self.lower_quantified_bindings(id, kind);
        self.restore(mark);
        result
    }

    fn lower_quantified_bindings(&mut self, id: NodeId, kind: QuantifierKind) -> CResult<ExprId> {
        let mut bindings = Vec::new();
        let mut satisfies = None;
        for &child in self.children(id) {
            match self.kind(child) {
                NodeKind::VariableBinding => {
                    let variable = self.variable_name(self.text(child)?, child)?;
                    let mut sequence_type = None;
                    let mut input = None;
                    for &part in self.children(child) {
                        match self.kind(part) {
                            NodeKind::SequenceType | NodeKind::EmptySequenceType => {
                                sequence_type = Some(self.lower_seq_type(part)?);
                            }
                            _ => input = Some(self.lower_expr(part)?),
                        }
                    }
                    let input = input.ok_or_else(|| self.malformed(child))?;
                    self.bind(variable.clone());
                    bindings.push((child, variable, sequence_type, input));
                }
                NodeKind::Satisfies => satisfies = Some(self.lower_expr(self.child(child, 0)?)?),
                _ => return Err(self.malformed(child)),
            }
        }
        let mut body = satisfies.ok_or_else(|| self.malformed(id))?;
        for (node, variable, sequence_type, input) in bindings.into_iter().rev() {
            let quantified = QuantifiedExpr { kind, variable, sequence_type, input, satisfies: body };
            body = self.add(Expr::Quantified(Box::new(quantified)), node);
        }
        Ok(body)
    }
}
