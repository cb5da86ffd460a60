#![allow(dead_code)]

//! Tiny evaluator over compiled expression graphs. It covers integers,
//! strings, sequences, FLWOR bindings and user functions, which is enough
//! to check that the compiler folds expressions correctly.

use platynui_xquery::consts::FNS;
use platynui_xquery::expr::{
    ArithmeticOp, Argument, BindingKind, ComparisonKind, ComparisonOp, LiteralKind, LogicalOp, QuantifierKind,
};
use platynui_xquery::{CompiledModule, ExpandedName, Expr, ExprId, compile};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Item {
    Int(i64),
    Str(String),
    Bool(bool),
}

pub fn ints(values: &[i64]) -> Vec<Item> {
    values.iter().copied().map(Item::Int).collect()
}

/// Compile `source` as a main module and evaluate its body.
pub fn eval(source: &str) -> Vec<Item> {
    let module = compile(source).unwrap_or_else(|e| panic!("{source}: {e}"));
    let body = module.body.expect("main module");
    Evaluator { module: &module, env: Vec::new(), counts: HashMap::new() }.eval(body)
}

struct Evaluator<'m> {
    module: &'m CompiledModule,
    env: Vec<(ExpandedName, Vec<Item>)>,
    /// Tuples seen by each `count` binding. Not reset between outer
    /// iterations, so only top-level FLWORs number correctly.
    counts: HashMap<ExprId, i64>,
}

impl Evaluator<'_> {
    fn lookup(&self, name: &ExpandedName) -> Vec<Item> {
        self.env
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| panic!("unbound ${name}"))
    }

    fn with<T>(&mut self, name: &ExpandedName, value: Vec<Item>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.env.push((name.clone(), value));
        let out = f(self);
        self.env.pop();
        out
    }

    fn int(&mut self, id: ExprId) -> i64 {
        match self.eval(id).as_slice() {
            [Item::Int(i)] => *i,
            other => panic!("expected one integer, got {other:?}"),
        }
    }

    fn ebv(&mut self, id: ExprId) -> bool {
        match self.eval(id).as_slice() {
            [] => false,
            [Item::Bool(b)] => *b,
            [Item::Int(i)] => *i != 0,
            [Item::Str(s)] => !s.is_empty(),
            other => panic!("no effective boolean value for {other:?}"),
        }
    }

    fn eval(&mut self, id: ExprId) -> Vec<Item> {
        let module = self.module;
        match module.graph.get(id) {
            Expr::Literal { kind: LiteralKind::Integer, text } => vec![Item::Int(text.parse().expect("integer"))],
            Expr::Literal { kind: LiteralKind::String, text } => vec![Item::Str(text.to_string())],
            Expr::EmptySequence => Vec::new(),
            Expr::Sequence(items) => items.iter().flat_map(|&i| self.eval(i)).collect(),
            Expr::VariableRef(name) => self.lookup(name),
            Expr::Arithmetic { op, left, right } => {
                let (l, r) = (self.int(*left), self.int(*right));
                let value = match op {
                    ArithmeticOp::Add => l + r,
                    ArithmeticOp::Sub => l - r,
                    ArithmeticOp::Mul => l * r,
                    ArithmeticOp::IDiv | ArithmeticOp::Div => l / r,
                    ArithmeticOp::Mod => l % r,
                };
                vec![Item::Int(value)]
            }
            Expr::Unary { negate, operand } => {
                let v = self.int(*operand);
                vec![Item::Int(if *negate { -v } else { v })]
            }
            Expr::Range { from, to } => {
                let (from, to) = (self.int(*from), self.int(*to));
                (from..=to).map(Item::Int).collect()
            }
            Expr::Comparison { kind, op, left, right } => {
                let (l, r) = (self.eval(*left), self.eval(*right));
                let holds = |a: &Item, b: &Item| match op {
                    ComparisonOp::Eq => a == b,
                    ComparisonOp::Ne => a != b,
                    ComparisonOp::Lt => a < b,
                    ComparisonOp::Le => a <= b,
                    ComparisonOp::Gt => a > b,
                    ComparisonOp::Ge => a >= b,
                };
                let result = match kind {
                    ComparisonKind::General => l.iter().any(|a| r.iter().any(|b| holds(a, b))),
                    ComparisonKind::Value => match (l.as_slice(), r.as_slice()) {
                        ([a], [b]) => holds(a, b),
                        ([], _) | (_, []) => return Vec::new(),
                        _ => panic!("value comparison of sequences"),
                    },
                };
                vec![Item::Bool(result)]
            }
            Expr::Logical { op, left, right } => {
                let result = match op {
                    LogicalOp::And => self.ebv(*left) && self.ebv(*right),
                    LogicalOp::Or => self.ebv(*left) || self.ebv(*right),
                };
                vec![Item::Bool(result)]
            }
            Expr::Conditional { condition, then_branch, else_branch } => {
                if self.ebv(*condition) { self.eval(*then_branch) } else { self.eval(*else_branch) }
            }
            Expr::Binding(binding) => {
                let input = binding.input.map(|i| self.eval(i)).unwrap_or_default();
                let mut out = Vec::new();
                match binding.kind {
                    BindingKind::For => {
                        for (pos, item) in input.into_iter().enumerate() {
                            self.env.push((binding.variable.clone(), vec![item]));
                            if let Some(p) = &binding.positional {
                                self.env.push((p.clone(), vec![Item::Int(pos as i64 + 1)]));
                            }
                            if binding.where_clause.is_none_or(|w| self.ebv(w)) {
                                out.extend(self.eval(binding.body));
                            }
                            if binding.positional.is_some() {
                                self.env.pop();
                            }
                            self.env.pop();
                        }
                    }
                    BindingKind::Let => {
                        out = self.with(&binding.variable, input, |ev| {
                            if binding.where_clause.is_none_or(|w| ev.ebv(w)) { ev.eval(binding.body) } else { Vec::new() }
                        });
                    }
                    BindingKind::Count => {
                        let n = self.counts.entry(id).or_insert(0);
                        *n += 1;
                        let n = *n;
                        out = self.with(&binding.variable, vec![Item::Int(n)], |ev| {
                            if binding.where_clause.is_none_or(|w| ev.ebv(w)) { ev.eval(binding.body) } else { Vec::new() }
                        });
                    }
                }
                out
            }
            Expr::Quantified(q) => {
                let input = self.eval(q.input);
                let mut results = input.into_iter().map(|item| self.with(&q.variable, vec![item], |ev| ev.ebv(q.satisfies)));
                let holds = match q.kind {
                    QuantifierKind::Some => results.any(|b| b),
                    QuantifierKind::Every => results.all(|b| b),
                };
                vec![Item::Bool(holds)]
            }
            Expr::FunctionCall { name, arguments } => {
                let args: Vec<Vec<Item>> = arguments
                    .iter()
                    .map(|a| match a {
                        Argument::Expr(e) => self.eval(*e),
                        Argument::Placeholder => panic!("partial application"),
                    })
                    .collect();
                self.call(name, args)
            }
            other => panic!("expression not supported by the test evaluator: {other:?}"),
        }
    }

    fn call(&mut self, name: &ExpandedName, args: Vec<Vec<Item>>) -> Vec<Item> {
        if name.ns_uri.as_deref() == Some(FNS) {
            return match (name.local.as_str(), args.as_slice()) {
                ("count", [seq]) => vec![Item::Int(seq.len() as i64)],
                ("sum", [seq]) => vec![Item::Int(
                    seq.iter().map(|i| if let Item::Int(v) = i { *v } else { panic!("sum of {i:?}") }).sum(),
                )],
                _ => panic!("unknown built-in {name}"),
            };
        }
        let module = self.module;
        let function = module.function(name, args.len()).unwrap_or_else(|| panic!("no function {name}"));
        let body = function.body.expect("function body");
        let saved = std::mem::take(&mut self.env);
        for (param, value) in function.signature.params.iter().zip(args) {
            self.env.push((param.name.clone(), value));
        }
        let result = self.eval(body);
        self.env = saved;
        result
    }
}
