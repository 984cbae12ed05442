//! AST traversal.
//!
//! A sum type of visitable node kinds ([`Node`]) with a [`Visitor`] trait
//! exposing one method per kind, plus a [`GenericVisitor`] for quick
//! closure-based traversals and a [`VarCollector`] used by the resolver and
//! the safety analyzer.

use crate::ast::{Body, Expr, ExprTerms, Head, Import, Module, Package, Rule, SomeDecl, Term, With};
use crate::location::Location;
use crate::value::{Ref, Value, Var};
use std::collections::BTreeSet;

/// A reference to any visitable AST node.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Module(&'a Module),
    Package(&'a Package),
    Import(&'a Import),
    Rule(&'a Rule),
    Head(&'a Head),
    Body(&'a Body),
    Expr(&'a Expr),
    With(&'a With),
    SomeDecl(&'a SomeDecl),
    Term(&'a Term),
}

/// Visitor over AST nodes. Each method returns `true` to descend into the
/// node's children and `false` to skip them.
#[allow(unused_variables)]
pub trait Visitor {
    fn visit_module(&mut self, module: &Module) -> bool {
        true
    }
    fn visit_package(&mut self, package: &Package) -> bool {
        true
    }
    fn visit_import(&mut self, import: &Import) -> bool {
        true
    }
    fn visit_rule(&mut self, rule: &Rule) -> bool {
        true
    }
    fn visit_head(&mut self, head: &Head) -> bool {
        true
    }
    fn visit_body(&mut self, body: &Body) -> bool {
        true
    }
    fn visit_expr(&mut self, expr: &Expr) -> bool {
        true
    }
    fn visit_with(&mut self, with: &With) -> bool {
        true
    }
    fn visit_some_decl(&mut self, decl: &SomeDecl) -> bool {
        true
    }
    fn visit_term(&mut self, term: &Term) -> bool {
        true
    }
}

/// Walk a module and its children depth-first.
pub fn walk_module<V: Visitor>(v: &mut V, module: &Module) {
    if !v.visit_module(module) {
        return;
    }
    walk_package(v, &module.package);
    for imp in &module.imports {
        walk_import(v, imp);
    }
    for rule in &module.rules {
        walk_rule(v, rule);
    }
}

/// Walk a package node.
pub fn walk_package<V: Visitor>(v: &mut V, package: &Package) {
    if !v.visit_package(package) {
        return;
    }
    for term in package.path.iter() {
        walk_term(v, term);
    }
}

/// Walk an import node.
pub fn walk_import<V: Visitor>(v: &mut V, import: &Import) {
    if !v.visit_import(import) {
        return;
    }
    walk_term(v, &import.path);
}

/// Walk a rule, its head, body, and `else` chain.
pub fn walk_rule<V: Visitor>(v: &mut V, rule: &Rule) {
    if !v.visit_rule(rule) {
        return;
    }
    walk_head(v, &rule.head);
    walk_body(v, &rule.body);
    if let Some(else_rule) = &rule.else_rule {
        walk_rule(v, else_rule);
    }
}

/// Walk a rule head.
pub fn walk_head<V: Visitor>(v: &mut V, head: &Head) {
    if !v.visit_head(head) {
        return;
    }
    for arg in &head.args {
        walk_term(v, arg);
    }
    if let Some(key) = &head.key {
        walk_term(v, key);
    }
    if let Some(value) = &head.value {
        walk_term(v, value);
    }
}

/// Walk a body.
pub fn walk_body<V: Visitor>(v: &mut V, body: &Body) {
    if !v.visit_body(body) {
        return;
    }
    for expr in body.iter() {
        walk_expr(v, expr);
    }
}

/// Walk an expression, its payload, and its `with` modifiers.
pub fn walk_expr<V: Visitor>(v: &mut V, expr: &Expr) {
    if !v.visit_expr(expr) {
        return;
    }
    match &expr.terms {
        ExprTerms::Term(t) => walk_term(v, t),
        ExprTerms::Call(terms) => {
            for t in terms {
                walk_term(v, t);
            }
        }
        ExprTerms::SomeDecl(decl) => walk_some_decl(v, decl),
    }
    for w in &expr.with {
        walk_with(v, w);
    }
}

/// Walk a `with` modifier.
pub fn walk_with<V: Visitor>(v: &mut V, with: &With) {
    if !v.visit_with(with) {
        return;
    }
    walk_term(v, &with.target);
    walk_term(v, &with.value);
}

/// Walk a `some` declaration.
pub fn walk_some_decl<V: Visitor>(v: &mut V, decl: &SomeDecl) {
    if !v.visit_some_decl(decl) {
        return;
    }
    for sym in &decl.symbols {
        walk_term(v, sym);
    }
}

/// Walk a term and every nested term, including comprehension bodies.
pub fn walk_term<V: Visitor>(v: &mut V, term: &Term) {
    if !v.visit_term(term) {
        return;
    }
    match &term.value {
        Value::Null
        | Value::Boolean(_)
        | Value::Number(_)
        | Value::String(_)
        | Value::Var(_) => {}
        Value::Ref(r) => {
            for t in r.iter() {
                walk_term(v, t);
            }
        }
        Value::Array(arr) => {
            for t in arr.iter() {
                walk_term(v, t);
            }
        }
        Value::Object(obj) => {
            for (k, val) in obj.iter() {
                walk_term(v, k);
                walk_term(v, val);
            }
        }
        Value::Set(set) => {
            for t in set.iter() {
                walk_term(v, t);
            }
        }
        Value::ArrayComprehension(c) => {
            walk_term(v, &c.term);
            walk_body(v, &c.body);
        }
        Value::SetComprehension(c) => {
            walk_term(v, &c.term);
            walk_body(v, &c.body);
        }
        Value::ObjectComprehension(c) => {
            walk_term(v, &c.key);
            walk_term(v, &c.value);
            walk_body(v, &c.body);
        }
        Value::Call(call) => {
            for t in &call.0 {
                walk_term(v, t);
            }
        }
    }
}

/// A visitor built from a closure over [`Node`]. The closure returns `true`
/// to descend into the node's children.
pub struct GenericVisitor<F: FnMut(Node<'_>) -> bool> {
    f: F,
}

impl<F: FnMut(Node<'_>) -> bool> GenericVisitor<F> {
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        GenericVisitor { f }
    }
}

impl<F: FnMut(Node<'_>) -> bool> Visitor for GenericVisitor<F> {
    fn visit_module(&mut self, module: &Module) -> bool {
        (self.f)(Node::Module(module))
    }
    fn visit_package(&mut self, package: &Package) -> bool {
        (self.f)(Node::Package(package))
    }
    fn visit_import(&mut self, import: &Import) -> bool {
        (self.f)(Node::Import(import))
    }
    fn visit_rule(&mut self, rule: &Rule) -> bool {
        (self.f)(Node::Rule(rule))
    }
    fn visit_head(&mut self, head: &Head) -> bool {
        (self.f)(Node::Head(head))
    }
    fn visit_body(&mut self, body: &Body) -> bool {
        (self.f)(Node::Body(body))
    }
    fn visit_expr(&mut self, expr: &Expr) -> bool {
        (self.f)(Node::Expr(expr))
    }
    fn visit_with(&mut self, with: &With) -> bool {
        (self.f)(Node::With(with))
    }
    fn visit_some_decl(&mut self, decl: &SomeDecl) -> bool {
        (self.f)(Node::SomeDecl(decl))
    }
    fn visit_term(&mut self, term: &Term) -> bool {
        (self.f)(Node::Term(term))
    }
}

/// Flags controlling which variables a [`VarCollector`] records.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarVisitorParams {
    /// Do not descend into comprehension terms.
    pub skip_closures: bool,
    /// Do not record variables appearing in object keys.
    pub skip_object_keys: bool,
    /// Do not record the head variable of references.
    pub skip_ref_heads: bool,
    /// Do not record variables in call operator positions.
    pub skip_call_operators: bool,
    /// Do not record variables in `with` modifier targets.
    pub skip_with_targets: bool,
}

/// Collects variables from AST nodes, preserving first-seen order and the
/// location of the first occurrence of each variable.
#[derive(Debug, Default)]
pub struct VarCollector {
    params: VarVisitorParams,
    seen: BTreeSet<Var>,
    vars: Vec<(Var, Option<Location>)>,
}

impl VarCollector {
    /// Create a collector with the given parameters.
    pub fn new(params: VarVisitorParams) -> Self {
        VarCollector {
            params,
            seen: BTreeSet::new(),
            vars: Vec::new(),
        }
    }

    /// The collected variables in first-seen order.
    pub fn into_vars(self) -> Vec<(Var, Option<Location>)> {
        self.vars
    }

    /// The collected variable names as a set.
    pub fn into_set(self) -> BTreeSet<Var> {
        self.seen
    }

    fn record(&mut self, var: &Var, location: Option<&Location>) {
        if self.seen.insert(var.clone()) {
            self.vars.push((var.clone(), location.cloned()));
        }
    }

    /// Collect variables from an expression, honoring the parameters.
    pub fn collect_expr(&mut self, expr: &Expr) {
        match &expr.terms {
            ExprTerms::Term(t) => self.collect_term(t),
            ExprTerms::Call(terms) => {
                if let Some((op, args)) = terms.split_first() {
                    if !self.params.skip_call_operators {
                        self.collect_term(op);
                    }
                    for a in args {
                        self.collect_term(a);
                    }
                }
            }
            ExprTerms::SomeDecl(decl) => {
                for sym in &decl.symbols {
                    self.collect_term(sym);
                }
            }
        }
        for w in &expr.with {
            if !self.params.skip_with_targets {
                self.collect_term(&w.target);
            }
            self.collect_term(&w.value);
        }
    }

    /// Collect variables from a body.
    pub fn collect_body(&mut self, body: &Body) {
        for expr in body.iter() {
            self.collect_expr(expr);
        }
    }

    /// Collect variables from a term.
    pub fn collect_term(&mut self, term: &Term) {
        match &term.value {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {}
            Value::Var(v) => self.record(v, term.location.as_ref()),
            Value::Ref(r) => self.collect_ref(r),
            Value::Array(arr) => {
                for t in arr.iter() {
                    self.collect_term(t);
                }
            }
            Value::Object(obj) => {
                for (k, v) in obj.iter() {
                    if !self.params.skip_object_keys {
                        self.collect_term(k);
                    }
                    self.collect_term(v);
                }
            }
            Value::Set(set) => {
                for t in set.iter() {
                    self.collect_term(t);
                }
            }
            Value::ArrayComprehension(c) => {
                if !self.params.skip_closures {
                    self.collect_term(&c.term);
                    self.collect_body(&c.body);
                }
            }
            Value::SetComprehension(c) => {
                if !self.params.skip_closures {
                    self.collect_term(&c.term);
                    self.collect_body(&c.body);
                }
            }
            Value::ObjectComprehension(c) => {
                if !self.params.skip_closures {
                    self.collect_term(&c.key);
                    self.collect_term(&c.value);
                    self.collect_body(&c.body);
                }
            }
            Value::Call(call) => {
                if let Some((op, args)) = call.0.split_first() {
                    if !self.params.skip_call_operators {
                        self.collect_term(op);
                    }
                    for a in args {
                        self.collect_term(a);
                    }
                }
            }
        }
    }

    fn collect_ref(&mut self, r: &Ref) {
        if let Some((head, operands)) = r.0.split_first() {
            if !self.params.skip_ref_heads {
                self.collect_term(head);
            }
            for op in operands {
                self.collect_term(op);
            }
        }
    }
}

/// Collect every variable in a term with no exclusions.
pub fn term_vars(term: &Term) -> BTreeSet<Var> {
    let mut c = VarCollector::new(VarVisitorParams::default());
    c.collect_term(term);
    c.into_set()
}

/// Collect the references appearing in an expression's payload and `with`
/// values, skipping comprehension interiors and call operator positions.
///
/// Nested references are reported as separate entries after their parent.
pub fn expr_refs(expr: &Expr) -> Vec<Ref> {
    let mut out = Vec::new();
    match &expr.terms {
        ExprTerms::Term(t) => collect_refs_in_term(t, &mut out),
        ExprTerms::Call(terms) => {
            for t in terms.iter().skip(1) {
                collect_refs_in_term(t, &mut out);
            }
        }
        ExprTerms::SomeDecl(decl) => {
            for sym in &decl.symbols {
                collect_refs_in_term(sym, &mut out);
            }
        }
    }
    for w in &expr.with {
        collect_refs_in_term(&w.value, &mut out);
    }
    out
}

pub(crate) fn collect_refs_in_term(term: &Term, out: &mut Vec<Ref>) {
    match &term.value {
        Value::Ref(r) => {
            out.push(r.clone());
            for op in r.operands() {
                collect_refs_in_term(op, out);
            }
        }
        Value::Array(arr) => {
            for t in arr.iter() {
                collect_refs_in_term(t, out);
            }
        }
        Value::Object(obj) => {
            for (k, v) in obj.iter() {
                collect_refs_in_term(k, out);
                collect_refs_in_term(v, out);
            }
        }
        Value::Set(set) => {
            for t in set.iter() {
                collect_refs_in_term(t, out);
            }
        }
        Value::Call(call) => {
            for t in call.args() {
                collect_refs_in_term(t, out);
            }
        }
        // Comprehension interiors are analyzed in their own scope.
        Value::ArrayComprehension(_)
        | Value::SetComprehension(_)
        | Value::ObjectComprehension(_) => {}
        _ => {}
    }
}
