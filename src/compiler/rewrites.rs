//! Expression rewriting stages.
//!
//! These stages normalize surface syntax into the canonical low-level form
//! the safety analyzer and evaluator expect:
//!
//! - `:=` assignments, `some` declarations, and wildcards become fresh
//!   locals (`RewriteLocalVars`).
//! - Rule heads lose references: `p[foo[i]]` becomes `p[__local0__]` with
//!   `__local0__ = foo[i]` prepended to the body (`RewriteRuleHeadRefs`).
//! - Top-level `==` is lowered to unification (`RewriteEquals`).
//! - Nested calls and dynamic subterms are extracted into preceding
//!   `local = subterm` expressions (`RewriteDynamicTerms`).
//! - Comprehension output terms become scalars or variables
//!   (`RewriteComprehensionTerms`).
//! - `with` modifier values become pre-bound locals and targets are
//!   validated (`RewriteWithModifiers`).
//! - `print` calls are erased or lowered to `internal.print`
//!   (`RewritePrintCalls`).

use crate::ast::visit::{VarCollector, VarVisitorParams};
use crate::ast::{
    operator_ref, Body, Expr, ExprTerms, Module, Rule, Term, OP_EQ, OP_PRINT, OP_PRINT_INTERNAL,
    ROOT_DOCUMENT_NAMES,
};
use crate::compiler::locals::LocalVarGenerator;
use crate::errors::Error;
use crate::value::{
    Array, Call, Object, Ref, Set, SetComprehension, Value, Var,
};
use std::collections::{BTreeMap, BTreeSet};

/// Apply `f` to a rule and every element of its `else` chain.
pub(crate) fn for_each_rule_mut(module: &mut Module, f: &mut impl FnMut(&mut Rule)) {
    for rule in &mut module.rules {
        visit_chain_mut(rule, f);
    }
}

fn visit_chain_mut(rule: &mut Rule, f: &mut impl FnMut(&mut Rule)) {
    f(rule);
    if let Some(else_rule) = &mut rule.else_rule {
        visit_chain_mut(else_rule, f);
    }
}

// ============================================================================
// RewriteLocalVars
// ============================================================================

#[derive(Debug, Default)]
struct Scope {
    declared: BTreeMap<Var, Var>,
    used: BTreeSet<Var>,
}

struct LocalRewriter<'a> {
    gen: &'a mut LocalVarGenerator,
    errors: Vec<Error>,
}

/// Rewrite `:=` assignments, `some` declarations, and wildcards into fresh
/// locals, scoped per body with comprehension bodies introducing nested
/// scopes. Declared variables are substituted into the rule head as well.
pub fn rewrite_local_vars(module: &mut Module, gen: &mut LocalVarGenerator) -> Vec<Error> {
    let mut rewriter = LocalRewriter {
        gen,
        errors: Vec::new(),
    };
    for_each_rule_mut(module, &mut |rule| rewriter.rewrite_rule(rule));
    rewriter.errors
}

/// Query-body variant of [`rewrite_local_vars`].
pub fn rewrite_local_vars_in_body(body: &mut Body, gen: &mut LocalVarGenerator) -> Vec<Error> {
    let mut rewriter = LocalRewriter {
        gen,
        errors: Vec::new(),
    };
    let mut stack = vec![Scope::default()];
    let taken = std::mem::take(body);
    *body = rewriter.process_body(taken, &mut stack);
    rewriter.errors
}

impl LocalRewriter<'_> {
    fn rewrite_rule(&mut self, rule: &mut Rule) {
        let mut stack = vec![Scope::default()];

        // Wildcard arguments each become a distinct fresh local.
        for arg in &mut rule.head.args {
            self.substitute_term(arg, &mut stack);
        }

        let body = std::mem::take(&mut rule.body);
        rule.body = self.process_body(body, &mut stack);

        // Variables declared in the body are visible from the head.
        if let Some(key) = &mut rule.head.key {
            self.substitute_term(key, &mut stack);
        }
        if let Some(value) = &mut rule.head.value {
            self.substitute_term(value, &mut stack);
        }
    }

    /// Process a body in the scope on top of `stack`. The scope stays on the
    /// stack so callers can substitute sibling terms (rule heads,
    /// comprehension output terms) before popping.
    fn process_body(&mut self, body: Body, stack: &mut Vec<Scope>) -> Body {
        let mut out = Body::new();
        for mut expr in body.0 {
            match &expr.terms {
                ExprTerms::SomeDecl(_) => {
                    self.lower_some_decl(expr, stack, &mut out);
                }
                ExprTerms::Call(_) if expr.is_assignment() => {
                    self.lower_assignment(&mut expr, stack);
                    out.push(expr);
                }
                _ => {
                    self.record_used(&expr, stack);
                    self.substitute_expr(&mut expr, stack);
                    out.push(expr);
                }
            }
        }
        out
    }

    fn lower_some_decl(&mut self, expr: Expr, stack: &mut Vec<Scope>, out: &mut Body) {
        let location = expr.location.clone();
        let ExprTerms::SomeDecl(decl) = expr.terms else {
            return;
        };
        for sym in decl.symbols {
            match sym.value {
                Value::Var(v) => {
                    if !v.is_wildcard() {
                        self.declare(v, &sym.location.get().or_else(|| location.get()), stack);
                    }
                }
                Value::Call(call) => {
                    // `some k, v in xs`: the collection is rewritten in the
                    // enclosing scope first, then the iteration variables
                    // become fresh locals.
                    let mut terms = call.0;
                    if let Some(collection) = terms.last_mut() {
                        self.record_used_term(collection, stack);
                        self.substitute_term(collection, stack);
                    }
                    let last = terms.len().saturating_sub(1);
                    for iter_var in &mut terms[1..last] {
                        let loc = iter_var.location.get();
                        if let Value::Var(v) = iter_var.value.clone() {
                            let local = if v.is_wildcard() {
                                self.gen.next_var()
                            } else {
                                self.declare(v, &loc, stack)
                            };
                            iter_var.value = Value::Var(local);
                        }
                    }
                    let mut member = Expr::new_call(terms);
                    member.location = location.clone();
                    out.push(member);
                }
                _ => {}
            }
        }
    }

    fn lower_assignment(&mut self, expr: &mut Expr, stack: &mut Vec<Scope>) {
        if expr.negated {
            self.errors.push(Error::compile(
                expr.location.get(),
                "cannot assign vars inside negated expression",
            ));
            return;
        }
        let ExprTerms::Call(terms) = &mut expr.terms else {
            return;
        };
        if terms.len() != 3 {
            return;
        }

        // Right-hand side first: it refers to the scope before the
        // declaration takes effect.
        self.record_used_term(&terms[2], stack);
        let mut rhs = terms[2].clone();
        self.substitute_term(&mut rhs, stack);

        let lhs_loc = terms[1].location.get();
        let local = match &terms[1].value {
            Value::Var(v) if v.is_wildcard() => self.gen.next_var(),
            Value::Var(v) => self.declare(v.clone(), &lhs_loc, stack),
            other => {
                self.errors.push(Error::compile(
                    lhs_loc,
                    format!("cannot assign to {}", other.type_name()),
                ));
                return;
            }
        };

        let op_loc = terms[0].location.clone();
        expr.terms = ExprTerms::Call(vec![
            Term {
                value: Value::Ref(operator_ref(OP_EQ)),
                location: op_loc,
            },
            Term {
                value: Value::Var(local),
                location: lhs_loc.into(),
            },
            rhs,
        ]);
    }

    fn declare(
        &mut self,
        var: Var,
        location: &Option<crate::location::Location>,
        stack: &mut Vec<Scope>,
    ) -> Var {
        let scope = stack.last_mut().expect("scope stack is never empty");
        if scope.declared.contains_key(&var) {
            self.errors.push(Error::compile(
                location.clone(),
                format!("var {var} assigned above"),
            ));
            return scope.declared[&var].clone();
        }
        if scope.used.contains(&var) {
            self.errors.push(Error::compile(
                location.clone(),
                format!("var {var} referenced above"),
            ));
        }
        let local = self.gen.next_var();
        scope.declared.insert(var, local.clone());
        local
    }

    fn record_used(&mut self, expr: &Expr, stack: &mut [Scope]) {
        let mut collector = VarCollector::new(VarVisitorParams {
            skip_call_operators: true,
            skip_with_targets: true,
            ..VarVisitorParams::default()
        });
        collector.collect_expr(expr);
        if let Some(scope) = stack.last_mut() {
            scope
                .used
                .extend(collector.into_set().into_iter().filter(|v| !v.is_wildcard()));
        }
    }

    fn record_used_term(&mut self, term: &Term, stack: &mut [Scope]) {
        let mut collector = VarCollector::new(VarVisitorParams {
            skip_call_operators: true,
            ..VarVisitorParams::default()
        });
        collector.collect_term(term);
        if let Some(scope) = stack.last_mut() {
            scope
                .used
                .extend(collector.into_set().into_iter().filter(|v| !v.is_wildcard()));
        }
    }

    fn substitute_expr(&mut self, expr: &mut Expr, stack: &mut Vec<Scope>) {
        match &mut expr.terms {
            ExprTerms::Term(t) => self.substitute_term(t, stack),
            ExprTerms::Call(terms) => {
                for t in terms.iter_mut().skip(1) {
                    self.substitute_term(t, stack);
                }
            }
            ExprTerms::SomeDecl(_) => {}
        }
        for w in &mut expr.with {
            self.substitute_term(&mut w.target, stack);
            self.substitute_term(&mut w.value, stack);
        }
    }

    fn substitute_term(&mut self, term: &mut Term, stack: &mut Vec<Scope>) {
        match &mut term.value {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {}
            Value::Var(v) => {
                if v.is_wildcard() {
                    term.value = Value::Var(self.gen.next_var());
                } else if let Some(local) = lookup(stack, v) {
                    term.value = Value::Var(local);
                }
            }
            Value::Ref(r) => {
                for t in r.0.iter_mut() {
                    self.substitute_term(t, stack);
                }
            }
            Value::Array(arr) => {
                for t in arr.0.iter_mut() {
                    self.substitute_term(t, stack);
                }
            }
            Value::Object(obj) => {
                let pairs: Vec<(Term, Term)> = obj
                    .iter()
                    .map(|(k, v)| {
                        let mut k = k.clone();
                        let mut v = v.clone();
                        self.substitute_term(&mut k, stack);
                        self.substitute_term(&mut v, stack);
                        (k, v)
                    })
                    .collect();
                *obj = Object::from_pairs(pairs);
            }
            Value::Set(set) => {
                let elems: Vec<Term> = set
                    .iter()
                    .map(|t| {
                        let mut t = t.clone();
                        self.substitute_term(&mut t, stack);
                        t
                    })
                    .collect();
                *set = Set::from_elems(elems);
            }
            Value::ArrayComprehension(c) => {
                stack.push(Scope::default());
                let body = std::mem::take(&mut c.body);
                c.body = self.process_body(body, stack);
                self.substitute_term(&mut c.term, stack);
                stack.pop();
            }
            Value::SetComprehension(c) => {
                stack.push(Scope::default());
                let body = std::mem::take(&mut c.body);
                c.body = self.process_body(body, stack);
                self.substitute_term(&mut c.term, stack);
                stack.pop();
            }
            Value::ObjectComprehension(c) => {
                stack.push(Scope::default());
                let body = std::mem::take(&mut c.body);
                c.body = self.process_body(body, stack);
                self.substitute_term(&mut c.key, stack);
                self.substitute_term(&mut c.value, stack);
                stack.pop();
            }
            Value::Call(Call(terms)) => {
                for t in terms.iter_mut().skip(1) {
                    self.substitute_term(t, stack);
                }
            }
        }
    }
}

fn lookup(stack: &[Scope], var: &Var) -> Option<Var> {
    stack
        .iter()
        .rev()
        .find_map(|scope| scope.declared.get(var).cloned())
}

// ============================================================================
// RewriteRuleHeadRefs
// ============================================================================

/// Replace rule-head keys and values that require evaluation with fresh
/// locals bound by equalities prepended to the body. Also rejects function
/// arguments containing calls or references.
pub fn rewrite_rule_head_refs(module: &mut Module, gen: &mut LocalVarGenerator) -> Vec<Error> {
    let mut errors = Vec::new();
    for_each_rule_mut(module, &mut |rule| {
        for arg in &rule.head.args {
            if term_contains(arg, &|v| matches!(v, Value::Call(_))) {
                errors.push(Error::compile(
                    arg.location.get(),
                    "args must not contain calls",
                ));
            } else if term_contains(arg, &|v| matches!(v, Value::Ref(_))) {
                errors.push(Error::compile(
                    arg.location.get(),
                    "args must not contain refs",
                ));
            }
        }

        let mut prepend = Vec::new();
        if let Some(key) = &mut rule.head.key {
            if key.value.requires_eval() {
                let local = Term {
                    value: Value::Var(gen.next_var()),
                    location: key.location.clone(),
                };
                prepend.push(Expr::generated_eq(local.clone(), key.clone()));
                *key = local;
            }
        }
        if let Some(value) = &mut rule.head.value {
            if value.value.requires_eval() {
                let local = Term {
                    value: Value::Var(gen.next_var()),
                    location: value.location.clone(),
                };
                prepend.push(Expr::generated_eq(local.clone(), value.clone()));
                *value = local;
            }
        }
        if !prepend.is_empty() {
            prepend.append(&mut rule.body.0);
            rule.body.0 = prepend;
            rule.body.reindex();
        }
    });
    errors
}

/// True when any subterm (excluding call operator positions) satisfies the
/// predicate.
fn term_contains(term: &Term, pred: &dyn Fn(&Value) -> bool) -> bool {
    if pred(&term.value) {
        return true;
    }
    match &term.value {
        Value::Ref(r) => r.iter().skip(1).any(|t| term_contains(t, pred)),
        Value::Array(arr) => arr.iter().any(|t| term_contains(t, pred)),
        Value::Object(obj) => obj
            .iter()
            .any(|(k, v)| term_contains(k, pred) || term_contains(v, pred)),
        Value::Set(set) => set.iter().any(|t| term_contains(t, pred)),
        Value::Call(call) => call.args().iter().any(|t| term_contains(t, pred)),
        _ => false,
    }
}

// ============================================================================
// RewriteEquals
// ============================================================================

/// Lower top-level `==` expressions to unification. Nested `==` remains a
/// boolean-valued call.
pub fn rewrite_equals(module: &mut Module) {
    for_each_rule_mut(module, &mut |rule| {
        rewrite_equals_in_body(&mut rule.body);
    });
}

/// Body-level variant of [`rewrite_equals`], applied recursively to
/// comprehension bodies.
pub fn rewrite_equals_in_body(body: &mut Body) {
    for expr in body.iter_mut() {
        if expr.operator_name().as_deref() == Some(crate::ast::OP_EQUAL) {
            if let ExprTerms::Call(terms) = &mut expr.terms {
                if terms.len() == 3 {
                    let location = terms[0].location.clone();
                    terms[0] = Term {
                        value: Value::Ref(operator_ref(OP_EQ)),
                        location,
                    };
                }
            }
        }
        for_each_closure_body_in_expr(expr, &mut rewrite_equals_in_body);
    }
}

/// Apply `f` to every comprehension body nested in the expression.
fn for_each_closure_body_in_expr(expr: &mut Expr, f: &mut impl FnMut(&mut Body)) {
    match &mut expr.terms {
        ExprTerms::Term(t) => for_each_closure_body_in_term(t, f),
        ExprTerms::Call(terms) => {
            for t in terms.iter_mut() {
                for_each_closure_body_in_term(t, f);
            }
        }
        ExprTerms::SomeDecl(decl) => {
            for sym in &mut decl.symbols {
                for_each_closure_body_in_term(sym, f);
            }
        }
    }
    for w in &mut expr.with {
        for_each_closure_body_in_term(&mut w.value, f);
    }
}

fn for_each_closure_body_in_term(term: &mut Term, f: &mut impl FnMut(&mut Body)) {
    match &mut term.value {
        Value::Ref(r) => {
            for t in r.0.iter_mut() {
                for_each_closure_body_in_term(t, f);
            }
        }
        Value::Array(arr) => {
            for t in arr.0.iter_mut() {
                for_each_closure_body_in_term(t, f);
            }
        }
        Value::Object(obj) => {
            let pairs: Vec<(Term, Term)> = obj
                .iter()
                .map(|(k, v)| {
                    let mut k = k.clone();
                    let mut v = v.clone();
                    for_each_closure_body_in_term(&mut k, f);
                    for_each_closure_body_in_term(&mut v, f);
                    (k, v)
                })
                .collect();
            *obj = Object::from_pairs(pairs);
        }
        Value::Set(set) => {
            let elems: Vec<Term> = set
                .iter()
                .map(|t| {
                    let mut t = t.clone();
                    for_each_closure_body_in_term(&mut t, f);
                    t
                })
                .collect();
            *set = Set::from_elems(elems);
        }
        Value::ArrayComprehension(c) => {
            f(&mut c.body);
            for_each_closure_body_in_term(&mut c.term, f);
        }
        Value::SetComprehension(c) => {
            f(&mut c.body);
            for_each_closure_body_in_term(&mut c.term, f);
        }
        Value::ObjectComprehension(c) => {
            f(&mut c.body);
            for_each_closure_body_in_term(&mut c.key, f);
            for_each_closure_body_in_term(&mut c.value, f);
        }
        Value::Call(Call(terms)) => {
            for t in terms.iter_mut().skip(1) {
                for_each_closure_body_in_term(t, f);
            }
        }
        _ => {}
    }
}

// ============================================================================
// RewriteDynamicTerms
// ============================================================================

/// Extract nested calls and dynamic subterms into preceding `local =
/// subterm` expressions. Comprehension bodies are rewritten within
/// themselves: extractions stay local to the body that contains them.
pub fn rewrite_dynamic_terms(module: &mut Module, gen: &mut LocalVarGenerator) {
    for_each_rule_mut(module, &mut |rule| {
        rewrite_dynamics_in_body(&mut rule.body, gen);
    });
}

/// Body-level variant of [`rewrite_dynamic_terms`].
pub fn rewrite_dynamics_in_body(body: &mut Body, gen: &mut LocalVarGenerator) {
    let exprs = std::mem::take(&mut body.0);
    let mut out: Vec<Expr> = Vec::with_capacity(exprs.len());
    for mut expr in exprs {
        for_each_closure_body_in_expr(&mut expr, &mut |closure_body| {
            rewrite_dynamics_in_body(closure_body, gen);
        });

        let mut pre = Vec::new();
        match &mut expr.terms {
            ExprTerms::Call(terms) => {
                let is_eq = terms
                    .first()
                    .and_then(|t| t.value.as_ref_value())
                    .and_then(crate::ast::operator_name)
                    .as_deref()
                    == Some(OP_EQ);
                if is_eq && terms.len() == 3 {
                    rewrite_eq_operand(&mut terms[1], gen, &mut pre);
                    rewrite_eq_operand(&mut terms[2], gen, &mut pre);
                } else {
                    for t in terms.iter_mut().skip(1) {
                        rewrite_call_arg(t, gen, &mut pre);
                    }
                }
            }
            ExprTerms::Term(t) => match &mut t.value {
                Value::Ref(r) => rewrite_ref_operands(r, gen, &mut pre),
                Value::Array(_) | Value::Object(_) | Value::Set(_) => {
                    rewrite_composite_interior(t, gen, &mut pre);
                }
                _ => {}
            },
            ExprTerms::SomeDecl(_) => {}
        }
        out.extend(pre);
        out.push(expr);
    }
    body.0 = out;
    body.reindex();
}

/// Unification operands keep their shape: references and composites are
/// destructured by the evaluator. Only nested dynamics within them move.
fn rewrite_eq_operand(term: &mut Term, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    match &mut term.value {
        Value::Ref(r) => rewrite_ref_operands(r, gen, pre),
        Value::Array(_) | Value::Object(_) | Value::Set(_) => {
            rewrite_composite_interior(term, gen, pre);
        }
        Value::Call(_) => extract_call(term, gen, pre),
        _ => {}
    }
}

/// Call arguments must be resolvable values: non-ground references and
/// nested calls are extracted; ground references, composites, and
/// comprehensions stay inline.
fn rewrite_call_arg(term: &mut Term, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    match &mut term.value {
        Value::Ref(r) => {
            rewrite_ref_operands(r, gen, pre);
            if !r.is_ground() {
                extract_plain(term, gen, pre);
            }
        }
        Value::Call(_) => extract_call(term, gen, pre),
        Value::Array(_) | Value::Object(_) | Value::Set(_) => {
            rewrite_composite_interior(term, gen, pre);
        }
        _ => {}
    }
}

/// Reference operands are scalars, variables, or ground terms after
/// rewriting; dynamic subterms move into a preceding binding.
fn rewrite_ref_operands(r: &mut Ref, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    for term in r.0.iter_mut().skip(1) {
        match &mut term.value {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_)
            | Value::Var(_) => {}
            Value::Ref(nested) => {
                rewrite_ref_operands(nested, gen, pre);
                if !nested.is_ground() {
                    extract_plain(term, gen, pre);
                }
            }
            Value::Call(_) => extract_call(term, gen, pre),
            Value::Array(_) | Value::Object(_) | Value::Set(_) => {
                rewrite_composite_interior(term, gen, pre);
            }
            // Comprehensions cannot serve as lookup keys directly.
            Value::ArrayComprehension(_)
            | Value::ObjectComprehension(_)
            | Value::SetComprehension(_) => extract_plain(term, gen, pre),
        }
    }
}

fn rewrite_composite_interior(term: &mut Term, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    match &mut term.value {
        Value::Array(Array(elems)) => {
            for t in elems.iter_mut() {
                rewrite_element(t, gen, pre);
            }
        }
        Value::Set(set) => {
            let elems: Vec<Term> = set
                .iter()
                .map(|t| {
                    let mut t = t.clone();
                    rewrite_element(&mut t, gen, pre);
                    t
                })
                .collect();
            *set = Set::from_elems(elems);
        }
        Value::Object(obj) => {
            let pairs: Vec<(Term, Term)> = obj
                .iter()
                .map(|(k, v)| {
                    let mut k = k.clone();
                    let mut v = v.clone();
                    rewrite_element(&mut k, gen, pre);
                    rewrite_element(&mut v, gen, pre);
                    (k, v)
                })
                .collect();
            *obj = Object::from_pairs(pairs);
        }
        _ => {}
    }
}

fn rewrite_element(term: &mut Term, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    match &mut term.value {
        Value::Ref(r) => {
            rewrite_ref_operands(r, gen, pre);
            if !r.is_ground() {
                extract_plain(term, gen, pre);
            }
        }
        Value::Call(_) => extract_call(term, gen, pre),
        Value::Array(_) | Value::Object(_) | Value::Set(_) => {
            rewrite_composite_interior(term, gen, pre);
        }
        _ => {}
    }
}

/// Replace `term` with a fresh local bound by `local = term`.
fn extract_plain(term: &mut Term, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    let local = Term {
        value: Value::Var(gen.next_var()),
        location: term.location.clone(),
    };
    let original = std::mem::replace(term, local.clone());
    pre.push(Expr::generated_eq(local, original));
}

/// Replace a nested call with a fresh capture local: `x = f(y)` becomes
/// `f(y, __local0__); x = __local0__`.
fn extract_call(term: &mut Term, gen: &mut LocalVarGenerator, pre: &mut Vec<Expr>) {
    let location = term.location.clone();
    let Value::Call(call) = std::mem::replace(&mut term.value, Value::Null) else {
        return;
    };
    let mut terms = call.0;
    for t in terms.iter_mut().skip(1) {
        rewrite_call_arg(t, gen, pre);
    }
    let local = Term {
        value: Value::Var(gen.next_var()),
        location: location.clone(),
    };
    terms.push(local.clone());
    let mut capture = Expr::new_call(terms);
    capture.generated = true;
    capture.location = location;
    pre.push(capture);
    *term = local;
}

// ============================================================================
// RewriteComprehensionTerms
// ============================================================================

/// Extract comprehension output terms so bodies produce only scalars or
/// variables at the term position.
pub fn rewrite_comprehension_terms(module: &mut Module, gen: &mut LocalVarGenerator) {
    for_each_rule_mut(module, &mut |rule| {
        rewrite_comprehension_terms_in_body(&mut rule.body, gen);
    });
}

/// Body-level variant of [`rewrite_comprehension_terms`].
pub fn rewrite_comprehension_terms_in_body(body: &mut Body, gen: &mut LocalVarGenerator) {
    for expr in body.iter_mut() {
        for_each_closure_body_in_expr(expr, &mut |closure_body| {
            rewrite_comprehension_terms_in_body(closure_body, gen);
        });
        rewrite_comprehension_output_terms(expr, gen);
    }
}

fn rewrite_comprehension_output_terms(expr: &mut Expr, gen: &mut LocalVarGenerator) {
    // for_each_closure_body_in_expr has already handled nested bodies;
    // here only the output terms of each comprehension are adjusted.
    let mut fix = |body: &mut Body, term: &mut Term| {
        if term.value.is_scalar() || matches!(term.value, Value::Var(_)) {
            return;
        }
        let local = Term {
            value: Value::Var(gen.next_var()),
            location: term.location.clone(),
        };
        let original = std::mem::replace(term, local.clone());
        body.push(Expr::generated_eq(local, original));
    };
    visit_comprehensions_in_expr(expr, &mut |value| match value {
        Value::ArrayComprehension(c) => fix(&mut c.body, &mut c.term),
        Value::SetComprehension(c) => fix(&mut c.body, &mut c.term),
        Value::ObjectComprehension(c) => {
            fix(&mut c.body, &mut c.key);
            fix(&mut c.body, &mut c.value);
        }
        _ => {}
    });
}

pub(crate) fn visit_comprehensions_in_expr(expr: &mut Expr, f: &mut impl FnMut(&mut Value)) {
    match &mut expr.terms {
        ExprTerms::Term(t) => visit_comprehensions_in_term(t, f),
        ExprTerms::Call(terms) => {
            for t in terms.iter_mut().skip(1) {
                visit_comprehensions_in_term(t, f);
            }
        }
        ExprTerms::SomeDecl(_) => {}
    }
    for w in &mut expr.with {
        visit_comprehensions_in_term(&mut w.value, f);
    }
}

fn visit_comprehensions_in_term(term: &mut Term, f: &mut impl FnMut(&mut Value)) {
    match &mut term.value {
        Value::ArrayComprehension(_)
        | Value::SetComprehension(_)
        | Value::ObjectComprehension(_) => f(&mut term.value),
        Value::Ref(r) => {
            for t in r.0.iter_mut().skip(1) {
                visit_comprehensions_in_term(t, f);
            }
        }
        Value::Array(arr) => {
            for t in arr.0.iter_mut() {
                visit_comprehensions_in_term(t, f);
            }
        }
        Value::Object(obj) => {
            let pairs: Vec<(Term, Term)> = obj
                .iter()
                .map(|(k, v)| {
                    let mut k = k.clone();
                    let mut v = v.clone();
                    visit_comprehensions_in_term(&mut k, f);
                    visit_comprehensions_in_term(&mut v, f);
                    (k, v)
                })
                .collect();
            *obj = Object::from_pairs(pairs);
        }
        Value::Set(set) => {
            let elems: Vec<Term> = set
                .iter()
                .map(|t| {
                    let mut t = t.clone();
                    visit_comprehensions_in_term(&mut t, f);
                    t
                })
                .collect();
            *set = Set::from_elems(elems);
        }
        Value::Call(Call(terms)) => {
            for t in terms.iter_mut().skip(1) {
                visit_comprehensions_in_term(t, f);
            }
        }
        _ => {}
    }
}

// ============================================================================
// RewriteWithModifiers
// ============================================================================

/// Paths of every rule in the compile, used to validate `with` targets.
#[derive(Debug, Default)]
pub struct RulePathIndex {
    rule_paths: BTreeSet<Vec<Value>>,
    function_paths: BTreeSet<Vec<Value>>,
}

impl RulePathIndex {
    /// Collect rule and function paths from all modules.
    pub fn build<'a>(modules: impl Iterator<Item = &'a Module>) -> Self {
        let mut index = RulePathIndex::default();
        for module in modules {
            for rule in &module.rules {
                let path: Vec<Value> = rule
                    .path_in(&module.package)
                    .iter()
                    .map(|t| t.value.clone())
                    .collect();
                if rule.head.kind() == crate::ast::RuleKind::Function {
                    index.function_paths.insert(path.clone());
                }
                index.rule_paths.insert(path);
            }
        }
        index
    }

    fn is_function(&self, path: &[Value]) -> bool {
        self.function_paths.contains(path)
    }

    fn extends_virtual_document(&self, path: &[Value]) -> bool {
        self.rule_paths
            .iter()
            .any(|p| p.len() < path.len() && path[..p.len()] == p[..])
    }
}

/// Validate `with` targets and bind non-ground values to locals before the
/// modified expression.
pub fn rewrite_with_modifiers(
    module: &mut Module,
    gen: &mut LocalVarGenerator,
    paths: &RulePathIndex,
) -> Vec<Error> {
    let mut errors = Vec::new();
    for_each_rule_mut(module, &mut |rule| {
        errors.extend(rewrite_with_modifiers_in_body(&mut rule.body, gen, paths));
    });
    errors
}

/// Body-level variant of [`rewrite_with_modifiers`].
pub fn rewrite_with_modifiers_in_body(
    body: &mut Body,
    gen: &mut LocalVarGenerator,
    paths: &RulePathIndex,
) -> Vec<Error> {
    let mut errors = Vec::new();
    let exprs = std::mem::take(&mut body.0);
    let mut out: Vec<Expr> = Vec::with_capacity(exprs.len());
    for mut expr in exprs {
        for_each_closure_body_in_expr(&mut expr, &mut |closure_body| {
            errors.extend(rewrite_with_modifiers_in_body(closure_body, gen, paths));
        });

        let mut pre = Vec::new();
        for w in &mut expr.with {
            match target_path(&w.target) {
                Ok(path) => {
                    if paths.is_function(&path) {
                        errors.push(Error::compile(
                            w.location.get(),
                            "with keyword cannot replace functions",
                        ));
                    } else if paths.extends_virtual_document(&path) {
                        errors.push(Error::compile(
                            w.location.get(),
                            "with keyword cannot partially replace virtual document(s)",
                        ));
                    }
                }
                Err(TargetError::NotRooted) => {
                    errors.push(Error::compile(
                        w.location.get(),
                        "with keyword target must start with input or data",
                    ));
                }
                Err(TargetError::NotGround) => {
                    errors.push(Error::compile(
                        w.location.get(),
                        "with keyword target must be a ground reference",
                    ));
                }
            }
            if w.value.value.requires_eval() || !w.value.value.is_ground() {
                let local = Term {
                    value: Value::Var(gen.next_var()),
                    location: w.value.location.clone(),
                };
                let mut original = std::mem::replace(&mut w.value, local.clone());
                // The binding takes the value's place in the body, so its
                // interior dynamics are extracted the same way the dynamic
                // term stage would have.
                rewrite_eq_operand(&mut original, gen, &mut pre);
                pre.push(Expr::generated_eq(local, original));
            }
        }
        out.extend(pre);
        out.push(expr);
    }
    body.0 = out;
    body.reindex();
    errors
}

enum TargetError {
    NotRooted,
    NotGround,
}

/// The ground path of a `with` target rooted at `input` or `data`.
fn target_path(target: &Term) -> Result<Vec<Value>, TargetError> {
    let r = target
        .value
        .as_ref_value()
        .ok_or(TargetError::NotRooted)?;
    let head = r.head_var().ok_or(TargetError::NotRooted)?;
    if !ROOT_DOCUMENT_NAMES.contains(&head.as_str()) {
        return Err(TargetError::NotRooted);
    }
    let mut path = vec![Value::Var(head.clone())];
    for op in r.operands() {
        if !op.value.is_ground() {
            return Err(TargetError::NotGround);
        }
        path.push(op.value.clone());
    }
    Ok(path)
}

// ============================================================================
// RewritePrintCalls
// ============================================================================

/// Erase or lower `print` calls.
///
/// When print statements are disabled the call is erased (bodies reduced to
/// `true` when nothing else remains). When enabled, each argument is
/// wrapped in a single-element set comprehension capturing a snapshot of
/// the referenced variables, and the call becomes `internal.print([...])`.
pub fn rewrite_print_calls(
    module: &mut Module,
    gen: &mut LocalVarGenerator,
    enabled: bool,
) -> Vec<Error> {
    let mut errors = Vec::new();
    for_each_rule_mut(module, &mut |rule| {
        let mut globals: BTreeSet<Var> =
            ROOT_DOCUMENT_NAMES.iter().map(|n| Var::new(*n)).collect();
        for arg in &rule.head.args {
            globals.extend(crate::ast::visit::term_vars(arg));
        }
        errors.extend(rewrite_print_calls_in_body(
            &mut rule.body,
            &globals,
            gen,
            enabled,
        ));
    });
    errors
}

/// Body-level variant of [`rewrite_print_calls`].
pub fn rewrite_print_calls_in_body(
    body: &mut Body,
    globals: &BTreeSet<Var>,
    gen: &mut LocalVarGenerator,
    enabled: bool,
) -> Vec<Error> {
    let mut errors = Vec::new();

    // Variables visible to print arguments: the globals plus everything
    // mentioned by the body's other expressions.
    let mut declared = globals.clone();
    for expr in body.iter() {
        if expr.operator_name().as_deref() == Some(OP_PRINT) {
            continue;
        }
        let mut collector = VarCollector::new(VarVisitorParams {
            skip_call_operators: true,
            skip_with_targets: true,
            ..VarVisitorParams::default()
        });
        collector.collect_expr(expr);
        declared.extend(collector.into_set());
    }

    for expr in body.iter_mut() {
        for_each_closure_body_in_expr(expr, &mut |closure_body| {
            errors.extend(rewrite_print_calls_in_body(
                closure_body,
                &declared,
                gen,
                enabled,
            ));
        });
    }

    if !enabled {
        body.0
            .retain(|expr| expr.operator_name().as_deref() != Some(OP_PRINT));
        if body.0.is_empty() {
            let mut truth = Expr::truth();
            truth.generated = true;
            body.0.push(truth);
        }
        body.reindex();
        return errors;
    }

    for expr in body.iter_mut() {
        if expr.operator_name().as_deref() != Some(OP_PRINT) {
            continue;
        }
        let ExprTerms::Call(terms) = &mut expr.terms else {
            continue;
        };

        let mut collector = VarCollector::new(VarVisitorParams {
            skip_call_operators: true,
            ..VarVisitorParams::default()
        });
        for arg in terms.iter().skip(1) {
            collector.collect_term(arg);
        }
        for (var, location) in collector.into_vars() {
            if !declared.contains(&var) && !var.is_wildcard() {
                errors.push(Error::compile(
                    location.or_else(|| expr.location.get()),
                    format!("var {var} is undeclared"),
                ));
            }
        }

        let location = terms[0].location.clone();
        let mut captures = Vec::new();
        for arg in terms.iter().skip(1) {
            let local = Term {
                value: Value::Var(gen.next_var()),
                location: arg.location.clone(),
            };
            let capture_body = Body::from_exprs(vec![Expr::generated_eq(
                local.clone(),
                arg.clone(),
            )]);
            captures.push(Term {
                value: Value::SetComprehension(SetComprehension {
                    term: Box::new(local),
                    body: capture_body,
                }),
                location: arg.location.clone(),
            });
        }
        let args_array = Term {
            value: Value::Array(Array::new(captures)),
            location: location.clone(),
        };
        expr.terms = ExprTerms::Call(vec![
            Term {
                value: Value::Ref(operator_ref(OP_PRINT_INTERNAL)),
                location,
            },
            args_array,
        ]);
    }
    errors
}
