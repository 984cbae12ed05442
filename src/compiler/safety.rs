//! Safety analysis.
//!
//! A variable is safe at a position in a body iff a preceding expression's
//! output position binds it. This module computes output variables per
//! expression kind, reorders bodies so every use is preceded by a binding,
//! and reports the variables that no ordering can make safe.
//!
//! The reordering runs in three passes:
//!
//! 1. A preliminary pass delays expressions containing closures until after
//!    the expressions that bind the variables those closures capture.
//! 2. The main fixed-point loop appends expressions whose unmet variables
//!    are covered by the current safe set or by their own outputs. Each
//!    iteration must place at least one expression or the loop exits with
//!    the remainder flagged unsafe.
//! 3. Comprehension bodies are recursively reordered within a scope that
//!    includes everything made safe by the preceding outer expressions, and
//!    comprehension output terms are checked against their body's outputs.

use crate::ast::visit::{self, VarCollector, VarVisitorParams};
use crate::ast::{Body, Expr, ExprTerms, Rule, Term, OP_EQ, ROOT_DOCUMENT_NAMES};
use crate::capabilities::Capabilities;
use crate::compiler::rewrites::visit_comprehensions_in_expr;
use crate::errors::Error;
use crate::location::Location;
use crate::value::{Ref, Value, Var};
use std::collections::BTreeSet;

/// A set of variable names.
pub type VarSet = BTreeSet<Var>;

/// Shared lookup context for safety analysis.
pub struct SafetyContext<'a> {
    pub capabilities: &'a Capabilities,
    /// Arity of user-defined functions by operator reference, or `None`
    /// when the reference names no function.
    pub arity: &'a dyn Fn(&Ref) -> Option<usize>,
}

/// A variable that could not be made safe, with the location of its first
/// occurrence in the offending expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsafeVar {
    pub var: Var,
    pub location: Option<Location>,
}

/// The reserved variables that are always safe.
pub fn reserved_vars() -> VarSet {
    ROOT_DOCUMENT_NAMES.iter().map(|n| Var::new(*n)).collect()
}

// ============================================================================
// Variable collection
// ============================================================================

/// Variables of an expression relevant to safety: payload and `with`
/// values, excluding closure interiors, call operators, and `with` targets.
fn expr_safety_vars(expr: &Expr) -> Vec<(Var, Option<Location>)> {
    let mut collector = VarCollector::new(VarVisitorParams {
        skip_closures: true,
        skip_call_operators: true,
        skip_with_targets: true,
        ..VarVisitorParams::default()
    });
    collector.collect_expr(expr);
    collector.into_vars()
}

fn term_safety_vars(term: &Term) -> VarSet {
    let mut collector = VarCollector::new(VarVisitorParams {
        skip_closures: true,
        skip_call_operators: true,
        ..VarVisitorParams::default()
    });
    collector.collect_term(term);
    collector.into_set()
}

/// Every variable mentioned inside the comprehensions of an expression,
/// including comprehension-local ones.
fn closure_vars(expr: &Expr) -> VarSet {
    let mut out = VarSet::new();
    let mut terms: Vec<&Term> = Vec::new();
    match &expr.terms {
        ExprTerms::Term(t) => terms.push(t),
        ExprTerms::Call(call_terms) => terms.extend(call_terms.iter().skip(1)),
        ExprTerms::SomeDecl(decl) => terms.extend(decl.symbols.iter()),
    }
    for w in &expr.with {
        terms.push(&w.value);
    }
    while let Some(term) = terms.pop() {
        match &term.value {
            Value::ArrayComprehension(c) => {
                collect_all_vars(&c.term, &mut out);
                collect_body_vars(&c.body, &mut out);
            }
            Value::SetComprehension(c) => {
                collect_all_vars(&c.term, &mut out);
                collect_body_vars(&c.body, &mut out);
            }
            Value::ObjectComprehension(c) => {
                collect_all_vars(&c.key, &mut out);
                collect_all_vars(&c.value, &mut out);
                collect_body_vars(&c.body, &mut out);
            }
            Value::Ref(r) => terms.extend(r.operands()),
            Value::Array(arr) => terms.extend(arr.iter()),
            Value::Object(obj) => {
                for (k, v) in obj.iter() {
                    terms.push(k);
                    terms.push(v);
                }
            }
            Value::Set(set) => terms.extend(set.iter()),
            Value::Call(call) => terms.extend(call.args()),
            _ => {}
        }
    }
    out
}

fn collect_all_vars(term: &Term, out: &mut VarSet) {
    let mut collector = VarCollector::new(VarVisitorParams {
        skip_call_operators: true,
        skip_with_targets: true,
        ..VarVisitorParams::default()
    });
    collector.collect_term(term);
    out.extend(collector.into_set());
}

fn collect_body_vars(body: &Body, out: &mut VarSet) {
    let mut collector = VarCollector::new(VarVisitorParams {
        skip_call_operators: true,
        skip_with_targets: true,
        ..VarVisitorParams::default()
    });
    collector.collect_body(body);
    out.extend(collector.into_set());
}

/// Variables that unification can bind when matching against the term:
/// plain variables, array elements, and object values. Object keys behave
/// like set elements and are never bound by matching.
fn bindable_vars(term: &Term, out: &mut VarSet) {
    match &term.value {
        Value::Var(v) => {
            out.insert(v.clone());
        }
        Value::Array(arr) => {
            for t in arr.iter() {
                bindable_vars(t, out);
            }
        }
        Value::Object(obj) => {
            for (_, v) in obj.iter() {
                bindable_vars(v, out);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Output variables
// ============================================================================

/// Output variables contributed by references in the expression payload:
/// when a reference's head is safe, the variables in its operand positions
/// become bound by iteration. Nested references contribute through their
/// own entries.
fn ref_output_vars(expr: &Expr, safe: &VarSet) -> VarSet {
    let mut refs = Vec::new();
    match &expr.terms {
        ExprTerms::Term(t) => visit::collect_refs_in_term(t, &mut refs),
        ExprTerms::Call(terms) => {
            for t in terms.iter().skip(1) {
                visit::collect_refs_in_term(t, &mut refs);
            }
        }
        ExprTerms::SomeDecl(decl) => {
            for sym in &decl.symbols {
                visit::collect_refs_in_term(sym, &mut refs);
            }
        }
    }

    let mut out = VarSet::new();
    // Chained refs (`xs[i].y[j]` after `xs` bound) become safe in one pass
    // here; cross-ref chains settle in the caller's fixed point.
    let mut changed = true;
    while changed {
        changed = false;
        for r in &refs {
            let Some(head) = r.head_var() else { continue };
            if !(safe.contains(head) || out.contains(head)) {
                continue;
            }
            for op in r.operands() {
                let mut vars = VarSet::new();
                operand_vars(op, &mut vars);
                for v in vars {
                    if out.insert(v) {
                        changed = true;
                    }
                }
            }
        }
    }
    out
}

/// Variables at a reference operand position, excluding the interiors of
/// nested references.
fn operand_vars(term: &Term, out: &mut VarSet) {
    match &term.value {
        Value::Var(v) => {
            out.insert(v.clone());
        }
        Value::Array(arr) => {
            for t in arr.iter() {
                operand_vars(t, out);
            }
        }
        Value::Object(obj) => {
            for (k, v) in obj.iter() {
                operand_vars(k, out);
                operand_vars(v, out);
            }
        }
        Value::Set(set) => {
            for t in set.iter() {
                operand_vars(t, out);
            }
        }
        Value::Ref(_) => {}
        _ => {}
    }
}

/// Bidirectional unification: which variables become bound when `a = b`
/// succeeds, given the currently safe set.
pub fn unify_output_vars(a: &Term, b: &Term, safe: &VarSet) -> VarSet {
    let mut unifier = Unifier {
        safe,
        deps: Vec::new(),
    };
    unifier.unify(a, b);
    unifier.resolve()
}

struct Unifier<'a> {
    safe: &'a VarSet,
    /// `(var, requires)`: the var becomes bound once every var in
    /// `requires` is safe or bound. A var may have several alternatives.
    deps: Vec<(Var, VarSet)>,
}

impl Unifier<'_> {
    fn dep(&mut self, var: &Var, requires: VarSet) {
        self.deps.push((var.clone(), requires));
    }

    fn unify(&mut self, a: &Term, b: &Term) {
        match (&a.value, &b.value) {
            (Value::Var(x), Value::Var(y)) => {
                self.dep(x, VarSet::from([y.clone()]));
                self.dep(y, VarSet::from([x.clone()]));
            }
            (Value::Var(x), _) => self.unify_var(x, b),
            (_, Value::Var(y)) => self.unify_var(y, a),
            (Value::Array(a1), Value::Array(a2)) if a1.len() == a2.len() => {
                for (t1, t2) in a1.iter().zip(a2.iter()) {
                    self.unify(t1, t2);
                }
            }
            (Value::Object(o1), Value::Object(o2)) => {
                for (k, v1) in o1.iter() {
                    if let Some(v2) = o2.get(k) {
                        self.unify(v1, v2);
                    }
                }
            }
            _ => {}
        }
    }

    fn unify_var(&mut self, x: &Var, t: &Term) {
        match &t.value {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {
                self.dep(x, VarSet::new());
            }
            // Comprehensions always evaluate to a value.
            Value::ArrayComprehension(_)
            | Value::SetComprehension(_)
            | Value::ObjectComprehension(_) => {
                self.dep(x, VarSet::new());
            }
            Value::Ref(_) | Value::Call(_) => {
                self.dep(x, term_safety_vars(t));
            }
            Value::Array(_) | Value::Object(_) | Value::Set(_) => {
                // x is bound once the composite is fully bound.
                self.dep(x, term_safety_vars(t));
                // Conversely, matching a safe x binds the composite's
                // bindable positions.
                let mut elems = VarSet::new();
                bindable_vars(t, &mut elems);
                for v in elems {
                    self.dep(&v, VarSet::from([x.clone()]));
                }
            }
            Value::Var(_) => {}
        }
    }

    fn resolve(self) -> VarSet {
        let mut bound = VarSet::new();
        let mut changed = true;
        while changed {
            changed = false;
            for (var, requires) in &self.deps {
                if self.safe.contains(var) || bound.contains(var) {
                    continue;
                }
                if requires
                    .iter()
                    .all(|r| self.safe.contains(r) || bound.contains(r))
                {
                    bound.insert(var.clone());
                    changed = true;
                }
            }
        }
        bound
    }
}

/// The output variables of one expression given the currently safe set.
pub fn output_vars_expr(ctx: &SafetyContext<'_>, expr: &Expr, safe: &VarSet) -> VarSet {
    // Negated expressions bind nothing.
    if expr.negated {
        return VarSet::new();
    }
    // With-modifier values must be safe before the expression runs, and
    // contribute no outputs themselves.
    for w in &expr.with {
        if !term_safety_vars(&w.value).is_subset(safe) {
            return VarSet::new();
        }
    }

    let base = ref_output_vars(expr, safe);
    let ExprTerms::Call(_) = &expr.terms else {
        return base;
    };
    let Some(name) = expr.operator_name() else {
        return VarSet::new();
    };
    let operands = expr.operands();

    if name == OP_EQ && operands.len() == 2 {
        let mut safe2 = safe.clone();
        safe2.extend(base.iter().cloned());
        let unified = unify_output_vars(&operands[0], &operands[1], &safe2);
        let mut out = base;
        out.extend(unified);
        return out;
    }

    if let Some(builtin) = ctx.capabilities.get(&name) {
        if builtin.variadic {
            let all_safe = operands.iter().all(|t| {
                let mut vs = term_safety_vars(t);
                vs.retain(|v| !base.contains(v));
                vs.is_subset(safe)
            });
            return if all_safe { base } else { VarSet::new() };
        }
        if operands.len() != builtin.arity && operands.len() != builtin.arity + 1 {
            return VarSet::new();
        }
        for pos in builtin.input_positions() {
            let mut vs = term_safety_vars(&operands[pos]);
            vs.retain(|v| !base.contains(v));
            if !vs.is_subset(safe) {
                return VarSet::new();
            }
        }
        let mut out = base;
        for &pos in builtin.outputs {
            if let Some(operand) = operands.get(pos) {
                bindable_vars(operand, &mut out);
            }
        }
        if operands.len() == builtin.arity + 1 {
            bindable_vars(&operands[builtin.arity], &mut out);
        }
        return out;
    }

    // User-defined function.
    if let Some(op_ref) = expr.operator() {
        if let Some(arity) = (ctx.arity)(op_ref) {
            if operands.len() != arity && operands.len() != arity + 1 {
                return VarSet::new();
            }
            for operand in &operands[..arity] {
                let mut vs = term_safety_vars(operand);
                vs.retain(|v| !base.contains(v));
                if !vs.is_subset(safe) {
                    return VarSet::new();
                }
            }
            let mut out = base;
            if operands.len() == arity + 1 {
                bindable_vars(&operands[arity], &mut out);
            }
            return out;
        }
    }

    // Unknown operator: no outputs.
    VarSet::new()
}

/// The variables a body can make safe given the globals, computed by a
/// fixed point so the result is order-insensitive.
pub fn output_vars_body(ctx: &SafetyContext<'_>, body: &Body, globals: &VarSet) -> VarSet {
    let mut safe = globals.clone();
    let mut changed = true;
    while changed {
        changed = false;
        for expr in body.iter() {
            let out = output_vars_expr(ctx, expr, &safe);
            for v in out {
                if safe.insert(v) {
                    changed = true;
                }
            }
        }
    }
    safe.retain(|v| !globals.contains(v));
    safe
}

fn output_vars_exprs(ctx: &SafetyContext<'_>, exprs: &[&Expr], globals: &VarSet) -> VarSet {
    let body = Body(exprs.iter().map(|e| (*e).clone()).collect());
    output_vars_body(ctx, &body, globals)
}

// ============================================================================
// Body reordering
// ============================================================================

/// Reorder a body for safety. Returns the reordered body (with recursively
/// reordered comprehension bodies) and the variables that remain unsafe.
/// When unsafe variables are reported the returned body is meaningless and
/// must not replace the original.
pub fn reorder_body_for_safety(
    ctx: &SafetyContext<'_>,
    globals: &VarSet,
    body: Body,
) -> (Body, Vec<UnsafeVar>) {
    let mut unsafe_vars: Vec<UnsafeVar> = Vec::new();
    let exprs = body.0;
    let n = exprs.len();

    // Pass 1: closures move after their potential binders.
    let mut order: Vec<usize> = Vec::with_capacity(n);
    let mut placed = vec![false; n];
    loop {
        let mut progress = false;
        for i in 0..n {
            if placed[i] {
                continue;
            }
            let cvs = closure_vars(&exprs[i]);
            if !cvs.is_empty() {
                let others: Vec<&Expr> = (0..n)
                    .filter(|&j| j != i && !placed[j])
                    .map(|j| &exprs[j])
                    .collect();
                let future = output_vars_exprs(ctx, &others, globals);
                if !cvs.is_disjoint(&future) {
                    continue;
                }
            }
            placed[i] = true;
            order.push(i);
            progress = true;
        }
        if order.len() == n {
            break;
        }
        if !progress {
            for i in 0..n {
                if !placed[i] {
                    order.push(i);
                }
            }
            break;
        }
    }
    let mut ordered: Vec<Expr> = Vec::with_capacity(n);
    for &i in &order {
        ordered.push(exprs[i].clone());
    }

    // Pass 2: the main fixed point.
    let mut unsafe_sets: Vec<VarSet> = ordered
        .iter()
        .map(|e| {
            expr_safety_vars(e)
                .into_iter()
                .map(|(v, _)| v)
                .filter(|v| !globals.contains(v))
                .collect()
        })
        .collect();
    let mut safe = globals.clone();
    let mut reordered: Vec<usize> = Vec::with_capacity(n);
    let mut done = vec![false; n];
    loop {
        let before = reordered.len();
        for (k, expr) in ordered.iter().enumerate() {
            if done[k] {
                continue;
            }
            let ovs = output_vars_expr(ctx, expr, &safe);
            let missing: VarSet = unsafe_sets[k]
                .iter()
                .filter(|v| !ovs.contains(*v) && !safe.contains(*v))
                .cloned()
                .collect();
            if missing.is_empty() {
                done[k] = true;
                reordered.push(k);
                safe.extend(ovs);
                unsafe_sets[k].clear();
            }
        }
        if reordered.len() == before {
            break;
        }
    }

    // Report the variables that no ordering can bind.
    let mut reported: VarSet = VarSet::new();
    for (k, expr) in ordered.iter().enumerate() {
        if done[k] {
            continue;
        }
        let ovs = output_vars_expr(ctx, expr, &safe);
        for (var, location) in expr_safety_vars(expr) {
            if unsafe_sets[k].contains(&var)
                && !ovs.contains(&var)
                && !safe.contains(&var)
                && reported.insert(var.clone())
            {
                unsafe_vars.push(UnsafeVar { var, location });
            }
        }
    }

    // Pass 3: recurse into comprehension bodies with the scope available at
    // each expression's position.
    let mut final_exprs: Vec<Expr> = Vec::with_capacity(n);
    for &k in &reordered {
        final_exprs.push(ordered[k].clone());
    }
    for (k, expr) in ordered.into_iter().enumerate() {
        if !done[k] {
            final_exprs.push(expr);
        }
    }

    let mut safe_so_far = globals.clone();
    for expr in &mut final_exprs {
        let scope = safe_so_far.clone();
        let mut closure_unsafe: Vec<UnsafeVar> = Vec::new();
        visit_comprehensions_in_expr(expr, &mut |value| {
            reorder_closure(ctx, &scope, value, &mut closure_unsafe);
        });
        unsafe_vars.append(&mut closure_unsafe);
        let ovs = output_vars_expr(ctx, expr, &safe_so_far);
        safe_so_far.extend(ovs);
    }

    (Body::from_exprs(final_exprs), unsafe_vars)
}

fn reorder_closure(
    ctx: &SafetyContext<'_>,
    scope: &VarSet,
    value: &mut Value,
    unsafe_vars: &mut Vec<UnsafeVar>,
) {
    let (body, output_terms): (&mut Body, Vec<&Term>) = match value {
        Value::ArrayComprehension(c) => (&mut c.body, vec![&c.term]),
        Value::SetComprehension(c) => (&mut c.body, vec![&c.term]),
        Value::ObjectComprehension(c) => (&mut c.body, vec![&c.key, &c.value]),
        _ => return,
    };
    let taken = std::mem::take(body);
    let (reordered, mut nested_unsafe) = reorder_body_for_safety(ctx, scope, taken);
    *body = reordered;
    unsafe_vars.append(&mut nested_unsafe);

    // The produced term must be safe once the closure body has run.
    let mut body_safe = scope.clone();
    body_safe.extend(output_vars_body(ctx, body, scope));
    for term in output_terms {
        let mut collector = VarCollector::new(VarVisitorParams {
            skip_call_operators: true,
            ..VarVisitorParams::default()
        });
        collector.collect_term(term);
        for (var, location) in collector.into_vars() {
            if !body_safe.contains(&var) {
                unsafe_vars.push(UnsafeVar { var, location });
            }
        }
    }
}

// ============================================================================
// Rule-level checks
// ============================================================================

/// Check that every variable in a rule head (key, value, and arguments,
/// ignoring closure-bound variables) is made safe by the body or bound as
/// an argument.
pub fn check_rule_head_safety(ctx: &SafetyContext<'_>, rule: &Rule) -> Vec<Error> {
    let mut errors = Vec::new();
    let mut globals = reserved_vars();
    for arg in &rule.head.args {
        globals.extend(crate::ast::visit::term_vars(arg));
    }
    let mut safe = globals.clone();
    safe.extend(output_vars_body(ctx, &rule.body, &globals));

    let mut collector = VarCollector::new(VarVisitorParams {
        skip_closures: true,
        skip_call_operators: true,
        ..VarVisitorParams::default()
    });
    if let Some(key) = &rule.head.key {
        collector.collect_term(key);
    }
    if let Some(value) = &rule.head.value {
        collector.collect_term(value);
    }
    for (var, location) in collector.into_vars() {
        if !safe.contains(&var) {
            errors.push(Error::unsafe_var(
                location.or_else(|| rule.head.location.get()),
                format!("var {var} is unsafe"),
            ));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_body, parse_module};

    fn ctx_caps() -> Capabilities {
        Capabilities::default_set()
    }

    fn no_functions(_: &Ref) -> Option<usize> {
        None
    }

    fn reorder(src: &str) -> (Body, Vec<UnsafeVar>) {
        let caps = ctx_caps();
        let ctx = SafetyContext {
            capabilities: &caps,
            arity: &no_functions,
        };
        let body = parse_body("safety.warden", src).expect("parse");
        reorder_body_for_safety(&ctx, &reserved_vars(), body)
    }

    #[test]
    fn test_builtin_capture_reorders_before_use() {
        // count binds x through its capture position, so it must run first.
        let (body, unsafe_vars) = reorder("x != 0; count([1, 2, 3], x)");
        assert!(unsafe_vars.is_empty(), "unexpected: {unsafe_vars:?}");
        assert_eq!(body.0[0].operator_name().as_deref(), Some("count"));
        assert_eq!(body.0[1].operator_name().as_deref(), Some("neq"));
        // Indices are dense after reordering.
        assert_eq!(body.0[0].index, 0);
        assert_eq!(body.0[1].index, 1);
    }

    #[test]
    fn test_unification_binds_both_directions() {
        let (body, unsafe_vars) = reorder("y = x; x = 1");
        assert!(unsafe_vars.is_empty());
        // x = 1 must run before y = x.
        assert_eq!(body.0[0].operands()[1].value, Value::from(1));
    }

    #[test]
    fn test_negation_requires_prior_bindings() {
        let (_, unsafe_vars) = reorder("not a[i] = x; a = [1, 2, 3, 4]");
        let names: Vec<&str> = unsafe_vars.iter().map(|u| u.var.as_str()).collect();
        assert_eq!(names, vec!["i", "x"]);
        for u in &unsafe_vars {
            assert!(u.location.is_some());
        }
    }

    #[test]
    fn test_ref_subscripts_are_outputs() {
        let (_, unsafe_vars) = reorder("xs = [1, 2]; xs[i] = v");
        assert!(unsafe_vars.is_empty());
    }

    #[test]
    fn test_unknown_function_has_no_outputs() {
        let (_, unsafe_vars) = reorder("mystery(x)");
        assert_eq!(unsafe_vars.len(), 1);
        assert_eq!(unsafe_vars[0].var.as_str(), "x");
    }

    #[test]
    fn test_closure_ordered_after_binding() {
        // The comprehension captures xs, which is bound by the second
        // expression; the closure must not run first.
        let (body, unsafe_vars) = reorder("ys = [y | y = xs[_]]; xs = [1, 2]");
        assert!(unsafe_vars.is_empty(), "unexpected: {unsafe_vars:?}");
        assert_eq!(body.0[0].operands()[0].value.to_string(), "xs");
    }

    #[test]
    fn test_closure_body_reordered_recursively() {
        let (body, unsafe_vars) = reorder("xs = [1]; ys = [y | y != 0; y = xs[_]]");
        assert!(unsafe_vars.is_empty(), "unexpected: {unsafe_vars:?}");
        match &body.0[1].operands()[1].value {
            Value::ArrayComprehension(c) => {
                assert_eq!(c.body.0[0].operator_name().as_deref(), Some("eq"));
                assert_eq!(c.body.0[1].operator_name().as_deref(), Some("neq"));
            }
            other => panic!("expected comprehension, got {other:?}"),
        }
    }

    #[test]
    fn test_unsafe_var_in_closure_reported() {
        let (_, unsafe_vars) = reorder("ys = [y | y = zs[_]]");
        let names: Vec<&str> = unsafe_vars.iter().map(|u| u.var.as_str()).collect();
        assert!(names.contains(&"zs"), "got {names:?}");
    }

    #[test]
    fn test_with_value_must_be_safe() {
        let (_, unsafe_vars) = reorder("data.p = 1 with input.x as v");
        assert_eq!(unsafe_vars.len(), 1);
        assert_eq!(unsafe_vars[0].var.as_str(), "v");
    }

    #[test]
    fn test_object_keys_are_not_outputs() {
        // Matching {k: 1} = obj binds nothing in key position.
        let (_, unsafe_vars) = reorder("obj = {\"a\": 1}; {k: 1} = obj; k = k");
        let names: Vec<&str> = unsafe_vars.iter().map(|u| u.var.as_str()).collect();
        assert!(names.contains(&"k"), "got {names:?}");
    }

    #[test]
    fn test_array_destructuring_binds_elements() {
        let (_, unsafe_vars) = reorder("pair = [1, 2]; [a, b] = pair; a < b");
        assert!(unsafe_vars.is_empty(), "unexpected: {unsafe_vars:?}");
    }

    #[test]
    fn test_head_safety() {
        let caps = ctx_caps();
        let ctx = SafetyContext {
            capabilities: &caps,
            arity: &no_functions,
        };
        let module = parse_module(
            "t.warden",
            "package t\np = y { x = 1 }\nq = x { x = 1 }",
        )
        .expect("parse");
        let bad = check_rule_head_safety(&ctx, &module.rules[0]);
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].message, "var y is unsafe");
        let good = check_rule_head_safety(&ctx, &module.rules[1]);
        assert!(good.is_empty());
    }

    #[test]
    fn test_function_args_are_safe_in_head_check() {
        let caps = ctx_caps();
        let ctx = SafetyContext {
            capabilities: &caps,
            arity: &no_functions,
        };
        let module = parse_module("t.warden", "package t\nf(x) = x { true }").expect("parse");
        assert!(check_rule_head_safety(&ctx, &module.rules[0]).is_empty());
    }
}
