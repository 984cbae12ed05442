//! Reference resolution.
//!
//! Rewrites every symbolic reference in a module to its fully-qualified
//! form. Each module gets a `globals` table built from (a) the package's
//! exported rule names, each mapping to `data.<pkg>.<name>`, and (b) its
//! imports, keyed by alias or last path element. Substitution replaces
//! variables that match a global; inside references only the head element
//! is replaced, preserving the remainder. Variables shadowed by function
//! arguments or by `some`/`:=` declarations in the enclosing body are left
//! alone. Imports are cleared once resolution completes.

use crate::ast::{Body, Expr, ExprTerms, Module, Rule, Term};
use crate::errors::Error;
use crate::value::{Call, Object, Ref, Set, Value, Var};
use std::collections::{BTreeMap, BTreeSet};

/// Build the globals table for a module: exported rule names plus imports.
pub fn module_globals(module: &Module) -> BTreeMap<Var, Ref> {
    let mut globals = BTreeMap::new();
    for rule in &module.rules {
        let name = rule.head.name.clone();
        let path = rule.path_in(&module.package);
        globals.insert(name, path);
    }
    for imp in &module.imports {
        if let (Some(name), Value::Ref(path)) = (imp.name(), &imp.path.value) {
            globals.insert(name, path.clone());
        }
    }
    globals
}

/// Resolve every rule of a module in place and clear its imports.
pub fn resolve_module(module: &mut Module) -> Vec<Error> {
    let globals = module_globals(module);
    let mut errors = Vec::new();
    for rule in &mut module.rules {
        resolve_rule(rule, &globals, &mut errors);
    }
    module.imports.clear();
    errors
}

/// Resolve a query body against externally supplied globals.
pub fn resolve_body(body: &mut Body, globals: &BTreeMap<Var, Ref>) {
    let ignore = vec![declared_in_body(body)];
    for expr in body.iter_mut() {
        resolve_expr(expr, globals, &ignore);
    }
}

fn resolve_rule(rule: &mut Rule, globals: &BTreeMap<Var, Ref>, errors: &mut Vec<Error>) {
    // Function arguments must not shadow the root documents.
    for arg in &rule.head.args {
        for var in crate::ast::visit::term_vars(arg) {
            if crate::ast::ROOT_DOCUMENT_NAMES.contains(&var.as_str()) {
                errors.push(Error::compile(
                    arg.location.get(),
                    format!("args must not shadow {var}"),
                ));
            }
        }
    }

    let mut shadowed = BTreeSet::new();
    for arg in &rule.head.args {
        shadowed.extend(crate::ast::visit::term_vars(arg));
    }
    shadowed.extend(declared_in_body(&rule.body));
    let ignore = vec![shadowed];

    if let Some(key) = &mut rule.head.key {
        resolve_term(key, globals, &ignore);
    }
    if let Some(value) = &mut rule.head.value {
        resolve_term(value, globals, &ignore);
    }
    for expr in rule.body.iter_mut() {
        resolve_expr(expr, globals, &ignore);
    }

    if let Some(else_rule) = &mut rule.else_rule {
        resolve_rule(else_rule, globals, errors);
    }
}

/// Variables bound by `:=` assignments and `some` declarations directly in
/// this body (nested comprehension bodies track their own declarations).
fn declared_in_body(body: &Body) -> BTreeSet<Var> {
    let mut out = BTreeSet::new();
    for expr in body.iter() {
        match &expr.terms {
            ExprTerms::SomeDecl(decl) => {
                for sym in &decl.symbols {
                    match &sym.value {
                        Value::Var(v) => {
                            out.insert(v.clone());
                        }
                        Value::Call(call) => {
                            // `some k, v in xs`: everything before the
                            // collection argument is a declaration.
                            let args = call.args();
                            for declared in &args[..args.len().saturating_sub(1)] {
                                if let Value::Var(v) = &declared.value {
                                    out.insert(v.clone());
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            ExprTerms::Call(_) if expr.is_assignment() => {
                if let Some(Value::Var(v)) = expr.operands().first().map(|t| &t.value) {
                    out.insert(v.clone());
                }
            }
            _ => {}
        }
    }
    out
}

fn is_ignored(var: &Var, ignore: &[BTreeSet<Var>]) -> bool {
    ignore.iter().any(|scope| scope.contains(var))
}

fn resolve_expr(expr: &mut Expr, globals: &BTreeMap<Var, Ref>, ignore: &[BTreeSet<Var>]) {
    match &mut expr.terms {
        ExprTerms::Term(t) => resolve_term(t, globals, ignore),
        ExprTerms::Call(terms) => {
            for t in terms.iter_mut() {
                resolve_term(t, globals, ignore);
            }
        }
        ExprTerms::SomeDecl(decl) => {
            for sym in &mut decl.symbols {
                if let Value::Call(call) = &mut sym.value {
                    // Only the collection argument refers to the outer
                    // scope; the iteration variables are declarations.
                    if let Some(collection) = call.0.last_mut() {
                        resolve_term(collection, globals, ignore);
                    }
                }
            }
        }
    }
    for w in &mut expr.with {
        resolve_term(&mut w.target, globals, ignore);
        resolve_term(&mut w.value, globals, ignore);
    }
}

fn resolve_term(term: &mut Term, globals: &BTreeMap<Var, Ref>, ignore: &[BTreeSet<Var>]) {
    match &mut term.value {
        Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {}
        Value::Var(v) => {
            if !v.is_wildcard() && !is_ignored(v, ignore) {
                if let Some(global) = globals.get(v) {
                    term.value = Value::Ref(global.clone());
                }
            }
        }
        Value::Ref(r) => {
            for op in r.0.iter_mut().skip(1) {
                resolve_term(op, globals, ignore);
            }
            let substitute = r.head_var().and_then(|head| {
                if is_ignored(head, ignore) {
                    None
                } else {
                    globals.get(head)
                }
            });
            if let Some(global) = substitute {
                *r = global.concat(r.operands());
            }
        }
        Value::Array(arr) => {
            for t in arr.0.iter_mut() {
                resolve_term(t, globals, ignore);
            }
        }
        Value::Object(obj) => {
            let pairs: Vec<(Term, Term)> = obj
                .iter()
                .map(|(k, v)| {
                    let mut k = k.clone();
                    let mut v = v.clone();
                    resolve_term(&mut k, globals, ignore);
                    resolve_term(&mut v, globals, ignore);
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
                    resolve_term(&mut t, globals, ignore);
                    t
                })
                .collect();
            *set = Set::from_elems(elems);
        }
        Value::ArrayComprehension(c) => {
            let mut nested = ignore.to_vec();
            nested.push(declared_in_body(&c.body));
            resolve_term(&mut c.term, globals, &nested);
            resolve_closure_body(&mut c.body, globals, &nested);
        }
        Value::SetComprehension(c) => {
            let mut nested = ignore.to_vec();
            nested.push(declared_in_body(&c.body));
            resolve_term(&mut c.term, globals, &nested);
            resolve_closure_body(&mut c.body, globals, &nested);
        }
        Value::ObjectComprehension(c) => {
            let mut nested = ignore.to_vec();
            nested.push(declared_in_body(&c.body));
            resolve_term(&mut c.key, globals, &nested);
            resolve_term(&mut c.value, globals, &nested);
            resolve_closure_body(&mut c.body, globals, &nested);
        }
        Value::Call(Call(terms)) => {
            for t in terms.iter_mut() {
                resolve_term(t, globals, ignore);
            }
        }
    }
}

fn resolve_closure_body(body: &mut Body, globals: &BTreeMap<Var, Ref>, ignore: &[BTreeSet<Var>]) {
    for expr in body.iter_mut() {
        resolve_expr(expr, globals, ignore);
    }
}
