//! End-to-end compile scenarios.
//!
//! Each test compiles literal policy source and asserts on the canonical
//! output form or the reported errors.

use std::collections::BTreeMap;
use warden::ast::Module;
use warden::{parse_module, Compiler, ErrorKind};

fn compile(sources: &[(&str, &str)]) -> Compiler {
    let modules: BTreeMap<String, Module> = sources
        .iter()
        .map(|(name, src)| ((*name).to_string(), parse_module(name, src).expect("parse")))
        .collect();
    let mut compiler = Compiler::new();
    compiler.compile(&modules);
    compiler
}

fn body_strings(compiler: &Compiler, module: &str, rule: usize) -> Vec<String> {
    compiler.modules[module].rules[rule]
        .body
        .iter()
        .map(|e| e.to_string())
        .collect()
}

#[test]
fn scenario_import_resolution() {
    let compiler = compile(&[(
        "m.warden",
        "package a.b\n\
         import data.foo.bar\n\
         p[x] { bar[_] = x }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let module = &compiler.modules["m.warden"];
    assert!(module.imports.is_empty());

    let expr = &module.rules[0].body.0[0];
    assert_eq!(
        expr.operands()[0].value.to_string(),
        "data.foo.bar[__local0__]"
    );
    assert_eq!(expr.operands()[1].value.to_string(), "x");
}

#[test]
fn scenario_head_ref_rewrite() {
    let compiler = compile(&[(
        "m.warden",
        "package a.b\n\
         import data.doc1 as bar\n\
         import input.x.y.foo\n\
         import input.qux as baz\n\
         p[foo[bar[i]]] = {\"baz\": baz} { true }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let rule = &compiler.modules["m.warden"].rules[0];
    assert_eq!(
        rule.head.key.as_ref().map(|t| t.value.to_string()),
        Some("__local0__".to_string())
    );
    assert_eq!(
        rule.head.value.as_ref().map(|t| t.value.to_string()),
        Some("__local1__".to_string())
    );

    // The head bindings are realized as equalities in the body; the nested
    // reference is additionally flattened into its own binding.
    let body = body_strings(&compiler, "m.warden", 0);
    assert!(
        body.contains(&"eq(__local2__, data.doc1[i])".to_string()),
        "body: {body:?}"
    );
    assert!(
        body.contains(&"eq(__local0__, input.x.y.foo[__local2__])".to_string()),
        "body: {body:?}"
    );
    assert!(
        body.contains(&"eq(__local1__, {\"baz\": input.qux})".to_string()),
        "body: {body:?}"
    );
}

#[test]
fn scenario_safety_reordering() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p { x != 0; count([1, 2, 3], x) }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let body = &compiler.modules["m.warden"].rules[0].body;
    let ops: Vec<Option<String>> = body.iter().map(|e| e.operator_name()).collect();
    assert_eq!(
        ops,
        vec![Some("count".to_string()), Some("neq".to_string())]
    );
    let indices: Vec<usize> = body.iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn scenario_recursion() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p { q }\n\
         q { p }",
    )]);
    assert!(compiler.failed());

    let messages: Vec<&str> = compiler
        .errors
        .iter()
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(
        messages,
        vec![
            "rule p is recursive: p -> q -> p",
            "rule q is recursive: q -> p -> q",
        ]
    );
    for err in &compiler.errors {
        assert_eq!(err.kind, ErrorKind::Recursion);
    }
}

#[test]
fn scenario_rule_conflict() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p[x] { x = 1 }\n\
         p = {1, 2, 3} { true }",
    )]);
    assert!(compiler.failed());
    assert_eq!(compiler.errors.len(), 1);
    let err = &compiler.errors.0[0];
    assert_eq!(err.kind, ErrorKind::Type);
    assert_eq!(err.message, "conflicting rules named p found");
}

#[test]
fn scenario_unsafe_variables() {
    let compiler = compile(&[(
        "m.warden",
        "package t\np { not a[i] = x; a = [1, 2, 3, 4] }",
    )]);
    assert!(compiler.failed());

    let errs: Vec<_> = compiler.errors.iter().collect();
    assert_eq!(errs.len(), 2, "errors: {}", compiler.errors);
    assert_eq!(errs[0].message, "var i is unsafe");
    assert_eq!(errs[1].message, "var x is unsafe");

    // Locations point into the original text.
    let i_loc = errs[0].location.as_ref().expect("location");
    assert_eq!((i_loc.row, i_loc.col), (2, 11));
    let x_loc = errs[1].location.as_ref().expect("location");
    assert_eq!((x_loc.row, x_loc.col), (2, 16));
    for err in errs {
        assert_eq!(err.kind, ErrorKind::UnsafeVar);
    }
}

#[test]
fn heads_contain_no_refs_after_compilation() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         import input.users\n\
         p[users[i].name] = users[i].role { true }\n\
         q = [x | x = input.xs[_]] { true }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    for module in compiler.modules.values() {
        for rule in &module.rules {
            for term in rule.head.key.iter().chain(rule.head.value.iter()) {
                assert!(
                    !term.value.requires_eval(),
                    "head still requires eval: {term}"
                );
            }
        }
    }
}

#[test]
fn assignment_and_equality_rewrites() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p { x := 7; x == 7 }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let body = body_strings(&compiler, "m.warden", 0);
    // := declares a fresh local; both expressions are unification after
    // compilation.
    assert_eq!(
        body,
        vec![
            "eq(__local0__, 7)".to_string(),
            "eq(__local0__, 7)".to_string(),
        ]
    );
}

#[test]
fn assignment_errors() {
    let cases = [
        (
            "package t\np { not x := 1 }",
            "cannot assign vars inside negated expression",
        ),
        ("package t\np { [1] := 2 }", "cannot assign to array"),
        (
            "package t\np { x := 1; x := 2 }",
            "var x assigned above",
        ),
        (
            "package t\np { y = x; x := 1; y = 1 }",
            "var x referenced above",
        ),
    ];
    for (src, expected) in cases {
        let compiler = compile(&[("m.warden", src)]);
        assert!(compiler.failed(), "expected failure for {src}");
        assert!(
            compiler.errors.iter().any(|e| e.message == expected),
            "missing {expected:?} for {src}: {}",
            compiler.errors
        );
    }
}

#[test]
fn some_in_lowered_to_membership() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p[k] { some k, v in input.xs; v = 1 }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let body = body_strings(&compiler, "m.warden", 0);
    assert!(
        body.iter()
            .any(|e| e.starts_with("internal.member_3(__local0__, __local1__")),
        "body: {body:?}"
    );
    // The declared key is visible from the head as a local.
    let rule = &compiler.modules["m.warden"].rules[0];
    assert_eq!(
        rule.head.key.as_ref().map(|t| t.value.to_string()),
        Some("__local0__".to_string())
    );
}

#[test]
fn with_modifier_target_validation() {
    let compiler = compile(&[(
        "m.warden",
        "package t\np { input.x = 1 with foo.bar as 7 }",
    )]);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.message == "with keyword target must start with input or data"));
}

#[test]
fn with_modifier_cannot_replace_functions() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         f(x) = y { y = x }\n\
         p { input.x = 1 with data.t.f as 7 }",
    )]);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.message == "with keyword cannot replace functions"));
}

#[test]
fn with_modifier_cannot_partially_replace_virtual_docs() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         q = {\"a\": 1} { true }\n\
         p { input.x = 1 with data.t.q.a as 7 }",
    )]);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.message == "with keyword cannot partially replace virtual document(s)"));
}

#[test]
fn with_modifier_value_bound_to_local() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p { input.x = 1 with input.y as [input.z, 2] }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let body = &compiler.modules["m.warden"].rules[0].body;
    // The non-ground value is bound before the modified expression.
    assert!(body.len() >= 2, "body: {body}");
    let last = &body.0[body.len() - 1];
    assert_eq!(last.with.len(), 1);
    assert!(matches!(
        last.with[0].value.value,
        warden::value::Value::Var(_)
    ));
}

#[test]
fn print_calls_erased_by_default() {
    let compiler = compile(&[(
        "m.warden",
        "package t\np { print(input.x) }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);
    let body = body_strings(&compiler, "m.warden", 0);
    assert_eq!(body, vec!["true".to_string()]);
}

#[test]
fn print_calls_lowered_when_enabled() {
    let modules: BTreeMap<String, Module> = [(
        "m.warden".to_string(),
        parse_module(
            "m.warden",
            "package t\np { x = input.a; print(x) }",
        )
        .expect("parse"),
    )]
    .into_iter()
    .collect();
    let mut compiler = Compiler::new().with_print_statements(true);
    compiler.compile(&modules);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let body: Vec<String> = compiler.modules["m.warden"].rules[0]
        .body
        .iter()
        .map(|e| e.to_string())
        .collect();
    assert!(
        body.iter().any(|e| e.starts_with("internal.print(")),
        "body: {body:?}"
    );
}

#[test]
fn print_undeclared_var_is_error() {
    let modules: BTreeMap<String, Module> = [(
        "m.warden".to_string(),
        parse_module("m.warden", "package t\np { print(zzz) }").expect("parse"),
    )]
    .into_iter()
    .collect();
    let mut compiler = Compiler::new().with_print_statements(true);
    compiler.compile(&modules);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.message == "var zzz is undeclared"));
}

#[test]
fn deprecated_builtins_flagged() {
    let compiler = compile(&[(
        "m.warden",
        "package t\np { all([true, true]) }",
    )]);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.message == "deprecated built-in function calls in expression: all"));
}

#[test]
fn undefined_function_flagged() {
    let compiler = compile(&[(
        "m.warden",
        "package t\np { data.missing.fn(1, 2) }",
    )]);
    assert!(compiler.failed());
    assert!(
        compiler
            .errors
            .iter()
            .any(|e| e.message.contains("undefined function data.missing.fn")),
        "errors: {}",
        compiler.errors
    );
}

#[test]
fn arity_mismatch_flagged() {
    let compiler = compile(&[(
        "m.warden",
        "package t\np { count([1], 2, 3, 4) }",
    )]);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.message.contains("count: arity mismatch")));
}

#[test]
fn rule_tree_size_equals_rule_count() {
    let compiler = compile(&[
        ("m1.warden", "package a\np = 1 { true }\nq[x] { x = 1 }"),
        ("m2.warden", "package a.b.c\nr = 2 { true }"),
        ("m3.warden", "package empty.pkg\n"),
    ]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);
    assert_eq!(compiler.rule_tree.size(), 3);
    assert_eq!(compiler.num_rules(), 3);
}

#[test]
fn dependency_graph_cycle_iff_recursion_errors() {
    let acyclic = compile(&[(
        "m.warden",
        "package t\np { q = 1 }\nq = 1 { true }",
    )]);
    assert!(!acyclic.failed(), "errors: {}", acyclic.errors);
    assert!(acyclic.graph.sort().is_some());

    let cyclic = compile(&[("m.warden", "package t\np { q }\nq { p }")]);
    assert!(cyclic.failed());
    assert!(cyclic.graph.sort().is_none());
    assert!(cyclic
        .errors
        .iter()
        .all(|e| e.kind == ErrorKind::Recursion));
}

#[test]
fn recursion_through_dynamic_refs_detected() {
    // data[x].q can resolve to this package's own q, so the recursion goes
    // through data-driven indirection.
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p { data[x].q = 1 }\n\
         q { p }",
    )]);
    assert!(compiler.failed());
    assert!(compiler
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::Recursion));
}

#[test]
fn compilation_is_idempotent_on_compiled_modules() {
    let first = compile(&[(
        "m.warden",
        "package a.b\n\
         import data.foo.bar\n\
         p[x] { bar[_] = x; y := count(bar); y > 0 }",
    )]);
    assert!(!first.failed(), "errors: {}", first.errors);

    let mut second = Compiler::new();
    second.compile(&first.modules);
    assert!(!second.failed(), "errors: {}", second.errors);

    for (name, module) in &first.modules {
        assert_eq!(
            module.rules, second.modules[name].rules,
            "recompilation changed {name}"
        );
    }
}

#[test]
fn comprehension_bodies_are_safe_in_outer_scope() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p = ys {\n\
           xs = input.items\n\
           ys = [name | name = xs[_].name]\n\
         }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);
}

#[test]
fn else_chains_compile() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         p = 1 { input.a = 1 } else = 2 { input.a = 2 } else = 3",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);
    let rule = &compiler.modules["m.warden"].rules[0];
    assert_eq!(rule.chain().len(), 3);
}

#[test]
fn default_rules_compile() {
    let compiler = compile(&[(
        "m.warden",
        "package t\n\
         default allow = false\n\
         allow { input.admin = true }",
    )]);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);
    let rule = &compiler.modules["m.warden"].rules[0];
    assert!(rule.default);
    assert!(rule.body.0[0].is_trivially_true());
}
