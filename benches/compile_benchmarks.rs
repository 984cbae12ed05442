//! Compile performance benchmarks: resolution, rewriting, safety, and
//! index construction over synthetic policy sets.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use warden::ast::Module;
use warden::{parse_body, parse_module, Compiler};

fn make_modules(packages: usize, rules_per_package: usize) -> BTreeMap<String, Module> {
    let mut modules = BTreeMap::new();
    for p in 0..packages {
        let mut src = format!("package app.pkg{p}\n");
        for r in 0..rules_per_package {
            src.push_str(&format!(
                "rule{r} = x {{ x = input.requests[_].pkg{p}; x != \"skip\" }}\n"
            ));
        }
        // A dispatch document that the equality index discriminates.
        for r in 0..rules_per_package {
            src.push_str(&format!(
                "route = {r} {{ input.method = \"m{r}\"; input.tier = \"gold\" }}\n"
            ));
        }
        let name = format!("pkg{p}.warden");
        let module = parse_module(&name, &src).expect("parse");
        modules.insert(name, module);
    }
    modules
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for (packages, rules) in [(1usize, 8usize), (4, 16), (16, 16)] {
        let modules = make_modules(packages, rules);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{packages}x{rules}")),
            &modules,
            |b, modules| {
                b.iter(|| {
                    let mut compiler = Compiler::new();
                    compiler.compile(modules);
                    assert!(!compiler.failed(), "errors: {}", compiler.errors);
                    compiler
                });
            },
        );
    }
    group.finish();
}

fn bench_query_compile(c: &mut Criterion) {
    let modules = make_modules(4, 8);
    let mut compiler = Compiler::new();
    compiler.compile(&modules);
    assert!(!compiler.failed(), "errors: {}", compiler.errors);

    let body = parse_body("<query>", "x := data.app.pkg0.rule0; count([x], n); n > 0")
        .expect("parse");

    c.bench_function("query_compile", |b| {
        b.iter(|| {
            let mut qc = compiler.query_compiler();
            qc.compile(&body).expect("compile")
        });
    });
}

criterion_group!(benches, bench_compile, bench_query_compile);
criterion_main!(benches);
