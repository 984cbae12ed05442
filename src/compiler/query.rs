//! Ad-hoc query compilation.
//!
//! Applies the same resolver, rewriters, and safety analysis as module
//! compilation to a single body, within an optional package/imports
//! context. Locals use the distinct `__localq<k>__` prefix so query locals
//! never collide with module locals. Compiled results are cached: repeating
//! a query returns the same canonical body without mutating the input.

use crate::ast::{Body, Package};
use crate::compiler::locals::LocalVarGenerator;
use crate::compiler::{ref_values, resolver, rewrites, safety, Compiler};
use crate::errors::{Error, Errors};
use crate::value::{Ref, Var};
use std::collections::{BTreeMap, HashMap};

/// The package and imports a query is compiled within.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub package: Option<Package>,
    pub imports: Vec<crate::ast::Import>,
}

impl QueryContext {
    /// An empty context.
    pub fn new() -> Self {
        QueryContext::default()
    }

    /// Set the package whose exports the query can reference unqualified.
    pub fn with_package(mut self, package: Package) -> Self {
        self.package = Some(package);
        self
    }

    /// Set the imports visible to the query.
    pub fn with_imports(mut self, imports: Vec<crate::ast::Import>) -> Self {
        self.imports = imports;
        self
    }
}

/// Compiles ad-hoc query bodies against a compiled [`Compiler`].
pub struct QueryCompiler<'a> {
    compiler: &'a Compiler,
    context: QueryContext,
    cache: HashMap<Body, Body>,
}

impl<'a> QueryCompiler<'a> {
    pub(crate) fn new(compiler: &'a Compiler) -> Self {
        QueryCompiler {
            compiler,
            context: QueryContext::default(),
            cache: HashMap::new(),
        }
    }

    /// Set the query context for subsequent compiles.
    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = context;
        self
    }

    /// Compile a query body into its canonical form.
    pub fn compile(&mut self, body: &Body) -> Result<Body, Errors> {
        if let Some(cached) = self.cache.get(body) {
            return Ok(cached.clone());
        }

        let mut compiled = body.clone();
        let mut errors = Errors::new();

        let globals = self.globals();
        resolver::resolve_body(&mut compiled, &globals);

        let mut gen = LocalVarGenerator::for_query(&compiled);
        for err in rewrites::rewrite_local_vars_in_body(&mut compiled, &mut gen) {
            errors.push(err);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        rewrites::rewrite_equals_in_body(&mut compiled);
        rewrites::rewrite_dynamics_in_body(&mut compiled, &mut gen);
        rewrites::rewrite_comprehension_terms_in_body(&mut compiled, &mut gen);

        let paths = rewrites::RulePathIndex::build(self.compiler.modules.values());
        for err in rewrites::rewrite_with_modifiers_in_body(&mut compiled, &mut gen, &paths) {
            errors.push(err);
        }
        for err in rewrites::rewrite_print_calls_in_body(
            &mut compiled,
            &safety::reserved_vars(),
            &mut gen,
            self.compiler.enable_print_statements,
        ) {
            errors.push(err);
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let arities = self.compiler.function_arities();
        let arity = move |r: &Ref| arities.get(&ref_values(r)).copied();
        let ctx = safety::SafetyContext {
            capabilities: &self.compiler.capabilities,
            arity: &arity,
        };
        let (reordered, unsafe_vars) =
            safety::reorder_body_for_safety(&ctx, &safety::reserved_vars(), compiled);
        for unsafe_var in unsafe_vars {
            errors.push(Error::unsafe_var(
                unsafe_var.location.clone(),
                format!("var {} is unsafe", unsafe_var.var),
            ));
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        let compiled = reordered;

        self.check_calls(&compiled, &mut errors);
        if !errors.is_empty() {
            return Err(errors);
        }

        self.cache.insert(body.clone(), compiled.clone());
        Ok(compiled)
    }

    /// Globals visible to the query: the context package's exports plus the
    /// context imports.
    fn globals(&self) -> BTreeMap<Var, Ref> {
        let mut globals = BTreeMap::new();
        if let Some(pkg) = &self.context.package {
            for module in self.compiler.modules.values() {
                if module.package.path == pkg.path {
                    for rule in &module.rules {
                        globals.insert(rule.head.name.clone(), rule.path_in(&module.package));
                    }
                }
            }
        }
        for imp in &self.context.imports {
            if let (Some(name), crate::value::Value::Ref(path)) =
                (imp.name(), &imp.path.value)
            {
                globals.insert(name, path.clone());
            }
        }
        globals
    }

    fn check_calls(&self, body: &Body, errors: &mut Errors) {
        let arities = self.compiler.function_arities();
        for expr in body.iter() {
            let Some(op) = expr.operator() else { continue };
            let Some(name) = crate::ast::operator_name(op) else {
                continue;
            };
            if self.compiler.unsafe_builtins.contains(&name) {
                errors.push(Error::compile(
                    expr.location.get(),
                    format!("unsafe built-in function calls in expression: {name}"),
                ));
                continue;
            }
            if let Some(builtin) = self.compiler.capabilities.get(&name) {
                if builtin.deprecated {
                    errors.push(Error::type_err(
                        expr.location.get(),
                        format!("deprecated built-in function calls in expression: {name}"),
                    ));
                }
                let operands = expr.operands().len();
                if !builtin.variadic
                    && operands != builtin.arity
                    && operands != builtin.arity + 1
                {
                    errors.push(Error::type_err(
                        expr.location.get(),
                        format!(
                            "{name}: arity mismatch (expected {} args, got {operands})",
                            builtin.arity
                        ),
                    ));
                }
            } else if !arities.contains_key(&ref_values(op)) {
                errors.push(Error::type_err(
                    expr.location.get(),
                    format!("undefined function {op}"),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Module;
    use crate::parser::{parse_body, parse_module};
    use std::collections::BTreeMap;

    fn compiled_modules(sources: &[(&str, &str)]) -> Compiler {
        let modules: BTreeMap<String, Module> = sources
            .iter()
            .map(|(name, src)| {
                (
                    (*name).to_string(),
                    parse_module(name, src).expect("parse"),
                )
            })
            .collect();
        let mut compiler = Compiler::new();
        compiler.compile(&modules);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);
        compiler
    }

    #[test]
    fn test_query_resolves_against_context() {
        let compiler = compiled_modules(&[("m.warden", "package a\np = 1 { true }")]);
        let module = parse_module("ctx", "package a\nq = 1").expect("parse");
        let mut qc = compiler
            .query_compiler()
            .with_context(QueryContext::new().with_package(module.package));

        let body = parse_body("<query>", "p = x").expect("parse");
        let compiled = qc.compile(&body).expect("compile");
        assert_eq!(
            compiled.0[0].operands()[0].value.to_string(),
            "data.a.p"
        );
        // The input body is untouched.
        assert_eq!(body.0[0].operands()[0].value.to_string(), "p");
    }

    #[test]
    fn test_query_locals_use_query_prefix() {
        let compiler = compiled_modules(&[("m.warden", "package a\np = 1 { true }")]);
        let mut qc = compiler.query_compiler();
        let body = parse_body("<query>", "x := 1").expect("parse");
        let compiled = qc.compile(&body).expect("compile");
        assert_eq!(
            compiled.0[0].operands()[0].value.to_string(),
            "__localq0__"
        );
    }

    #[test]
    fn test_query_safety_reordering() {
        let compiler = compiled_modules(&[("m.warden", "package a\np = 1 { true }")]);
        let mut qc = compiler.query_compiler();
        let body = parse_body("<query>", "x > 0; x = input.n").expect("parse");
        let compiled = qc.compile(&body).expect("compile");
        assert_eq!(compiled.0[0].operator_name().as_deref(), Some("eq"));
        assert_eq!(compiled.0[1].operator_name().as_deref(), Some("gt"));
    }

    #[test]
    fn test_query_unsafe_var() {
        let compiler = compiled_modules(&[("m.warden", "package a\np = 1 { true }")]);
        let mut qc = compiler.query_compiler();
        let body = parse_body("<query>", "not input.x = y").expect("parse");
        let errs = qc.compile(&body).expect_err("unsafe");
        assert!(errs.iter().any(|e| e.message == "var y is unsafe"));
    }

    #[test]
    fn test_query_cache_is_stable() {
        let compiler = compiled_modules(&[("m.warden", "package a\np = 1 { true }")]);
        let mut qc = compiler.query_compiler();
        let body = parse_body("<query>", "x := input.a; x > 1").expect("parse");
        let first = qc.compile(&body).expect("compile");
        let second = qc.compile(&body).expect("compile");
        assert_eq!(first, second);
    }

    #[test]
    fn test_query_undefined_function() {
        let compiler = compiled_modules(&[("m.warden", "package a\np = 1 { true }")]);
        let mut qc = compiler.query_compiler();
        let body = parse_body("<query>", "no_such_fn(1)").expect("parse");
        let errs = qc.compile(&body).expect_err("undefined");
        assert!(errs
            .iter()
            .any(|e| e.message.contains("undefined function")));
    }
}
