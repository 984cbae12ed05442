//! Rule conflict detection.
//!
//! Rules sharing a path must produce a uniform document kind, declare at
//! most one default, agree on function arity, and not mix `:=` with `=`
//! declarations. Package paths must not collide with rule paths.

use crate::ast::{Import, Module, Rule};
use crate::errors::Error;
use crate::value::Value;
use std::collections::BTreeMap;

/// Report imports that bind the same name twice in one module.
pub fn check_duplicate_imports(imports: &[Import]) -> Vec<Error> {
    let mut errors = Vec::new();
    let mut seen: BTreeMap<String, &Import> = BTreeMap::new();
    for imp in imports {
        let Some(name) = imp.name() else { continue };
        if seen.contains_key(name.as_str()) {
            errors.push(Error::compile(
                imp.location.get(),
                format!("import must not shadow import {name}"),
            ));
        } else {
            seen.insert(name.as_str().to_string(), imp);
        }
    }
    errors
}

/// Check every rule path across the module set for conflicting
/// declarations.
pub fn check_rule_conflicts(modules: &BTreeMap<String, Module>) -> Vec<Error> {
    let mut errors = Vec::new();

    let mut by_path: BTreeMap<Vec<Value>, Vec<&Rule>> = BTreeMap::new();
    for module in modules.values() {
        for rule in &module.rules {
            let path: Vec<Value> = rule
                .path_in(&module.package)
                .iter()
                .map(|t| t.value.clone())
                .collect();
            by_path.entry(path).or_default().push(rule);
        }
    }

    for (path, rules) in &by_path {
        let name = path_name(path);

        let kinds: Vec<_> = rules.iter().map(|r| r.head.kind()).collect();
        let uniform_kind = kinds.windows(2).all(|w| w[0] == w[1]);
        let arities: Vec<usize> = rules.iter().map(|r| r.head.args.len()).collect();
        let uniform_arity = arities.windows(2).all(|w| w[0] == w[1]);
        if !uniform_kind || !uniform_arity {
            errors.push(Error::type_err(
                rules[0].location.get(),
                format!("conflicting rules named {name} found"),
            ));
        }

        let defaults: Vec<&&Rule> = rules.iter().filter(|r| r.default).collect();
        if defaults.len() > 1 {
            errors.push(Error::type_err(
                defaults[1].location.get(),
                format!("multiple default rules named {name} found"),
            ));
        }

        let any_assign = rules.iter().any(|r| r.head.assign);
        let any_unify = rules.iter().any(|r| !r.head.assign);
        if rules.len() > 1 && any_assign && any_unify {
            errors.push(Error::type_err(
                rules[1].location.get(),
                format!("rule named {name} redeclared"),
            ));
        }
    }

    // Packages whose path coincides with a rule path.
    for module in modules.values() {
        let pkg_path: Vec<Value> = module
            .package
            .path
            .iter()
            .map(|t| t.value.clone())
            .collect();
        if let Some(rules) = by_path.get(&pkg_path) {
            let location_text = rules[0]
                .location
                .get()
                .map_or_else(|| "<unknown>".to_string(), |l| l.to_string());
            errors.push(Error::type_err(
                module.package.location.get(),
                format!(
                    "{} conflicts with rule defined at {location_text}",
                    module.package
                ),
            ));
        }
    }

    errors
}

fn path_name(path: &[Value]) -> String {
    match path.last() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
