//! Fresh local variable generation.
//!
//! Rewrite stages replace wildcards, assigned variables, and extracted
//! subterms with fresh locals of the shape `__local<k>__`. The counter is
//! per-module; names already present in the module are skipped so repeated
//! compiles never collide with user variables. The query compiler uses a
//! distinct `__localq<k>__` prefix so query locals cannot collide with
//! module locals.

use crate::ast::visit::{VarCollector, VarVisitorParams};
use crate::ast::{Body, Module};
use crate::value::Var;
use std::collections::BTreeSet;

/// Produces fresh variable names unique within one module or query.
#[derive(Debug)]
pub struct LocalVarGenerator {
    prefix: &'static str,
    counter: usize,
    taken: BTreeSet<Var>,
}

impl LocalVarGenerator {
    /// A generator for a module, seeded with every variable the module
    /// currently mentions.
    pub fn for_module(module: &Module) -> Self {
        let mut collector = VarCollector::new(VarVisitorParams::default());
        for rule in &module.rules {
            for chained in rule.chain() {
                for arg in &chained.head.args {
                    collector.collect_term(arg);
                }
                if let Some(key) = &chained.head.key {
                    collector.collect_term(key);
                }
                if let Some(value) = &chained.head.value {
                    collector.collect_term(value);
                }
                collector.collect_body(&chained.body);
            }
        }
        LocalVarGenerator {
            prefix: "",
            counter: 0,
            taken: collector.into_set(),
        }
    }

    /// A generator for an ad-hoc query body.
    pub fn for_query(body: &Body) -> Self {
        let mut collector = VarCollector::new(VarVisitorParams::default());
        collector.collect_body(body);
        LocalVarGenerator {
            prefix: "q",
            counter: 0,
            taken: collector.into_set(),
        }
    }

    /// The next fresh variable.
    pub fn next_var(&mut self) -> Var {
        loop {
            let candidate = Var::new(format!("__local{}{}__", self.prefix, self.counter));
            self.counter += 1;
            if !self.taken.contains(&candidate) {
                self.taken.insert(candidate.clone());
                return candidate;
            }
        }
    }
}
