//! # Compile Pipeline
//!
//! The compiler driver: a fixed, named sequence of stages run over a deep
//! copy of the caller's modules. Stages mutate the copies in place and fill
//! the side tables (module tree, rule tree, dependency graph, annotation
//! set, base-document equality indexes) that the evaluator queries.
//!
//! ```text
//! Parsed modules
//!     |
//! [ResolveRefs]             -> fully-qualified references, imports cleared
//! [RewriteLocalVars]        -> :=, some, wildcards become locals
//! [CheckDuplicateImports]
//! [RewriteRuleHeadRefs]     -> heads contain only atoms/vars/literals
//! [CheckRuleConflicts]
//! [Rewrite*]                -> ==, dynamic terms, comprehension terms,
//!                              with modifiers, print calls
//! [BuildModuleTree]
//! [BuildRuleTree]           -> rule registry + annotation set
//! [BuildDependencyGraph]
//! [CheckRecursion]
//! [CheckSafetyRuleHeads]
//! [CheckSafetyRuleBodies]   -> bodies reordered for safety
//! [CheckTypes]
//! [BuildRuleIndexes]
//! [CheckUndefinedFuncs]
//! [CheckDeprecatedBuiltins]
//! ```
//!
//! After any stage that leaves errors the remaining stages are skipped.
//! Exceeding the error limit truncates the list and appends a sentinel
//! "error limit reached" entry.

use crate::annotations::{AnnotationSet, AnnotationTarget, AnnotationsRef};
use crate::ast::visit::{self, GenericVisitor, Node};
use crate::ast::{Module, Rule, RuleKind};
use crate::capabilities::Capabilities;
use crate::errors::{Error, Errors, ERROR_LIMIT_REACHED};
use crate::graph::{Graph, RuleId};
use crate::index::BaseDocEqIndex;
use crate::loader::ModuleLoader;
use crate::location::Location;
use crate::metrics::Metrics;
use crate::tree::TreeNode;
use crate::value::{Ref, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

pub mod conflicts;
pub mod locals;
pub mod query;
pub mod resolver;
pub mod rewrites;
pub mod safety;

pub use query::{QueryCompiler, QueryContext};

use locals::LocalVarGenerator;
use safety::SafetyContext;

/// A caller-provided hook run after a named stage completes successfully.
pub type StageHook = Box<dyn Fn(&Compiler) -> Result<(), Errors>>;

/// Identifies a rule inside the compiler's module set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRef {
    pub module: String,
    pub index: usize,
}

/// The policy compiler.
///
/// A `Compiler` is single-threaded: [`Compiler::compile`] runs to completion
/// before returning and must not be re-entered. After a successful compile
/// the instance is read-only and safe to share among concurrent readers.
pub struct Compiler {
    /// Compiled modules, keyed by the caller-supplied names.
    pub modules: BTreeMap<String, Module>,
    /// Errors accumulated by the last compile.
    pub errors: Errors,
    /// Module names hosted at package path nodes.
    pub module_tree: TreeNode<String>,
    /// Rule ids hosted at rule path nodes.
    pub rule_tree: TreeNode<RuleId>,
    /// Rule-to-rule dependency edges.
    pub graph: Graph,
    /// Scope-keyed metadata indexes.
    pub annotations: AnnotationSet,
    /// Per-stage wall-time metrics.
    pub metrics: Metrics,

    rules: Vec<RuleRef>,
    rule_indexes: BTreeMap<Vec<Value>, BaseDocEqIndex>,
    imports_by_module: BTreeMap<String, Vec<crate::ast::Import>>,
    locals: BTreeMap<String, LocalVarGenerator>,

    error_limit: usize,
    capabilities: Capabilities,
    unsafe_builtins: BTreeSet<String>,
    enable_print_statements: bool,
    loader: Option<Box<dyn ModuleLoader>>,
    hooks: Vec<(String, StageHook)>,
}

type StageFn = fn(&mut Compiler);

/// The fixed stage sequence. Order matters: later stages assume the AST is
/// in the canonical form earlier stages produce.
const STAGES: &[(&str, StageFn)] = &[
    ("ResolveRefs", Compiler::stage_resolve_refs),
    ("RewriteLocalVars", Compiler::stage_rewrite_local_vars),
    ("CheckDuplicateImports", Compiler::stage_check_duplicate_imports),
    ("RewriteRuleHeadRefs", Compiler::stage_rewrite_rule_head_refs),
    ("CheckRuleConflicts", Compiler::stage_check_rule_conflicts),
    ("RewriteEquals", Compiler::stage_rewrite_equals),
    ("RewriteDynamicTerms", Compiler::stage_rewrite_dynamic_terms),
    (
        "RewriteComprehensionTerms",
        Compiler::stage_rewrite_comprehension_terms,
    ),
    ("RewriteWithModifiers", Compiler::stage_rewrite_with_modifiers),
    ("RewritePrintCalls", Compiler::stage_rewrite_print_calls),
    ("BuildModuleTree", Compiler::stage_build_module_tree),
    ("BuildRuleTree", Compiler::stage_build_rule_tree),
    ("BuildDependencyGraph", Compiler::stage_build_dependency_graph),
    ("CheckRecursion", Compiler::stage_check_recursion),
    ("CheckSafetyRuleHeads", Compiler::stage_check_safety_rule_heads),
    ("CheckSafetyRuleBodies", Compiler::stage_check_safety_rule_bodies),
    ("CheckTypes", Compiler::stage_check_types),
    ("BuildRuleIndexes", Compiler::stage_build_rule_indexes),
    ("CheckUndefinedFuncs", Compiler::stage_check_undefined_funcs),
    (
        "CheckDeprecatedBuiltins",
        Compiler::stage_check_deprecated_builtins,
    ),
];

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

impl Compiler {
    /// A compiler with default capabilities and no error limit.
    pub fn new() -> Self {
        Compiler {
            modules: BTreeMap::new(),
            errors: Errors::new(),
            module_tree: TreeNode::new(),
            rule_tree: TreeNode::new(),
            graph: Graph::new(),
            annotations: AnnotationSet::new(),
            metrics: Metrics::new(),
            rules: Vec::new(),
            rule_indexes: BTreeMap::new(),
            imports_by_module: BTreeMap::new(),
            locals: BTreeMap::new(),
            error_limit: 0,
            capabilities: Capabilities::default_set(),
            unsafe_builtins: BTreeSet::new(),
            enable_print_statements: false,
            loader: None,
            hooks: Vec::new(),
        }
    }

    /// Bound the built-ins available to this compile.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Mark built-ins whose use is a compile error.
    pub fn with_unsafe_builtins<'a>(
        mut self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        self.unsafe_builtins = names.into_iter().map(String::from).collect();
        self
    }

    /// Install a lazy module loader consulted after reference resolution.
    pub fn with_module_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Install a hook that runs after the named stage succeeds.
    pub fn with_stage_after(
        mut self,
        stage: impl Into<String>,
        hook: impl Fn(&Compiler) -> Result<(), Errors> + 'static,
    ) -> Self {
        self.hooks.push((stage.into(), Box::new(hook)));
        self
    }

    /// Keep `print` calls, lowering them to `internal.print`. When disabled
    /// (the default) print calls are erased.
    pub fn with_print_statements(mut self, enabled: bool) -> Self {
        self.enable_print_statements = enabled;
        self
    }

    /// Cap the number of errors accumulated before the pipeline aborts with
    /// a sentinel entry. Zero means unlimited.
    pub fn set_error_limit(&mut self, limit: usize) -> &mut Self {
        self.error_limit = limit;
        self
    }

    /// True when the last compile reported errors.
    pub fn failed(&self) -> bool {
        !self.errors.is_empty()
    }

    /// A query compiler sharing this compiler's state.
    pub fn query_compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(self)
    }

    // ------------------------------------------------------------------
    // Driver
    // ------------------------------------------------------------------

    /// Compile a set of parsed modules.
    ///
    /// The input modules are deep-copied; the caller's ASTs are never
    /// mutated. On failure [`Compiler::errors`] is non-empty and the
    /// compiler's partial state must not be used for evaluation.
    pub fn compile(&mut self, modules: &BTreeMap<String, Module>) {
        self.reset();
        self.modules = modules.clone();

        for (name, stage) in STAGES {
            let started = Instant::now();
            stage(self);
            let elapsed = started.elapsed();
            self.metrics.record(name, elapsed);
            tracing::debug!(
                stage = name,
                elapsed_us = elapsed.as_micros() as u64,
                errors = self.errors.len(),
                "compile_stage_complete"
            );
            if self.enforce_error_limit() || !self.errors.is_empty() {
                return;
            }
            self.run_hooks(name);
            if self.enforce_error_limit() || !self.errors.is_empty() {
                return;
            }
        }
    }

    fn reset(&mut self) {
        self.modules = BTreeMap::new();
        self.errors = Errors::new();
        self.module_tree = TreeNode::new();
        self.rule_tree = TreeNode::new();
        self.graph = Graph::new();
        self.annotations = AnnotationSet::new();
        self.metrics.clear();
        self.rules = Vec::new();
        self.rule_indexes = BTreeMap::new();
        self.imports_by_module = BTreeMap::new();
        self.locals = BTreeMap::new();
    }

    fn run_hooks(&mut self, stage: &str) {
        let hooks = std::mem::take(&mut self.hooks);
        for (anchor, hook) in &hooks {
            if anchor == stage {
                if let Err(errs) = hook(self) {
                    self.errors.extend(errs);
                }
            }
        }
        self.hooks = hooks;
    }

    fn enforce_error_limit(&mut self) -> bool {
        if self.error_limit > 0 && self.errors.len() > self.error_limit {
            self.errors.0.truncate(self.error_limit);
            self.errors.push(Error::compile(None, ERROR_LIMIT_REACHED));
            true
        } else {
            false
        }
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    fn stage_resolve_refs(&mut self) {
        let names: Vec<String> = self.modules.keys().cloned().collect();
        self.resolve_modules(&names);

        if self.loader.is_none() {
            return;
        }
        loop {
            let mut loader = self.loader.take().expect("loader presence checked above");
            let result = loader.load(&self.modules);
            self.loader = Some(loader);
            match result {
                Err(err) => {
                    self.errors
                        .push(Error::compile(None, format!("module loader error: {err}")));
                    return;
                }
                Ok(new_modules) => {
                    let mut added = Vec::new();
                    for (name, module) in new_modules {
                        if let std::collections::btree_map::Entry::Vacant(entry) =
                            self.modules.entry(name.clone())
                        {
                            entry.insert(module);
                            added.push(name);
                        }
                    }
                    if added.is_empty() {
                        return;
                    }
                    self.resolve_modules(&added);
                }
            }
        }
    }

    fn resolve_modules(&mut self, names: &[String]) {
        let mut sorted = names.to_vec();
        sorted.sort();
        for name in sorted {
            if let Some(module) = self.modules.get_mut(&name) {
                self.imports_by_module
                    .insert(name.clone(), module.imports.clone());
                for err in resolver::resolve_module(module) {
                    self.errors.push(err);
                }
            }
        }
    }

    fn stage_rewrite_local_vars(&mut self) {
        self.with_each_module(|module, gen| rewrites::rewrite_local_vars(module, gen));
    }

    fn stage_check_duplicate_imports(&mut self) {
        // Imports are cleared during resolution; the pre-resolution copies
        // are kept for this check.
        let mut errors = Vec::new();
        for imports in self.imports_by_module.values() {
            errors.extend(conflicts::check_duplicate_imports(imports));
        }
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_rewrite_rule_head_refs(&mut self) {
        self.with_each_module(|module, gen| rewrites::rewrite_rule_head_refs(module, gen));
    }

    fn stage_check_rule_conflicts(&mut self) {
        for err in conflicts::check_rule_conflicts(&self.modules) {
            self.errors.push(err);
        }
    }

    fn stage_rewrite_equals(&mut self) {
        for module in self.modules.values_mut() {
            rewrites::rewrite_equals(module);
        }
    }

    fn stage_rewrite_dynamic_terms(&mut self) {
        self.with_each_module(|module, gen| {
            rewrites::rewrite_dynamic_terms(module, gen);
            Vec::new()
        });
    }

    fn stage_rewrite_comprehension_terms(&mut self) {
        self.with_each_module(|module, gen| {
            rewrites::rewrite_comprehension_terms(module, gen);
            Vec::new()
        });
    }

    fn stage_rewrite_with_modifiers(&mut self) {
        let paths = rewrites::RulePathIndex::build(self.modules.values());
        self.with_each_module(|module, gen| {
            rewrites::rewrite_with_modifiers(module, gen, &paths)
        });
    }

    fn stage_rewrite_print_calls(&mut self) {
        let enabled = self.enable_print_statements;
        self.with_each_module(|module, gen| rewrites::rewrite_print_calls(module, gen, enabled));
    }

    fn stage_build_module_tree(&mut self) {
        let mut tree = TreeNode::new();
        for (name, module) in &self.modules {
            let path = ref_values(&module.package.path);
            tree.insert(&path, name.clone());
        }
        tree.mark_hidden_system();
        self.module_tree = tree;
    }

    fn stage_build_rule_tree(&mut self) {
        let mut tree = TreeNode::new();
        let mut rules = Vec::new();
        let mut annotations = AnnotationSet::new();
        let mut errors = Vec::new();

        for (name, module) in &self.modules {
            let pkg_path = ref_values(&module.package.path);
            // Empty packages remain as leaves.
            tree.ensure(&pkg_path);

            for ann in &module.annotations {
                if let Err(err) = annotations.insert(
                    ann.clone(),
                    AnnotationTarget::Package {
                        pkg_path: &pkg_path,
                    },
                ) {
                    errors.push(err);
                }
            }

            for (index, rule) in module.rules.iter().enumerate() {
                let id: RuleId = rules.len();
                rules.push(RuleRef {
                    module: name.clone(),
                    index,
                });
                let mut rule_path = pkg_path.clone();
                rule_path.push(Value::String(rule.head.name.as_str().to_string()));
                tree.insert(&rule_path, id);

                for ann in &rule.annotations {
                    if let Err(err) = annotations.insert(
                        ann.clone(),
                        AnnotationTarget::Rule {
                            id,
                            rule_path: &rule_path,
                        },
                    ) {
                        errors.push(err);
                    }
                }
            }
        }

        tree.mark_hidden_system();
        self.rule_tree = tree;
        self.rules = rules;
        self.annotations = annotations;
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_build_dependency_graph(&mut self) {
        let mut per_rule_refs: Vec<(RuleId, Vec<Ref>)> = Vec::with_capacity(self.rules.len());
        for (id, rule_ref) in self.rules.iter().enumerate() {
            let rule = &self.modules[&rule_ref.module].rules[rule_ref.index];
            let mut refs: Vec<Ref> = Vec::new();
            {
                let mut visitor = GenericVisitor::new(|node| {
                    if let Node::Term(t) = node {
                        if let Value::Ref(r) = &t.value {
                            refs.push(r.clone());
                        }
                    }
                    true
                });
                visit::walk_rule(&mut visitor, rule);
            }
            per_rule_refs.push((id, refs));
        }

        let mut graph = Graph::new();
        for (id, refs) in per_rule_refs {
            graph.add_node(id);
            for r in refs {
                for dep in self.rules_dynamic_ids(&r) {
                    graph.add_edge(id, dep);
                }
            }
        }
        self.graph = graph;
    }

    fn stage_check_recursion(&mut self) {
        let mut errors = Vec::new();
        for id in 0..self.rules.len() {
            if let Some(cycle) = self.graph.find_cycle_from(id) {
                let names: Vec<String> = cycle
                    .iter()
                    .map(|&n| self.rule(n).head.name.to_string())
                    .collect();
                errors.push(Error::recursion(
                    self.rule(id).location.get(),
                    format!("rule {} is recursive: {}", names[0], names.join(" -> ")),
                ));
            }
        }
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_check_safety_rule_heads(&mut self) {
        let arities = self.function_arities();
        let arity = move |r: &Ref| arities.get(&ref_values(r)).copied();
        let capabilities = self.capabilities.clone();
        let ctx = SafetyContext {
            capabilities: &capabilities,
            arity: &arity,
        };

        let mut errors = Vec::new();
        for module in self.modules.values() {
            for rule in &module.rules {
                for chained in rule.chain() {
                    errors.extend(safety::check_rule_head_safety(&ctx, chained));
                }
            }
        }
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_check_safety_rule_bodies(&mut self) {
        let arities = self.function_arities();
        let arity = move |r: &Ref| arities.get(&ref_values(r)).copied();
        let capabilities = self.capabilities.clone();
        let ctx = SafetyContext {
            capabilities: &capabilities,
            arity: &arity,
        };

        let mut errors = Vec::new();
        let mut modules = std::mem::take(&mut self.modules);
        for module in modules.values_mut() {
            rewrites::for_each_rule_mut(module, &mut |rule| {
                let mut globals = safety::reserved_vars();
                for arg in &rule.head.args {
                    globals.extend(visit::term_vars(arg));
                }
                let body = std::mem::take(&mut rule.body);
                let (reordered, unsafe_vars) =
                    safety::reorder_body_for_safety(&ctx, &globals, body);
                rule.body = reordered;
                for unsafe_var in unsafe_vars {
                    errors.push(Error::unsafe_var(
                        unsafe_var.location.clone(),
                        format!("var {} is unsafe", unsafe_var.var),
                    ));
                }
            });
        }
        self.modules = modules;
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_check_types(&mut self) {
        let arities = self.function_arities();
        let mut errors = Vec::new();
        for call in self.collect_calls() {
            if self.unsafe_builtins.contains(&call.name) {
                errors.push(Error::compile(
                    call.location.clone(),
                    format!("unsafe built-in function calls in expression: {}", call.name),
                ));
                continue;
            }
            let declared_arity = match self.capabilities.get(&call.name) {
                Some(builtin) if builtin.variadic => continue,
                Some(builtin) => builtin.arity,
                None => match arities.get(&call.path) {
                    Some(&arity) => arity,
                    None => continue,
                },
            };
            if call.operands != declared_arity && call.operands != declared_arity + 1 {
                errors.push(Error::type_err(
                    call.location.clone(),
                    format!(
                        "{}: arity mismatch (expected {} args, got {})",
                        call.name, declared_arity, call.operands
                    ),
                ));
            }
        }
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_build_rule_indexes(&mut self) {
        let mut leaves: Vec<(Vec<Value>, Vec<RuleId>)> = Vec::new();
        collect_leaf_rules(&self.rule_tree, &mut Vec::new(), &mut leaves);

        let mut built = Vec::new();
        for (path, ids) in leaves {
            if ids.len() < 2 {
                continue;
            }
            let rules: Vec<(RuleId, &Rule)> = ids.iter().map(|&id| (id, self.rule(id))).collect();
            let is_virtual = |r: &Ref| !self.get_rules(r).is_empty();
            if let Some(index) = BaseDocEqIndex::build(&rules, &is_virtual) {
                built.push((path, index));
            }
        }
        self.rule_indexes = built.into_iter().collect();
    }

    fn stage_check_undefined_funcs(&mut self) {
        let arities = self.function_arities();
        let mut errors = Vec::new();
        for call in self.collect_calls() {
            if self.capabilities.contains(&call.name) {
                continue;
            }
            if call.data_rooted && arities.contains_key(&call.path) {
                continue;
            }
            errors.push(Error::type_err(
                call.location.clone(),
                format!("undefined function {}", call.display),
            ));
        }
        for err in errors {
            self.errors.push(err);
        }
    }

    fn stage_check_deprecated_builtins(&mut self) {
        let mut errors = Vec::new();
        for call in self.collect_calls() {
            if let Some(builtin) = self.capabilities.get(&call.name) {
                if builtin.deprecated {
                    errors.push(Error::type_err(
                        call.location.clone(),
                        format!(
                            "deprecated built-in function calls in expression: {}",
                            call.name
                        ),
                    ));
                }
            }
        }
        for err in errors {
            self.errors.push(err);
        }
    }

    // ------------------------------------------------------------------
    // Stage helpers
    // ------------------------------------------------------------------

    fn with_each_module(
        &mut self,
        f: impl Fn(&mut Module, &mut LocalVarGenerator) -> Vec<Error>,
    ) {
        let mut modules = std::mem::take(&mut self.modules);
        for (name, module) in modules.iter_mut() {
            let gen = self
                .locals
                .entry(name.clone())
                .or_insert_with(|| LocalVarGenerator::for_module(module));
            for err in f(module, gen) {
                self.errors.push(err);
            }
        }
        self.modules = modules;
    }

    fn function_arities(&self) -> BTreeMap<Vec<Value>, usize> {
        let mut out = BTreeMap::new();
        for module in self.modules.values() {
            for rule in &module.rules {
                if rule.head.kind() == RuleKind::Function {
                    let path = ref_values(&rule.path_in(&module.package));
                    out.entry(path).or_insert(rule.head.args.len());
                }
            }
        }
        out
    }

    fn collect_calls(&self) -> Vec<CallSite> {
        let mut calls = Vec::new();
        for module in self.modules.values() {
            for rule in &module.rules {
                let mut visitor = GenericVisitor::new(|node| {
                    match node {
                        Node::Expr(expr) => {
                            if let Some(op) = expr.operator() {
                                calls.push(CallSite::new(
                                    op,
                                    expr.operands().len(),
                                    expr.location.get(),
                                ));
                            }
                        }
                        Node::Term(term) => {
                            if let Value::Call(call) = &term.value {
                                if let Some(op) = call.operator() {
                                    calls.push(CallSite::new(
                                        op,
                                        call.args().len(),
                                        term.location.get(),
                                    ));
                                }
                            }
                        }
                        _ => {}
                    }
                    true
                });
                visit::walk_rule(&mut visitor, rule);
            }
        }
        calls
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The rule with the given id.
    pub fn rule(&self, id: RuleId) -> &Rule {
        let rule_ref = &self.rules[id];
        &self.modules[&rule_ref.module].rules[rule_ref.index]
    }

    /// The full path of a rule.
    pub fn rule_path(&self, id: RuleId) -> Ref {
        let rule_ref = &self.rules[id];
        let module = &self.modules[&rule_ref.module];
        module.rules[rule_ref.index].path_in(&module.package)
    }

    /// Number of registered rules.
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Rules whose path equals `r` exactly.
    pub fn get_rules_exact(&self, r: &Ref) -> Vec<&Rule> {
        let path = ref_values(r);
        match self.rule_tree.find(&path) {
            Some(node) => node.values.iter().map(|&id| self.rule(id)).collect(),
            None => Vec::new(),
        }
    }

    /// Rules at the shortest prefix of `r` that hosts rules: the rules
    /// defining the virtual document a longer reference reads through.
    pub fn get_rules_for_virtual_document(&self, r: &Ref) -> Vec<&Rule> {
        let mut node = &self.rule_tree;
        for term in r.iter() {
            if !node.values.is_empty() {
                break;
            }
            match node.child(&term.value) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        node.values.iter().map(|&id| self.rule(id)).collect()
    }

    /// All rules at or beneath the node addressed by `r`.
    pub fn get_rules_with_prefix(&self, r: &Ref) -> Vec<&Rule> {
        let path = ref_values(r);
        match self.rule_tree.find(&path) {
            Some(node) => node.all_values().into_iter().map(|&id| self.rule(id)).collect(),
            None => Vec::new(),
        }
    }

    /// Rules that may contribute to the document addressed by `r`: the
    /// virtual-document rules plus everything under the node.
    pub fn get_rules(&self, r: &Ref) -> Vec<&Rule> {
        let mut ids = BTreeSet::new();
        ids.extend(self.virtual_document_ids(r));
        let path = ref_values(r);
        if let Some(node) = self.rule_tree.find(&path) {
            node.depth_first(&mut |n| {
                ids.extend(n.values.iter().copied());
                true
            });
        }
        ids.into_iter().map(|id| self.rule(id)).collect()
    }

    /// Rules reachable from a possibly non-ground reference: variables in
    /// operand positions expand to all children, strings match by key, and
    /// rules at intermediate prefixes are included.
    pub fn get_rules_dynamic(&self, r: &Ref) -> Vec<&Rule> {
        self.rules_dynamic_ids(r)
            .into_iter()
            .map(|id| self.rule(id))
            .collect()
    }

    /// The equality index for the rule-tree leaf addressed by `r`, when one
    /// was built.
    pub fn rule_index(&self, r: &Ref) -> Option<&BaseDocEqIndex> {
        self.rule_indexes.get(&ref_values(r))
    }

    /// One annotation entry per (package, rule) with merged effective
    /// annotations, in rule-id order.
    pub fn expanded_annotations(&self) -> Vec<AnnotationsRef> {
        let rules: Vec<(RuleId, Vec<Value>, Vec<Value>)> = (0..self.rules.len())
            .map(|id| {
                let rule_ref = &self.rules[id];
                let module = &self.modules[&rule_ref.module];
                let pkg = ref_values(&module.package.path);
                let rule = ref_values(&self.rule_path(id));
                (id, rule, pkg)
            })
            .collect();
        self.annotations.expand(&rules)
    }

    fn virtual_document_ids(&self, r: &Ref) -> Vec<RuleId> {
        let mut node = &self.rule_tree;
        for term in r.iter() {
            if !node.values.is_empty() {
                break;
            }
            match node.child(&term.value) {
                Some(child) => node = child,
                None => return Vec::new(),
            }
        }
        node.values.clone()
    }

    fn rules_dynamic_ids(&self, r: &Ref) -> Vec<RuleId> {
        let mut acc = BTreeSet::new();
        walk_dynamic(&self.rule_tree, &r.0, 0, &mut acc);
        acc.into_iter().collect()
    }
}

struct CallSite {
    name: String,
    display: String,
    path: Vec<Value>,
    data_rooted: bool,
    operands: usize,
    location: Option<Location>,
}

impl CallSite {
    fn new(op: &Ref, operands: usize, location: Option<Location>) -> Self {
        let name = crate::ast::operator_name(op).unwrap_or_else(|| op.to_string());
        CallSite {
            display: op.to_string(),
            path: ref_values(op),
            data_rooted: op.head_var().is_some_and(|v| v.as_str() == "data"),
            name,
            operands,
            location,
        }
    }
}

/// The value sequence of a reference, used as a tree path.
pub(crate) fn ref_values(r: &Ref) -> Vec<Value> {
    r.iter().map(|t| t.value.clone()).collect()
}

fn collect_leaf_rules(
    node: &TreeNode<RuleId>,
    path: &mut Vec<Value>,
    out: &mut Vec<(Vec<Value>, Vec<RuleId>)>,
) {
    if !node.values.is_empty() {
        out.push((path.clone(), node.values.clone()));
    }
    for (key, child) in &node.children {
        path.push(key.clone());
        collect_leaf_rules(child, path, out);
        path.pop();
    }
}

fn walk_dynamic(
    node: &TreeNode<RuleId>,
    terms: &[crate::ast::Term],
    i: usize,
    acc: &mut BTreeSet<RuleId>,
) {
    if i >= terms.len() {
        node.depth_first(&mut |n| {
            acc.extend(n.values.iter().copied());
            true
        });
        return;
    }
    // Rules defined at a prefix produce the documents a longer reference
    // reads through.
    acc.extend(node.values.iter().copied());
    match &terms[i].value {
        Value::Var(_) if i > 0 => {
            for child in node.children.values() {
                walk_dynamic(child, terms, i + 1, acc);
            }
        }
        value => {
            if let Some(child) = node.child(value) {
                walk_dynamic(child, terms, i + 1, acc);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_body, parse_module};

    fn compile(sources: &[(&str, &str)]) -> Compiler {
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
        compiler
    }

    fn path(src: &str) -> Ref {
        let body = parse_body("path", src).expect("parse");
        match &body.0[0].terms {
            crate::ast::ExprTerms::Term(t) => {
                t.value.as_ref_value().expect("ref").clone()
            }
            other => panic!("expected ref, got {other:?}"),
        }
    }

    #[test]
    fn test_compile_success_clears_imports() {
        let compiler = compile(&[(
            "m.warden",
            "package a.b\nimport data.foo.bar\np[x] { bar[_] = x }",
        )]);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);
        assert!(compiler.modules["m.warden"].imports.is_empty());
    }

    #[test]
    fn test_rule_tree_size_matches_rule_count() {
        let compiler = compile(&[
            ("m1.warden", "package a\np = 1 { true }\nq = 2 { true }"),
            ("m2.warden", "package a.b\nr = 3 { true }"),
        ]);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);
        assert_eq!(compiler.rule_tree.size(), 3);
        assert_eq!(compiler.num_rules(), 3);
    }

    #[test]
    fn test_get_rules_accessors() {
        let compiler = compile(&[
            ("m1.warden", "package a\np = 1 { true }"),
            ("m2.warden", "package a.b\nq = 2 { true }\nq = 3 { input.x = 1 }"),
        ]);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);

        assert_eq!(compiler.get_rules_exact(&path("data.a.p")).len(), 1);
        assert_eq!(compiler.get_rules_exact(&path("data.a.b.q")).len(), 2);
        assert!(compiler.get_rules_exact(&path("data.a.b")).is_empty());

        // A longer ref reads through the virtual document at data.a.p.
        assert_eq!(
            compiler
                .get_rules_for_virtual_document(&path("data.a.p.extra"))
                .len(),
            1
        );

        assert_eq!(compiler.get_rules_with_prefix(&path("data.a")).len(), 3);
        assert_eq!(compiler.get_rules(&path("data.a.b")).len(), 2);
    }

    #[test]
    fn test_get_rules_dynamic_expands_vars() {
        let compiler = compile(&[
            ("m1.warden", "package a\np = 1 { true }"),
            ("m2.warden", "package b\nq = 2 { true }"),
        ]);
        assert!(!compiler.failed());
        let body = parse_body("q", "data[x].p = 1").expect("parse");
        let r = match &body.0[0].operands()[0].value {
            Value::Ref(r) => r.clone(),
            other => panic!("expected ref, got {other:?}"),
        };
        // data[x].p matches data.a.p by expansion; data.b has no p child
        // but the var still expands through it.
        let rules = compiler.get_rules_dynamic(&r);
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_error_limit_sentinel() {
        let modules: BTreeMap<String, Module> = [(
            "m.warden".to_string(),
            parse_module(
                "m.warden",
                "package a\np { q1 = x1 }\nq { q2 = x2 }\nr { q3 = x3 }",
            )
            .expect("parse"),
        )]
        .into_iter()
        .collect();
        let mut compiler = Compiler::new();
        compiler.set_error_limit(1);
        compiler.compile(&modules);
        assert!(compiler.failed());
        assert_eq!(compiler.errors.len(), 2);
        assert_eq!(
            compiler.errors.0.last().map(|e| e.message.as_str()),
            Some(ERROR_LIMIT_REACHED)
        );
    }

    #[test]
    fn test_stage_hook_runs_and_can_fail() {
        let modules: BTreeMap<String, Module> = [(
            "m.warden".to_string(),
            parse_module("m.warden", "package a\np = 1 { true }").expect("parse"),
        )]
        .into_iter()
        .collect();
        let mut compiler =
            Compiler::new().with_stage_after("BuildRuleTree", |c: &Compiler| {
                if c.num_rules() > 0 {
                    Err(Errors::from(Error::compile(None, "hook rejected rules")))
                } else {
                    Ok(())
                }
            });
        compiler.compile(&modules);
        assert!(compiler.failed());
        assert_eq!(compiler.errors.0[0].message, "hook rejected rules");
        // The pipeline stopped before safety ran.
        assert!(compiler.metrics.timer("CheckSafetyRuleBodies").is_none());
    }

    #[test]
    fn test_module_loader_until_quiescence() {
        let modules: BTreeMap<String, Module> = [(
            "m.warden".to_string(),
            parse_module("m.warden", "package a\np { data.b.q = 1 }").expect("parse"),
        )]
        .into_iter()
        .collect();

        let loader = |resolved: &BTreeMap<String, Module>| {
            let mut out = BTreeMap::new();
            if !resolved.contains_key("loaded.warden") {
                out.insert(
                    "loaded.warden".to_string(),
                    parse_module("loaded.warden", "package b\nq = 1 { true }")
                        .expect("parse"),
                );
            }
            Ok(out)
        };

        let mut compiler = Compiler::new().with_module_loader(loader);
        compiler.compile(&modules);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);
        assert_eq!(compiler.modules.len(), 2);
        assert_eq!(compiler.num_rules(), 2);
    }

    #[test]
    fn test_module_loader_error_is_fatal() {
        let modules: BTreeMap<String, Module> = [(
            "m.warden".to_string(),
            parse_module("m.warden", "package a\np = 1 { true }").expect("parse"),
        )]
        .into_iter()
        .collect();

        let loader =
            |_: &BTreeMap<String, Module>| anyhow::bail!("backend unavailable");
        let mut compiler = Compiler::new().with_module_loader(loader);
        compiler.compile(&modules);
        assert!(compiler.failed());
        assert!(compiler.errors.0[0].message.contains("backend unavailable"));
    }

    #[test]
    fn test_compile_does_not_mutate_caller_modules() {
        let original =
            parse_module("m.warden", "package a.b\nimport data.foo\np { foo[_] = 1 }")
                .expect("parse");
        let modules: BTreeMap<String, Module> =
            [("m.warden".to_string(), original.clone())].into_iter().collect();
        let mut compiler = Compiler::new();
        compiler.compile(&modules);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);
        assert_eq!(modules["m.warden"], original);
        assert_eq!(original.imports.len(), 1);
    }

    #[test]
    fn test_metrics_record_stages() {
        let compiler = compile(&[("m.warden", "package a\np = 1 { true }")]);
        assert!(compiler.metrics.timer("ResolveRefs").is_some());
        assert!(compiler.metrics.timer("CheckDeprecatedBuiltins").is_some());
    }

    #[test]
    fn test_unsafe_builtin_flagged() {
        let modules: BTreeMap<String, Module> = [(
            "m.warden".to_string(),
            parse_module("m.warden", "package a\np { count([1], n); n > 0 }")
                .expect("parse"),
        )]
        .into_iter()
        .collect();
        let mut compiler = Compiler::new().with_unsafe_builtins(["count"]);
        compiler.compile(&modules);
        assert!(compiler.failed());
        assert!(compiler
            .errors
            .iter()
            .any(|e| e.message == "unsafe built-in function calls in expression: count"));
    }

    #[test]
    fn test_hidden_system_modules() {
        let compiler = compile(&[
            ("sys.warden", "package system.log\nmask = 1 { true }"),
            ("app.warden", "package app\np = 1 { true }"),
        ]);
        assert!(!compiler.failed(), "errors: {}", compiler.errors);
        let node = compiler
            .module_tree
            .find(&ref_values(&path("data.system.log")))
            .expect("node");
        assert!(node.hidden);
    }
}
