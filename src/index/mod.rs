//! # Base-Document Equality Index
//!
//! Preselects rules by the `ref = constant` equalities in their bodies.
//! For each rule-tree leaf the compiler tabulates ground, non-nested
//! references into `input`/`data` base documents that appear on one side of
//! an equality, orders them by how many rules constrain them, and builds a
//! trie whose branches are `undefined` (rule does not constrain the ref),
//! `any` (the constraining value is a variable), a scalar key, or an array
//! shape matched element-wise.
//!
//! At evaluation time the evaluator supplies a [`ValueResolver`] mapping
//! those references to concrete values; traversal accumulates every rule
//! whose constraints are consistent with the resolved values. Default rules
//! are kept aside and always returned.

use crate::ast::{Expr, Rule, Term};
use crate::graph::RuleId;
use crate::value::{Ref, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Maps base-document references to their current values during evaluation.
/// `None` means the document is absent.
pub trait ValueResolver {
    fn resolve(&self, r: &Ref) -> Option<Value>;
}

impl<F> ValueResolver for F
where
    F: Fn(&Ref) -> Option<Value>,
{
    fn resolve(&self, r: &Ref) -> Option<Value> {
        self(r)
    }
}

/// Result of an index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResult {
    /// Rules consistent with the resolved values, in rule-id order.
    pub rules: Vec<RuleId>,
    /// The default rule for the document, when one exists.
    pub default_rule: Option<RuleId>,
}

/// The trie index for one rule-tree leaf.
#[derive(Debug, Clone)]
pub struct BaseDocEqIndex {
    /// Candidate references in descending constraint frequency.
    refs: Vec<Ref>,
    root: TrieNode,
    default_rule: Option<RuleId>,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    undefined: Option<Box<TrieNode>>,
    any: Option<Box<TrieNode>>,
    scalars: BTreeMap<Value, Box<TrieNode>>,
    /// Array constraints branch on length, then element-wise.
    arrays: BTreeMap<usize, Box<TrieNode>>,
    rules: Vec<RuleId>,
}

/// One step of a rule's path through the trie.
#[derive(Debug, Clone)]
enum Key {
    Undefined,
    Any,
    Scalar(Value),
    ArrayLen(usize),
}

impl BaseDocEqIndex {
    /// Build an index over the rules of one leaf. Returns `None` when no
    /// rule contributes an indexable equality, in which case the evaluator
    /// falls back to trying every rule.
    pub fn build(
        rules: &[(RuleId, &Rule)],
        is_virtual: &dyn Fn(&Ref) -> bool,
    ) -> Option<BaseDocEqIndex> {
        let mut default_rule = None;
        let mut constraints: Vec<(RuleId, BTreeMap<Ref, Term>)> = Vec::new();
        let mut freq: BTreeMap<Ref, usize> = BTreeMap::new();

        for (id, rule) in rules {
            if rule.default {
                if default_rule.is_none() {
                    default_rule = Some(*id);
                }
                continue;
            }
            // A rule with an else chain can fire through any of its bodies,
            // so constraints from the first body alone would be unsound.
            let mut per_rule: BTreeMap<Ref, Term> = BTreeMap::new();
            if rule.else_rule.is_none() {
                for expr in rule.body.iter() {
                    if let Some((r, value)) = candidate(expr, is_virtual) {
                        per_rule.entry(r.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
            for r in per_rule.keys() {
                *freq.entry(r.clone()).or_default() += 1;
            }
            constraints.push((*id, per_rule));
        }

        if freq.is_empty() {
            return None;
        }

        // Most frequently constrained refs first; ties broken by ref order
        // for reproducibility.
        let mut refs: Vec<Ref> = freq.keys().cloned().collect();
        refs.sort_by(|a, b| freq[b].cmp(&freq[a]).then_with(|| a.cmp(b)));

        let mut root = TrieNode::default();
        for (id, per_rule) in &constraints {
            let mut keys = Vec::new();
            for r in &refs {
                match per_rule.get(r) {
                    None => keys.push(Key::Undefined),
                    Some(term) => push_value_keys(&term.value, &mut keys),
                }
            }
            root.insert(&keys, *id);
        }

        Some(BaseDocEqIndex {
            refs,
            root,
            default_rule,
        })
    }

    /// The candidate references, most discriminating first.
    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    /// Traverse the trie with resolved document values, accumulating every
    /// rule whose constraints hold.
    pub fn lookup(&self, resolver: &dyn ValueResolver) -> IndexResult {
        let values: Vec<Option<Value>> = self.refs.iter().map(|r| resolver.resolve(r)).collect();
        let mut rules = BTreeSet::new();
        traverse(&self.root, &values, 0, &mut rules);
        IndexResult {
            rules: rules.into_iter().collect(),
            default_rule: self.default_rule,
        }
    }
}

/// Extract the `(ref, value)` pair from an indexable equality expression.
fn candidate<'a>(
    expr: &'a Expr,
    is_virtual: &dyn Fn(&Ref) -> bool,
) -> Option<(&'a Ref, &'a Term)> {
    if expr.negated || !expr.with.is_empty() || !expr.is_equality() {
        return None;
    }
    let operands = expr.operands();
    if operands.len() != 2 {
        return None;
    }
    for (a, b) in [(&operands[0], &operands[1]), (&operands[1], &operands[0])] {
        if let Value::Ref(r) = &a.value {
            if indexable_ref(r, is_virtual) && indexable_value(&b.value) {
                return Some((r, b));
            }
        }
    }
    None
}

fn indexable_ref(r: &Ref, is_virtual: &dyn Fn(&Ref) -> bool) -> bool {
    let rooted = r
        .head_var()
        .is_some_and(|v| v.as_str() == "input" || v.as_str() == "data");
    rooted && r.len() > 1 && r.is_ground() && !r.is_nested() && !is_virtual(r)
}

fn indexable_value(v: &Value) -> bool {
    match v {
        Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) | Value::Var(_) => {
            true
        }
        // Flat arrays only: element-wise scalar or variable.
        Value::Array(arr) => arr
            .iter()
            .all(|t| t.value.is_scalar() || matches!(t.value, Value::Var(_))),
        _ => false,
    }
}

fn push_value_keys(v: &Value, keys: &mut Vec<Key>) {
    match v {
        Value::Var(_) => keys.push(Key::Any),
        Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {
            keys.push(Key::Scalar(v.clone()));
        }
        Value::Array(arr) => {
            keys.push(Key::ArrayLen(arr.len()));
            for elem in arr.iter() {
                match &elem.value {
                    Value::Var(_) => keys.push(Key::Any),
                    scalar => keys.push(Key::Scalar(scalar.clone())),
                }
            }
        }
        // Guarded by indexable_value.
        _ => keys.push(Key::Any),
    }
}

impl TrieNode {
    fn insert(&mut self, keys: &[Key], id: RuleId) {
        let Some((first, rest)) = keys.split_first() else {
            self.rules.push(id);
            return;
        };
        let child = match first {
            Key::Undefined => self.undefined.get_or_insert_with(Box::default),
            Key::Any => self.any.get_or_insert_with(Box::default),
            Key::Scalar(v) => self.scalars.entry(v.clone()).or_default(),
            Key::ArrayLen(n) => self.arrays.entry(*n).or_default(),
        };
        child.insert(rest, id);
    }
}

fn traverse(node: &TrieNode, values: &[Option<Value>], i: usize, acc: &mut BTreeSet<RuleId>) {
    if i == values.len() {
        acc.extend(node.rules.iter().copied());
        return;
    }
    if let Some(undef) = &node.undefined {
        traverse(undef, values, i + 1, acc);
    }
    let Some(value) = &values[i] else {
        return;
    };
    if let Some(any) = &node.any {
        traverse(any, values, i + 1, acc);
    }
    match value {
        Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => {
            if let Some(child) = node.scalars.get(value) {
                traverse(child, values, i + 1, acc);
            }
        }
        Value::Array(arr) => {
            if let Some(child) = node.arrays.get(&arr.len()) {
                traverse_array(child, arr.0.as_slice(), 0, values, i, acc);
            }
        }
        _ => {}
    }
}

fn traverse_array(
    node: &TrieNode,
    elems: &[Term],
    j: usize,
    values: &[Option<Value>],
    i: usize,
    acc: &mut BTreeSet<RuleId>,
) {
    let Some(elem) = elems.get(j) else {
        // All elements matched; continue with the next candidate ref.
        traverse(node, values, i + 1, acc);
        return;
    };
    if let Some(any) = &node.any {
        traverse_array(any, elems, j + 1, values, i, acc);
    }
    if elem.value.is_scalar() {
        if let Some(child) = node.scalars.get(&elem.value) {
            traverse_array(child, elems, j + 1, values, i, acc);
        }
    }
}
