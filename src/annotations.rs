//! # Annotation Set
//!
//! Scope-keyed metadata indexes built during compilation. Three indexes
//! cover the four scopes: rule-scoped annotations are one-to-many by rule,
//! package-scoped are one-to-one by package, and document/subpackages
//! scopes live in a path trie with uniqueness per (path, scope).
//!
//! Retrieval merges annotations in increasing specificity: subpackages
//! ancestors, then package, then document, then the rule's own chain. Later
//! entries overwrite non-empty fields of earlier ones.

use crate::ast::{AnnotationScope, Annotations, Term};
use crate::errors::{Error, ErrorKind};
use crate::graph::RuleId;
use crate::tree::TreeNode;
use crate::value::{Ref, Value};
use std::collections::BTreeMap;

/// A single annotation declaration resolved against its target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationsRef {
    /// The rule or package path the annotations apply to.
    pub path: Ref,
    pub annotations: Annotations,
}

/// Where an annotation declaration is attached.
#[derive(Debug, Clone, Copy)]
pub enum AnnotationTarget<'a> {
    /// Attached to a rule (scopes `rule` and `document`).
    Rule {
        id: RuleId,
        rule_path: &'a [Value],
    },
    /// Attached to a package (scopes `package` and `subpackages`).
    Package { pkg_path: &'a [Value] },
}

#[derive(Debug, Clone)]
struct PathEntry {
    scope: AnnotationScope,
    annotations: Annotations,
}

/// The compiled annotation indexes.
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    by_rule: BTreeMap<RuleId, (Vec<Value>, Vec<Annotations>)>,
    by_package: BTreeMap<Vec<Value>, Annotations>,
    by_path: TreeNode<PathEntry>,
}

impl AnnotationSet {
    /// An empty set.
    pub fn new() -> Self {
        AnnotationSet::default()
    }

    /// Insert a declaration, dispatching on its scope. Package, document,
    /// and subpackages scopes are unique per target; redeclaration is an
    /// error.
    pub fn insert(
        &mut self,
        annotations: Annotations,
        target: AnnotationTarget<'_>,
    ) -> Result<(), Error> {
        match (annotations.scope, target) {
            (AnnotationScope::Rule, AnnotationTarget::Rule { id, rule_path }) => {
                self.by_rule
                    .entry(id)
                    .or_insert_with(|| (rule_path.to_vec(), Vec::new()))
                    .1
                    .push(annotations);
                Ok(())
            }
            (AnnotationScope::Document, AnnotationTarget::Rule { rule_path, .. }) => {
                self.insert_path_entry(rule_path, AnnotationScope::Document, annotations)
            }
            (AnnotationScope::Package, AnnotationTarget::Package { pkg_path }) => {
                if self.by_package.contains_key(pkg_path) {
                    return Err(redeclared_error(&annotations, pkg_path));
                }
                self.by_package.insert(pkg_path.to_vec(), annotations);
                Ok(())
            }
            (AnnotationScope::Subpackages, AnnotationTarget::Package { pkg_path }) => {
                self.insert_path_entry(pkg_path, AnnotationScope::Subpackages, annotations)
            }
            (scope, _) => Err(Error::new(
                ErrorKind::Type,
                annotations.location.get(),
                format!("invalid attachment for {scope} scoped annotation"),
            )),
        }
    }

    fn insert_path_entry(
        &mut self,
        path: &[Value],
        scope: AnnotationScope,
        annotations: Annotations,
    ) -> Result<(), Error> {
        let node = self.by_path.ensure(path);
        if node.values.iter().any(|e| e.scope == scope) {
            return Err(redeclared_error(&annotations, path));
        }
        node.values.push(PathEntry { scope, annotations });
        Ok(())
    }

    /// The rule-scoped annotations attached to a rule, in declaration order.
    pub fn rule_scoped(&self, id: RuleId) -> &[Annotations] {
        self.by_rule
            .get(&id)
            .map_or(&[], |(_, anns)| anns.as_slice())
    }

    /// All annotations applicable to a rule, least specific first:
    /// subpackages ancestors of the package, the package annotation, the
    /// document annotation at the rule's path, then the rule's own chain.
    pub fn chain(
        &self,
        id: RuleId,
        rule_path: &[Value],
        pkg_path: &[Value],
    ) -> Vec<&Annotations> {
        let mut out = Vec::new();

        // Subpackages-scoped entries at every ancestor of the package,
        // shortest prefix first.
        for end in 1..=pkg_path.len() {
            if let Some(node) = self.by_path.find(&pkg_path[..end]) {
                for entry in &node.values {
                    if entry.scope == AnnotationScope::Subpackages {
                        out.push(&entry.annotations);
                    }
                }
            }
        }

        if let Some(ann) = self.by_package.get(pkg_path) {
            out.push(ann);
        }

        if let Some(node) = self.by_path.find(rule_path) {
            for entry in &node.values {
                if entry.scope == AnnotationScope::Document {
                    out.push(&entry.annotations);
                }
            }
        }

        out.extend(self.rule_scoped(id));
        out
    }

    /// The effective merged annotation for a rule, or `None` when nothing
    /// applies.
    pub fn merged(
        &self,
        id: RuleId,
        rule_path: &[Value],
        pkg_path: &[Value],
    ) -> Option<Annotations> {
        let chain = self.chain(id, rule_path, pkg_path);
        let (first, rest) = chain.split_first()?;
        let mut merged = (*first).clone();
        for ann in rest {
            merged = ann.merged_onto(&merged);
        }
        Some(merged)
    }

    /// One entry per declaration, ordered by path and then by scope
    /// specificity.
    pub fn flatten(&self) -> Vec<AnnotationsRef> {
        let mut entries: Vec<(Vec<Value>, AnnotationsRef)> = Vec::new();

        collect_path_entries(&self.by_path, &mut Vec::new(), &mut entries);

        for (path, ann) in &self.by_package {
            entries.push((
                path.clone(),
                AnnotationsRef {
                    path: path_ref(path),
                    annotations: ann.clone(),
                },
            ));
        }

        for (path, anns) in self.by_rule.values().map(|(p, a)| (p, a)) {
            for ann in anns {
                entries.push((
                    path.clone(),
                    AnnotationsRef {
                        path: path_ref(path),
                        annotations: ann.clone(),
                    },
                ));
            }
        }

        entries.sort_by(|(pa, ra), (pb, rb)| {
            pa.cmp(pb)
                .then_with(|| scope_rank(ra.annotations.scope).cmp(&scope_rank(rb.annotations.scope)))
        });
        entries.into_iter().map(|(_, r)| r).collect()
    }

    /// One entry per supplied rule carrying its merged effective
    /// annotations. Rules with no applicable annotations are omitted.
    pub fn expand(&self, rules: &[(RuleId, Vec<Value>, Vec<Value>)]) -> Vec<AnnotationsRef> {
        let mut out = Vec::new();
        for (id, rule_path, pkg_path) in rules {
            if let Some(merged) = self.merged(*id, rule_path, pkg_path) {
                out.push(AnnotationsRef {
                    path: path_ref(rule_path),
                    annotations: merged,
                });
            }
        }
        out
    }
}

fn collect_path_entries(
    node: &TreeNode<PathEntry>,
    path: &mut Vec<Value>,
    out: &mut Vec<(Vec<Value>, AnnotationsRef)>,
) {
    for entry in &node.values {
        out.push((
            path.clone(),
            AnnotationsRef {
                path: path_ref(path),
                annotations: entry.annotations.clone(),
            },
        ));
    }
    for (key, child) in &node.children {
        path.push(key.clone());
        collect_path_entries(child, path, out);
        path.pop();
    }
}

fn scope_rank(scope: AnnotationScope) -> u8 {
    match scope {
        AnnotationScope::Subpackages => 0,
        AnnotationScope::Package => 1,
        AnnotationScope::Document => 2,
        AnnotationScope::Rule => 3,
    }
}

fn redeclared_error(annotations: &Annotations, path: &[Value]) -> Error {
    Error::new(
        ErrorKind::Type,
        annotations.location.get(),
        format!(
            "annotations redeclared for {} {}",
            annotations.scope,
            path_ref(path)
        ),
    )
}

/// Build a reference term sequence from path values.
pub fn path_ref(path: &[Value]) -> Ref {
    Ref::new(path.iter().map(|v| Term::from(v.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Var;

    fn pkg_path(segments: &[&str]) -> Vec<Value> {
        let mut out = vec![Value::Var(Var::new("data"))];
        out.extend(segments.iter().map(|s| Value::String((*s).to_string())));
        out
    }

    fn rule_path(segments: &[&str], name: &str) -> Vec<Value> {
        let mut out = pkg_path(segments);
        out.push(Value::String(name.to_string()));
        out
    }

    fn titled(scope: AnnotationScope, title: &str) -> Annotations {
        let mut ann = Annotations::new(scope);
        ann.title = Some(title.to_string());
        ann
    }

    #[test]
    fn test_merge_specificity_order() {
        let mut set = AnnotationSet::new();
        let pkg = pkg_path(&["a", "b"]);
        let rule = rule_path(&["a", "b"], "p");

        set.insert(
            titled(AnnotationScope::Subpackages, "sub"),
            AnnotationTarget::Package {
                pkg_path: &pkg_path(&["a"]),
            },
        )
        .expect("insert");
        set.insert(
            titled(AnnotationScope::Package, "pkg"),
            AnnotationTarget::Package { pkg_path: &pkg },
        )
        .expect("insert");
        set.insert(
            titled(AnnotationScope::Document, "doc"),
            AnnotationTarget::Rule {
                id: 0,
                rule_path: &rule,
            },
        )
        .expect("insert");
        set.insert(
            titled(AnnotationScope::Rule, "rule"),
            AnnotationTarget::Rule {
                id: 0,
                rule_path: &rule,
            },
        )
        .expect("insert");

        let chain = set.chain(0, &rule, &pkg);
        let titles: Vec<&str> = chain
            .iter()
            .filter_map(|a| a.title.as_deref())
            .collect();
        assert_eq!(titles, vec!["sub", "pkg", "doc", "rule"]);

        let merged = set.merged(0, &rule, &pkg).expect("merged");
        assert_eq!(merged.title.as_deref(), Some("rule"));
    }

    #[test]
    fn test_less_specific_fields_survive_merge() {
        let mut set = AnnotationSet::new();
        let pkg = pkg_path(&["a"]);
        let rule = rule_path(&["a"], "p");

        let mut pkg_ann = titled(AnnotationScope::Package, "pkg");
        pkg_ann.authors = vec!["alice".to_string()];
        set.insert(pkg_ann, AnnotationTarget::Package { pkg_path: &pkg })
            .expect("insert");

        set.insert(
            titled(AnnotationScope::Rule, "rule"),
            AnnotationTarget::Rule {
                id: 3,
                rule_path: &rule,
            },
        )
        .expect("insert");

        let merged = set.merged(3, &rule, &pkg).expect("merged");
        assert_eq!(merged.title.as_deref(), Some("rule"));
        assert_eq!(merged.authors, vec!["alice".to_string()]);
    }

    #[test]
    fn test_package_redeclaration_is_error() {
        let mut set = AnnotationSet::new();
        let pkg = pkg_path(&["a"]);
        set.insert(
            titled(AnnotationScope::Package, "one"),
            AnnotationTarget::Package { pkg_path: &pkg },
        )
        .expect("first insert");
        let err = set
            .insert(
                titled(AnnotationScope::Package, "two"),
                AnnotationTarget::Package { pkg_path: &pkg },
            )
            .expect_err("redeclaration");
        assert!(err.message.contains("annotations redeclared"));
    }

    #[test]
    fn test_document_and_subpackages_unique() {
        let mut set = AnnotationSet::new();
        let rule = rule_path(&["a"], "p");
        set.insert(
            titled(AnnotationScope::Document, "one"),
            AnnotationTarget::Rule {
                id: 0,
                rule_path: &rule,
            },
        )
        .expect("insert");
        assert!(set
            .insert(
                titled(AnnotationScope::Document, "two"),
                AnnotationTarget::Rule {
                    id: 1,
                    rule_path: &rule,
                },
            )
            .is_err());

        let pkg = pkg_path(&["a"]);
        set.insert(
            titled(AnnotationScope::Subpackages, "one"),
            AnnotationTarget::Package { pkg_path: &pkg },
        )
        .expect("insert");
        assert!(set
            .insert(
                titled(AnnotationScope::Subpackages, "two"),
                AnnotationTarget::Package { pkg_path: &pkg },
            )
            .is_err());
    }

    #[test]
    fn test_flatten_one_entry_per_declaration() {
        let mut set = AnnotationSet::new();
        let pkg = pkg_path(&["a"]);
        let rule = rule_path(&["a"], "p");
        set.insert(
            titled(AnnotationScope::Package, "pkg"),
            AnnotationTarget::Package { pkg_path: &pkg },
        )
        .expect("insert");
        set.insert(
            titled(AnnotationScope::Rule, "r1"),
            AnnotationTarget::Rule {
                id: 0,
                rule_path: &rule,
            },
        )
        .expect("insert");
        set.insert(
            titled(AnnotationScope::Rule, "r2"),
            AnnotationTarget::Rule {
                id: 0,
                rule_path: &rule,
            },
        )
        .expect("insert");

        let flat = set.flatten();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].path.to_string(), "data.a");
        assert_eq!(flat[1].path.to_string(), "data.a.p");
    }

    #[test]
    fn test_expand_merges_per_rule() {
        let mut set = AnnotationSet::new();
        let pkg = pkg_path(&["a"]);
        let p = rule_path(&["a"], "p");
        let q = rule_path(&["a"], "q");
        set.insert(
            titled(AnnotationScope::Package, "pkg"),
            AnnotationTarget::Package { pkg_path: &pkg },
        )
        .expect("insert");
        set.insert(
            titled(AnnotationScope::Rule, "only p"),
            AnnotationTarget::Rule {
                id: 0,
                rule_path: &p,
            },
        )
        .expect("insert");

        let rules = vec![(0, p.clone(), pkg.clone()), (1, q, pkg.clone())];
        let expanded = set.expand(&rules);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].annotations.title.as_deref(), Some("only p"));
        // q inherits the package annotation.
        assert_eq!(expanded[1].annotations.title.as_deref(), Some("pkg"));
    }
}
