//! # Policy AST
//!
//! Abstract syntax tree for Warden policy modules: terms, expressions,
//! bodies, rule heads, rules, imports, packages, and annotations. The parser
//! produces these types and the compile pipeline rewrites them in place.
//!
//! Equality, ordering, and hashing for every node ignore source locations
//! (see [`NodeLoc`]) and, for expressions, the body index.

use crate::location::NodeLoc;
use crate::value::{Ref, Value, Var};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

pub mod visit;

/// Name of the unification operator.
pub const OP_EQ: &str = "eq";
/// Name of the boolean equality operator (`==`).
pub const OP_EQUAL: &str = "equal";
/// Name of the assignment operator (`:=`).
pub const OP_ASSIGN: &str = "assign";
/// Name of the two-place membership operator backing `some x in xs`.
pub const OP_MEMBER_2: &str = "internal.member_2";
/// Name of the three-place membership operator backing `some k, v in xs`.
pub const OP_MEMBER_3: &str = "internal.member_3";
/// Name of the user-facing print built-in.
pub const OP_PRINT: &str = "print";
/// Name of the internal print built-in emitted by the print rewrite.
pub const OP_PRINT_INTERNAL: &str = "internal.print";

/// Root document names that may never be shadowed or reassigned.
pub const ROOT_DOCUMENT_NAMES: [&str; 2] = ["data", "input"];

// ============================================================================
// Terms
// ============================================================================

/// A tagged value with an optional source location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Term {
    pub value: Value,
    #[serde(skip)]
    pub location: NodeLoc,
}

impl Term {
    /// Create a term with a location.
    pub fn new(value: Value, location: impl Into<NodeLoc>) -> Self {
        Term {
            value,
            location: location.into(),
        }
    }

    /// The literal `true`.
    pub fn truth() -> Self {
        Term::from(Value::Boolean(true))
    }

    /// True when the term is the literal `true`.
    pub fn is_true(&self) -> bool {
        self.value == Value::Boolean(true)
    }

    /// Build a variable term without a location.
    pub fn var(name: impl Into<String>) -> Self {
        Term::from(Value::Var(Var::new(name)))
    }

    /// Build a string term without a location.
    pub fn string(s: impl Into<String>) -> Self {
        Term::from(Value::String(s.into()))
    }

    /// Build a reference term from element terms.
    pub fn ref_from(terms: Vec<Term>) -> Self {
        Term::from(Value::Ref(Ref::new(terms)))
    }
}

impl From<Value> for Term {
    fn from(value: Value) -> Self {
        Term {
            value,
            location: NodeLoc::none(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Build the operator reference for a (possibly dotted) built-in name.
pub fn operator_ref(name: &str) -> Ref {
    let mut parts = name.split('.');
    let head = parts.next().unwrap_or(name);
    let mut terms = vec![Term::from(Value::Var(Var::new(head)))];
    for part in parts {
        terms.push(Term::string(part));
    }
    Ref::new(terms)
}

/// Render an operator reference back to its dotted name, when it has the
/// shape produced by [`operator_ref`].
pub fn operator_name(r: &Ref) -> Option<String> {
    let head = r.head_var()?;
    let mut name = head.as_str().to_string();
    for op in r.operands() {
        match &op.value {
            Value::String(s) => {
                name.push('.');
                name.push_str(s);
            }
            _ => return None,
        }
    }
    Some(name)
}

// ============================================================================
// Expressions
// ============================================================================

/// The payload of an expression: a single term, a call spelled as a sequence
/// of terms (operator first), or a `some` declaration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExprTerms {
    Term(Term),
    Call(Vec<Term>),
    SomeDecl(SomeDecl),
}

/// A `some` declaration. Symbols are either plain variables (`some x, y`) or
/// membership calls (`some k, v in xs`, spelled as `internal.member_3`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SomeDecl {
    pub symbols: Vec<Term>,
}

impl fmt::Display for SomeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "some ")?;
        for (i, sym) in self.symbols.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &sym.value {
                Value::Call(call) if call.args().len() == 2 => {
                    write!(f, "{} in {}", call.args()[0], call.args()[1])?;
                }
                Value::Call(call) if call.args().len() == 3 => {
                    write!(
                        f,
                        "{}, {} in {}",
                        call.args()[0],
                        call.args()[1],
                        call.args()[2]
                    )?;
                }
                _ => write!(f, "{sym}")?,
            }
        }
        Ok(())
    }
}

/// A `with` modifier: `expr with target as value`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct With {
    pub target: Term,
    pub value: Term,
    pub location: NodeLoc,
}

impl fmt::Display for With {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "with {} as {}", self.target, self.value)
    }
}

/// A body element: payload, negation flag, `with` modifiers, and a stable
/// index reflecting evaluation order.
///
/// Equality ignores the index (and locations), so reordered bodies compare
/// by content.
#[derive(Debug, Clone)]
pub struct Expr {
    pub terms: ExprTerms,
    pub negated: bool,
    pub with: Vec<With>,
    pub index: usize,
    /// Set on expressions synthesized by rewrite stages.
    pub generated: bool,
    pub location: NodeLoc,
}

impl Expr {
    /// An expression holding a single term.
    pub fn new_term(term: Term) -> Self {
        Expr {
            location: term.location.clone(),
            terms: ExprTerms::Term(term),
            negated: false,
            with: Vec::new(),
            index: 0,
            generated: false,
        }
    }

    /// An expression holding a call (operator term first).
    pub fn new_call(terms: Vec<Term>) -> Self {
        Expr {
            location: terms.first().map(|t| t.location.clone()).unwrap_or_default(),
            terms: ExprTerms::Call(terms),
            negated: false,
            with: Vec::new(),
            index: 0,
            generated: false,
        }
    }

    /// An expression holding a `some` declaration.
    pub fn new_some(decl: SomeDecl) -> Self {
        Expr {
            terms: ExprTerms::SomeDecl(decl),
            negated: false,
            with: Vec::new(),
            index: 0,
            generated: false,
            location: NodeLoc::none(),
        }
    }

    /// The literal `true` expression.
    pub fn truth() -> Self {
        Expr::new_term(Term::truth())
    }

    /// A generated unification `local = value` emitted by rewrite stages.
    pub fn generated_eq(lhs: Term, rhs: Term) -> Self {
        let location = rhs.location.clone();
        Expr {
            terms: ExprTerms::Call(vec![
                Term::from(Value::Ref(operator_ref(OP_EQ))),
                lhs,
                rhs,
            ]),
            negated: false,
            with: Vec::new(),
            index: 0,
            generated: true,
            location,
        }
    }

    /// True when the payload is a call.
    pub fn is_call(&self) -> bool {
        matches!(self.terms, ExprTerms::Call(_))
    }

    /// The operator reference, when the payload is a call.
    pub fn operator(&self) -> Option<&Ref> {
        match &self.terms {
            ExprTerms::Call(terms) => match terms.first().map(|t| &t.value) {
                Some(Value::Ref(r)) => Some(r),
                _ => None,
            },
            _ => None,
        }
    }

    /// The dotted operator name, when the payload is a call.
    pub fn operator_name(&self) -> Option<String> {
        self.operator().and_then(operator_name)
    }

    /// The call operands, when the payload is a call.
    pub fn operands(&self) -> &[Term] {
        match &self.terms {
            ExprTerms::Call(terms) if !terms.is_empty() => &terms[1..],
            _ => &[],
        }
    }

    /// Mutable call operands.
    pub fn operands_mut(&mut self) -> &mut [Term] {
        match &mut self.terms {
            ExprTerms::Call(terms) if !terms.is_empty() => &mut terms[1..],
            _ => &mut [],
        }
    }

    /// True for unification expressions (`=`).
    pub fn is_equality(&self) -> bool {
        self.operator_name().as_deref() == Some(OP_EQ)
    }

    /// True for assignment expressions (`:=`).
    pub fn is_assignment(&self) -> bool {
        self.operator_name().as_deref() == Some(OP_ASSIGN)
    }

    /// True when the payload is the literal `true` with no modifiers.
    pub fn is_trivially_true(&self) -> bool {
        !self.negated
            && self.with.is_empty()
            && matches!(&self.terms, ExprTerms::Term(t) if t.is_true())
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.terms == other.terms && self.negated == other.negated && self.with == other.with
    }
}

impl Eq for Expr {}

impl PartialOrd for Expr {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expr {
    fn cmp(&self, other: &Self) -> Ordering {
        self.terms
            .cmp(&other.terms)
            .then_with(|| self.negated.cmp(&other.negated))
            .then_with(|| self.with.cmp(&other.with))
    }
}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.terms.hash(state);
        self.negated.hash(state);
        self.with.hash(state);
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not ")?;
        }
        match &self.terms {
            ExprTerms::Term(t) => write!(f, "{t}")?,
            ExprTerms::Call(terms) => match terms.split_first() {
                Some((op, args)) => {
                    write!(f, "{op}(")?;
                    for (i, a) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{a}")?;
                    }
                    write!(f, ")")?;
                }
                None => write!(f, "()")?,
            },
            ExprTerms::SomeDecl(decl) => write!(f, "{decl}")?,
        }
        for w in &self.with {
            write!(f, " {w}")?;
        }
        Ok(())
    }
}

/// An ordered sequence of expressions, semantically a conjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Body(pub Vec<Expr>);

impl Body {
    /// An empty body.
    pub fn new() -> Self {
        Body(Vec::new())
    }

    /// A body holding the given expressions, reindexed.
    pub fn from_exprs(exprs: Vec<Expr>) -> Self {
        let mut body = Body(exprs);
        body.reindex();
        body
    }

    /// Append an expression, assigning the next index.
    pub fn push(&mut self, mut expr: Expr) {
        expr.index = self.0.len();
        self.0.push(expr);
    }

    /// Number of expressions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the body has no expressions.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate expressions in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Expr> {
        self.0.iter()
    }

    /// Iterate expressions mutably.
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Expr> {
        self.0.iter_mut()
    }

    /// Reassign expression indices to their positions, keeping them dense
    /// and stable after reordering.
    pub fn reindex(&mut self) {
        for (i, expr) in self.0.iter_mut().enumerate() {
            expr.index = i;
        }
    }
}

impl Serialize for Body {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, expr) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{expr}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Document kind produced by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    CompleteDoc,
    PartialSet,
    PartialObject,
    Function,
}

/// A rule signature.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Head {
    pub name: Var,
    /// Argument terms, for function rules.
    pub args: Vec<Term>,
    /// Key term, for partial rules.
    pub key: Option<Term>,
    /// Value term. Defaults to `true` for bodies without one.
    pub value: Option<Term>,
    /// Declared with `:=` rather than `=`.
    pub assign: bool,
    pub location: NodeLoc,
}

impl Head {
    /// A head producing a complete document with the default `true` value.
    pub fn new(name: impl Into<String>) -> Self {
        Head {
            name: Var::new(name),
            args: Vec::new(),
            key: None,
            value: Some(Term::truth()),
            assign: false,
            location: NodeLoc::none(),
        }
    }

    /// The document kind this head produces.
    pub fn kind(&self) -> RuleKind {
        if !self.args.is_empty() {
            RuleKind::Function
        } else if self.key.is_some() && self.value.is_some() {
            RuleKind::PartialObject
        } else if self.key.is_some() {
            RuleKind::PartialSet
        } else {
            RuleKind::CompleteDoc
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, a) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            write!(f, ")")?;
        }
        if let Some(key) = &self.key {
            write!(f, "[{key}]")?;
        }
        if let Some(value) = &self.value {
            if self.kind() != RuleKind::PartialSet {
                write!(f, " = {value}")?;
            }
        }
        Ok(())
    }
}

/// A rule: head, body, optional `else` chain, and a default flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rule {
    pub default: bool,
    pub head: Head,
    pub body: Body,
    pub else_rule: Option<Box<Rule>>,
    /// Rule- and document-scoped annotations attached to this rule.
    pub annotations: Vec<Annotations>,
    pub location: NodeLoc,
}

impl Rule {
    /// A rule with the given head and body.
    pub fn new(head: Head, body: Body) -> Self {
        Rule {
            default: false,
            head,
            body,
            else_rule: None,
            annotations: Vec::new(),
            location: NodeLoc::none(),
        }
    }

    /// The full path of the rule: package path appended by head name.
    pub fn path_in(&self, pkg: &Package) -> Ref {
        pkg.path
            .append(Term::from(Value::String(self.head.name.as_str().to_string())))
    }

    /// This rule followed by its `else` chain, in order.
    pub fn chain(&self) -> Vec<&Rule> {
        let mut out = vec![self];
        let mut cur = self;
        while let Some(next) = cur.else_rule.as_deref() {
            out.push(next);
            cur = next;
        }
        out
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.default {
            write!(f, "default ")?;
        }
        write!(f, "{} {{ {} }}", self.head, self.body)?;
        if let Some(else_rule) = &self.else_rule {
            write!(f, " else {else_rule}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Modules
// ============================================================================

/// A package declaration: a reference rooted at `data`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Package {
    pub path: Ref,
    pub location: NodeLoc,
}

impl Package {
    /// Build a package from dotted segments, e.g. `["a", "b"]` for
    /// `package a.b`.
    pub fn from_segments(segments: &[&str]) -> Self {
        let mut terms = vec![Term::var("data")];
        for seg in segments {
            terms.push(Term::string(*seg));
        }
        Package {
            path: Ref::new(terms),
            location: NodeLoc::none(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package ")?;
        for (i, term) in self.path.operands().iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match &term.value {
                Value::String(s) => write!(f, "{s}")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

/// An import: a path reference and an optional alias.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Import {
    pub path: Term,
    pub alias: Option<Var>,
    pub location: NodeLoc,
}

impl Import {
    /// The name this import binds: the alias when present, otherwise the
    /// last path element.
    pub fn name(&self) -> Option<Var> {
        if let Some(alias) = &self.alias {
            return Some(alias.clone());
        }
        let r = self.path.value.as_ref_value()?;
        match r.operands().last().map(|t| &t.value) {
            Some(Value::String(s)) => Some(Var::new(s.clone())),
            None => r.head_var().cloned(),
            _ => None,
        }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import {}", self.path)?;
        if let Some(alias) = &self.alias {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

/// A parsed policy module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub package: Package,
    pub imports: Vec<Import>,
    pub rules: Vec<Rule>,
    /// Package- and subpackages-scoped annotations.
    pub annotations: Vec<Annotations>,
}

impl Module {
    /// Create an empty module for the given package.
    pub fn new(package: Package) -> Self {
        Module {
            package,
            imports: Vec::new(),
            rules: Vec::new(),
            annotations: Vec::new(),
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.package)?;
        for imp in &self.imports {
            writeln!(f, "{imp}")?;
        }
        for rule in &self.rules {
            writeln!(f, "{rule}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Annotations
// ============================================================================

/// Scope of an annotation: the set of rules it applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AnnotationScope {
    /// The rule the annotation is attached to.
    #[default]
    Rule,
    /// Every rule with the same path as the attached rule.
    Document,
    /// Every rule in the package.
    Package,
    /// Every rule in the package and its subpackages.
    Subpackages,
}

impl AnnotationScope {
    /// The scope keyword as written in metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationScope::Rule => "rule",
            AnnotationScope::Document => "document",
            AnnotationScope::Package => "package",
            AnnotationScope::Subpackages => "subpackages",
        }
    }
}

impl fmt::Display for AnnotationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope-keyed metadata attached to a rule or package.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Annotations {
    pub scope: AnnotationScope,
    pub title: Option<String>,
    pub description: Option<String>,
    pub organizations: Vec<String>,
    pub authors: Vec<String>,
    pub custom: BTreeMap<String, Value>,
    pub location: NodeLoc,
}

impl Annotations {
    /// Create annotations with the given scope.
    pub fn new(scope: AnnotationScope) -> Self {
        Annotations {
            scope,
            ..Annotations::default()
        }
    }

    /// Overlay this annotation onto a less specific one: non-empty fields of
    /// `self` win, empty fields keep the base value.
    pub fn merged_onto(&self, base: &Annotations) -> Annotations {
        Annotations {
            scope: self.scope,
            title: self.title.clone().or_else(|| base.title.clone()),
            description: self
                .description
                .clone()
                .or_else(|| base.description.clone()),
            organizations: if self.organizations.is_empty() {
                base.organizations.clone()
            } else {
                self.organizations.clone()
            },
            authors: if self.authors.is_empty() {
                base.authors.clone()
            } else {
                self.authors.clone()
            },
            custom: if self.custom.is_empty() {
                base.custom.clone()
            } else {
                self.custom.clone()
            },
            location: self.location.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;

    #[test]
    fn test_expr_equality_ignores_index() {
        let mut a = Expr::new_term(Term::var("x"));
        let mut b = Expr::new_term(Term::var("x"));
        a.index = 0;
        b.index = 7;
        assert_eq!(a, b);
    }

    #[test]
    fn test_term_equality_ignores_location() {
        let a = Term::new(
            Value::from("hello"),
            Location::new("f.warden", 1, 1, 0),
        );
        let b = Term::string("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn test_head_kinds() {
        let complete = Head::new("p");
        assert_eq!(complete.kind(), RuleKind::CompleteDoc);

        let mut partial_set = Head::new("p");
        partial_set.key = Some(Term::var("x"));
        partial_set.value = None;
        assert_eq!(partial_set.kind(), RuleKind::PartialSet);

        let mut partial_obj = Head::new("p");
        partial_obj.key = Some(Term::var("x"));
        partial_obj.value = Some(Term::var("y"));
        assert_eq!(partial_obj.kind(), RuleKind::PartialObject);

        let mut func = Head::new("f");
        func.args = vec![Term::var("x")];
        assert_eq!(func.kind(), RuleKind::Function);
    }

    #[test]
    fn test_rule_path() {
        let pkg = Package::from_segments(&["a", "b"]);
        let rule = Rule::new(Head::new("p"), Body::from_exprs(vec![Expr::truth()]));
        assert_eq!(rule.path_in(&pkg).to_string(), "data.a.b.p");
    }

    #[test]
    fn test_operator_ref_round_trip() {
        let r = operator_ref(OP_MEMBER_2);
        assert_eq!(operator_name(&r).as_deref(), Some(OP_MEMBER_2));
        let plain = operator_ref(OP_EQ);
        assert_eq!(operator_name(&plain).as_deref(), Some(OP_EQ));
    }

    #[test]
    fn test_body_reindex() {
        let mut body = Body::new();
        body.push(Expr::truth());
        body.push(Expr::new_term(Term::var("x")));
        body.0.swap(0, 1);
        body.reindex();
        assert_eq!(body.0[0].index, 0);
        assert_eq!(body.0[1].index, 1);
    }

    #[test]
    fn test_annotation_merge_overwrites_non_empty() {
        let mut base = Annotations::new(AnnotationScope::Package);
        base.title = Some("base".to_string());
        base.authors = vec!["alice".to_string()];

        let mut over = Annotations::new(AnnotationScope::Rule);
        over.title = Some("override".to_string());

        let merged = over.merged_onto(&base);
        assert_eq!(merged.title.as_deref(), Some("override"));
        assert_eq!(merged.authors, vec!["alice".to_string()]);
        assert_eq!(merged.scope, AnnotationScope::Rule);
    }

    #[test]
    fn test_package_display() {
        let pkg = Package::from_segments(&["a", "b"]);
        assert_eq!(pkg.to_string(), "package a.b");
    }

    #[test]
    fn test_import_name() {
        let imp = Import {
            path: Term::ref_from(vec![Term::var("data"), Term::string("foo"), Term::string("bar")]),
            alias: None,
            location: NodeLoc::none(),
        };
        assert_eq!(imp.name(), Some(Var::new("bar")));

        let aliased = Import {
            alias: Some(Var::new("baz")),
            ..imp
        };
        assert_eq!(aliased.name(), Some(Var::new("baz")));
    }
}
