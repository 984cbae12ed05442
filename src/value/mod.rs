//! # Value Algebra
//!
//! Core value types for the Warden policy AST: scalars, ordered containers,
//! references, and comprehension values. Used across parsing, compilation,
//! and rule indexing.
//!
//! Invariants:
//! - Hashing is consistent with equality for every variant.
//! - Containers ([`Object`], [`Set`]) are BTree-backed, so iteration is
//!   always ordered by the total ordering over values and no lazy sort cache
//!   exists to materialize before concurrent reads.
//! - [`Number`] preserves the textual form it was written with and compares
//!   through a canonical integer-or-float key, so `1`, `1.0`, and `1e0` are
//!   equal and hash alike.

use crate::ast::{Body, Term};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{btree_map, btree_set, BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// ============================================================================
// Numbers
// ============================================================================

/// An arbitrary-precision decimal literal.
///
/// The textual form is preserved for round-tripping; comparisons go through a
/// canonical key so numerically equal literals are equal values.
#[derive(Debug, Clone)]
pub struct Number {
    repr: String,
    key: NumberKey,
}

/// Canonical comparison key for a number.
///
/// Integral values (including floats with no fractional part) normalize to
/// `Int` so `1` and `1.0` are the same value. Values outside the safe
/// integer range fall back to `Float` over total-order bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum NumberKey {
    Int(i128),
    Float(u64),
}

fn float_total_bits(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits >> 63 == 1 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

fn float_from_total_bits(bits: u64) -> f64 {
    if bits >> 63 == 1 {
        f64::from_bits(bits & !(1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

fn canonical_key(f: f64) -> NumberKey {
    // Past 2^110 the float has no unit precision left, so the integer
    // normalization would be meaningless anyway.
    const INT_BOUND: f64 = 1.3e33;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < INT_BOUND {
        NumberKey::Int(f as i128)
    } else {
        NumberKey::Float(float_total_bits(f))
    }
}

impl Number {
    /// The textual form of the literal.
    pub fn as_str(&self) -> &str {
        &self.repr
    }

    /// The value as an `i64`, when integral and in range.
    pub fn as_i64(&self) -> Option<i64> {
        match self.key {
            NumberKey::Int(i) => i64::try_from(i).ok(),
            NumberKey::Float(_) => None,
        }
    }

    /// The value as an `f64` (lossy for very large integers).
    pub fn as_f64(&self) -> f64 {
        match self.key {
            NumberKey::Int(i) => i as f64,
            NumberKey::Float(bits) => float_from_total_bits(bits),
        }
    }

    /// True when the value is integral.
    pub fn is_int(&self) -> bool {
        matches!(self.key, NumberKey::Int(_))
    }
}

/// Error returned when a numeric literal cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid number literal: {0}")]
pub struct ParseNumberError(pub String);

impl FromStr for Number {
    type Err = ParseNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let is_plain_int = !s.contains(['.', 'e', 'E']);
        if is_plain_int {
            if let Ok(i) = s.parse::<i128>() {
                return Ok(Number {
                    repr: s.to_string(),
                    key: NumberKey::Int(i),
                });
            }
        }
        let f = s
            .parse::<f64>()
            .map_err(|_| ParseNumberError(s.to_string()))?;
        if f.is_nan() {
            return Err(ParseNumberError(s.to_string()));
        }
        Ok(Number {
            repr: s.to_string(),
            key: canonical_key(f),
        })
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number {
            repr: i.to_string(),
            key: NumberKey::Int(i128::from(i)),
        }
    }
}

impl From<usize> for Number {
    fn from(i: usize) -> Self {
        Number {
            repr: i.to_string(),
            key: NumberKey::Int(i as i128),
        }
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number {
            repr: format!("{f}"),
            key: canonical_key(f),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Number {}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.key, other.key) {
            (NumberKey::Int(a), NumberKey::Int(b)) => a.cmp(&b),
            (NumberKey::Float(a), NumberKey::Float(b)) => a.cmp(&b),
            // Mixed: compare numerically, tie-break on the variant so the
            // order stays total and antisymmetric.
            (NumberKey::Int(a), NumberKey::Float(b)) => {
                match (a as f64).partial_cmp(&float_from_total_bits(b)) {
                    Some(Ordering::Equal) | None => Ordering::Less,
                    Some(ord) => ord,
                }
            }
            (NumberKey::Float(a), NumberKey::Int(b)) => {
                match float_from_total_bits(a).partial_cmp(&(b as f64)) {
                    Some(Ordering::Equal) | None => Ordering::Greater,
                    Some(ord) => ord,
                }
            }
        }
    }
}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr)
    }
}

impl Serialize for Number {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.repr)
    }
}

// ============================================================================
// Variables
// ============================================================================

/// An identifier naming a variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Var(pub String);

impl Var {
    /// Create a variable from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Var(name.into())
    }

    /// The variable name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the anonymous `_` placeholder produced by the parser.
    pub fn is_wildcard(&self) -> bool {
        self.0 == "_"
    }

    /// True for compiler-generated local variables.
    pub fn is_generated(&self) -> bool {
        self.0.starts_with("__local")
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Var(s.to_string())
    }
}

// ============================================================================
// References
// ============================================================================

/// A reference: an ordered sequence of terms addressing a document.
///
/// The head is always a [`Var`]; the remainder are typically strings,
/// variables, numbers, or nested references.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ref(pub Vec<Term>);

impl Ref {
    /// Create a reference from its parts.
    pub fn new(terms: Vec<Term>) -> Self {
        Ref(terms)
    }

    /// A single-element reference naming a variable.
    pub fn from_var(v: Var) -> Self {
        Ref(vec![Term::from(Value::Var(v))])
    }

    /// The head term.
    pub fn head(&self) -> Option<&Term> {
        self.0.first()
    }

    /// The head variable, when the head is a variable (it always is for
    /// references produced by the parser).
    pub fn head_var(&self) -> Option<&Var> {
        match self.0.first().map(|t| &t.value) {
            Some(Value::Var(v)) => Some(v),
            _ => None,
        }
    }

    /// The operand terms following the head.
    pub fn operands(&self) -> &[Term] {
        if self.0.is_empty() {
            &[]
        } else {
            &self.0[1..]
        }
    }

    /// Number of elements, including the head.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the reference has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when no operand contains a variable. The head is exempt: a
    /// reference rooted at `data` is ground even though `data` is a variable.
    pub fn is_ground(&self) -> bool {
        self.operands().iter().all(|t| t.value.is_ground())
    }

    /// True when some operand is itself a reference.
    pub fn is_nested(&self) -> bool {
        self.operands()
            .iter()
            .any(|t| matches!(t.value, Value::Ref(_)))
    }

    /// Append a term, returning a new reference.
    pub fn append(&self, term: Term) -> Ref {
        let mut terms = self.0.clone();
        terms.push(term);
        Ref(terms)
    }

    /// Concatenate additional operand terms onto a copy of this reference.
    pub fn concat(&self, operands: &[Term]) -> Ref {
        let mut terms = self.0.clone();
        terms.extend(operands.iter().cloned());
        Ref(terms)
    }

    /// The longest prefix whose operands are all ground.
    pub fn ground_prefix(&self) -> Ref {
        let mut terms = Vec::with_capacity(self.0.len());
        for (i, term) in self.0.iter().enumerate() {
            if i > 0 && !term.value.is_ground() {
                break;
            }
            terms.push(term.clone());
        }
        Ref(terms)
    }

    /// Iterate the element terms.
    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.0.iter()
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((head, operands)) = self.0.split_first() else {
            return Ok(());
        };
        write!(f, "{head}")?;
        for op in operands {
            match &op.value {
                Value::String(s) if is_ident(s) => write!(f, ".{s}")?,
                _ => write!(f, "[{op}]")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Containers
// ============================================================================

/// An ordered sequence of terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Array(pub Vec<Term>);

impl Array {
    /// Create an array from elements.
    pub fn new(elems: Vec<Term>) -> Self {
        Array(elems)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Element at `i`.
    pub fn get(&self, i: usize) -> Option<&Term> {
        self.0.get(i)
    }

    /// Iterate the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, Term> {
        self.0.iter()
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, t) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, "]")
    }
}

/// An insertion-independent mapping from terms to terms with iteration
/// ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Object {
    map: BTreeMap<Term, Term>,
}

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Object {
            map: BTreeMap::new(),
        }
    }

    /// Build an object from key/value pairs. Later duplicates win.
    pub fn from_pairs(pairs: Vec<(Term, Term)>) -> Self {
        let mut obj = Object::new();
        for (k, v) in pairs {
            obj.insert(k, v);
        }
        obj
    }

    /// Insert a key/value pair, returning the previous value if any.
    pub fn insert(&mut self, key: Term, value: Term) -> Option<Term> {
        self.map.insert(key, value)
    }

    /// Look up a value by key.
    pub fn get(&self, key: &Term) -> Option<&Term> {
        self.map.get(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when the object has no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, Term, Term> {
        self.map.iter()
    }

    /// Iterate keys in order.
    pub fn keys(&self) -> btree_map::Keys<'_, Term, Term> {
        self.map.keys()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// A set of unique terms with ordered iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Set {
    set: BTreeSet<Term>,
}

impl Set {
    /// Create an empty set.
    pub fn new() -> Self {
        Set {
            set: BTreeSet::new(),
        }
    }

    /// Build a set from elements, deduplicating.
    pub fn from_elems(elems: Vec<Term>) -> Self {
        Set {
            set: elems.into_iter().collect(),
        }
    }

    /// Add an element. Returns true when it was not already present.
    pub fn add(&mut self, term: Term) -> bool {
        self.set.insert(term)
    }

    /// Membership test.
    pub fn contains(&self, term: &Term) -> bool {
        self.set.contains(term)
    }

    /// Look up the stored element equal to `term`, if present.
    pub fn get(&self, term: &Term) -> Option<&Term> {
        self.set.get(term)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// True when the set has no elements.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Iterate elements in order.
    pub fn iter(&self) -> btree_set::Iter<'_, Term> {
        self.set.iter()
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.set.is_empty() {
            return write!(f, "set()");
        }
        write!(f, "{{")?;
        for (i, t) in self.set.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// Comprehensions and calls
// ============================================================================

/// `[term | body]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayComprehension {
    pub term: Box<Term>,
    pub body: Body,
}

/// `{term | body}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetComprehension {
    pub term: Box<Term>,
    pub body: Body,
}

/// `{key: value | body}`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectComprehension {
    pub key: Box<Term>,
    pub value: Box<Term>,
    pub body: Body,
}

impl fmt::Display for ArrayComprehension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} | {}]", self.term, self.body)
    }
}

impl fmt::Display for SetComprehension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} | {}}}", self.term, self.body)
    }
}

impl fmt::Display for ObjectComprehension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}: {} | {}}}", self.key, self.value, self.body)
    }
}

/// A function call as a term: the operator reference followed by arguments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Call(pub Vec<Term>);

impl Call {
    /// Create a call from operator and argument terms.
    pub fn new(terms: Vec<Term>) -> Self {
        Call(terms)
    }

    /// The operator reference.
    pub fn operator(&self) -> Option<&Ref> {
        match self.0.first().map(|t| &t.value) {
            Some(Value::Ref(r)) => Some(r),
            _ => None,
        }
    }

    /// The argument terms.
    pub fn args(&self) -> &[Term] {
        if self.0.is_empty() {
            &[]
        } else {
            &self.0[1..]
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.split_first() {
            None => write!(f, "()"),
            Some((op, args)) => {
                write!(f, "{op}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Value
// ============================================================================

/// A policy value.
///
/// Variants are declared in comparison rank order, so the derived total
/// ordering sorts first by kind and then by content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Var(Var),
    Ref(Ref),
    Array(Array),
    Object(Object),
    Set(Set),
    ArrayComprehension(ArrayComprehension),
    ObjectComprehension(ObjectComprehension),
    SetComprehension(SetComprehension),
    Call(Call),
}

impl Value {
    /// Human-readable name of the value kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Var(_) => "var",
            Value::Ref(_) => "ref",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Set(_) => "set",
            Value::ArrayComprehension(_) => "arraycomprehension",
            Value::ObjectComprehension(_) => "objectcomprehension",
            Value::SetComprehension(_) => "setcomprehension",
            Value::Call(_) => "call",
        }
    }

    /// True for null, booleans, numbers, and strings.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_)
        )
    }

    /// True when the value contains no variables.
    ///
    /// Reference heads are exempt (see [`Ref::is_ground`]); comprehensions
    /// and calls are never ground since they require evaluation.
    pub fn is_ground(&self) -> bool {
        match self {
            Value::Null | Value::Boolean(_) | Value::Number(_) | Value::String(_) => true,
            Value::Var(_) => false,
            Value::Ref(r) => r.is_ground(),
            Value::Array(arr) => arr.iter().all(|t| t.value.is_ground()),
            Value::Object(obj) => obj
                .iter()
                .all(|(k, v)| k.value.is_ground() && v.value.is_ground()),
            Value::Set(set) => set.iter().all(|t| t.value.is_ground()),
            Value::ArrayComprehension(_)
            | Value::ObjectComprehension(_)
            | Value::SetComprehension(_)
            | Value::Call(_) => false,
        }
    }

    /// True when evaluating the value involves more than substitution:
    /// references, calls, comprehensions, or composites containing them.
    pub fn requires_eval(&self) -> bool {
        match self {
            Value::Null
            | Value::Boolean(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Var(_) => false,
            Value::Ref(_)
            | Value::Call(_)
            | Value::ArrayComprehension(_)
            | Value::ObjectComprehension(_)
            | Value::SetComprehension(_) => true,
            Value::Array(arr) => arr.iter().any(|t| t.value.requires_eval()),
            Value::Object(obj) => obj
                .iter()
                .any(|(k, v)| k.value.requires_eval() || v.value.requires_eval()),
            Value::Set(set) => set.iter().any(|t| t.value.requires_eval()),
        }
    }

    /// Navigate into the value along a path of ground terms.
    ///
    /// Objects are indexed by key, arrays by integral number, sets by
    /// membership. Returns `None` when the path does not exist.
    pub fn find(&self, path: &[Term]) -> Option<&Value> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        match self {
            Value::Object(obj) => obj.get(first)?.value.find(rest),
            Value::Array(arr) => {
                let idx = match &first.value {
                    Value::Number(n) => usize::try_from(n.as_i64()?).ok()?,
                    _ => return None,
                };
                arr.get(idx)?.value.find(rest)
            }
            Value::Set(set) => {
                let member = set.get(first)?;
                member.value.find(rest)
            }
            _ => None,
        }
    }

    /// The variable, when this value is one.
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Value::Var(v) => Some(v),
            _ => None,
        }
    }

    /// The reference, when this value is one.
    pub fn as_ref_value(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The string, when this value is one.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Var(v) => write!(f, "{v}"),
            Value::Ref(r) => write!(f, "{r}"),
            Value::Array(a) => write!(f, "{a}"),
            Value::Object(o) => write!(f, "{o}"),
            Value::Set(s) => write!(f, "{s}"),
            Value::ArrayComprehension(c) => write!(f, "{c}"),
            Value::ObjectComprehension(c) => write!(f, "{c}"),
            Value::SetComprehension(c) => write!(f, "{c}"),
            Value::Call(c) => write!(f, "{c}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("type", self.type_name())?;
        match self {
            Value::Null => map.serialize_entry("value", &())?,
            Value::Boolean(b) => map.serialize_entry("value", b)?,
            Value::Number(n) => map.serialize_entry("value", n)?,
            Value::String(s) => map.serialize_entry("value", s)?,
            Value::Var(v) => map.serialize_entry("value", v.as_str())?,
            Value::Ref(r) => map.serialize_entry("value", &TermSeq(&r.0))?,
            Value::Array(a) => map.serialize_entry("value", &TermSeq(&a.0))?,
            Value::Object(o) => map.serialize_entry("value", &PairSeq(o))?,
            Value::Set(s) => {
                let elems: Vec<&Term> = s.iter().collect();
                map.serialize_entry("value", &elems)?;
            }
            Value::ArrayComprehension(c) => {
                map.serialize_entry("value", &ComprehensionRepr::one(&c.term, &c.body))?;
            }
            Value::SetComprehension(c) => {
                map.serialize_entry("value", &ComprehensionRepr::one(&c.term, &c.body))?;
            }
            Value::ObjectComprehension(c) => {
                map.serialize_entry("value", &ComprehensionRepr::kv(&c.key, &c.value, &c.body))?;
            }
            Value::Call(c) => map.serialize_entry("value", &TermSeq(&c.0))?,
        }
        map.end()
    }
}

struct TermSeq<'a>(&'a [Term]);

impl Serialize for TermSeq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for t in self.0 {
            seq.serialize_element(t)?;
        }
        seq.end()
    }
}

struct PairSeq<'a>(&'a Object);

impl Serialize for PairSeq<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (k, v) in self.0.iter() {
            seq.serialize_element(&[k, v])?;
        }
        seq.end()
    }
}

#[derive(Serialize)]
struct ComprehensionRepr<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    term: Option<&'a Term>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a Term>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Term>,
    body: &'a Body,
}

impl<'a> ComprehensionRepr<'a> {
    fn one(term: &'a Term, body: &'a Body) -> Self {
        ComprehensionRepr {
            term: Some(term),
            key: None,
            value: None,
            body,
        }
    }

    fn kv(key: &'a Term, value: &'a Term, body: &'a Body) -> Self {
        ComprehensionRepr {
            term: None,
            key: Some(key),
            value: Some(value),
            body,
        }
    }
}

// Convenience conversions used heavily by the rewrite stages and tests.

impl From<Var> for Value {
    fn from(v: Var) -> Self {
        Value::Var(v)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(Number::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;

    fn term(v: impl Into<Value>) -> Term {
        Term::from(v.into())
    }

    #[test]
    fn test_number_textual_form_preserved() {
        let n: Number = "1.50".parse().expect("parse");
        assert_eq!(n.to_string(), "1.50");
    }

    #[test]
    fn test_number_equality_ignores_form() {
        let a: Number = "1".parse().expect("parse");
        let b: Number = "1.0".parse().expect("parse");
        let c: Number = "1e0".parse().expect("parse");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(a.is_int());
    }

    #[test]
    fn test_number_ordering() {
        let vals: Vec<Number> = ["-2", "-0.5", "0", "0.5", "2", "10"]
            .iter()
            .map(|s| s.parse().expect("parse"))
            .collect();
        for w in vals.windows(2) {
            assert!(w[0] < w[1], "{} < {}", w[0], w[1]);
        }
    }

    #[test]
    fn test_number_large_int_precision() {
        let a: Number = "9007199254740993".parse().expect("parse");
        let b: Number = "9007199254740992".parse().expect("parse");
        // Distinguishable beyond f64 precision.
        assert_ne!(a, b);
        assert!(b < a);
    }

    #[test]
    fn test_value_kind_ordering() {
        let vals = vec![
            Value::Null,
            Value::Boolean(false),
            Value::from(1),
            Value::from("a"),
            Value::Var(Var::new("x")),
        ];
        for w in vals.windows(2) {
            assert!(w[0] < w[1]);
        }
    }

    #[test]
    fn test_object_iteration_ordered_by_key() {
        let mut obj = Object::new();
        obj.insert(term("b"), term(2));
        obj.insert(term("a"), term(1));
        obj.insert(term("c"), term(3));
        let keys: Vec<String> = obj
            .keys()
            .filter_map(|k| k.value.as_string().map(String::from))
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_object_insertion_independent_equality() {
        let a = Object::from_pairs(vec![(term("x"), term(1)), (term("y"), term(2))]);
        let b = Object::from_pairs(vec![(term("y"), term(2)), (term("x"), term(1))]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_set_deduplicates() {
        let s = Set::from_elems(vec![term(1), term("1.0".parse::<Number>().expect("parse"))]);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_find_object_array_path() {
        let inner = Array::new(vec![term(10), term(20)]);
        let obj = Object::from_pairs(vec![(term("xs"), term(Value::Array(inner)))]);
        let v = Value::Object(obj);
        let found = v.find(&[term("xs"), term(1)]).expect("path exists");
        assert_eq!(*found, Value::from(20));
        assert!(v.find(&[term("xs"), term(2)]).is_none());
        assert!(v.find(&[term("missing")]).is_none());
    }

    #[test]
    fn test_find_set_membership() {
        let s = Set::from_elems(vec![term("a"), term("b")]);
        let v = Value::Set(s);
        assert_eq!(*v.find(&[term("a")]).expect("member"), Value::from("a"));
        assert!(v.find(&[term("c")]).is_none());
    }

    #[test]
    fn test_ref_ground_prefix() {
        let r = Ref::new(vec![
            term(Value::Var(Var::new("data"))),
            term("a"),
            term(Value::Var(Var::new("i"))),
            term("b"),
        ]);
        assert!(!r.is_ground());
        let prefix = r.ground_prefix();
        assert_eq!(prefix.len(), 2);
        assert!(prefix.is_ground());
    }

    #[test]
    fn test_ref_display() {
        let r = Ref::new(vec![
            term(Value::Var(Var::new("data"))),
            term("foo"),
            term(Value::Var(Var::new("i"))),
            term("not-an-ident"),
        ]);
        assert_eq!(r.to_string(), "data.foo[i][\"not-an-ident\"]");
    }

    #[test]
    fn test_set_display_empty() {
        assert_eq!(Set::new().to_string(), "set()");
    }

    #[test]
    fn test_requires_eval() {
        assert!(!Value::from(1).requires_eval());
        assert!(!Value::Var(Var::new("x")).requires_eval());
        let r = Ref::new(vec![term(Value::Var(Var::new("data"))), term("a")]);
        assert!(Value::Ref(r.clone()).requires_eval());
        let arr = Array::new(vec![term(1), term(Value::Ref(r))]);
        assert!(Value::Array(arr).requires_eval());
    }
}
