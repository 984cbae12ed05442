//! # Built-in Function Registry
//!
//! Declares the built-in functions known to the compiler: name, arity,
//! input/output argument positions, and a deprecation flag. The safety
//! analyzer consults output positions to decide which variables a call
//! binds; the type checker consults arity.
//!
//! Calls may carry one extra operand beyond the declared arity: the capture
//! position produced when a nested call is extracted into an expression
//! (`x = f(y)` becomes `f(y, __local0__); x = __local0__`). The capture
//! position is always an output.

use std::collections::BTreeMap;

/// Declaration of a built-in function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin {
    /// Possibly dotted name, e.g. `internal.member_2`.
    pub name: &'static str,
    /// Infix spelling, for operators.
    pub infix: Option<&'static str>,
    /// Number of declared arguments, excluding the optional capture.
    pub arity: usize,
    /// Declared argument positions bound by evaluation.
    pub outputs: &'static [usize],
    /// Accepts any number of arguments (`print`).
    pub variadic: bool,
    /// Flagged by the deprecated-built-ins check.
    pub deprecated: bool,
}

impl Builtin {
    /// True when the declared position is an output.
    pub fn is_output(&self, pos: usize) -> bool {
        self.outputs.contains(&pos)
    }

    /// Declared argument positions that must be bound before the call runs.
    pub fn input_positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.arity).filter(move |p| !self.is_output(*p))
    }
}

const fn builtin(name: &'static str, arity: usize) -> Builtin {
    Builtin {
        name,
        infix: None,
        arity,
        outputs: &[],
        variadic: false,
        deprecated: false,
    }
}

const fn operator(name: &'static str, infix: &'static str, arity: usize) -> Builtin {
    Builtin {
        name,
        infix: Some(infix),
        arity,
        outputs: &[],
        variadic: false,
        deprecated: false,
    }
}

const fn deprecated(name: &'static str, arity: usize) -> Builtin {
    Builtin {
        name,
        infix: None,
        arity,
        outputs: &[],
        variadic: false,
        deprecated: true,
    }
}

/// Unification. Handled specially by the safety analyzer.
pub static EQ: Builtin = operator("eq", "=", 2);
/// Boolean equality.
pub static EQUAL: Builtin = operator("equal", "==", 2);
/// Assignment. Lowered to unification during compilation.
pub static ASSIGN: Builtin = operator("assign", ":=", 2);

static NEQ: Builtin = operator("neq", "!=", 2);
static LT: Builtin = operator("lt", "<", 2);
static LTE: Builtin = operator("lte", "<=", 2);
static GT: Builtin = operator("gt", ">", 2);
static GTE: Builtin = operator("gte", ">=", 2);

static PLUS: Builtin = operator("plus", "+", 2);
static MINUS: Builtin = operator("minus", "-", 2);
static MUL: Builtin = operator("mul", "*", 2);
static DIV: Builtin = operator("div", "/", 2);
static REM: Builtin = operator("rem", "%", 2);

static COUNT: Builtin = builtin("count", 1);
static SUM: Builtin = builtin("sum", 1);
static MAX: Builtin = builtin("max", 1);
static MIN: Builtin = builtin("min", 1);
static SORT: Builtin = builtin("sort", 1);
static ABS: Builtin = builtin("abs", 1);

static CONCAT: Builtin = builtin("concat", 2);
static SPLIT: Builtin = builtin("split", 2);
static CONTAINS: Builtin = builtin("contains", 2);
static STARTSWITH: Builtin = builtin("startswith", 2);
static ENDSWITH: Builtin = builtin("endswith", 2);
static LOWER: Builtin = builtin("lower", 1);
static UPPER: Builtin = builtin("upper", 1);
static FORMAT_INT: Builtin = builtin("format_int", 2);
static TO_NUMBER: Builtin = builtin("to_number", 1);
static TYPE_NAME: Builtin = builtin("type_name", 1);

/// Walks a document, binding `[path, value]` pairs at its second position.
pub static WALK: Builtin = Builtin {
    name: "walk",
    infix: None,
    arity: 2,
    outputs: &[1],
    variadic: false,
    deprecated: false,
};

/// Two-place membership backing `some x in xs`: the element position is
/// bound by iteration.
pub static MEMBER_2: Builtin = Builtin {
    name: "internal.member_2",
    infix: None,
    arity: 2,
    outputs: &[0],
    variadic: false,
    deprecated: false,
};

/// Three-place membership backing `some k, v in xs`.
pub static MEMBER_3: Builtin = Builtin {
    name: "internal.member_3",
    infix: None,
    arity: 3,
    outputs: &[0, 1],
    variadic: false,
    deprecated: false,
};

/// The user-facing print built-in. Erased or lowered during compilation.
pub static PRINT: Builtin = Builtin {
    name: "print",
    infix: None,
    arity: 0,
    outputs: &[],
    variadic: true,
    deprecated: false,
};

/// The internal print built-in emitted by the print rewrite.
pub static PRINT_INTERNAL: Builtin = builtin("internal.print", 1);

static ALL: Builtin = deprecated("all", 1);
static ANY: Builtin = deprecated("any", 1);
static CAST_ARRAY: Builtin = deprecated("cast_array", 1);
static CAST_SET: Builtin = deprecated("cast_set", 1);

/// Every built-in known to this build.
pub static BUILTINS: &[&Builtin] = &[
    &EQ,
    &EQUAL,
    &ASSIGN,
    &NEQ,
    &LT,
    &LTE,
    &GT,
    &GTE,
    &PLUS,
    &MINUS,
    &MUL,
    &DIV,
    &REM,
    &COUNT,
    &SUM,
    &MAX,
    &MIN,
    &SORT,
    &ABS,
    &CONCAT,
    &SPLIT,
    &CONTAINS,
    &STARTSWITH,
    &ENDSWITH,
    &LOWER,
    &UPPER,
    &FORMAT_INT,
    &TO_NUMBER,
    &TYPE_NAME,
    &WALK,
    &MEMBER_2,
    &MEMBER_3,
    &PRINT,
    &PRINT_INTERNAL,
    &ALL,
    &ANY,
    &CAST_ARRAY,
    &CAST_SET,
];

/// Build the default name-to-declaration lookup.
pub fn registry() -> BTreeMap<&'static str, &'static Builtin> {
    BUILTINS.iter().map(|b| (b.name, *b)).collect()
}

/// Look up a built-in by its infix spelling.
pub fn by_infix(op: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.infix == Some(op)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_operators() {
        let reg = registry();
        assert!(reg.contains_key("eq"));
        assert!(reg.contains_key("plus"));
        assert!(reg.contains_key("internal.member_3"));
    }

    #[test]
    fn test_by_infix() {
        assert_eq!(by_infix("=").map(|b| b.name), Some("eq"));
        assert_eq!(by_infix("==").map(|b| b.name), Some("equal"));
        assert_eq!(by_infix(":=").map(|b| b.name), Some("assign"));
        assert!(by_infix("?").is_none());
    }

    #[test]
    fn test_input_output_positions() {
        assert_eq!(WALK.input_positions().collect::<Vec<_>>(), vec![0]);
        assert!(WALK.is_output(1));
        assert_eq!(MEMBER_3.input_positions().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_deprecated_flags() {
        let reg = registry();
        assert!(reg["all"].deprecated);
        assert!(!reg["count"].deprecated);
    }
}
