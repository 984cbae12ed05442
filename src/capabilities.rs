//! Capability sets bounding the built-ins a compile may use.
//!
//! A [`Capabilities`] value restricts the registry consulted during safety
//! and type checking. Built-ins outside the set are reported as undefined;
//! built-ins marked unsafe on the compiler produce compile errors at every
//! call site.

use crate::builtins::{self, Builtin};
use std::collections::BTreeMap;

/// The set of built-ins available to a compile.
#[derive(Debug, Clone)]
pub struct Capabilities {
    builtins: BTreeMap<&'static str, &'static Builtin>,
}

impl Capabilities {
    /// Capabilities covering every built-in known to this build.
    pub fn default_set() -> Self {
        Capabilities {
            builtins: builtins::registry(),
        }
    }

    /// Capabilities restricted to the named built-ins. Unknown names are
    /// ignored.
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let full = builtins::registry();
        let builtins = names
            .into_iter()
            .filter_map(|n| full.get(n).map(|b| (b.name, *b)))
            .collect();
        Capabilities { builtins }
    }

    /// Look up a built-in declaration by (possibly dotted) name.
    pub fn get(&self, name: &str) -> Option<&'static Builtin> {
        self.builtins.get(name).copied()
    }

    /// True when the named built-in is available.
    pub fn contains(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Iterate the available declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = &'static Builtin> + '_ {
        self.builtins.values().copied()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::default_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_is_complete() {
        let caps = Capabilities::default_set();
        assert!(caps.contains("eq"));
        assert!(caps.contains("walk"));
    }

    #[test]
    fn test_restricted_set() {
        let caps = Capabilities::from_names(["eq", "count", "no_such_builtin"]);
        assert!(caps.contains("eq"));
        assert!(caps.contains("count"));
        assert!(!caps.contains("walk"));
    }
}
