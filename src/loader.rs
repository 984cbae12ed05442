//! Lazy module loading.
//!
//! A [`ModuleLoader`] lets callers stream additional modules into a compile:
//! after reference resolution the driver hands the loader the current module
//! set, merges whatever it returns, re-resolves, and repeats until the
//! loader returns nothing new. Loader failures abort the compile.

use crate::ast::Module;
use std::collections::BTreeMap;

/// Callback-driven module source consulted during compilation.
///
/// The loader receives the currently resolved modules and returns additional
/// parsed modules keyed by name. Returning an empty map signals completion.
/// Modules whose names are already present are ignored.
pub trait ModuleLoader {
    fn load(
        &mut self,
        resolved: &BTreeMap<String, Module>,
    ) -> anyhow::Result<BTreeMap<String, Module>>;
}

impl<F> ModuleLoader for F
where
    F: FnMut(&BTreeMap<String, Module>) -> anyhow::Result<BTreeMap<String, Module>>,
{
    fn load(
        &mut self,
        resolved: &BTreeMap<String, Module>,
    ) -> anyhow::Result<BTreeMap<String, Module>> {
        self(resolved)
    }
}
