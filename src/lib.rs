//! # Warden Policy Compiler
//!
//! Compiles modules written in the Warden declarative policy language into
//! a well-formed, analyzable program: every symbolic reference resolved to
//! its fully-qualified form, surface syntax rewritten into a canonical
//! low-level form, every variable bound before use, recursion rejected, and
//! rules organized into the lookup indexes an evaluator needs.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Policy Source Code
//!     |
//! [Parser]               -> Modules (AST)
//!     |
//! [Compiler]             -> resolve refs, rewrite locals/heads/terms,
//!     |                     check conflicts, reorder for safety,
//!     |                     detect recursion, check types
//!     |
//! [Lookup Indexes]       -> module tree, rule tree, dependency graph,
//!                           base-document equality indexes
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use warden::{parse_module, Compiler};
//!
//! let module = parse_module(
//!     "example.warden",
//!     r#"
//!     package authz
//!
//!     default allow = false
//!
//!     allow { input.user = "admin" }
//!     "#,
//! )
//! .expect("parse");
//!
//! let mut modules = BTreeMap::new();
//! modules.insert("example.warden".to_string(), module);
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(&modules);
//! assert!(!compiler.failed());
//! ```
//!
//! ## Querying compiled policies
//!
//! After a successful compile the [`Compiler`] exposes the rule tree,
//! `get_rules*` accessors, per-leaf equality indexes, and a
//! [`QueryCompiler`] that canonicalizes ad-hoc query bodies against the
//! compiled modules.

pub mod annotations;
pub mod ast;
pub mod builtins;
pub mod capabilities;
pub mod compiler;
pub mod errors;
pub mod graph;
pub mod index;
pub mod loader;
pub mod location;
pub mod metrics;
pub mod parser;
pub mod tree;
pub mod value;

pub use annotations::{AnnotationSet, AnnotationsRef};
pub use capabilities::Capabilities;
pub use compiler::{Compiler, QueryCompiler, QueryContext};
pub use errors::{Error, ErrorKind, Errors};
pub use loader::ModuleLoader;
pub use location::Location;
pub use parser::{parse_body, parse_module};
