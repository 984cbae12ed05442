//! Compiler Error Types
//!
//! Structured errors accumulated by the compile pipeline. Every error carries
//! a kind code, a human-readable message, and the originating [`Location`]
//! when known. Callers inspect failures by iterating the [`Errors`] list.

use crate::location::Location;
use serde::Serialize;
use std::fmt;

/// Sentinel message appended when the configured error limit is exceeded.
pub const ERROR_LIMIT_REACHED: &str = "error limit reached";

/// Kind codes for compiler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Errors produced while parsing source text.
    Parse,
    /// General compile errors: shadowing, bad with-targets, ref-in-args,
    /// mutation of reserved roots.
    Compile,
    /// Arity mismatches, conflicting rule kinds, multiple defaults,
    /// undefined built-ins or functions.
    Type,
    /// A variable used before any expression binds it.
    UnsafeVar,
    /// A cycle in the rule dependency graph.
    Recursion,
    /// Internal invariant violations. Should not be observable.
    Internal,
}

impl ErrorKind {
    /// Stable string code for programmatic matching.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse error",
            ErrorKind::Compile => "compile error",
            ErrorKind::Type => "type error",
            ErrorKind::UnsafeVar => "unsafe variable error",
            ErrorKind::Recursion => "recursion error",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A single structured compiler error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{}", fmt_error(.kind, .location, .message))]
pub struct Error {
    /// Kind code.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Source position, when known.
    pub location: Option<Location>,
}

impl Error {
    /// Create an error with a location.
    pub fn new(kind: ErrorKind, location: Option<Location>, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            location,
        }
    }

    /// Create a compile error.
    pub fn compile(location: Option<Location>, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Compile, location, message)
    }

    /// Create a type error.
    pub fn type_err(location: Option<Location>, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Type, location, message)
    }

    /// Create an unsafe-variable error.
    pub fn unsafe_var(location: Option<Location>, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::UnsafeVar, location, message)
    }

    /// Create a recursion error.
    pub fn recursion(location: Option<Location>, message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Recursion, location, message)
    }
}

fn fmt_error(kind: &ErrorKind, location: &Option<Location>, message: &str) -> String {
    match location {
        Some(loc) => format!("{loc}: {kind}: {message}"),
        None => format!("{kind}: {message}"),
    }
}

/// An ordered collection of compiler errors.
///
/// Stages append independent errors for a module or rule before giving up, so
/// a single failed compile usually reports more than one problem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{}", fmt_errors(.0))]
pub struct Errors(pub Vec<Error>);

fn fmt_errors(errors: &[Error]) -> String {
    match errors.len() {
        0 => "no error(s)".to_string(),
        1 => format!("1 error occurred: {}", errors[0]),
        n => {
            let mut out = format!("{n} errors occurred:");
            for err in errors {
                out.push('\n');
                out.push_str(&err.to_string());
            }
            out
        }
    }
}

impl Errors {
    /// An empty error list.
    pub fn new() -> Self {
        Errors(Vec::new())
    }

    /// Append an error.
    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    /// Append all errors from another list.
    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    /// Number of accumulated errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no errors have been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the errors in order of occurrence.
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }
}

impl From<Error> for Errors {
    fn from(err: Error) -> Self {
        Errors(vec![err])
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
