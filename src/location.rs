//! Source location tracking.
//!
//! Every AST node produced by the parser carries an optional [`Location`]
//! pointing back into the original policy text. Locations are opaque to the
//! compiler: stages copy them around but never interpret them, so positions
//! reported in errors always refer to the text the user wrote, not the
//! rewritten form.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// A position in a source file.
///
/// `offset`/`end` delimit the byte range of the node. `text` preserves the
/// raw snippet so diagnostics can quote the original source even after the
/// AST has been rewritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Source file name (possibly synthetic, e.g. `<query>`).
    pub file: String,
    /// 1-based row.
    pub row: usize,
    /// 1-based column.
    pub col: usize,
    /// Byte offset of the start of the node.
    pub offset: usize,
    /// Byte offset one past the end of the node.
    pub end: usize,
    /// Raw source text covered by the node.
    pub text: String,
}

impl Location {
    /// Create a location for the given position.
    pub fn new(file: impl Into<String>, row: usize, col: usize, offset: usize) -> Self {
        Location {
            file: file.into(),
            row,
            col,
            offset,
            end: offset,
            text: String::new(),
        }
    }

    /// Attach the raw source snippet and end offset.
    pub fn with_text(mut self, end: usize, text: impl Into<String>) -> Self {
        self.end = end;
        self.text = text.into();
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{}:{}", self.row, self.col)
        } else {
            write!(f, "{}:{}:{}", self.file, self.row, self.col)
        }
    }
}

/// An optional location attached to an AST node.
///
/// Transparent to equality, ordering, and hashing: two nodes are the same
/// node no matter where they were written. This lets the AST types derive
/// their comparison traits while still carrying positions for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeLoc(pub Option<Location>);

impl NodeLoc {
    /// A node with no location (synthesized by the compiler).
    pub fn none() -> Self {
        NodeLoc(None)
    }

    /// Clone the inner location, if any.
    pub fn get(&self) -> Option<Location> {
        self.0.clone()
    }
}

impl Deref for NodeLoc {
    type Target = Option<Location>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Location> for NodeLoc {
    fn from(loc: Location) -> Self {
        NodeLoc(Some(loc))
    }
}

impl From<Option<Location>> for NodeLoc {
    fn from(loc: Option<Location>) -> Self {
        NodeLoc(loc)
    }
}

impl PartialEq for NodeLoc {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for NodeLoc {}

impl PartialOrd for NodeLoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeLoc {
    fn cmp(&self, _: &Self) -> Ordering {
        Ordering::Equal
    }
}

impl Hash for NodeLoc {
    fn hash<H: Hasher>(&self, _: &mut H) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_file() {
        let loc = Location::new("policy.warden", 3, 7, 42);
        assert_eq!(loc.to_string(), "policy.warden:3:7");
    }

    #[test]
    fn test_display_without_file() {
        let loc = Location::new("", 1, 1, 0);
        assert_eq!(loc.to_string(), "1:1");
    }

    #[test]
    fn test_node_locs_compare_equal() {
        let a = NodeLoc::from(Location::new("a.warden", 1, 1, 0));
        let b = NodeLoc::none();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }
}
