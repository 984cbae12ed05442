//! Rule dependency graph.
//!
//! A directed multigraph over rules (identified by dense integer ids) with
//! forward and inverse adjacency, an iterative DFS-with-timestamps
//! topological sort, and the cycle search used by the recursion checker.

use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a rule in the compiler's rule registry.
pub type RuleId = usize;

/// Directed dependency graph over rules.
///
/// An edge `(u, v)` means `u` refers to a path that reaches `v`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeSet<RuleId>,
    adj: BTreeMap<RuleId, BTreeSet<RuleId>>,
    radj: BTreeMap<RuleId, BTreeSet<RuleId>>,
}

impl Graph {
    /// An empty graph.
    pub fn new() -> Self {
        Graph::default()
    }

    /// Add a node with no edges.
    pub fn add_node(&mut self, id: RuleId) {
        self.nodes.insert(id);
    }

    /// Add an edge from `u` to `v`, inserting both nodes.
    pub fn add_edge(&mut self, u: RuleId, v: RuleId) {
        self.nodes.insert(u);
        self.nodes.insert(v);
        self.adj.entry(u).or_default().insert(v);
        self.radj.entry(v).or_default().insert(u);
    }

    /// The nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.nodes.iter().copied()
    }

    /// Rules that `u` depends on.
    pub fn dependencies(&self, u: RuleId) -> impl Iterator<Item = RuleId> + '_ {
        self.adj.get(&u).into_iter().flatten().copied()
    }

    /// Rules that depend on `u`.
    pub fn dependents(&self, u: RuleId) -> impl Iterator<Item = RuleId> + '_ {
        self.radj.get(&u).into_iter().flatten().copied()
    }

    /// Topological sort: dependencies before dependents.
    ///
    /// Runs an iterative DFS with discovery/finish timestamps and returns
    /// the reverse postorder. Returns `None` when a back-edge is found; the
    /// recursion checker produces the diagnostics in that case.
    pub fn sort(&self) -> Option<Vec<RuleId>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: BTreeMap<RuleId, Color> =
            self.nodes.iter().map(|&n| (n, Color::White)).collect();
        let mut postorder = Vec::with_capacity(self.nodes.len());

        for &root in &self.nodes {
            if color[&root] != Color::White {
                continue;
            }
            // Stack frames: (node, entered). A node is pushed once to open
            // and once more after its successors finish.
            let mut stack = vec![(root, false)];
            while let Some((node, entered)) = stack.pop() {
                if entered {
                    color.insert(node, Color::Black);
                    postorder.push(node);
                    continue;
                }
                if color[&node] != Color::White {
                    continue;
                }
                color.insert(node, Color::Gray);
                stack.push((node, true));
                for succ in self.dependencies(node) {
                    match color[&succ] {
                        Color::White => stack.push((succ, false)),
                        Color::Gray => return None,
                        Color::Black => {}
                    }
                }
            }
        }
        Some(postorder)
    }

    /// Search for a cycle that starts and ends at `start`.
    ///
    /// Returns the cycle path `[start, ..., start]` in visit order, or
    /// `None` when `start` is not on a cycle through itself.
    pub fn find_cycle_from(&self, start: RuleId) -> Option<Vec<RuleId>> {
        let mut path = vec![start];
        let mut visited = BTreeSet::new();
        if self.cycle_dfs(start, start, &mut path, &mut visited) {
            Some(path)
        } else {
            None
        }
    }

    fn cycle_dfs(
        &self,
        current: RuleId,
        target: RuleId,
        path: &mut Vec<RuleId>,
        visited: &mut BTreeSet<RuleId>,
    ) -> bool {
        for succ in self.dependencies(current) {
            if succ == target {
                path.push(target);
                return true;
            }
            if visited.insert(succ) {
                path.push(succ);
                if self.cycle_dfs(succ, target, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }
}
