// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;
use std::hash::Hash;

use petgraph::{
    prelude::DiGraph,
    visit::{Dfs, Walker},
};

/// NodeIndex as employed throughout the build engine
pub type NodeIndex = petgraph::prelude::NodeIndex<u32>;

/// Encapsulation of petgraph suitable for dependency planning: nodes are
/// keyed by their payload, edge insertion refuses duplicates and cycles.
#[derive(Debug, Clone)]
pub struct Dag<N> {
    graph: DiGraph<N, (), u32>,
    indices: HashMap<N, NodeIndex>,
}

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self {
            graph: DiGraph::default(),
            indices: HashMap::default(),
        }
    }
}

impl<N> Dag<N>
where
    N: Clone + Eq + Hash,
{
    /// Construct a new Dag
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds node N to the graph and returns the index.
    /// If N already exists, it'll return the index of that node.
    pub fn add_node_or_get_index(&mut self, node: N) -> NodeIndex {
        if let Some(index) = self.get_index(&node) {
            index
        } else {
            let index = self.graph.add_node(node.clone());
            self.indices.insert(node, index);
            index
        }
    }

    /// Return the index for node of type N
    pub fn get_index(&self, node: &N) -> Option<NodeIndex> {
        self.indices.get(node).copied()
    }

    /// Returns true if the node exists
    pub fn node_exists(&self, node: &N) -> bool {
        self.get_index(node).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Add an edge from a to b
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        // prevent cycle (b connects to a)
        if self.dfs(b).any(|n| n == a) {
            return false;
        }

        // don't add edge if it already exists
        if self.graph.find_edge(a, b).is_some() {
            return false;
        }

        // We're good, add it
        self.graph.add_edge(a, b, ());

        true
    }

    /// Perform a depth-first search, given the start index
    pub fn dfs(&self, start: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let dfs = Dfs::new(&self.graph, start);

        dfs.iter(&self.graph)
    }

    /// Recover a directed path from `from` to `to`, if one exists.
    /// Used to report the offending chain when an edge would close a cycle.
    pub fn path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<NodeIndex>> {
        let mut dfs = Dfs::new(&self.graph, from);
        let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();

        while let Some(next) = dfs.next(&self.graph) {
            for neighbor in self.graph.neighbors(next) {
                parents.entry(neighbor).or_insert(next);
            }
            if next == to {
                let mut path = vec![to];
                let mut current = to;
                while current != from {
                    current = *parents.get(&current)?;
                    path.push(current);
                }
                path.reverse();
                return Some(path);
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use super::Dag;

    #[test]
    fn add_node_is_memoized() {
        let mut dag = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        assert_ne!(a, b);
        assert_eq!(dag.add_node_or_get_index("a"), a);
        assert_eq!(dag.node_count(), 2);
        assert!(dag.node_exists(&"a") && !dag.node_exists(&"c"));
    }

    #[test]
    fn add_edge_refuses_cycles_and_duplicates() {
        let mut dag = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        let c = dag.add_node_or_get_index("c");

        assert!(dag.add_edge(a, b));
        assert!(dag.add_edge(b, c));
        assert!(!dag.add_edge(a, b), "duplicate edge");
        assert!(!dag.add_edge(c, a), "edge closes a cycle");
    }

    #[test]
    fn path_recovers_chain() {
        let mut dag = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        let c = dag.add_node_or_get_index("c");
        dag.add_edge(a, b);
        dag.add_edge(b, c);

        let path = dag.path(a, c).unwrap();
        assert_eq!(path, vec![a, b, c]);
        assert!(dag.path(c, a).is_none());
    }
}
