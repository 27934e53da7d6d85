// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The in-memory DAG of instantiated targets. Topology lives in a
//! [`dag::Dag`] keyed by target name; per-node build state lives in a
//! parallel arena addressed by the same indices.

use std::path::Path;
use std::sync::Arc;

use dag::Dag;
use pattern::Binding;
use strum::Display;

use crate::util::{self, Mtime};

pub type NodeIndex = dag::NodeIndex;

/// How a node reached `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Outcome {
    Built,
    Skipped,
    Pretended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum State {
    /// Created, still on the planning stack
    Fresh,
    Planned,
    Ready,
    Running,
    Done(Outcome),
    Failed,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done(_) | State::Failed)
    }
}

/// Targets produced together by a single recipe run. Shared by every
/// member node; only the leader executes.
#[derive(Debug)]
pub struct Group {
    pub leader: NodeIndex,
    pub members: Vec<NodeIndex>,
}

/// One instantiated target
#[derive(Debug)]
pub struct Node {
    pub name: String,
    /// Index into the rule set, `None` for a plain source file
    pub rule: Option<usize>,
    pub binding: Binding,
    pub prereqs: Vec<NodeIndex>,
    pub type_prereqs: Vec<NodeIndex>,
    pub group: Option<Arc<Group>>,
    pub state: State,
    pub mtime: Mtime,
    /// Only ever reached through type-prereq edges
    pub type_only: bool,
}

impl Node {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            rule: None,
            binding: Binding::new(),
            prereqs: vec![],
            type_prereqs: vec![],
            group: None,
            state: State::Fresh,
            mtime: Mtime::Unknown,
            type_only: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Graph {
    dag: Dag<String>,
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node table lookup by target name
    pub fn get(&self, name: &str) -> Option<NodeIndex> {
        self.dag.get_index(&name.to_owned())
    }

    /// Add-or-get under the planner's memoization contract: planning the
    /// same name twice yields the same node.
    pub fn add_or_get(&mut self, name: &str) -> NodeIndex {
        let index = self.dag.add_node_or_get_index(name.to_owned());
        if index.index() == self.nodes.len() {
            self.nodes.push(Node::new(name));
        }
        index
    }

    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }

    pub fn node_mut(&mut self, index: NodeIndex) -> &mut Node {
        &mut self.nodes[index.index()]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Wire an ordinary prerequisite edge. Returns false if the edge was
    /// already present; an edge that would close a cycle is refused and
    /// the offending chain is returned.
    pub fn add_prereq(&mut self, from: NodeIndex, to: NodeIndex) -> Result<bool, Vec<String>> {
        self.add_edge(from, to, false)
    }

    /// Wire a type-prereq (ordering-only) edge
    pub fn add_type_prereq(&mut self, from: NodeIndex, to: NodeIndex) -> Result<bool, Vec<String>> {
        self.add_edge(from, to, true)
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, type_prereq: bool) -> Result<bool, Vec<String>> {
        let (in_list, in_other) = {
            let node = self.node(from);
            if type_prereq {
                (node.type_prereqs.contains(&to), node.prereqs.contains(&to))
            } else {
                (node.prereqs.contains(&to), node.type_prereqs.contains(&to))
            }
        };

        if in_list {
            return Ok(false);
        }

        // The same prereq may already be wired under the other edge kind,
        // in which case the topology edge exists.
        if !in_other && !self.dag.add_edge(from, to) {
            if let Some(path) = self.dag.path(to, from) {
                let names = std::iter::once(from)
                    .chain(path)
                    .map(|i| self.node(i).name.clone())
                    .collect();
                return Err(names);
            }
        }

        let node = self.node_mut(from);
        if type_prereq {
            node.type_prereqs.push(to);
        } else {
            node.prereqs.push(to);
        }
        Ok(true)
    }

    /// All members of the node's output group (the node itself when it
    /// has no group).
    pub fn group_members(&self, index: NodeIndex) -> Vec<NodeIndex> {
        match &self.node(index).group {
            Some(group) => group.members.clone(),
            None => vec![index],
        }
    }

    pub fn leader(&self, index: NodeIndex) -> NodeIndex {
        match &self.node(index).group {
            Some(group) => group.leader,
            None => index,
        }
    }

    /// The node and its transitive prerequisites
    pub fn reachable(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.dag.dfs(index).collect()
    }

    /// Cached mtime of the node's file, stat'ing on first use
    pub fn mtime(&mut self, index: NodeIndex, dir: &Path) -> Mtime {
        if self.node(index).mtime == Mtime::Unknown {
            self.refresh_mtime(index, dir);
        }
        self.node(index).mtime
    }

    /// Re-stat after a recipe run or an engine touch
    pub fn refresh_mtime(&mut self, index: NodeIndex, dir: &Path) -> Mtime {
        let mtime = util::stat_mtime(&dir.join(&self.node(index).name));
        self.node_mut(index).mtime = mtime;
        mtime
    }
}
