// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The planner: expands requested targets into the node DAG by matching
//! rules, binding pattern holes and recursing into prerequisites.

use std::sync::Arc;

use log::trace;
use pattern::{Binding, Template};
use thiserror::Error;

use crate::eval::{self, Evaluator};
use crate::graph::{Graph, Group, NodeIndex, State};
use crate::options::Options;
use crate::rule::{Labeled, RuleSet};

pub struct Planner<'a> {
    graph: &'a mut Graph,
    rules: &'a RuleSet,
    evaluator: &'a dyn Evaluator,
    options: &'a Options,
    /// Names currently being planned, for cycle diagnostics
    stack: Vec<NodeIndex>,
}

impl<'a> Planner<'a> {
    pub fn new(graph: &'a mut Graph, rules: &'a RuleSet, evaluator: &'a dyn Evaluator, options: &'a Options) -> Self {
        Self {
            graph,
            rules,
            evaluator,
            options,
            stack: vec![],
        }
    }

    /// Plan `target` reached as an ordinary prerequisite or a requested
    /// goal. Memoized: planning a name twice returns the same node.
    pub fn plan(&mut self, target: &str) -> Result<NodeIndex, Error> {
        let index = self.plan_raw(target)?;
        self.graph.node_mut(index).type_only = false;
        Ok(index)
    }

    /// Plan a type-prereq. The node keeps its type-only marker unless an
    /// ordinary reference also reaches it.
    fn plan_type_prereq(&mut self, target: &str) -> Result<NodeIndex, Error> {
        let existed = self.graph.get(target).is_some();
        let index = self.plan_raw(target)?;
        if !existed {
            self.graph.node_mut(index).type_only = true;
        }
        Ok(index)
    }

    fn plan_raw(&mut self, target: &str) -> Result<NodeIndex, Error> {
        if let Some(index) = self.graph.get(target) {
            if self.graph.node(index).state == State::Fresh {
                // reached a name that is still being planned
                return Err(self.cycle_to(index));
            }
            return Ok(index);
        }

        let rules = self.rules;
        let Some((rule_index, mut binding)) = rules.find_match(target) else {
            if self.options.dir.join(target).exists() {
                trace!(target: "produce", "{target}: plain source file");
                let index = self.graph.add_or_get(target);
                self.graph.node_mut(index).state = State::Planned;
                return Ok(index);
            }
            return Err(Error::NoRule(target.to_owned()));
        };

        let rule = rules.get(rule_index);
        trace!(target: "produce", "{target}: matched rule at line {}", rule.line);

        let index = self.graph.add_or_get(target);
        self.graph.node_mut(index).rule = Some(rule_index);
        self.stack.push(index);

        binding.insert("target".to_owned(), target.to_owned());

        // Side outputs first: their nodes join this rule's output group
        // and their labels become visible to prerequisite templates.
        let mut members = vec![index];
        let mut created = vec![index];
        for output in &rule.outputs {
            let name = self.expand(&output.template, &binding, rule.line)?;
            if let Some(label) = &output.label {
                binding.insert(label.clone(), name.clone());
            }
            if members.iter().any(|&m| self.graph.node(m).name == name) {
                continue;
            }
            match self.graph.get(&name) {
                Some(existing) => {
                    // A soft cycle: the name resolves to a recipe-less
                    // aggregator rule, so this recipe may claim it.
                    let aggregator = self
                        .graph
                        .node(existing)
                        .rule
                        .map(|r| rules.get(r).recipe.is_none())
                        .unwrap_or(false);
                    if aggregator {
                        members.push(existing);
                    } else {
                        let error = self.cycle_to(existing);
                        return Err(error);
                    }
                }
                None => {
                    let member = self.graph.add_or_get(&name);
                    let node = self.graph.node_mut(member);
                    node.rule = Some(rule_index);
                    members.push(member);
                    created.push(member);
                }
            }
        }

        for Labeled { label, template } in &rule.prereqs {
            let name = self.expand(template, &binding, rule.line)?;
            binding.insert(label.clone(), name.clone());
            let prereq = self.plan(&name)?;
            for &member in &created {
                self.graph
                    .add_prereq(member, prereq)
                    .map_err(|path| Error::Cycle { path })?;
            }
        }

        for Labeled { label, template } in &rule.type_prereqs {
            let name = self.expand(template, &binding, rule.line)?;
            binding.insert(label.clone(), name.clone());
            let prereq = self.plan_type_prereq(&name)?;
            for &member in &created {
                self.graph
                    .add_type_prereq(member, prereq)
                    .map_err(|path| Error::Cycle { path })?;
            }
        }

        if members.len() > 1 {
            let group = Arc::new(Group {
                leader: index,
                members: members.clone(),
            });
            for &member in &members {
                self.graph.node_mut(member).group = Some(group.clone());
            }
        }

        for &member in &created {
            let node = self.graph.node_mut(member);
            node.binding = binding.clone();
            node.state = State::Planned;
        }

        self.stack.pop();
        Ok(index)
    }

    fn expand(&self, template: &Template, binding: &Binding, line: usize) -> Result<String, Error> {
        eval::expand(template, binding, self.evaluator).map_err(|source| Error::Expand { line, source })
    }

    fn cycle_to(&self, index: NodeIndex) -> Error {
        let name = |i: NodeIndex| self.graph.node(i).name.clone();
        let path = match self.stack.iter().position(|&i| i == index) {
            Some(position) => self.stack[position..]
                .iter()
                .map(|&i| name(i))
                .chain(std::iter::once(name(index)))
                .collect(),
            // not on the stack: two already-planned rules claim the name
            None => {
                let mut path: Vec<_> = self.stack.last().map(|&i| name(i)).into_iter().collect();
                path.push(name(index));
                path
            }
        };
        Error::Cycle { path }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("no rule to produce {0}")]
    NoRule(String),

    #[error("cyclic dependency: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("{source} (rule at line {line})")]
    Expand {
        line: usize,
        #[source]
        source: eval::ExpandError,
    },
}
