// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use pattern::{Binding, Pattern, Template};

/// A labeled prerequisite template; the label becomes a binding entry once
/// the template is expanded.
#[derive(Debug, Clone)]
pub struct Labeled {
    pub label: String,
    pub template: Template,
}

/// An additional output template. Outputs declared via `out.<label>` carry
/// a label, entries of the `outputs` list do not.
#[derive(Debug, Clone)]
pub struct Output {
    pub label: Option<String>,
    pub template: Template,
}

/// One rule of the build file: a target pattern, attributes and a recipe
/// template. A rule without a recipe is a pure aggregator.
#[derive(Debug, Clone)]
pub struct Rule {
    pub target: Pattern,
    pub prereqs: Vec<Labeled>,
    pub type_prereqs: Vec<Labeled>,
    pub outputs: Vec<Output>,
    pub recipe: Option<Template>,
    pub shell: Vec<String>,
    pub parallelism: u32,
    pub always_build: bool,
    pub task: bool,
    /// Line of the section header, for diagnostics
    pub line: usize,
}

impl Rule {
    pub fn default_shell() -> Vec<String> {
        vec!["/bin/sh".to_owned(), "-c".to_owned()]
    }
}

/// The ordered rules of a build file. Lookup takes the first rule whose
/// target pattern matches, in file order.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn get(&self, index: usize) -> &Rule {
        &self.rules[index]
    }

    /// First rule of the file, whose target names the default goal
    pub fn first(&self) -> Option<&Rule> {
        self.rules.first()
    }

    /// Find the first rule matching `target` and bind its holes
    pub fn find_match(&self, target: &str) -> Option<(usize, Binding)> {
        self.rules
            .iter()
            .enumerate()
            .find_map(|(index, rule)| Some((index, rule.target.match_target(target)?)))
    }
}
