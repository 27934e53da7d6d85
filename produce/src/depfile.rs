// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Makefile-fragment depfiles: `TARGETS : DEPS` stanzas with
//! backslash-newline continuations, as emitted by `cc -MMD` and friends.

/// One `targets: deps` stanza of a depfile
#[derive(Debug, PartialEq, Eq)]
pub struct Stanza {
    pub targets: Vec<String>,
    pub deps: Vec<String>,
}

pub fn parse(text: &str) -> Vec<Stanza> {
    let joined = text.replace("\\\r\n", " ").replace("\\\n", " ");

    joined
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (targets, deps) = line.split_once(':')?;
            Some(Stanza {
                targets: targets.split_whitespace().map(str::to_owned).collect(),
                deps: deps.split_whitespace().map(str::to_owned).collect(),
            })
        })
        .collect()
}

/// Deps declared for `target`. Falls back to every stanza when none names
/// the target, tolerating depfiles keyed by a sibling output name.
pub fn deps_for(stanzas: &[Stanza], target: &str) -> Vec<String> {
    let named: Vec<_> = stanzas
        .iter()
        .filter(|stanza| stanza.targets.iter().any(|t| t == target))
        .collect();

    let selected = if named.is_empty() {
        stanzas.iter().collect()
    } else {
        named
    };

    selected.into_iter().flat_map(|stanza| stanza.deps.iter().cloned()).collect()
}
