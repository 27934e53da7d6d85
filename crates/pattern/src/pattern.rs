// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::str::FromStr;

use regex::Regex;

use crate::token::{tokenize, Token};
use crate::{is_identifier, Binding, Error};

/// A compiled target pattern. Each `${name}` hole becomes a named capture
/// group; a name may occur more than once, in which case the pattern only
/// matches if every occurrence captures the same substring.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    holes: Vec<String>,
}

impl Pattern {
    /// The pattern as written in the build file
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the pattern contains no holes and names a single target
    pub fn is_literal(&self) -> bool {
        self.holes.is_empty()
    }

    /// Match `target` against the whole pattern, returning the hole
    /// binding on success.
    pub fn match_target(&self, target: &str) -> Option<Binding> {
        let captures = self.regex.captures(target)?;

        let mut binding = Binding::new();
        for (i, name) in self.holes.iter().enumerate() {
            let value = captures.name(&group_name(i))?.as_str();
            match binding.get(name) {
                // backreference occurrences must agree
                Some(previous) if previous != value => return None,
                Some(_) => {}
                None => {
                    binding.insert(name.clone(), value.to_owned());
                }
            }
        }

        Some(binding)
    }
}

fn group_name(i: usize) -> String {
    // `-` is legal in hole names but not in regex group names, so holes
    // are numbered internally and mapped back on capture.
    format!("g{i}")
}

impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut compiled = String::from("^");
        let mut holes = vec![];

        for token in tokenize(s)? {
            match token {
                Token::Literal(text) => compiled.push_str(&regex::escape(&text)),
                Token::Hole(name) => {
                    if !is_identifier(&name) {
                        return Err(Error::InvalidHole(name));
                    }
                    // holes never match the empty string
                    compiled.push_str(&format!("(?<{}>.+)", group_name(holes.len())));
                    holes.push(name);
                }
            }
        }
        compiled.push('$');

        Ok(Self {
            source: s.to_owned(),
            regex: Regex::new(&compiled)?,
            holes,
        })
    }
}
