// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Parsing of the build file (`produce.ini`): `[pattern]` section headers,
//! `key: value` attributes with indented continuation lines, full-line
//! comments.

use std::io;
use std::path::{Path, PathBuf};

use fs_err as fs;
use pattern::{Pattern, Template};
use thiserror::Error;

use crate::rule::{Labeled, Output, Rule, RuleSet};

/// Read and parse the build file at `path`
pub fn load(path: &Path) -> Result<RuleSet, Error> {
    let text = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    parse(path, &text)
}

pub fn parse(path: &Path, text: &str) -> Result<RuleSet, Error> {
    let mut sections: Vec<Section> = vec![];

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let syntax = |message: String| Error::Syntax {
            message,
            path: path.to_owned(),
            line,
        };

        if raw.starts_with('#') || raw.trim().is_empty() {
            continue;
        }

        if let Some(header) = raw.strip_prefix('[') {
            let header = header
                .trim_end()
                .strip_suffix(']')
                .ok_or_else(|| syntax("unterminated section header".to_owned()))?;
            if header.is_empty() {
                return Err(syntax("empty target pattern".to_owned()));
            }
            sections.push(Section {
                header: header.to_owned(),
                line,
                attributes: vec![],
            });
            continue;
        }

        let section = match sections.last_mut() {
            Some(section) => section,
            None => return Err(syntax("attribute outside a rule".to_owned())),
        };

        if raw.starts_with(char::is_whitespace) {
            // continuation of the previous attribute's value
            match section.attributes.last_mut() {
                Some(attribute) => {
                    attribute.values.push(raw.trim_start().to_owned());
                    continue;
                }
                None => return Err(syntax("invalid line".to_owned())),
            }
        }

        match raw.split_once(':') {
            Some((key, value)) if is_attribute_key(key) => {
                section.attributes.push(Attribute {
                    key: key.to_owned(),
                    values: vec![value.trim().to_owned()],
                    line,
                });
            }
            _ => return Err(syntax("invalid line".to_owned())),
        }
    }

    let rules = sections
        .into_iter()
        .map(|section| section.into_rule(path))
        .collect::<Result<_, _>>()?;

    Ok(RuleSet::new(rules))
}

fn is_attribute_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

struct Section {
    header: String,
    line: usize,
    attributes: Vec<Attribute>,
}

struct Attribute {
    key: String,
    values: Vec<String>,
    line: usize,
}

impl Attribute {
    fn value(&self) -> String {
        self.values.join("\n")
    }
}

impl Section {
    fn into_rule(self, path: &Path) -> Result<Rule, Error> {
        let syntax = |message: String, line: usize| Error::Syntax {
            message,
            path: path.to_owned(),
            line,
        };

        let target = self
            .header
            .parse::<Pattern>()
            .map_err(|e| syntax(format!("invalid target pattern: {e}"), self.line))?;

        let mut rule = Rule {
            target,
            prereqs: vec![],
            type_prereqs: vec![],
            outputs: vec![],
            recipe: None,
            shell: Rule::default_shell(),
            parallelism: 1,
            always_build: false,
            task: false,
            line: self.line,
        };

        let mut seen = std::collections::HashSet::new();
        for attribute in &self.attributes {
            if !seen.insert(attribute.key.clone()) {
                return Err(syntax(
                    format!("duplicate attribute `{}`", attribute.key),
                    attribute.line,
                ));
            }

            let value = attribute.value();
            let template = |value: &str| {
                value
                    .parse::<Template>()
                    .map_err(|e| syntax(e.to_string(), attribute.line))
            };

            match attribute.key.as_str() {
                "recipe" => rule.recipe = Some(template(&value)?),
                "shell" => {
                    rule.shell = value.split_whitespace().map(str::to_owned).collect();
                    if rule.shell.is_empty() {
                        return Err(syntax("empty shell".to_owned(), attribute.line));
                    }
                }
                "parallelism" => {
                    rule.parallelism = value
                        .parse()
                        .map_err(|_| syntax(format!("invalid parallelism `{value}`"), attribute.line))?;
                }
                "always_build" => {
                    rule.always_build = match value.as_str() {
                        "true" | "yes" => true,
                        "false" | "no" => false,
                        other => {
                            return Err(syntax(format!("invalid always_build `{other}`"), attribute.line));
                        }
                    };
                }
                "type" => match value.as_str() {
                    "task" => rule.task = true,
                    other => return Err(syntax(format!("unknown target type `{other}`"), attribute.line)),
                },
                "outputs" => {
                    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        rule.outputs.push(Output {
                            label: None,
                            template: template(item)?,
                        });
                    }
                }
                key => {
                    let (kind, label) = key
                        .split_once('.')
                        .filter(|(kind, label)| !label.is_empty() && matches!(*kind, "dep" | "type" | "out"))
                        .ok_or_else(|| syntax(format!("unknown attribute `{key}`"), attribute.line))?;
                    let labeled = Labeled {
                        label: label.to_owned(),
                        template: template(&value)?,
                    };
                    match kind {
                        "dep" => rule.prereqs.push(labeled),
                        "type" => rule.type_prereqs.push(labeled),
                        "out" => rule.outputs.push(Output {
                            label: Some(labeled.label),
                            template: labeled.template,
                        }),
                        _ => unreachable!(),
                    }
                }
            }
        }

        // A recipe-less rule can only be a pure aggregator
        if rule.recipe.is_none() && (!rule.outputs.is_empty() || rule.task || rule.always_build) {
            return Err(syntax(
                format!("rule `{}` needs a recipe", self.header),
                self.line,
            ));
        }

        Ok(rule)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{message} at {}:{line}", .path.display())]
    Syntax {
        message: String,
        path: PathBuf,
        line: usize,
    },
}
