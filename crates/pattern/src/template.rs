// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::str::FromStr;

use crate::token::{tokenize, Token};
use crate::{is_identifier, Error};

/// One parsed segment of a template. A `${…}` hole whose content is a
/// plain identifier is a variable reference; anything else is an embedded
/// expression for the host evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Var(String),
    Expr(String),
}

/// A parsed prerequisite, output or recipe template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    pieces: Vec<Piece>,
}

impl Template {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Expand the template. `resolver` is called for every `Var` and
    /// `Expr` piece and its results are concatenated with the literals.
    pub fn expand<E>(&self, mut resolver: impl FnMut(&Piece) -> Result<String, E>) -> Result<String, E> {
        let mut result = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => result.push_str(text),
                hole => result.push_str(&resolver(hole)?),
            }
        }
        Ok(result)
    }
}

impl FromStr for Template {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pieces = tokenize(s)?
            .into_iter()
            .map(|token| match token {
                Token::Literal(text) => Piece::Literal(text),
                Token::Hole(content) => {
                    if is_identifier(&content) {
                        Piece::Var(content)
                    } else {
                        Piece::Expr(content)
                    }
                }
            })
            .collect();

        Ok(Self {
            source: s.to_owned(),
            pieces,
        })
    }
}
